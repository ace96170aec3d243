//! Free-text search input handling.
//!
//! Raw keystrokes go through [`normalize`] and are held back by a
//! [`Debouncer`] until the user pauses typing. Every dispatched search is
//! tagged with a [`RequestId`] from a [`RequestSeq`]; a completion whose id is
//! no longer current belongs to a superseded search and is dropped.

use std::sync::atomic::{AtomicU64, Ordering};

mod debounce;

pub use debounce::Debouncer;

/// Quiet period before a search is dispatched (milliseconds)
pub const DEBOUNCE_MS: u64 = 300;

/// Shortest normalized text that triggers a search
pub const MIN_SEARCH_LEN: usize = 2;

/// Characters with meaning to the backend's pattern-matching operator
const RESERVED_CHARS: &[char] = &[',', '%'];

/// Strip reserved characters and surrounding whitespace.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !RESERVED_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// True if already-normalized `text` is long enough to search for.
pub fn is_searchable(text: &str, min_len: usize) -> bool {
    text.chars().count() >= min_len
}

/// Identity of one dispatched search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

/// Monotonic request counter. Only the most recently issued id is current.
#[derive(Debug, Default)]
pub struct RequestSeq {
    current: AtomicU64,
}

impl RequestSeq {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new id, superseding every earlier one.
    pub fn next(&self) -> RequestId {
        RequestId(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Supersede every issued id without starting a new request.
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, id: RequestId) -> bool {
        self.current.load(Ordering::SeqCst) == id.0
    }
}
