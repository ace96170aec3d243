//! Command palette search across dockets and organizations.
//!
//! Keystrokes are normalized and debounced; a dispatched search queries both
//! tables concurrently with a per-table row limit. Each dispatch takes a new
//! id from a [`RequestSeq`] and only the most recent id may publish, so a
//! slow response for an older query never overwrites a newer one. Closing
//! the palette cancels everything and clears the results.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::config::Config;
use crate::error::Result;
use crate::query::{SortDirection, TableQuery};
use crate::remote::{DataService, decode_rows};
use crate::search::{self, Debouncer, RequestId, RequestSeq};
use crate::types::{DOCKETS, Docket, ORGANIZATIONS, Organization};

/// Default rows shown per table
pub const PALETTE_LIMIT: usize = 8;

const SETTLE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default, Serialize)]
pub struct PaletteResults {
    /// Normalized text these results belong to
    pub query: String,
    pub dockets: Vec<Docket>,
    pub organizations: Vec<Organization>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl PaletteResults {
    pub fn is_empty(&self) -> bool {
        self.dockets.is_empty() && self.organizations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PaletteOptions {
    pub limit: usize,
    pub debounce: Duration,
    pub min_search_len: usize,
}

impl Default for PaletteOptions {
    fn default() -> Self {
        Self {
            limit: PALETTE_LIMIT,
            debounce: Duration::from_millis(search::DEBOUNCE_MS),
            min_search_len: search::MIN_SEARCH_LEN,
        }
    }
}

impl PaletteOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit: config.search.palette_limit.max(1),
            debounce: config.debounce(),
            min_search_len: config.search.min_length,
        }
    }
}

struct Shared<S> {
    service: S,
    options: PaletteOptions,
    seq: RequestSeq,
    debouncer: Debouncer,
    in_flight: Mutex<Option<AbortHandle>>,
    results: watch::Sender<PaletteResults>,
}

impl<S> Drop for Shared<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.get_mut().take() {
            handle.abort();
        }
    }
}

pub struct Palette<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Palette<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S: DataService> Palette<S> {
    pub fn new(service: S, options: PaletteOptions) -> Self {
        let (results, _) = watch::channel(PaletteResults::default());
        Self {
            shared: Arc::new(Shared {
                service,
                debouncer: Debouncer::new(options.debounce),
                options,
                seq: RequestSeq::new(),
                in_flight: Mutex::new(None),
                results,
            }),
        }
    }

    pub fn results(&self) -> PaletteResults {
        self.shared.results.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PaletteResults> {
        self.shared.results.subscribe()
    }

    /// Feed raw input. Searchable text is dispatched after the debounce
    /// period; anything shorter cancels pending work and clears the results.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_query(&self, raw: &str) {
        let text = search::normalize(raw);
        if !search::is_searchable(&text, self.shared.options.min_search_len) {
            self.close();
            return;
        }
        let shared = Arc::downgrade(&self.shared);
        self.shared.debouncer.schedule(async move {
            dispatch(&shared, text);
        });
    }

    /// Dispatch a search immediately, skipping the debounce.
    pub fn search_now(&self, raw: &str) {
        let text = search::normalize(raw);
        if !search::is_searchable(&text, self.shared.options.min_search_len) {
            self.close();
            return;
        }
        self.shared.debouncer.cancel();
        dispatch(&Arc::downgrade(&self.shared), text);
    }

    /// Cancel pending and in-flight searches and clear the results.
    pub fn close(&self) {
        self.shared.debouncer.cancel();
        self.shared.seq.invalidate();
        if let Some(handle) = self.shared.in_flight.lock().take() {
            handle.abort();
        }
        self.shared.results.send_replace(PaletteResults::default());
    }

    /// Wait until no search is pending or loading.
    pub async fn settled(&self) -> PaletteResults {
        let mut rx = self.subscribe();
        loop {
            if !self.shared.debouncer.is_pending() {
                let results = rx.borrow_and_update().clone();
                if !results.is_loading {
                    return results;
                }
            }
            tokio::select! {
                _ = rx.changed() => {}
                _ = tokio::time::sleep(SETTLE_POLL) => {}
            }
        }
    }
}

fn dispatch<S: DataService>(shared: &Weak<Shared<S>>, text: String) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let id = shared.seq.next();
    shared.results.send_modify(|results| {
        results.query = text.clone();
        results.is_loading = true;
    });

    let weak = Arc::downgrade(&shared);
    let handle = tokio::spawn(async move {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let results = run_search(&shared.service, &text, shared.options.limit).await;
        publish(&shared, id, text, results);
    });

    // Older searches keep running; the sequence discards their results
    *shared.in_flight.lock() = Some(handle.abort_handle());
}

async fn run_search<S: DataService>(
    service: &S,
    text: &str,
    limit: usize,
) -> (Result<Vec<Docket>>, Result<Vec<Organization>>) {
    let dockets_query = TableQuery::new(DOCKETS)
        .search(&["docket_title", "docket_govid", "petitioner"], text)
        .order_by("opened_date", SortDirection::Desc)
        .limit(limit);
    let organizations_query = TableQuery::new(ORGANIZATIONS)
        .search(&["name"], text)
        .order_by("name", SortDirection::Asc)
        .limit(limit);

    let (dockets, organizations) = tokio::join!(
        service.select(&dockets_query),
        service.select(&organizations_query)
    );
    (
        dockets.and_then(|rows| decode_rows(DOCKETS, rows)),
        organizations.and_then(|rows| decode_rows(ORGANIZATIONS, rows)),
    )
}

fn publish<S>(
    shared: &Shared<S>,
    id: RequestId,
    text: String,
    (dockets, organizations): (Result<Vec<Docket>>, Result<Vec<Organization>>),
) {
    let mut errors = Vec::new();
    let dockets = dockets.unwrap_or_else(|e| {
        errors.push(e.to_string());
        Vec::new()
    });
    let organizations = organizations.unwrap_or_else(|e| {
        errors.push(e.to_string());
        Vec::new()
    });
    if !errors.is_empty() {
        tracing::warn!("palette search {:?} failed: {}", text, errors.join("; "));
    }

    let fresh = PaletteResults {
        query: text,
        dockets,
        organizations,
        is_loading: false,
        error: (!errors.is_empty()).then(|| errors.join("; ")),
    };
    // Sequence check and write share the channel lock; close() invalidates before it clears
    let published = shared.results.send_if_modified(move |current| {
        if !shared.seq.is_current(id) {
            return false;
        }
        *current = fresh;
        true
    });
    if !published {
        tracing::debug!("discarding palette results for superseded search {:?}", id);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::remote::MemoryService;

    fn service() -> MemoryService {
        let dockets = (0..12)
            .map(|i| {
                json!({
                    "uuid": format!("d{i}"),
                    "docket_govid": format!("24-E-{i:04}"),
                    "docket_title": format!("Consolidated Edison rate case {i}"),
                })
            })
            .collect();
        MemoryService::new().with_table(DOCKETS, dockets).with_table(
            ORGANIZATIONS,
            vec![
                json!({"uuid": "o1", "name": "Consolidated Edison"}),
                json!({"uuid": "o2", "name": "Central Hudson"}),
            ],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_searches_both_tables_with_limit() {
        let service = service();
        let palette = Palette::new(service.clone(), PaletteOptions::default());

        palette.set_query("consolidated");
        let results = palette.settled().await;

        assert_eq!(results.query, "consolidated");
        assert_eq!(results.dockets.len(), PALETTE_LIMIT);
        assert_eq!(results.organizations.len(), 1);
        assert!(results.error.is_none());
        assert_eq!(service.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_query_clears_without_request() {
        let service = service();
        let palette = Palette::new(service.clone(), PaletteOptions::default());

        palette.set_query("consolidated");
        palette.settled().await;
        palette.set_query(" c ");

        let results = palette.settled().await;
        assert!(results.is_empty());
        assert_eq!(results.query, "");
        assert_eq!(service.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_discards_in_flight_search() {
        let service = service();
        service.set_latency(DOCKETS, Duration::from_millis(500));
        let palette = Palette::new(service, PaletteOptions::default());

        palette.search_now("consolidated");
        tokio::time::sleep(Duration::from_millis(100)).await;
        palette.close();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(palette.results().is_empty());
    }

    #[test]
    fn test_completion_racing_close_never_outlives_it() {
        let palette = Palette::new(service(), PaletteOptions::default());

        for _ in 0..200 {
            let id = palette.shared.seq.next();
            let barrier = Arc::new(std::sync::Barrier::new(2));

            let publisher = {
                let shared = palette.shared.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let docket: Docket = serde_json::from_value(json!({
                        "uuid": "d1",
                        "docket_govid": "24-E-0001",
                        "docket_title": "Steam rates",
                    }))
                    .unwrap();
                    barrier.wait();
                    publish(&shared, id, "steam".to_string(), (Ok(vec![docket]), Ok(vec![])));
                })
            };
            barrier.wait();
            palette.close();
            publisher.join().unwrap();

            let results = palette.results();
            assert!(results.is_empty());
            assert_eq!(results.query, "");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_keeps_other_table() {
        let service = service();
        service.fail_next(ORGANIZATIONS, "timeout");
        let palette = Palette::new(service, PaletteOptions::default());

        palette.search_now("consolidated");
        let results = palette.settled().await;
        assert_eq!(results.dockets.len(), PALETTE_LIMIT);
        assert!(results.organizations.is_empty());
        assert!(results.error.is_some());
    }
}
