//! Incremental filtered listing.
//!
//! A [`Listing`] owns the filter/sort/search state of one list view, turns it
//! into a [`QueryKey`], and loads pages for that key through a
//! [`PageFetcher`]. The loaded rows are published as a [`ListingView`] on a
//! `watch` channel.
//!
//! # Prefetch state machine
//!
//! ```text
//!   Idle ──activate / key change──▶ FetchingFirst
//!   FetchingFirst ──full page──▶ PrefetchingNext ──done──▶ AwaitingUserScroll
//!   AwaitingUserScroll ──request_next_page──▶ FetchingOnDemand
//!   FetchingOnDemand ──full page──▶ PrefetchingNext
//!   any ──key change──▶ FetchingFirst
//! ```
//!
//! At most one page fetch is in flight. A short page ends the list for the
//! key: `has_more` turns false and stays false until the key changes. Every
//! fetch is tagged with the generation of the key it was issued for, and a
//! completion from an older generation is dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::config::Config;
use crate::error::{DocketError, Result};
use crate::query::{DateRange, ListingParams, QueryKey, SortSpec};
use crate::search::{self, Debouncer};
use crate::types::PAGE_SIZE;

pub mod fetcher;
pub mod scroll;

pub use fetcher::{DocketPages, FilingPages, OrganizationPages, PageFetcher};
pub use scroll::{ScrollTrigger, Viewport};

/// How often [`Listing::settled`] rechecks a pending search
const SETTLE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    FetchingFirst,
    PrefetchingNext,
    AwaitingUserScroll,
    FetchingOnDemand,
}

/// Read-only snapshot for the view layer.
#[derive(Debug, Clone, Serialize)]
pub struct ListingView<T> {
    #[serde(skip)]
    pub key: QueryKey,
    pub rows: Vec<T>,
    pub is_loading_first_page: bool,
    pub is_fetching_next_page: bool,
    pub has_more: bool,
    /// Last fetch failure for this key, cleared by the next success
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<Arc<DocketError>>,
    pub phase: Phase,
}

impl<T> ListingView<T> {
    pub fn is_settled(&self) -> bool {
        !self.is_loading_first_page && !self.is_fetching_next_page
    }

    /// The last fetch failure as an error of its own.
    pub fn check(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(DocketError::Fetch(err.clone())),
            None => Ok(()),
        }
    }
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<Arc<DocketError>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone)]
pub struct ListingOptions {
    pub page_size: usize,
    /// Fetch one page ahead after every completed page
    pub prefetch: bool,
    pub debounce: Duration,
    pub min_search_len: usize,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            prefetch: true,
            debounce: Duration::from_millis(search::DEBOUNCE_MS),
            min_search_len: search::MIN_SEARCH_LEN,
        }
    }
}

impl ListingOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.listing.page_size.max(1),
            prefetch: config.listing.prefetch,
            debounce: config.debounce(),
            min_search_len: config.search.min_length,
        }
    }
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    page: usize,
    handle: AbortHandle,
}

#[derive(Debug)]
struct State<T> {
    params: ListingParams,
    key: QueryKey,
    generation: u64,
    phase: Phase,
    rows: Vec<T>,
    next_page: usize,
    has_more: bool,
    error: Option<Arc<DocketError>>,
    in_flight: Option<InFlight>,
}

impl<T: Clone> State<T> {
    fn view(&self) -> ListingView<T> {
        ListingView {
            key: self.key.clone(),
            rows: self.rows.clone(),
            is_loading_first_page: self.phase == Phase::FetchingFirst,
            is_fetching_next_page: matches!(
                self.phase,
                Phase::PrefetchingNext | Phase::FetchingOnDemand
            ),
            has_more: self.has_more,
            error: self.error.clone(),
            phase: self.phase,
        }
    }

    fn abort_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
            tracing::debug!(
                "cancelled page {} of {} (generation {})",
                in_flight.page,
                self.key,
                in_flight.generation
            );
        }
    }
}

struct Shared<F: PageFetcher> {
    fetcher: Arc<F>,
    options: ListingOptions,
    state: Mutex<State<F::Item>>,
    view: watch::Sender<ListingView<F::Item>>,
    search: Debouncer,
}

impl<F: PageFetcher> Drop for Shared<F> {
    fn drop(&mut self) {
        self.state.get_mut().abort_in_flight();
    }
}

/// One list view's loading controller. Clones share the same listing.
pub struct Listing<F: PageFetcher> {
    shared: Arc<Shared<F>>,
}

impl<F: PageFetcher> Clone for Listing<F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<F: PageFetcher> Listing<F> {
    /// Create an idle listing sorted by the fetcher's default sort.
    pub fn new(fetcher: F, options: ListingOptions) -> Self {
        let params = ListingParams::default().with_sort(fetcher.default_sort());
        Self::with_params(fetcher, params, options)
    }

    /// Create an idle listing with initial state, e.g. a persisted sort.
    ///
    /// A sort the fetcher cannot order by falls back to its default.
    pub fn with_params(fetcher: F, mut params: ListingParams, options: ListingOptions) -> Self {
        if !fetcher.sort_fields().contains(&params.sort.field) {
            tracing::warn!(
                "sort '{}' not available for {}, using '{}'",
                params.sort,
                fetcher.relation(),
                fetcher.default_sort()
            );
            params.sort = fetcher.default_sort();
        }
        params.search = search::normalize(&params.search);
        if !search::is_searchable(&params.search, options.min_search_len) {
            params.search.clear();
        }

        let key = QueryKey::compose(fetcher.relation(), &params);
        let state = State {
            params,
            key,
            generation: 0,
            phase: Phase::Idle,
            rows: Vec::new(),
            next_page: 0,
            has_more: true,
            error: None,
            in_flight: None,
        };
        let (view, _) = watch::channel(state.view());

        Self {
            shared: Arc::new(Shared {
                fetcher: Arc::new(fetcher),
                search: Debouncer::new(options.debounce),
                options,
                state: Mutex::new(state),
                view,
            }),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.shared.fetcher
    }

    pub fn key(&self) -> QueryKey {
        self.shared.state.lock().key.clone()
    }

    pub fn params(&self) -> ListingParams {
        self.shared.state.lock().params.clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.lock().phase
    }

    /// Current snapshot.
    pub fn view(&self) -> ListingView<F::Item> {
        self.shared.view.borrow().clone()
    }

    /// Receive a snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<ListingView<F::Item>> {
        self.shared.view.subscribe()
    }

    /// Start loading the first page if nothing has been loaded yet.
    pub fn activate(&self) {
        let mut state = self.shared.state.lock();
        if state.phase == Phase::Idle {
            restart(&self.shared, &mut state);
        }
    }

    /// Reload the current key from the first page.
    pub fn refresh(&self) {
        let mut state = self.shared.state.lock();
        restart(&self.shared, &mut state);
    }

    /// Replace the accepted values of one filter column. An empty set clears it.
    pub fn set_filter<I, S>(&self, column: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        update(&self.shared, |params| params.set_filter(column, values));
    }

    pub fn set_sort(&self, sort: SortSpec) -> Result<()> {
        if !self.shared.fetcher.sort_fields().contains(&sort.field) {
            return Err(DocketError::InvalidSortField(sort.field.to_string()));
        }
        update(&self.shared, |params| params.sort = sort);
        Ok(())
    }

    pub fn set_date_range(&self, range: Option<DateRange>) {
        update(&self.shared, |params| params.date_range = range);
    }

    /// Feed raw search input. The normalized text is applied once typing
    /// pauses for the debounce period; text shorter than the minimum length
    /// applies as an empty search.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_search_text(&self, raw: &str) {
        let text = search::normalize(raw);
        let shared = Arc::downgrade(&self.shared);
        self.shared.search.schedule(async move {
            apply_search(&shared, text);
        });
    }

    /// Apply search text immediately, skipping the debounce.
    pub fn apply_search_now(&self, raw: &str) {
        self.shared.search.cancel();
        apply_search(&Arc::downgrade(&self.shared), search::normalize(raw));
    }

    /// Request the page after the loaded ones.
    ///
    /// No-op, returning false, while a fetch is in flight, once the list is
    /// exhausted, or before activation.
    pub fn request_next_page(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.in_flight.is_some() || !state.has_more || state.phase == Phase::Idle {
            return false;
        }
        let phase = if state.next_page == 0 {
            Phase::FetchingFirst
        } else {
            Phase::FetchingOnDemand
        };
        start_fetch(&self.shared, &mut state, phase);
        true
    }

    /// Cancel pending and in-flight work and return to idle.
    pub fn close(&self) {
        self.shared.search.cancel();
        let mut state = self.shared.state.lock();
        state.abort_in_flight();
        state.generation += 1;
        state.rows.clear();
        state.next_page = 0;
        state.has_more = true;
        state.error = None;
        state.phase = Phase::Idle;
        self.shared.view.send_replace(state.view());
    }

    /// Wait until no search is pending and no page fetch is in flight.
    pub async fn settled(&self) -> ListingView<F::Item> {
        let mut rx = self.subscribe();
        loop {
            if !self.shared.search.is_pending() {
                let view = rx.borrow_and_update().clone();
                if view.is_settled() {
                    return view;
                }
            }
            tokio::select! {
                _ = rx.changed() => {}
                _ = tokio::time::sleep(SETTLE_POLL) => {}
            }
        }
    }
}

fn apply_search<F: PageFetcher>(shared: &Weak<Shared<F>>, text: String) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let text = if search::is_searchable(&text, shared.options.min_search_len) {
        text
    } else {
        String::new()
    };
    update(&shared, |params| params.search = text);
}

/// Mutate the params; a changed key restarts from the first page.
fn update<F, M>(shared: &Arc<Shared<F>>, mutate: M)
where
    F: PageFetcher,
    M: FnOnce(&mut ListingParams),
{
    let mut state = shared.state.lock();
    mutate(&mut state.params);

    let key = QueryKey::compose(shared.fetcher.relation(), &state.params);
    if key == state.key && state.phase != Phase::Idle {
        return;
    }
    tracing::debug!("query key {} -> {}", state.key, key);
    state.key = key;
    restart(shared, &mut state);
}

fn restart<F: PageFetcher>(shared: &Arc<Shared<F>>, state: &mut State<F::Item>) {
    state.abort_in_flight();
    state.generation += 1;
    state.rows.clear();
    state.next_page = 0;
    state.has_more = true;
    state.error = None;
    start_fetch(shared, state, Phase::FetchingFirst);
}

fn start_fetch<F: PageFetcher>(shared: &Arc<Shared<F>>, state: &mut State<F::Item>, phase: Phase) {
    let generation = state.generation;
    let page = state.next_page;
    let page_size = shared.options.page_size;
    let params = state.params.clone();
    let fetcher = shared.fetcher.clone();
    let weak = Arc::downgrade(shared);

    tracing::debug!("{:?} -> {:?}: page {} of {}", state.phase, phase, page, state.key);

    let handle = tokio::spawn(async move {
        let result = fetcher.fetch_page(&params, page, page_size).await;
        if let Some(shared) = weak.upgrade() {
            complete(&shared, generation, page, result);
        }
    });

    state.phase = phase;
    state.in_flight = Some(InFlight {
        generation,
        page,
        handle: handle.abort_handle(),
    });
    shared.view.send_replace(state.view());
}

fn complete<F: PageFetcher>(
    shared: &Arc<Shared<F>>,
    generation: u64,
    page: usize,
    result: Result<Vec<F::Item>>,
) {
    let mut state = shared.state.lock();
    let is_current = state
        .in_flight
        .as_ref()
        .is_some_and(|f| f.generation == generation && f.page == page);
    if generation != state.generation || !is_current {
        tracing::debug!(
            "discarding page {} from generation {} (current {})",
            page,
            generation,
            state.generation
        );
        return;
    }
    state.in_flight = None;

    match result {
        Ok(items) => {
            let page_size = shared.options.page_size;
            state.has_more = items.len() >= page_size;
            state.rows.extend(items);
            state.next_page = page + 1;
            state.error = None;

            let follow_up = state.has_more
                && shared.options.prefetch
                && matches!(state.phase, Phase::FetchingFirst | Phase::FetchingOnDemand);
            if follow_up {
                start_fetch(shared, &mut state, Phase::PrefetchingNext);
                return;
            }
            if !state.has_more {
                tracing::debug!("{} exhausted after {} rows", state.key, state.rows.len());
            }
            state.phase = Phase::AwaitingUserScroll;
        }
        Err(err) => {
            tracing::warn!("page {} of {} failed: {}", page, state.key, err);
            state.error = Some(Arc::new(err));
            state.phase = Phase::AwaitingUserScroll;
        }
    }
    shared.view.send_replace(state.view());
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::remote::MemoryService;
    use crate::types::DOCKETS;

    fn service(n: usize) -> MemoryService {
        let rows = (0..n)
            .map(|i| {
                json!({
                    "uuid": format!("d{i:03}"),
                    "docket_govid": format!("24-E-{i:04}"),
                    "docket_title": format!("Docket {i}"),
                    "industry": "Electric",
                })
            })
            .collect();
        MemoryService::new().with_table(DOCKETS, rows)
    }

    fn listing(service: &MemoryService) -> Listing<DocketPages<MemoryService>> {
        Listing::new(DocketPages::new(service.clone()), ListingOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_until_activated() {
        let service = service(5);
        let listing = listing(&service);

        assert_eq!(listing.phase(), Phase::Idle);
        assert!(!listing.request_next_page());
        assert!(service.calls().is_empty());

        listing.activate();
        let view = listing.settled().await;
        assert_eq!(view.rows.len(), 5);
        assert!(!view.has_more);
        assert_eq!(view.phase, Phase::AwaitingUserScroll);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_page_failure_is_empty_with_error_and_retryable() {
        let service = service(5);
        service.fail_next(DOCKETS, "connection reset");
        let listing = listing(&service);

        listing.activate();
        let view = listing.settled().await;
        assert!(view.rows.is_empty());
        assert!(view.error.as_ref().is_some_and(|e| e.to_string().contains("connection reset")));
        assert!(view.has_more);
        assert!(matches!(view.check(), Err(DocketError::Fetch(_))));

        assert!(listing.request_next_page());
        let view = listing.settled().await;
        assert_eq!(view.rows.len(), 5);
        assert!(view.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_next_page_keeps_loaded_rows() {
        let service = service(70);
        let listing = Listing::new(
            DocketPages::new(service.clone()),
            ListingOptions {
                prefetch: false,
                ..Default::default()
            },
        );
        listing.activate();
        assert_eq!(listing.settled().await.rows.len(), 30);

        service.fail_next(DOCKETS, "boom");
        assert!(listing.request_next_page());
        let view = listing.settled().await;
        assert_eq!(view.rows.len(), 30);
        assert!(view.error.is_some());
        assert_eq!(view.phase, Phase::AwaitingUserScroll);

        assert!(listing.request_next_page());
        assert_eq!(listing.settled().await.rows.len(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_key_does_not_refetch() {
        let service = service(5);
        let listing = listing(&service);
        listing.activate();
        listing.settled().await;

        listing.set_filter("industry", Vec::<String>::new());
        listing.set_date_range(None);
        listing.settled().await;
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_sort_rejected_without_reset() {
        let service = service(5);
        let listing = listing(&service);
        listing.activate();
        listing.settled().await;

        let err = listing
            .set_sort(SortSpec::by(crate::query::SortField::FiledDate))
            .unwrap_err();
        assert!(matches!(err, DocketError::InvalidSortField(_)));
        assert_eq!(listing.view().rows.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_and_returns_to_idle() {
        let service = service(5);
        service.set_latency(DOCKETS, Duration::from_millis(200));
        let listing = listing(&service);

        listing.activate();
        listing.close();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let view = listing.view();
        assert_eq!(view.phase, Phase::Idle);
        assert!(view.rows.is_empty());
    }
}
