//! In-process data service.
//!
//! Tables are plain vectors of JSON rows and every read goes through
//! [`TableQuery::apply`], so filtering, ordering and windowing behave like
//! the hosted service. Unique keys are enforced on insert and every write is
//! broadcast to subscribers. Per-call delays, injected failures and a call
//! log make the service usable as a deterministic test double.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};

use crate::error::{DocketError, Result};
use crate::query::{Predicate, TableQuery};

use super::{CHANGE_CHANNEL_CAPACITY, ChangeEvent, ChangeKind, ChangeStream, DataService, Row};

#[derive(Debug, Default)]
struct Behavior {
    /// Delays consumed one per call, per relation
    delays: HashMap<String, VecDeque<Duration>>,
    /// Delay applied when no queued delay is left
    latency: HashMap<String, Duration>,
    /// Failures consumed one per call, per relation
    failures: HashMap<String, VecDeque<String>>,
}

#[derive(Debug)]
struct MemoryInner {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    unique_keys: RwLock<HashMap<String, Vec<String>>>,
    behavior: Mutex<Behavior>,
    calls: Mutex<Vec<TableQuery>>,
    changes: broadcast::Sender<ChangeEvent>,
    feeds_closed: watch::Sender<bool>,
}

/// In-memory [`DataService`]. Cloning shares the same tables.
#[derive(Debug, Clone)]
pub struct MemoryService {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (feeds_closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(MemoryInner {
                tables: RwLock::new(HashMap::new()),
                unique_keys: RwLock::new(HashMap::new()),
                behavior: Mutex::new(Behavior::default()),
                calls: Mutex::new(Vec::new()),
                changes,
                feeds_closed,
            }),
        }
    }

    /// Load tables from a JSON object of `relation -> [rows]`.
    pub fn from_fixture(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixture: HashMap<String, Vec<Row>> = serde_json::from_str(&content)?;
        let service = Self::new();
        for (relation, rows) in fixture {
            service.insert_rows(&relation, rows);
        }
        Ok(service.with_unique_key(crate::types::FAVORITES, &["user_id", "docket_govid"]))
    }

    pub fn with_table(self, relation: &str, rows: Vec<Row>) -> Self {
        self.insert_rows(relation, rows);
        self
    }

    /// Reject inserts whose `columns` all equal those of an existing row.
    pub fn with_unique_key(self, relation: &str, columns: &[&str]) -> Self {
        self.inner.unique_keys.write().insert(
            relation.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    /// Append rows without notifying subscribers.
    pub fn insert_rows(&self, relation: &str, rows: Vec<Row>) {
        self.inner
            .tables
            .write()
            .entry(relation.to_string())
            .or_default()
            .extend(rows);
    }

    /// End every open change subscription and refuse new ones, like a
    /// dropped realtime connection.
    pub fn close_feeds(&self) {
        self.inner.feeds_closed.send_replace(true);
    }

    /// Delay every call on `relation` that has no queued delay.
    pub fn set_latency(&self, relation: &str, latency: Duration) {
        self.inner
            .behavior
            .lock()
            .latency
            .insert(relation.to_string(), latency);
    }

    /// Delay the next not-yet-delayed call on `relation`.
    pub fn push_delay(&self, relation: &str, delay: Duration) {
        self.inner
            .behavior
            .lock()
            .delays
            .entry(relation.to_string())
            .or_default()
            .push_back(delay);
    }

    /// Fail the next call on `relation` with a query failure.
    pub fn fail_next(&self, relation: &str, message: &str) {
        self.inner
            .behavior
            .lock()
            .failures
            .entry(relation.to_string())
            .or_default()
            .push_back(message.to_string());
    }

    /// Every read issued so far, in call order.
    pub fn calls(&self) -> Vec<TableQuery> {
        self.inner.calls.lock().clone()
    }

    /// Reads issued against `relation`.
    pub fn calls_for(&self, relation: &str) -> Vec<TableQuery> {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|q| q.relation() == relation)
            .cloned()
            .collect()
    }

    pub fn row_count(&self, relation: &str) -> usize {
        self.inner
            .tables
            .read()
            .get(relation)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Consume this call's delay and failure for `relation`.
    fn take_behavior(&self, relation: &str) -> (Option<Duration>, Option<String>) {
        let mut guard = self.inner.behavior.lock();
        let behavior = &mut *guard;
        let delay = behavior
            .delays
            .get_mut(relation)
            .and_then(VecDeque::pop_front)
            .or_else(|| behavior.latency.get(relation).copied());
        let failure = behavior
            .failures
            .get_mut(relation)
            .and_then(VecDeque::pop_front);
        (delay, failure)
    }

    async fn simulate_call(&self, relation: &str) -> Result<()> {
        let (delay, failure) = self.take_behavior(relation);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(message) => Err(DocketError::query_failed(relation, message)),
            None => Ok(()),
        }
    }

    fn notify(&self, relation: &str, kind: ChangeKind, row: Row) {
        // No receivers is fine: nobody is subscribed yet
        let _ = self.inner.changes.send(ChangeEvent {
            relation: relation.to_string(),
            kind,
            row,
        });
    }

    fn is_duplicate(&self, relation: &str, rows: &[Row], row: &Row) -> bool {
        let keys = self.inner.unique_keys.read();
        keys.get(relation).is_some_and(|columns| {
            rows.iter()
                .any(|existing| columns.iter().all(|c| existing.get(c) == row.get(c)))
        })
    }
}

impl DataService for MemoryService {
    async fn select(&self, query: &TableQuery) -> Result<Vec<Row>> {
        self.inner.calls.lock().push(query.clone());
        self.simulate_call(query.relation()).await?;

        let tables = self.inner.tables.read();
        Ok(tables
            .get(query.relation())
            .map(|rows| query.apply(rows))
            .unwrap_or_default())
    }

    async fn insert(&self, relation: &str, mut row: Row) -> Result<Row> {
        self.simulate_call(relation).await?;

        if let Value::Object(map) = &mut row {
            map.entry("id")
                .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        }

        {
            let mut tables = self.inner.tables.write();
            let rows = tables.entry(relation.to_string()).or_default();
            if self.is_duplicate(relation, rows, &row) {
                return Err(DocketError::UniqueViolation {
                    relation: relation.to_string(),
                });
            }
            rows.push(row.clone());
        }
        self.notify(relation, ChangeKind::Insert, row.clone());
        Ok(row)
    }

    async fn delete(&self, query: &TableQuery) -> Result<usize> {
        self.simulate_call(query.relation()).await?;

        let removed: Vec<Row> = {
            let mut tables = self.inner.tables.write();
            let Some(rows) = tables.get_mut(query.relation()) else {
                return Ok(0);
            };
            let (removed, kept): (Vec<Row>, Vec<Row>) = std::mem::take(rows)
                .into_iter()
                .partition(|row| query.matches(row));
            *rows = kept;
            removed
        };

        let count = removed.len();
        for row in removed {
            self.notify(query.relation(), ChangeKind::Delete, row);
        }
        Ok(count)
    }

    async fn subscribe(&self, relation: &str, filter: Predicate) -> Result<ChangeStream> {
        if *self.inner.feeds_closed.borrow() {
            return Err(DocketError::SubscriptionClosed(relation.to_string()));
        }
        let mut changes = self.inner.changes.subscribe();
        let mut closed = self.inner.feeds_closed.subscribe();
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        let relation = relation.to_string();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = closed.changed() => break,
                    received = changes.recv() => received,
                };
                match received {
                    Ok(event) => {
                        if event.relation != relation || !filter.matches(&event.row) {
                            continue;
                        }
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("change feed for '{}' skipped {} events", relation, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }
}
