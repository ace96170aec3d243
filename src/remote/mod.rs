//! Data service access.
//!
//! The hosted database is reached through the [`DataService`] trait: bounded
//! table reads, single-row writes and a change subscription. The PostgREST
//! client talks to the real service; [`MemoryService`] evaluates the same
//! queries over in-process tables for tests and offline use.

pub mod error;
pub mod memory;
pub mod postgrest;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::error::{DocketError, Result};
use crate::query::{Predicate, TableQuery};

pub use error::{ApiError, AsHttpError};
pub use memory::MemoryService;
pub use postgrest::PostgrestClient;

/// One row as returned by the service
pub type Row = serde_json::Value;

/// Buffered change notifications per subscription
pub const CHANGE_CHANNEL_CAPACITY: usize = 100;

/// Maximum attempts for a retried request (initial attempt included)
const MAX_ATTEMPTS: u32 = 4;

/// First backoff delay; doubled on every retry
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Delete,
}

/// A confirmed change to a subscribed relation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub relation: String,
    pub kind: ChangeKind,
    pub row: Row,
}

/// Receiving end of a change subscription. Dropping it ends the subscription.
pub type ChangeStream = mpsc::Receiver<ChangeEvent>;

/// Common interface for the hosted table service
pub trait DataService: Send + Sync + 'static {
    /// Run a bounded read. Zero rows is `Ok(vec![])`, never an error.
    fn select(&self, query: &TableQuery) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Insert one row, returning the stored row.
    ///
    /// A row that violates a uniqueness constraint fails with
    /// [`DocketError::UniqueViolation`].
    fn insert(&self, relation: &str, row: Row) -> impl Future<Output = Result<Row>> + Send;

    /// Delete the rows matching `query`'s predicates, returning how many went.
    fn delete(&self, query: &TableQuery) -> impl Future<Output = Result<usize>> + Send;

    /// Subscribe to inserts and deletes on `relation` rows matching `filter`.
    fn subscribe(
        &self,
        relation: &str,
        filter: Predicate,
    ) -> impl Future<Output = Result<ChangeStream>> + Send;
}

impl<S: DataService> DataService for Arc<S> {
    fn select(&self, query: &TableQuery) -> impl Future<Output = Result<Vec<Row>>> + Send {
        (**self).select(query)
    }

    fn insert(&self, relation: &str, row: Row) -> impl Future<Output = Result<Row>> + Send {
        (**self).insert(relation, row)
    }

    fn delete(&self, query: &TableQuery) -> impl Future<Output = Result<usize>> + Send {
        (**self).delete(query)
    }

    fn subscribe(
        &self,
        relation: &str,
        filter: Predicate,
    ) -> impl Future<Output = Result<ChangeStream>> + Send {
        (**self).subscribe(relation, filter)
    }
}

/// The data service selected at startup: the hosted service, or in-process
/// tables loaded from a fixture file.
#[derive(Debug, Clone)]
pub enum Backend {
    Remote(PostgrestClient),
    Memory(MemoryService),
}

impl Backend {
    /// Connect to the configured service, or load `fixture` when given.
    pub fn connect(config: &crate::config::Config, fixture: Option<&std::path::Path>) -> Result<Self> {
        match fixture {
            Some(path) => {
                tracing::debug!("using fixture backend {}", path.display());
                Ok(Backend::Memory(MemoryService::from_fixture(path)?))
            }
            None => Ok(Backend::Remote(PostgrestClient::from_config(config)?)),
        }
    }
}

impl DataService for Backend {
    async fn select(&self, query: &TableQuery) -> Result<Vec<Row>> {
        match self {
            Backend::Remote(client) => client.select(query).await,
            Backend::Memory(memory) => memory.select(query).await,
        }
    }

    async fn insert(&self, relation: &str, row: Row) -> Result<Row> {
        match self {
            Backend::Remote(client) => client.insert(relation, row).await,
            Backend::Memory(memory) => memory.insert(relation, row).await,
        }
    }

    async fn delete(&self, query: &TableQuery) -> Result<usize> {
        match self {
            Backend::Remote(client) => client.delete(query).await,
            Backend::Memory(memory) => memory.delete(query).await,
        }
    }

    async fn subscribe(&self, relation: &str, filter: Predicate) -> Result<ChangeStream> {
        match self {
            Backend::Remote(client) => client.subscribe(relation, filter).await,
            Backend::Memory(memory) => memory.subscribe(relation, filter).await,
        }
    }
}

/// Deserialize service rows into typed records.
pub fn decode_rows<T: DeserializeOwned>(relation: &str, rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|source| DocketError::Decode {
                relation: relation.to_string(),
                source,
            })
        })
        .collect()
}

/// Run `operation`, retrying transient and rate-limited failures.
///
/// Rate-limited responses wait for their `Retry-After`; other transient
/// failures back off exponentially. Permanent failures return immediately.
pub async fn execute_with_retry<F, Fut, T, E>(mut operation: F) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: AsHttpError + std::fmt::Display,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_ATTEMPTS && (err.is_transient() || err.is_rate_limited()) => {
                let wait = err.get_retry_after().unwrap_or(backoff);
                tracing::warn!(
                    "request failed (attempt {}/{}), retrying in {:?}: {}",
                    attempt,
                    MAX_ATTEMPTS,
                    wait,
                    err
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
