//! PostgREST data service client.
//!
//! # Security Note - Logging
//!
//! The API key travels in both the `apikey` and `Authorization` headers. It is
//! held as a [`SecretString`] and wrapped in [`RedactedHeader`] while building
//! requests so that debug output never contains the raw key.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use url::Url;

use crate::config::Config;
use crate::error::{DocketError, Result};
use crate::query::{Predicate, TableQuery};

use super::error::{ApiError, PostgrestErrorBody};
use super::{
    CHANGE_CHANNEL_CAPACITY, ChangeEvent, ChangeKind, ChangeStream, DataService, Row,
    execute_with_retry,
};

/// Path of the REST endpoint below the project URL
const REST_PATH: &str = "rest/v1/";

/// Consecutive failed polls after which a change feed ends
const MAX_POLL_FAILURES: u32 = 5;

/// Wrapper for sensitive header values that redacts the value when formatted.
struct RedactedHeader {
    value: String,
}

impl RedactedHeader {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }

    fn as_header_value(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&self.value)
            .map_err(|_| DocketError::Config("API key contains invalid characters".to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Display for RedactedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Debug for RedactedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedactedHeader")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

struct ClientInner {
    client: Client,
    rest_url: Url,
    api_key: SecretString,
    poll_interval: Duration,
}

/// [`DataService`] backed by a PostgREST endpoint. Cloning is cheap.
#[derive(Clone)]
pub struct PostgrestClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for PostgrestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgrestClient")
            .field("rest_url", &self.inner.rest_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl PostgrestClient {
    /// Create a client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config.api_url().ok_or_else(|| {
            DocketError::Config(
                "API URL not configured. Set DOCKETS_API_URL or run: dockets config set api.url <url>"
                    .to_string(),
            )
        })?;
        let key = config.api_key().ok_or_else(|| {
            DocketError::Auth(
                "API key not configured. Set DOCKETS_API_KEY or run: dockets config set api.key <key>"
                    .to_string(),
            )
        })?;

        Self::build(
            &url,
            &key,
            Duration::from_secs(config.remote_timeout),
            Duration::from_millis(config.realtime.poll_interval_ms),
        )
    }

    /// Create a client for `project_url` with default timeouts
    pub fn new(project_url: &str, api_key: &str) -> Result<Self> {
        Self::build(
            project_url,
            api_key,
            Duration::from_secs(30),
            Duration::from_secs(2),
        )
    }

    fn build(
        project_url: &str,
        api_key: &str,
        connect_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self> {
        RedactedHeader::new(api_key).as_header_value()?;

        // Requests have no overall deadline; only connecting is bounded
        let client = Client::builder().connect_timeout(connect_timeout).build()?;

        let mut base = Url::parse(project_url)?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let rest_url = base.join(REST_PATH)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                client,
                rest_url,
                api_key: SecretString::from(api_key.to_string()),
                poll_interval,
            }),
        })
    }

    fn endpoint(&self, relation: &str) -> Result<Url> {
        Ok(self.inner.rest_url.join(relation)?)
    }

    fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let key = RedactedHeader::new(self.inner.api_key.expose_secret());
        let bearer = RedactedHeader::new(&format!("Bearer {}", self.inner.api_key.expose_secret()));
        Ok(self
            .inner
            .client
            .request(method, url)
            .header("apikey", key.as_header_value()?)
            .header(header::AUTHORIZATION, bearer.as_header_value()?)
            .header(header::ACCEPT, HeaderValue::from_static("application/json")))
    }

    /// Send with retries, turning non-success statuses into [`ApiError`].
    async fn send<F>(&self, relation: &str, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder>,
    {
        let build = &build;
        let response = execute_with_retry(move || async move {
            let request = build().map_err(|e| ApiError::new(relation, e.to_string()));
            let response = request?
                .send()
                .await
                .map_err(|e| ApiError::new(relation, e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let body = response.json::<PostgrestErrorBody>().await.ok();
            Err(ApiError::with_status(relation, status, body).with_retry_after(retry_after))
        })
        .await?;

        Ok(response)
    }

    async fn fetch_rows(&self, query: &TableQuery) -> Result<Vec<Row>> {
        let relation = query.relation();
        let url = self.endpoint(relation)?;
        let params = query.to_params();

        let response = self
            .send(relation, || {
                Ok(self.request(Method::GET, url.clone())?.query(&params))
            })
            .await?;

        response
            .json::<Vec<Row>>()
            .await
            .map_err(|e| DocketError::query_failed(relation, format!("invalid response: {e}")))
    }
}

impl DataService for PostgrestClient {
    async fn select(&self, query: &TableQuery) -> Result<Vec<Row>> {
        tracing::debug!("select {}", query.relation());
        self.fetch_rows(query).await
    }

    async fn insert(&self, relation: &str, row: Row) -> Result<Row> {
        let url = self.endpoint(relation)?;

        let response = self
            .send(relation, || {
                Ok(self
                    .request(Method::POST, url.clone())?
                    .header("Prefer", "return=representation")
                    .json(&row))
            })
            .await?;

        let mut rows: Vec<Row> = response.json().await?;
        rows.pop()
            .ok_or_else(|| DocketError::Api(format!("insert into '{relation}' returned no row")))
    }

    async fn delete(&self, query: &TableQuery) -> Result<usize> {
        let relation = query.relation();
        if query.predicates().is_empty() {
            return Err(DocketError::InvalidInput(format!(
                "refusing to delete every row of '{relation}'"
            )));
        }
        let url = self.endpoint(relation)?;
        let params: Vec<(String, String)> = query
            .predicates()
            .iter()
            .map(Predicate::to_param)
            .collect();

        let response = self
            .send(relation, || {
                Ok(self
                    .request(Method::DELETE, url.clone())?
                    .header("Prefer", "return=representation")
                    .query(&params))
            })
            .await?;

        let rows: Vec<Row> = response.json().await?;
        Ok(rows.len())
    }

    /// Change feed by polling: the filtered row set is re-read every poll
    /// interval and diffed against the previous snapshot.
    async fn subscribe(&self, relation: &str, filter: Predicate) -> Result<ChangeStream> {
        let query = TableQuery::new(relation).filter(filter);
        let mut known = snapshot(self.fetch_rows(&query).await?);

        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        let client = self.clone();
        let relation = relation.to_string();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(client.inner.poll_interval);
            interval.tick().await;
            let mut failures = 0;

            loop {
                interval.tick().await;
                if tx.is_closed() {
                    break;
                }

                let rows = match client.fetch_rows(&query).await {
                    Ok(rows) => {
                        failures = 0;
                        rows
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::warn!("change feed poll for '{}' failed: {}", relation, e);
                        if failures >= MAX_POLL_FAILURES {
                            tracing::warn!(
                                "closing change feed for '{}' after {} failed polls",
                                relation,
                                failures
                            );
                            break;
                        }
                        continue;
                    }
                };
                let current = snapshot(rows);

                let events = diff_snapshots(&relation, &known, &current);
                known = current;
                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Rows keyed by their canonical JSON text.
fn snapshot(rows: Vec<Row>) -> Vec<(String, Row)> {
    rows.into_iter()
        .map(|row| (row.to_string(), row))
        .collect()
}

fn diff_snapshots(
    relation: &str,
    before: &[(String, Row)],
    after: &[(String, Row)],
) -> Vec<ChangeEvent> {
    let before_keys: HashSet<&str> = before.iter().map(|(k, _)| k.as_str()).collect();
    let after_keys: HashSet<&str> = after.iter().map(|(k, _)| k.as_str()).collect();

    let deleted = before
        .iter()
        .filter(|(k, _)| !after_keys.contains(k.as_str()))
        .map(|(_, row)| (ChangeKind::Delete, row));
    let inserted = after
        .iter()
        .filter(|(k, _)| !before_keys.contains(k.as_str()))
        .map(|(_, row)| (ChangeKind::Insert, row));

    deleted
        .chain(inserted)
        .map(|(kind, row)| ChangeEvent {
            relation: relation.to_string(),
            kind,
            row: row.clone(),
        })
        .collect()
}
