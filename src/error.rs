use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocketError {
    #[error("invalid sort field '{0}'")]
    InvalidSortField(String),

    #[error("invalid sort direction '{0}', expected 'asc' or 'desc'")]
    InvalidSortDirection(String),

    #[error("invalid date preset '{0}', expected 'any', 'last-<N>-days' or 'year:<YYYY>'")]
    InvalidDatePreset(String),

    #[error("invalid aggregate scope '{0}', expected 'page' or 'corpus'")]
    InvalidAggregateScope(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Remote data service errors
    #[error("query on '{relation}' failed: {message}")]
    QueryFailed { relation: String, message: String },

    #[error("row already exists in '{relation}'")]
    UniqueViolation { relation: String },

    #[error("could not decode '{relation}' row: {source}")]
    Decode {
        relation: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Fetch(std::sync::Arc<DocketError>),

    #[error("subscription to '{0}' closed")]
    SubscriptionClosed(String),

    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl DocketError {
    pub fn invalid_sort_field(s: String) -> Self {
        DocketError::InvalidSortField(s)
    }

    pub fn invalid_sort_direction(s: String) -> Self {
        DocketError::InvalidSortDirection(s)
    }

    pub fn invalid_aggregate_scope(s: String) -> Self {
        DocketError::InvalidAggregateScope(s)
    }

    /// Wrap a failure of the remote table query itself.
    pub fn query_failed(relation: &str, message: impl Into<String>) -> Self {
        DocketError::QueryFailed {
            relation: relation.to_string(),
            message: message.into(),
        }
    }

    /// True for a write rejected because the row already exists.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DocketError::UniqueViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, DocketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_is_distinguishable() {
        let conflict = DocketError::UniqueViolation {
            relation: "favorites".to_string(),
        };
        assert!(conflict.is_unique_violation());

        let failure = DocketError::query_failed("favorites", "connection reset");
        assert!(!failure.is_unique_violation());
        assert_eq!(
            failure.to_string(),
            "query on 'favorites' failed: connection reset"
        );
    }
}
