//! Client-side post-aggregation.
//!
//! Counts that the data service cannot return alongside a page (how many
//! dockets an organization petitions) are derived here from a bounded
//! auxiliary lookup: collect the page's keys, query the link relation in
//! chunks of [`CHUNK_SIZE`] keys through [`read_by_keys`], and fold the returned rows into
//! `key -> count` by associative increment. The fold is order independent,
//! so chunk results can be merged in any order.
//!
//! [`summarize`] is the explicit aggregate-only mode: it bypasses pagination
//! and reads the whole filtered set in fixed-size chunks to produce summary
//! statistics.

use std::collections::{BTreeMap, HashMap};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{DocketError, Result};
use crate::query::{SortDirection, TableQuery};
use crate::remote::{DataService, Row};

/// Keys per auxiliary lookup request
pub const CHUNK_SIZE: usize = 50;

/// Chunk lookups in flight at once
const CHUNK_CONCURRENCY: usize = 4;

/// Rows per request when reading a whole filtered set
pub const READ_CHUNK_ROWS: usize = 1000;

/// Label for rows whose grouping column is empty
const NONE_LABEL: &str = "(none)";

/// What a derived count is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CountScope {
    /// Counts and count ordering cover only the loaded page window
    #[default]
    #[serde(rename = "page")]
    PageWindow,
    /// Counts cover the whole link relation, read once and cached
    #[serde(rename = "corpus")]
    FullCorpus,
}

enum_display_fromstr!(
    CountScope,
    DocketError::invalid_aggregate_scope,
    {
        PageWindow => "page" | "window",
        FullCorpus => "corpus" | "full",
    }
);

/// Fold key values into counts. Associative and commutative.
pub fn fold_counts<I, S>(counts: &mut HashMap<String, u64>, keys: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for key in keys {
        *counts.entry(key.as_ref().to_string()).or_insert(0) += 1;
    }
}

/// Merge `other` into `counts`.
pub fn merge_counts(counts: &mut HashMap<String, u64>, other: HashMap<String, u64>) {
    for (key, n) in other {
        *counts.entry(key).or_insert(0) += n;
    }
}

fn column_text(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Count `relation` rows per value of `key_column` for the given `keys`.
///
/// Every requested key appears in the result, with zero when it has no rows.
pub async fn count_by_key<S: DataService>(
    service: &S,
    relation: &str,
    key_column: &str,
    keys: &[String],
    chunk_size: usize,
) -> Result<HashMap<String, u64>> {
    let mut counts: HashMap<String, u64> = keys.iter().map(|k| (k.clone(), 0)).collect();
    let query = TableQuery::new(relation)
        .select(key_column)
        .order_by(key_column, SortDirection::Asc);
    let rows = read_by_keys(service, &query, key_column, keys, chunk_size).await?;

    let mut found = HashMap::new();
    fold_counts(
        &mut found,
        rows.iter().filter_map(|row| column_text(row, key_column)),
    );
    merge_counts(&mut counts, found);
    Ok(counts)
}

/// Read the rows of `query` whose `key_column` is one of `keys`.
///
/// Keys are deduplicated and sent `chunk_size` per request, with up to
/// [`CHUNK_CONCURRENCY`] requests in flight. Each chunk is read in windows of
/// [`READ_CHUNK_ROWS`], so `query` must carry a total order. Rows come back
/// grouped by chunk, in no particular chunk order.
pub async fn read_by_keys<S: DataService>(
    service: &S,
    query: &TableQuery,
    key_column: &str,
    keys: &[String],
    chunk_size: usize,
) -> Result<Vec<Row>> {
    let mut unique: Vec<String> = keys.to_vec();
    unique.sort();
    unique.dedup();

    let chunk_size = chunk_size.max(1);
    let chunks: Vec<Vec<String>> = unique.chunks(chunk_size).map(<[String]>::to_vec).collect();
    let requests = chunks.len();

    let results: Vec<Result<Vec<Row>>> = stream::iter(chunks)
        .map(move |chunk| {
            let query = query.clone().in_list(key_column, chunk);
            async move { read_all(service, &query, READ_CHUNK_ROWS).await }
        })
        .buffer_unordered(CHUNK_CONCURRENCY)
        .collect()
        .await;

    let mut rows = Vec::new();
    for chunk in results {
        rows.extend(chunk?);
    }

    tracing::debug!(
        "read {} keys of '{}' in {} chunk(s)",
        unique.len(),
        query.relation(),
        requests
    );
    Ok(rows)
}

/// Count every row of `relation` per value of `key_column`.
pub async fn count_all<S: DataService>(
    service: &S,
    relation: &str,
    key_column: &str,
    chunk_rows: usize,
) -> Result<HashMap<String, u64>> {
    let query = TableQuery::new(relation)
        .select(key_column)
        .order_by(key_column, SortDirection::Asc);
    let rows = read_all(service, &query, chunk_rows).await?;

    let mut counts = HashMap::new();
    fold_counts(
        &mut counts,
        rows.iter().filter_map(|row| column_text(row, key_column)),
    );
    Ok(counts)
}

/// Read every row matching `query`, `chunk_rows` rows per request.
///
/// `query` must carry a total order for the chunks to be disjoint.
pub async fn read_all<S: DataService>(
    service: &S,
    query: &TableQuery,
    chunk_rows: usize,
) -> Result<Vec<Row>> {
    let chunk_rows = chunk_rows.max(1);
    let mut rows = Vec::new();
    let mut offset = 0;

    loop {
        let chunk = service
            .select(&query.clone().range(offset, chunk_rows))
            .await?;
        let len = chunk.len();
        rows.extend(chunk);
        if len < chunk_rows {
            break;
        }
        offset += chunk_rows;
    }
    Ok(rows)
}

/// Summary statistics over a whole filtered set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    /// Per grouping column, row count per value
    pub groups: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Aggregate-only mode: count the rows matching `query` grouped by each of
/// `group_by`, without paginating for display.
pub async fn summarize<S: DataService>(
    service: &S,
    query: &TableQuery,
    group_by: &[&str],
    chunk_rows: usize,
) -> Result<Summary> {
    let rows = read_all(service, query, chunk_rows).await?;

    let mut summary = Summary {
        total: rows.len(),
        groups: group_by
            .iter()
            .map(|c| (c.to_string(), BTreeMap::new()))
            .collect(),
    };
    for row in &rows {
        for column in group_by {
            let value = column_text(row, column).unwrap_or_else(|| NONE_LABEL.to_string());
            if let Some(group) = summary.groups.get_mut(*column) {
                *group.entry(value).or_insert(0) += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::query::Predicate;
    use crate::remote::MemoryService;
    use crate::types::ORGANIZATION_DOCKETS;

    fn links(pairs: &[(&str, &str)]) -> Vec<Row> {
        pairs
            .iter()
            .map(|(org, docket)| json!({"organization_uuid": org, "docket_uuid": docket}))
            .collect()
    }

    #[test]
    fn test_fold_is_order_independent() {
        let mut forward = HashMap::new();
        fold_counts(&mut forward, ["a", "b", "a"]);

        let mut split = HashMap::new();
        let mut second = HashMap::new();
        fold_counts(&mut second, ["a"]);
        fold_counts(&mut split, ["b", "a"]);
        merge_counts(&mut split, second);

        assert_eq!(forward, split);
        assert_eq!(forward["a"], 2);
    }

    #[test]
    fn test_count_scope_parsing() {
        assert_eq!("corpus".parse::<CountScope>().unwrap(), CountScope::FullCorpus);
        assert_eq!("Window".parse::<CountScope>().unwrap(), CountScope::PageWindow);
        assert_eq!(CountScope::PageWindow.to_string(), "page");
        assert!("everything".parse::<CountScope>().is_err());
    }

    #[tokio::test]
    async fn test_count_by_key_batches_in_chunks() {
        let service = MemoryService::new().with_table(
            ORGANIZATION_DOCKETS,
            links(&[("o1", "d1"), ("o1", "d2"), ("o2", "d1"), ("o9", "d3")]),
        );
        let keys: Vec<String> = (0..120).map(|i| format!("o{i}")).collect();

        let counts = count_by_key(&service, ORGANIZATION_DOCKETS, "organization_uuid", &keys, 50)
            .await
            .unwrap();

        assert_eq!(counts.len(), 120);
        assert_eq!(counts["o1"], 2);
        assert_eq!(counts["o2"], 1);
        assert_eq!(counts["o9"], 1);
        assert_eq!(counts["o100"], 0);
        assert_eq!(service.calls_for(ORGANIZATION_DOCKETS).len(), 3);
    }

    #[tokio::test]
    async fn test_read_by_keys_sends_bounded_windowed_chunks() {
        let attachments: Vec<Row> = (0..300)
            .map(|i| json!({"uuid": format!("a{i:03}"), "filing_uuid": format!("f{i:03}")}))
            .collect();
        let service = MemoryService::new().with_table("attachments", attachments);
        let keys: Vec<String> = (0..300).map(|i| format!("f{i:03}")).collect();
        let query = TableQuery::new("attachments").order_by("uuid", SortDirection::Asc);

        let rows = read_by_keys(&service, &query, "filing_uuid", &keys, 50)
            .await
            .unwrap();
        assert_eq!(rows.len(), 300);

        let calls = service.calls_for("attachments");
        assert_eq!(calls.len(), 6);
        for call in &calls {
            assert_eq!(call.offset(), Some(0));
            let keys_sent = call
                .predicates()
                .iter()
                .find_map(|p| match p {
                    Predicate::In { values, .. } => Some(values.len()),
                    _ => None,
                })
                .unwrap();
            assert!(keys_sent <= 50);
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    fn count_future_is_send<S: DataService>(service: &S, keys: &[String]) {
        assert_send(&count_by_key(service, ORGANIZATION_DOCKETS, "organization_uuid", keys, 50));
    }

    #[test]
    fn test_count_by_key_future_is_send() {
        count_future_is_send(&MemoryService::new(), &["o1".to_string()]);
    }

    #[tokio::test]
    async fn test_count_by_key_with_no_keys_issues_no_request() {
        let service = MemoryService::new();
        let counts = count_by_key(&service, ORGANIZATION_DOCKETS, "organization_uuid", &[], 50)
            .await
            .unwrap();
        assert!(counts.is_empty());
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_all_walks_fixed_chunks() {
        let rows: Vec<Row> = (0..25).map(|i| json!({"uuid": format!("{i:03}")})).collect();
        let service = MemoryService::new().with_table("dockets", rows);
        let query = TableQuery::new("dockets").order_by("uuid", SortDirection::Asc);

        let all = read_all(&service, &query, 10).await.unwrap();
        assert_eq!(all.len(), 25);
        assert_eq!(all[24]["uuid"], "024");

        let offsets: Vec<Option<usize>> =
            service.calls().iter().map(TableQuery::offset).collect();
        assert_eq!(offsets, vec![Some(0), Some(10), Some(20)]);
    }

    #[tokio::test]
    async fn test_summarize_groups_filtered_set() {
        let service = MemoryService::new().with_table(
            "dockets",
            vec![
                json!({"uuid": "1", "industry": "Electric", "current_status": "open"}),
                json!({"uuid": "2", "industry": "Electric", "current_status": "closed"}),
                json!({"uuid": "3", "industry": "Gas", "current_status": "open"}),
                json!({"uuid": "4", "industry": null, "current_status": "open"}),
            ],
        );
        let query = TableQuery::new("dockets")
            .eq("current_status", "open")
            .order_by("uuid", SortDirection::Asc);

        let summary = summarize(&service, &query, &["industry"], 2).await.unwrap();
        assert_eq!(summary.total, 3);
        let industry = &summary.groups["industry"];
        assert_eq!(industry["Electric"], 1);
        assert_eq!(industry["Gas"], 1);
        assert_eq!(industry["(none)"], 1);
    }
}
