//! Page fetchers: one bounded query per page.
//!
//! A fetcher turns the listing state plus a zero-based page index into a
//! single windowed read of at most `page_size` rows. A short page is the only
//! end-of-list signal; no total count is ever requested.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::aggregate::{self, CountScope, READ_CHUNK_ROWS};
use crate::error::{DocketError, Result};
use crate::lookup::LookupCache;
use crate::query::{ListingParams, SortDirection, SortField, SortSpec, TableQuery};
use crate::remote::{DataService, decode_rows};
use crate::types::{
    DOCKETS, Docket, FILINGS, Filing, ORGANIZATION_DOCKETS, ORGANIZATIONS, Organization,
    OrganizationSummary,
};

/// Source of pages for one listing.
pub trait PageFetcher: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    fn relation(&self) -> &'static str;

    /// Sort fields this listing can order by.
    fn sort_fields(&self) -> &'static [SortField];

    fn default_sort(&self) -> SortSpec;

    /// Fetch page `page` (zero-based). Zero rows is `Ok(vec![])`.
    fn fetch_page(
        &self,
        params: &ListingParams,
        page: usize,
        page_size: usize,
    ) -> impl Future<Output = Result<Vec<Self::Item>>> + Send;
}

/// Column layout of one listing's relation.
struct Columns {
    search: &'static [&'static str],
    date: &'static str,
    /// Array columns, filtered by overlap instead of membership
    arrays: &'static [&'static str],
}

/// Filters, search and date range of `params`, without order or window.
fn filtered_query(relation: &str, columns: &Columns, params: &ListingParams) -> TableQuery {
    let mut query = TableQuery::new(relation);

    if !params.search.is_empty() {
        query = query.search(columns.search, &params.search);
    }

    for (column, values) in params.active_filters() {
        let values: Vec<String> = values.iter().cloned().collect();
        query = if columns.arrays.contains(&column) {
            query.overlaps(column, values)
        } else {
            query.in_list(column, values)
        };
    }

    if let Some(range) = params.date_range {
        if let Some(from) = range.from {
            query = query.gte(columns.date, from.to_string());
        }
        if let Some(to) = range.to {
            query = query.lte(columns.date, to.to_string());
        }
    }

    query
}

/// Server-side order for `sort`, with `uuid` as the tiebreak so that offset
/// windows never overlap or skip rows.
fn ordered(query: TableQuery, sort: SortSpec) -> TableQuery {
    let query = match sort.field.column() {
        Some(column) => query.order_by(column, sort.direction),
        None => query,
    };
    query.order_by("uuid", SortDirection::Asc)
}

fn check_sort(fields: &[SortField], sort: SortSpec) -> Result<()> {
    if fields.contains(&sort.field) {
        Ok(())
    } else {
        Err(DocketError::InvalidSortField(sort.field.to_string()))
    }
}

const DOCKET_COLUMNS: Columns = Columns {
    search: &["docket_title", "docket_govid", "petitioner"],
    date: "opened_date",
    arrays: &[],
};

/// Docket listing: search on title, government id and petitioner; category
/// filters such as `industry` or `current_status`; opened-date range.
#[derive(Debug, Clone)]
pub struct DocketPages<S> {
    service: S,
}

impl<S: DataService> DocketPages<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// The query for page `page`, exposed for inspection.
    pub fn page_query(&self, params: &ListingParams, page: usize, page_size: usize) -> TableQuery {
        ordered(filtered_query(DOCKETS, &DOCKET_COLUMNS, params), params.sort)
            .range(page * page_size, page_size)
    }

    /// Every docket matching `params`, in `uuid` order, for aggregate reads.
    pub fn aggregate_query(&self, params: &ListingParams) -> TableQuery {
        filtered_query(DOCKETS, &DOCKET_COLUMNS, params).order_by("uuid", SortDirection::Asc)
    }

    pub fn service(&self) -> &S {
        &self.service
    }
}

impl<S: DataService> PageFetcher for DocketPages<S> {
    type Item = Docket;

    fn relation(&self) -> &'static str {
        DOCKETS
    }

    fn sort_fields(&self) -> &'static [SortField] {
        &[
            SortField::OpenedDate,
            SortField::ClosedDate,
            SortField::Title,
            SortField::DocketId,
        ]
    }

    fn default_sort(&self) -> SortSpec {
        SortSpec::by(SortField::OpenedDate)
    }

    async fn fetch_page(
        &self,
        params: &ListingParams,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Docket>> {
        check_sort(self.sort_fields(), params.sort)?;
        let rows = self
            .service
            .select(&self.page_query(params, page, page_size))
            .await?;
        decode_rows(DOCKETS, rows)
    }
}

const FILING_COLUMNS: Columns = Columns {
    search: &["name", "description"],
    date: "filed_date",
    arrays: &["organization_authors"],
};

/// Filings of one docket: `filing_type` and `organization_authors` filters,
/// filed-date range, search on name and description.
#[derive(Debug, Clone)]
pub struct FilingPages<S> {
    service: S,
    docket_uuid: String,
}

impl<S: DataService> FilingPages<S> {
    pub fn new(service: S, docket_uuid: &str) -> Self {
        Self {
            service,
            docket_uuid: docket_uuid.to_string(),
        }
    }

    pub fn page_query(&self, params: &ListingParams, page: usize, page_size: usize) -> TableQuery {
        let query = filtered_query(FILINGS, &FILING_COLUMNS, params).eq("docket_uuid", &*self.docket_uuid);
        ordered(query, params.sort).range(page * page_size, page_size)
    }
}

impl<S: DataService> PageFetcher for FilingPages<S> {
    type Item = Filing;

    fn relation(&self) -> &'static str {
        FILINGS
    }

    fn sort_fields(&self) -> &'static [SortField] {
        &[SortField::FiledDate, SortField::Name]
    }

    fn default_sort(&self) -> SortSpec {
        SortSpec::by(SortField::FiledDate)
    }

    async fn fetch_page(
        &self,
        params: &ListingParams,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Filing>> {
        check_sort(self.sort_fields(), params.sort)?;
        let rows = self
            .service
            .select(&self.page_query(params, page, page_size))
            .await?;
        decode_rows(FILINGS, rows)
    }
}

const ORGANIZATION_COLUMNS: Columns = Columns {
    search: &["name"],
    date: "created_at",
    arrays: &["aliases"],
};

/// Organizations with their derived docket counts.
///
/// With [`CountScope::PageWindow`] each page is read in name order and the
/// counts come from one chunked lookup restricted to the page's UUIDs; a
/// `docket_count` sort reorders rows within the page only. With
/// [`CountScope::FullCorpus`] the whole link relation is counted once per
/// fetcher, so a `docket_count` sort is global.
pub struct OrganizationPages<S> {
    service: S,
    scope: CountScope,
    chunk_size: usize,
    counts: Arc<LookupCache<String, u64>>,
    corpus: OnceCell<HashMap<String, u64>>,
}

impl<S: DataService> OrganizationPages<S> {
    pub fn new(service: S, scope: CountScope, counts: Arc<LookupCache<String, u64>>) -> Self {
        Self {
            service,
            scope,
            chunk_size: aggregate::CHUNK_SIZE,
            counts,
            corpus: OnceCell::new(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn scope(&self) -> CountScope {
        self.scope
    }

    fn base_query(params: &ListingParams) -> TableQuery {
        filtered_query(ORGANIZATIONS, &ORGANIZATION_COLUMNS, params)
    }

    /// Server order: the requested column, or name for derived sorts.
    fn server_sort(sort: SortSpec) -> SortSpec {
        match sort.field {
            SortField::DocketCount => SortSpec::new(SortField::Name, SortDirection::Asc),
            _ => sort,
        }
    }

    async fn corpus_counts(&self) -> Result<&HashMap<String, u64>> {
        self.corpus
            .get_or_try_init(|| async {
                let counts = aggregate::count_all(
                    &self.service,
                    ORGANIZATION_DOCKETS,
                    "organization_uuid",
                    READ_CHUNK_ROWS,
                )
                .await?;
                self.counts
                    .extend(counts.iter().map(|(k, v)| (k.clone(), *v)));
                Ok::<_, DocketError>(counts)
            })
            .await
    }

    /// Counts for `organizations`, from the cache where possible.
    async fn page_counts(&self, organizations: &[Organization]) -> Result<HashMap<String, u64>> {
        let uuids: Vec<String> = organizations.iter().map(|o| o.uuid.clone()).collect();
        let (mut found, missing) = self.counts.partition(uuids.iter());

        if !missing.is_empty() {
            let fetched = aggregate::count_by_key(
                &self.service,
                ORGANIZATION_DOCKETS,
                "organization_uuid",
                &missing,
                self.chunk_size,
            )
            .await?;
            self.counts
                .extend(fetched.iter().map(|(k, v)| (k.clone(), *v)));
            found.extend(fetched);
        }
        Ok(found)
    }

    async fn fetch_corpus_ranked(
        &self,
        params: &ListingParams,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<OrganizationSummary>> {
        let counts = self.corpus_counts().await?;
        let query = ordered(Self::base_query(params), Self::server_sort(params.sort));
        let rows = aggregate::read_all(&self.service, &query, READ_CHUNK_ROWS).await?;
        let organizations: Vec<Organization> = decode_rows(ORGANIZATIONS, rows)?;

        let mut summaries = summarize(organizations, counts);
        sort_by_count(&mut summaries, params.sort.direction);
        Ok(summaries
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .collect())
    }
}

impl<S> std::fmt::Debug for OrganizationPages<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrganizationPages")
            .field("scope", &self.scope)
            .field("chunk_size", &self.chunk_size)
            .field("cached_counts", &self.counts.len())
            .finish()
    }
}

fn summarize(
    organizations: Vec<Organization>,
    counts: &HashMap<String, u64>,
) -> Vec<OrganizationSummary> {
    organizations
        .into_iter()
        .map(|organization| {
            let docket_count = counts.get(&organization.uuid).copied().unwrap_or(0) as usize;
            OrganizationSummary {
                organization,
                docket_count,
            }
        })
        .collect()
}

/// Stable sort by count, so equal counts keep name order.
fn sort_by_count(summaries: &mut [OrganizationSummary], direction: SortDirection) {
    summaries.sort_by(|a, b| {
        let ordering = a.docket_count.cmp(&b.docket_count);
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

impl<S: DataService> PageFetcher for OrganizationPages<S> {
    type Item = OrganizationSummary;

    fn relation(&self) -> &'static str {
        ORGANIZATIONS
    }

    fn sort_fields(&self) -> &'static [SortField] {
        &[SortField::Name, SortField::DocketCount]
    }

    fn default_sort(&self) -> SortSpec {
        SortSpec::by(SortField::Name)
    }

    async fn fetch_page(
        &self,
        params: &ListingParams,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<OrganizationSummary>> {
        check_sort(self.sort_fields(), params.sort)?;

        if self.scope == CountScope::FullCorpus && params.sort.field == SortField::DocketCount {
            return self.fetch_corpus_ranked(params, page, page_size).await;
        }

        let query = ordered(Self::base_query(params), Self::server_sort(params.sort))
            .range(page * page_size, page_size);
        let rows = self.service.select(&query).await?;
        let organizations: Vec<Organization> = decode_rows(ORGANIZATIONS, rows)?;

        let counts = match self.scope {
            CountScope::PageWindow => self.page_counts(&organizations).await?,
            CountScope::FullCorpus => self.corpus_counts().await?.clone(),
        };

        let mut summaries = summarize(organizations, &counts);
        if params.sort.field == SortField::DocketCount {
            sort_by_count(&mut summaries, params.sort.direction);
        }
        Ok(summaries)
    }
}
