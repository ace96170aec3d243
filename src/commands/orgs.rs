use std::sync::Arc;

use owo_colors::OwoColorize;
use serde_json::json;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::ls::{open_prefs, resolve_sort};
use super::{Session, footer, load_pages, print_json, truncate};
use crate::aggregate::CountScope;
use crate::error::{DocketError, Result};
use crate::listing::{Listing, OrganizationPages, PageFetcher};
use crate::lookup::LookupCache;
use crate::query::{ListingParams, SortField, SortSpec};
use crate::types::{ORGANIZATIONS, OrganizationSummary};

pub struct OrgsOptions {
    pub search: Option<String>,
    pub sort: Option<SortSpec>,
    /// Falls back to `aggregate.scope`
    pub scope: Option<CountScope>,
    pub pages: usize,
    pub json: bool,
}

#[derive(Tabled)]
struct OrganizationRow {
    #[tabled(rename = "Organization")]
    name: String,
    #[tabled(rename = "Dockets")]
    dockets: usize,
    #[tabled(rename = "Aliases")]
    aliases: String,
}

impl From<&OrganizationSummary> for OrganizationRow {
    fn from(summary: &OrganizationSummary) -> Self {
        OrganizationRow {
            name: truncate(&summary.organization.name, 50),
            dockets: summary.docket_count,
            aliases: truncate(&summary.organization.aliases.join(", "), 40),
        }
    }
}

/// List organizations with their docket counts
pub async fn cmd_orgs(session: &Session, options: OrgsOptions) -> Result<()> {
    let scope = options.scope.unwrap_or(session.config.aggregate.scope);
    let counts = Arc::new(LookupCache::default());
    let fetcher = OrganizationPages::new(session.backend.clone(), scope, counts)
        .with_chunk_size(session.config.aggregate.chunk_size);

    if let Some(sort) = options.sort
        && !fetcher.sort_fields().contains(&sort.field)
    {
        return Err(DocketError::InvalidSortField(sort.field.to_string()));
    }
    let mut prefs = open_prefs();
    let sort = resolve_sort(&mut prefs, ORGANIZATIONS, options.sort, fetcher.default_sort());

    let params = ListingParams::default()
        .with_search(options.search.as_deref().unwrap_or(""))
        .with_sort(sort);

    let listing_options = session.listing_options();
    let page_size = listing_options.page_size;
    let listing = Listing::with_params(fetcher, params, listing_options);
    let view = load_pages(&listing, options.pages, page_size).await;

    if options.json {
        print_json(&json!({
            "query": listing.key().to_string(),
            "scope": scope.to_string(),
            "organizations": view.rows,
            "has_more": view.has_more,
            "error": view.error.as_ref().map(|e| e.to_string()),
        }))?;
        return view.check();
    }

    if view.rows.is_empty() && view.error.is_some() {
        return view.check();
    }
    if view.rows.is_empty() {
        println!("{}", "No organizations match.".dimmed());
        return Ok(());
    }

    let rows: Vec<OrganizationRow> = view.rows.iter().map(OrganizationRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    if scope == CountScope::PageWindow && sort.field == SortField::DocketCount {
        println!(
            "{}",
            "counts ordered within each page; use --scope corpus for a global ranking".dimmed()
        );
    }
    println!("{}", footer(&view));
    view.check()
}
