use owo_colors::OwoColorize;
use serde_json::json;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::{Session, footer, format_date, load_pages, print_json, resolve_preset, truncate};
use crate::error::{DocketError, Result};
use crate::listing::{DocketPages, Listing, PageFetcher};
use crate::prefs::Preferences;
use crate::query::{DatePreset, ListingParams, SortSpec};
use crate::types::{DOCKETS, Docket};

pub struct LsOptions {
    pub search: Option<String>,
    pub industry: Vec<String>,
    pub status: Vec<String>,
    pub petitioner: Vec<String>,
    pub sort: Option<SortSpec>,
    pub date: DatePreset,
    pub pages: usize,
    pub json: bool,
}

#[derive(Tabled)]
struct DocketRow {
    #[tabled(rename = "Docket")]
    govid: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Industry")]
    industry: String,
    #[tabled(rename = "Petitioner")]
    petitioner: String,
    #[tabled(rename = "Opened")]
    opened: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&Docket> for DocketRow {
    fn from(docket: &Docket) -> Self {
        DocketRow {
            govid: docket.docket_govid.clone(),
            title: truncate(&docket.docket_title, 60),
            industry: docket.industry.clone().unwrap_or_default(),
            petitioner: truncate(docket.petitioner.as_deref().unwrap_or(""), 30),
            opened: format_date(docket.opened_date),
            status: docket.current_status.clone().unwrap_or_default(),
        }
    }
}

/// Pick the sort: explicit flag (remembered), else the remembered one.
pub(super) fn resolve_sort(
    prefs: &mut Option<Preferences>,
    view: &str,
    explicit: Option<SortSpec>,
    fallback: SortSpec,
) -> SortSpec {
    match (explicit, prefs.as_mut()) {
        (Some(sort), Some(prefs)) => {
            if let Err(e) = prefs.set_sort(view, sort) {
                tracing::warn!("could not remember sort for {}: {}", view, e);
            }
            sort
        }
        (Some(sort), None) => sort,
        (None, Some(prefs)) => prefs.sort_for(view).unwrap_or(fallback),
        (None, None) => fallback,
    }
}

pub(super) fn open_prefs() -> Option<Preferences> {
    Preferences::open_default()
        .inspect_err(|e| tracing::warn!("preferences unavailable: {}", e))
        .ok()
}

/// List dockets, page by page
pub async fn cmd_ls(session: &Session, options: LsOptions) -> Result<()> {
    let fetcher = DocketPages::new(session.backend.clone());
    if let Some(sort) = options.sort
        && !fetcher.sort_fields().contains(&sort.field)
    {
        return Err(DocketError::InvalidSortField(sort.field.to_string()));
    }

    let mut prefs = open_prefs();
    let sort = resolve_sort(&mut prefs, DOCKETS, options.sort, fetcher.default_sort());

    let params = ListingParams::default()
        .with_search(options.search.as_deref().unwrap_or(""))
        .with_filter("industry", options.industry)
        .with_filter("current_status", options.status)
        .with_filter("petitioner", options.petitioner)
        .with_sort(sort)
        .with_date_range(resolve_preset(options.date));

    let listing_options = session.listing_options();
    let page_size = listing_options.page_size;
    let listing = Listing::with_params(fetcher, params, listing_options);
    let view = load_pages(&listing, options.pages, page_size).await;

    if options.json {
        print_json(&json!({
            "query": listing.key().to_string(),
            "dockets": view.rows,
            "has_more": view.has_more,
            "error": view.error.as_ref().map(|e| e.to_string()),
        }))?;
        return view.check();
    }

    if view.rows.is_empty() && view.error.is_some() {
        return view.check();
    }
    if view.rows.is_empty() {
        println!("{}", "No dockets match.".dimmed());
        return Ok(());
    }

    let rows: Vec<DocketRow> = view.rows.iter().map(DocketRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("{}", footer(&view));

    view.check()
}
