use std::collections::HashMap;

use owo_colors::OwoColorize;
use serde_json::json;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::ls::{open_prefs, resolve_sort};
use super::{Session, footer, format_date, load_pages, print_json, resolve_preset, truncate};
use crate::aggregate;
use crate::error::{DocketError, Result};
use crate::listing::{FilingPages, Listing, PageFetcher};
use crate::query::{DatePreset, ListingParams, SortDirection, SortSpec, TableQuery};
use crate::remote::{DataService, decode_rows};
use crate::types::{ATTACHMENTS, Attachment, DOCKETS, Docket, FILINGS, Filing};

pub struct FilingsOptions {
    pub docket: String,
    pub search: Option<String>,
    pub filing_type: Vec<String>,
    pub author: Vec<String>,
    pub sort: Option<SortSpec>,
    pub date: DatePreset,
    pub pages: usize,
    pub attachments: bool,
    pub json: bool,
}

#[derive(Tabled)]
struct FilingRow {
    #[tabled(rename = "Filed")]
    filed: String,
    #[tabled(rename = "Type")]
    filing_type: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Authors")]
    authors: String,
}

impl From<&Filing> for FilingRow {
    fn from(filing: &Filing) -> Self {
        FilingRow {
            filed: format_date(filing.filed_date),
            filing_type: filing.filing_type.clone().unwrap_or_default(),
            name: truncate(&filing.name, 60),
            authors: truncate(&filing.organization_authors.join(", "), 40),
        }
    }
}

async fn find_docket(session: &Session, govid: &str) -> Result<Docket> {
    let query = TableQuery::new(DOCKETS).eq("docket_govid", govid).limit(1);
    let rows = session.backend.select(&query).await?;
    decode_rows::<Docket>(DOCKETS, rows)?
        .pop()
        .ok_or_else(|| DocketError::InvalidInput(format!("no docket with id '{govid}'")))
}

/// Attachments of `filings`, grouped by filing.
async fn load_attachments(
    session: &Session,
    filings: &[Filing],
) -> Result<HashMap<String, Vec<Attachment>>> {
    if filings.is_empty() {
        return Ok(HashMap::new());
    }
    let uuids: Vec<String> = filings.iter().map(|f| f.uuid.clone()).collect();
    let query = TableQuery::new(ATTACHMENTS).order_by("uuid", SortDirection::Asc);
    let rows = aggregate::read_by_keys(
        &session.backend,
        &query,
        "filing_uuid",
        &uuids,
        session.config.aggregate.chunk_size,
    )
    .await?;
    let attachments: Vec<Attachment> = decode_rows(ATTACHMENTS, rows)?;

    let mut grouped: HashMap<String, Vec<Attachment>> = HashMap::new();
    for attachment in attachments {
        grouped
            .entry(attachment.filing_uuid.clone())
            .or_default()
            .push(attachment);
    }
    Ok(grouped)
}

/// List the filings of one docket
pub async fn cmd_filings(session: &Session, options: FilingsOptions) -> Result<()> {
    let docket = find_docket(session, &options.docket).await?;

    let fetcher = FilingPages::new(session.backend.clone(), &docket.uuid);
    if let Some(sort) = options.sort
        && !fetcher.sort_fields().contains(&sort.field)
    {
        return Err(DocketError::InvalidSortField(sort.field.to_string()));
    }
    let mut prefs = open_prefs();
    let sort = resolve_sort(&mut prefs, FILINGS, options.sort, fetcher.default_sort());

    let params = ListingParams::default()
        .with_search(options.search.as_deref().unwrap_or(""))
        .with_filter("filing_type", options.filing_type)
        .with_filter("organization_authors", options.author)
        .with_sort(sort)
        .with_date_range(resolve_preset(options.date));

    let listing_options = session.listing_options();
    let page_size = listing_options.page_size;
    let listing = Listing::with_params(fetcher, params, listing_options);
    let view = load_pages(&listing, options.pages, page_size).await;

    let attachments = if options.attachments {
        load_attachments(session, &view.rows).await?
    } else {
        HashMap::new()
    };
    let base_url = session.config.attachments.base_url.as_deref();

    if options.json {
        let filings: Vec<serde_json::Value> = view
            .rows
            .iter()
            .map(|filing| {
                let files: Vec<serde_json::Value> = attachments
                    .get(&filing.uuid)
                    .into_iter()
                    .flatten()
                    .map(|a| {
                        json!({
                            "title": a.display_title(),
                            "extension": a.extension,
                            "url": a.resolve_url(base_url),
                        })
                    })
                    .collect();
                json!({"filing": filing, "attachments": files})
            })
            .collect();
        print_json(&json!({
            "docket": docket,
            "filings": filings,
            "has_more": view.has_more,
            "error": view.error.as_ref().map(|e| e.to_string()),
        }))?;
        return view.check();
    }

    println!(
        "{} {}\n",
        docket.docket_govid.cyan().bold(),
        docket.docket_title
    );

    if view.rows.is_empty() && view.error.is_some() {
        return view.check();
    }
    if view.rows.is_empty() {
        println!("{}", "No filings match.".dimmed());
        return Ok(());
    }

    let rows: Vec<FilingRow> = view.rows.iter().map(FilingRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if options.attachments {
        for filing in &view.rows {
            let Some(files) = attachments.get(&filing.uuid) else {
                continue;
            };
            println!("\n{}", filing.name.bold());
            for file in files {
                let url = file
                    .resolve_url(base_url)
                    .unwrap_or_else(|| "(no url: set attachments.base_url)".dimmed().to_string());
                println!("  {} {}", file.display_title(), url.dimmed());
            }
        }
    }

    println!("{}", footer(&view));
    view.check()
}
