use owo_colors::OwoColorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::{Session, print_json, resolve_preset};
use crate::aggregate::{self, READ_CHUNK_ROWS};
use crate::error::Result;
use crate::listing::DocketPages;
use crate::query::{DatePreset, ListingParams};
use crate::search;

/// Columns the docket summary groups by
const GROUP_BY: &[&str] = &["industry", "current_status"];

pub struct StatsOptions {
    pub search: Option<String>,
    pub industry: Vec<String>,
    pub status: Vec<String>,
    pub date: DatePreset,
    pub json: bool,
}

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Dockets")]
    count: u64,
}

/// Summarize every docket matching the filters, without paginating
pub async fn cmd_stats(session: &Session, options: StatsOptions) -> Result<()> {
    let search_text = search::normalize(options.search.as_deref().unwrap_or(""));
    let search_text = if search::is_searchable(&search_text, session.config.search.min_length) {
        search_text
    } else {
        String::new()
    };

    let params = ListingParams::default()
        .with_search(&search_text)
        .with_filter("industry", options.industry)
        .with_filter("current_status", options.status)
        .with_date_range(resolve_preset(options.date));

    let fetcher = DocketPages::new(session.backend.clone());
    let query = fetcher.aggregate_query(&params);
    let summary = aggregate::summarize(fetcher.service(), &query, GROUP_BY, READ_CHUNK_ROWS).await?;

    if options.json {
        return print_json(&serde_json::to_value(&summary)?);
    }

    println!("{} docket(s)", summary.total.to_string().bold());
    for (column, counts) in &summary.groups {
        if counts.is_empty() {
            continue;
        }
        let mut rows: Vec<GroupRow> = counts
            .iter()
            .map(|(value, count)| GroupRow {
                value: value.clone(),
                count: *count,
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));

        println!("\n{}", column.cyan().bold());
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }
    Ok(())
}
