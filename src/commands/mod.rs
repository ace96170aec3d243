mod config;
mod favorite;
mod filings;
mod ls;
mod orgs;
mod search;
mod stats;

pub use config::{cmd_config_get, cmd_config_set, cmd_config_show};
pub use favorite::{cmd_favorite_add, cmd_favorite_ls, cmd_favorite_remove};
pub use filings::{FilingsOptions, cmd_filings};
pub use ls::{LsOptions, cmd_ls};
pub use orgs::{OrgsOptions, cmd_orgs};
pub use search::cmd_search;
pub use stats::{StatsOptions, cmd_stats};

use std::path::Path;

use jiff::civil::Date;
use owo_colors::OwoColorize;

use crate::config::Config;
use crate::error::Result;
use crate::listing::{Listing, ListingOptions, ListingView, PageFetcher};
use crate::query::{DatePreset, DateRange};
use crate::remote::Backend;

/// Loaded configuration plus the data service every command talks to.
pub struct Session {
    pub config: Config,
    pub backend: Backend,
}

impl Session {
    pub fn open(fixture: Option<&Path>) -> Result<Self> {
        let config = Config::load()?;
        let backend = Backend::connect(&config, fixture)?;
        Ok(Self { config, backend })
    }

    pub fn listing_options(&self) -> ListingOptions {
        ListingOptions::from_config(&self.config)
    }
}

/// Print a JSON value to stdout
pub fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolve a date preset against the local calendar date.
pub fn resolve_preset(preset: DatePreset) -> Option<DateRange> {
    preset.resolve(jiff::Zoned::now().date())
}

pub fn format_date(date: Option<Date>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Shorten `text` to `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}

/// Activate `listing` and load until `pages` pages are in or the list ends.
///
/// Rows a prefetch loaded beyond the requested pages are cut off, and the
/// view then still reports more rows.
pub async fn load_pages<F: PageFetcher>(
    listing: &Listing<F>,
    pages: usize,
    page_size: usize,
) -> ListingView<F::Item> {
    listing.activate();
    let wanted = pages.max(1).saturating_mul(page_size);
    let mut view = listing.settled().await;

    while view.error.is_none() && view.has_more && view.rows.len() < wanted {
        if !listing.request_next_page() {
            break;
        }
        view = listing.settled().await;
    }

    if view.rows.len() > wanted {
        view.rows.truncate(wanted);
        view.has_more = true;
    }
    view
}

/// Footer line describing how much of the list is loaded.
pub fn footer<T>(view: &ListingView<T>) -> String {
    let more = if view.has_more {
        "more available, use --pages to load further".dimmed().to_string()
    } else {
        "end of list".dimmed().to_string()
    };
    format!("{} row(s), {more}", view.rows.len())
}
