//! Quick search across dockets and organizations, as the command palette
//! runs it.

use owo_colors::OwoColorize;
use serde_json::json;

use super::{Session, print_json, truncate};
use crate::error::{DocketError, Result};
use crate::palette::{Palette, PaletteOptions};
use crate::search;

/// Execute the search command
pub async fn cmd_search(session: &Session, text: &str, json: bool) -> Result<()> {
    let options = PaletteOptions::from_config(&session.config);
    let normalized = search::normalize(text);
    if !search::is_searchable(&normalized, options.min_search_len) {
        return Err(DocketError::InvalidInput(format!(
            "search text must be at least {} characters",
            options.min_search_len
        )));
    }

    let palette = Palette::new(session.backend.clone(), options);
    palette.search_now(&normalized);
    let results = palette.settled().await;

    if json {
        return print_json(&json!(results));
    }

    if let Some(error) = &results.error {
        return Err(DocketError::Other(error.clone()));
    }
    if results.is_empty() {
        println!("{}", format!("No matches for '{}'", results.query).dimmed());
        return Ok(());
    }

    if !results.dockets.is_empty() {
        println!("{}", "Dockets".cyan().bold());
        for docket in &results.dockets {
            println!(
                "  {:<14} {}",
                docket.docket_govid.bold(),
                truncate(&docket.docket_title, 70)
            );
        }
    }
    if !results.organizations.is_empty() {
        if !results.dockets.is_empty() {
            println!();
        }
        println!("{}", "Organizations".cyan().bold());
        for organization in &results.organizations {
            println!("  {}", organization.name);
        }
    }
    Ok(())
}
