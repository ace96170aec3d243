//! Row types read from the docket database.
//!
//! Every type here mirrors a relation owned by the hosted service. Only
//! [`Favorite`] is ever written by this crate.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

pub const DOCKETS: &str = "dockets";
pub const FILINGS: &str = "filings";
pub const ATTACHMENTS: &str = "attachments";
pub const ORGANIZATIONS: &str = "organizations";
pub const ORGANIZATION_DOCKETS: &str = "organization_dockets";
pub const FAVORITES: &str = "favorites";

/// Rows requested per page fetch.
pub const PAGE_SIZE: usize = 30;

/// A regulatory case tracked by a utility commission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Docket {
    pub uuid: String,
    /// Government-assigned identifier, e.g. `24-E-0165`
    pub docket_govid: String,
    #[serde(default)]
    pub docket_title: String,
    #[serde(default)]
    pub docket_description: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub petitioner: Option<String>,
    #[serde(default)]
    pub opened_date: Option<Date>,
    #[serde(default)]
    pub closed_date: Option<Date>,
    #[serde(default)]
    pub current_status: Option<String>,
}

/// A document submitted to one docket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filing {
    pub uuid: String,
    pub docket_uuid: String,
    #[serde(default)]
    pub filed_date: Option<Date>,
    #[serde(default)]
    pub filing_type: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Denormalized author names, not a relation
    #[serde(default)]
    pub organization_authors: Vec<String>,
}

/// A file attached to one filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub uuid: String,
    pub filing_uuid: String,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Content hash, resolved against the configured attachment base URL
    #[serde(default)]
    pub hash: Option<String>,
}

impl Attachment {
    /// Resolve a downloadable URL, preferring the direct URL.
    pub fn resolve_url(&self, base_url: Option<&str>) -> Option<String> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        let hash = self.hash.as_deref().filter(|h| !h.is_empty())?;
        let base = base_url?.trim_end_matches('/');
        Some(format!("{base}/{hash}"))
    }

    /// Title for display, falling back to the file name.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.file_name.as_deref())
            .unwrap_or("(untitled)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// An organization row together with its derived docket count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationSummary {
    #[serde(flatten)]
    pub organization: Organization,
    pub docket_count: usize,
}

/// A user's bookmark on a docket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub user_id: String,
    pub docket_govid: String,
}
