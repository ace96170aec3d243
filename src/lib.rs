#[macro_use]
mod macros;

pub mod aggregate;
pub mod choreography;
pub mod commands;
pub mod config;
pub mod error;
pub mod favorites;
pub mod listing;
pub mod lookup;
pub mod palette;
pub mod prefs;
pub mod query;
pub mod remote;
pub mod search;
pub mod types;

pub use aggregate::{CountScope, Summary};
pub use config::Config;
pub use error::{DocketError, Result};
pub use favorites::{FavoriteChange, FavoriteOutcome, FavoriteSet, Favorites};
pub use listing::{
    DocketPages, FilingPages, Listing, ListingOptions, ListingView, OrganizationPages,
    PageFetcher, Phase, ScrollTrigger,
};
pub use lookup::{CachePolicy, LookupCache};
pub use palette::{Palette, PaletteOptions, PaletteResults};
pub use query::{DatePreset, DateRange, ListingParams, QueryKey, SortDirection, SortField, SortSpec};
pub use remote::{DataService, MemoryService, PostgrestClient};
pub use types::{Attachment, Docket, Favorite, Filing, Organization, OrganizationSummary};
