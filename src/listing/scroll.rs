//! Infinite-scroll trigger.
//!
//! The view places a sentinel after the last row. When the sentinel comes
//! within `margin_px` of the viewport, the trigger asks the listing for the
//! next page. Duplicate requests from rapid visibility changes are absorbed
//! by the listing, which ignores requests while a fetch is in flight.

use super::{Listing, PageFetcher};
use crate::config::Config;

/// Pre-trigger distance below the viewport (pixels)
pub const DEFAULT_MARGIN_PX: u32 = 600;

/// Scroll geometry of the list container, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub scroll_top: u32,
    pub viewport_height: u32,
    /// Offset of the sentinel from the top of the content
    pub sentinel_offset: u32,
}

impl Viewport {
    /// Distance from the bottom edge of the viewport to the sentinel.
    pub fn distance_to_sentinel(&self) -> u32 {
        self.sentinel_offset
            .saturating_sub(self.scroll_top.saturating_add(self.viewport_height))
    }

    pub fn is_within_margin(&self, margin_px: u32) -> bool {
        self.distance_to_sentinel() <= margin_px
    }
}

pub struct ScrollTrigger<F: PageFetcher> {
    listing: Listing<F>,
    margin_px: u32,
}

impl<F: PageFetcher> ScrollTrigger<F> {
    pub fn new(listing: Listing<F>) -> Self {
        Self::with_margin(listing, DEFAULT_MARGIN_PX)
    }

    /// Trigger with the configured `scroll.margin_px`.
    pub fn from_config(listing: Listing<F>, config: &Config) -> Self {
        Self::with_margin(listing, config.scroll.margin_px)
    }

    pub fn with_margin(listing: Listing<F>, margin_px: u32) -> Self {
        Self { listing, margin_px }
    }

    pub fn margin_px(&self) -> u32 {
        self.margin_px
    }

    /// Report the sentinel's visibility. Returns true if a page was requested.
    pub fn on_visibility(&self, visible: bool) -> bool {
        visible && self.listing.request_next_page()
    }

    /// Report a scroll position. Returns true if a page was requested.
    pub fn on_scroll(&self, viewport: Viewport) -> bool {
        self.on_visibility(viewport.is_within_margin(self.margin_px))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::listing::{DocketPages, ListingOptions};
    use crate::remote::MemoryService;
    use crate::types::DOCKETS;

    #[test]
    fn test_margin_geometry() {
        let viewport = Viewport {
            scroll_top: 1000,
            viewport_height: 800,
            sentinel_offset: 2300,
        };
        assert_eq!(viewport.distance_to_sentinel(), 500);
        assert!(viewport.is_within_margin(600));
        assert!(!viewport.is_within_margin(400));

        let past = Viewport {
            scroll_top: 3000,
            ..viewport
        };
        assert_eq!(past.distance_to_sentinel(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_margin_decides_when_to_request() {
        let rows = (0..100)
            .map(|i| json!({"uuid": format!("d{i:03}"), "docket_govid": format!("G{i}")}))
            .collect();
        let service = MemoryService::new().with_table(DOCKETS, rows);
        let listing = Listing::new(
            DocketPages::new(service.clone()),
            ListingOptions {
                prefetch: false,
                ..Default::default()
            },
        );
        listing.activate();
        listing.settled().await;

        let mut config = Config::default();
        config.set("scroll.margin_px", "200").unwrap();
        let trigger = ScrollTrigger::from_config(listing.clone(), &config);
        assert_eq!(trigger.margin_px(), 200);

        // 500px away: inside the default margin, outside the configured one
        let viewport = Viewport {
            scroll_top: 1000,
            viewport_height: 800,
            sentinel_offset: 2300,
        };
        assert!(!trigger.on_scroll(viewport));
        assert!(
            trigger.on_scroll(Viewport {
                scroll_top: 1400,
                ..viewport
            })
        );
        assert_eq!(listing.settled().await.rows.len(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_toggles_request_once() {
        let rows = (0..100)
            .map(|i| json!({"uuid": format!("d{i:03}"), "docket_govid": format!("G{i}")}))
            .collect();
        let service = MemoryService::new().with_table(DOCKETS, rows);
        let listing = Listing::new(
            DocketPages::new(service.clone()),
            ListingOptions {
                prefetch: false,
                ..Default::default()
            },
        );
        listing.activate();
        listing.settled().await;

        let trigger = ScrollTrigger::new(listing.clone());
        let requested = (0..10)
            .map(|i| trigger.on_visibility(i % 2 == 0))
            .filter(|r| *r)
            .count();
        assert_eq!(requested, 1);

        let view = listing.settled().await;
        assert_eq!(view.rows.len(), 60);
        assert_eq!(service.calls_for(DOCKETS).len(), 2);
    }
}
