#[path = "common/mod.rs"]
mod common;

use std::time::Duration;

use common::{docket, dockets, service_with};
use dockets::favorites::{FavoriteOutcome, Favorites};
use dockets::listing::{DocketPages, Listing, ListingOptions, Phase, ScrollTrigger, Viewport};
use dockets::palette::{Palette, PaletteOptions};
use dockets::remote::MemoryService;
use dockets::types::DOCKETS;

fn listing(service: &MemoryService) -> Listing<DocketPages<MemoryService>> {
    Listing::new(DocketPages::new(service.clone()), ListingOptions::default())
}

/// Dockets from three petitioners whose names share the prefix "cons".
fn con_ed_corpus() -> Vec<serde_json::Value> {
    let mut rows = dockets(80);
    for i in 0..3 {
        rows.push(docket(100 + i, &format!("Steam rates {i}"), "Consolidated Edison"));
    }
    for i in 0..2 {
        rows.push(docket(200 + i, &format!("Gas supply {i}"), "Consumers Energy"));
    }
    rows
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_rows_come_from_one_key_after_settling() {
    let service = service_with(dockets(45));
    let listing = listing(&service);

    listing.activate();
    let view = listing.settled().await;
    assert_eq!(view.rows.len(), 45);
    assert_eq!(view.key, listing.key());
    assert!(view.rows.iter().all(|d| d.petitioner.as_deref() == Some("Central Hudson")));

    listing.set_filter("industry", ["Gas"]);
    let view = listing.settled().await;
    assert_eq!(view.key, listing.key());
    assert!(!view.rows.is_empty());
    assert!(view.rows.iter().all(|d| d.industry.as_deref() == Some("Gas")));
}

#[tokio::test(start_paused = true)]
async fn test_short_page_ends_the_list_for_good() {
    let service = service_with(dockets(17));
    let listing = listing(&service);

    listing.activate();
    let view = listing.settled().await;
    assert_eq!(view.rows.len(), 17);
    assert!(!view.has_more);

    assert!(!listing.request_next_page());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!listing.request_next_page());
    assert_eq!(service.calls_for(DOCKETS).len(), 1);
    assert_eq!(listing.view().rows.len(), 17);
}

#[tokio::test(start_paused = true)]
async fn test_prefetches_exactly_one_page_after_each_load() {
    let service = service_with(dockets(100));
    service.set_latency(DOCKETS, Duration::from_millis(100));
    let listing = listing(&service);

    listing.activate();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Page 1 still in flight: no prefetch yet
    assert_eq!(service.calls_for(DOCKETS).len(), 1);
    assert_eq!(listing.phase(), Phase::FetchingFirst);

    let view = listing.settled().await;
    assert_eq!(view.rows.len(), 60);
    assert_eq!(view.phase, Phase::AwaitingUserScroll);
    assert_eq!(service.calls_for(DOCKETS).len(), 2);

    assert!(listing.request_next_page());
    let view = listing.settled().await;
    assert_eq!(view.rows.len(), 100);
    assert!(!view.has_more);

    let offsets: Vec<Option<usize>> = service
        .calls_for(DOCKETS)
        .iter()
        .map(|q| q.offset())
        .collect();
    assert_eq!(offsets, vec![Some(0), Some(30), Some(60), Some(90)]);
}

#[tokio::test(start_paused = true)]
async fn test_no_prefetch_loads_on_demand_only() {
    let service = service_with(dockets(100));
    let listing = Listing::new(
        DocketPages::new(service.clone()),
        ListingOptions {
            prefetch: false,
            ..Default::default()
        },
    );

    listing.activate();
    assert_eq!(listing.settled().await.rows.len(), 30);
    assert_eq!(service.calls_for(DOCKETS).len(), 1);

    assert!(listing.request_next_page());
    assert_eq!(listing.settled().await.rows.len(), 60);
    assert_eq!(service.calls_for(DOCKETS).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_scroll_trigger_requests_once_per_page() {
    let service = service_with(dockets(200));
    service.set_latency(DOCKETS, Duration::from_millis(100));
    let listing = Listing::new(
        DocketPages::new(service.clone()),
        ListingOptions {
            prefetch: false,
            ..Default::default()
        },
    );
    let trigger = ScrollTrigger::new(listing.clone());

    listing.activate();
    listing.settled().await;

    let near_bottom = Viewport {
        scroll_top: 1000,
        viewport_height: 800,
        sentinel_offset: 2200,
    };
    let far_away = Viewport {
        scroll_top: 0,
        viewport_height: 800,
        sentinel_offset: 2200,
    };
    assert!(!trigger.on_scroll(far_away));
    assert!(trigger.on_scroll(near_bottom));
    assert!(!trigger.on_scroll(near_bottom));
    assert!(!trigger.on_visibility(true));

    assert_eq!(listing.settled().await.rows.len(), 60);
    assert_eq!(service.calls_for(DOCKETS).len(), 2);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_typing_burst_issues_one_request() {
    let rows = (0..5)
        .map(|i| docket(i, &format!("Electric vehicle tariff {i}"), "Central Hudson"))
        .chain((5..10).map(|i| docket(i, &format!("Water main {i}"), "Suez")))
        .collect();
    let service = service_with(rows);
    let listing = listing(&service);
    listing.activate();
    listing.settled().await;
    assert_eq!(service.calls_for(DOCKETS).len(), 1);

    let word = "electric";
    for end in 1..=word.len() {
        listing.set_search_text(&word[..end]);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let view = listing.settled().await;

    assert_eq!(service.calls_for(DOCKETS).len(), 2);
    assert_eq!(listing.params().search, "electric");
    assert_eq!(view.rows.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_single_character_search_lists_everything() {
    let service = service_with(dockets(10));
    let listing = listing(&service);
    listing.activate();
    listing.settled().await;

    listing.set_search_text("z");
    let view = listing.settled().await;
    assert_eq!(view.rows.len(), 10);
    assert_eq!(listing.params().search, "");
    // Key unchanged, so no new request
    assert_eq!(service.calls_for(DOCKETS).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_search_discards_pending_prefetch() {
    let service = service_with(con_ed_corpus());
    service.push_delay(DOCKETS, Duration::ZERO);
    service.push_delay(DOCKETS, Duration::from_millis(500));
    let listing = listing(&service);

    listing.activate();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let view = listing.view();
    assert_eq!(view.rows.len(), 30);
    assert_eq!(view.phase, Phase::PrefetchingNext);

    listing.apply_search_now("Consolidated");
    let view = listing.settled().await;
    assert_eq!(view.rows.len(), 3);
    assert!(!view.has_more);

    // The slow second page of the old key never lands
    tokio::time::sleep(Duration::from_secs(2)).await;
    let view = listing.view();
    assert_eq!(view.rows.len(), 3);
    assert!(
        view.rows
            .iter()
            .all(|d| d.petitioner.as_deref() == Some("Consolidated Edison"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_new_search_resets_rows_before_first_page_lands() {
    let service = service_with(con_ed_corpus());
    let listing = listing(&service);
    listing.activate();
    let view = listing.settled().await;
    assert_eq!(view.rows.len(), 60);

    service.push_delay(DOCKETS, Duration::from_millis(300));
    let mut rx = listing.subscribe();
    listing.apply_search_now("Consolidated Edison");

    assert!(rx.has_changed().unwrap());
    let view = rx.borrow_and_update().clone();
    assert!(view.rows.is_empty());
    assert_eq!(view.phase, Phase::FetchingFirst);
    assert!(view.is_loading_first_page);
    assert!(view.has_more);
    assert_eq!(view.key, listing.key());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(listing.view().rows.is_empty());

    let view = listing.settled().await;
    assert_eq!(view.rows.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_older_search_never_overwrites_newer_one() {
    let service = service_with(con_ed_corpus());
    let listing = listing(&service);
    listing.activate();
    listing.settled().await;

    service.push_delay(DOCKETS, Duration::from_millis(500));
    service.push_delay(DOCKETS, Duration::from_millis(10));
    listing.apply_search_now("cons");
    tokio::time::sleep(Duration::from_millis(1)).await;
    listing.apply_search_now("consolidated");

    let view = listing.settled().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(listing.view().rows, view.rows);
    assert_eq!(view.rows.len(), 3);
    assert_eq!(listing.params().search, "consolidated");
}

#[tokio::test(start_paused = true)]
async fn test_palette_keeps_latest_query_results() {
    let service = service_with(con_ed_corpus());
    let palette = Palette::new(service.clone(), PaletteOptions::default());

    service.push_delay(DOCKETS, Duration::from_millis(500));
    palette.search_now("cons");
    tokio::time::sleep(Duration::from_millis(1)).await;
    palette.search_now("consolidated");

    let results = palette.settled().await;
    assert_eq!(results.query, "consolidated");
    assert_eq!(results.dockets.len(), 3);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let results = palette.results();
    assert_eq!(results.query, "consolidated");
    assert_eq!(results.dockets.len(), 3);
}

// ============================================================================
// Favorites
// ============================================================================

#[tokio::test]
async fn test_favorite_from_two_sessions_reports_conflict() {
    let service = service_with(dockets(3));
    let first = Favorites::new(service.clone(), "user-1");
    let second = Favorites::new(service.clone(), "user-1");
    second.load().await.unwrap();

    assert_eq!(first.add("24-E-0001").await.unwrap(), FavoriteOutcome::Added);
    assert_eq!(
        second.add("24-E-0001").await.unwrap(),
        FavoriteOutcome::AlreadyFavorited
    );
    assert!(second.contains("24-E-0001"));
    assert_eq!(service.row_count("favorites"), 1);
}
