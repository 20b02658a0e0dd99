use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use villaops_lib::bookings;
use villaops_lib::functions::{ScriptedFunctions, GUESTY_BOOKING_SYNC, GUESTY_SYNC};
use villaops_lib::guesty::{self, SyncOptions};
use villaops_lib::perf;
use villaops_lib::properties;
use villaops_lib::AppError;

#[path = "util.rs"]
mod util;

fn no_delay(max_pages: u32) -> SyncOptions {
    SyncOptions {
        max_pages,
        delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn listings_are_mirrored_into_properties() -> Result<()> {
    let store = util::temp_store().await;
    let fake = ScriptedFunctions::new();
    fake.push(Ok(json!({
        "success": true,
        "listingsCount": 2,
        "listings": [
            {"_id": "L1", "title": "Sea View", "bedrooms": 3, "bathrooms": 1.5, "accommodates": 6,
             "address": {"full": "1 Beach Rd"}},
            {"_id": "L2", "nickname": "Hill House"}
        ]
    })));
    fake.push(Ok(json!({
        "success": true,
        "listingsCount": 1,
        "listings": [{"_id": "L1", "title": "Sea View Deluxe", "bedrooms": 4}]
    })));

    let summary = guesty::sync_listings(&store, &fake).await?;
    assert_eq!(summary.listings_count, 2);
    let sea = properties::find_by_listing(&store, "L1").await?.expect("L1 mirrored");
    assert_eq!(sea.name, "Sea View");
    assert_eq!(sea.bathrooms, 2);
    assert_eq!(sea.address.as_deref(), Some("1 Beach Rd"));

    guesty::sync_listings(&store, &fake).await?;
    let sea = properties::find_by_listing(&store, "L1").await?.expect("L1 mirrored");
    assert_eq!(sea.name, "Sea View Deluxe");
    assert_eq!(properties::list(&store, false).await?.len(), 2);

    let calls = fake.calls();
    assert_eq!(calls[0].0, GUESTY_SYNC);
    assert_eq!(calls[0].1["action"], "sync_listings");
    Ok(())
}

#[tokio::test]
async fn booking_pages_upsert_by_reservation_id() -> Result<()> {
    let store = util::temp_store().await;
    let villa = util::listed_property(&store, "Sea View", "L1").await;
    let page = |status: &str| {
        json!({
            "success": true,
            "bookingsSynced": 2,
            "hasMore": false,
            "bookings": [
                {"_id": "R1", "listingId": "L1", "guestName": "Ana", "checkIn": "2025-07-01",
                 "checkOut": "2025-07-05T10:00:00Z", "status": status, "totalPrice": 800.0},
                {"_id": "R2", "listingId": "UNKNOWN", "checkIn": "2025-07-01", "checkOut": "2025-07-02"}
            ]
        })
    };
    let fake = ScriptedFunctions::new();
    fake.push(Ok(page("confirmed")));
    fake.push(Ok(page("cancelled")));

    guesty::sync_bookings_for_listing(&store, &fake, "L1", 0).await?;
    let mirrored = bookings::find_by_reservation(&store, "R1").await?.expect("R1 mirrored");
    assert_eq!(mirrored.property_id, villa.id);
    assert_eq!(mirrored.check_out, "2025-07-05");
    assert_eq!(mirrored.nights(), Some(4));
    assert!(bookings::find_by_reservation(&store, "R2").await?.is_none());

    guesty::sync_bookings_for_listing(&store, &fake, "L1", 0).await?;
    let all = bookings::list_all(&store).await?;
    assert_eq!(all.len(), 1);
    assert!(all[0].is_cancelled());

    let calls = fake.calls();
    assert_eq!(calls[0].0, GUESTY_BOOKING_SYNC);
    assert_eq!(calls[0].1, json!({"listingId": "L1", "startIndex": 0}));
    Ok(())
}

#[tokio::test]
async fn invalid_reservations_are_skipped_not_fatal() -> Result<()> {
    let store = util::temp_store().await;
    util::listed_property(&store, "Sea View", "L1").await;
    let fake = ScriptedFunctions::new();
    fake.push(Ok(json!({
        "success": true,
        "bookingsSynced": 2,
        "hasMore": false,
        "bookings": [
            {"_id": "R0", "listingId": "L1", "checkIn": "2025-07-01", "checkOut": "2025-07-01"},
            {"_id": "R1", "listingId": "L1", "checkIn": "2025-07-02", "checkOut": "2025-07-05"}
        ]
    })));

    let summary = guesty::sync_all_bookings(&store, &fake, "L1", no_delay(20)).await?;
    assert!(bookings::find_by_reservation(&store, "R0").await?.is_none());
    assert!(bookings::find_by_reservation(&store, "R1").await?.is_some());
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with("reservation R0:"));

    let logs = guesty::list_sync_logs(&store, 1).await?;
    assert_eq!(logs[0].status, "completed");
    Ok(())
}

#[tokio::test]
async fn invalid_listings_are_skipped_not_fatal() -> Result<()> {
    let store = util::temp_store().await;
    let fake = ScriptedFunctions::new();
    fake.push(Ok(json!({
        "success": true,
        "listingsCount": 2,
        "listings": [
            {"_id": "L1", "title": "x".repeat(201)},
            {"_id": "L2", "title": "Hill House"}
        ]
    })));

    let summary = guesty::sync_listings(&store, &fake).await?;
    assert!(properties::find_by_listing(&store, "L1").await?.is_none());
    assert!(properties::find_by_listing(&store, "L2").await?.is_some());
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with("listing L1:"));
    Ok(())
}

#[tokio::test]
async fn full_booking_sync_stops_at_page_cap() -> Result<()> {
    let store = util::temp_store().await;
    util::listed_property(&store, "Sea View", "L1").await;
    let fake = ScriptedFunctions::new();
    fake.always(json!({"success": true, "bookingsSynced": 25, "hasMore": true}));

    let summary = guesty::sync_all_bookings(&store, &fake, "L1", no_delay(20)).await?;
    assert_eq!(summary.pages, 20);
    assert!(summary.truncated);
    assert_eq!(summary.bookings_synced, 500);
    assert_eq!(fake.calls().len(), 20);
    // The cursor advances by the synced count when no explicit index is given.
    assert_eq!(fake.calls()[1].1["startIndex"], 25);

    let logs = guesty::list_sync_logs(&store, 5).await?;
    assert_eq!(logs[0].sync_type, "bookings");
    assert_eq!(logs[0].status, "completed");
    assert_eq!(logs[0].pages, 20);
    Ok(())
}

#[tokio::test]
async fn full_booking_sync_follows_next_index_until_done() -> Result<()> {
    let store = util::temp_store().await;
    let fake = ScriptedFunctions::new();
    fake.push(Ok(json!({"success": true, "bookingsSynced": 10, "hasMore": true, "nextIndex": 100})));
    fake.push(Ok(json!({"success": true, "bookingsSynced": 3, "hasMore": false})));

    let summary = guesty::sync_all_bookings(&store, &fake, "L1", no_delay(20)).await?;
    assert_eq!(summary.pages, 2);
    assert!(!summary.truncated);
    assert_eq!(summary.bookings_synced, 13);
    assert_eq!(fake.calls()[1].1["startIndex"], 100);
    Ok(())
}

#[tokio::test]
async fn failed_sync_is_logged_and_returned() -> Result<()> {
    let store = util::temp_store().await;
    let fake = ScriptedFunctions::new();
    fake.push(Ok(json!({"success": false, "errors": [{"message": "token expired"}]})));

    let err = guesty::sync_listings(&store, &fake).await.unwrap_err();
    assert_eq!(err.code(), "SYNC/FAILED");
    assert_eq!(err.message(), "token expired");

    let logs = guesty::list_sync_logs(&store, 1).await?;
    assert_eq!(logs[0].status, "failed");
    assert_eq!(logs[0].error_message.as_deref(), Some("token expired"));
    assert!(logs[0].finished_at.is_some());

    let stats = perf::operation_stats(&store).await?;
    let listing_runs = stats
        .iter()
        .find(|s| s.operation == "guesty_sync_listings")
        .expect("perf row recorded");
    assert_eq!(listing_runs.failures, 1);
    Ok(())
}

#[tokio::test]
async fn health_failures_are_recorded_not_raised() -> Result<()> {
    let store = util::temp_store().await;
    let fake = ScriptedFunctions::new();
    fake.push(Ok(json!({"success": true, "message": "ok"})));
    fake.push(Err(AppError::new("HTTP/STATUS", "bad gateway")));

    let healthy = guesty::health_check(&store, &fake).await?;
    assert_eq!(healthy.status, "healthy");

    let broken = guesty::health_check(&store, &fake).await?;
    assert_eq!(broken.status, "error");
    assert_eq!(broken.message.as_deref(), Some("bad gateway"));

    let latest = guesty::latest_health(&store).await?.expect("recorded");
    assert_eq!(latest.id, broken.id);
    Ok(())
}
