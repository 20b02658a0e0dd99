//! Guesty channel-manager sync through the hosted remote functions.
//!
//! Listing and booking data arrive as summaries plus (optionally) the synced
//! records themselves; records are mirrored into the local store keyed by
//! their Guesty ids. Every sync is recorded in `sync_logs`.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use ts_rs::TS;

use crate::bookings::{self, BookingInput};
use crate::config::Config;
use crate::functions::{RemoteFunctions, GUESTY_BOOKING_SYNC, GUESTY_HEALTH_CHECK, GUESTY_SYNC};
use crate::perf::OpScope;
use crate::properties::{self, PropertyInput};
use crate::repo::{self, ListQuery};
use crate::retry::{self, Page, DEFAULT_MAX_PAGES};
use crate::state::Store;
use crate::time::{format_date, now_ms, parse_date};
use crate::{AppError, AppResult};

pub const SERVICE: &str = "guesty";

/// Errors may come back as plain strings or as objects; keep text either way.
fn lenient_errors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        })
        .collect())
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ListingRecord {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default, alias = "nickname")]
    title: Option<String>,
    #[serde(default)]
    address: Option<Value>,
    #[serde(default)]
    bedrooms: Option<i64>,
    #[serde(default)]
    bathrooms: Option<f64>,
    #[serde(default)]
    accommodates: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservationRecord {
    #[serde(alias = "_id")]
    id: String,
    listing_id: String,
    #[serde(default)]
    guest_name: Option<String>,
    check_in: String,
    check_out: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total_price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SyncSummary {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub listings_count: u64,
    #[serde(default)]
    pub bookings_synced: u64,
    #[serde(default, deserialize_with = "lenient_errors")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BookingSyncPage {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub bookings_synced: u64,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub next_index: Option<u64>,
    #[serde(default, deserialize_with = "lenient_errors")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BookingSyncSummary {
    pub listing_id: String,
    pub pages: u32,
    pub bookings_synced: u64,
    /// The page cap stopped the loop while Guesty still reported more data.
    pub truncated: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IntegrationHealth {
    pub id: String,
    pub service: String,
    pub status: String,
    pub message: Option<String>,
    #[ts(type = "number | null")]
    pub latency_ms: Option<i64>,
    #[ts(type = "number")]
    pub checked_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncLog {
    pub id: String,
    pub sync_type: String,
    pub status: String,
    pub listing_id: Option<String>,
    pub items_processed: i64,
    pub pages: i64,
    pub error_message: Option<String>,
    #[ts(type = "number")]
    pub started_at: i64,
    #[ts(type = "number | null")]
    pub finished_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOptions {
    pub max_pages: u32,
    pub delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            delay: Duration::from_secs(1),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_pages: config.sync_max_pages,
            delay: config.sync_delay,
        }
    }
}

// Sync log bookkeeping

async fn start_log(store: &Store, sync_type: &str, listing_id: Option<&str>) -> AppResult<String> {
    let mut columns = Map::new();
    columns.insert("sync_type".into(), Value::from(sync_type));
    columns.insert("status".into(), Value::from("running"));
    columns.insert("listing_id".into(), listing_id.map_or(Value::Null, Value::from));
    columns.insert("started_at".into(), Value::from(now_ms()));
    let row = repo::create(store, "sync_logs", columns).await?;
    let log: SyncLog = repo::decode("sync_logs", row)?;
    Ok(log.id)
}

async fn finish_log(
    store: &Store,
    id: &str,
    items: u64,
    pages: u32,
    error: Option<String>,
) -> AppResult<()> {
    let mut columns = Map::new();
    columns.insert(
        "status".into(),
        Value::from(if error.is_some() { "failed" } else { "completed" }),
    );
    columns.insert("items_processed".into(), Value::from(items));
    columns.insert("pages".into(), Value::from(pages));
    columns.insert("error_message".into(), error.map_or(Value::Null, Value::from));
    columns.insert("finished_at".into(), Value::from(now_ms()));
    repo::update(store, "sync_logs", id, columns).await?;
    Ok(())
}

/// Close the log row with the outcome, then hand the outcome back.
async fn settle<T>(
    store: &Store,
    log_id: &str,
    scope: OpScope,
    result: AppResult<T>,
    counts: impl Fn(&T) -> (u64, u32),
) -> AppResult<T> {
    let (items, pages, error) = match &result {
        Ok(value) => {
            let (items, pages) = counts(value);
            (items, pages, None)
        }
        Err(err) => (0, 0, Some(err.message().to_string())),
    };
    if let Err(log_err) = finish_log(store, log_id, items, pages, error).await {
        log_err.log_with_event("sync_log_finish_failed");
    }
    scope.finish(store, result).await
}

pub async fn list_sync_logs(store: &Store, limit: i64) -> AppResult<Vec<SyncLog>> {
    let query = ListQuery::new().order_by("started_at DESC, id DESC").limit(limit);
    repo::list(store, "sync_logs", &query)
        .await?
        .into_iter()
        .map(|row| repo::decode("sync_logs", row))
        .collect()
}

fn sync_failed(function: &str, errors: &[String]) -> AppError {
    let message = if errors.is_empty() {
        "Sync reported failure".to_string()
    } else {
        errors.join("; ")
    };
    AppError::new("SYNC/FAILED", message).with_context("function", function)
}

// Record mirroring

fn address_text(address: &Value) -> Option<String> {
    match address {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map
            .get("full")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Per-record validation failures skip the record; anything else aborts.
fn skip_invalid(err: AppError, kind: &str, record_id: &str) -> AppResult<String> {
    if !err.code().starts_with("VALIDATION/") {
        return Err(err);
    }
    tracing::warn!(
        target: "villaops",
        event = "guesty_record_invalid",
        kind = kind,
        record_id = %record_id,
        code = %err.code(),
        error = %err.message(),
    );
    Ok(format!("{kind} {record_id}: {}", err.message()))
}

/// Returns false when the listing was skipped; the reason lands in `errors`.
async fn mirror_listing(
    store: &Store,
    listing: &ListingRecord,
    errors: &mut Vec<String>,
) -> AppResult<bool> {
    let input = PropertyInput {
        name: listing
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Listing {}", listing.id)),
        address: listing.address.as_ref().and_then(address_text),
        guesty_listing_id: Some(listing.id.clone()),
        bedrooms: listing.bedrooms.unwrap_or(0).max(0),
        bathrooms: listing.bathrooms.map_or(0, |b| b.ceil() as i64).max(0),
        max_guests: listing.accommodates.unwrap_or(0).max(0),
    };
    let written = match properties::find_by_listing(store, &listing.id).await? {
        Some(existing) => properties::update(store, &existing.id, &input).await.map(drop),
        None => properties::create(store, &input).await.map(drop),
    };
    if let Err(err) = written {
        errors.push(skip_invalid(err, "listing", &listing.id)?);
        return Ok(false);
    }
    Ok(true)
}

/// Returns false when the reservation was skipped.
async fn mirror_reservation(
    store: &Store,
    record: &ReservationRecord,
    errors: &mut Vec<String>,
) -> AppResult<bool> {
    let Some(property) = properties::find_by_listing(store, &record.listing_id).await? else {
        tracing::warn!(
            target: "villaops",
            event = "guesty_reservation_unknown_listing",
            reservation_id = %record.id,
            listing_id = %record.listing_id,
        );
        return Ok(false);
    };
    let (Some(check_in), Some(check_out)) = (parse_date(&record.check_in), parse_date(&record.check_out)) else {
        tracing::warn!(
            target: "villaops",
            event = "guesty_reservation_bad_dates",
            reservation_id = %record.id,
            check_in = %record.check_in,
            check_out = %record.check_out,
        );
        return Ok(false);
    };
    let input = BookingInput {
        property_id: property.id,
        guest_name: record
            .guest_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "Guest".to_string()),
        check_in: format_date(check_in),
        check_out: format_date(check_out),
        guesty_reservation_id: Some(record.id.clone()),
        status: record.status.clone(),
        total_amount: record.total_price.filter(|p| *p >= 0.0),
    };
    let written = match bookings::find_by_reservation(store, &record.id).await? {
        Some(existing) => bookings::update(store, &existing.id, &input).await.map(drop),
        None => bookings::create(store, &input).await.map(drop),
    };
    if let Err(err) = written {
        errors.push(skip_invalid(err, "reservation", &record.id)?);
        return Ok(false);
    }
    Ok(true)
}

fn records<T: DeserializeOwned>(response: &Value, field: &str) -> Vec<T> {
    let Some(items) = response.get(field).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(target: "villaops", event = "guesty_record_skipped", field = field, error = %err);
                None
            }
        })
        .collect()
}

// Operations

async fn fetch_listings(store: &Store, functions: &dyn RemoteFunctions) -> AppResult<SyncSummary> {
    let response = functions
        .invoke(GUESTY_SYNC, json!({ "action": "sync_listings" }))
        .await?;
    let mut summary: SyncSummary = serde_json::from_value(response.clone())?;
    if !summary.success {
        return Err(sync_failed(GUESTY_SYNC, &summary.errors));
    }
    for listing in records::<ListingRecord>(&response, "listings") {
        mirror_listing(store, &listing, &mut summary.errors).await?;
    }
    tracing::info!(
        target: "villaops",
        event = "guesty_listings_synced",
        listings = summary.listings_count,
        bookings = summary.bookings_synced,
        errors = summary.errors.len(),
    );
    Ok(summary)
}

pub async fn sync_listings(store: &Store, functions: &dyn RemoteFunctions) -> AppResult<SyncSummary> {
    let scope = OpScope::new("guesty_sync_listings");
    let log_id = start_log(store, "listings", None).await?;
    let result = fetch_listings(store, functions).await;
    settle(store, &log_id, scope, result, |s| (s.listings_count, 1)).await
}

async fn fetch_booking_page(
    store: &Store,
    functions: &dyn RemoteFunctions,
    listing_id: &str,
    start_index: u64,
) -> AppResult<BookingSyncPage> {
    let response = functions
        .invoke(
            GUESTY_BOOKING_SYNC,
            json!({ "listingId": listing_id, "startIndex": start_index }),
        )
        .await?;
    let mut page: BookingSyncPage = serde_json::from_value(response.clone())?;
    if !page.success {
        return Err(sync_failed(GUESTY_BOOKING_SYNC, &page.errors)
            .with_context("listing_id", listing_id)
            .with_context("start_index", start_index.to_string()));
    }
    for record in records::<ReservationRecord>(&response, "bookings") {
        mirror_reservation(store, &record, &mut page.errors).await?;
    }
    Ok(page)
}

pub async fn sync_bookings_for_listing(
    store: &Store,
    functions: &dyn RemoteFunctions,
    listing_id: &str,
    start_index: u64,
) -> AppResult<BookingSyncPage> {
    let scope = OpScope::new("guesty_sync_booking_page");
    let log_id = start_log(store, "bookings_page", Some(listing_id)).await?;
    let result = fetch_booking_page(store, functions, listing_id, start_index).await;
    settle(store, &log_id, scope, result, |p| (p.bookings_synced, 1)).await
}

/// Walk every booking page for a listing, at most `options.max_pages` calls.
pub async fn sync_all_bookings(
    store: &Store,
    functions: &dyn RemoteFunctions,
    listing_id: &str,
    options: SyncOptions,
) -> AppResult<BookingSyncSummary> {
    let scope = OpScope::new("guesty_sync_all_bookings");
    let log_id = start_log(store, "bookings", Some(listing_id)).await?;
    let result = retry::paginate(0, options.max_pages, options.delay, |start| async move {
        let page = fetch_booking_page(store, functions, listing_id, start).await?;
        let next = page
            .has_more
            .then(|| page.next_index.unwrap_or(start + page.bookings_synced));
        Ok(Page { items: page, next })
    })
    .await
    .map(|paged| {
        let mut summary = BookingSyncSummary {
            listing_id: listing_id.to_string(),
            pages: paged.pages.len() as u32,
            truncated: paged.truncated,
            ..BookingSyncSummary::default()
        };
        for page in paged.pages {
            summary.bookings_synced += page.bookings_synced;
            summary.errors.extend(page.errors);
        }
        summary
    });
    settle(store, &log_id, scope, result, |s| (s.bookings_synced, s.pages)).await
}

/// Probe the integration and persist the observation. A failed probe is a
/// recorded `error` status, not an error return.
pub async fn health_check(store: &Store, functions: &dyn RemoteFunctions) -> AppResult<IntegrationHealth> {
    let started = Instant::now();
    let outcome = functions.invoke(GUESTY_HEALTH_CHECK, json!({})).await;
    let latency_ms = started.elapsed().as_millis() as i64;
    let (status, message) = match outcome {
        Ok(body) => {
            let healthy = body.get("success").and_then(Value::as_bool).unwrap_or(true);
            let status = body
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| if healthy { "healthy" } else { "degraded" }.to_string());
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            (status, message)
        }
        Err(err) => {
            err.log_with_event("guesty_health_check_failed");
            ("error".to_string(), Some(err.message().to_string()))
        }
    };

    let mut columns = Map::new();
    columns.insert("service".into(), Value::from(SERVICE));
    columns.insert("status".into(), Value::from(status));
    columns.insert("message".into(), message.map_or(Value::Null, Value::from));
    columns.insert("latency_ms".into(), Value::from(latency_ms));
    columns.insert("checked_at".into(), Value::from(now_ms()));
    let row = repo::create(store, "integration_health", columns).await?;
    repo::decode("integration_health", row)
}

pub async fn latest_health(store: &Store) -> AppResult<Option<IntegrationHealth>> {
    let query = ListQuery::new()
        .eq("service", SERVICE)
        .order_by("checked_at DESC, id DESC")
        .limit(1);
    repo::list(store, "integration_health", &query)
        .await?
        .into_iter()
        .next()
        .map(|row| repo::decode("integration_health", row))
        .transpose()
}
