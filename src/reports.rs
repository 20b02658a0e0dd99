use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use ts_rs::TS;

use crate::bookings::{self, Booking};
use crate::housekeeping::{self, HousekeepingTask, TaskFilter, TaskStatus};
use crate::inventory::{self, InventoryItem};
use crate::maintenance::{self, MaintenanceTask};
use crate::properties;
use crate::state::Store;
use crate::time::format_date;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Window {
    pub fn new(from: NaiveDate, to: NaiveDate) -> AppResult<Self> {
        if to < from {
            return Err(AppError::new("VALIDATION/DATE_RANGE", "Report window ends before it starts")
                .with_context("from", format_date(from))
                .with_context("to", format_date(to)));
        }
        Ok(Self { from, to })
    }

    /// Nights in the window, counting both end dates.
    pub fn nights(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct Occupancy {
    pub property_id: Option<String>,
    pub from: String,
    pub to: String,
    pub available_nights: i64,
    pub booked_nights: i64,
    pub rate_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct TaskSummary {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Completed share of non-cancelled tasks, 0..=100.
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct InventorySummary {
    pub items: usize,
    pub low_stock: usize,
    pub stock_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct Dashboard {
    pub active_properties: usize,
    pub occupancy: Occupancy,
    pub average_stay: Option<f64>,
    pub housekeeping: TaskSummary,
    pub open_maintenance: usize,
    pub inventory: InventorySummary,
}

/// Nights occupied inside the window. A night belongs to the date it starts
/// on, so the check-out date itself is free. Overlaps count once per
/// property.
pub fn occupied_nights(bookings: &[Booking], window: Window) -> i64 {
    let mut nights: BTreeSet<(&str, NaiveDate)> = BTreeSet::new();
    for booking in bookings.iter().filter(|b| !b.is_cancelled()) {
        let (Some(start), Some(end)) = (booking.check_in_date(), booking.check_out_date()) else {
            continue;
        };
        let first = start.max(window.from);
        for day in first.iter_days().take_while(|d| *d < end && *d <= window.to) {
            nights.insert((booking.property_id.as_str(), day));
        }
    }
    nights.len() as i64
}

pub fn occupancy_for(bookings: &[Booking], window: Window, property_count: usize, property_id: Option<&str>) -> Occupancy {
    let available = window.nights() * property_count as i64;
    let booked = occupied_nights(bookings, window);
    let rate = if available > 0 {
        (booked as f64 / available as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };
    Occupancy {
        property_id: property_id.map(str::to_string),
        from: format_date(window.from),
        to: format_date(window.to),
        available_nights: available,
        booked_nights: booked,
        rate_percent: rate,
    }
}

pub fn average_stay(bookings: &[Booking]) -> Option<f64> {
    let stays: Vec<i64> = bookings
        .iter()
        .filter(|b| !b.is_cancelled())
        .filter_map(Booking::nights)
        .filter(|n| *n > 0)
        .collect();
    if stays.is_empty() {
        return None;
    }
    Some(stays.iter().sum::<i64>() as f64 / stays.len() as f64)
}

pub fn summarize_tasks(tasks: &[HousekeepingTask]) -> TaskSummary {
    let mut by_status: BTreeMap<String, usize> = TaskStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for task in tasks {
        *by_status.entry(task.status.as_str().to_string()).or_default() += 1;
    }
    let completed = by_status[TaskStatus::Completed.as_str()];
    let live = tasks.len() - by_status[TaskStatus::Cancelled.as_str()];
    let completion_rate = if live > 0 {
        (completed as f64 / live as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };
    TaskSummary {
        total: tasks.len(),
        by_status,
        completion_rate,
    }
}

pub fn summarize_inventory(items: &[InventoryItem]) -> InventorySummary {
    InventorySummary {
        items: items.len(),
        low_stock: items.iter().filter(|i| i.is_low_stock()).count(),
        stock_value: items.iter().map(InventoryItem::stock_value).sum(),
    }
}

pub async fn occupancy(store: &Store, property_id: Option<&str>, window: Window) -> AppResult<Occupancy> {
    let bookings = bookings::list_in_window(store, property_id, window.from, window.to).await?;
    let property_count = match property_id {
        Some(_) => 1,
        None => properties::list(store, true).await?.len(),
    };
    Ok(occupancy_for(&bookings, window, property_count, property_id))
}

async fn window_bookings(store: &Store, window: Window) -> AppResult<Vec<Booking>> {
    bookings::list_in_window(store, None, window.from, window.to).await
}

async fn window_tasks(store: &Store, window: Window) -> AppResult<Vec<HousekeepingTask>> {
    let filter = TaskFilter {
        from: Some(window.from),
        to: Some(window.to),
        ..TaskFilter::default()
    };
    housekeeping::list(store, &filter).await
}

async fn open_maintenance(store: &Store) -> AppResult<Vec<MaintenanceTask>> {
    Ok(maintenance::list(store, None, None)
        .await?
        .into_iter()
        .filter(|t| t.status.is_open())
        .collect())
}

/// The independent aggregates are fetched concurrently and joined; the first
/// failure fails the whole dashboard.
pub async fn dashboard(store: &Store, window: Window) -> AppResult<Dashboard> {
    let (active, bookings, tasks, maintenance, items) = tokio::try_join!(
        properties::list(store, true),
        window_bookings(store, window),
        window_tasks(store, window),
        open_maintenance(store),
        inventory::list_items(store, None),
    )?;
    // Capacity only counts active properties, so bookings must match.
    let active_ids: BTreeSet<&str> = active.iter().map(|p| p.id.as_str()).collect();
    let bookings: Vec<Booking> = bookings
        .into_iter()
        .filter(|b| active_ids.contains(b.property_id.as_str()))
        .collect();
    tracing::debug!(
        target: "villaops",
        event = "dashboard_loaded",
        properties = active.len(),
        bookings = bookings.len(),
        tasks = tasks.len(),
    );
    Ok(Dashboard {
        active_properties: active.len(),
        occupancy: occupancy_for(&bookings, window, active.len(), None),
        average_stay: average_stay(&bookings),
        housekeeping: summarize_tasks(&tasks),
        open_maintenance: maintenance.len(),
        inventory: summarize_inventory(&items),
    })
}
