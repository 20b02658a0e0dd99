use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::repo::{self, ListQuery};
use crate::state::Store;
use crate::time::{format_date, parse_date};
use crate::validation::{self, Entity};
use crate::{AppError, AppResult};

const TABLE: &str = "bookings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Booking {
    pub id: String,
    pub property_id: String,
    pub guesty_reservation_id: Option<String>,
    pub guest_name: String,
    /// `YYYY-MM-DD`, kept as text because upstream data is not always clean.
    pub check_in: String,
    pub check_out: String,
    pub status: String,
    pub total_amount: Option<f64>,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

impl Booking {
    pub fn check_in_date(&self) -> Option<NaiveDate> {
        parse_date(&self.check_in)
    }

    pub fn check_out_date(&self) -> Option<NaiveDate> {
        parse_date(&self.check_out)
    }

    /// Nights between check-in and check-out; `None` if either date is
    /// unparsable or the range is inverted.
    pub fn nights(&self) -> Option<i64> {
        let nights = (self.check_out_date()? - self.check_in_date()?).num_days();
        (nights >= 0).then_some(nights)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.eq_ignore_ascii_case("cancelled") || self.status.eq_ignore_ascii_case("canceled")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BookingInput {
    pub property_id: String,
    pub guest_name: String,
    pub check_in: String,
    pub check_out: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guesty_reservation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
}

fn validate_input(input: &BookingInput) -> AppResult<serde_json::Map<String, Value>> {
    let columns = repo::to_columns(input)?;
    validation::validate(Entity::Booking, &Value::Object(columns.clone()))?;
    let (Some(check_in), Some(check_out)) = (parse_date(&input.check_in), parse_date(&input.check_out))
    else {
        return Err(AppError::new("VALIDATION/DATE", "Check-in and check-out must be valid dates"));
    };
    if check_out <= check_in {
        return Err(AppError::new(
            "VALIDATION/DATE_RANGE",
            "Check-out must be after check-in",
        )
        .with_context("check_in", input.check_in.clone())
        .with_context("check_out", input.check_out.clone()));
    }
    Ok(columns)
}

pub async fn create(store: &Store, input: &BookingInput) -> AppResult<Booking> {
    let columns = validate_input(input)?;
    let row = repo::create(store, TABLE, columns).await?;
    repo::decode(TABLE, row)
}

pub async fn get(store: &Store, id: &str) -> AppResult<Option<Booking>> {
    repo::get(store, TABLE, id)
        .await?
        .map(|row| repo::decode(TABLE, row))
        .transpose()
}

pub async fn update(store: &Store, id: &str, input: &BookingInput) -> AppResult<Booking> {
    let columns = validate_input(input)?;
    let row = repo::update(store, TABLE, id, columns).await?;
    repo::decode(TABLE, row)
}

pub async fn set_status(store: &Store, id: &str, status: &str) -> AppResult<Booking> {
    let mut columns = serde_json::Map::new();
    columns.insert("status".into(), Value::from(status));
    let row = repo::update(store, TABLE, id, columns).await?;
    repo::decode(TABLE, row)
}

pub async fn delete(store: &Store, id: &str) -> AppResult<()> {
    repo::delete(store, TABLE, id).await
}

pub async fn find_by_reservation(store: &Store, reservation_id: &str) -> AppResult<Option<Booking>> {
    let query = ListQuery::new()
        .eq("guesty_reservation_id", reservation_id)
        .limit(1);
    repo::list(store, TABLE, &query)
        .await?
        .into_iter()
        .next()
        .map(|row| repo::decode(TABLE, row))
        .transpose()
}

pub async fn list_for_property(store: &Store, property_id: &str) -> AppResult<Vec<Booking>> {
    let query = ListQuery::new()
        .eq("property_id", property_id)
        .order_by("check_in, id");
    repo::list(store, TABLE, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode(TABLE, row))
        .collect()
}

pub async fn list_all(store: &Store) -> AppResult<Vec<Booking>> {
    let query = ListQuery::new().order_by("check_in, id");
    repo::list(store, TABLE, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode(TABLE, row))
        .collect()
}

/// Bookings (optionally for one property) that overlap `[from, to]`.
/// Cancelled bookings and rows with unparsable dates are left out.
pub async fn list_in_window(
    store: &Store,
    property_id: Option<&str>,
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<Vec<Booking>> {
    let bookings = match property_id {
        Some(id) => list_for_property(store, id).await?,
        None => list_all(store).await?,
    };
    Ok(bookings
        .into_iter()
        .filter(|b| !b.is_cancelled())
        .filter(|b| match (b.check_in_date(), b.check_out_date()) {
            (Some(start), Some(end)) => start <= to && end >= from,
            _ => false,
        })
        .collect())
}

/// Every calendar day from check-in through check-out inclusive, sorted and
/// deduplicated. Bookings with unparsable or inverted dates are skipped.
pub fn booked_dates(bookings: &[Booking]) -> Vec<NaiveDate> {
    let mut days = BTreeSet::new();
    for booking in bookings {
        let (Some(start), Some(end)) = (booking.check_in_date(), booking.check_out_date()) else {
            tracing::warn!(
                target: "villaops",
                event = "calendar_skip_booking",
                booking_id = %booking.id,
                check_in = %booking.check_in,
                check_out = %booking.check_out,
            );
            continue;
        };
        if end < start {
            tracing::warn!(target: "villaops", event = "calendar_inverted_booking", booking_id = %booking.id);
            continue;
        }
        days.extend(start.iter_days().take_while(|day| *day <= end));
    }
    days.into_iter().collect()
}

pub fn booked_date_strings(bookings: &[Booking]) -> Vec<String> {
    booked_dates(bookings).into_iter().map(format_date).collect()
}

/// Bookings whose night count lies within `[min_nights, max_nights]`.
pub fn filter_by_stay_length(bookings: &[Booking], min_nights: i64, max_nights: i64) -> Vec<&Booking> {
    bookings
        .iter()
        .filter(|b| matches!(b.nights(), Some(n) if n >= min_nights && n <= max_nights))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(id: &str, check_in: &str, check_out: &str) -> Booking {
        Booking {
            id: id.into(),
            property_id: "p1".into(),
            guesty_reservation_id: None,
            guest_name: "Guest".into(),
            check_in: check_in.into(),
            check_out: check_out.into(),
            status: "confirmed".into(),
            total_amount: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn nights_counts_days_between_dates() {
        assert_eq!(booking("a", "2025-06-01", "2025-06-05").nights(), Some(4));
        assert_eq!(booking("b", "2025-06-01", "nope").nights(), None);
        assert_eq!(booking("c", "2025-06-05", "2025-06-01").nights(), None);
    }

    #[test]
    fn calendar_marks_inclusive_ranges() {
        let days = booked_date_strings(&[booking("a", "2025-06-29", "2025-07-02")]);
        assert_eq!(
            days,
            vec!["2025-06-29", "2025-06-30", "2025-07-01", "2025-07-02"]
        );
    }

    #[test]
    fn calendar_skips_unparsable_bookings_and_dedupes() {
        let days = booked_dates(&[
            booking("a", "2025-01-01", "2025-01-02"),
            booking("bad", "first of jan", "2025-01-05"),
            booking("b", "2025-01-02", "2025-01-03"),
        ]);
        assert_eq!(days.len(), 3);
        assert_eq!(format_date(days[0]), "2025-01-01");
        assert_eq!(format_date(days[2]), "2025-01-03");
    }

    #[test]
    fn stay_length_filter_is_inclusive() {
        let bookings = vec![
            booking("four", "2025-06-01", "2025-06-05"),
            booking("ten", "2025-06-01", "2025-06-11"),
            booking("three", "2025-06-01", "2025-06-04"),
            booking("broken", "x", "y"),
        ];
        let ids: Vec<&str> = filter_by_stay_length(&bookings, 3, 6)
            .into_iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(ids, vec!["four", "three"]);
    }
}
