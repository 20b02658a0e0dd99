//! In-process row-change feed.
//!
//! Every successful write through [`crate::repo`] publishes a [`ChangeEvent`].
//! Consumers subscribe with a [`ChangeFilter`] (a table plus an optional
//! `column=eq.value` predicate) and receive only matching events until the
//! [`Subscription`] is dropped or explicitly unsubscribed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use ts_rs::TS;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub id: String,
    /// Row after the change; for deletes, the row as it was before removal.
    #[ts(type = "Record<string, unknown>")]
    pub record: Value,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("expected `column=eq.value`, got {0:?}")]
    Malformed(String),
    #[error("unsupported operator {0:?}; only `eq` is supported")]
    UnsupportedOperator(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: String,
    pub column_eq: Option<(String, String)>,
}

impl ChangeFilter {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column_eq: None,
        }
    }

    pub fn with_eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.column_eq = Some((column.into(), value.into()));
        self
    }

    /// Parse the `column=eq.value` predicate form.
    pub fn parse(table: impl Into<String>, predicate: &str) -> Result<Self, FilterParseError> {
        let (column, rest) = predicate
            .split_once('=')
            .ok_or_else(|| FilterParseError::Malformed(predicate.to_string()))?;
        let (op, value) = rest
            .split_once('.')
            .ok_or_else(|| FilterParseError::Malformed(predicate.to_string()))?;
        if column.trim().is_empty() {
            return Err(FilterParseError::Malformed(predicate.to_string()));
        }
        if op != "eq" {
            return Err(FilterParseError::UnsupportedOperator(op.to_string()));
        }
        Ok(Self::table(table).with_eq(column.trim(), value))
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        match &self.column_eq {
            None => true,
            Some((column, expected)) => match event.record.get(column) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Number(n)) => n.to_string() == *expected,
                Some(Value::Bool(b)) => b.to_string() == *expected,
                _ => false,
            },
        }
    }
}

#[derive(Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<ChangeEvent>,
    active: Arc<AtomicUsize>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No receivers is the normal case when nothing is listening.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        self.active.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            target: "villaops",
            event = "realtime_subscribe",
            table = %filter.table,
            predicate = ?filter.column_eq,
        );
        Subscription {
            rx: self.tx.subscribe(),
            filter,
            active: self.active.clone(),
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: ChangeFilter,
    active: Arc<AtomicUsize>,
}

impl Subscription {
    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    /// Wait for the next matching event. Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "villaops",
                        event = "realtime_lagged",
                        table = %self.filter.table,
                        skipped = skipped,
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll for an already-delivered matching event.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(target: "villaops", event = "realtime_unsubscribe", table = %self.filter.table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(table: &str, record: Value) -> ChangeEvent {
        ChangeEvent {
            table: table.into(),
            kind: ChangeKind::Update,
            id: record["id"].as_str().unwrap_or_default().into(),
            record,
        }
    }

    #[test]
    fn parses_eq_predicates() {
        let filter = ChangeFilter::parse("user_permissions", "user_id=eq.u-1").unwrap();
        assert_eq!(
            filter.column_eq,
            Some(("user_id".to_string(), "u-1".to_string()))
        );
        assert_eq!(
            ChangeFilter::parse("t", "user_id=gt.3"),
            Err(FilterParseError::UnsupportedOperator("gt".into()))
        );
        assert!(matches!(
            ChangeFilter::parse("t", "user_id"),
            Err(FilterParseError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn delivers_only_matching_events() {
        let hub = RealtimeHub::new();
        let mut sub = hub.subscribe(ChangeFilter::table("user_permissions").with_eq("user_id", "u-1"));

        hub.publish(event("bookings", json!({"id": "b", "user_id": "u-1"})));
        hub.publish(event("user_permissions", json!({"id": "p0", "user_id": "u-2"})));
        hub.publish(event("user_permissions", json!({"id": "p1", "user_id": "u-1"})));

        let got = sub.recv().await.expect("event");
        assert_eq!(got.id, "p1");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn numeric_columns_compare_textually() {
        let filter = ChangeFilter::table("inventory_items").with_eq("quantity", "3");
        assert!(filter.matches(&event("inventory_items", json!({"id": "i", "quantity": 3}))));
        assert!(!filter.matches(&event("inventory_items", json!({"id": "i", "quantity": 4}))));
    }

    #[test]
    fn dropping_a_subscription_unsubscribes() {
        let hub = RealtimeHub::new();
        let first = hub.subscribe(ChangeFilter::table("bookings"));
        let second = hub.subscribe(ChangeFilter::table("bookings"));
        assert_eq!(hub.active_subscriptions(), 2);
        drop(first);
        assert_eq!(hub.active_subscriptions(), 1);
        second.unsubscribe();
        assert_eq!(hub.active_subscriptions(), 0);
    }
}
