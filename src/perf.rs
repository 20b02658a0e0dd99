use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use ts_rs::TS;

use crate::repo;
use crate::state::Store;
use crate::{AppError, AppResult};

const TABLE: &str = "performance_logs";

fn context_to_json(context: &HashMap<String, String>) -> Option<Value> {
    if context.is_empty() {
        return None;
    }
    let map: Map<String, Value> = context
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Some(Value::Object(map))
}

fn wrap_details(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        json!({ "value": value })
    }
}

fn is_validation_error(code: &str) -> bool {
    code.starts_with("VALIDATION/") || code.starts_with("RULES/")
}

/// Times one operation; on completion logs the outcome and records a
/// `performance_logs` row. Recording failures are logged, never returned.
pub struct OpScope {
    operation: &'static str,
    start: Instant,
}

impl OpScope {
    pub fn new(operation: &'static str) -> Self {
        debug!(target: "villaops", event = "op_enter", operation = operation);
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub async fn success(self, store: &Store, details: Value) {
        let details = wrap_details(details);
        let duration_ms = self.elapsed_ms();
        info!(
            target: "villaops",
            event = "op_success",
            operation = self.operation,
            duration_ms = duration_ms,
            details = %details
        );
        self.record(store, duration_ms, true, details).await;
    }

    pub async fn fail(self, store: &Store, err: &AppError) {
        let mut map = Map::new();
        map.insert("code".into(), Value::String(err.code().to_string()));
        map.insert("message".into(), Value::String(err.message().to_string()));
        if let Some(context) = context_to_json(err.context()) {
            map.insert("context".into(), context);
        }
        let details = Value::Object(map);
        let duration_ms = self.elapsed_ms();
        if is_validation_error(err.code()) {
            warn!(target: "villaops", event = "op_rejected", operation = self.operation, duration_ms = duration_ms, details = %details);
        } else {
            error!(target: "villaops", event = "op_failed", operation = self.operation, duration_ms = duration_ms, details = %details);
        }
        self.record(store, duration_ms, false, details).await;
    }

    /// Record the outcome of `result` and hand it back unchanged.
    pub async fn finish<T>(self, store: &Store, result: AppResult<T>) -> AppResult<T> {
        match &result {
            Ok(_) => self.success(store, Value::Null).await,
            Err(err) => self.fail(store, err).await,
        }
        result
    }

    async fn record(&self, store: &Store, duration_ms: u64, success: bool, details: Value) {
        let mut columns = Map::new();
        columns.insert("operation".into(), Value::from(self.operation));
        columns.insert("duration_ms".into(), Value::from(duration_ms));
        columns.insert("success".into(), Value::Bool(success));
        columns.insert("details".into(), Value::from(details.to_string()));
        if let Err(err) = repo::create(store, TABLE, columns).await {
            warn!(
                target: "villaops",
                event = "perf_record_failed",
                operation = self.operation,
                code = %err.code(),
                error = %err.message()
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct OperationStats {
    pub operation: String,
    pub runs: i64,
    pub failures: i64,
    pub avg_ms: f64,
    pub max_ms: i64,
}

/// Per-operation run counts and durations, slowest average first.
pub async fn operation_stats(store: &Store) -> AppResult<Vec<OperationStats>> {
    let rows: Vec<(String, i64, i64, f64, i64)> = sqlx::query_as(
        "SELECT operation, COUNT(*), SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), \
                AVG(duration_ms), MAX(duration_ms) \
         FROM performance_logs GROUP BY operation ORDER BY AVG(duration_ms) DESC, operation",
    )
    .fetch_all(store.pool())
    .await?;
    Ok(rows
        .into_iter()
        .map(|(operation, runs, failures, avg_ms, max_ms)| OperationStats {
            operation,
            runs,
            failures,
            avg_ms,
            max_ms,
        })
        .collect())
}
