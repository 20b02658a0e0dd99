//! Key/value JSON preferences kept next to the operational data.

use std::collections::BTreeMap;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::db::run_in_tx;
use crate::state::Store;
use crate::time::now_ms;
use crate::{AppError, AppResult};

pub const NOTIFICATIONS_KEY: &str = "notifications.enabled";

const MAX_KEY_LEN: usize = 128;

fn check_key(key: &str) -> AppResult<()> {
    if key.trim().is_empty() || key.len() > MAX_KEY_LEN {
        return Err(AppError::new("VALIDATION/PREFERENCE_KEY", "Invalid preference key").with_context("key", key));
    }
    Ok(())
}

pub async fn get(store: &Store, key: &str) -> AppResult<Option<Value>> {
    check_key(key)?;
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM app_preferences WHERE key = ?")
        .bind(key)
        .fetch_optional(store.pool())
        .await?;
    row.map(|(text,)| {
        serde_json::from_str(&text).map_err(|err| AppError::from(err).with_context("key", key))
    })
    .transpose()
}

pub async fn get_as<T: DeserializeOwned>(store: &Store, key: &str) -> AppResult<Option<T>> {
    get(store, key)
        .await?
        .map(|value| serde_json::from_value(value).map_err(|err| AppError::from(err).with_context("key", key)))
        .transpose()
}

pub async fn set(store: &Store, key: &str, value: &Value) -> AppResult<()> {
    check_key(key)?;
    sqlx::query(
        "INSERT INTO app_preferences (key, value, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value.to_string())
    .bind(now_ms())
    .execute(store.pool())
    .await?;
    tracing::debug!(target: "villaops", event = "preference_set", key = key);
    Ok(())
}

pub async fn set_as<T: Serialize>(store: &Store, key: &str, value: &T) -> AppResult<()> {
    set(store, key, &serde_json::to_value(value)?).await
}

/// Returns whether a value was removed.
pub async fn remove(store: &Store, key: &str) -> AppResult<bool> {
    check_key(key)?;
    let res = sqlx::query("DELETE FROM app_preferences WHERE key = ?")
        .bind(key)
        .execute(store.pool())
        .await?;
    Ok(res.rows_affected() > 0)
}

/// All preferences. Values that no longer parse are skipped with a warning.
pub async fn list(store: &Store) -> AppResult<BTreeMap<String, Value>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM app_preferences ORDER BY key")
        .fetch_all(store.pool())
        .await?;
    let mut out = BTreeMap::new();
    for (key, text) in rows {
        match serde_json::from_str(&text) {
            Ok(value) => {
                out.insert(key, value);
            }
            Err(err) => {
                tracing::warn!(target: "villaops", event = "preference_unreadable", key = %key, error = %err);
            }
        }
    }
    Ok(out)
}

/// Make the stored preferences exactly `values`. Keys missing from `values`
/// are removed; all of it lands in one transaction or not at all.
pub async fn replace_all(store: &Store, values: &BTreeMap<String, Value>) -> AppResult<()> {
    for key in values.keys() {
        check_key(key)?;
    }
    let rows: Vec<(String, String)> = values
        .iter()
        .map(|(key, value)| (key.clone(), value.to_string()))
        .collect();
    let removed = run_in_tx(store.pool(), move |tx| {
        async move {
            let now = now_ms();
            let removed = sqlx::query("DELETE FROM app_preferences")
                .execute(&mut **tx)
                .await?
                .rows_affected();
            for (key, text) in rows {
                sqlx::query("INSERT INTO app_preferences (key, value, updated_at) VALUES (?, ?, ?)")
                    .bind(key)
                    .bind(text)
                    .bind(now)
                    .execute(&mut **tx)
                    .await?;
            }
            Ok::<_, AppError>(removed)
        }
        .boxed()
    })
    .await?;
    tracing::debug!(target: "villaops", event = "preferences_replaced", count = values.len(), cleared = removed);
    Ok(())
}

pub async fn notifications_enabled(store: &Store) -> AppResult<bool> {
    Ok(get(store, NOTIFICATIONS_KEY)
        .await?
        .and_then(|v| v.as_bool())
        .unwrap_or(true))
}

pub async fn set_notifications_enabled(store: &Store, enabled: bool) -> AppResult<()> {
    set(store, NOTIFICATIONS_KEY, &Value::Bool(enabled)).await
}
