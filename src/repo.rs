use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};

use crate::id::new_uuid_v7;
use crate::realtime::{ChangeEvent, ChangeKind};
use crate::state::Store;
use crate::time::now_ms;
use crate::{AppError, AppResult};

pub const DOMAIN_TABLES: &[&str] = &[
    "properties",
    "bookings",
    "housekeeping_tasks",
    "maintenance_tasks",
    "inventory_items",
    "purchase_orders",
    "purchase_order_items",
    "cleaning_actions",
    "cleaning_rules",
    "rule_assignments",
    "user_profiles",
    "user_permissions",
    "sync_logs",
    "integration_health",
    "performance_logs",
];

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("static regex"));

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

pub fn ensure_table(table: &str) -> AppResult<()> {
    if DOMAIN_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(AppError::new("REPO/INVALID_TABLE", "Unknown table").with_context("table", table))
    }
}

fn ensure_column(column: &str) -> AppResult<()> {
    if IDENT_RE.is_match(column) {
        Ok(())
    } else {
        Err(AppError::new("REPO/INVALID_COLUMN", "Invalid column name")
            .with_context("column", column))
    }
}

/// Validate an `ORDER BY` clause of the form `col [ASC|DESC], ...`.
fn order_clause(order_by: &str) -> AppResult<String> {
    let mut parts = Vec::new();
    for term in order_by.split(',') {
        let mut words = term.split_whitespace();
        let column = words.next().ok_or_else(|| {
            AppError::new("REPO/INVALID_ORDER", "Empty order term").with_context("order_by", order_by)
        })?;
        ensure_column(column)?;
        let direction = match words.next().map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") => "ASC",
            Some("DESC") => "DESC",
            Some(other) => {
                return Err(AppError::new("REPO/INVALID_ORDER", "Unknown sort direction")
                    .with_context("direction", other))
            }
        };
        if words.next().is_some() {
            return Err(AppError::new("REPO/INVALID_ORDER", "Malformed order term")
                .with_context("order_by", order_by));
        }
        parts.push(format!("{column} {direction}"));
    }
    Ok(parts.join(", "))
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.order_by = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Only applied together with a limit.
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

pub fn row_to_value(row: &SqliteRow) -> Value {
    let mut map = Map::new();
    for col in row.columns() {
        let idx = col.ordinal();
        let val = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(raw) => match raw.type_info().name() {
                "INTEGER" => row
                    .try_get::<i64, _>(idx)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                "REAL" => row
                    .try_get::<f64, _>(idx)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                _ => row
                    .try_get::<String, _>(idx)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
            },
            Err(_) => Value::Null,
        };
        map.insert(col.name().to_string(), val);
    }
    Value::Object(map)
}

pub fn bind_value<'q>(q: SqliteQuery<'q>, v: &Value) -> SqliteQuery<'q> {
    match v {
        Value::Null => q.bind(Option::<i64>::None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(Option::<i64>::None)
            }
        }
        Value::Bool(b) => q.bind(*b as i64),
        Value::String(s) => q.bind(s.clone()),
        // Arrays and objects are stored as JSON text.
        _ => q.bind(v.to_string()),
    }
}

pub async fn list(store: &Store, table: &str, query: &ListQuery) -> AppResult<Vec<Value>> {
    ensure_table(table)?;
    let mut sql = format!("SELECT * FROM {table}");
    if !query.filters.is_empty() {
        let mut clauses = Vec::with_capacity(query.filters.len());
        for (column, value) in &query.filters {
            ensure_column(column)?;
            if value.is_null() {
                clauses.push(format!("{column} IS NULL"));
            } else {
                clauses.push(format!("{column} = ?"));
            }
        }
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    let order = match query.order_by.as_deref() {
        Some(order) => order_clause(order)?,
        None => "created_at ASC, id ASC".to_string(),
    };
    sql.push_str(&format!(" ORDER BY {order}"));
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit.max(0)));
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {}", offset.max(0)));
        }
    }

    let mut q = sqlx::query(&sql);
    for (_, value) in query.filters.iter().filter(|(_, v)| !v.is_null()) {
        q = bind_value(q, value);
    }
    let rows = q.fetch_all(store.pool()).await.map_err(|err| {
        AppError::from(err)
            .with_context("operation", "list")
            .with_context("table", table)
    })?;
    Ok(rows.iter().map(row_to_value).collect())
}

pub async fn get(store: &Store, table: &str, id: &str) -> AppResult<Option<Value>> {
    ensure_table(table)?;
    let sql = format!("SELECT * FROM {table} WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(store.pool())
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "get")
                .with_context("table", table)
                .with_context("id", id)
        })?;
    Ok(row.as_ref().map(row_to_value))
}

pub async fn require(store: &Store, table: &str, id: &str) -> AppResult<Value> {
    get(store, table, id).await?.ok_or_else(|| {
        AppError::new("SQLX/ROW_NOT_FOUND", "Record not found")
            .with_context("table", table)
            .with_context("id", id)
    })
}

pub async fn create(store: &Store, table: &str, mut data: Map<String, Value>) -> AppResult<Value> {
    ensure_table(table)?;
    let id = data
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_uuid_v7);
    data.insert("id".into(), Value::String(id.clone()));
    let now = now_ms();
    data.entry(String::from("created_at"))
        .or_insert(Value::from(now));
    data.insert("updated_at".into(), Value::from(now));

    let cols: Vec<String> = data.keys().cloned().collect();
    for c in &cols {
        ensure_column(c)?;
    }
    let placeholders: Vec<&str> = cols.iter().map(|_| "?").collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        cols.join(","),
        placeholders.join(",")
    );
    let mut query = sqlx::query(&sql);
    for c in &cols {
        query = bind_value(query, &data[c.as_str()]);
    }
    query.execute(store.pool()).await.map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create")
            .with_context("table", table)
    })?;

    let record = require(store, table, &id).await?;
    store.changes().publish(ChangeEvent {
        table: table.to_string(),
        kind: ChangeKind::Insert,
        id,
        record: record.clone(),
    });
    Ok(record)
}

/// Last write wins: the provided columns overwrite whatever is stored.
pub async fn update(
    store: &Store,
    table: &str,
    id: &str,
    mut data: Map<String, Value>,
) -> AppResult<Value> {
    ensure_table(table)?;
    data.remove("id");
    data.remove("created_at");
    data.insert("updated_at".into(), Value::from(now_ms()));
    let cols: Vec<String> = data.keys().cloned().collect();
    for c in &cols {
        ensure_column(c)?;
    }
    let set_clause: Vec<String> = cols.iter().map(|c| format!("{c} = ?")).collect();
    let sql = format!("UPDATE {table} SET {} WHERE id = ?", set_clause.join(","));
    let mut query = sqlx::query(&sql);
    for c in &cols {
        query = bind_value(query, &data[c.as_str()]);
    }
    let res = query
        .bind(id)
        .execute(store.pool())
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "update")
                .with_context("table", table)
                .with_context("id", id)
        })?;
    if res.rows_affected() == 0 {
        return Err(AppError::new("SQLX/ROW_NOT_FOUND", "Record not found")
            .with_context("table", table)
            .with_context("id", id));
    }

    let record = require(store, table, id).await?;
    store.changes().publish(ChangeEvent {
        table: table.to_string(),
        kind: ChangeKind::Update,
        id: id.to_string(),
        record: record.clone(),
    });
    Ok(record)
}

pub async fn delete(store: &Store, table: &str, id: &str) -> AppResult<()> {
    let record = require(store, table, id).await?;
    let sql = format!("DELETE FROM {table} WHERE id = ?");
    sqlx::query(&sql)
        .bind(id)
        .execute(store.pool())
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "delete")
                .with_context("table", table)
                .with_context("id", id)
        })?;
    store.changes().publish(ChangeEvent {
        table: table.to_string(),
        kind: ChangeKind::Delete,
        id: id.to_string(),
        record,
    });
    Ok(())
}

/// Announce a row written outside the generic writers (e.g. inside a
/// transaction) once it is committed. Returns the current record.
pub async fn publish_current(store: &Store, table: &str, id: &str, kind: ChangeKind) -> AppResult<Value> {
    let record = require(store, table, id).await?;
    store.changes().publish(ChangeEvent {
        table: table.to_string(),
        kind,
        id: id.to_string(),
        record: record.clone(),
    });
    Ok(record)
}

/// Serialize a typed payload into the column map the generic writers expect.
pub fn to_columns<T: serde::Serialize>(value: &T) -> AppResult<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::new(
            "REPO/PAYLOAD",
            "Expected an object payload for table write",
        )),
    }
}

pub fn decode<T: DeserializeOwned>(table: &str, value: Value) -> AppResult<T> {
    serde_json::from_value(value).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "decode")
            .with_context("table", table)
    })
}

/// SQLite stores booleans as 0/1; accept either shape.
pub fn bool_from_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(other) => Err(de::Error::custom(format!("invalid flag value {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_clause_accepts_directions() {
        assert_eq!(
            order_clause("check_in desc, id").unwrap(),
            "check_in DESC, id ASC"
        );
    }

    #[test]
    fn order_clause_rejects_injection() {
        assert!(order_clause("id; DROP TABLE bookings").is_err());
        assert!(order_clause("id sideways").is_err());
        assert!(order_clause("").is_err());
    }

    #[test]
    fn unknown_tables_are_rejected() {
        let err = ensure_table("sqlite_master").unwrap_err();
        assert_eq!(err.code(), "REPO/INVALID_TABLE");
    }

    #[test]
    fn bool_flags_accept_integers() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(deserialize_with = "bool_from_int")]
            flag: bool,
        }
        let row: Row = serde_json::from_value(serde_json::json!({"flag": 1})).unwrap();
        assert!(row.flag);
        let row: Row = serde_json::from_value(serde_json::json!({"flag": false})).unwrap();
        assert!(!row.flag);
        assert!(serde_json::from_value::<Row>(serde_json::json!({"flag": 7})).is_err());
    }

    #[tokio::test]
    async fn writes_publish_and_pages_slice() {
        let store = Store::in_memory().await.unwrap();
        let mut feed = store
            .changes()
            .subscribe(crate::realtime::ChangeFilter::table("properties"));
        for name in ["A", "B", "C"] {
            let mut cols = Map::new();
            cols.insert("name".into(), Value::from(name));
            create(&store, "properties", cols).await.unwrap();
        }
        assert_eq!(feed.try_recv().unwrap().kind, ChangeKind::Insert);

        let page = ListQuery::new().order_by("name").limit(2).offset(1);
        let names: Vec<Value> = list(&store, "properties", &page)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row["name"].clone())
            .collect();
        assert_eq!(names, vec![Value::from("B"), Value::from("C")]);

        let err = update(&store, "properties", "missing", Map::new()).await.unwrap_err();
        assert_eq!(err.code(), "SQLX/ROW_NOT_FOUND");
        assert!(delete(&store, "properties", "missing").await.is_err());
    }
}
