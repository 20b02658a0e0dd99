use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Executor, Row, SqlitePool};
use tracing::{error, info};

use crate::time::now_ms;
use crate::{AppError, AppResult};

static MIGRATIONS: &[(&str, &str)] = &[
    (
        "202601050900_initial.sql",
        include_str!("../migrations/202601050900_initial.sql"),
    ),
    (
        "202601050930_operations.sql",
        include_str!("../migrations/202601050930_operations.sql"),
    ),
    (
        "202601051000_cleaning_rules.sql",
        include_str!("../migrations/202601051000_cleaning_rules.sql"),
    ),
    (
        "202601051030_integrations.sql",
        include_str!("../migrations/202601051030_integrations.sql"),
    ),
];

static ADD_COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^ALTER\s+TABLE\s+(\w+)\s+ADD\s+COLUMN\s+(\w+)").expect("static regex")
});

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub version: String,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<i64>,
}

fn preview(sql: &str) -> String {
    let one_line = sql.replace(['\n', '\t'], " ");
    let trimmed = one_line.trim();
    if trimmed.chars().count() > 160 {
        let head: String = trimmed.chars().take(160).collect();
        format!("{head}…")
    } else {
        trimmed.to_string()
    }
}

fn strip_comments(raw_sql: &str) -> String {
    raw_sql
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.is_empty() || t.starts_with("--"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn checksum(cleaned: &str) -> String {
    format!("{:x}", Sha256::digest(cleaned.as_bytes()))
}

async fn ensure_ledger(pool: &SqlitePool) -> AppResult<()> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
           version   TEXT PRIMARY KEY,\
           applied_at INTEGER NOT NULL,\
           checksum TEXT NOT NULL\
         )",
    )
    .await?;
    Ok(())
}

async fn applied_versions(pool: &SqlitePool) -> AppResult<HashMap<String, (String, i64)>> {
    let rows = sqlx::query("SELECT version, checksum, applied_at FROM schema_migrations")
        .fetch_all(pool)
        .await?;
    let mut applied = HashMap::new();
    for r in rows {
        applied.insert(
            r.try_get::<String, _>("version")?,
            (
                r.try_get::<String, _>("checksum")?,
                r.try_get::<i64, _>("applied_at")?,
            ),
        );
    }
    Ok(applied)
}

pub async fn apply_migrations(pool: &SqlitePool) -> AppResult<()> {
    ensure_ledger(pool).await?;
    let applied = applied_versions(pool).await?;

    for (filename, raw_sql) in MIGRATIONS {
        let cleaned = strip_comments(raw_sql);
        let sum = checksum(&cleaned);

        if let Some((stored, _)) = applied.get(*filename) {
            if stored != &sum {
                return Err(AppError::new(
                    "MIGRATION/CHECKSUM_MISMATCH",
                    "Migration edited after application",
                )
                .with_context("file", *filename));
            }
            info!(target: "villaops", event = "migration_skip_file", file = %filename);
            continue;
        }

        let mut tx = pool.begin().await?;
        for stmt in cleaned.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            if let Some(caps) = ADD_COLUMN_RE.captures(s) {
                let table = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let col = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                let exists: Option<i64> = sqlx::query_scalar(&format!(
                    "SELECT 1 FROM pragma_table_info('{table}') WHERE name='{col}'"
                ))
                .fetch_optional(&mut *tx)
                .await?;
                if exists.is_some() {
                    info!(target: "villaops", event = "migration_stmt_skip", file = %filename, sql = %preview(s));
                    continue;
                }
            }
            info!(target: "villaops", event = "migration_stmt", file = %filename, sql = %preview(s));
            if let Err(e) = sqlx::query(s).execute(&mut *tx).await {
                error!(target: "villaops", event = "migration_stmt_error", file = %filename, sql = %preview(s), error = %e);
                return Err(AppError::from(e).with_context("file", *filename));
            }
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at, checksum) VALUES (?, ?, ?)",
        )
        .bind(*filename)
        .bind(now_ms())
        .bind(&sum)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(target: "villaops", event = "migration_file_applied", file = %filename);
    }

    Ok(())
}

/// Applied/pending state of every embedded migration, in order.
pub async fn status(pool: &SqlitePool) -> AppResult<Vec<MigrationStatus>> {
    ensure_ledger(pool).await?;
    let applied = applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .map(|(filename, _)| {
            let entry = applied.get(*filename);
            MigrationStatus {
                version: filename.to_string(),
                applied: entry.is_some(),
                applied_at: entry.map(|(_, at)| *at),
            }
        })
        .collect())
}
