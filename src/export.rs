//! Table views for export: filter, sort, render as CSV or JSON, write to
//! disk. Also the JSON settings snapshot.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use ts_rs::TS;

use crate::preferences;
use crate::repo::{self, ListQuery};
use crate::state::Store;
use crate::time::{now_ms, rfc3339_from_ms};
use crate::{AppError, AppResult};

const PARTIAL_SUFFIX: &str = ".partial";
pub const SETTINGS_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(AppError::new("EXPORT/FORMAT", "Unsupported export format").with_context("format", other)),
        }
    }
}

/// Rows of one table as currently shown: visible columns, filtered and sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct TableView {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

pub fn csv_escape(value: &str) -> String {
    if value.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Plain text of a cell: strings unquoted, nulls empty, everything else JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx.partial_cmp(&fy).unwrap_or(Ordering::Equal),
            _ => cell_text(x).to_lowercase().cmp(&cell_text(y).to_lowercase()),
        },
    }
}

impl TableView {
    /// Columns come from the rows themselves, `id` first.
    pub fn from_rows(table: impl Into<String>, rows: Vec<Value>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let rows: Vec<Map<String, Value>> = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        for row in &rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        if let Some(pos) = columns.iter().position(|c| c == "id") {
            let id = columns.remove(pos);
            columns.insert(0, id);
        }
        Self {
            table: table.into(),
            columns,
            rows,
        }
    }

    pub async fn load(store: &Store, table: &str, query: &ListQuery) -> AppResult<Self> {
        Ok(Self::from_rows(table, repo::list(store, table, query).await?))
    }

    /// Restrict (and order) the visible columns; unknown names are ignored.
    pub fn select_columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns
            .iter()
            .filter(|c| self.columns.iter().any(|have| have == *c))
            .map(|c| c.to_string())
            .collect();
        self
    }

    /// Keep rows where any visible cell contains `needle`, case-insensitively.
    pub fn filter_text(mut self, needle: &str) -> Self {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return self;
        }
        let columns = self.columns.clone();
        self.rows.retain(|row| {
            columns.iter().any(|c| {
                row.get(c)
                    .map(|v| cell_text(v).to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
        });
        self
    }

    /// Stable sort; numbers compare numerically and nulls sort last.
    pub fn sort_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.rows.sort_by(|a, b| {
            let ord = compare_cells(a.get(column), b.get(column));
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc if a.get(column).map_or(true, Value::is_null)
                    || b.get(column).map_or(true, Value::is_null) =>
                {
                    ord
                }
                SortDirection::Desc => ord.reverse(),
            }
        });
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Visible cells row by row, in column order.
    pub fn values(&self) -> Vec<Vec<Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect()
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let header: Vec<String> = self.columns.iter().map(|c| csv_escape(c)).collect();
        out.push_str(&header.join(","));
        out.push('\n');
        for row in self.values() {
            let line: Vec<String> = row.iter().map(|v| csv_escape(&cell_text(v))).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> AppResult<String> {
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let visible: Map<String, Value> = self
                    .columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect();
                Value::Object(visible)
            })
            .collect();
        Ok(serde_json::to_string_pretty(&rows)?)
    }

    pub fn render(&self, format: ExportFormat) -> AppResult<String> {
        match format {
            ExportFormat::Csv => Ok(self.to_csv()),
            ExportFormat::Json => self.to_json(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ExportedFile {
    pub path: String,
    pub rows: usize,
    pub sha256: String,
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Write through a `.partial` sibling, then rename into place.
fn write_file(path: &Path, contents: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| AppError::from(err).with_context("path", parent.display().to_string()))?;
    }
    let tmp = partial_path(path);
    let mut file =
        fs::File::create(&tmp).map_err(|err| AppError::from(err).with_context("path", tmp.display().to_string()))?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path).map_err(|err| AppError::from(err).with_context("path", path.display().to_string()))?;
    Ok(())
}

pub fn write_view(view: &TableView, path: &Path, format: ExportFormat) -> AppResult<ExportedFile> {
    let rendered = view.render(format)?;
    write_file(path, rendered.as_bytes())?;
    let sha256 = hex_digest(rendered.as_bytes());
    tracing::info!(
        target: "villaops",
        event = "view_exported",
        table = %view.table,
        format = %format,
        rows = view.row_count(),
        path = %path.display(),
    );
    Ok(ExportedFile {
        path: path.display().to_string(),
        rows: view.row_count(),
        sha256,
    })
}

fn hex_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

// Settings snapshot

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SettingsSnapshot {
    pub version: u32,
    pub exported_at: String,
    #[ts(type = "Record<string, unknown>")]
    pub preferences: BTreeMap<String, Value>,
}

pub async fn export_settings(store: &Store) -> AppResult<SettingsSnapshot> {
    Ok(SettingsSnapshot {
        version: SETTINGS_VERSION,
        exported_at: rfc3339_from_ms(now_ms()),
        preferences: preferences::list(store).await?,
    })
}

pub fn settings_to_json(snapshot: &SettingsSnapshot) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// Restore the snapshot: preferences end up exactly as exported, keys the
/// snapshot lacks are removed. Returns how many were written.
pub async fn import_settings(store: &Store, json: &str) -> AppResult<usize> {
    let snapshot: SettingsSnapshot =
        serde_json::from_str(json).map_err(|err| AppError::from(err).with_context("operation", "import_settings"))?;
    if snapshot.version != SETTINGS_VERSION {
        return Err(AppError::new("SETTINGS/VERSION", "Unsupported settings file version")
            .with_context("version", snapshot.version.to_string()));
    }
    preferences::replace_all(store, &snapshot.preferences).await?;
    tracing::info!(target: "villaops", event = "settings_imported", count = snapshot.preferences.len());
    Ok(snapshot.preferences.len())
}

pub async fn export_settings_file(store: &Store, path: &Path) -> AppResult<ExportedFile> {
    let snapshot = export_settings(store).await?;
    let json = settings_to_json(&snapshot)?;
    write_file(path, json.as_bytes())?;
    Ok(ExportedFile {
        path: path.display().to_string(),
        rows: snapshot.preferences.len(),
        sha256: hex_digest(json.as_bytes()),
    })
}

pub async fn import_settings_file(store: &Store, path: &Path) -> AppResult<usize> {
    let json = fs::read_to_string(path)
        .map_err(|err| AppError::from(err).with_context("path", path.display().to_string()))?;
    import_settings(store, &json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view() -> TableView {
        TableView::from_rows(
            "inventory_items",
            vec![
                json!({"name": "Towels, large", "quantity": 12, "id": "a", "note": null}),
                json!({"name": "Soap \"lavender\"", "quantity": 3, "id": "b", "note": "reorder"}),
                json!({"name": "Sheets", "quantity": 40, "id": "c", "note": null}),
            ],
        )
    }

    #[test]
    fn columns_put_id_first() {
        assert_eq!(view().columns[0], "id");
        assert_eq!(view().columns.len(), 4);
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let csv = view().select_columns(&["name", "quantity"]).to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "name,quantity");
        assert_eq!(lines[1], "\"Towels, large\",12");
        assert_eq!(lines[2], "\"Soap \"\"lavender\"\"\",3");
        assert_eq!(lines[3], "Sheets,40");
    }

    #[test]
    fn filter_and_sort_shape_the_visible_rows() {
        let v = view().filter_text("S").sort_by("quantity", SortDirection::Desc);
        let ids: Vec<&str> = v.rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let v = view().filter_text("reorder");
        assert_eq!(v.row_count(), 1);
        assert_eq!(v.to_csv().lines().count(), 2);
    }

    #[test]
    fn nulls_sort_last_in_both_directions() {
        for dir in [SortDirection::Asc, SortDirection::Desc] {
            let v = view().sort_by("note", dir);
            assert_eq!(v.rows[0]["id"], "b");
        }
    }

    #[test]
    fn json_contains_only_visible_columns() {
        let out = view().select_columns(&["id"]).to_json().unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0], json!({"id": "a"}));
    }

    #[test]
    fn write_view_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("items.csv");
        let file = write_view(&view(), &path, ExportFormat::Csv).unwrap();
        assert_eq!(file.rows, 3);
        assert_eq!(file.sha256.len(), 64);
        assert!(path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn digests_are_lowercase_hex() {
        assert_eq!(
            hex_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }
}
