//! Google Sheets export via the `google-sheets` remote function, plus the
//! saved table-to-sheet relationships.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ts_rs::TS;

use crate::export::TableView;
use crate::functions::{RemoteFunctions, GOOGLE_SHEETS};
use crate::id::new_uuid_v7;
use crate::preferences;
use crate::repo::{self, ListQuery};
use crate::state::Store;
use crate::{AppError, AppResult};

pub const RELATIONSHIPS_KEY: &str = "sheets.relationships";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SheetExportResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub updated_rows: u64,
    #[serde(default)]
    pub spreadsheet_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Spreadsheet {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub spreadsheet_url: Option<String>,
}

/// Which table feeds which sheet, and how its columns are titled there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SheetRelationship {
    pub id: String,
    pub source_table: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    /// Source column to sheet header; empty means every column as-is.
    #[serde(default)]
    pub column_mapping: BTreeMap<String, String>,
}

fn remote_failure(body: &Value, action: &str) -> AppError {
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("Google Sheets request failed");
    AppError::new("SHEETS/FAILED", message).with_context("action", action)
}

pub async fn export_view(
    functions: &dyn RemoteFunctions,
    spreadsheet_id: &str,
    sheet_name: &str,
    view: &TableView,
    headers: &[String],
) -> AppResult<SheetExportResult> {
    let rows: Vec<Vec<String>> = view
        .values()
        .iter()
        .map(|row| row.iter().map(crate::export::cell_text).collect())
        .collect();
    let body = json!({
        "action": "export",
        "spreadsheetId": spreadsheet_id,
        "sheetName": sheet_name,
        "headers": headers,
        "rows": rows,
    });
    let response = functions.invoke(GOOGLE_SHEETS, body).await?;
    let result: SheetExportResult = serde_json::from_value(response.clone())?;
    if !result.success {
        return Err(remote_failure(&response, "export")
            .with_context("spreadsheet_id", spreadsheet_id)
            .with_context("sheet", sheet_name));
    }
    tracing::info!(
        target: "villaops",
        event = "sheet_exported",
        table = %view.table,
        sheet = sheet_name,
        rows = result.updated_rows,
    );
    Ok(result)
}

pub async fn create_spreadsheet(functions: &dyn RemoteFunctions, title: &str) -> AppResult<Spreadsheet> {
    let response = functions
        .invoke(GOOGLE_SHEETS, json!({ "action": "create", "title": title }))
        .await?;
    if response.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(remote_failure(&response, "create").with_context("title", title));
    }
    Ok(serde_json::from_value(response)?)
}

pub async fn list_relationships(store: &Store) -> AppResult<Vec<SheetRelationship>> {
    Ok(preferences::get_as(store, RELATIONSHIPS_KEY)
        .await?
        .unwrap_or_default())
}

pub async fn add_relationship(
    store: &Store,
    source_table: &str,
    spreadsheet_id: &str,
    sheet_name: &str,
    column_mapping: BTreeMap<String, String>,
) -> AppResult<SheetRelationship> {
    repo::ensure_table(source_table)?;
    if spreadsheet_id.trim().is_empty() || sheet_name.trim().is_empty() {
        return Err(AppError::new("VALIDATION/SHEET", "Spreadsheet and sheet name are required"));
    }
    let relationship = SheetRelationship {
        id: new_uuid_v7(),
        source_table: source_table.to_string(),
        spreadsheet_id: spreadsheet_id.trim().to_string(),
        sheet_name: sheet_name.trim().to_string(),
        column_mapping,
    };
    let mut all = list_relationships(store).await?;
    all.push(relationship.clone());
    preferences::set_as(store, RELATIONSHIPS_KEY, &all).await?;
    Ok(relationship)
}

/// Returns whether a relationship was removed.
pub async fn remove_relationship(store: &Store, id: &str) -> AppResult<bool> {
    let mut all = list_relationships(store).await?;
    let before = all.len();
    all.retain(|r| r.id != id);
    if all.len() == before {
        return Ok(false);
    }
    preferences::set_as(store, RELATIONSHIPS_KEY, &all).await?;
    Ok(true)
}

/// Push the current rows of a relationship's source table to its sheet.
pub async fn sync_relationship(
    store: &Store,
    functions: &dyn RemoteFunctions,
    id: &str,
) -> AppResult<SheetExportResult> {
    let relationship = list_relationships(store)
        .await?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| AppError::new("SHEETS/UNKNOWN_RELATIONSHIP", "No such sheet relationship").with_context("id", id))?;
    let mut view = TableView::load(store, &relationship.source_table, &ListQuery::new()).await?;
    let headers: Vec<String> = if relationship.column_mapping.is_empty() {
        view.columns.clone()
    } else {
        let columns: Vec<&str> = relationship.column_mapping.keys().map(String::as_str).collect();
        view = view.select_columns(&columns);
        view.columns
            .iter()
            .map(|c| relationship.column_mapping.get(c).cloned().unwrap_or_else(|| c.clone()))
            .collect()
    };
    export_view(functions, &relationship.spreadsheet_id, &relationship.sheet_name, &view, &headers).await
}
