use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

use crate::repo::{self, ListQuery};
use crate::state::Store;
use crate::time::now_ms;
use crate::validation::{self, Entity};
use crate::AppResult;

const TABLE: &str = "maintenance_tasks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum MaintenanceStatus {
    #[default]
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl MaintenanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceStatus::Open => "open",
            MaintenanceStatus::InProgress => "in_progress",
            MaintenanceStatus::Completed => "completed",
            MaintenanceStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, MaintenanceStatus::Open | MaintenanceStatus::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MaintenanceTask {
    pub id: String,
    pub property_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: MaintenanceStatus,
    pub assigned_to: Option<String>,
    pub due_date: Option<String>,
    #[ts(type = "number | null")]
    pub completed_at: Option<i64>,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MaintenanceInput {
    pub property_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: MaintenanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

fn columns(input: &MaintenanceInput) -> AppResult<Map<String, Value>> {
    let mut columns = repo::to_columns(input)?;
    validation::validate(Entity::MaintenanceTask, &Value::Object(columns.clone()))?;
    if input.status == MaintenanceStatus::Completed {
        columns.insert("completed_at".into(), Value::from(now_ms()));
    } else {
        columns.insert("completed_at".into(), Value::Null);
    }
    Ok(columns)
}

pub async fn create(store: &Store, input: &MaintenanceInput) -> AppResult<MaintenanceTask> {
    let row = repo::create(store, TABLE, columns(input)?).await?;
    repo::decode(TABLE, row)
}

pub async fn get(store: &Store, id: &str) -> AppResult<Option<MaintenanceTask>> {
    repo::get(store, TABLE, id)
        .await?
        .map(|row| repo::decode(TABLE, row))
        .transpose()
}

pub async fn update(store: &Store, id: &str, input: &MaintenanceInput) -> AppResult<MaintenanceTask> {
    let row = repo::update(store, TABLE, id, columns(input)?).await?;
    repo::decode(TABLE, row)
}

/// Tasks for a property (or all), most urgent first, then by due date.
pub async fn list(
    store: &Store,
    property_id: Option<&str>,
    status: Option<MaintenanceStatus>,
) -> AppResult<Vec<MaintenanceTask>> {
    let mut query = ListQuery::new();
    if let Some(property_id) = property_id {
        query = query.eq("property_id", property_id);
    }
    if let Some(status) = status {
        query = query.eq("status", status.as_str());
    }
    let mut tasks: Vec<MaintenanceTask> = repo::list(store, TABLE, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode(TABLE, row))
        .collect::<AppResult<_>>()?;
    tasks.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| match (&a.due_date, &b.due_date) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    Ok(tasks)
}

pub async fn delete(store: &Store, id: &str) -> AppResult<()> {
    repo::delete(store, TABLE, id).await
}
