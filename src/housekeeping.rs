use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

use crate::repo::{self, ListQuery};
use crate::state::Store;
use crate::time::{now_ms, parse_date};
use crate::{AppError, AppResult};

pub(crate) const TABLE: &str = "housekeeping_tasks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// `pending -> in_progress -> completed`; any open task may be cancelled.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (InProgress, Completed) | (Pending, Cancelled) | (InProgress, Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                AppError::new("VALIDATION/STATUS", "Unknown task status").with_context("status", s)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HousekeepingTask {
    pub id: String,
    pub property_id: String,
    pub booking_id: Option<String>,
    pub task_type: String,
    pub due_date: String,
    pub status: TaskStatus,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
    #[ts(type = "number | null")]
    pub completed_at: Option<i64>,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewHousekeepingTask {
    pub property_id: String,
    pub task_type: String,
    pub due_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub property_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl TaskFilter {
    fn includes_date(&self, due: &str) -> bool {
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some(due) = parse_date(due) else {
            return false;
        };
        self.from.map_or(true, |from| due >= from) && self.to.map_or(true, |to| due <= to)
    }
}

pub async fn create(store: &Store, task: &NewHousekeepingTask) -> AppResult<HousekeepingTask> {
    if task.task_type.trim().is_empty() {
        return Err(AppError::new("VALIDATION/TASK_TYPE", "Task type is required"));
    }
    if parse_date(&task.due_date).is_none() {
        return Err(AppError::new("VALIDATION/DATE", "Due date must be a valid date")
            .with_context("due_date", task.due_date.clone()));
    }
    let row = repo::create(store, TABLE, repo::to_columns(task)?).await?;
    repo::decode(TABLE, row)
}

pub async fn get(store: &Store, id: &str) -> AppResult<Option<HousekeepingTask>> {
    repo::get(store, TABLE, id)
        .await?
        .map(|row| repo::decode(TABLE, row))
        .transpose()
}

pub async fn list(store: &Store, filter: &TaskFilter) -> AppResult<Vec<HousekeepingTask>> {
    let mut query = ListQuery::new().order_by("due_date, task_type, id");
    if let Some(property_id) = &filter.property_id {
        query = query.eq("property_id", property_id.as_str());
    }
    if let Some(status) = filter.status {
        query = query.eq("status", status.as_str());
    }
    let mut tasks = Vec::new();
    for row in repo::list(store, TABLE, &query).await? {
        let task: HousekeepingTask = repo::decode(TABLE, row)?;
        if filter.includes_date(&task.due_date) {
            tasks.push(task);
        }
    }
    Ok(tasks)
}

pub async fn list_for_booking(store: &Store, booking_id: &str) -> AppResult<Vec<HousekeepingTask>> {
    let query = ListQuery::new()
        .eq("booking_id", booking_id)
        .order_by("due_date, task_type");
    repo::list(store, TABLE, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode(TABLE, row))
        .collect()
}

pub async fn assign(store: &Store, id: &str, user_id: Option<&str>) -> AppResult<HousekeepingTask> {
    let mut columns = Map::new();
    columns.insert("assigned_to".into(), user_id.map_or(Value::Null, Value::from));
    let row = repo::update(store, TABLE, id, columns).await?;
    repo::decode(TABLE, row)
}

pub async fn transition(store: &Store, id: &str, next: TaskStatus) -> AppResult<HousekeepingTask> {
    let current: HousekeepingTask = repo::decode(TABLE, repo::require(store, TABLE, id).await?)?;
    if !current.status.can_transition_to(next) {
        return Err(AppError::new("VALIDATION/TRANSITION", "Task cannot move to that status")
            .with_context("id", id)
            .with_context("from", current.status.as_str())
            .with_context("to", next.as_str()));
    }
    let mut columns = Map::new();
    columns.insert("status".into(), Value::from(next.as_str()));
    if next == TaskStatus::Completed {
        columns.insert("completed_at".into(), Value::from(now_ms()));
    }
    let row = repo::update(store, TABLE, id, columns).await?;
    tracing::info!(
        target: "villaops",
        event = "housekeeping_transition",
        task_id = id,
        from = current.status.as_str(),
        to = next.as_str(),
    );
    repo::decode(TABLE, row)
}

pub async fn delete(store: &Store, id: &str) -> AppResult<()> {
    repo::delete(store, TABLE, id).await
}
