//! Rule-based cleaning: reusable actions, stay-length rules mapping stay
//! days to actions, and per-property rule assignments.
//!
//! `stay_length_range`, `actions_by_day` and `checklist` are stored as loosely
//! typed JSON text. They are decoded strictly at the boundary (the `parse_*`
//! functions return a [`ShapeError`]) and the loaders then normalize: a bad
//! range falls back to [`FALLBACK_RANGE`], a bad string array becomes empty,
//! and a record keeps only its well-formed entries.

use std::collections::BTreeMap;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use ts_rs::TS;

use crate::bookings::Booking;
use crate::db::run_in_tx;
use crate::housekeeping::{self, HousekeepingTask};
use crate::id::new_uuid_v7;
use crate::realtime::ChangeKind;
use crate::repo::{self, bool_from_int, ListQuery};
use crate::state::Store;
use crate::time::{format_date, now_ms};
use crate::validation::{self, Entity};
use crate::{AppError, AppResult};

const ACTIONS: &str = "cleaning_actions";
const RULES: &str = "cleaning_rules";
const ASSIGNMENTS: &str = "rule_assignments";

pub const FALLBACK_RANGE: StayRange = StayRange { min: 1, max: 999 };

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("invalid JSON: {0}")]
    Syntax(String),
    #[error("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },
    #[error("element {index} is not a {expected}")]
    Element { index: usize, expected: &'static str },
    #[error("range needs exactly two bounds, found {0}")]
    RangeArity(usize),
    #[error("range bound {0} is not a positive whole number")]
    RangeBound(String),
    #[error("day key {0:?} is not a positive whole number")]
    DayKey(String),
    #[error("entry {key:?}: {reason}")]
    Entry { key: String, reason: Box<ShapeError> },
}

impl From<ShapeError> for AppError {
    fn from(err: ShapeError) -> Self {
        AppError::new("RULES/DECODE", err.to_string())
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn parse_json_text(raw: &str) -> Result<Value, ShapeError> {
    serde_json::from_str(raw).map_err(|err| ShapeError::Syntax(err.to_string()))
}

pub fn parse_string_array(value: &Value) -> Result<Vec<String>, ShapeError> {
    let Value::Array(items) = value else {
        return Err(ShapeError::Type {
            expected: "array",
            found: kind(value),
        });
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(s) => Ok(s.clone()),
            _ => Err(ShapeError::Element {
                index,
                expected: "string",
            }),
        })
        .collect()
}

pub fn parse_number_array(value: &Value) -> Result<Vec<f64>, ShapeError> {
    let Value::Array(items) = value else {
        return Err(ShapeError::Type {
            expected: "array",
            found: kind(value),
        });
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_f64().ok_or(ShapeError::Element {
                index,
                expected: "number",
            })
        })
        .collect()
}

pub fn parse_string_array_record(value: &Value) -> Result<BTreeMap<String, Vec<String>>, ShapeError> {
    let Value::Object(entries) = value else {
        return Err(ShapeError::Type {
            expected: "object",
            found: kind(value),
        });
    };
    entries
        .iter()
        .map(|(key, item)| {
            parse_string_array(item)
                .map(|list| (key.clone(), list))
                .map_err(|reason| ShapeError::Entry {
                    key: key.clone(),
                    reason: Box::new(reason),
                })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StayRange {
    pub min: u32,
    pub max: u32,
}

impl StayRange {
    /// Bounds are stored ascending whichever order they were given in.
    pub fn new(a: u32, b: u32) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, nights: i64) -> bool {
        nights >= i64::from(self.min) && nights <= i64::from(self.max)
    }

    pub fn span(&self) -> u32 {
        self.max - self.min
    }

    pub fn to_json(&self) -> Value {
        json!([self.min, self.max])
    }
}

fn range_bound(n: f64) -> Result<u32, ShapeError> {
    if n.fract() == 0.0 && n >= 1.0 && n <= f64::from(u32::MAX) {
        Ok(n as u32)
    } else {
        Err(ShapeError::RangeBound(n.to_string()))
    }
}

/// Accepts `[min, max]` (either order) or `{"min": .., "max": ..}`.
pub fn parse_stay_range(value: &Value) -> Result<StayRange, ShapeError> {
    let bounds = match value {
        Value::Object(map) => {
            let pick = |key: &str| -> Result<f64, ShapeError> {
                map.get(key).and_then(Value::as_f64).ok_or(ShapeError::Entry {
                    key: key.to_string(),
                    reason: Box::new(ShapeError::Type {
                        expected: "number",
                        found: map.get(key).map_or("nothing", kind),
                    }),
                })
            };
            vec![pick("min")?, pick("max")?]
        }
        other => parse_number_array(other)?,
    };
    if bounds.len() != 2 {
        return Err(ShapeError::RangeArity(bounds.len()));
    }
    Ok(StayRange::new(range_bound(bounds[0])?, range_bound(bounds[1])?))
}

fn parse_day_key(key: &str) -> Result<u32, ShapeError> {
    key.trim()
        .parse::<u32>()
        .ok()
        .filter(|day| *day >= 1)
        .ok_or_else(|| ShapeError::DayKey(key.to_string()))
}

/// Lenient loader for a stored range; never fails.
pub fn normalize_stay_range(raw: Option<&str>, rule_id: &str) -> StayRange {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return FALLBACK_RANGE;
    };
    match parse_json_text(raw).and_then(|v| parse_stay_range(&v)) {
        Ok(range) => range,
        Err(err) => {
            tracing::warn!(
                target: "villaops",
                event = "cleaning_range_fallback",
                rule_id = rule_id,
                error = %err,
            );
            FALLBACK_RANGE
        }
    }
}

pub fn normalize_string_array(raw: Option<&str>, owner: &str) -> Vec<String> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Vec::new();
    };
    match parse_json_text(raw).and_then(|v| parse_string_array(&v)) {
        Ok(list) => list,
        Err(err) => {
            tracing::warn!(
                target: "villaops",
                event = "cleaning_array_fallback",
                owner = owner,
                error = %err,
            );
            Vec::new()
        }
    }
}

/// Keeps every entry whose key is a positive day number and whose value is
/// an array of strings; everything else is dropped with a warning.
pub fn normalize_actions_by_day(raw: Option<&str>, rule_id: &str) -> BTreeMap<u32, Vec<String>> {
    let mut days = BTreeMap::new();
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return days;
    };
    let value = match parse_json_text(raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(target: "villaops", event = "cleaning_days_fallback", rule_id = rule_id, error = %err);
            return days;
        }
    };
    let entries = match value {
        Value::Object(entries) => entries,
        other => {
            let err = ShapeError::Type {
                expected: "object",
                found: kind(&other),
            };
            tracing::warn!(target: "villaops", event = "cleaning_days_fallback", rule_id = rule_id, error = %err);
            return days;
        }
    };
    for (key, item) in &entries {
        match parse_day_key(key).and_then(|day| parse_string_array(item).map(|list| (day, list))) {
            Ok((day, list)) => {
                days.entry(day).or_insert_with(Vec::new).extend(list);
            }
            Err(err) => {
                tracing::warn!(
                    target: "villaops",
                    event = "cleaning_day_dropped",
                    rule_id = rule_id,
                    day = %key,
                    error = %err,
                );
            }
        }
    }
    days
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CleaningAction {
    pub id: String,
    pub action_type: String,
    pub display_name: String,
    pub description: Option<String>,
    pub estimated_minutes: i64,
    pub checklist: Vec<String>,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
struct ActionRow {
    id: String,
    action_type: String,
    display_name: String,
    description: Option<String>,
    estimated_minutes: i64,
    checklist: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<ActionRow> for CleaningAction {
    fn from(row: ActionRow) -> Self {
        let checklist = normalize_string_array(row.checklist.as_deref(), &row.id);
        Self {
            id: row.id,
            action_type: row.action_type,
            display_name: row.display_name,
            description: row.description,
            estimated_minutes: row.estimated_minutes,
            checklist,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CleaningActionInput {
    pub action_type: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_minutes")]
    pub estimated_minutes: i64,
    #[serde(default)]
    pub checklist: Vec<String>,
}

fn default_minutes() -> i64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CleaningRule {
    pub id: String,
    pub rule_name: String,
    pub stay_range: StayRange,
    /// Stay day (1 = check-in day) to action types.
    pub actions_by_day: BTreeMap<u32, Vec<String>>,
    pub is_active: bool,
    pub is_global: bool,
    pub property_id: Option<String>,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
struct RuleRow {
    id: String,
    rule_name: String,
    min_nights: Option<i64>,
    max_nights: Option<i64>,
    stay_length_range: Option<String>,
    actions_by_day: Option<String>,
    #[serde(deserialize_with = "bool_from_int")]
    is_active: bool,
    #[serde(deserialize_with = "bool_from_int")]
    is_global: bool,
    property_id: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<RuleRow> for CleaningRule {
    fn from(row: RuleRow) -> Self {
        let has_json_range = row
            .stay_length_range
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        let column_range = match (row.min_nights, row.max_nights) {
            (Some(a), Some(b)) if a >= 1 && b >= 1 => {
                let clamp = |n: i64| u32::try_from(n).unwrap_or(u32::MAX);
                Some(StayRange::new(clamp(a), clamp(b)))
            }
            _ => None,
        };
        let stay_range = match column_range {
            Some(range) if !has_json_range => range,
            _ => normalize_stay_range(row.stay_length_range.as_deref(), &row.id),
        };
        let actions_by_day = normalize_actions_by_day(row.actions_by_day.as_deref(), &row.id);
        Self {
            id: row.id,
            rule_name: row.rule_name,
            stay_range,
            actions_by_day,
            is_active: row.is_active,
            is_global: row.is_global,
            property_id: row.property_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CleaningRuleInput {
    pub rule_name: String,
    pub min_nights: u32,
    pub max_nights: u32,
    #[serde(default)]
    pub actions_by_day: BTreeMap<u32, Vec<String>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub is_global: bool,
    #[serde(default)]
    pub property_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CleaningRuleInput {
    fn columns(&self) -> AppResult<Map<String, Value>> {
        let range = StayRange::new(self.min_nights, self.max_nights);
        let mut columns = Map::new();
        columns.insert("rule_name".into(), Value::from(self.rule_name.clone()));
        columns.insert("min_nights".into(), Value::from(self.min_nights));
        columns.insert("max_nights".into(), Value::from(self.max_nights));
        columns.insert("actions_by_day".into(), serde_json::to_value(&self.actions_by_day)?);
        columns.insert("property_id".into(), self.property_id.clone().map_or(Value::Null, Value::from));
        validation::validate(Entity::CleaningRule, &Value::Object(columns.clone()))?;

        columns.insert("min_nights".into(), Value::from(range.min));
        columns.insert("max_nights".into(), Value::from(range.max));
        columns.insert("stay_length_range".into(), Value::from(range.to_json().to_string()));
        columns.insert("is_active".into(), Value::Bool(self.is_active));
        columns.insert("is_global".into(), Value::Bool(self.is_global));
        Ok(columns)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RuleAssignment {
    pub id: String,
    pub rule_id: String,
    pub property_id: String,
    #[serde(deserialize_with = "bool_from_int")]
    pub is_active: bool,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

// Actions

pub async fn create_action(store: &Store, input: &CleaningActionInput) -> AppResult<CleaningAction> {
    let columns = repo::to_columns(input)?;
    validation::validate(Entity::CleaningAction, &Value::Object(columns.clone()))?;
    let row = repo::create(store, ACTIONS, columns).await?;
    Ok(repo::decode::<ActionRow>(ACTIONS, row)?.into())
}

pub async fn update_action(
    store: &Store,
    id: &str,
    input: &CleaningActionInput,
) -> AppResult<CleaningAction> {
    let columns = repo::to_columns(input)?;
    validation::validate(Entity::CleaningAction, &Value::Object(columns.clone()))?;
    let row = repo::update(store, ACTIONS, id, columns).await?;
    Ok(repo::decode::<ActionRow>(ACTIONS, row)?.into())
}

pub async fn list_actions(store: &Store) -> AppResult<Vec<CleaningAction>> {
    let query = ListQuery::new().order_by("action_type");
    repo::list(store, ACTIONS, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode::<ActionRow>(ACTIONS, row).map(CleaningAction::from))
        .collect()
}

pub async fn delete_action(store: &Store, id: &str) -> AppResult<()> {
    repo::delete(store, ACTIONS, id).await
}

// Rules

pub async fn create_rule(store: &Store, input: &CleaningRuleInput) -> AppResult<CleaningRule> {
    let row = repo::create(store, RULES, input.columns()?).await?;
    Ok(repo::decode::<RuleRow>(RULES, row)?.into())
}

pub async fn update_rule(store: &Store, id: &str, input: &CleaningRuleInput) -> AppResult<CleaningRule> {
    let row = repo::update(store, RULES, id, input.columns()?).await?;
    Ok(repo::decode::<RuleRow>(RULES, row)?.into())
}

pub async fn get_rule(store: &Store, id: &str) -> AppResult<Option<CleaningRule>> {
    repo::get(store, RULES, id)
        .await?
        .map(|row| repo::decode::<RuleRow>(RULES, row).map(CleaningRule::from))
        .transpose()
}

pub async fn list_rules(store: &Store, active_only: bool) -> AppResult<Vec<CleaningRule>> {
    let mut query = ListQuery::new().order_by("rule_name, id");
    if active_only {
        query = query.eq("is_active", 1);
    }
    repo::list(store, RULES, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode::<RuleRow>(RULES, row).map(CleaningRule::from))
        .collect()
}

pub async fn set_rule_active(store: &Store, id: &str, active: bool) -> AppResult<CleaningRule> {
    let mut columns = Map::new();
    columns.insert("is_active".into(), Value::Bool(active));
    let row = repo::update(store, RULES, id, columns).await?;
    Ok(repo::decode::<RuleRow>(RULES, row)?.into())
}

pub async fn delete_rule(store: &Store, id: &str) -> AppResult<()> {
    repo::delete(store, RULES, id).await
}

// Assignments

/// Assign a rule to a property, reactivating an existing assignment.
pub async fn assign_rule(store: &Store, rule_id: &str, property_id: &str) -> AppResult<RuleAssignment> {
    let query = ListQuery::new()
        .eq("rule_id", rule_id)
        .eq("property_id", property_id)
        .limit(1);
    let existing = repo::list(store, ASSIGNMENTS, &query).await?.into_iter().next();
    let row = match existing {
        Some(row) => {
            let current: RuleAssignment = repo::decode(ASSIGNMENTS, row)?;
            if current.is_active {
                return Ok(current);
            }
            let mut columns = Map::new();
            columns.insert("is_active".into(), Value::Bool(true));
            repo::update(store, ASSIGNMENTS, &current.id, columns).await?
        }
        None => {
            let mut columns = Map::new();
            columns.insert("rule_id".into(), Value::from(rule_id));
            columns.insert("property_id".into(), Value::from(property_id));
            columns.insert("is_active".into(), Value::Bool(true));
            repo::create(store, ASSIGNMENTS, columns).await?
        }
    };
    repo::decode(ASSIGNMENTS, row)
}

pub async fn set_assignment_active(
    store: &Store,
    id: &str,
    active: bool,
) -> AppResult<RuleAssignment> {
    let mut columns = Map::new();
    columns.insert("is_active".into(), Value::Bool(active));
    let row = repo::update(store, ASSIGNMENTS, id, columns).await?;
    repo::decode(ASSIGNMENTS, row)
}

pub async fn list_assignments(store: &Store, property_id: Option<&str>) -> AppResult<Vec<RuleAssignment>> {
    let mut query = ListQuery::new();
    if let Some(property_id) = property_id {
        query = query.eq("property_id", property_id);
    }
    repo::list(store, ASSIGNMENTS, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode(ASSIGNMENTS, row))
        .collect()
}

pub async fn unassign_rule(store: &Store, id: &str) -> AppResult<()> {
    repo::delete(store, ASSIGNMENTS, id).await
}

// Selection and planning

fn scoped_to(rule: &CleaningRule, assignments: &[RuleAssignment], property_id: Option<&str>) -> bool {
    let Some(property_id) = property_id else {
        return false;
    };
    rule.property_id.as_deref() == Some(property_id)
        || assignments
            .iter()
            .any(|a| a.is_active && a.rule_id == rule.id && a.property_id == property_id)
}

/// Active rules covering `nights`: rules scoped to the property (directly or
/// through an active assignment) first, then global rules, narrower ranges
/// first within each group.
pub fn select_rules<'a>(
    rules: &'a [CleaningRule],
    assignments: &[RuleAssignment],
    nights: i64,
    property_id: Option<&str>,
) -> Vec<&'a CleaningRule> {
    let mut matching: Vec<(bool, &CleaningRule)> = rules
        .iter()
        .filter(|rule| rule.is_active && rule.stay_range.contains(nights))
        .map(|rule| (scoped_to(rule, assignments, property_id), rule))
        .filter(|(scoped, rule)| *scoped || rule.is_global)
        .collect();
    matching.sort_by(|(a_scoped, a), (b_scoped, b)| {
        b_scoped
            .cmp(a_scoped)
            .then(a.stay_range.span().cmp(&b.stay_range.span()))
            .then_with(|| a.rule_name.cmp(&b.rule_name))
            .then_with(|| a.id.cmp(&b.id))
    });
    matching.into_iter().map(|(_, rule)| rule).collect()
}

pub async fn rules_for_stay(
    store: &Store,
    nights: i64,
    property_id: Option<&str>,
) -> AppResult<Vec<CleaningRule>> {
    let rules = list_rules(store, true).await?;
    let assignments = match property_id {
        Some(id) => list_assignments(store, Some(id)).await?,
        None => Vec::new(),
    };
    Ok(select_rules(&rules, &assignments, nights, property_id)
        .into_iter()
        .cloned()
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlannedDay {
    pub day: u32,
    pub actions: Vec<String>,
}

/// Actions for each stay day that falls inside a stay of `nights` nights.
pub fn plan_for_stay(rule: &CleaningRule, nights: i64) -> Vec<PlannedDay> {
    rule.actions_by_day
        .iter()
        .filter(|(day, actions)| i64::from(**day) <= nights && !actions.is_empty())
        .map(|(day, actions)| PlannedDay {
            day: *day,
            actions: actions.clone(),
        })
        .collect()
}

/// Total estimated minutes of a plan; unknown action types count as zero.
pub fn plan_minutes(plan: &[PlannedDay], actions: &[CleaningAction]) -> i64 {
    plan.iter()
        .flat_map(|day| day.actions.iter())
        .filter_map(|name| actions.iter().find(|a| &a.action_type == name))
        .map(|action| action.estimated_minutes)
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct TaskGeneration {
    pub booking_id: String,
    pub rule_id: Option<String>,
    pub created: Vec<HousekeepingTask>,
    /// Planned tasks that already existed.
    pub skipped: usize,
}

/// Derive housekeeping tasks for a booking from the best matching rule.
/// Running it again creates nothing new.
pub async fn generate_tasks_for_booking(store: &Store, booking: &Booking) -> AppResult<TaskGeneration> {
    let mut outcome = TaskGeneration {
        booking_id: booking.id.clone(),
        rule_id: None,
        created: Vec::new(),
        skipped: 0,
    };
    if booking.is_cancelled() {
        tracing::info!(target: "villaops", event = "cleaning_skip_cancelled", booking_id = %booking.id);
        return Ok(outcome);
    }
    let (Some(nights), Some(check_in)) = (booking.nights(), booking.check_in_date()) else {
        return Err(AppError::new("VALIDATION/DATE", "Booking dates are not usable")
            .with_context("booking_id", booking.id.clone()));
    };

    let rules = rules_for_stay(store, nights, Some(&booking.property_id)).await?;
    let Some(rule) = rules.first() else {
        tracing::info!(
            target: "villaops",
            event = "cleaning_no_rule",
            booking_id = %booking.id,
            nights = nights,
        );
        return Ok(outcome);
    };
    outcome.rule_id = Some(rule.id.clone());

    let mut planned = Vec::new();
    for day in plan_for_stay(rule, nights) {
        let due = format_date(check_in + chrono::Duration::days(i64::from(day.day) - 1));
        for action in day.actions {
            planned.push((new_uuid_v7(), due.clone(), action));
        }
    }
    let total = planned.len();
    let property_id = booking.property_id.clone();
    let booking_id = booking.id.clone();

    let inserted: Vec<String> = run_in_tx(store.pool(), move |tx| {
        async move {
            let now = now_ms();
            let mut inserted = Vec::new();
            for (id, due, task_type) in planned {
                let res = sqlx::query(
                    "INSERT OR IGNORE INTO housekeeping_tasks \
                     (id, property_id, booking_id, task_type, due_date, status, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)",
                )
                .bind(&id)
                .bind(&property_id)
                .bind(&booking_id)
                .bind(&task_type)
                .bind(&due)
                .bind(now)
                .bind(now)
                .execute(&mut **tx)
                .await?;
                if res.rows_affected() == 1 {
                    inserted.push(id);
                }
            }
            Ok::<_, AppError>(inserted)
        }
        .boxed()
    })
    .await?;

    for id in &inserted {
        let record = repo::publish_current(store, housekeeping::TABLE, id, ChangeKind::Insert).await?;
        outcome.created.push(repo::decode(housekeeping::TABLE, record)?);
    }
    outcome.skipped = total - outcome.created.len();
    tracing::info!(
        target: "villaops",
        event = "cleaning_tasks_generated",
        booking_id = %booking.id,
        rule_id = %rule.id,
        created = outcome.created.len(),
        skipped = outcome.skipped,
    );
    Ok(outcome)
}
