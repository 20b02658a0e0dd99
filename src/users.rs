use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

use crate::realtime::{ChangeFilter, Subscription};
use crate::repo::{self, bool_from_int, ListQuery};
use crate::state::Store;
use crate::{AppError, AppResult};

const PROFILES: &str = "user_profiles";
const PERMISSIONS: &str = "user_permissions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Admin,
    Manager,
    Housekeeper,
    Maintenance,
    Owner,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Manager,
        Role::Housekeeper,
        Role::Maintenance,
        Role::Owner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Housekeeper => "housekeeper",
            Role::Maintenance => "maintenance",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| AppError::new("VALIDATION/ROLE", "Unknown role").with_context("role", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    View,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Permission {
    pub id: String,
    pub user_id: String,
    pub section: String,
    #[serde(deserialize_with = "bool_from_int")]
    pub can_view: bool,
    #[serde(deserialize_with = "bool_from_int")]
    pub can_edit: bool,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

/// Admins always pass. Everyone else needs a row for the section; edit
/// rights imply view rights.
pub fn allows(profile: &UserProfile, permissions: &[Permission], section: &str, level: AccessLevel) -> bool {
    if profile.role == Role::Admin {
        return true;
    }
    permissions
        .iter()
        .filter(|p| p.user_id == profile.id && p.section == section)
        .any(|p| match level {
            AccessLevel::View => p.can_view || p.can_edit,
            AccessLevel::Edit => p.can_edit,
        })
}

pub async fn create_profile(
    store: &Store,
    email: &str,
    full_name: Option<&str>,
    role: Role,
) -> AppResult<UserProfile> {
    let email = email.trim();
    if !email.contains('@') {
        return Err(AppError::new("VALIDATION/EMAIL", "A valid email is required").with_context("email", email));
    }
    let mut columns = Map::new();
    columns.insert("email".into(), Value::from(email));
    columns.insert("full_name".into(), full_name.map_or(Value::Null, Value::from));
    columns.insert("role".into(), Value::from(role.as_str()));
    let row = repo::create(store, PROFILES, columns).await?;
    repo::decode(PROFILES, row)
}

pub async fn get_profile(store: &Store, id: &str) -> AppResult<Option<UserProfile>> {
    repo::get(store, PROFILES, id)
        .await?
        .map(|row| repo::decode(PROFILES, row))
        .transpose()
}

pub async fn list_profiles(store: &Store) -> AppResult<Vec<UserProfile>> {
    let query = ListQuery::new().order_by("email");
    repo::list(store, PROFILES, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode(PROFILES, row))
        .collect()
}

pub async fn set_role(store: &Store, id: &str, role: Role) -> AppResult<UserProfile> {
    let mut columns = Map::new();
    columns.insert("role".into(), Value::from(role.as_str()));
    let row = repo::update(store, PROFILES, id, columns).await?;
    tracing::info!(target: "villaops", event = "user_role_changed", user_id = id, role = role.as_str());
    repo::decode(PROFILES, row)
}

pub async fn delete_profile(store: &Store, id: &str) -> AppResult<()> {
    repo::delete(store, PROFILES, id).await
}

pub async fn permissions_for(store: &Store, user_id: &str) -> AppResult<Vec<Permission>> {
    let query = ListQuery::new().eq("user_id", user_id).order_by("section");
    repo::list(store, PERMISSIONS, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode(PERMISSIONS, row))
        .collect()
}

/// Create or overwrite the user's permission row for a section.
pub async fn set_permission(
    store: &Store,
    user_id: &str,
    section: &str,
    can_view: bool,
    can_edit: bool,
) -> AppResult<Permission> {
    let existing = permissions_for(store, user_id)
        .await?
        .into_iter()
        .find(|p| p.section == section);
    let mut columns = Map::new();
    columns.insert("can_view".into(), Value::Bool(can_view));
    columns.insert("can_edit".into(), Value::Bool(can_edit));
    let row = match existing {
        Some(current) => repo::update(store, PERMISSIONS, &current.id, columns).await?,
        None => {
            columns.insert("user_id".into(), Value::from(user_id));
            columns.insert("section".into(), Value::from(section));
            repo::create(store, PERMISSIONS, columns).await?
        }
    };
    repo::decode(PERMISSIONS, row)
}

pub async fn has_permission(store: &Store, user_id: &str, section: &str, level: AccessLevel) -> AppResult<bool> {
    let Some(profile) = get_profile(store, user_id).await? else {
        return Ok(false);
    };
    if profile.role == Role::Admin {
        return Ok(true);
    }
    let permissions = permissions_for(store, user_id).await?;
    Ok(allows(&profile, &permissions, section, level))
}

/// Live feed of changes to one user's permission rows.
pub fn watch_permissions(store: &Store, user_id: &str) -> Subscription {
    store
        .changes()
        .subscribe(ChangeFilter::table(PERMISSIONS).with_eq("user_id", user_id))
}
