use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::repo::{self, bool_from_int, ListQuery};
use crate::state::Store;
use crate::validation::{self, Entity};
use crate::AppResult;

const TABLE: &str = "properties";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Property {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub guesty_listing_id: Option<String>,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub max_guests: i64,
    #[serde(deserialize_with = "bool_from_int")]
    pub is_active: bool,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PropertyInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guesty_listing_id: Option<String>,
    #[serde(default)]
    pub bedrooms: i64,
    #[serde(default)]
    pub bathrooms: i64,
    #[serde(default)]
    pub max_guests: i64,
}

impl PropertyInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

pub async fn create(store: &Store, input: &PropertyInput) -> AppResult<Property> {
    let columns = repo::to_columns(input)?;
    validation::validate(Entity::Property, &Value::Object(columns.clone()))?;
    let row = repo::create(store, TABLE, columns).await?;
    repo::decode(TABLE, row)
}

pub async fn get(store: &Store, id: &str) -> AppResult<Option<Property>> {
    repo::get(store, TABLE, id)
        .await?
        .map(|row| repo::decode(TABLE, row))
        .transpose()
}

pub async fn list(store: &Store, active_only: bool) -> AppResult<Vec<Property>> {
    let mut query = ListQuery::new().order_by("name, id");
    if active_only {
        query = query.eq("is_active", 1);
    }
    repo::list(store, TABLE, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode(TABLE, row))
        .collect()
}

pub async fn find_by_listing(store: &Store, listing_id: &str) -> AppResult<Option<Property>> {
    let query = ListQuery::new().eq("guesty_listing_id", listing_id).limit(1);
    repo::list(store, TABLE, &query)
        .await?
        .into_iter()
        .next()
        .map(|row| repo::decode(TABLE, row))
        .transpose()
}

pub async fn update(store: &Store, id: &str, input: &PropertyInput) -> AppResult<Property> {
    let columns = repo::to_columns(input)?;
    validation::validate(Entity::Property, &Value::Object(columns.clone()))?;
    let row = repo::update(store, TABLE, id, columns).await?;
    repo::decode(TABLE, row)
}

pub async fn set_active(store: &Store, id: &str, active: bool) -> AppResult<Property> {
    let mut columns = serde_json::Map::new();
    columns.insert("is_active".into(), Value::Bool(active));
    let row = repo::update(store, TABLE, id, columns).await?;
    repo::decode(TABLE, row)
}

pub async fn delete(store: &Store, id: &str) -> AppResult<()> {
    repo::delete(store, TABLE, id).await
}
