use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

use crate::db::run_in_tx;
use crate::id::new_uuid_v7;
use crate::realtime::ChangeKind;
use crate::repo::{self, ListQuery};
use crate::state::Store;
use crate::time::now_ms;
use crate::validation::{self, Entity};
use crate::{AppError, AppResult};

const ITEMS: &str = "inventory_items";
const ORDERS: &str = "purchase_orders";
const ORDER_ITEMS: &str = "purchase_order_items";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryItem {
    pub id: String,
    pub property_id: Option<String>,
    pub name: String,
    pub category: String,
    pub quantity: i64,
    pub min_quantity: i64,
    pub unit_cost: f64,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

impl InventoryItem {
    pub fn is_low_stock(&self) -> bool {
        self.quantity < self.min_quantity
    }

    pub fn stock_value(&self) -> f64 {
        self.quantity as f64 * self.unit_cost
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryItemInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub min_quantity: i64,
    #[serde(default)]
    pub unit_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OrderStatus {
    Draft,
    Ordered,
    Received,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Ordered => "ordered",
            OrderStatus::Received => "received",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseOrder {
    pub id: String,
    pub property_id: Option<String>,
    pub vendor: String,
    pub status: OrderStatus,
    #[ts(type = "number | null")]
    pub ordered_at: Option<i64>,
    #[ts(type = "number | null")]
    pub received_at: Option<i64>,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseOrderItem {
    pub id: String,
    pub order_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub unit_cost: f64,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderLine {
    pub item_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit_cost: f64,
}

pub fn order_total(lines: &[PurchaseOrderItem]) -> f64 {
    lines.iter().map(|l| l.quantity as f64 * l.unit_cost).sum()
}

// Items

fn item_columns(input: &InventoryItemInput) -> AppResult<Map<String, Value>> {
    let columns = repo::to_columns(input)?;
    validation::validate(Entity::InventoryItem, &Value::Object(columns.clone()))?;
    Ok(columns)
}

pub async fn create_item(store: &Store, input: &InventoryItemInput) -> AppResult<InventoryItem> {
    let row = repo::create(store, ITEMS, item_columns(input)?).await?;
    repo::decode(ITEMS, row)
}

pub async fn update_item(store: &Store, id: &str, input: &InventoryItemInput) -> AppResult<InventoryItem> {
    let row = repo::update(store, ITEMS, id, item_columns(input)?).await?;
    repo::decode(ITEMS, row)
}

pub async fn get_item(store: &Store, id: &str) -> AppResult<Option<InventoryItem>> {
    repo::get(store, ITEMS, id)
        .await?
        .map(|row| repo::decode(ITEMS, row))
        .transpose()
}

pub async fn list_items(store: &Store, property_id: Option<&str>) -> AppResult<Vec<InventoryItem>> {
    let mut query = ListQuery::new().order_by("category, name, id");
    if let Some(property_id) = property_id {
        query = query.eq("property_id", property_id);
    }
    repo::list(store, ITEMS, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode(ITEMS, row))
        .collect()
}

pub async fn low_stock(store: &Store, property_id: Option<&str>) -> AppResult<Vec<InventoryItem>> {
    Ok(list_items(store, property_id)
        .await?
        .into_iter()
        .filter(InventoryItem::is_low_stock)
        .collect())
}

/// Apply a stock movement; stock may not go below zero.
pub async fn adjust_quantity(store: &Store, id: &str, delta: i64) -> AppResult<InventoryItem> {
    let item: InventoryItem = repo::decode(ITEMS, repo::require(store, ITEMS, id).await?)?;
    let next = item.quantity.checked_add(delta).filter(|q| *q >= 0);
    let Some(next) = next else {
        return Err(AppError::new("VALIDATION/STOCK", "Stock movement out of range")
            .with_context("item_id", id)
            .with_context("quantity", item.quantity.to_string())
            .with_context("delta", delta.to_string()));
    };
    let mut columns = Map::new();
    columns.insert("quantity".into(), Value::from(next));
    let row = repo::update(store, ITEMS, id, columns).await?;
    repo::decode(ITEMS, row)
}

pub async fn delete_item(store: &Store, id: &str) -> AppResult<()> {
    repo::delete(store, ITEMS, id).await
}

// Purchase orders

/// Create a draft order together with its lines.
pub async fn create_order(
    store: &Store,
    vendor: &str,
    property_id: Option<&str>,
    lines: &[OrderLine],
) -> AppResult<PurchaseOrder> {
    if vendor.trim().is_empty() {
        return Err(AppError::new("VALIDATION/VENDOR", "Vendor is required"));
    }
    if lines.is_empty() {
        return Err(AppError::new("VALIDATION/ORDER_EMPTY", "An order needs at least one line"));
    }
    if let Some(bad) = lines.iter().find(|l| l.quantity <= 0) {
        return Err(AppError::new("VALIDATION/QUANTITY", "Order quantities must be positive")
            .with_context("item_id", bad.item_id.clone()));
    }

    let order_id = new_uuid_v7();
    let line_ids: Vec<String> = lines.iter().map(|_| new_uuid_v7()).collect();
    let owned_lines: Vec<(String, OrderLine)> = line_ids.iter().cloned().zip(lines.iter().cloned()).collect();
    let vendor = vendor.trim().to_string();
    let property_id = property_id.map(str::to_string);
    let id = order_id.clone();

    run_in_tx(store.pool(), move |tx| {
        async move {
            let now = now_ms();
            sqlx::query(
                "INSERT INTO purchase_orders (id, property_id, vendor, status, created_at, updated_at) \
                 VALUES (?, ?, ?, 'draft', ?, ?)",
            )
            .bind(&id)
            .bind(&property_id)
            .bind(&vendor)
            .bind(now)
            .bind(now)
            .execute(&mut **tx)
            .await?;
            for (line_id, line) in &owned_lines {
                sqlx::query(
                    "INSERT INTO purchase_order_items (id, order_id, item_id, quantity, unit_cost, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(line_id)
                .bind(&id)
                .bind(&line.item_id)
                .bind(line.quantity)
                .bind(line.unit_cost)
                .bind(now)
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
            Ok::<_, AppError>(())
        }
        .boxed()
    })
    .await?;

    let order = repo::publish_current(store, ORDERS, &order_id, ChangeKind::Insert).await?;
    for line_id in &line_ids {
        repo::publish_current(store, ORDER_ITEMS, line_id, ChangeKind::Insert).await?;
    }
    repo::decode(ORDERS, order)
}

pub async fn get_order(store: &Store, id: &str) -> AppResult<Option<PurchaseOrder>> {
    repo::get(store, ORDERS, id)
        .await?
        .map(|row| repo::decode(ORDERS, row))
        .transpose()
}

pub async fn list_orders(store: &Store, status: Option<OrderStatus>) -> AppResult<Vec<PurchaseOrder>> {
    let mut query = ListQuery::new();
    if let Some(status) = status {
        query = query.eq("status", status.as_str());
    }
    repo::list(store, ORDERS, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode(ORDERS, row))
        .collect()
}

pub async fn order_lines(store: &Store, order_id: &str) -> AppResult<Vec<PurchaseOrderItem>> {
    let query = ListQuery::new().eq("order_id", order_id);
    repo::list(store, ORDER_ITEMS, &query)
        .await?
        .into_iter()
        .map(|row| repo::decode(ORDER_ITEMS, row))
        .collect()
}

async fn move_order(
    store: &Store,
    id: &str,
    expected: OrderStatus,
    next: OrderStatus,
    stamp: Option<&str>,
) -> AppResult<PurchaseOrder> {
    let order: PurchaseOrder = repo::decode(ORDERS, repo::require(store, ORDERS, id).await?)?;
    if order.status != expected {
        return Err(invalid_order_state(id, order.status, next));
    }
    let mut columns = Map::new();
    columns.insert("status".into(), Value::from(next.as_str()));
    if let Some(column) = stamp {
        columns.insert(column.into(), Value::from(now_ms()));
    }
    let row = repo::update(store, ORDERS, id, columns).await?;
    repo::decode(ORDERS, row)
}

fn invalid_order_state(id: &str, current: OrderStatus, next: OrderStatus) -> AppError {
    AppError::new("VALIDATION/ORDER_STATE", "Order is not in the right state")
        .with_context("order_id", id)
        .with_context("status", current.as_str())
        .with_context("requested", next.as_str())
}

pub async fn place_order(store: &Store, id: &str) -> AppResult<PurchaseOrder> {
    move_order(store, id, OrderStatus::Draft, OrderStatus::Ordered, Some("ordered_at")).await
}

pub async fn cancel_order(store: &Store, id: &str) -> AppResult<PurchaseOrder> {
    let order: PurchaseOrder = repo::decode(ORDERS, repo::require(store, ORDERS, id).await?)?;
    match order.status {
        OrderStatus::Draft | OrderStatus::Ordered => {
            move_order(store, id, order.status, OrderStatus::Cancelled, None).await
        }
        other => Err(invalid_order_state(id, other, OrderStatus::Cancelled)),
    }
}

/// Add every line's quantity to stock and mark the order received, all in
/// one transaction. Only `ordered` orders can be received.
pub async fn receive_order(store: &Store, id: &str) -> AppResult<PurchaseOrder> {
    let order_id = id.to_string();
    let touched: Vec<String> = run_in_tx(store.pool(), move |tx| {
        async move {
            let status: Option<(String,)> = sqlx::query_as("SELECT status FROM purchase_orders WHERE id = ?")
                .bind(&order_id)
                .fetch_optional(&mut **tx)
                .await?;
            let Some((status,)) = status else {
                return Err(AppError::new("SQLX/ROW_NOT_FOUND", "Record not found")
                    .with_context("table", ORDERS)
                    .with_context("id", order_id.clone()));
            };
            if status != OrderStatus::Ordered.as_str() {
                return Err(AppError::new("VALIDATION/ORDER_STATE", "Only ordered purchase orders can be received")
                    .with_context("order_id", order_id.clone())
                    .with_context("status", status));
            }

            let lines: Vec<(String, i64)> =
                sqlx::query_as("SELECT item_id, quantity FROM purchase_order_items WHERE order_id = ?")
                    .bind(&order_id)
                    .fetch_all(&mut **tx)
                    .await?;
            let now = now_ms();
            let mut touched = Vec::with_capacity(lines.len());
            for (item_id, quantity) in lines {
                sqlx::query("UPDATE inventory_items SET quantity = quantity + ?, updated_at = ? WHERE id = ?")
                    .bind(quantity)
                    .bind(now)
                    .bind(&item_id)
                    .execute(&mut **tx)
                    .await?;
                if !touched.contains(&item_id) {
                    touched.push(item_id);
                }
            }
            sqlx::query("UPDATE purchase_orders SET status = 'received', received_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(&order_id)
                .execute(&mut **tx)
                .await?;
            Ok::<_, AppError>(touched)
        }
        .boxed()
    })
    .await?;

    for item_id in &touched {
        repo::publish_current(store, ITEMS, item_id, ChangeKind::Update).await?;
    }
    let order = repo::publish_current(store, ORDERS, id, ChangeKind::Update).await?;
    tracing::info!(
        target: "villaops",
        event = "purchase_order_received",
        order_id = id,
        items = touched.len(),
    );
    repo::decode(ORDERS, order)
}
