//! Payload shape checks run before writes. They mirror the store's
//! constraints for early, readable feedback; the store stays authoritative.

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::{AppError, AppResult};

pub const VALIDATION_SCHEMA: &str = "VALIDATION/SCHEMA";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Property,
    Booking,
    CleaningAction,
    CleaningRule,
    MaintenanceTask,
    InventoryItem,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Property => "property",
            Entity::Booking => "booking",
            Entity::CleaningAction => "cleaning_action",
            Entity::CleaningRule => "cleaning_rule",
            Entity::MaintenanceTask => "maintenance_task",
            Entity::InventoryItem => "inventory_item",
        }
    }
}

const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";

fn compile(schema: Value) -> JSONSchema {
    JSONSchema::compile(&schema).expect("built-in schema should compile")
}

static PROPERTY: Lazy<JSONSchema> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "name": {"type": "string", "minLength": 1, "maxLength": 200},
            "address": {"type": ["string", "null"]},
            "guesty_listing_id": {"type": ["string", "null"]},
            "bedrooms": {"type": "integer", "minimum": 0},
            "bathrooms": {"type": "integer", "minimum": 0},
            "max_guests": {"type": "integer", "minimum": 0}
        }
    }))
});

static BOOKING: Lazy<JSONSchema> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "required": ["property_id", "guest_name", "check_in", "check_out"],
        "properties": {
            "property_id": {"type": "string", "minLength": 1},
            "guest_name": {"type": "string", "minLength": 1},
            "check_in": {"type": "string", "pattern": DATE_PATTERN},
            "check_out": {"type": "string", "pattern": DATE_PATTERN},
            "total_amount": {"type": ["number", "null"], "minimum": 0}
        }
    }))
});

static CLEANING_ACTION: Lazy<JSONSchema> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "required": ["action_type", "display_name"],
        "properties": {
            "action_type": {"type": "string", "pattern": "^[a-z][a-z0-9_]*$"},
            "display_name": {"type": "string", "minLength": 1},
            "estimated_minutes": {"type": "integer", "minimum": 0},
            "checklist": {"type": "array", "items": {"type": "string"}}
        }
    }))
});

static CLEANING_RULE: Lazy<JSONSchema> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "required": ["rule_name", "min_nights", "max_nights"],
        "properties": {
            "rule_name": {"type": "string", "minLength": 1},
            "min_nights": {"type": "integer", "minimum": 1},
            "max_nights": {"type": "integer", "minimum": 1},
            "actions_by_day": {
                "type": "object",
                "propertyNames": {"pattern": "^[1-9][0-9]*$"},
                "additionalProperties": {"type": "array", "items": {"type": "string"}}
            },
            "property_id": {"type": ["string", "null"]}
        }
    }))
});

static MAINTENANCE_TASK: Lazy<JSONSchema> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "required": ["property_id", "title"],
        "properties": {
            "property_id": {"type": "string", "minLength": 1},
            "title": {"type": "string", "minLength": 1},
            "priority": {"enum": ["low", "medium", "high", "urgent"]},
            "status": {"enum": ["open", "in_progress", "completed", "cancelled"]},
            "due_date": {"type": ["string", "null"], "pattern": DATE_PATTERN}
        }
    }))
});

static INVENTORY_ITEM: Lazy<JSONSchema> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "name": {"type": "string", "minLength": 1},
            "quantity": {"type": "integer", "minimum": 0},
            "min_quantity": {"type": "integer", "minimum": 0},
            "unit_cost": {"type": "number", "minimum": 0}
        }
    }))
});

fn schema_for(entity: Entity) -> &'static JSONSchema {
    match entity {
        Entity::Property => &PROPERTY,
        Entity::Booking => &BOOKING,
        Entity::CleaningAction => &CLEANING_ACTION,
        Entity::CleaningRule => &CLEANING_RULE,
        Entity::MaintenanceTask => &MAINTENANCE_TASK,
        Entity::InventoryItem => &INVENTORY_ITEM,
    }
}

/// Validate a payload, collecting every violation into one error.
pub fn validate(entity: Entity, payload: &Value) -> AppResult<()> {
    let schema = schema_for(entity);
    let result = schema.validate(payload);
    if let Err(errors) = result {
        let messages: Vec<String> = errors
            .map(|err| {
                let path = err.instance_path.to_string();
                if path.is_empty() {
                    err.to_string()
                } else {
                    format!("{path}: {err}")
                }
            })
            .collect();
        return Err(AppError::new(VALIDATION_SCHEMA, messages.join("; "))
            .with_context("entity", entity.as_str())
            .with_context("violations", messages.len().to_string()));
    }
    Ok(())
}
