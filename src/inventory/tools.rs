//! Inventory tools: list, inspect, add, edit, remove, stats and export

use super::estimate::{estimate_level, relative_age, LevelSource};
use super::export;
use super::stats::{search, Stats};
use super::store::{InventoryStore, ItemPatch};
use super::{parse_timestamp, InventoryItem, ItemDraft};
use crate::shared::{error_result, internal_error, text_result};
use chrono::{DateTime, Utc};
use rmcp::{model::*, ErrorData as McpError};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::{Mutex, MutexGuard};

// === Parameter Types ===

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListParams {
    #[schemars(description = "Only show items whose device name or location contains this text (case-insensitive)")]
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ItemIdParams {
    #[schemars(description = "Inventory item id (see list_items)")]
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddItemParams {
    #[schemars(description = "Device name, e.g. 'Radiator thermostat living room'")]
    pub device_name: String,
    #[schemars(description = "Room: Living Room, Kitchen, Bedroom, Bathroom, Hallway, Office, Basement, Outside, Other, or any custom label (default: Living Room)")]
    #[serde(default)]
    pub location: Option<String>,
    #[schemars(description = "Battery type: AA, AAA, CR2032, CR2025, CR123A, 9V, Other, or any custom label (default: AA)")]
    #[serde(default)]
    pub battery_type: Option<String>,
    #[schemars(description = "Number of batteries the device takes (default: 2)")]
    #[serde(default)]
    pub battery_count: Option<u32>,
    #[schemars(description = "Current charge in percent, 0-100 (default: 100, fresh batteries)")]
    #[serde(default)]
    pub level: Option<f64>,
    #[schemars(description = "Free-form notes")]
    #[serde(default)]
    pub notes: Option<String>,
    #[schemars(description = "Home Assistant entity to link, e.g. 'sensor.door_battery'")]
    #[serde(default)]
    pub ha_entity_id: Option<String>,
}

impl AddItemParams {
    pub fn into_draft(self) -> ItemDraft {
        let defaults = ItemDraft::default();
        ItemDraft {
            device_name: self.device_name,
            location: self.location.map(Into::into).unwrap_or(defaults.location),
            battery_type: self.battery_type.map(Into::into).unwrap_or(defaults.battery_type),
            battery_count: self.battery_count.unwrap_or(defaults.battery_count),
            level: self.level.unwrap_or(defaults.level),
            notes: self.notes.filter(|n| !n.is_empty()),
            ha_entity_id: self.ha_entity_id.filter(|id| !id.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateItemParams {
    #[schemars(description = "Inventory item id (see list_items)")]
    pub id: String,
    #[schemars(description = "New device name")]
    #[serde(default)]
    pub device_name: Option<String>,
    #[schemars(description = "New room label")]
    #[serde(default)]
    pub location: Option<String>,
    #[schemars(description = "New battery type label")]
    #[serde(default)]
    pub battery_type: Option<String>,
    #[schemars(description = "New number of batteries")]
    #[serde(default)]
    pub battery_count: Option<u32>,
    #[schemars(description = "New charge level 0-100. Setting 100 records a battery change now. Not allowed for items linked to Home Assistant.")]
    #[serde(default)]
    pub level: Option<f64>,
    #[schemars(description = "When the batteries were last changed (ISO-8601 date or timestamp)")]
    #[serde(default)]
    pub last_changed: Option<String>,
    #[schemars(description = "New notes (empty string clears them)")]
    #[serde(default)]
    pub notes: Option<String>,
    #[schemars(description = "Home Assistant entity to link (empty string unlinks)")]
    #[serde(default)]
    pub ha_entity_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ExportParams {
    #[schemars(description = "File to write the YAML to. When omitted the YAML is returned directly.")]
    #[serde(default)]
    pub output: Option<String>,
}

// === Rendering ===

pub fn render_item(item: &InventoryItem, now: DateTime<Utc>) -> String {
    let estimate = estimate_level(item, now);
    let source = match estimate.source {
        LevelSource::Reported => "reported",
        LevelSource::Decayed => "estimated from age",
    };

    let mut line = format!(
        "[{}] {}\n  {} | {}x {} | {}% ({}, {}) | changed {}",
        item.id,
        item.device_name,
        item.location,
        item.battery_count,
        item.battery_type,
        estimate.level,
        estimate.tier,
        source,
        relative_age(item.last_changed, now),
    );
    if let Some(entity_id) = item.linked_entity() {
        line.push_str(&format!("\n  Linked to {}", entity_id));
    }
    if let Some(notes) = &item.notes {
        line.push_str(&format!("\n  Notes: {}", notes));
    }
    line
}

pub fn render_list(items: &[&InventoryItem], now: DateTime<Utc>) -> String {
    if items.is_empty() {
        return "No items in the inventory.".to_string();
    }

    let mut output = format!("{} item(s):\n\n", items.len());
    for item in items {
        output.push_str(&render_item(item, now));
        output.push_str("\n\n");
    }
    output.truncate(output.trim_end().len());
    output
}

pub fn render_stats(stats: &Stats) -> String {
    let mut output = format!(
        "Inventory Summary:\n\n\
         Devices: {}\n\
         Batteries: {}\n\
         Needing replacement: {}\n",
        stats.total_devices, stats.total_batteries, stats.low_battery_count
    );

    if !stats.type_distribution.is_empty() {
        output.push_str("\nBy battery type:\n");
        for (label, count) in &stats.type_distribution {
            output.push_str(&format!("  {}: {}\n", label, count));
        }
    }
    output
}

// === Helper Functions ===

fn lock(store: &Mutex<InventoryStore>) -> Result<MutexGuard<'_, InventoryStore>, McpError> {
    store
        .lock()
        .map_err(|_| internal_error("Inventory lock poisoned"))
}

fn check_level(level: f64) -> Result<(), String> {
    if (0.0..=100.0).contains(&level) {
        Ok(())
    } else {
        Err(format!("Level must be between 0 and 100, got {}", level))
    }
}

/// Validate an edit and turn it into a patch
fn build_patch(existing: &InventoryItem, params: UpdateItemParams) -> Result<ItemPatch, String> {
    if let Some(name) = &params.device_name {
        if name.trim().is_empty() {
            return Err("Device name cannot be empty".to_string());
        }
    }
    if params.battery_count == Some(0) {
        return Err("Battery count must be at least 1".to_string());
    }

    let linked_after = match params.ha_entity_id.as_deref() {
        Some(entity_id) => !entity_id.is_empty(),
        None => existing.is_linked(),
    };
    if let Some(level) = params.level {
        if linked_after {
            return Err(format!(
                "'{}' gets its level from Home Assistant; manual level edits are disabled",
                existing.device_name
            ));
        }
        check_level(level)?;
    }

    let last_changed = match params.last_changed.as_deref() {
        Some(raw) => Some(
            parse_timestamp(raw).ok_or_else(|| format!("Invalid timestamp '{}'", raw))?,
        ),
        None => None,
    };

    Ok(ItemPatch {
        device_name: params.device_name.map(|n| n.trim().to_string()),
        location: params.location.map(Into::into),
        battery_type: params.battery_type.map(Into::into),
        battery_count: params.battery_count,
        estimated_level: params.level,
        last_changed,
        notes: params.notes,
        ha_entity_id: params.ha_entity_id,
    })
}

// === Tool Functions ===

pub async fn list_items(
    store: &Mutex<InventoryStore>,
    params: ListParams,
) -> Result<CallToolResult, McpError> {
    let store = lock(store)?;
    let items = search(store.items(), params.search.as_deref().unwrap_or(""));
    Ok(text_result(render_list(&items, Utc::now())))
}

pub async fn get_item(
    store: &Mutex<InventoryStore>,
    params: ItemIdParams,
) -> Result<CallToolResult, McpError> {
    let store = lock(store)?;
    match store.get(&params.id) {
        Some(item) => Ok(text_result(render_item(item, Utc::now()))),
        None => Ok(text_result(format!("No item with id {}", params.id))),
    }
}

pub async fn add_item(
    store: &Mutex<InventoryStore>,
    params: AddItemParams,
) -> Result<CallToolResult, McpError> {
    let draft = params.into_draft();
    if let Err(msg) = draft.validate() {
        return Ok(error_result(msg));
    }

    let mut store = lock(store)?;
    if let Some(entity_id) = draft.ha_entity_id.as_deref() {
        if let Some(other) = store.find_linked(entity_id) {
            return Ok(error_result(format!(
                "{} is already linked to '{}' [{}]",
                entity_id, other.device_name, other.id
            )));
        }
    }

    let now = Utc::now();
    let item = store.add(draft.into_item(now));
    Ok(text_result(format!("Added:\n{}", render_item(item, now))))
}

pub async fn update_item(
    store: &Mutex<InventoryStore>,
    params: UpdateItemParams,
) -> Result<CallToolResult, McpError> {
    let mut store = lock(store)?;
    let id = params.id.clone();

    let Some(existing) = store.get(&id) else {
        return Ok(text_result(format!("No item with id {}, nothing changed", id)));
    };

    if let Some(entity_id) = params.ha_entity_id.as_deref().filter(|e| !e.is_empty()) {
        if let Some(other) = store.find_linked(entity_id).filter(|other| other.id != id) {
            return Ok(error_result(format!(
                "{} is already linked to '{}' [{}]",
                entity_id, other.device_name, other.id
            )));
        }
    }

    let patch = match build_patch(existing, params) {
        Ok(patch) => patch,
        Err(msg) => return Ok(error_result(msg)),
    };
    if patch.is_empty() {
        return Ok(text_result("Nothing to change"));
    }

    let now = Utc::now();
    match store.update_at(&id, patch, now) {
        Some(item) => Ok(text_result(format!("Updated:\n{}", render_item(item, now)))),
        None => Ok(text_result(format!("No item with id {}, nothing changed", id))),
    }
}

pub async fn remove_item(
    store: &Mutex<InventoryStore>,
    params: ItemIdParams,
) -> Result<CallToolResult, McpError> {
    let mut store = lock(store)?;
    match store.remove(&params.id) {
        Some(item) => Ok(text_result(format!(
            "Removed '{}' [{}]",
            item.device_name, item.id
        ))),
        None => Ok(text_result(format!("No item with id {}, nothing removed", params.id))),
    }
}

pub async fn get_stats(store: &Mutex<InventoryStore>) -> Result<CallToolResult, McpError> {
    let store = lock(store)?;
    let stats = Stats::compute(store.items(), Utc::now());
    Ok(text_result(render_stats(&stats)))
}

pub async fn export_yaml(
    store: &Mutex<InventoryStore>,
    params: ExportParams,
) -> Result<CallToolResult, McpError> {
    let (yaml, count) = {
        let store = lock(store)?;
        (export::to_yaml(store.items(), Utc::now()), store.items().len())
    };

    let Some(output) = params.output else {
        return Ok(text_result(yaml));
    };

    match tokio::fs::write(&output, yaml).await {
        Ok(()) => Ok(text_result(format!("Exported {} item(s) to {}", count, output))),
        Err(e) => Ok(error_result(format!("Failed to write {}: {}", output, e))),
    }
}
