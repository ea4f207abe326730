//! Inventory store: the ordered item list plus best-effort persistence
//!
//! Every mutation writes the whole collection back to the record store.
//! Write failures are logged and otherwise ignored; the in-memory list stays
//! authoritative for the running process.

use super::reconcile::{self, MergeSummary, Reading};
use super::{new_item_id, BatteryType, InventoryItem, Location};
use crate::storage::RecordStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const INVENTORY_NAMESPACE: &str = "ha_battery_inventory";

/// Current on-disk layout. Version 0 is the bare array the web app wrote.
const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct InventoryRecordRef<'a> {
    version: u32,
    items: &'a [InventoryItem],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InventoryRecord {
    Versioned {
        version: u32,
        items: Vec<InventoryItem>,
    },
    Legacy(Vec<InventoryItem>),
}

/// Fields to overwrite on an existing item; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub device_name: Option<String>,
    pub location: Option<Location>,
    pub battery_type: Option<BatteryType>,
    pub battery_count: Option<u32>,
    pub estimated_level: Option<f64>,
    pub last_changed: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub ha_entity_id: Option<String>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        *self == ItemPatch::default()
    }

    fn apply(self, item: &mut InventoryItem, now: DateTime<Utc>) {
        let previous_level = item.estimated_level;

        if let Some(device_name) = self.device_name {
            item.device_name = device_name;
        }
        if let Some(location) = self.location {
            item.location = location;
        }
        if let Some(battery_type) = self.battery_type {
            item.battery_type = battery_type;
        }
        if let Some(count) = self.battery_count {
            item.battery_count = count.max(1);
        }
        if let Some(level) = self.estimated_level {
            item.estimated_level = Some(level);
        }
        if let Some(notes) = self.notes {
            item.notes = Some(notes).filter(|n| !n.is_empty());
        }
        if let Some(entity_id) = self.ha_entity_id {
            item.ha_entity_id = Some(entity_id).filter(|id| !id.is_empty());
        }

        // Setting a level of 100 means the batteries were just replaced
        let replaced = self.estimated_level == Some(100.0) && previous_level != Some(100.0);
        match self.last_changed {
            Some(ts) => item.last_changed = ts,
            None if replaced => item.last_changed = now,
            None => {}
        }
    }
}

#[derive(Debug)]
pub struct InventoryStore {
    items: Vec<InventoryItem>,
    records: RecordStore,
}

impl InventoryStore {
    /// Open the store, loading whatever the record store holds
    pub fn open(records: RecordStore) -> Self {
        let items = load(&records);
        Self { items, records }
    }

    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&InventoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Item linked to a Home Assistant entity
    pub fn find_linked(&self, entity_id: &str) -> Option<&InventoryItem> {
        self.items
            .iter()
            .find(|item| item.linked_entity() == Some(entity_id))
    }

    /// Append an item. A missing or already-used id is replaced with a fresh one.
    pub fn add(&mut self, mut item: InventoryItem) -> &InventoryItem {
        if item.id.is_empty() || self.get(&item.id).is_some() {
            item.id = new_item_id();
        }
        item.battery_count = item.battery_count.max(1);

        tracing::debug!("Adding item {} ({})", item.id, item.device_name);
        self.items.push(item);
        self.persist();
        &self.items[self.items.len() - 1]
    }

    /// Apply `patch` to the item with `id`. Unknown ids are ignored.
    pub fn update(&mut self, id: &str, patch: ItemPatch) -> Option<&InventoryItem> {
        self.update_at(id, patch, Utc::now())
    }

    pub fn update_at(
        &mut self,
        id: &str,
        patch: ItemPatch,
        now: DateTime<Utc>,
    ) -> Option<&InventoryItem> {
        let Some(index) = self.items.iter().position(|item| item.id == id) else {
            tracing::debug!("Ignoring update for unknown item {}", id);
            return None;
        };

        patch.apply(&mut self.items[index], now);
        self.persist();
        Some(&self.items[index])
    }

    /// Remove the item with `id`. Unknown ids are ignored.
    pub fn remove(&mut self, id: &str) -> Option<InventoryItem> {
        let Some(index) = self.items.iter().position(|item| item.id == id) else {
            tracing::debug!("Ignoring removal of unknown item {}", id);
            return None;
        };

        let removed = self.items.remove(index);
        self.persist();
        Some(removed)
    }

    /// Merge a batch of readings against the current items and persist
    pub fn apply_readings(&mut self, readings: &[Reading]) -> MergeSummary {
        let outcome = reconcile::merge(&self.items, readings);
        let summary = outcome.summary();
        self.items = outcome.items;
        self.persist();

        tracing::info!(
            "Merged {} readings: {} added, {} updated",
            readings.len(),
            summary.added,
            summary.updated
        );
        summary
    }

    /// Best-effort write of the full collection
    pub fn persist(&self) {
        let record = InventoryRecordRef {
            version: SCHEMA_VERSION,
            items: &self.items,
        };
        if let Err(e) = self.records.save(INVENTORY_NAMESPACE, &record) {
            tracing::error!("Failed to save inventory: {:#}", e);
        }
    }
}

fn load(records: &RecordStore) -> Vec<InventoryItem> {
    let record = match records.load::<InventoryRecord>(INVENTORY_NAMESPACE) {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::info!("No inventory at {:?}, starting empty", records.path(INVENTORY_NAMESPACE));
            return Vec::new();
        }
        Err(e) => {
            tracing::error!("Failed to load inventory, starting empty: {:#}", e);
            return Vec::new();
        }
    };

    let mut items = match record {
        InventoryRecord::Versioned { version, items } => {
            if version > SCHEMA_VERSION {
                tracing::warn!(
                    "Inventory record has newer schema version {} (expected {}), loading anyway",
                    version,
                    SCHEMA_VERSION
                );
            }
            items
        }
        InventoryRecord::Legacy(items) => {
            tracing::info!("Upgrading unversioned inventory record");
            items
        }
    };

    let mut seen = HashSet::new();
    for item in &mut items {
        if item.id.is_empty() || !seen.insert(item.id.clone()) {
            item.id = new_item_id();
            seen.insert(item.id.clone());
        }
        item.battery_count = item.battery_count.max(1);
    }

    tracing::info!("Loaded {} inventory items", items.len());
    items
}
