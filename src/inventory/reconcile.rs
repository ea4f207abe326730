//! Merging Home Assistant readings into the inventory
//!
//! Every Home Assistant entity maps to at most one inventory item. A reading
//! for a known entity refreshes that item's level and timestamp in place and
//! leaves everything the user set (name, room, battery type, count) alone.
//! A reading for an unknown entity becomes a new item at the end of the list.

use super::{new_item_id, BatteryType, InventoryItem, KnownBatteryType, KnownLocation, Location};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A battery level reported for one external entity
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub entity_id: String,
    pub level: f64,
    pub last_updated: DateTime<Utc>,
    /// Friendly name as shown in Home Assistant
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub items: Vec<InventoryItem>,
    pub added: usize,
    pub updated: usize,
}

impl MergeOutcome {
    pub fn summary(&self) -> MergeSummary {
        MergeSummary {
            added: self.added,
            updated: self.updated,
        }
    }
}

/// Room guesses, checked in order against the lowercased name. First hit wins.
pub const LOCATION_RULES: &[(&str, KnownLocation)] = &[
    ("wohnzimmer", KnownLocation::LivingRoom),
    ("living room", KnownLocation::LivingRoom),
    ("küche", KnownLocation::Kitchen),
    ("kitchen", KnownLocation::Kitchen),
    ("schlafzimmer", KnownLocation::Bedroom),
    ("bedroom", KnownLocation::Bedroom),
    ("bad", KnownLocation::Bathroom),
    ("bath", KnownLocation::Bathroom),
    ("flur", KnownLocation::Hallway),
    ("hallway", KnownLocation::Hallway),
    ("büro", KnownLocation::Office),
    ("office", KnownLocation::Office),
    ("keller", KnownLocation::Basement),
    ("basement", KnownLocation::Basement),
    ("draußen", KnownLocation::Outside),
    ("outside", KnownLocation::Outside),
    ("garden", KnownLocation::Outside),
];

/// Trailing labels Home Assistant integrations append to battery sensor names
pub const BATTERY_SUFFIXES: &[&str] = &[" Battery Level", " Batteriestatus", " Battery", " Batterie"];

pub fn guess_location(label: &str) -> KnownLocation {
    let label = label.to_lowercase();
    LOCATION_RULES
        .iter()
        .find(|(keyword, _)| label.contains(keyword))
        .map(|(_, location)| *location)
        .unwrap_or(KnownLocation::Other)
}

/// Strip one known battery suffix (ASCII case-insensitive)
pub fn strip_battery_suffix(name: &str) -> &str {
    let name = name.trim();
    for suffix in BATTERY_SUFFIXES {
        let Some(start) = name.len().checked_sub(suffix.len()) else {
            continue;
        };
        if name.is_char_boundary(start) && name[start..].eq_ignore_ascii_case(suffix) {
            return name[..start].trim_end();
        }
    }
    name
}

/// Merge `incoming` into a copy of `existing`.
///
/// Matching is by exact entity id; items without one are never touched.
/// Existing items keep their positions, new ones are appended in batch order.
/// An entity repeated within the batch is inserted once and then updated.
pub fn merge(existing: &[InventoryItem], incoming: &[Reading]) -> MergeOutcome {
    let mut items = existing.to_vec();
    let mut by_entity: HashMap<String, usize> = HashMap::new();
    for (index, item) in items.iter().enumerate() {
        if let Some(entity_id) = item.linked_entity() {
            by_entity.entry(entity_id.to_string()).or_insert(index);
        }
    }

    let mut added = 0;
    let mut updated = 0;

    for reading in incoming {
        if reading.entity_id.is_empty() {
            tracing::debug!("Skipping reading without entity id ({:?})", reading.name);
            continue;
        }

        let level = clamp_level(reading.level);
        match by_entity.get(&reading.entity_id) {
            Some(&index) => {
                let item = &mut items[index];
                item.estimated_level = Some(level);
                item.last_changed = reading.last_updated;
                updated += 1;
            }
            None => {
                by_entity.insert(reading.entity_id.clone(), items.len());
                items.push(item_from_reading(reading, level));
                added += 1;
            }
        }
    }

    MergeOutcome {
        items,
        added,
        updated,
    }
}

fn item_from_reading(reading: &Reading, level: f64) -> InventoryItem {
    let name = reading.name.trim();
    let device_name = if name.is_empty() {
        reading.entity_id.clone()
    } else {
        name.to_string()
    };

    InventoryItem {
        id: new_item_id(),
        device_name,
        location: Location::Known(guess_location(&reading.name)),
        battery_type: BatteryType::Known(KnownBatteryType::Other),
        battery_count: 1,
        estimated_level: Some(level),
        last_changed: reading.last_updated,
        notes: None,
        ha_entity_id: Some(reading.entity_id.clone()),
    }
}

fn clamp_level(level: f64) -> f64 {
    if level.is_finite() {
        level.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
