//! Battery inventory: item model, charge estimation, store and reconciliation
//!
//! Items serialize in the camelCase layout of the browser-based inventory, so an
//! exported record from it loads as-is. Location and battery type are tagged
//! variants: a known label parses into the closed enumeration, anything else
//! (usually names imported from Home Assistant) is kept verbatim.

pub mod estimate;
pub mod export;
pub mod reconcile;
pub mod stats;
pub mod store;
pub mod tools;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// === Locations ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownLocation {
    LivingRoom,
    Kitchen,
    Bedroom,
    Bathroom,
    Hallway,
    Office,
    Basement,
    Outside,
    Other,
}

impl KnownLocation {
    pub const ALL: [KnownLocation; 9] = [
        KnownLocation::LivingRoom,
        KnownLocation::Kitchen,
        KnownLocation::Bedroom,
        KnownLocation::Bathroom,
        KnownLocation::Hallway,
        KnownLocation::Office,
        KnownLocation::Basement,
        KnownLocation::Outside,
        KnownLocation::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            KnownLocation::LivingRoom => "Living Room",
            KnownLocation::Kitchen => "Kitchen",
            KnownLocation::Bedroom => "Bedroom",
            KnownLocation::Bathroom => "Bathroom",
            KnownLocation::Hallway => "Hallway",
            KnownLocation::Office => "Office",
            KnownLocation::Basement => "Basement",
            KnownLocation::Outside => "Outside",
            KnownLocation::Other => "Other",
        }
    }

    /// Parse an English or German room label
    pub fn from_label(label: &str) -> Option<Self> {
        let location = match label.trim().to_lowercase().as_str() {
            "living room" | "livingroom" | "wohnzimmer" => KnownLocation::LivingRoom,
            "kitchen" | "küche" | "kueche" => KnownLocation::Kitchen,
            "bedroom" | "schlafzimmer" => KnownLocation::Bedroom,
            "bathroom" | "badezimmer" => KnownLocation::Bathroom,
            "hallway" | "flur" => KnownLocation::Hallway,
            "office" | "büro" | "buero" => KnownLocation::Office,
            "basement" | "keller" => KnownLocation::Basement,
            "outside" | "draußen" | "draussen" => KnownLocation::Outside,
            "other" | "sonstiges" => KnownLocation::Other,
            _ => return None,
        };
        Some(location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Location {
    Known(KnownLocation),
    Custom(String),
}

impl Location {
    pub fn label(&self) -> &str {
        match self {
            Location::Known(known) => known.label(),
            Location::Custom(label) => label,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Location::Known(KnownLocation::Other)
    }
}

impl From<KnownLocation> for Location {
    fn from(known: KnownLocation) -> Self {
        Location::Known(known)
    }
}

impl From<String> for Location {
    fn from(label: String) -> Self {
        if label.trim().is_empty() {
            return Location::default();
        }
        match KnownLocation::from_label(&label) {
            Some(known) => Location::Known(known),
            None => Location::Custom(label),
        }
    }
}

impl From<&str> for Location {
    fn from(label: &str) -> Self {
        Location::from(label.to_string())
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        match location {
            Location::Known(known) => known.label().to_string(),
            Location::Custom(label) => label,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// === Battery types ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownBatteryType {
    AA,
    AAA,
    CR2032,
    CR2025,
    CR123A,
    NineVolt,
    Other,
}

impl KnownBatteryType {
    pub const ALL: [KnownBatteryType; 7] = [
        KnownBatteryType::AA,
        KnownBatteryType::AAA,
        KnownBatteryType::CR2032,
        KnownBatteryType::CR2025,
        KnownBatteryType::CR123A,
        KnownBatteryType::NineVolt,
        KnownBatteryType::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            KnownBatteryType::AA => "AA",
            KnownBatteryType::AAA => "AAA",
            KnownBatteryType::CR2032 => "CR2032",
            KnownBatteryType::CR2025 => "CR2025",
            KnownBatteryType::CR123A => "CR123A",
            KnownBatteryType::NineVolt => "9V",
            KnownBatteryType::Other => "Other",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        let battery_type = match normalized.as_str() {
            "AA" => KnownBatteryType::AA,
            "AAA" => KnownBatteryType::AAA,
            "CR2032" => KnownBatteryType::CR2032,
            "CR2025" => KnownBatteryType::CR2025,
            "CR123A" | "CR123" => KnownBatteryType::CR123A,
            "9V" | "9VOLT" | "E-BLOCK" => KnownBatteryType::NineVolt,
            "OTHER" | "ANDERE" => KnownBatteryType::Other,
            _ => return None,
        };
        Some(battery_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BatteryType {
    Known(KnownBatteryType),
    Custom(String),
}

impl BatteryType {
    pub fn label(&self) -> &str {
        match self {
            BatteryType::Known(known) => known.label(),
            BatteryType::Custom(label) => label,
        }
    }
}

impl Default for BatteryType {
    fn default() -> Self {
        BatteryType::Known(KnownBatteryType::Other)
    }
}

impl From<KnownBatteryType> for BatteryType {
    fn from(known: KnownBatteryType) -> Self {
        BatteryType::Known(known)
    }
}

impl From<String> for BatteryType {
    fn from(label: String) -> Self {
        if label.trim().is_empty() {
            return BatteryType::default();
        }
        match KnownBatteryType::from_label(&label) {
            Some(known) => BatteryType::Known(known),
            None => BatteryType::Custom(label),
        }
    }
}

impl From<&str> for BatteryType {
    fn from(label: &str) -> Self {
        BatteryType::from(label.to_string())
    }
}

impl From<BatteryType> for String {
    fn from(battery_type: BatteryType) -> Self {
        match battery_type {
            BatteryType::Known(known) => known.label().to_string(),
            BatteryType::Custom(label) => label,
        }
    }
}

impl fmt::Display for BatteryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// === Items ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub device_name: String,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub battery_type: BatteryType,
    #[serde(default = "default_battery_count")]
    pub battery_count: u32,
    /// Authoritative charge percentage; when absent the level decays from `last_changed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_level: Option<f64>,
    /// Last time the batteries were known fresh or a sensor reported
    #[serde(
        default = "epoch",
        deserialize_with = "deserialize_timestamp"
    )]
    pub last_changed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ha_entity_id: Option<String>,
}

impl InventoryItem {
    /// Home Assistant entity this item is linked to, ignoring empty ids
    pub fn linked_entity(&self) -> Option<&str> {
        self.ha_entity_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_linked(&self) -> bool {
        self.linked_entity().is_some()
    }
}

pub fn new_item_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_battery_count() -> u32 {
    1
}

// === Drafts ===

/// Unsaved item fields, as entered by hand or filled in by a device scan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    pub device_name: String,
    pub location: Location,
    pub battery_type: BatteryType,
    pub battery_count: u32,
    pub level: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ha_entity_id: Option<String>,
}

impl Default for ItemDraft {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            location: KnownLocation::LivingRoom.into(),
            battery_type: KnownBatteryType::AA.into(),
            battery_count: 2,
            level: 100.0,
            notes: None,
            ha_entity_id: None,
        }
    }
}

impl ItemDraft {
    /// Reject drafts that would break the item invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.device_name.trim().is_empty() {
            return Err("Device name is required".to_string());
        }
        if self.battery_count < 1 {
            return Err("Battery count must be at least 1".to_string());
        }
        if !(0.0..=100.0).contains(&self.level) {
            return Err(format!("Level must be between 0 and 100, got {}", self.level));
        }
        Ok(())
    }

    /// Turn the draft into a new item; batteries are considered fresh as of `now`
    pub fn into_item(self, now: DateTime<Utc>) -> InventoryItem {
        InventoryItem {
            id: new_item_id(),
            device_name: self.device_name.trim().to_string(),
            location: self.location,
            battery_type: self.battery_type,
            battery_count: self.battery_count.max(1),
            estimated_level: Some(self.level),
            last_changed: now,
            notes: self.notes,
            ha_entity_id: self.ha_entity_id.filter(|id| !id.is_empty()),
        }
    }
}

// === Timestamps ===

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Parse RFC 3339, a naive date-time (taken as UTC) or a plain date
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Malformed timestamps fall back to the Unix epoch, i.e. "more than a year
/// old", so a bad value shows up as a battery to check rather than a full one.
pub fn timestamp_or_epoch(raw: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|| {
        tracing::warn!("Unparseable timestamp {:?}, treating it as the epoch", raw);
        epoch()
    })
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(timestamp_or_epoch).unwrap_or_else(epoch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_location_labels_round_trip_through_strings() {
        for known in KnownLocation::ALL {
            assert_eq!(Location::from(known.label()), Location::Known(known));
        }
        assert_eq!(Location::from("Küche"), Location::Known(KnownLocation::Kitchen));
        assert_eq!(Location::from("  "), Location::Known(KnownLocation::Other));
        assert_eq!(
            Location::from("Garage"),
            Location::Custom("Garage".to_string())
        );
    }

    #[test]
    fn test_battery_type_parsing() {
        for known in KnownBatteryType::ALL {
            assert_eq!(BatteryType::from(known.label()), BatteryType::Known(known));
        }
        assert_eq!(BatteryType::from("aaa"), BatteryType::Known(KnownBatteryType::AAA));
        assert_eq!(BatteryType::from("9 V"), BatteryType::Known(KnownBatteryType::NineVolt));
        assert_eq!(BatteryType::from("Andere"), BatteryType::Known(KnownBatteryType::Other));
        assert_eq!(BatteryType::from("LR44"), BatteryType::Custom("LR44".to_string()));
    }

    #[test]
    fn test_item_deserializes_camel_case_record() {
        let json = r#"{
            "id": "abc",
            "deviceName": "Heizkörperthermostat",
            "location": "Wohnzimmer",
            "batteryType": "AA",
            "batteryCount": 2,
            "estimatedLevel": 80,
            "lastChanged": "2024-03-01T10:00:00.000Z",
            "imageUrl": "data:image/jpeg;base64,AAAA",
            "haEntityId": "sensor.thermostat_battery"
        }"#;

        let item: InventoryItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.location, Location::Known(KnownLocation::LivingRoom));
        assert_eq!(item.battery_type, BatteryType::Known(KnownBatteryType::AA));
        assert_eq!(item.estimated_level, Some(80.0));
        assert_eq!(
            item.last_changed,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(item.linked_entity(), Some("sensor.thermostat_battery"));

        let out = serde_json::to_value(&item).unwrap();
        assert_eq!(out["location"], "Living Room");
        assert_eq!(out["haEntityId"], "sensor.thermostat_battery");
        assert!(out.get("notes").is_none());
    }

    #[test]
    fn test_malformed_or_missing_timestamp_falls_back_to_epoch() {
        let bad: InventoryItem =
            serde_json::from_str(r#"{"id":"a","deviceName":"x","lastChanged":"yesterday"}"#).unwrap();
        assert_eq!(bad.last_changed, DateTime::<Utc>::UNIX_EPOCH);

        let missing: InventoryItem =
            serde_json::from_str(r#"{"id":"b","deviceName":"y"}"#).unwrap();
        assert_eq!(missing.last_changed, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(missing.battery_count, 1);
        assert_eq!(missing.location, Location::default());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let midnight = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01"), Some(midnight));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00"), Some(midnight));
        assert_eq!(parse_timestamp("2024-01-01T01:00:00+01:00"), Some(midnight));
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn test_empty_entity_id_is_not_linked() {
        let mut item = ItemDraft {
            device_name: "Remote".to_string(),
            ..ItemDraft::default()
        }
        .into_item(Utc::now());
        assert!(!item.is_linked());

        item.ha_entity_id = Some(String::new());
        assert!(!item.is_linked());
    }

    #[test]
    fn test_draft_validation() {
        let draft = ItemDraft::default();
        assert!(draft.validate().is_err());

        let draft = ItemDraft {
            device_name: "Smoke detector".to_string(),
            battery_count: 0,
            ..ItemDraft::default()
        };
        assert!(draft.validate().is_err());

        let draft = ItemDraft {
            device_name: "Smoke detector".to_string(),
            level: 120.0,
            ..ItemDraft::default()
        };
        assert!(draft.validate().is_err());

        let draft = ItemDraft {
            device_name: "Smoke detector".to_string(),
            ..ItemDraft::default()
        };
        assert!(draft.validate().is_ok());
    }
}
