//! YAML export of the inventory
//!
//! Output is written by hand rather than through a YAML serializer so the
//! layout stays exactly what Home Assistant users paste into their configs.
//! String values are JSON-escaped, which is a valid YAML double-quoted scalar.

use super::estimate::estimate_level;
use super::InventoryItem;
use chrono::{DateTime, Utc};
use std::fmt::Write;

pub const EXPORT_HEADER: &str = "# Home Assistant Inventory Export";

pub fn to_yaml(items: &[InventoryItem], now: DateTime<Utc>) -> String {
    let mut yaml = format!("{}\n\n", EXPORT_HEADER);

    for item in items {
        let level = estimate_level(item, now).level;
        let _ = writeln!(yaml, "- device: {}", quote(&item.device_name));
        let _ = writeln!(yaml, "  location: {}", quote(item.location.label()));
        let _ = writeln!(yaml, "  battery_type: {}", quote(item.battery_type.label()));
        let _ = writeln!(yaml, "  count: {}", item.battery_count);
        let _ = writeln!(yaml, "  level: {}", level);
        if let Some(entity_id) = item.linked_entity() {
            let _ = writeln!(yaml, "  ha_entity: {}", quote(entity_id));
        }
        yaml.push('\n');
    }

    yaml
}

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{KnownBatteryType, KnownLocation, Location};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_export_blocks() {
        let items = vec![
            InventoryItem {
                id: "1".to_string(),
                device_name: "Thermostat \"Bad\"".to_string(),
                location: KnownLocation::Bathroom.into(),
                battery_type: KnownBatteryType::AA.into(),
                battery_count: 2,
                estimated_level: Some(64.6),
                last_changed: now(),
                notes: None,
                ha_entity_id: Some("sensor.bad_thermostat_battery".to_string()),
            },
            InventoryItem {
                id: "2".to_string(),
                device_name: "Doorbell".to_string(),
                location: Location::Custom("Porch".to_string()),
                battery_type: KnownBatteryType::CR2032.into(),
                battery_count: 1,
                estimated_level: None,
                last_changed: now() - Duration::days(73),
                notes: None,
                ha_entity_id: None,
            },
        ];

        let expected = "# Home Assistant Inventory Export\n\
\n\
- device: \"Thermostat \\\"Bad\\\"\"\n  \
location: \"Bathroom\"\n  \
battery_type: \"AA\"\n  \
count: 2\n  \
level: 65\n  \
ha_entity: \"sensor.bad_thermostat_battery\"\n\
\n\
- device: \"Doorbell\"\n  \
location: \"Porch\"\n  \
battery_type: \"CR2032\"\n  \
count: 1\n  \
level: 80\n\
\n";

        assert_eq!(to_yaml(&items, now()), expected);
    }

    #[test]
    fn test_export_empty_inventory_is_just_the_header() {
        assert_eq!(to_yaml(&[], now()), format!("{}\n\n", EXPORT_HEADER));
    }
}
