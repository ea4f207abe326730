//! Dashboard numbers and list filtering

use super::estimate::{estimate_level, Tier};
use super::InventoryItem;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub total_devices: usize,
    pub total_batteries: u64,
    /// Items whose estimated level is in the critical tier
    pub low_battery_count: usize,
    /// Battery type label and number of cells, in first-seen order
    pub type_distribution: Vec<(String, u64)>,
}

impl Stats {
    pub fn compute(items: &[InventoryItem], now: DateTime<Utc>) -> Self {
        let mut stats = Stats {
            total_devices: items.len(),
            ..Stats::default()
        };

        for item in items {
            let count = u64::from(item.battery_count);
            stats.total_batteries += count;

            if estimate_level(item, now).tier == Tier::Critical {
                stats.low_battery_count += 1;
            }

            let label = item.battery_type.label();
            match stats
                .type_distribution
                .iter_mut()
                .find(|(existing, _)| existing == label)
            {
                Some((_, total)) => *total += count,
                None => stats.type_distribution.push((label.to_string(), count)),
            }
        }

        stats
    }
}

/// Case-insensitive match on device name or location; a blank term keeps everything
pub fn search<'a>(items: &'a [InventoryItem], term: &str) -> Vec<&'a InventoryItem> {
    let term = term.trim().to_lowercase();
    items
        .iter()
        .filter(|item| {
            term.is_empty()
                || item.device_name.to_lowercase().contains(&term)
                || item.location.label().to_lowercase().contains(&term)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{BatteryType, KnownBatteryType, KnownLocation, Location};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn item(
        name: &str,
        location: Location,
        battery_type: BatteryType,
        count: u32,
        level: Option<f64>,
        age_days: i64,
    ) -> InventoryItem {
        InventoryItem {
            id: name.to_string(),
            device_name: name.to_string(),
            location,
            battery_type,
            battery_count: count,
            estimated_level: level,
            last_changed: now() - Duration::days(age_days),
            notes: None,
            ha_entity_id: None,
        }
    }

    fn sample() -> Vec<InventoryItem> {
        vec![
            item(
                "TV Remote",
                KnownLocation::LivingRoom.into(),
                KnownBatteryType::AAA.into(),
                2,
                Some(80.0),
                10,
            ),
            item(
                "Smoke Detector",
                KnownLocation::Hallway.into(),
                KnownBatteryType::NineVolt.into(),
                1,
                Some(12.0),
                10,
            ),
            item(
                "Wall Clock",
                KnownLocation::Kitchen.into(),
                KnownBatteryType::AAA.into(),
                1,
                None,
                400,
            ),
            item(
                "Garage Sensor",
                Location::Custom("Garage".to_string()),
                BatteryType::Custom("LR44".to_string()),
                3,
                None,
                30,
            ),
        ]
    }

    #[test]
    fn test_stats_totals() {
        let stats = Stats::compute(&sample(), now());
        assert_eq!(stats.total_devices, 4);
        assert_eq!(stats.total_batteries, 7);
        // Smoke detector (12%) and the year-old clock (decayed to 0)
        assert_eq!(stats.low_battery_count, 2);
        assert_eq!(
            stats.type_distribution,
            vec![
                ("AAA".to_string(), 3),
                ("9V".to_string(), 1),
                ("LR44".to_string(), 3),
            ]
        );
    }

    #[test]
    fn test_low_count_includes_levels_displayed_as_twenty() {
        let stored = item(
            "Doorbell",
            KnownLocation::Hallway.into(),
            KnownBatteryType::CR2032.into(),
            1,
            Some(19.6),
            0,
        );
        let mut decayed = item(
            "Thermostat",
            KnownLocation::Bedroom.into(),
            KnownBatteryType::AA.into(),
            2,
            None,
            293,
        );
        decayed.last_changed -= Duration::hours(11);
        let fine = item(
            "Scale",
            KnownLocation::Bathroom.into(),
            KnownBatteryType::AAA.into(),
            2,
            Some(20.0),
            0,
        );

        let stats = Stats::compute(&[stored, decayed, fine], now());
        assert_eq!(stats.low_battery_count, 2);
    }

    #[test]
    fn test_stats_empty() {
        let stats = Stats::compute(&[], now());
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn test_search_by_name_or_location() {
        let items = sample();

        let by_name: Vec<&str> = search(&items, "remote")
            .iter()
            .map(|i| i.device_name.as_str())
            .collect();
        assert_eq!(by_name, vec!["TV Remote"]);

        let by_location: Vec<&str> = search(&items, "GARAGE")
            .iter()
            .map(|i| i.device_name.as_str())
            .collect();
        assert_eq!(by_location, vec!["Garage Sensor"]);

        assert_eq!(search(&items, "kitchen").len(), 1);
        assert_eq!(search(&items, "  ").len(), items.len());
        assert!(search(&items, "attic").is_empty());
    }
}
