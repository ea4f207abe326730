//! Charge estimation
//!
//! Items with a stored level (set by hand or reported by a sensor) show that
//! level. Everything else decays linearly from `last_changed` over a nominal
//! one-year battery life.

use super::InventoryItem;
use chrono::{DateTime, Utc};
use std::fmt;

pub const NOMINAL_LIFESPAN_DAYS: f64 = 365.0;

/// Levels below this need replacing
pub const CRITICAL_BELOW: f64 = 20.0;
pub const LOW_BELOW: f64 = 50.0;

const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Critical,
    Low,
    Ok,
}

impl Tier {
    /// Classify an unrounded level; 19.6 is still critical even though it
    /// displays as 20
    pub fn from_level(level: f64) -> Self {
        if level < CRITICAL_BELOW {
            Tier::Critical
        } else if level < LOW_BELOW {
            Tier::Low
        } else {
            Tier::Ok
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Critical => "critical",
            Tier::Low => "low",
            Tier::Ok => "ok",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSource {
    /// Stored on the item
    Reported,
    /// Derived from the age of `last_changed`
    Decayed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub level: u8,
    pub tier: Tier,
    pub source: LevelSource,
}

pub fn estimate_level(item: &InventoryItem, now: DateTime<Utc>) -> Estimate {
    let (raw, source) = match item.estimated_level {
        Some(level) => (level, LevelSource::Reported),
        None => (decayed_level(item.last_changed, now), LevelSource::Decayed),
    };
    let raw = clamp_percent(raw);
    Estimate {
        level: raw.round() as u8,
        tier: Tier::from_level(raw),
        source,
    }
}

fn decayed_level(last_changed: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let elapsed_days = (now - last_changed).num_milliseconds() as f64 / MS_PER_DAY as f64;
    100.0 - elapsed_days / NOMINAL_LIFESPAN_DAYS * 100.0
}

/// Clamp to [0, 100]; NaN counts as empty
fn clamp_percent(raw: f64) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, 100.0)
}

// === Relative age ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeAge {
    Days(u64),
    Months(u64),
    OverAYear,
}

/// Bucket the distance between `last_changed` and `now` (in either
/// direction). Partial days round up.
pub fn relative_age(last_changed: DateTime<Utc>, now: DateTime<Utc>) -> RelativeAge {
    let ms = (now - last_changed).num_milliseconds().unsigned_abs();
    let days = ms.div_ceil(MS_PER_DAY);

    if days < 30 {
        RelativeAge::Days(days)
    } else if days < 365 {
        RelativeAge::Months(days / 30)
    } else {
        RelativeAge::OverAYear
    }
}

impl fmt::Display for RelativeAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelativeAge::Days(0) => write!(f, "today"),
            RelativeAge::Days(1) => write!(f, "1 day ago"),
            RelativeAge::Days(days) => write!(f, "{} days ago", days),
            RelativeAge::Months(1) => write!(f, "1 month ago"),
            RelativeAge::Months(months) => write!(f, "{} months ago", months),
            RelativeAge::OverAYear => write!(f, "more than a year ago"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{BatteryType, Location};
    use chrono::{Duration, TimeZone};

    fn item(level: Option<f64>, last_changed: DateTime<Utc>) -> InventoryItem {
        InventoryItem {
            id: "x".to_string(),
            device_name: "Door sensor".to_string(),
            location: Location::default(),
            battery_type: BatteryType::default(),
            battery_count: 1,
            estimated_level: level,
            last_changed,
            notes: None,
            ha_entity_id: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_stored_level_wins_regardless_of_age() {
        let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let estimate = estimate_level(&item(Some(15.0), old), now());
        assert_eq!(estimate.level, 15);
        assert_eq!(estimate.tier, Tier::Critical);
        assert_eq!(estimate.source, LevelSource::Reported);

        let fresh = estimate_level(&item(Some(72.4), now()), now());
        assert_eq!(fresh.level, 72);
        assert_eq!(fresh.tier, Tier::Ok);
    }

    #[test]
    fn test_stored_level_is_clamped() {
        assert_eq!(estimate_level(&item(Some(140.0), now()), now()).level, 100);
        assert_eq!(estimate_level(&item(Some(-3.0), now()), now()).level, 0);
        assert_eq!(estimate_level(&item(Some(f64::NAN), now()), now()).level, 0);
    }

    #[test]
    fn test_decay_endpoints() {
        let fresh = estimate_level(&item(None, now()), now());
        assert_eq!(fresh.level, 100);
        assert_eq!(fresh.source, LevelSource::Decayed);

        let year = estimate_level(&item(None, now() - Duration::days(365)), now());
        assert_eq!(year.level, 0);

        let stale = estimate_level(&item(None, now() - Duration::days(400)), now());
        assert_eq!(stale.level, 0);
        assert_eq!(stale.tier, Tier::Critical);
    }

    #[test]
    fn test_decay_is_monotonic_and_bounded() {
        let mut previous = u8::MAX;
        for days in (-30..=420).step_by(5) {
            let estimate = estimate_level(&item(None, now() - Duration::days(days)), now());
            assert!(estimate.level <= 100);
            assert!(estimate.level <= previous, "level rose at {} days", days);
            previous = estimate.level;
        }
    }

    #[test]
    fn test_future_timestamp_saturates_at_full() {
        let estimate = estimate_level(&item(None, now() + Duration::days(10)), now());
        assert_eq!(estimate.level, 100);
    }

    #[test]
    fn test_half_year_is_low_tier() {
        let estimate = estimate_level(&item(None, now() - Duration::days(219)), now());
        assert_eq!(estimate.level, 40);
        assert_eq!(estimate.tier, Tier::Low);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(Tier::from_level(0.0), Tier::Critical);
        assert_eq!(Tier::from_level(19.99), Tier::Critical);
        assert_eq!(Tier::from_level(20.0), Tier::Low);
        assert_eq!(Tier::from_level(49.5), Tier::Low);
        assert_eq!(Tier::from_level(50.0), Tier::Ok);
        assert_eq!(Tier::from_level(100.0), Tier::Ok);
    }

    #[test]
    fn test_tier_uses_unrounded_stored_level() {
        let estimate = estimate_level(&item(Some(19.6), now()), now());
        assert_eq!(estimate.level, 20);
        assert_eq!(estimate.tier, Tier::Critical);
    }

    #[test]
    fn test_tier_uses_unrounded_decayed_level() {
        // 293 days 11 hours leaves about 19.6%
        let changed = now() - Duration::days(293) - Duration::hours(11);
        let estimate = estimate_level(&item(None, changed), now());
        assert_eq!(estimate.level, 20);
        assert_eq!(estimate.tier, Tier::Critical);
    }

    #[test]
    fn test_relative_age_buckets() {
        assert_eq!(relative_age(now(), now()), RelativeAge::Days(0));
        assert_eq!(
            relative_age(now() - Duration::hours(3), now()),
            RelativeAge::Days(1)
        );
        assert_eq!(
            relative_age(now() - Duration::days(29), now()),
            RelativeAge::Days(29)
        );
        assert_eq!(
            relative_age(now() - Duration::days(30), now()),
            RelativeAge::Months(1)
        );
        assert_eq!(
            relative_age(now() - Duration::days(364), now()),
            RelativeAge::Months(12)
        );
        assert_eq!(
            relative_age(now() - Duration::days(365), now()),
            RelativeAge::OverAYear
        );
    }

    #[test]
    fn test_relative_age_display() {
        assert_eq!(RelativeAge::Days(5).to_string(), "5 days ago");
        assert_eq!(RelativeAge::Months(1).to_string(), "1 month ago");
        assert_eq!(RelativeAge::OverAYear.to_string(), "more than a year ago");
    }
}
