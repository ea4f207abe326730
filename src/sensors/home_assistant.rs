//! Home Assistant battery sensors via the REST API
//!
//! Credentials live in their own record (`ha_settings.json`) next to the
//! inventory and are passed explicitly to every call.

use super::CollaboratorError;
use crate::inventory::reconcile::{strip_battery_suffix, MergeSummary, Reading};
use crate::inventory::store::InventoryStore;
use crate::inventory::timestamp_or_epoch;
use crate::shared::{error_result, internal_error, text_result, InFlight};
use crate::storage::RecordStore;
use rmcp::{model::*, ErrorData as McpError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Mutex;

pub const SETTINGS_NAMESPACE: &str = "ha_settings";

// === Settings ===

/// Base URL and long-lived access token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaSettings {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
}

impl HaSettings {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into().trim().to_string(),
            token: token.into().trim().to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.url.is_empty() && !self.token.is_empty()
    }

    fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Stored settings, or empty ones if missing or unreadable
    pub fn load(records: &RecordStore) -> Self {
        match records.load(SETTINGS_NAMESPACE) {
            Ok(Some(settings)) => settings,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::error!("Failed to load Home Assistant settings: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, records: &RecordStore) -> anyhow::Result<()> {
        records.save(SETTINGS_NAMESPACE, self)
    }
}

// === API Types ===

/// One entry of `GET /api/states`
#[derive(Debug, Clone, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    /// Usually a string, occasionally a bare number
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl EntityState {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Percentage sensor reporting a battery level
    pub fn is_battery(&self) -> bool {
        if !self.entity_id.starts_with("sensor.") {
            return false;
        }
        let battery_class = self.attribute("device_class") == Some("battery");
        let battery_name =
            self.entity_id.ends_with("_battery_level") || self.entity_id.ends_with("_battery");
        let percent = self.attribute("unit_of_measurement") == Some("%");

        battery_class || (battery_name && percent)
    }

    /// Numeric state; unavailable/unknown/garbage counts as 0
    pub fn level(&self) -> f64 {
        let level = match &self.state {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        level.filter(|l| l.is_finite()).unwrap_or(0.0)
    }

    pub fn to_reading(&self) -> Reading {
        let name = self
            .attribute("friendly_name")
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.entity_id);

        Reading {
            entity_id: self.entity_id.clone(),
            level: self.level(),
            last_updated: timestamp_or_epoch(self.last_updated.as_deref().unwrap_or("")),
            name: strip_battery_suffix(name).to_string(),
        }
    }
}

/// Battery readings from a full state dump, in the order Home Assistant listed them
pub fn extract_readings(states: &[EntityState]) -> Vec<Reading> {
    states
        .iter()
        .filter(|entity| entity.is_battery())
        .map(EntityState::to_reading)
        .collect()
}

// === Helper Functions ===

fn require(settings: &HaSettings) -> Result<(), CollaboratorError> {
    if settings.is_complete() {
        Ok(())
    } else {
        Err(CollaboratorError::MissingSettings("Home Assistant URL and token"))
    }
}

async fn get(
    client: &reqwest::Client,
    settings: &HaSettings,
    path: &str,
) -> Result<reqwest::Response, CollaboratorError> {
    require(settings)?;
    let url = format!("{}{}", settings.base_url(), path);

    let response = client
        .get(&url)
        .bearer_auth(&settings.token)
        .header("Content-Type", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(CollaboratorError::Status(response.status()));
    }
    Ok(response)
}

/// Succeeds iff the authenticated status endpoint answers with 2xx
pub async fn check_connection(
    client: &reqwest::Client,
    settings: &HaSettings,
) -> Result<(), CollaboratorError> {
    get(client, settings, "/api/").await?;
    tracing::info!("Home Assistant reachable at {}", settings.base_url());
    Ok(())
}

pub async fn fetch_states(
    client: &reqwest::Client,
    settings: &HaSettings,
) -> Result<Vec<EntityState>, CollaboratorError> {
    let response = get(client, settings, "/api/states").await?;
    Ok(response.json::<Vec<EntityState>>().await?)
}

pub async fn fetch_battery_readings(
    client: &reqwest::Client,
    settings: &HaSettings,
) -> Result<Vec<Reading>, CollaboratorError> {
    let states = fetch_states(client, settings).await?;
    let readings = extract_readings(&states);
    tracing::info!(
        "Home Assistant reported {} entities, {} battery sensors",
        states.len(),
        readings.len()
    );
    Ok(readings)
}

/// Fetch readings and merge them into whatever the store holds once they
/// arrive. Nothing is applied if the fetch fails.
pub async fn sync(
    client: &reqwest::Client,
    settings: &HaSettings,
    store: &Mutex<InventoryStore>,
    in_flight: &InFlight,
) -> Result<MergeSummary, CollaboratorError> {
    let Some(_guard) = in_flight.try_start() else {
        return Err(CollaboratorError::Busy);
    };

    let readings = fetch_battery_readings(client, settings).await?;
    let summary = match store.lock() {
        Ok(mut store) => store.apply_readings(&readings),
        Err(poisoned) => poisoned.into_inner().apply_readings(&readings),
    };
    Ok(summary)
}

pub fn render_summary(summary: &MergeSummary) -> String {
    format!(
        "Sync complete.\n{} new device(s) added.\n{} device(s) updated.",
        summary.added, summary.updated
    )
}

// === Parameter Types ===

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConnectParams {
    #[schemars(description = "Home Assistant base URL, e.g. 'http://homeassistant.local:8123'")]
    pub url: String,
    #[schemars(description = "Long-lived access token")]
    pub token: String,
    #[schemars(description = "Save without testing the connection first (default: false)")]
    #[serde(default)]
    pub skip_check: bool,
}

// === Tool Functions ===

pub async fn sync_home_assistant(
    client: &reqwest::Client,
    records: &RecordStore,
    store: &Mutex<InventoryStore>,
    in_flight: &InFlight,
) -> Result<CallToolResult, McpError> {
    let settings = HaSettings::load(records);
    if !settings.is_complete() {
        return Ok(error_result(
            "Home Assistant is not configured. Use connect_home_assistant first.",
        ));
    }

    match sync(client, &settings, store, in_flight).await {
        Ok(summary) => Ok(text_result(render_summary(&summary))),
        Err(e) => {
            tracing::warn!("Home Assistant sync failed: {}", e);
            Ok(error_result(format!(
                "Sync failed, check the Home Assistant settings: {}",
                e
            )))
        }
    }
}

pub async fn test_connection(
    client: &reqwest::Client,
    records: &RecordStore,
) -> Result<CallToolResult, McpError> {
    let settings = HaSettings::load(records);
    match check_connection(client, &settings).await {
        Ok(()) => Ok(text_result(format!(
            "Connected to Home Assistant at {}",
            settings.base_url()
        ))),
        Err(e) => Ok(error_result(format!("Connection failed: {}", e))),
    }
}

pub async fn connect_home_assistant(
    client: &reqwest::Client,
    records: &RecordStore,
    params: ConnectParams,
) -> Result<CallToolResult, McpError> {
    let settings = HaSettings::new(params.url, params.token);
    if !settings.is_complete() {
        return Ok(error_result("Both URL and token are required"));
    }

    if !params.skip_check {
        if let Err(e) = check_connection(client, &settings).await {
            return Ok(error_result(format!(
                "Connection failed, settings not saved: {}",
                e
            )));
        }
    }

    settings
        .save(records)
        .map_err(|e| internal_error(format!("Failed to save settings: {:#}", e)))?;
    Ok(text_result(format!(
        "Saved Home Assistant settings for {}",
        settings.base_url()
    )))
}
