//! Device recognition from a photo via a local Ollama vision model

use super::CollaboratorError;
use crate::config::VisionConfig;
use crate::inventory::ItemDraft;
use crate::shared::{error_result, text_result, InFlight};
use base64::Engine;
use rmcp::{model::*, ErrorData as McpError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

const SCAN_PROMPT: &str = "Analyze this photo for a household battery inventory. \
Decide whether it shows a battery or a device that runs on batteries \
(e.g. thermostat, sensor, remote control). Extract:\n\
1. A suitable device name (e.g. \"Radiator thermostat\" or \"Duracell AA\").\n\
2. The likely battery type (AA, AAA, CR2032, CR2025, CR123A, 9V, ...).\n\
3. The number of batteries (estimate).\n\
Reply with a JSON object with the keys deviceName (string), batteryType (string), \
batteryCount (number) and confidence (\"High\", \"Medium\" or \"Low\").";

// === API Types ===

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    format: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// What the model recognized. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub battery_type: Option<String>,
    #[serde(default)]
    pub battery_count: Option<f64>,
    /// Informational only
    #[serde(default)]
    pub confidence: Option<String>,
}

impl ScanResult {
    /// Parse the model's JSON answer; blank output is an empty result
    pub fn from_model_output(text: &str) -> Result<Self, CollaboratorError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(text)?)
    }

    /// Fill recognized fields into `draft`; anything missing keeps its value.
    /// A scanned device is assumed to get fresh batteries.
    pub fn apply_to(&self, draft: &mut ItemDraft) {
        if let Some(name) = self.device_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            draft.device_name = name.to_string();
        }
        if let Some(battery_type) = self.battery_type.as_deref().filter(|t| !t.trim().is_empty()) {
            draft.battery_type = battery_type.trim().into();
        }
        if let Some(count) = self
            .battery_count
            .filter(|c| c.is_finite() && *c >= 1.0)
            .map(|c| c.round() as u32)
        {
            draft.battery_count = count;
        }
        draft.level = 100.0;
    }
}

// === Helper Functions ===

pub async fn analyze_image(
    client: &reqwest::Client,
    config: &VisionConfig,
    image: &[u8],
) -> Result<ScanResult, CollaboratorError> {
    if config.host.trim().is_empty() || config.model.trim().is_empty() {
        return Err(CollaboratorError::MissingSettings("Vision model"));
    }

    let url = format!("{}/api/generate", config.host.trim_end_matches('/'));
    let request = GenerateRequest {
        model: &config.model,
        prompt: SCAN_PROMPT,
        images: vec![base64::engine::general_purpose::STANDARD.encode(image)],
        format: "json",
        stream: false,
    };

    let response = client.post(&url).json(&request).send().await?;
    if !response.status().is_success() {
        return Err(CollaboratorError::Status(response.status()));
    }

    let generated: GenerateResponse = response.json().await?;
    let result = ScanResult::from_model_output(&generated.response)?;
    tracing::info!(
        "Scan recognized {:?} ({:?} confidence)",
        result.device_name,
        result.confidence
    );
    Ok(result)
}

pub async fn analyze_file(
    client: &reqwest::Client,
    config: &VisionConfig,
    path: &Path,
) -> Result<ScanResult, CollaboratorError> {
    let image = tokio::fs::read(path).await?;
    analyze_image(client, config, &image).await
}

// === Parameter Types ===

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScanParams {
    #[schemars(description = "Path to a photo (JPEG or PNG) of the device or battery")]
    pub image_path: String,
    #[schemars(description = "Device name entered so far; kept if the scan finds none")]
    #[serde(default)]
    pub device_name: Option<String>,
    #[schemars(description = "Room label entered so far")]
    #[serde(default)]
    pub location: Option<String>,
    #[schemars(description = "Battery type entered so far; kept if the scan finds none")]
    #[serde(default)]
    pub battery_type: Option<String>,
    #[schemars(description = "Battery count entered so far; kept if the scan finds none")]
    #[serde(default)]
    pub battery_count: Option<u32>,
}

impl ScanParams {
    fn draft(&self) -> ItemDraft {
        let mut draft = ItemDraft::default();
        if let Some(name) = &self.device_name {
            draft.device_name = name.clone();
        }
        if let Some(location) = &self.location {
            draft.location = location.as_str().into();
        }
        if let Some(battery_type) = &self.battery_type {
            draft.battery_type = battery_type.as_str().into();
        }
        if let Some(count) = self.battery_count {
            draft.battery_count = count;
        }
        draft
    }
}

// === Tool Functions ===

pub async fn scan_device(
    client: &reqwest::Client,
    config: &VisionConfig,
    in_flight: &InFlight,
    params: ScanParams,
) -> Result<CallToolResult, McpError> {
    let Some(_guard) = in_flight.try_start() else {
        return Ok(error_result("A scan is already in progress"));
    };

    let mut draft = params.draft();
    match analyze_file(client, config, Path::new(&params.image_path)).await {
        Ok(result) => {
            result.apply_to(&mut draft);
            let json = serde_json::to_string_pretty(&draft)
                .map_err(|e| crate::shared::internal_error(e.to_string()))?;
            Ok(text_result(format!(
                "Scan result (confidence: {}). Review and pass to add_item:\n{}",
                result.confidence.as_deref().unwrap_or("unknown"),
                json
            )))
        }
        Err(e) => {
            tracing::warn!("Device scan failed: {}", e);
            Ok(error_result(format!("Image analysis failed: {}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{BatteryType, KnownBatteryType};

    #[test]
    fn test_scan_fills_present_fields_only() {
        let mut draft = ItemDraft {
            device_name: "Typed name".to_string(),
            battery_count: 3,
            level: 40.0,
            ..ItemDraft::default()
        };

        let result = ScanResult::from_model_output(
            r#"{"batteryType": "CR2032", "confidence": "High"}"#,
        )
        .unwrap();
        result.apply_to(&mut draft);

        assert_eq!(draft.device_name, "Typed name");
        assert_eq!(draft.battery_type, BatteryType::Known(KnownBatteryType::CR2032));
        assert_eq!(draft.battery_count, 3);
        assert_eq!(draft.level, 100.0);
    }

    #[test]
    fn test_scan_overrides_with_recognized_values() {
        let mut draft = ItemDraft::default();
        let result = ScanResult::from_model_output(
            r#"{"deviceName": "Heizkörperthermostat", "batteryType": "AA", "batteryCount": 2.0}"#,
        )
        .unwrap();
        result.apply_to(&mut draft);

        assert_eq!(draft.device_name, "Heizkörperthermostat");
        assert_eq!(draft.battery_count, 2);
    }

    #[test]
    fn test_empty_or_useless_output() {
        let result = ScanResult::from_model_output("  ").unwrap();
        assert_eq!(result, ScanResult::default());

        let mut draft = ItemDraft::default();
        let before = draft.clone();
        ScanResult {
            device_name: Some("  ".to_string()),
            battery_count: Some(0.0),
            ..ScanResult::default()
        }
        .apply_to(&mut draft);
        assert_eq!(draft, before);
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let result = ScanResult::from_model_output("I think this is a remote");
        assert!(matches!(result, Err(CollaboratorError::Parse(_))));
    }

    #[tokio::test]
    async fn test_missing_image_is_reported() {
        let client = reqwest::Client::new();
        let result = analyze_file(
            &client,
            &VisionConfig::default(),
            Path::new("/nonexistent/photo.jpg"),
        )
        .await;
        assert!(matches!(result, Err(CollaboratorError::Image(_))));
    }

    #[tokio::test]
    async fn test_unconfigured_model() {
        let client = reqwest::Client::new();
        let config = VisionConfig {
            model: String::new(),
            ..VisionConfig::default()
        };
        let result = analyze_image(&client, &config, b"jpeg").await;
        assert!(matches!(result, Err(CollaboratorError::MissingSettings(_))));
    }
}
