//! Sensors module - external services that report on devices
//!
//! Home Assistant supplies live battery levels; the vision model identifies
//! a device and its batteries from a photo.

#[cfg(feature = "home-assistant")]
pub mod home_assistant;

#[cfg(feature = "vision")]
pub mod vision;

/// Failure talking to an external service. Callers surface it as one message
/// and leave inventory state untouched.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{0} is not configured")]
    MissingSettings(&'static str),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("could not parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("could not read image: {0}")]
    Image(#[from] std::io::Error),

    #[error("request already in progress")]
    Busy,
}
