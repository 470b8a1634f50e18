//! Error types for the bolus_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for bolus_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Missing or invalid sensitivity, carb ratio or circadian curve.
    /// Fatal: the cycle stops before any dose is computed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No dosing profile was active inside the lookback window
    #[error("No active profile: {0}")]
    NoProfile(String),

    /// The submission sink rejected the dose or could not be reached
    #[error("Submission error: {0}")]
    Submission(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors that must halt a decision cycle before any network interaction
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Submission(_))
    }
}
