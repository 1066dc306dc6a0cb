//! Configuration for the timeline engine.
//!
//! All knobs have compiled defaults; a host application can override any
//! subset from a TOML fragment (missing keys fall back to the defaults).

use serde::Deserialize;

use threadline_proto::contact::NormalizationRules;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to parse the TOML configuration.
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// Resolved engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Number of messages requested per history page.
    pub page_size: usize,
    /// Tolerance, in milliseconds, when matching a push-channel echo to a
    /// provisional send by timestamp.
    pub echo_window_ms: u64,
    /// Buffer size for the timeline notification channel.
    pub event_buffer: usize,
    /// Contact normalization rules shared by topic naming and event
    /// routing.
    pub normalization: NormalizationRules,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            page_size: 30,
            echo_window_ms: 5_000,
            event_buffer: 64,
            normalization: NormalizationRules::default(),
        }
    }
}

impl TimelineConfig {
    /// Parses configuration from a TOML fragment, filling missing keys
    /// with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseToml`] if the fragment is not valid
    /// TOML or a key has the wrong type.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }
}
