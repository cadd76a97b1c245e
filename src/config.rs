//! # Configuration Management
//!
//! Centralized configuration for the session layer.
//!
//! This module provides the wire-limit constants shared by the codec stages and a
//! structured [`SessionConfig`] for connection construction.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//!
//! ## Security Considerations
//! - Frame and decompression ceilings bound allocations before they happen
//! - Compression stays off by default until the session negotiates it

use crate::codec::CompressionKind;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest frame payload accepted on the wire: 2^21 - 1, the widest length that
/// fits a 3-byte varint prefix.
pub const MAX_FRAME_SIZE: usize = 2_097_151;

/// Ceiling for a single decompressed packet (decompression-bomb guard).
pub const MAX_DECOMPRESSED_SIZE: usize = 8 * 1024 * 1024;

/// Default character bound for wire strings.
pub const DEFAULT_MAX_STRING: usize = 32_767;

/// Ticks between smoothed-rate recomputations (~1s at 20 ticks/s).
pub const RATE_SAMPLE_TICKS: u64 = 20;

/// Session configuration covering transport limits and abuse ceilings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SessionConfig {
    /// Transport and stage configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Abuse limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Validate the configuration for common misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means the configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.transport.validate());
        errors.extend(self.limits.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Transport and stage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Maximum accepted frame payload size in bytes
    pub max_frame_size: usize,

    /// Minimum payload size (bytes) before compression is applied.
    /// Negative disables the compression stage entirely.
    pub compression_threshold: i32,

    /// Algorithm used when the compression stage is installed
    #[serde(default)]
    pub compression_algorithm: CompressionKind,

    /// Whether decompressed sizes are checked against the declared length
    pub validate_decompression: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            compression_threshold: -1,
            compression_algorithm: CompressionKind::default(),
            validate_decompression: true,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size == 0 {
            errors.push("Max frame size cannot be 0".to_string());
        } else if self.max_frame_size > MAX_FRAME_SIZE {
            errors.push(format!(
                "Max frame size too large: {} bytes (wire maximum: {MAX_FRAME_SIZE})",
                self.max_frame_size
            ));
        }

        if self.compression_threshold > self.max_frame_size as i32 {
            errors.push("Compression threshold cannot exceed max frame size".to_string());
        }

        errors
    }
}

/// Abuse limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Smoothed inbound packets-per-interval ceiling; `None` disables rate kicking
    pub rate_limit: Option<f32>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { rate_limit: None }
    }
}

impl LimitsConfig {
    /// Validate limit configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(limit) = self.rate_limit {
            if limit <= 0.0 {
                errors.push(format!("Rate limit must be positive, got {limit}"));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SessionConfig::default().validate().is_empty());
    }

    #[test]
    fn toml_roundtrip() {
        let config = SessionConfig::from_toml(
            r#"
            [transport]
            max_frame_size = 65536
            compression_threshold = 128
            compression_algorithm = "zstd"
            validate_decompression = false

            [limits]
            rate_limit = 500.0
            "#,
        )
        .expect("parse");
        assert_eq!(config.transport.max_frame_size, 65536);
        assert_eq!(config.transport.compression_threshold, 128);
        assert_eq!(config.transport.compression_algorithm, CompressionKind::Zstd);
        assert!(!config.transport.validate_decompression);
        assert_eq!(config.limits.rate_limit, Some(500.0));
    }

    #[test]
    fn zero_frame_size_rejected() {
        let mut config = SessionConfig::default();
        config.transport.max_frame_size = 0;
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn negative_rate_limit_rejected() {
        let mut config = SessionConfig::default();
        config.limits.rate_limit = Some(-1.0);
        assert!(!config.validate().is_empty());
    }
}
