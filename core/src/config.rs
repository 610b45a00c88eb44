//! Transport configuration
//!
//! Tunables for framing, reassembly limits, write retries and burst pacing.
//! Serializable to/from JSON so the plugin glue can ship it alongside the app.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Minimum usable BLE MTU assumed until the platform negotiates a larger one
pub const DEFAULT_MTU: u16 = 20;

/// Upper bound on a single reassembled message (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Notifications sent back-to-back before pausing
pub const DEFAULT_BURST_SIZE: usize = 10;

pub const DEFAULT_BURST_PAUSE_MS: u64 = 100;

pub const DEFAULT_WRITE_RETRY_ATTEMPTS: u32 = 5;

pub const DEFAULT_WRITE_RETRY_BACKOFF_MS: u64 = 10;

pub const DEFAULT_MAX_RETRY_BACKOFF_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Complete transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Carry a stream id byte after the flag byte (2-byte header)
    pub multiplexed: bool,

    /// MTU assumed for a peer before `onMtuChanged` (at least [`DEFAULT_MTU`])
    pub default_mtu: u16,

    /// Largest message a peer may accumulate before the buffer is discarded
    pub max_message_size: usize,

    /// Frames per burst; 0 disables pacing
    pub burst_size: usize,

    /// Pause between bursts in milliseconds; 0 disables pacing
    pub burst_pause_ms: u64,

    /// Attempts per frame before a send fails (at least 1)
    pub write_retry_attempts: u32,

    /// First retry delay, doubled on each further attempt
    pub write_retry_backoff_ms: u64,

    /// Cap on a single retry delay
    pub max_retry_backoff_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            multiplexed: false,
            default_mtu: DEFAULT_MTU,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            burst_size: DEFAULT_BURST_SIZE,
            burst_pause_ms: DEFAULT_BURST_PAUSE_MS,
            write_retry_attempts: DEFAULT_WRITE_RETRY_ATTEMPTS,
            write_retry_backoff_ms: DEFAULT_WRITE_RETRY_BACKOFF_MS,
            max_retry_backoff_ms: DEFAULT_MAX_RETRY_BACKOFF_MS,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with pacing and retry delays disabled, for tests
    pub fn for_testing() -> Self {
        Self {
            burst_size: 0,
            burst_pause_ms: 0,
            write_retry_backoff_ms: 0,
            max_retry_backoff_ms: 0,
            ..Self::default()
        }
    }

    pub fn with_multiplexing(mut self, enabled: bool) -> Self {
        self.multiplexed = enabled;
        self
    }

    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    pub fn with_burst(mut self, size: usize, pause_ms: u64) -> Self {
        self.burst_size = size;
        self.burst_pause_ms = pause_ms;
        self
    }

    pub fn with_write_retries(mut self, attempts: u32, backoff_ms: u64) -> Self {
        self.write_retry_attempts = attempts;
        self.write_retry_backoff_ms = backoff_ms;
        self
    }

    /// Validate the configuration
    ///
    /// Negotiated MTUs are clamped to [`DEFAULT_MTU`], never to
    /// `default_mtu`, so a larger `default_mtu` only changes what is assumed
    /// before negotiation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_mtu < DEFAULT_MTU {
            return Err(ConfigError::Invalid(format!(
                "default_mtu {} is below the BLE minimum of {}",
                self.default_mtu, DEFAULT_MTU
            )));
        }

        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "max_message_size must be >= 1".to_string(),
            ));
        }

        if self.write_retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "write_retry_attempts must be >= 1".to_string(),
            ));
        }

        if self.write_retry_backoff_ms > self.max_retry_backoff_ms {
            return Err(ConfigError::Invalid(
                "write_retry_backoff_ms cannot exceed max_retry_backoff_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Flag byte plus the optional stream id byte
    pub fn header_size(&self) -> usize {
        crate::transport::ble::frame::header_size(self.multiplexed)
    }

    /// Smallest per-frame capacity any peer can end up with
    pub fn min_frame_payload(&self) -> usize {
        (DEFAULT_MTU as usize).saturating_sub(self.header_size()).max(1)
    }

    /// Whether outbound frames are paced in bursts
    pub fn pacing_enabled(&self) -> bool {
        self.burst_size > 0 && self.burst_pause_ms > 0
    }

    pub fn burst_pause(&self) -> Duration {
        Duration::from_millis(self.burst_pause_ms)
    }

    /// Delay before retry number `retry` (1-based), exponential and capped
    pub fn retry_backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        let ms = self
            .write_retry_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_retry_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
