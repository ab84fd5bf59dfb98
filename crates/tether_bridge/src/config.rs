//! # Bridge Configuration
//!
//! One TOML table; every field has a default, so an empty file is valid.
//!
//! ```toml
//! address = "127.0.0.1:5555"
//! message_flush_interval_ms = 45
//! geometry_flush_interval_ms = 90
//! log_tiers = ["info", "session", "diagnostics"]
//! measure = ["bundle"]
//! session_name = "demo"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tether_shared::constants::{
    BEACON_INTERVAL_MS, DEFAULT_BRIDGE_ADDR, GEOMETRY_FLUSH_INTERVAL_MS,
    MESSAGE_FLUSH_INTERVAL_MS, RENDER_SEND_INTERVAL_MS, STATS_INTERVAL_MS,
};

use crate::error::ConfigError;
use crate::logging::{LogOptions, MeasureOptions};
use crate::transport::{TransportConfig, DEFAULT_MAX_FRAME_BYTES};

/// Runtime configuration shared by both endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address the render side listens on and the model side connects to.
    pub address: String,
    /// Minimum time between command flushes (model side).
    pub message_flush_interval_ms: u64,
    /// Minimum time between geometry flushes (model side).
    pub geometry_flush_interval_ms: u64,
    /// Minimum time between outbound bundles (render side).
    pub render_send_interval_ms: u64,
    /// Minimum time between clock beacons.
    pub beacon_interval_ms: u64,
    /// Statistics reporting interval.
    pub stats_interval_ms: u64,
    /// Capacity of the reader → tick channel.
    pub inbound_queue_capacity: usize,
    /// Largest accepted frame payload.
    pub max_frame_bytes: usize,
    /// Bound on pending deferred commands; zero for unbounded.
    pub max_pending_messages: usize,
    /// Log tiers shown at startup.
    pub log_tiers: Vec<String>,
    /// Measurement categories reported at startup.
    pub measure: Vec<String>,
    /// Credential sent in `readyForSession`.
    pub api_key: String,
    /// Application id sent in `readyForSession`.
    pub app_id: String,
    /// Session name sent in `readyForSession`.
    pub session_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_BRIDGE_ADDR.to_owned(),
            message_flush_interval_ms: MESSAGE_FLUSH_INTERVAL_MS,
            geometry_flush_interval_ms: GEOMETRY_FLUSH_INTERVAL_MS,
            render_send_interval_ms: RENDER_SEND_INTERVAL_MS,
            beacon_interval_ms: BEACON_INTERVAL_MS,
            stats_interval_ms: STATS_INTERVAL_MS,
            inbound_queue_capacity: 4096,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_pending_messages: 0,
            log_tiers: vec!["info".to_owned(), "session".to_owned()],
            measure: Vec::new(),
            api_key: String::new(),
            app_id: "tether.demo".to_owned(),
            session_name: "1".to_owned(),
        }
    }
}

impl BridgeConfig {
    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Rejects values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "address",
                reason: "must not be empty".to_owned(),
            });
        }
        let intervals = [
            ("message_flush_interval_ms", self.message_flush_interval_ms),
            ("geometry_flush_interval_ms", self.geometry_flush_interval_ms),
            ("render_send_interval_ms", self.render_send_interval_ms),
            ("beacon_interval_ms", self.beacon_interval_ms),
            ("stats_interval_ms", self.stats_interval_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "interval must be at least 1ms".to_owned(),
                });
            }
        }
        if self.inbound_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "inbound_queue_capacity",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_frame_bytes",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// Command flush interval.
    #[must_use]
    pub const fn message_flush_interval(&self) -> Duration {
        Duration::from_millis(self.message_flush_interval_ms)
    }

    /// Geometry flush interval.
    #[must_use]
    pub const fn geometry_flush_interval(&self) -> Duration {
        Duration::from_millis(self.geometry_flush_interval_ms)
    }

    /// Render-side send interval.
    #[must_use]
    pub const fn render_send_interval(&self) -> Duration {
        Duration::from_millis(self.render_send_interval_ms)
    }

    /// Beacon interval.
    #[must_use]
    pub const fn beacon_interval(&self) -> Duration {
        Duration::from_millis(self.beacon_interval_ms)
    }

    /// Statistics interval.
    #[must_use]
    pub const fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    /// Initial log options.
    #[must_use]
    pub fn log_options(&self) -> LogOptions {
        LogOptions::from_names(&self.log_tiers)
    }

    /// Initial measurement options.
    #[must_use]
    pub fn measure_options(&self) -> MeasureOptions {
        MeasureOptions::from_names(&self.measure)
    }

    /// Transport settings.
    #[must_use]
    pub const fn transport(&self) -> TransportConfig {
        TransportConfig {
            inbound_queue_capacity: self.inbound_queue_capacity,
            max_frame_bytes: self.max_frame_bytes,
            nodelay: true,
        }
    }
}
