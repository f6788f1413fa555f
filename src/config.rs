//! Detector configuration

use crate::nat::filtering::FilteringTimeouts;
use crate::nat::server_list::DEFAULT_SERVER_LIST_URL;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a NAT detection run
///
/// Stored as JSON. Missing fields take their default values, so a partial file
/// only needs to list what it overrides.
///
/// # Example
/// ```rust,no_run
/// use natprobe::config::DetectorConfig;
///
/// let mut config = DetectorConfig::load("natprobe.json").expect("Failed to load");
/// config.overall_timeout_ms = 20_000;
/// config.save("natprobe.json").expect("Failed to save");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DetectorConfig {
    /// First mapping server (`host:port`); its answer decides Blocked
    pub primary_server: String,
    /// Second mapping server (`host:port`)
    pub secondary_server: String,
    /// URL of the newline-delimited filtering candidate list
    pub server_list_url: String,
    /// Fixed filtering candidates; when non-empty the remote list is not fetched
    pub filtering_servers: Vec<String>,
    /// Read deadline for each mapping query
    pub mapping_timeout_ms: u64,
    /// Read deadline for the plain filtering discovery request
    pub filtering_timeout_ms: u64,
    /// Read deadline for the CHANGE-REQUEST reply
    pub change_request_timeout_ms: u64,
    /// Timeout for the server list download
    pub server_list_timeout_ms: u64,
    /// Soft deadline for the whole detection, at least `mapping_timeout_ms`
    pub overall_timeout_ms: u64,
}

impl DetectorConfig {
    /// Load configuration from a JSON file
    ///
    /// Returns the defaults if the file doesn't exist or is empty.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file, creating parent directories
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        Ok(())
    }

    /// Check the configuration for values that would make detection meaningless
    pub fn validate(&self) -> Result<()> {
        if self.primary_server.trim().is_empty() || self.secondary_server.trim().is_empty() {
            return Err(Error::Config("Mapping servers must not be empty".to_string()));
        }

        if self.primary_server == self.secondary_server {
            return Err(Error::Config(
                "Mapping servers must be two different servers".to_string(),
            ));
        }

        let timeouts = [
            ("mapping_timeout_ms", self.mapping_timeout_ms),
            ("filtering_timeout_ms", self.filtering_timeout_ms),
            ("change_request_timeout_ms", self.change_request_timeout_ms),
            ("server_list_timeout_ms", self.server_list_timeout_ms),
            ("overall_timeout_ms", self.overall_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(Error::Config(format!("{} must be greater than zero", name)));
        }

        if self.overall_timeout_ms < self.mapping_timeout_ms {
            return Err(Error::Config(
                "overall_timeout_ms must not be shorter than mapping_timeout_ms".to_string(),
            ));
        }

        if self.change_request_timeout_ms >= self.filtering_timeout_ms {
            return Err(Error::Config(
                "change_request_timeout_ms must be shorter than filtering_timeout_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Read deadline for each mapping query
    pub fn mapping_timeout(&self) -> Duration {
        Duration::from_millis(self.mapping_timeout_ms)
    }

    /// Read deadlines used by the filtering probe
    pub fn filtering_timeouts(&self) -> FilteringTimeouts {
        FilteringTimeouts {
            probe: Duration::from_millis(self.filtering_timeout_ms),
            change_request: Duration::from_millis(self.change_request_timeout_ms),
        }
    }

    /// Timeout for the server list download
    pub fn server_list_timeout(&self) -> Duration {
        Duration::from_millis(self.server_list_timeout_ms)
    }

    /// Soft deadline for the whole detection
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            primary_server: "stun.l.google.com:19302".to_string(),
            secondary_server: "stun1.l.google.com:19302".to_string(),
            server_list_url: DEFAULT_SERVER_LIST_URL.to_string(),
            filtering_servers: Vec::new(),
            mapping_timeout_ms: 5_000,
            filtering_timeout_ms: 3_000,
            change_request_timeout_ms: 2_000,
            server_list_timeout_ms: 5_000,
            overall_timeout_ms: 15_000,
        }
    }
}
