// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! Configuration is stored in TOML via confy. Command-line flags override the
//! stored values for a single run without touching the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use location_client::{EntityId, FetcherConfig, MonitorConfig, DEFAULT_TICK};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "careye-monitor";
const CONFIG_NAME: &str = "config";

/// Default location service address
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Base URL of the location service
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Request path for a vehicle's last location; `{terminal}` is replaced by its id
    #[serde(default = "default_last_location_path")]
    pub last_location_path: String,

    /// Seconds between automatic location sweeps
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Terminals listed when the monitor opens
    #[serde(default)]
    pub tracked_terminals: Vec<String>,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_last_location_path() -> String {
    FetcherConfig::default().last_location_path
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            server_url: default_server_url(),
            last_location_path: default_last_location_path(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            tracked_terminals: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, confy::ConfyError> {
        confy::load_path(path)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Apply command-line overrides
    pub fn apply_overrides(
        &mut self,
        server_url: Option<String>,
        poll_interval_secs: Option<u64>,
        terminals: Vec<String>,
    ) {
        if let Some(url) = server_url {
            self.server_url = url;
        }
        if let Some(interval) = poll_interval_secs {
            self.poll_interval_secs = interval;
        }
        for terminal in terminals {
            if !self.tracked_terminals.contains(&terminal) {
                self.tracked_terminals.push(terminal);
            }
        }
    }

    /// Terminals to list at startup, without blanks
    pub fn terminals(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.tracked_terminals
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(EntityId::from)
    }

    /// Build the monitor configuration
    pub fn to_monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            tick: DEFAULT_TICK,
            fetcher: FetcherConfig {
                base_url: self.server_url.clone(),
                last_location_path: self.last_location_path.clone(),
                request_timeout: Duration::from_secs(self.request_timeout_secs),
            },
        }
    }
}
