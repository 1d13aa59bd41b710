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

//! Location fetcher layer.
//!
//! Provides a trait-based abstraction over the remote location service so the
//! scheduler and on-demand refresh can be driven by the HTTP client in
//! production and by scripted fetchers in tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::record::{EntityId, LocationRecord};

/// Placeholder in [`FetcherConfig::last_location_path`] replaced by the terminal id.
pub const TERMINAL_PLACEHOLDER: &str = "{terminal}";

/// Errors that can occur while fetching a location.
///
/// The two variants are distinct failure kinds: the operator sees a generic
/// notice for the first and the server's own message for the second.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Service unreachable, timed out, or sent a response that could not be parsed.
    #[error("location service unreachable: {0}")]
    Unreachable(String),

    /// Service answered but rejected the request for this terminal.
    #[error("location request rejected (status {status}): {message}")]
    Rejected { status: i32, message: String },
}

impl FetchError {
    /// Text shown to the operator when a user-initiated request fails.
    #[must_use]
    pub fn user_notice(&self) -> String {
        match self {
            Self::Unreachable(_) => "Server unreachable".to_string(),
            Self::Rejected { message, .. } => format!("Request failed: {message}"),
        }
    }
}

/// Trait for location service clients.
///
/// Implement this trait to plug a different transport into the monitor.
pub trait LocationFetcher: Send + Sync + 'static {
    /// Fetch the latest known location of `id`.
    ///
    /// Returns `Ok` only for records with a zero status; application failures
    /// map to [`FetchError::Rejected`].
    fn fetch(
        &self,
        id: &EntityId,
    ) -> impl Future<Output = Result<LocationRecord, FetchError>> + Send;
}

impl<F: LocationFetcher> LocationFetcher for Arc<F> {
    fn fetch(
        &self,
        id: &EntityId,
    ) -> impl Future<Output = Result<LocationRecord, FetchError>> + Send {
        F::fetch(self, id)
    }
}

/// Configuration for the HTTP location service client.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Base URL of the location service, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Request path, containing [`TERMINAL_PLACEHOLDER`].
    pub last_location_path: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            last_location_path: "/api/vehicle/lastlocation/{terminal}".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl FetcherConfig {
    /// Build the request URL for a single terminal.
    #[must_use]
    pub fn url_for(&self, id: &EntityId) -> String {
        let path = self.last_location_path.replace(TERMINAL_PLACEHOLDER, id.as_str());
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Location fetcher backed by the service's JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    /// Create a fetcher with its own connection pool.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }
}

impl LocationFetcher for HttpFetcher {
    async fn fetch(&self, id: &EntityId) -> Result<LocationRecord, FetchError> {
        let url = self.config.url_for(id);
        debug!("Requesting last location for {id} from {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Unreachable(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let mut record: LocationRecord = response
            .json()
            .await
            .map_err(|e| FetchError::Unreachable(format!("malformed response: {e}")))?;

        if record.entity_id.is_empty() {
            record.entity_id = id.clone();
        }

        record.into_result()
    }
}
