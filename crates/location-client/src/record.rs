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

//! Location records returned by the location service.
//!
//! A [`LocationRecord`] is the most recently known state of one tracked
//! vehicle. Only the identity and the status fields are interpreted by the
//! polling core; telemetry is carried through to the display untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fetch::FetchError;

/// Status code reported by the service for a successful lookup.
pub const STATUS_OK: i32 = 0;

/// Stable identifier of a tracked vehicle (the terminal id).
///
/// Used both as the argument of a fetch and as the merge key in the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an identifier from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Last known position of one vehicle, as reported by the location service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocationRecord {
    /// Terminal id of the vehicle.
    #[serde(rename = "TerminalId", default)]
    pub entity_id: EntityId,
    /// `0` on success, anything else is an application-level failure.
    #[serde(default)]
    pub status: i32,
    /// Failure detail, present when `status != 0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Server-side row index of the vehicle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_index: Option<i64>,
    /// Licence plate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    /// Latitude in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Ground speed in km/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Heading in degrees (0-360, north = 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<f64>,
    /// Altitude in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Device timestamp of the fix, in the service's own format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_time: Option<String>,
    /// Any other fields the service sends; never interpreted here.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LocationRecord {
    /// Create an otherwise empty successful record for `entity_id`.
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Self::default()
        }
    }

    /// Builder-style helper to set the position.
    #[must_use]
    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Builder-style helper to mark the record as a service rejection.
    #[must_use]
    pub fn with_status(mut self, status: i32, message: impl Into<String>) -> Self {
        self.status = status;
        self.message = Some(message.into());
        self
    }

    /// Whether the service reported success for this record.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Turn an application-level failure into a [`FetchError::Rejected`].
    pub fn into_result(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::Rejected {
                status: self.status,
                message: self.message.unwrap_or_default(),
            })
        }
    }
}
