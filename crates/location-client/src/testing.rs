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

//! In-memory fetcher used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::fetch::{FetchError, LocationFetcher};
use crate::record::{EntityId, LocationRecord};

/// Fetcher that replays scripted results and records every call.
///
/// Terminals without a scripted result get a successful record whose
/// latitude/longitude equal the 1-based call number.
#[derive(Debug, Default)]
pub(crate) struct ScriptedFetcher {
    responses: Mutex<HashMap<EntityId, VecDeque<Result<LocationRecord, FetchError>>>>,
    calls: Mutex<Vec<EntityId>>,
    delay: Duration,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every fetch take `delay` before answering.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Cancel `token` while answering the `calls`-th fetch.
    pub(crate) fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    /// Queue a result for the next fetch of `id`.
    pub(crate) fn script(
        &self,
        id: impl Into<EntityId>,
        result: Result<LocationRecord, FetchError>,
    ) {
        self.responses
            .lock()
            .unwrap()
            .entry(id.into())
            .or_default()
            .push_back(result);
    }

    pub(crate) fn calls(&self) -> Vec<EntityId> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl LocationFetcher for ScriptedFetcher {
    async fn fetch(&self, id: &EntityId) -> Result<LocationRecord, FetchError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(id.clone());
            calls.len()
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some((after, token)) = &self.cancel_after {
            if call_number == *after {
                token.cancel();
            }
        }

        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front);

        #[allow(clippy::cast_precision_loss, reason = "call counts are tiny")]
        let value = call_number as f64;
        scripted.unwrap_or_else(|| Ok(LocationRecord::new(id.clone()).with_position(value, value)))
    }
}
