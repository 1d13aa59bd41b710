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

//! Live vehicle location client.
//!
//! This library keeps an in-memory list of the latest known position of each
//! tracked vehicle, refreshes it from a remote location service, and hands
//! coherent snapshots to a single display context. It is split into layers
//! that can be used on their own or through the [`Monitor`] facade:
//!
//! - **Fetch layer**: the [`LocationFetcher`] trait and its HTTP implementation
//! - **Registry layer**: identity-keyed merge of fetched records
//! - **Publisher layer**: single-consumer event channel to the display
//! - **Scheduler layer**: cancellable background sweeps at a fixed interval
//! - **Refresh layer**: operator-triggered single-vehicle requests
//!
//! # Quick Start
//!
//! ```no_run
//! use location_client::{HttpFetcher, Monitor, MonitorConfig, MonitorEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = MonitorConfig::default();
//!     let fetcher = HttpFetcher::new(config.fetcher.clone()).unwrap();
//!     let (monitor, mut events) = Monitor::spawn(config, fetcher);
//!
//!     monitor.request("13800000001".into());
//!     monitor.activate();
//!
//!     while let Some(event) = events.recv().await {
//!         if let MonitorEvent::Snapshot(vehicles) = event {
//!             println!("{} vehicles", vehicles.len());
//!         }
//!     }
//! }
//! ```

pub mod fetch;
pub mod publisher;
pub mod record;
pub mod refresh;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use fetch::{FetchError, FetcherConfig, HttpFetcher, LocationFetcher};
pub use publisher::{MonitorEvent, Notice, Publisher, Snapshot};
pub use record::{EntityId, LocationRecord};
pub use refresh::RefreshOutcome;
pub use registry::{EntityRegistry, UpsertOutcome};
pub use scheduler::{PollScheduler, PollSession, SchedulerState, SweepReport};

/// Default time between background sweeps.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Default cancellation check period of the polling loop.
pub const DEFAULT_TICK: Duration = Duration::from_millis(500);

/// Configuration for the full-stack monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between background sweeps.
    pub poll_interval: Duration,
    /// How often the polling loop wakes to check for cancellation.
    pub tick: Duration,
    /// Location service client configuration.
    pub fetcher: FetcherConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            tick: DEFAULT_TICK,
            fetcher: FetcherConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Clamp settings that would make the polling loop spin.
    #[must_use]
    pub fn validated(mut self) -> Self {
        (self.poll_interval, self.tick) = scheduler::clamp_timing(self.poll_interval, self.tick);
        self
    }
}

/// Full-stack vehicle monitor that wires all layers together.
///
/// The monitor owns the registry and the poll scheduler. Every change is
/// delivered on the event receiver returned by [`Monitor::spawn`], which the
/// display context drains.
pub struct Monitor<F> {
    fetcher: Arc<F>,
    registry: Arc<EntityRegistry>,
    publisher: Publisher,
    scheduler: PollScheduler<F>,
    view_token: CancellationToken,
}

impl<F> std::fmt::Debug for Monitor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("registry", &self.registry)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl<F: LocationFetcher> Monitor<F> {
    /// Create a monitor and the event receiver for the display context.
    ///
    /// Nothing is polled until [`activate`](Self::activate) is called.
    #[must_use]
    pub fn spawn(config: MonitorConfig, fetcher: F) -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let config = config.validated();
        let (publisher, events) = publisher::channel();
        let fetcher = Arc::new(fetcher);
        let registry = Arc::new(EntityRegistry::new(publisher.clone()));
        let view_token = CancellationToken::new();

        let scheduler = PollScheduler::new(
            Arc::clone(&fetcher),
            Arc::clone(&registry),
            publisher.clone(),
            config.poll_interval,
            config.tick,
            view_token.child_token(),
        );

        let monitor = Self {
            fetcher,
            registry,
            publisher,
            scheduler,
            view_token,
        };
        (monitor, events)
    }

    /// The view became visible: start background polling (idempotent).
    pub fn activate(&self) -> bool {
        self.scheduler.activate()
    }

    /// The view is closing: stop polling and drop late on-demand results.
    pub fn close(&self) {
        if self.view_token.is_cancelled() {
            return;
        }
        info!("Closing vehicle monitor");
        self.view_token.cancel();
        self.scheduler.cancel();
    }

    /// Wait for the polling loop to return after [`close`](Self::close).
    pub async fn closed(&self) {
        self.scheduler.wait_stopped().await;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.view_token.is_cancelled()
    }

    /// Add a vehicle record supplied by the parent view.
    pub fn track(&self, record: LocationRecord) -> UpsertOutcome {
        if self.is_closed() {
            debug!("Monitor closed, not tracking {}", record.entity_id);
            return UpsertOutcome::Ignored;
        }
        self.registry.upsert(record)
    }

    /// List a vehicle known only by id, such as one from the startup config.
    ///
    /// The vehicle is listed immediately without a position and fetched
    /// silently in the background. Unlike [`request`](Self::request), nothing
    /// is located and failures raise no notice; the sweep keeps retrying it.
    pub fn seed(&self, id: EntityId) -> Option<JoinHandle<bool>> {
        if self.registry.contains(&id) {
            return None;
        }
        if self.track(LocationRecord::new(id.clone())) == UpsertOutcome::Ignored {
            return None;
        }
        Some(refresh::prefetch(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.registry),
            self.view_token.clone(),
            id,
        ))
    }

    /// Fetch the latest location of one vehicle now, off the calling context.
    pub fn request(&self, id: EntityId) -> JoinHandle<RefreshOutcome> {
        refresh::request_refresh(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.registry),
            self.publisher.clone(),
            self.view_token.clone(),
            id,
        )
    }

    /// Centre the parent view on a vehicle already in the list, without fetching.
    pub fn locate(&self, id: &EntityId) -> Option<LocationRecord> {
        let record = self.registry.lookup(id)?;
        self.publisher.located(record.clone());
        Some(record)
    }

    #[must_use]
    pub fn lookup(&self, id: &EntityId) -> Option<LocationRecord> {
        self.registry.lookup(id)
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.registry.snapshot_all()
    }

    #[must_use]
    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }
}

impl<F> Drop for Monitor<F> {
    fn drop(&mut self) {
        self.view_token.cancel();
    }
}
