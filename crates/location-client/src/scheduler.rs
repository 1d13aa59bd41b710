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

//! Background poll scheduler.
//!
//! The scheduler wakes on a short tick so cancellation is noticed quickly, and
//! only sweeps the registry once the (much longer) poll interval has elapsed.
//! A sweep fetches every known vehicle one after another; failures are skipped
//! silently and cancellation abandons the rest of the sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::fetch::LocationFetcher;
use crate::publisher::{MonitorEvent, Publisher};
use crate::registry::EntityRegistry;
use crate::DEFAULT_TICK;

/// Lifecycle of the poll scheduler.
///
/// Transitions only move forward: `Idle -> Running -> Cancelling -> Stopped`,
/// or `Idle -> Stopped` when cancelled before it was ever started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created but not yet activated.
    Idle,
    /// Loop is ticking and sweeping.
    Running,
    /// Cancellation observed, loop is winding down.
    Cancelling,
    /// Loop has returned; no further fetches will be issued.
    Stopped,
}

/// Timing state of the polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollSession {
    /// Start of the last full sweep (or of the loop, before the first sweep).
    pub last_poll: Instant,
    /// Time between sweeps.
    pub interval: Duration,
}

impl PollSession {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            last_poll: Instant::now(),
            interval,
        }
    }

    /// Whether a sweep is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_poll) >= self.interval
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_poll = now;
    }
}

/// Summary of one sweep, logged after it finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Fetches issued.
    pub attempted: usize,
    /// Fetches merged into the registry.
    pub updated: usize,
    /// Fetches that failed and were skipped.
    pub failed: usize,
    /// The sweep was abandoned because cancellation was requested.
    pub cancelled: bool,
}

/// Clamp loop timing that would panic or make the loop spin.
///
/// A zero tick falls back to [`DEFAULT_TICK`] and an interval not longer than
/// the tick is raised to twice the tick.
pub(crate) fn clamp_timing(interval: Duration, tick: Duration) -> (Duration, Duration) {
    let tick = if tick.is_zero() {
        warn!("Poll tick of 0ms is not allowed, using {}ms", DEFAULT_TICK.as_millis());
        DEFAULT_TICK
    } else {
        tick
    };
    if interval <= tick {
        let raised = tick * 2;
        warn!(
            "Poll interval {}ms is not longer than the {}ms tick, using {}ms",
            interval.as_millis(),
            tick.as_millis(),
            raised.as_millis()
        );
        return (raised, tick);
    }
    (interval, tick)
}

/// Cancellable background loop that periodically refreshes every tracked vehicle.
pub struct PollScheduler<F> {
    fetcher: Arc<F>,
    registry: Arc<EntityRegistry>,
    publisher: Publisher,
    interval: Duration,
    tick: Duration,
    cancel_token: CancellationToken,
    state_tx: Arc<watch::Sender<SchedulerState>>,
}

impl<F> std::fmt::Debug for PollScheduler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("state", &*self.state_tx.borrow())
            .field("interval", &self.interval)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

impl<F: LocationFetcher> PollScheduler<F> {
    /// Create an idle scheduler. Nothing runs until [`activate`](Self::activate).
    ///
    /// Timing is clamped the same way as [`MonitorConfig::validated`](crate::MonitorConfig::validated).
    #[must_use]
    pub fn new(
        fetcher: Arc<F>,
        registry: Arc<EntityRegistry>,
        publisher: Publisher,
        interval: Duration,
        tick: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        let (interval, tick) = clamp_timing(interval, tick);
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            fetcher,
            registry,
            publisher,
            interval,
            tick,
            cancel_token,
            state_tx: Arc::new(state_tx),
        }
    }

    /// Start the polling loop on the current tokio runtime.
    ///
    /// Only the first call from [`SchedulerState::Idle`] starts anything;
    /// returns `false` when the loop is already running or has stopped.
    pub fn activate(&self) -> bool {
        let started = self.state_tx.send_if_modified(|state| {
            if *state == SchedulerState::Idle {
                *state = SchedulerState::Running;
                true
            } else {
                false
            }
        });

        if !started {
            debug!("Poll scheduler already activated, ignoring");
            return false;
        }

        info!(
            "Starting poll scheduler (interval {}s, tick {}ms)",
            self.interval.as_secs(),
            self.tick.as_millis()
        );
        self.publisher
            .publish(MonitorEvent::SchedulerStateChanged(SchedulerState::Running));

        let worker = PollWorker {
            fetcher: Arc::clone(&self.fetcher),
            registry: Arc::clone(&self.registry),
            publisher: self.publisher.clone(),
            session: PollSession::new(self.interval),
            tick: self.tick,
            cancel_token: self.cancel_token.clone(),
            state_tx: Arc::clone(&self.state_tx),
        };
        tokio::spawn(worker.run());

        true
    }

    /// Request cancellation. Terminal: the scheduler never runs again.
    pub fn cancel(&self) {
        self.cancel_token.cancel();

        // Never started, so there is no loop to observe the token.
        let stopped = self.state_tx.send_if_modified(|state| {
            if *state == SchedulerState::Idle {
                *state = SchedulerState::Stopped;
                true
            } else {
                false
            }
        });
        if stopped {
            self.publisher
                .publish(MonitorEvent::SchedulerStateChanged(SchedulerState::Stopped));
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Wait until the loop has returned.
    pub async fn wait_stopped(&self) {
        let mut rx = self.state_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close underneath us.
        let _ = rx.wait_for(|state| *state == SchedulerState::Stopped).await;
    }
}

/// State moved into the spawned polling task.
struct PollWorker<F> {
    fetcher: Arc<F>,
    registry: Arc<EntityRegistry>,
    publisher: Publisher,
    session: PollSession,
    tick: Duration,
    cancel_token: CancellationToken,
    state_tx: Arc<watch::Sender<SchedulerState>>,
}

impl<F: LocationFetcher> PollWorker<F> {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let now = Instant::now();
            if !self.session.is_due(now) {
                continue;
            }
            self.session.mark(now);

            debug!("Starting sweep at {}", Utc::now().format("%H:%M:%S"));
            let report = self.sweep().await;
            if report.attempted == 0 {
                debug!("Sweep finished: no vehicles in list");
                continue;
            }
            info!(
                "Sweep finished: {} attempted, {} updated, {} failed{}",
                report.attempted,
                report.updated,
                report.failed,
                if report.cancelled { " (cancelled)" } else { "" }
            );

            if report.cancelled {
                break;
            }
        }

        self.transition(SchedulerState::Cancelling);
        info!("Poll scheduler cancelled");
        self.transition(SchedulerState::Stopped);
    }

    async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let vehicles = self.registry.snapshot_all();

        for vehicle in vehicles.iter() {
            if self.cancel_token.is_cancelled() {
                report.cancelled = true;
                break;
            }

            report.attempted += 1;
            let result = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => None,
                result = self.fetcher.fetch(&vehicle.entity_id) => Some(result),
            };

            let Some(result) = result else {
                debug!("Abandoning in-flight fetch for {}", vehicle.entity_id);
                report.cancelled = true;
                break;
            };

            match result {
                Ok(record) => {
                    if self.registry.upsert(record).is_mutation() {
                        report.updated += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    // Background sweeps never surface failures to the operator.
                    debug!("Skipping {} this sweep: {}", vehicle.entity_id, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn transition(&self, next: SchedulerState) {
        self.state_tx.send_replace(next);
        self.publisher
            .publish(MonitorEvent::SchedulerStateChanged(next));
    }
}
