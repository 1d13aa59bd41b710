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

//! Update publisher.
//!
//! Everything the background tasks want the display to know travels through a
//! single unbounded channel that only the display context drains. Snapshots
//! are immutable, so the consumer can never observe a collection mid-mutation.

use std::sync::Arc;

use log::trace;
use tokio::sync::mpsc;

use crate::record::{EntityId, LocationRecord};
use crate::scheduler::SchedulerState;

/// Immutable, ordered copy of the registry contents at one point in time.
pub type Snapshot = Arc<[LocationRecord]>;

/// User-visible report of a failed on-demand request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub entity_id: EntityId,
    pub text: String,
}

/// Events delivered to the display context.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// The registry changed; re-bind the table to this collection.
    Snapshot(Snapshot),
    /// An on-demand request located a vehicle; centre the map on it.
    EntityLocated(LocationRecord),
    /// An on-demand request failed.
    Notice(Notice),
    /// The poll scheduler changed state.
    SchedulerStateChanged(SchedulerState),
}

/// Sending half of the display channel.
///
/// Cloned into every background task. Sends never block, and once the display
/// has gone away every send is a silent no-op.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<MonitorEvent>,
}

/// Create a publisher and the receiver the display context drains.
#[must_use]
pub fn channel() -> (Publisher, mpsc::UnboundedReceiver<MonitorEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Publisher { tx }, rx)
}

impl Publisher {
    /// Hand an event to the display context.
    ///
    /// Returns `false` when the display has already closed.
    pub fn publish(&self, event: MonitorEvent) -> bool {
        if self.tx.send(event).is_err() {
            trace!("Display closed, dropping event");
            return false;
        }
        true
    }

    pub fn snapshot(&self, snapshot: Snapshot) -> bool {
        self.publish(MonitorEvent::Snapshot(snapshot))
    }

    pub fn located(&self, record: LocationRecord) -> bool {
        self.publish(MonitorEvent::EntityLocated(record))
    }

    pub fn notice(&self, entity_id: EntityId, text: String) -> bool {
        self.publish(MonitorEvent::Notice(Notice { entity_id, text }))
    }

    /// Whether the display has dropped its receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_send_order() {
        let (publisher, mut rx) = channel();
        publisher.notice(EntityId::new("T1"), "first".to_string());
        publisher.located(LocationRecord::new("T2"));

        assert!(matches!(rx.try_recv(), Ok(MonitorEvent::Notice(n)) if n.text == "first"));
        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorEvent::EntityLocated(r)) if r.entity_id.as_str() == "T2"
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_after_display_closed_is_noop() {
        let (publisher, rx) = channel();
        drop(rx);

        assert!(publisher.is_closed());
        assert!(!publisher.located(LocationRecord::new("T1")));
    }
}
