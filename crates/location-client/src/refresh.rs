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

//! On-demand refresh of a single vehicle.
//!
//! Unlike background sweeps, an operator is waiting on this path: every
//! failure produces exactly one notice, and a success also tells the parent
//! view which vehicle was just located.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::fetch::{FetchError, LocationFetcher};
use crate::publisher::Publisher;
use crate::record::{EntityId, LocationRecord};
use crate::registry::EntityRegistry;

/// How an on-demand refresh ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The vehicle was located and merged into the registry.
    Located(LocationRecord),
    /// The fetch failed; the operator has been notified.
    Failed(FetchError),
    /// The view closed while the fetch was in flight; the result was dropped.
    Discarded,
}

/// Spawn a single fetch for `id` off the calling context.
///
/// The task is not cancelled when the view closes; it runs to completion and
/// then does nothing if `view_token` has been cancelled in the meantime.
pub fn request_refresh<F: LocationFetcher>(
    fetcher: Arc<F>,
    registry: Arc<EntityRegistry>,
    publisher: Publisher,
    view_token: CancellationToken,
    id: EntityId,
) -> JoinHandle<RefreshOutcome> {
    debug!("Requesting on-demand location for {id}");

    tokio::spawn(async move {
        let result = fetcher
            .fetch(&id)
            .await
            .and_then(LocationRecord::into_result);

        if view_token.is_cancelled() {
            debug!("View closed before location for {id} arrived, dropping result");
            return RefreshOutcome::Discarded;
        }

        match result {
            Ok(record) => {
                info!("Located {id}");
                registry.upsert(record.clone());
                publisher.located(record.clone());
                RefreshOutcome::Located(record)
            }
            Err(e) => {
                warn!("On-demand location for {id} failed: {e}");
                publisher.notice(id, e.user_notice());
                RefreshOutcome::Failed(e)
            }
        }
    })
}

/// Spawn a silent fetch for a vehicle that was just added to the list.
///
/// Nobody is waiting on the result: a success is merged without locating the
/// vehicle, and a failure is only logged. The vehicle stays listed either way
/// and is retried by the next sweep.
pub fn prefetch<F: LocationFetcher>(
    fetcher: Arc<F>,
    registry: Arc<EntityRegistry>,
    view_token: CancellationToken,
    id: EntityId,
) -> JoinHandle<bool> {
    tokio::spawn(async move {
        let result = fetcher.fetch(&id).await;
        if view_token.is_cancelled() {
            return false;
        }
        match result {
            Ok(record) => registry.upsert(record).is_mutation(),
            Err(e) => {
                debug!("Initial location for {id} unavailable: {e}");
                false
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{self, MonitorEvent};
    use crate::testing::ScriptedFetcher;

    fn setup() -> (
        Arc<ScriptedFetcher>,
        Arc<EntityRegistry>,
        Publisher,
        tokio::sync::mpsc::UnboundedReceiver<MonitorEvent>,
    ) {
        let (publisher, rx) = publisher::channel();
        let registry = Arc::new(EntityRegistry::new(publisher.clone()));
        (Arc::new(ScriptedFetcher::new()), registry, publisher, rx)
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<MonitorEvent>) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_success_merges_and_locates() {
        let (fetcher, registry, publisher, mut rx) = setup();
        fetcher.script("T1", Ok(LocationRecord::new("T1").with_position(22.5, 114.1)));

        let outcome = request_refresh(
            Arc::clone(&fetcher),
            Arc::clone(&registry),
            publisher,
            CancellationToken::new(),
            EntityId::new("T1"),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, RefreshOutcome::Located(ref r) if r.latitude == Some(22.5)));
        assert_eq!(registry.len(), 1);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], MonitorEvent::Snapshot(s) if s.len() == 1));
        assert!(matches!(
            &events[1],
            MonitorEvent::EntityLocated(r) if r.entity_id.as_str() == "T1"
        ));
    }

    #[tokio::test]
    async fn test_rejection_notifies_once_and_keeps_registry() {
        let (fetcher, registry, publisher, mut rx) = setup();
        registry.upsert(LocationRecord::new("T1").with_position(1.0, 2.0));
        drain(&mut rx);
        fetcher.script(
            "T1",
            Err(FetchError::Rejected {
                status: 5,
                message: "terminal offline".to_string(),
            }),
        );

        let outcome = request_refresh(
            fetcher,
            Arc::clone(&registry),
            publisher,
            CancellationToken::new(),
            EntityId::new("T1"),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, RefreshOutcome::Failed(FetchError::Rejected { status: 5, .. })));
        let snapshot = registry.snapshot_all();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].latitude, Some(1.0));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            MonitorEvent::Notice(n) if n.text == "Request failed: terminal offline"
        ));
    }

    #[tokio::test]
    async fn test_failure_status_in_ok_record_is_rejected() {
        let (fetcher, registry, publisher, mut rx) = setup();
        fetcher.script("T1", Ok(LocationRecord::new("T1").with_status(3, "no fix")));

        let outcome = request_refresh(
            fetcher,
            Arc::clone(&registry),
            publisher,
            CancellationToken::new(),
            EntityId::new("T1"),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, RefreshOutcome::Failed(FetchError::Rejected { status: 3, .. })));
        assert!(registry.is_empty());
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_uses_generic_notice() {
        let (fetcher, registry, publisher, mut rx) = setup();
        fetcher.script("T1", Err(FetchError::Unreachable("timed out".to_string())));

        request_refresh(
            fetcher,
            Arc::clone(&registry),
            publisher,
            CancellationToken::new(),
            EntityId::new("T1"),
        )
        .await
        .unwrap();

        assert!(registry.is_empty());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            MonitorEvent::Notice(n) if n.text == "Server unreachable" && n.entity_id.as_str() == "T1"
        ));
    }

    #[tokio::test]
    async fn test_prefetch_merges_without_locating() {
        let (fetcher, registry, _publisher, mut rx) = setup();
        registry.upsert(LocationRecord::new("T1"));
        drain(&mut rx);

        let merged = prefetch(
            fetcher,
            Arc::clone(&registry),
            CancellationToken::new(),
            EntityId::new("T1"),
        )
        .await
        .unwrap();

        assert!(merged);
        assert_eq!(registry.lookup(&EntityId::new("T1")).unwrap().latitude, Some(1.0));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], MonitorEvent::Snapshot(_)));
    }

    #[tokio::test]
    async fn test_prefetch_failure_is_silent() {
        let (fetcher, registry, _publisher, mut rx) = setup();
        registry.upsert(LocationRecord::new("T1"));
        drain(&mut rx);
        fetcher.script("T1", Err(FetchError::Unreachable("connection refused".to_string())));

        let merged = prefetch(
            fetcher,
            Arc::clone(&registry),
            CancellationToken::new(),
            EntityId::new("T1"),
        )
        .await
        .unwrap();

        assert!(!merged);
        assert!(registry.contains(&EntityId::new("T1")));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_dropped_after_view_closed() {
        let (publisher, mut rx) = publisher::channel();
        let registry = Arc::new(EntityRegistry::new(publisher.clone()));
        let fetcher = Arc::new(ScriptedFetcher::new().with_delay(std::time::Duration::from_secs(3)));
        let view_token = CancellationToken::new();

        let handle = request_refresh(
            Arc::clone(&fetcher),
            Arc::clone(&registry),
            publisher,
            view_token.clone(),
            EntityId::new("T1"),
        );
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        view_token.cancel();

        assert_eq!(handle.await.unwrap(), RefreshOutcome::Discarded);
        assert_eq!(fetcher.call_count(), 1);
        assert!(registry.is_empty());
        assert!(drain(&mut rx).is_empty());
    }
}
