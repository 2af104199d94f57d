// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Always-on background execution context.
//!
//! Polls the delivery log and drives due rows through its own relay
//! instance. It is the active sender while the stored lifecycle state is
//! `Background` or `Terminated`. While the state says `Foreground` it only
//! takes over rows overdue by more than the orphan grace period: those
//! belong to a main process that died without reporting `Terminated`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lifeline_config::model::WorkerConfig;
use lifeline_core::{DeliveryAttempt, ExecutionContext, LifelineError, TriggerEvent};
use lifeline_storage::queries::attempts;
use lifeline_storage::Database;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::credential::CredentialCache;
use crate::relay::EmergencyRelay;

/// Rows fetched per poll.
const POLL_BATCH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub poll_interval: Duration,
    pub orphan_grace: Duration,
}

impl WorkerOptions {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            orphan_grace: Duration::from_millis(config.orphan_grace_ms),
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

pub struct BackgroundWorker {
    db: Database,
    cache: CredentialCache,
    relay: Arc<EmergencyRelay>,
    options: WorkerOptions,
}

impl BackgroundWorker {
    /// `relay` must claim rows as [`ExecutionContext::Background`].
    pub fn new(
        db: Database,
        relay: Arc<EmergencyRelay>,
        options: WorkerOptions,
    ) -> Result<Self, LifelineError> {
        if relay.context() != ExecutionContext::Background {
            return Err(LifelineError::Internal(
                "background worker needs a relay running in the background context".into(),
            ));
        }
        Ok(Self {
            cache: CredentialCache::new(db.clone()),
            db,
            relay,
            options,
        })
    }

    /// Poll until `cancel` fires, then wait for in-flight deliveries.
    ///
    /// Returns the number of deliveries that reached a final outcome.
    pub async fn run(&self, cancel: CancellationToken) -> Result<usize, LifelineError> {
        info!(
            poll_ms = self.options.poll_interval.as_millis() as u64,
            "background worker started"
        );
        let mut interval = tokio::time::interval(self.options.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tasks: JoinSet<(Uuid, DeliveryAttempt)> = JoinSet::new();
        let mut in_flight: HashSet<Uuid> = HashSet::new();
        let mut completed = 0usize;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping worker poll loop");
                    break;
                }
                _ = interval.tick() => {
                    match self.due_events().await {
                        Ok(events) => {
                            for event in events {
                                let id = event.trigger_id;
                                if in_flight.insert(id) {
                                    let relay = self.relay.clone();
                                    tasks.spawn(async move { (id, relay.resume(event).await) });
                                }
                            }
                        }
                        Err(e) => warn!(error = %e, "worker poll failed"),
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    completed += reap(joined, &mut in_flight);
                }
            }
        }

        if !tasks.is_empty() {
            info!(count = tasks.len(), "waiting for in-flight deliveries");
        }
        while let Some(joined) = tasks.join_next().await {
            completed += reap(joined, &mut in_flight);
        }
        info!(completed, "background worker stopped");
        Ok(completed)
    }

    /// One poll: drive every currently due row to its next stopping point and
    /// return the attempts.
    pub async fn run_once(&self) -> Result<Vec<DeliveryAttempt>, LifelineError> {
        let events = self.due_events().await?;
        let drives = events.into_iter().map(|event| self.relay.resume(event));
        Ok(futures::future::join_all(drives).await)
    }

    /// Rows this context may take right now.
    async fn due_events(&self) -> Result<Vec<TriggerEvent>, LifelineError> {
        let state = self.cache.get().await?.lifecycle_or_default();
        let now = Utc::now();
        let due_before = if ExecutionContext::Background.is_active(state) {
            now
        } else {
            let grace = chrono::Duration::from_std(self.options.orphan_grace)
                .unwrap_or(chrono::Duration::zero());
            now.checked_sub_signed(grace).unwrap_or(now)
        };
        let events = attempts::list_due(&self.db, due_before, now, POLL_BATCH).await?;
        if !events.is_empty() {
            debug!(count = events.len(), lifecycle = %state, "due deliveries found");
        }
        Ok(events)
    }
}

fn reap(
    joined: Result<(Uuid, DeliveryAttempt), tokio::task::JoinError>,
    in_flight: &mut HashSet<Uuid>,
) -> usize {
    match joined {
        Ok((id, attempt)) => {
            in_flight.remove(&id);
            debug!(trigger_id = %id, outcome = %attempt.outcome, "worker delivery finished");
            usize::from(attempt.outcome.is_terminal())
        }
        Err(e) => {
            warn!(error = %e, "worker delivery task failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayOptions;
    use lifeline_core::{DeliveryOutcome, LifecycleState, TriggerKind};
    use lifeline_storage::queries::kv;
    use lifeline_test_utils::{MockIngestion, TestStore};

    async fn setup(state: LifecycleState) -> (TestStore, MockIngestion, BackgroundWorker) {
        let store = TestStore::new().await.unwrap();
        kv::store_credential(&store.db, "tok", "https://api.example")
            .await
            .unwrap();
        CredentialCache::new(store.db.clone())
            .set_lifecycle(state)
            .await
            .unwrap();

        let mock = MockIngestion::new();
        let relay = Arc::new(EmergencyRelay::new(
            store.db.clone(),
            Arc::new(mock.clone()),
            ExecutionContext::Background,
            RelayOptions::from_config(&store.config.relay),
        ));
        let worker = BackgroundWorker::new(
            store.db.clone(),
            relay,
            WorkerOptions {
                poll_interval: Duration::from_millis(20),
                orphan_grace: Duration::from_secs(30),
            },
        )
        .unwrap();
        (store, mock, worker)
    }

    fn event(state: LifecycleState) -> TriggerEvent {
        TriggerEvent::new(TriggerKind::Manual, state, None)
    }

    #[tokio::test]
    async fn delivers_pending_rows_when_terminated() {
        let (store, mock, worker) = setup(LifecycleState::Terminated).await;
        let ev = event(LifecycleState::Foreground);
        attempts::record(&store.db, &ev, Utc::now()).await.unwrap();

        let done = worker.run_once().await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].outcome, DeliveryOutcome::Acknowledged);
        assert_eq!(done[0].owner, Some(ExecutionContext::Background));
        assert_eq!(mock.call_count().await, 1);
    }

    #[tokio::test]
    async fn leaves_fresh_rows_to_a_foreground_main_process() {
        let (store, mock, worker) = setup(LifecycleState::Foreground).await;
        attempts::record(&store.db, &event(LifecycleState::Foreground), Utc::now())
            .await
            .unwrap();

        assert!(worker.run_once().await.unwrap().is_empty());
        assert_eq!(mock.call_count().await, 0);
    }

    #[tokio::test]
    async fn takes_over_orphaned_rows_in_foreground() {
        let (store, mock, worker) = setup(LifecycleState::Foreground).await;
        let ev = event(LifecycleState::Foreground);
        attempts::record(&store.db, &ev, Utc::now() - chrono::Duration::seconds(120))
            .await
            .unwrap();

        let done = worker.run_once().await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].trigger_id, ev.trigger_id);
        assert_eq!(mock.call_count().await, 1);
    }

    #[tokio::test]
    async fn run_loop_delivers_and_stops_on_cancel() {
        let (store, mock, worker) = setup(LifecycleState::Background).await;
        attempts::record(&store.db, &event(LifecycleState::Background), Utc::now())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let stopper = {
            let cancel = cancel.clone();
            let mock = mock.clone();
            tokio::spawn(async move {
                while mock.call_count().await == 0 {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                cancel.cancel();
            })
        };

        let completed = tokio::time::timeout(Duration::from_secs(10), worker.run(cancel))
            .await
            .expect("worker should stop")
            .unwrap();
        stopper.await.unwrap();
        assert_eq!(completed, 1);
        assert_eq!(attempts::count_open(&store.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejects_main_context_relay() {
        let store = TestStore::new().await.unwrap();
        let relay = Arc::new(EmergencyRelay::new(
            store.db.clone(),
            Arc::new(MockIngestion::new()),
            ExecutionContext::Main,
            RelayOptions::default(),
        ));
        assert!(BackgroundWorker::new(store.db.clone(), relay, WorkerOptions::default()).is_err());
    }
}
