// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle tracker: a single-consumer state machine over OS lifecycle reports.
//!
//! Reports arrive on an mpsc channel and are applied one at a time:
//! validate the transition, write the new state to the credential cache,
//! publish it on a watch channel, then acknowledge the caller. Follow-up work
//! for a transition to `Foreground` (token refresh, notice surfacing, resume
//! of pending deliveries) runs in spawned tasks and never delays the
//! acknowledgment.

use std::sync::Arc;

use lifeline_core::{LifecycleState, LifelineError, Notice, SessionProvider};
use lifeline_storage::queries::notices;
use lifeline_storage::Database;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::credential::CredentialCache;
use crate::relay::EmergencyRelay;

/// Capacity of the transition request channel.
const REQUEST_BUFFER: usize = 16;

/// What a reported transition did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The state changed and was persisted.
    Applied {
        from: LifecycleState,
        to: LifecycleState,
    },
    /// The reported state was already current. It is re-persisted anyway.
    Unchanged(LifecycleState),
}

enum Command {
    Transition {
        state: LifecycleState,
        ack: oneshot::Sender<Result<TransitionOutcome, LifelineError>>,
    },
    Flush {
        ack: oneshot::Sender<()>,
    },
}

/// Builder and state machine. Consumed by [`LifecycleTracker::start`].
pub struct LifecycleTracker {
    cache: CredentialCache,
    db: Database,
    session: Option<Arc<dyn SessionProvider>>,
    relay: Option<Arc<EmergencyRelay>>,
}

/// Cloneable handle used to report transitions and observe state.
#[derive(Clone)]
pub struct LifecycleHandle {
    tx: mpsc::Sender<Command>,
    state: watch::Receiver<LifecycleState>,
    notices: watch::Receiver<Vec<Notice>>,
}

impl LifecycleTracker {
    pub fn new(db: Database) -> Self {
        Self {
            cache: CredentialCache::new(db.clone()),
            db,
            session: None,
            relay: None,
        }
    }

    /// Refresh and re-mirror the token through `session` on every foreground.
    pub fn with_session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    /// Resume this context's pending deliveries on every foreground.
    pub fn with_relay(mut self, relay: Arc<EmergencyRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Start the state machine task.
    ///
    /// The initial state is the persisted one, except that a persisted
    /// `Terminated` belongs to a previous process instance: a new instance
    /// starts from `Foreground`.
    pub async fn start(self) -> Result<(LifecycleHandle, JoinHandle<()>), LifelineError> {
        let initial = match self.cache.lifecycle().await? {
            Some(LifecycleState::Terminated) | None => LifecycleState::Foreground,
            Some(state) => state,
        };
        debug!(state = %initial, "lifecycle tracker starting");

        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
        let (state_tx, state_rx) = watch::channel(initial);
        let (notices_tx, notices_rx) = watch::channel(Vec::new());

        let machine = Machine {
            tracker: self,
            current: initial,
            state_tx,
            notices_tx: Arc::new(notices_tx),
            tasks: JoinSet::new(),
        };
        let task = tokio::spawn(machine.run(rx));

        Ok((
            LifecycleHandle {
                tx,
                state: state_rx,
                notices: notices_rx,
            },
            task,
        ))
    }
}

impl LifecycleHandle {
    /// Report a lifecycle transition. Resolves once the new state is durable.
    pub async fn transition(
        &self,
        state: LifecycleState,
    ) -> Result<TransitionOutcome, LifelineError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::Transition { state, ack })
            .await
            .map_err(|_| LifelineError::Lifecycle("lifecycle tracker stopped".into()))?;
        rx.await
            .map_err(|_| LifelineError::Lifecycle("lifecycle tracker dropped the request".into()))?
    }

    /// Wait for all follow-up work spawned by earlier transitions.
    pub async fn flush(&self) -> Result<(), LifelineError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush { ack })
            .await
            .map_err(|_| LifelineError::Lifecycle("lifecycle tracker stopped".into()))?;
        rx.await
            .map_err(|_| LifelineError::Lifecycle("lifecycle tracker dropped the request".into()))
    }

    /// The current state as last applied.
    pub fn current(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    /// Watch the undismissed notices surfaced on the latest foreground.
    pub fn notices(&self) -> watch::Receiver<Vec<Notice>> {
        self.notices.clone()
    }
}

struct Machine {
    tracker: LifecycleTracker,
    current: LifecycleState,
    state_tx: watch::Sender<LifecycleState>,
    notices_tx: Arc<watch::Sender<Vec<Notice>>>,
    tasks: JoinSet<()>,
}

impl Machine {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Transition { state, ack } => {
                    let result = self.apply(state).await;
                    let _ = ack.send(result);
                }
                Command::Flush { ack } => {
                    while self.tasks.join_next().await.is_some() {}
                    let _ = ack.send(());
                }
            }
            // Reap finished follow-ups so the set does not grow.
            while self.tasks.try_join_next().is_some() {}
        }
        while self.tasks.join_next().await.is_some() {}
        debug!("lifecycle tracker stopped");
    }

    async fn apply(&mut self, next: LifecycleState) -> Result<TransitionOutcome, LifelineError> {
        let from = self.current;
        if !from.can_transition_to(next) {
            warn!(from = %from, to = %next, "rejected lifecycle transition");
            return Err(LifelineError::Lifecycle(format!(
                "invalid transition {from} -> {next}"
            )));
        }

        self.tracker.cache.set_lifecycle(next).await?;
        self.current = next;
        self.state_tx.send_replace(next);

        if from == next {
            debug!(state = %next, "lifecycle state unchanged");
            if next == LifecycleState::Foreground {
                self.spawn_foreground_work();
            }
            return Ok(TransitionOutcome::Unchanged(next));
        }

        info!(from = %from, to = %next, "lifecycle transition");
        if next == LifecycleState::Foreground {
            self.spawn_foreground_work();
        }
        Ok(TransitionOutcome::Applied { from, to: next })
    }

    fn spawn_foreground_work(&mut self) {
        if let Some(session) = self.tracker.session.clone() {
            let cache = self.tracker.cache.clone();
            self.tasks.spawn(async move {
                refresh_and_mirror(session.as_ref(), &cache).await;
            });
        }

        let db = self.tracker.db.clone();
        let notices_tx = self.notices_tx.clone();
        self.tasks.spawn(async move {
            match notices::list_active(&db).await {
                Ok(active) => {
                    for notice in &active {
                        info!(
                            notice_id = notice.id,
                            kind = %notice.kind,
                            message = notice.message.as_str(),
                            "undismissed notice"
                        );
                    }
                    notices_tx.send_replace(active);
                }
                Err(e) => warn!(error = %e, "failed to load notices"),
            }
        });

        if let Some(relay) = self.tracker.relay.clone() {
            self.tasks.spawn(async move {
                match relay.resume_pending().await {
                    Ok(done) if !done.is_empty() => {
                        info!(count = done.len(), "foreground resume finished");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "foreground resume failed"),
                }
            });
        }
    }
}

async fn refresh_and_mirror(session: &dyn SessionProvider, cache: &CredentialCache) {
    match session.refresh_if_expired().await {
        Ok(Some(token)) => match cache.mirror_token(&token).await {
            Ok(()) => debug!("access token re-mirrored"),
            Err(e) => warn!(error = %e, "failed to mirror refreshed token"),
        },
        Ok(None) => debug!("no session; nothing to mirror"),
        Err(e) => warn!(error = %e, "token refresh failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lifeline_core::NoticeKind;
    use lifeline_test_utils::{MockSession, TestStore};
    use secrecy::{ExposeSecret, SecretString};

    #[tokio::test]
    async fn transition_is_durable_before_ack() {
        let store = TestStore::new().await.unwrap();
        let (handle, _task) = LifecycleTracker::new(store.db.clone()).start().await.unwrap();
        let other = CredentialCache::new(store.open_second().await.unwrap());

        let outcome = handle.transition(LifecycleState::Background).await.unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Applied {
                from: LifecycleState::Foreground,
                to: LifecycleState::Background
            }
        );
        assert_eq!(other.lifecycle().await.unwrap(), Some(LifecycleState::Background));
        assert_eq!(handle.current(), LifecycleState::Background);

        handle.transition(LifecycleState::Terminated).await.unwrap();
        assert_eq!(other.lifecycle().await.unwrap(), Some(LifecycleState::Terminated));
    }

    #[tokio::test]
    async fn nothing_leaves_terminated() {
        let store = TestStore::new().await.unwrap();
        let (handle, _task) = LifecycleTracker::new(store.db.clone()).start().await.unwrap();

        handle.transition(LifecycleState::Terminated).await.unwrap();
        let err = handle
            .transition(LifecycleState::Foreground)
            .await
            .unwrap_err();
        assert!(matches!(err, LifelineError::Lifecycle(_)));
        assert_eq!(handle.current(), LifecycleState::Terminated);
    }

    #[tokio::test]
    async fn repeated_report_is_unchanged() {
        let store = TestStore::new().await.unwrap();
        let (handle, _task) = LifecycleTracker::new(store.db.clone()).start().await.unwrap();

        let outcome = handle.transition(LifecycleState::Foreground).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Unchanged(LifecycleState::Foreground));
    }

    #[tokio::test]
    async fn new_instance_after_termination_starts_in_foreground() {
        let store = TestStore::new().await.unwrap();
        CredentialCache::new(store.db.clone())
            .set_lifecycle(LifecycleState::Terminated)
            .await
            .unwrap();

        let (handle, _task) = LifecycleTracker::new(store.db.clone()).start().await.unwrap();
        assert_eq!(handle.current(), LifecycleState::Foreground);
    }

    #[tokio::test]
    async fn foreground_refreshes_token_and_surfaces_notices() {
        let store = TestStore::new().await.unwrap();
        let cache = CredentialCache::new(store.db.clone());
        cache
            .set(&SecretString::from("stale".to_string()), "https://api.example")
            .await
            .unwrap();
        notices::record(&store.db, None, NoticeKind::RetryExhausted, Utc::now())
            .await
            .unwrap();

        let session = MockSession::signed_in("stale");
        session.set_refreshed("fresh").await;
        let (handle, _task) = LifecycleTracker::new(store.db.clone())
            .with_session(Arc::new(session.clone()))
            .start()
            .await
            .unwrap();

        handle.transition(LifecycleState::Background).await.unwrap();
        handle.transition(LifecycleState::Foreground).await.unwrap();
        handle.flush().await.unwrap();

        assert_eq!(session.refresh_calls(), 1);
        let snapshot = cache.get().await.unwrap();
        assert_eq!(snapshot.access_token.unwrap().expose_secret(), "fresh");

        let surfaced = handle.notices().borrow().clone();
        assert_eq!(surfaced.len(), 1);
        assert_eq!(surfaced[0].kind, NoticeKind::RetryExhausted);
    }
}
