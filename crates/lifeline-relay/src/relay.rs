// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The emergency relay: gets a trigger from detection to server acknowledgment.
//!
//! Every attempt follows the same sequence:
//! 1. Claim the trigger's row (durable write, before any network I/O)
//! 2. Re-read the credential snapshot
//! 3. Submit with a bounded request timeout
//! 4. Record the outcome: acknowledged, failed, or released back to
//!    `pending` with the next retry time
//!
//! Failures never escape [`EmergencyRelay::send`]; they end up in the
//! returned [`DeliveryAttempt`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lifeline_config::model::RelayConfig;
use lifeline_core::{
    DeliveryAttempt, DeliveryError, DeliveryOutcome, ExecutionContext, FailureKind,
    IngestionClient, LifelineError, NoticeKind, TriggerEvent,
};
use lifeline_storage::queries::{alerts, attempts, notices};
use lifeline_storage::Database;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::credential::CredentialCache;

/// Maximum rows picked up by one resume pass.
const RESUME_BATCH: usize = 64;

/// Tunables for [`EmergencyRelay`].
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub policy: BackoffPolicy,
    /// Upper bound for one submit, distinct from the overall retry budget.
    pub request_timeout: Duration,
    /// Extra lease time beyond the request timeout before a claim counts as
    /// abandoned.
    pub lease_margin: Duration,
    /// Terminal rows kept after pruning.
    pub retain_completed: usize,
}

impl RelayOptions {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            policy: BackoffPolicy::from_config(config),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            lease_margin: Duration::from_secs(config.lease_margin_secs),
            retain_completed: config.retain_completed as usize,
        }
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

/// Sends trigger events to the ingestion endpoint with durable retry.
pub struct EmergencyRelay {
    db: Database,
    credentials: CredentialCache,
    client: Arc<dyn IngestionClient>,
    context: ExecutionContext,
    options: RelayOptions,
}

impl EmergencyRelay {
    pub fn new(
        db: Database,
        client: Arc<dyn IngestionClient>,
        context: ExecutionContext,
        options: RelayOptions,
    ) -> Self {
        Self {
            credentials: CredentialCache::new(db.clone()),
            db,
            client,
            context,
            options,
        }
    }

    /// The execution context this relay claims rows as.
    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    /// Deliver `event`, retrying until acknowledged, failed, or handed off.
    ///
    /// Without a usable credential nothing is sent: the row is recorded as
    /// failed with `NoCredential`, a local alert is raised, and a notice is
    /// left for the next foreground. A row claimed by the other execution
    /// context is returned as-is; that context finishes it.
    pub async fn send(&self, event: TriggerEvent) -> DeliveryAttempt {
        let trigger_id = event.trigger_id;
        match self.try_send(&event).await {
            Ok(attempt) => {
                info!(
                    trigger_id = %trigger_id,
                    attempt = attempt.attempt_number,
                    outcome = %attempt.outcome,
                    "send finished"
                );
                attempt
            }
            Err(e) => {
                error!(trigger_id = %trigger_id, error = %e, "relay storage failure");
                self.storage_failure(&event).await
            }
        }
    }

    /// Continue delivering an already recorded trigger once it is due.
    ///
    /// Used by the background worker and by resume passes; respects the
    /// stored retry schedule.
    pub async fn resume(&self, event: TriggerEvent) -> DeliveryAttempt {
        let trigger_id = event.trigger_id;
        match self.drive(&event, true).await {
            Ok(attempt) => attempt,
            Err(e) => {
                error!(trigger_id = %trigger_id, error = %e, "relay storage failure during resume");
                self.storage_failure(&event).await
            }
        }
    }

    /// Drive every due row that nobody holds (or whose lease expired).
    ///
    /// Returns the attempts this pass touched, in the order they finished
    /// their drive.
    pub async fn resume_pending(&self) -> Result<Vec<DeliveryAttempt>, LifelineError> {
        let now = Utc::now();
        let due = attempts::list_due(&self.db, now, now, RESUME_BATCH).await?;
        if due.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = due.len(), context = %self.context, "resuming pending deliveries");
        let drives = due.into_iter().map(|event| self.resume(event));
        Ok(futures::future::join_all(drives).await)
    }

    async fn try_send(&self, event: &TriggerEvent) -> Result<DeliveryAttempt, LifelineError> {
        let snapshot = self.credentials.get().await?;
        if snapshot.usable().is_none() {
            return self.fail_closed(event).await;
        }

        if attempts::record(&self.db, event, Utc::now()).await? {
            debug!(trigger_id = %event.trigger_id, kind = %event.kind, "trigger recorded");
            self.prune().await;
        } else {
            debug!(trigger_id = %event.trigger_id, "trigger already recorded");
        }

        self.drive(event, false).await
    }

    /// The attempt loop. `respect_schedule` only governs the first claim;
    /// afterwards this context owns the schedule and waits it out itself.
    async fn drive(
        &self,
        event: &TriggerEvent,
        mut respect_schedule: bool,
    ) -> Result<DeliveryAttempt, LifelineError> {
        let trigger_id = event.trigger_id;
        loop {
            let now = Utc::now();
            let lease_until = after(now, self.options.request_timeout + self.options.lease_margin);
            let claimed = attempts::claim(
                &self.db,
                trigger_id,
                self.context,
                now,
                lease_until,
                respect_schedule,
            )
            .await?;
            let Some(claimed) = claimed else {
                debug!(trigger_id = %trigger_id, "row not claimable here; leaving it to its holder");
                return self.current(trigger_id).await;
            };
            respect_schedule = false;
            let attempt = claimed.attempt_number;

            // A failed credential read is a local fault, not a delivery
            // outcome: the row stays `sent` until its lease lapses and any
            // context may reclaim it.
            let result = self.attempt_once(event, attempt).await?;
            match result {
                Ok(ack) => {
                    attempts::acknowledge(&self.db, trigger_id, ack.server_event_id, Utc::now())
                        .await?;
                    info!(
                        trigger_id = %trigger_id,
                        attempt,
                        server_event_id = ack.server_event_id,
                        "trigger acknowledged"
                    );
                    return self.current(trigger_id).await;
                }
                Err(err) if !err.kind.is_retryable() => {
                    warn!(trigger_id = %trigger_id, attempt, failure = %err.kind, error = %err.message, "delivery failed");
                    return self.finish_failed(event, err.kind).await;
                }
                Err(err) if self.options.policy.is_exhausted(attempt) => {
                    warn!(
                        trigger_id = %trigger_id,
                        attempt,
                        last_failure = %err.kind,
                        "retry budget exhausted"
                    );
                    return self.finish_failed(event, FailureKind::RetryExhausted).await;
                }
                Err(err) => {
                    let delay = self.options.policy.delay(attempt);
                    let now = Utc::now();
                    let released = attempts::release(
                        &self.db,
                        trigger_id,
                        self.context,
                        err.kind,
                        after(now, delay),
                        now,
                    )
                    .await?;
                    if !released {
                        warn!(trigger_id = %trigger_id, attempt, "claim lost before release");
                        return self.current(trigger_id).await;
                    }
                    debug!(
                        trigger_id = %trigger_id,
                        attempt,
                        failure = %err.kind,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retry scheduled"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt_once(
        &self,
        event: &TriggerEvent,
        attempt: u32,
    ) -> Result<Result<lifeline_core::IngestionAck, DeliveryError>, LifelineError> {
        // Re-read every attempt so a token re-mirrored between attempts is used.
        let snapshot = self.credentials.get().await?;
        let Some((token, base_url)) = snapshot.usable() else {
            return Ok(Err(DeliveryError::new(
                FailureKind::NoCredential,
                "credential cleared between attempts",
            )));
        };

        debug!(trigger_id = %event.trigger_id, attempt, context = %self.context, "submitting trigger");
        Ok(match tokio::time::timeout(
            self.options.request_timeout,
            self.client.submit(base_url, token, event),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::new(
                FailureKind::NetworkUnavailable,
                format!("no response within {:?}", self.options.request_timeout),
            )),
        })
    }

    async fn fail_closed(&self, event: &TriggerEvent) -> Result<DeliveryAttempt, LifelineError> {
        warn!(
            trigger_id = %event.trigger_id,
            kind = %event.kind,
            "no credential; raising local alert instead of sending"
        );
        if !attempts::record_failed(&self.db, event, FailureKind::NoCredential, Utc::now()).await? {
            return self.current(event.trigger_id).await;
        }
        self.raise_local_alert(event, FailureKind::NoCredential).await?;
        notices::record(
            &self.db,
            Some(event.trigger_id),
            NoticeKind::NoCredential,
            Utc::now(),
        )
        .await?;
        self.current(event.trigger_id).await
    }

    async fn finish_failed(
        &self,
        event: &TriggerEvent,
        kind: FailureKind,
    ) -> Result<DeliveryAttempt, LifelineError> {
        if !attempts::fail(&self.db, event.trigger_id, self.context, kind, Utc::now()).await? {
            warn!(trigger_id = %event.trigger_id, failure = %kind, "claim lost before fail");
            return self.current(event.trigger_id).await;
        }
        if kind == FailureKind::NoCredential {
            self.raise_local_alert(event, kind).await?;
        }
        if let Some(notice) = NoticeKind::for_failure(kind) {
            notices::record(&self.db, Some(event.trigger_id), notice, Utc::now()).await?;
        }
        self.current(event.trigger_id).await
    }

    async fn raise_local_alert(
        &self,
        event: &TriggerEvent,
        reason: FailureKind,
    ) -> Result<(), LifelineError> {
        let id = alerts::record(&self.db, event.trigger_id, event.kind, reason, Utc::now()).await?;
        warn!(
            trigger_id = %event.trigger_id,
            alert_id = id,
            kind = %event.kind,
            reason = %reason,
            "local alert raised"
        );
        Ok(())
    }

    async fn current(&self, trigger_id: uuid::Uuid) -> Result<DeliveryAttempt, LifelineError> {
        attempts::get(&self.db, trigger_id)
            .await?
            .ok_or_else(|| LifelineError::Internal(format!("delivery row {trigger_id} vanished")))
    }

    async fn prune(&self) {
        match attempts::prune_completed(&self.db, self.options.retain_completed).await {
            Ok(0) => {}
            Ok(n) => debug!(deleted = n, "pruned completed delivery rows"),
            Err(e) => warn!(error = %e, "failed to prune delivery rows"),
        }
    }

    /// Last resort when bookkeeping itself fails: try to leave a local alert
    /// and report a failed attempt without touching the delivery log.
    async fn storage_failure(&self, event: &TriggerEvent) -> DeliveryAttempt {
        if let Err(e) = self.raise_local_alert(event, FailureKind::LocalStorage).await {
            error!(trigger_id = %event.trigger_id, error = %e, "could not record local alert");
        }
        let now = Utc::now();
        DeliveryAttempt {
            trigger_id: event.trigger_id,
            attempt_number: 0,
            outcome: DeliveryOutcome::Failed,
            next_retry_at: None,
            server_event_id: None,
            failure: Some(FailureKind::LocalStorage),
            owner: Some(self.context),
            lease_until: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_core::{LifecycleState, TriggerKind};
    use lifeline_storage::queries::kv;
    use lifeline_test_utils::{MockIngestion, TestStore};
    use secrecy::SecretString;
    use tracing_test::traced_test;

    fn options(store: &TestStore) -> RelayOptions {
        RelayOptions::from_config(&store.config.relay)
    }

    async fn signed_in(store: &TestStore) {
        kv::store_credential(&store.db, "tok", "https://api.example")
            .await
            .unwrap();
    }

    fn manual() -> TriggerEvent {
        TriggerEvent::new(TriggerKind::Manual, LifecycleState::Foreground, None)
    }

    #[tokio::test]
    async fn acknowledged_in_one_attempt() {
        let store = TestStore::new().await.unwrap();
        signed_in(&store).await;
        let mock = MockIngestion::new();
        let relay = EmergencyRelay::new(
            store.db.clone(),
            Arc::new(mock.clone()),
            ExecutionContext::Main,
            options(&store),
        );

        let attempt = relay.send(manual()).await;
        assert_eq!(attempt.outcome, DeliveryOutcome::Acknowledged);
        assert_eq!(attempt.attempt_number, 1);
        assert!(attempt.server_event_id.is_some());
        assert_eq!(mock.call_count().await, 1);
        assert_eq!(attempts::count_open(&store.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejected_event_is_not_retried() {
        let store = TestStore::new().await.unwrap();
        signed_in(&store).await;
        let mock = MockIngestion::failing(FailureKind::ServerRejected, 1);
        let relay = EmergencyRelay::new(
            store.db.clone(),
            Arc::new(mock.clone()),
            ExecutionContext::Main,
            options(&store),
        );

        let ev = manual();
        let attempt = relay.send(ev.clone()).await;
        assert_eq!(attempt.outcome, DeliveryOutcome::Failed);
        assert_eq!(attempt.failure, Some(FailureKind::ServerRejected));
        assert_eq!(mock.call_count().await, 1);

        let active = notices::list_active(&store.db).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, NoticeKind::ServerRejected);
        assert_eq!(active[0].trigger_id, Some(ev.trigger_id));
    }

    #[tokio::test]
    #[traced_test]
    async fn failures_are_logged_without_the_token() {
        let store = TestStore::new().await.unwrap();
        kv::store_credential(&store.db, "s3cr3t-bearer", "https://api.example")
            .await
            .unwrap();
        let mock = MockIngestion::failing(FailureKind::ServerRejected, 1);
        let relay = EmergencyRelay::new(
            store.db.clone(),
            Arc::new(mock),
            ExecutionContext::Main,
            options(&store),
        );

        relay.send(manual()).await;
        assert!(logs_contain("delivery failed"));
        assert!(!logs_contain("s3cr3t-bearer"));
    }

    #[tokio::test]
    async fn resend_of_acknowledged_trigger_is_a_no_op() {
        let store = TestStore::new().await.unwrap();
        signed_in(&store).await;
        let mock = MockIngestion::new();
        let relay = EmergencyRelay::new(
            store.db.clone(),
            Arc::new(mock.clone()),
            ExecutionContext::Main,
            options(&store),
        );

        let ev = manual();
        let first = relay.send(ev.clone()).await;
        let second = relay.send(ev).await;
        assert_eq!(first.server_event_id, second.server_event_id);
        assert_eq!(second.attempt_number, 1);
        assert_eq!(mock.call_count().await, 1);
    }

    #[tokio::test]
    async fn refreshed_token_is_used_on_next_attempt() {
        let store = TestStore::new().await.unwrap();
        signed_in(&store).await;
        let mock = MockIngestion::failing(FailureKind::Unauthorized, 1);
        let mut opts = options(&store);
        opts.policy.base_delay = Duration::from_millis(300);
        let relay = Arc::new(EmergencyRelay::new(
            store.db.clone(),
            Arc::new(mock.clone()),
            ExecutionContext::Main,
            opts,
        ));

        let sending = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.send(manual()).await })
        };
        // Wait for the first (rejected) attempt, then rotate the token.
        while mock.call_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        relay
            .credentials()
            .mirror_token(&SecretString::from("fresh".to_string()))
            .await
            .unwrap();

        let attempt = sending.await.unwrap();
        assert_eq!(attempt.outcome, DeliveryOutcome::Acknowledged);
        let calls = mock.calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].token, "tok");
        assert_eq!(calls[1].token, "fresh");
    }

    #[tokio::test]
    async fn row_held_elsewhere_is_left_alone() {
        let store = TestStore::new().await.unwrap();
        signed_in(&store).await;
        let mock = MockIngestion::new();
        let relay = EmergencyRelay::new(
            store.db.clone(),
            Arc::new(mock.clone()),
            ExecutionContext::Main,
            options(&store),
        );

        let ev = manual();
        let now = Utc::now();
        attempts::record(&store.db, &ev, now).await.unwrap();
        attempts::claim(
            &store.db,
            ev.trigger_id,
            ExecutionContext::Background,
            now,
            now + chrono::Duration::seconds(60),
            false,
        )
        .await
        .unwrap()
        .unwrap();

        let attempt = relay.send(ev).await;
        assert_eq!(attempt.outcome, DeliveryOutcome::Sent);
        assert_eq!(attempt.owner, Some(ExecutionContext::Background));
        assert_eq!(mock.call_count().await, 0);
    }

    #[test]
    fn after_saturates_instead_of_panicking() {
        let now = Utc::now();
        assert_eq!(after(now, Duration::MAX), now);
        assert_eq!(after(now, Duration::from_secs(1)), now + chrono::Duration::seconds(1));
    }
}
