// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trigger detection.
//!
//! [`GestureRecognizer`] turns a stream of sensor sub-events (presses,
//! shakes) into recognized gestures. [`TriggerSource`] stamps a recognized
//! gesture into a [`TriggerEvent`] with the lifecycle state read from the
//! credential cache, so it works the same in the background worker.
//! [`TriggerService`] glues both to the relay.

use std::sync::Arc;
use std::time::Duration;

use lifeline_config::model::TriggerConfig;
use lifeline_core::{DeliveryAttempt, GeoPoint, LifecycleState, TriggerEvent, TriggerKind};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credential::CredentialCache;
use crate::relay::EmergencyRelay;

/// Gesture recognition parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureConfig {
    pub sub_events_required: u32,
    /// Sub-events closer than this to the previous accepted one are ignored.
    pub min_quiet_interval: Duration,
    /// The whole sequence must fit in this window or it restarts.
    pub gesture_window: Duration,
    /// After a recognized gesture, sub-events are ignored for this long.
    pub cooldown: Duration,
}

impl GestureConfig {
    pub fn from_config(config: &TriggerConfig) -> Self {
        Self {
            sub_events_required: config.sub_events_required.max(1),
            min_quiet_interval: Duration::from_millis(config.min_quiet_interval_ms),
            gesture_window: Duration::from_millis(config.gesture_window_ms),
            cooldown: Duration::from_millis(config.cooldown_ms),
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self::from_config(&TriggerConfig::default())
    }
}

/// Debounced multi-press gesture recognizer.
#[derive(Debug)]
pub struct GestureRecognizer {
    config: GestureConfig,
    count: u32,
    first: Option<Instant>,
    last: Option<Instant>,
    cooldown_until: Option<Instant>,
}

impl GestureRecognizer {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            count: 0,
            first: None,
            last: None,
            cooldown_until: None,
        }
    }

    /// Feed one sub-event observed at `at`. Returns `true` when it completes
    /// a gesture.
    pub fn observe(&mut self, at: Instant) -> bool {
        if let Some(until) = self.cooldown_until {
            if at < until {
                return false;
            }
            self.cooldown_until = None;
        }

        if let Some(last) = self.last {
            if at.saturating_duration_since(last) < self.config.min_quiet_interval {
                return false;
            }
        }

        if let Some(first) = self.first {
            if at.saturating_duration_since(first) > self.config.gesture_window {
                self.reset();
            }
        }

        if self.count == 0 {
            self.first = Some(at);
        }
        self.count += 1;
        self.last = Some(at);

        if self.count >= self.config.sub_events_required {
            self.reset();
            self.cooldown_until = Some(at + self.config.cooldown);
            return true;
        }
        false
    }

    /// Drop any partial sequence. The cooldown is kept.
    pub fn reset(&mut self) {
        self.count = 0;
        self.first = None;
        self.last = None;
    }

    /// Sub-events counted toward the current sequence.
    pub fn progress(&self) -> u32 {
        self.count
    }
}

/// Builds trigger events stamped with the stored lifecycle state.
#[derive(Debug, Clone)]
pub struct TriggerSource {
    cache: CredentialCache,
}

impl TriggerSource {
    pub fn new(cache: CredentialCache) -> Self {
        Self { cache }
    }

    /// Create the event for a detected emergency. Never fails: an unreadable
    /// lifecycle state is logged and reported as `Foreground`.
    pub async fn on_gesture(&self, kind: TriggerKind, location: Option<GeoPoint>) -> TriggerEvent {
        let state = match self.cache.lifecycle().await {
            Ok(state) => state.unwrap_or(LifecycleState::Foreground),
            Err(e) => {
                warn!(error = %e, "could not read lifecycle state; assuming foreground");
                LifecycleState::Foreground
            }
        };
        let event = TriggerEvent::new(kind, state, location);
        info!(
            trigger_id = %event.trigger_id,
            kind = %kind,
            lifecycle = %state,
            "emergency trigger detected"
        );
        event
    }
}

/// Input to [`TriggerService`].
#[derive(Debug, Clone)]
pub enum SensorEvent {
    /// One press or shake; fed to the gesture recognizer.
    SubEvent {
        at: Instant,
        location: Option<GeoPoint>,
    },
    /// A complete detection from another detector (SOS button, motion
    /// classifier, voice keyword).
    Detected {
        kind: TriggerKind,
        location: Option<GeoPoint>,
        event_type: Option<String>,
    },
}

/// Consumes sensor events and hands recognized triggers to the relay.
pub struct TriggerService {
    recognizer: GestureRecognizer,
    source: TriggerSource,
    relay: Arc<EmergencyRelay>,
}

impl TriggerService {
    pub fn new(config: GestureConfig, source: TriggerSource, relay: Arc<EmergencyRelay>) -> Self {
        Self {
            recognizer: GestureRecognizer::new(config),
            source,
            relay,
        }
    }

    /// Run until the channel closes or `cancel` fires, then wait for every
    /// send already started. Sends are never aborted.
    ///
    /// Returns the final attempt of every trigger raised.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<SensorEvent>,
        cancel: CancellationToken,
    ) -> Vec<DeliveryAttempt> {
        let mut sends = JoinSet::new();
        let mut finished = Vec::new();

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if let Some(trigger) = self.handle(event).await {
                        let relay = self.relay.clone();
                        sends.spawn(async move { relay.send(trigger).await });
                    }
                }
                Some(joined) = sends.join_next(), if !sends.is_empty() => {
                    collect(joined, &mut finished);
                }
                _ = cancel.cancelled() => {
                    debug!("trigger service cancelled");
                    break;
                }
            }
        }

        while let Some(joined) = sends.join_next().await {
            collect(joined, &mut finished);
        }
        finished
    }

    async fn handle(&mut self, event: SensorEvent) -> Option<TriggerEvent> {
        match event {
            SensorEvent::SubEvent { at, location } => {
                if !self.recognizer.observe(at) {
                    debug!(progress = self.recognizer.progress(), "gesture sub-event");
                    return None;
                }
                Some(self.source.on_gesture(TriggerKind::Gesture, location).await)
            }
            SensorEvent::Detected {
                kind,
                location,
                event_type,
            } => {
                let trigger = self.source.on_gesture(kind, location).await;
                Some(match event_type {
                    Some(detail) => trigger.with_event_type(detail),
                    None => trigger,
                })
            }
        }
    }
}

fn collect(
    joined: Result<DeliveryAttempt, tokio::task::JoinError>,
    finished: &mut Vec<DeliveryAttempt>,
) {
    match joined {
        Ok(attempt) => finished.push(attempt),
        Err(e) => warn!(error = %e, "trigger send task failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GestureConfig {
        GestureConfig::default()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn three_spaced_presses_make_a_gesture() {
        let mut r = GestureRecognizer::new(config());
        let t0 = Instant::now();
        assert!(!r.observe(t0));
        assert!(!r.observe(t0 + ms(400)));
        assert!(r.observe(t0 + ms(800)));
        assert_eq!(r.progress(), 0);
    }

    #[test]
    fn bounce_inside_quiet_interval_is_ignored() {
        let mut r = GestureRecognizer::new(config());
        let t0 = Instant::now();
        assert!(!r.observe(t0));
        assert!(!r.observe(t0 + ms(50)), "contact bounce");
        assert!(!r.observe(t0 + ms(100)), "contact bounce");
        assert_eq!(r.progress(), 1);
        assert!(!r.observe(t0 + ms(400)));
        assert!(r.observe(t0 + ms(800)));
    }

    #[test]
    fn slow_sequence_restarts() {
        let mut r = GestureRecognizer::new(config());
        let t0 = Instant::now();
        r.observe(t0);
        r.observe(t0 + ms(1_500));
        // Outside the 3 s window measured from the first press.
        assert!(!r.observe(t0 + ms(3_500)));
        assert_eq!(r.progress(), 1);
        assert!(!r.observe(t0 + ms(4_000)));
        assert!(r.observe(t0 + ms(4_500)));
    }

    #[test]
    fn cooldown_suppresses_follow_up_presses() {
        let mut r = GestureRecognizer::new(config());
        let t0 = Instant::now();
        r.observe(t0);
        r.observe(t0 + ms(400));
        assert!(r.observe(t0 + ms(800)));

        for i in 1..=6 {
            assert!(!r.observe(t0 + ms(800 + i * 400)), "inside cooldown");
        }
        let after = t0 + ms(800 + 5_000);
        assert!(!r.observe(after));
        assert!(!r.observe(after + ms(400)));
        assert!(r.observe(after + ms(800)));
    }
}
