// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adaptive per-sender throughput control.
//!
//! The target rate drops multiplicatively on a throttle signal and climbs
//! additively after stable batches. Increases are gated twice: not before
//! the cooldown set by the last decrease has passed, and not sooner than
//! `min_increase_gap_secs` after the previous increase.
//!
//! Mutations for one sender are serialized by a per-sender lock and always
//! read the persisted state first, so an operator reset from another
//! process is picked up by the next batch.

use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wacast_config::model::ThrottleConfig;
use wacast_core::{
    DispatchEvent, EventSinks, RateChangeReason, ThrottleState, ThrottleStore, WacastError,
};

/// Current pacing target for a sender.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateTarget {
    pub rate: f64,
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// A rate decrease or reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateChange {
    pub previous: f64,
    pub next: f64,
}

/// Result of reporting a stable batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateIncrease {
    pub changed: bool,
    pub previous: f64,
    pub next: f64,
}

pub struct RateController {
    config: ThrottleConfig,
    store: Arc<dyn ThrottleStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    sinks: EventSinks,
}

impl RateController {
    pub fn new(config: ThrottleConfig, store: Arc<dyn ThrottleStore>, sinks: EventSinks) -> Self {
        Self {
            config,
            store,
            locks: DashMap::new(),
            sinks,
        }
    }

    fn lock_for(&self, sender_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(sender_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn clamp(&self, rate: f64) -> f64 {
        rate.clamp(self.config.min_rate, self.config.max_rate)
    }

    async fn load(&self, sender_id: &str) -> Result<ThrottleState, WacastError> {
        let mut state = self
            .store
            .load_throttle(sender_id)
            .await?
            .unwrap_or_else(|| ThrottleState::initial(sender_id, self.config.start_rate));
        state.target_rate = self.clamp(state.target_rate);
        Ok(state)
    }

    pub async fn get_target(&self, sender_id: &str) -> Result<RateTarget, WacastError> {
        let state = self.load(sender_id).await?;
        Ok(RateTarget {
            rate: state.target_rate,
            cooldown_until: state.cooldown_until,
        })
    }

    /// A pacer for one batch at the sender's current target.
    ///
    /// Falls back to `min_rate` when the stored state cannot be read.
    pub async fn pacer(&self, sender_id: &str) -> Pacer {
        match self.get_target(sender_id).await {
            Ok(target) => Pacer::new(target.rate),
            Err(e) => {
                warn!(sender_id, error = %e, "throttle state unavailable; pacing at min rate");
                Pacer::new(self.config.min_rate)
            }
        }
    }

    pub async fn record_throughput_exceeded(
        &self,
        sender_id: &str,
    ) -> Result<RateChange, WacastError> {
        self.record_throughput_exceeded_at(sender_id, Utc::now()).await
    }

    pub async fn record_throughput_exceeded_at(
        &self,
        sender_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RateChange, WacastError> {
        let lock = self.lock_for(sender_id);
        let _guard = lock.lock().await;

        let mut state = self.load(sender_id).await?;
        let previous = state.target_rate;
        let next = self.clamp(previous * self.config.decrease_factor);
        state.target_rate = next;
        state.cooldown_until = Some(now + secs(self.config.cooldown_secs));
        state.last_decrease_at = Some(now);
        self.store.save_throttle(&state).await?;

        warn!(sender_id, previous, next, "throughput exceeded; target rate lowered");
        self.sinks
            .emit(DispatchEvent::RateChanged {
                sender_id: sender_id.to_string(),
                previous,
                next,
                reason: RateChangeReason::Throttled,
            })
            .await;
        Ok(RateChange { previous, next })
    }

    pub async fn record_stable_batch(&self, sender_id: &str) -> Result<RateIncrease, WacastError> {
        self.record_stable_batch_at(sender_id, Utc::now()).await
    }

    pub async fn record_stable_batch_at(
        &self,
        sender_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RateIncrease, WacastError> {
        let lock = self.lock_for(sender_id);
        let _guard = lock.lock().await;

        let mut state = self.load(sender_id).await?;
        let previous = state.target_rate;
        let unchanged = RateIncrease {
            changed: false,
            previous,
            next: previous,
        };

        if state.cooldown_until.is_some_and(|until| now < until) {
            debug!(sender_id, "increase held: cooling down");
            return Ok(unchanged);
        }
        let gap = secs(self.config.min_increase_gap_secs);
        if state.last_increase_at.is_some_and(|at| now - at < gap) {
            debug!(sender_id, "increase held: minimum gap");
            return Ok(unchanged);
        }
        if previous >= self.config.max_rate {
            return Ok(unchanged);
        }

        let next = self.clamp(previous + self.config.increase_step);
        state.target_rate = next;
        state.last_increase_at = Some(now);
        self.store.save_throttle(&state).await?;

        debug!(sender_id, previous, next, "target rate raised");
        self.sinks
            .emit(DispatchEvent::RateChanged {
                sender_id: sender_id.to_string(),
                previous,
                next,
                reason: RateChangeReason::Stable,
            })
            .await;
        Ok(RateIncrease {
            changed: true,
            previous,
            next,
        })
    }

    /// Operator reset back to `start_rate` with no history.
    pub async fn reset(&self, sender_id: &str) -> Result<RateChange, WacastError> {
        let lock = self.lock_for(sender_id);
        let _guard = lock.lock().await;

        let previous = self.load(sender_id).await?.target_rate;
        let state = ThrottleState::initial(sender_id, self.clamp(self.config.start_rate));
        let next = state.target_rate;
        self.store.save_throttle(&state).await?;

        info!(sender_id, previous, next, "throttle state reset");
        self.sinks
            .emit(DispatchEvent::RateChanged {
                sender_id: sender_id.to_string(),
                previous,
                next,
                reason: RateChangeReason::Reset,
            })
            .await;
        Ok(RateChange { previous, next })
    }
}

fn secs(n: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Evenly spaced send slots at a fixed rate.
///
/// Shared by the workers of one batch: each `wait` reserves the next slot
/// and sleeps until it. The rate can be lowered mid-batch after a throttle
/// signal; slots already handed out are kept.
#[derive(Debug)]
pub struct Pacer {
    inner: std::sync::Mutex<PacerState>,
}

#[derive(Debug)]
struct PacerState {
    interval: Duration,
    next_slot: Option<Instant>,
}

fn interval_for(rate: f64) -> Duration {
    if rate.is_finite() && rate > 0.0 {
        Duration::from_secs_f64(1.0 / rate)
    } else {
        Duration::ZERO
    }
}

impl Pacer {
    pub fn new(rate: f64) -> Self {
        Self {
            inner: std::sync::Mutex::new(PacerState {
                interval: interval_for(rate),
                next_slot: None,
            }),
        }
    }

    /// The state survives a worker panic; pacing must not stop with it.
    fn state(&self) -> MutexGuard<'_, PacerState> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("pacer lock poisoned; recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Spacing between consecutive slots.
    pub fn interval(&self) -> Duration {
        self.state().interval
    }

    pub fn set_rate(&self, rate: f64) {
        self.state().interval = interval_for(rate);
    }

    /// Wait for the next free send slot.
    pub async fn wait(&self) {
        let slot = {
            let mut state = self.state();
            let now = Instant::now();
            let slot = state.next_slot.map_or(now, |next| next.max(now));
            state.next_slot = Some(slot + state.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::storage;
    use chrono::Duration as ChronoDuration;

    fn config() -> ThrottleConfig {
        ThrottleConfig {
            start_rate: 30.0,
            min_rate: 5.0,
            max_rate: 80.0,
            increase_step: 5.0,
            decrease_factor: 0.5,
            cooldown_secs: 60,
            min_increase_gap_secs: 30,
        }
    }

    async fn controller() -> (RateController, tempfile::TempDir) {
        let (store, dir) = storage().await;
        (RateController::new(config(), store, EventSinks::new()), dir)
    }

    #[tokio::test]
    async fn unknown_sender_starts_at_start_rate() {
        let (rate, _dir) = controller().await;
        let target = rate.get_target("pn-1").await.unwrap();
        assert_eq!(target.rate, 30.0);
        assert!(target.cooldown_until.is_none());
    }

    #[tokio::test]
    async fn throttle_halves_and_sets_cooldown() {
        let (rate, _dir) = controller().await;
        let now = Utc::now();
        let change = rate.record_throughput_exceeded_at("pn-1", now).await.unwrap();
        assert_eq!(change, RateChange { previous: 30.0, next: 15.0 });

        let target = rate.get_target("pn-1").await.unwrap();
        assert_eq!(target.rate, 15.0);
        let cooldown = target.cooldown_until.unwrap() - now;
        assert!((cooldown.num_seconds() - 60).abs() <= 1);
    }

    #[tokio::test]
    async fn decreases_floor_at_min_rate() {
        let (rate, _dir) = controller().await;
        let now = Utc::now();
        for _ in 0..5 {
            rate.record_throughput_exceeded_at("pn-1", now).await.unwrap();
        }
        assert_eq!(rate.get_target("pn-1").await.unwrap().rate, 5.0);
    }

    #[tokio::test]
    async fn stable_batches_climb_to_max_respecting_gap() {
        let (rate, _dir) = controller().await;
        let mut now = Utc::now();

        let first = rate.record_stable_batch_at("pn-1", now).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.next, 35.0);
        let mut last = first.next;

        // Too soon after the increase.
        let again = rate
            .record_stable_batch_at("pn-1", now + ChronoDuration::seconds(5))
            .await
            .unwrap();
        assert!(!again.changed);

        for _ in 0..20 {
            now += ChronoDuration::seconds(31);
            let step = rate.record_stable_batch_at("pn-1", now).await.unwrap();
            assert!(step.next <= 80.0);
            if step.changed {
                assert!(step.next > last);
                last = step.next;
            }
        }
        assert_eq!(last, 80.0);
        assert_eq!(rate.get_target("pn-1").await.unwrap().rate, 80.0);
    }

    #[tokio::test]
    async fn cooldown_blocks_increases() {
        let (rate, _dir) = controller().await;
        let now = Utc::now();
        rate.record_throughput_exceeded_at("pn-1", now).await.unwrap();

        let during = rate
            .record_stable_batch_at("pn-1", now + ChronoDuration::seconds(30))
            .await
            .unwrap();
        assert!(!during.changed);

        let after = rate
            .record_stable_batch_at("pn-1", now + ChronoDuration::seconds(61))
            .await
            .unwrap();
        assert!(after.changed);
        assert_eq!(after.next, 20.0);
    }

    #[tokio::test]
    async fn reset_restores_start_rate() {
        let (rate, _dir) = controller().await;
        rate.record_throughput_exceeded("pn-1").await.unwrap();
        let change = rate.reset("pn-1").await.unwrap();
        assert_eq!(change, RateChange { previous: 15.0, next: 30.0 });
        let target = rate.get_target("pn-1").await.unwrap();
        assert!(target.cooldown_until.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_spaces_slots_at_rate() {
        let pacer = Pacer::new(10.0);
        assert_eq!(pacer.interval(), Duration::from_millis(100));
        let start = Instant::now();
        for _ in 0..5 {
            pacer.wait().await;
        }
        // First slot is immediate, then four 100ms gaps.
        assert_eq!(start.elapsed(), Duration::from_millis(400));

        pacer.set_rate(5.0);
        assert_eq!(pacer.interval(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_keeps_pacing_after_a_panicking_holder() {
        let pacer = Arc::new(Pacer::new(10.0));
        let holder = pacer.clone();
        let joined = std::thread::spawn(move || {
            let _state = holder.inner.lock().unwrap();
            panic!("worker died mid-slot");
        })
        .join();
        assert!(joined.is_err());
        assert!(pacer.inner.is_poisoned());

        let start = Instant::now();
        for _ in 0..3 {
            pacer.wait().await;
        }
        assert_eq!(start.elapsed(), Duration::from_millis(200));
        assert_eq!(pacer.interval(), Duration::from_millis(100));
    }
}
