//! Per-tier circuit breakers.
//!
//! Tracks consecutive failures for every remote tier. A tier's circuit opens
//! once its counter reaches the threshold and closes only on an explicit
//! success signal or a reset. There is no cooldown: state is process-local
//! and a restart starts every tier closed.
//!
//! Each tier has its own lock so signals for unrelated tiers never contend.
//! The registry never fails; a poisoned lock is recovered.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tierwise_core::tier::Tier;
use tracing::{debug, info, warn};

/// Default number of consecutive failures that opens a circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

const CASCADE_LEN: usize = Tier::CASCADE.len();

/// Health state of one tier.
#[derive(Debug, Clone)]
struct CircuitState {
    consecutive_failures: u32,
    open: bool,
    last_transition: DateTime<Utc>,
}

impl CircuitState {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            open: false,
            last_transition: Utc::now(),
        }
    }
}

/// Point-in-time view of one tier's circuit, for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub tier: Tier,
    pub consecutive_failures: u32,
    pub open: bool,
    /// `None` until the tier has received its first signal.
    pub last_transition: Option<DateTime<Utc>>,
}

/// Circuit breakers for the cascade tiers.
///
/// `local` has no breaker: signals for it are ignored and it always reads
/// as closed.
pub struct CircuitBreakerRegistry {
    threshold: u32,
    slots: [Mutex<Option<CircuitState>>; CASCADE_LEN],
}

impl CircuitBreakerRegistry {
    /// Create a registry with the default threshold (3).
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_FAILURE_THRESHOLD)
    }

    /// Create a registry with a custom threshold (clamped to at least 1).
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            slots: std::array::from_fn(|_| Mutex::new(None)),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    fn slot(&self, tier: Tier) -> Option<MutexGuard<'_, Option<CircuitState>>> {
        let pos = tier.cascade_position()?;
        Some(self.slots[pos].lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Record a failed generation on `tier`.
    pub fn record_error(&self, tier: Tier) {
        let Some(mut slot) = self.slot(tier) else {
            return;
        };
        let state = slot.get_or_insert_with(CircuitState::new);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if !state.open && state.consecutive_failures >= self.threshold {
            state.open = true;
            state.last_transition = Utc::now();
            warn!(
                tier = %tier,
                failures = state.consecutive_failures,
                "Circuit opened"
            );
        } else {
            debug!(tier = %tier, failures = state.consecutive_failures, "Failure recorded");
        }
    }

    /// Record a successful generation on `tier`: counter to zero, circuit closed.
    pub fn record_success(&self, tier: Tier) {
        let Some(mut slot) = self.slot(tier) else {
            return;
        };
        let state = slot.get_or_insert_with(CircuitState::new);
        state.consecutive_failures = 0;
        if state.open {
            state.open = false;
            state.last_transition = Utc::now();
            info!(tier = %tier, "Circuit closed after success");
        }
    }

    /// Whether `tier`'s circuit is open. Pure read.
    pub fn is_open(&self, tier: Tier) -> bool {
        self.slot(tier)
            .map(|slot| slot.as_ref().is_some_and(|s| s.open))
            .unwrap_or(false)
    }

    /// Current consecutive-failure count for `tier`.
    pub fn failures(&self, tier: Tier) -> u32 {
        self.slot(tier)
            .and_then(|slot| slot.as_ref().map(|s| s.consecutive_failures))
            .unwrap_or(0)
    }

    /// Forget all state for one tier.
    pub fn reset(&self, tier: Tier) {
        if let Some(mut slot) = self.slot(tier) {
            *slot = None;
            info!(tier = %tier, "Circuit reset");
        }
    }

    /// Forget all state for every tier.
    pub fn reset_all(&self) {
        for tier in Tier::CASCADE {
            if let Some(mut slot) = self.slot(tier) {
                *slot = None;
            }
        }
        info!("All circuits reset");
    }

    /// State of every cascade tier.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        Tier::CASCADE
            .iter()
            .map(|&tier| {
                let state = self.slot(tier).and_then(|slot| (*slot).clone());
                CircuitSnapshot {
                    tier,
                    consecutive_failures: state.as_ref().map_or(0, |s| s.consecutive_failures),
                    open: state.as_ref().is_some_and(|s| s.open),
                    last_transition: state.map(|s| s.last_transition),
                }
            })
            .collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn new_tiers_are_closed() {
        let cb = CircuitBreakerRegistry::new();
        for tier in Tier::ALL {
            assert!(!cb.is_open(tier));
            assert_eq!(cb.failures(tier), 0);
        }
    }

    #[test]
    fn three_errors_open_every_tier() {
        for tier in Tier::CASCADE {
            let cb = CircuitBreakerRegistry::new();
            cb.record_error(tier);
            cb.record_error(tier);
            assert!(!cb.is_open(tier), "{tier} opened too early");
            cb.record_error(tier);
            assert!(cb.is_open(tier), "{tier} should be open");
        }
    }

    #[test]
    fn one_success_closes_and_resets() {
        for tier in Tier::CASCADE {
            let cb = CircuitBreakerRegistry::new();
            for _ in 0..3 {
                cb.record_error(tier);
            }
            cb.record_success(tier);
            assert!(!cb.is_open(tier));
            assert_eq!(cb.failures(tier), 0);
        }
    }

    #[test]
    fn success_resets_counter_below_threshold() {
        let cb = CircuitBreakerRegistry::new();
        cb.record_error(Tier::Large);
        cb.record_error(Tier::Large);
        cb.record_success(Tier::Large);
        cb.record_error(Tier::Large);
        cb.record_error(Tier::Large);
        assert!(!cb.is_open(Tier::Large));
        assert_eq!(cb.failures(Tier::Large), 2);
    }

    #[test]
    fn tiers_are_independent() {
        let cb = CircuitBreakerRegistry::new();
        for _ in 0..3 {
            cb.record_error(Tier::Reasoning);
        }
        assert!(cb.is_open(Tier::Reasoning));
        assert!(!cb.is_open(Tier::Large));
    }

    #[test]
    fn local_tier_has_no_breaker() {
        let cb = CircuitBreakerRegistry::new();
        for _ in 0..10 {
            cb.record_error(Tier::Local);
        }
        assert!(!cb.is_open(Tier::Local));
        assert_eq!(cb.failures(Tier::Local), 0);
    }

    #[test]
    fn reset_all_clears_state() {
        let cb = CircuitBreakerRegistry::new();
        for tier in Tier::CASCADE {
            for _ in 0..3 {
                cb.record_error(tier);
            }
        }
        cb.reset_all();
        assert!(cb.snapshot().iter().all(|s| !s.open && s.consecutive_failures == 0));
        assert!(cb.snapshot().iter().all(|s| s.last_transition.is_none()));
    }

    #[test]
    fn reset_single_tier() {
        let cb = CircuitBreakerRegistry::new();
        for _ in 0..3 {
            cb.record_error(Tier::Micro);
            cb.record_error(Tier::Standard);
        }
        cb.reset(Tier::Micro);
        assert!(!cb.is_open(Tier::Micro));
        assert!(cb.is_open(Tier::Standard));
    }

    #[test]
    fn custom_threshold() {
        let cb = CircuitBreakerRegistry::with_threshold(1);
        cb.record_error(Tier::Standard);
        assert!(cb.is_open(Tier::Standard));

        let clamped = CircuitBreakerRegistry::with_threshold(0);
        assert_eq!(clamped.threshold(), 1);
    }

    #[test]
    fn snapshot_reports_transition_time() {
        let cb = CircuitBreakerRegistry::new();
        cb.record_error(Tier::Large);
        let snap = cb.snapshot();
        assert_eq!(snap.len(), 4);
        let large = snap.iter().find(|s| s.tier == Tier::Large).unwrap();
        assert_eq!(large.consecutive_failures, 1);
        assert!(!large.open);
        assert!(large.last_transition.is_some());
    }

    #[test]
    fn concurrent_errors_are_all_counted() {
        let cb = Arc::new(CircuitBreakerRegistry::with_threshold(1000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = cb.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        cb.record_error(Tier::Reasoning);
                        cb.record_error(Tier::Micro);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cb.failures(Tier::Reasoning), 400);
        assert_eq!(cb.failures(Tier::Micro), 400);
    }
}
