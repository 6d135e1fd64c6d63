//! Process-wide gateway state
//!
//! The backend health bit and the boot-request flag live behind one mutex so
//! that a recovery reset and a boot claim can never interleave. Readers always
//! get a copied snapshot.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Backend reachability as last observed by the health monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    pub reachable: bool,
    /// When `reachable` last flipped (startup time if it never has)
    pub last_changed_at: DateTime<Utc>,
}

/// Whether a wake call has been claimed in the current down-period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootRequestState {
    pub requested: bool,
}

/// A flip of the health bit, returned for logging
#[derive(Debug, Clone, Copy)]
pub struct HealthTransition {
    pub reachable: bool,
    pub at: DateTime<Utc>,
    /// How long the previous state lasted
    pub previous_duration: chrono::Duration,
}

/// Result of trying to claim the boot request for this down-period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootClaim {
    /// The caller owns the wake call for this down-period
    Claimed,
    /// Someone already claimed it
    AlreadyRequested,
    /// The backend is up, there is nothing to wake
    BackendReachable,
}

#[derive(Debug)]
struct Inner {
    health: HealthState,
    boot: BootRequestState,
}

/// Shared state owned by the gateway.
///
/// Only the health monitor calls [`record_probe`](GatewayState::record_probe);
/// only the boot gate calls [`claim_boot`](GatewayState::claim_boot).
#[derive(Debug)]
pub struct GatewayState {
    inner: Mutex<Inner>,
    health_tx: watch::Sender<bool>,
}

impl GatewayState {
    /// Create the state. The backend starts out assumed unreachable.
    pub fn new() -> Arc<Self> {
        let (health_tx, _) = watch::channel(false);
        Arc::new(Self {
            inner: Mutex::new(Inner {
                health: HealthState {
                    reachable: false,
                    last_changed_at: Utc::now(),
                },
                boot: BootRequestState::default(),
            }),
            health_tx,
        })
    }

    pub fn health(&self) -> HealthState {
        self.inner.lock().health
    }

    pub fn is_reachable(&self) -> bool {
        self.inner.lock().health.reachable
    }

    pub fn boot_request(&self) -> BootRequestState {
        self.inner.lock().boot
    }

    /// Watch the health bit. The receiver sees every flip.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.health_tx.subscribe()
    }

    /// Record one probe result. Returns the transition if the bit flipped.
    pub fn record_probe(&self, reachable: bool) -> Option<HealthTransition> {
        self.record_probe_at(reachable, Utc::now())
    }

    fn record_probe_at(&self, reachable: bool, now: DateTime<Utc>) -> Option<HealthTransition> {
        let transition = {
            let mut inner = self.inner.lock();
            if inner.health.reachable == reachable {
                return None;
            }

            let previous_duration = now - inner.health.last_changed_at;
            inner.health = HealthState {
                reachable,
                last_changed_at: now,
            };
            if reachable {
                // Recovery ends the down-period
                inner.boot.requested = false;
            }

            HealthTransition {
                reachable,
                at: now,
                previous_duration,
            }
        };

        self.health_tx.send_replace(reachable);
        Some(transition)
    }

    /// Atomically claim the wake call for the current down-period
    pub fn claim_boot(&self) -> BootClaim {
        let mut inner = self.inner.lock();
        if inner.health.reachable {
            return BootClaim::BackendReachable;
        }
        if inner.boot.requested {
            return BootClaim::AlreadyRequested;
        }
        inner.boot.requested = true;
        BootClaim::Claimed
    }
}
