//! Debounced boot requests
//!
//! The first join attempt of a down-period claims the boot request and sends
//! the wake call. Every later attempt in the same down-period is answered from
//! the flag alone. A failed wake call still counts as the period's attempt; the
//! flag only clears when the backend is seen healthy again.

use crate::state::{BootClaim, GatewayState};
use crate::wake::WakeApi;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of [`BootGate::request_boot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// A wake call was already sent this down-period (or the backend is up)
    AlreadyRequested,
    /// This call sent the wake request; `ok` reports whether the panel accepted it
    Dispatched { ok: bool },
}

pub struct BootGate {
    state: Arc<GatewayState>,
    wake: Arc<dyn WakeApi>,
    dispatches: AtomicU64,
}

impl BootGate {
    pub fn new(state: Arc<GatewayState>, wake: Arc<dyn WakeApi>) -> Self {
        Self {
            state,
            wake,
            dispatches: AtomicU64::new(0),
        }
    }

    pub async fn request_boot(&self) -> BootOutcome {
        match self.state.claim_boot() {
            BootClaim::Claimed => {}
            BootClaim::AlreadyRequested => {
                debug!("Boot already requested for this down-period");
                return BootOutcome::AlreadyRequested;
            }
            BootClaim::BackendReachable => {
                debug!("Backend became reachable, skipping wake call");
                return BootOutcome::AlreadyRequested;
            }
        }

        let attempt = self.dispatches.fetch_add(1, Ordering::Relaxed) + 1;
        info!(attempt, "Sending server boot request");

        match self.wake.start_server().await {
            Ok(()) => {
                info!(attempt, "Server boot request accepted");
                BootOutcome::Dispatched { ok: true }
            }
            Err(e) => {
                error!(
                    attempt,
                    error = %e,
                    "Server boot request failed, not retrying until the backend recovers"
                );
                BootOutcome::Dispatched { ok: false }
            }
        }
    }

    /// Number of wake calls sent since startup
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WakeError;
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct MockWake {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl MockWake {
        fn new(fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl WakeApi for MockWake {
        fn start_server(&self) -> BoxFuture<'_, Result<(), WakeError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                if self.fail {
                    Err(WakeError::UnexpectedStatus {
                        status: 500,
                        body: "panel error".to_string(),
                    })
                } else {
                    Ok(())
                }
            })
        }
    }

    #[tokio::test]
    async fn test_first_request_dispatches() {
        let state = GatewayState::new();
        let wake = MockWake::new(false, Duration::ZERO);
        let gate = BootGate::new(state.clone(), wake.clone());

        assert_eq!(gate.request_boot().await, BootOutcome::Dispatched { ok: true });
        assert_eq!(wake.calls(), 1);
        assert_eq!(gate.dispatch_count(), 1);
        assert!(state.boot_request().requested);
    }

    #[tokio::test]
    async fn test_second_request_is_debounced() {
        let state = GatewayState::new();
        let wake = MockWake::new(false, Duration::ZERO);
        let gate = BootGate::new(state, wake.clone());

        gate.request_boot().await;
        assert_eq!(gate.request_boot().await, BootOutcome::AlreadyRequested);
        assert_eq!(wake.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_dispatch_once() {
        let state = GatewayState::new();
        let wake = MockWake::new(false, Duration::from_millis(50));
        let gate = Arc::new(BootGate::new(state, wake.clone()));

        let a = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.request_boot().await }
        });
        let b = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.request_boot().await }
        });

        let mut outcomes = vec![a.await.unwrap(), b.await.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, BootOutcome::Dispatched { .. }));

        assert_eq!(
            outcomes,
            vec![
                BootOutcome::AlreadyRequested,
                BootOutcome::Dispatched { ok: true }
            ]
        );
        assert_eq!(wake.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_call_still_suppresses_retries() {
        let state = GatewayState::new();
        let wake = MockWake::new(true, Duration::ZERO);
        let gate = BootGate::new(state, wake.clone());

        assert_eq!(gate.request_boot().await, BootOutcome::Dispatched { ok: false });
        assert_eq!(gate.request_boot().await, BootOutcome::AlreadyRequested);
        assert_eq!(wake.calls(), 1);
    }

    #[tokio::test]
    async fn test_recovery_opens_new_down_period() {
        let state = GatewayState::new();
        let wake = MockWake::new(false, Duration::ZERO);
        let gate = BootGate::new(state.clone(), wake.clone());

        gate.request_boot().await;
        state.record_probe(true);
        state.record_probe(false);

        assert_eq!(gate.request_boot().await, BootOutcome::Dispatched { ok: true });
        assert_eq!(wake.calls(), 2);
    }

    #[tokio::test]
    async fn test_recovery_during_in_flight_call_is_not_overwritten() {
        let state = GatewayState::new();
        let wake = MockWake::new(false, Duration::from_millis(100));
        let gate = Arc::new(BootGate::new(state.clone(), wake.clone()));

        let in_flight = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.request_boot().await }
        });

        // Let the call start, then recover while it is still pending
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.record_probe(true);
        in_flight.await.unwrap();

        assert!(!state.boot_request().requested);
        state.record_probe(false);
        assert_eq!(gate.request_boot().await, BootOutcome::Dispatched { ok: true });
    }

    #[tokio::test]
    async fn test_no_call_while_reachable() {
        let state = GatewayState::new();
        state.record_probe(true);
        let wake = MockWake::new(false, Duration::ZERO);
        let gate = BootGate::new(state, wake.clone());

        assert_eq!(gate.request_boot().await, BootOutcome::AlreadyRequested);
        assert_eq!(wake.calls(), 0);
    }
}
