//! Backend health monitoring
//!
//! Periodically dials the backend and records whether it is reachable. Only
//! flips of the health bit are logged.

use crate::config::HealthConfig;
use crate::state::{GatewayState, HealthTransition};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{info, trace, warn};

/// Health check configuration
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Interval between probes
    pub interval: Duration,
    /// Dial timeout for each probe
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
        }
    }
}

impl From<&HealthConfig> for HealthCheckConfig {
    fn from(config: &HealthConfig) -> Self {
        Self {
            interval: config.interval(),
            timeout: config.timeout(),
        }
    }
}

/// Background loop that owns the backend health bit
pub struct HealthMonitor {
    state: Arc<GatewayState>,
    backend_addr: String,
    config: HealthCheckConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl HealthMonitor {
    pub fn new(
        state: Arc<GatewayState>,
        backend_addr: impl Into<String>,
        config: HealthCheckConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            state,
            backend_addr: backend_addr.into(),
            config,
            shutdown_rx,
        }
    }

    /// Run until shutdown. The first probe happens immediately.
    pub async fn run(mut self) {
        info!(
            backend = %self.backend_addr,
            interval_ms = self.config.interval.as_millis() as u64,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Health monitor started"
        );

        loop {
            self.check_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                result = self.shutdown_rx.changed() => {
                    if result.is_err() || *self.shutdown_rx.borrow() {
                        info!("Health monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Probe once and record the result
    pub async fn check_once(&self) -> Option<HealthTransition> {
        let reachable = probe_backend(&self.backend_addr, self.config.timeout).await;
        let transition = self.state.record_probe(reachable)?;
        log_transition(&self.backend_addr, &transition);
        Some(transition)
    }
}

fn log_transition(backend: &str, transition: &HealthTransition) {
    let since_last_change_secs = transition.previous_duration.num_milliseconds() as f64 / 1000.0;
    let at = transition.at.to_rfc3339();

    if transition.reachable {
        info!(
            backend,
            at = %at,
            since_last_change_secs,
            "Backend is now reachable"
        );
    } else {
        warn!(
            backend,
            at = %at,
            since_last_change_secs,
            "Backend is now unreachable"
        );
    }
}

/// Check if the backend accepts TCP connections.
///
/// Failures are only traced: a sleeping backend fails every probe.
pub async fn probe_backend(addr: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            trace!(addr, error = %e, "Health probe failed (connection error)");
            false
        }
        Err(_) => {
            trace!(addr, "Health probe failed (timeout)");
            false
        }
    }
}
