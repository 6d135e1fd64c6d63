use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use wakegate::boot::BootGate;
use wakegate::config::Config;
use wakegate::healthcheck::{HealthCheckConfig, HealthMonitor};
use wakegate::offline::OfflineResponder;
use wakegate::proxy::GatewayServer;
use wakegate::state::GatewayState;
use wakegate::wake::PterodactylClient;
use wakegate::{PKG_NAME, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wakegate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path.display(), error = %e, "Failed to load configuration");
        e
    })?;

    info!(path = %config_path.display(), "Configuration loaded");
    print_startup_banner(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = GatewayState::new();
    let wake = Arc::new(PterodactylClient::new(&config.wake)?);
    let gate = Arc::new(BootGate::new(Arc::clone(&state), wake));
    let responder = Arc::new(OfflineResponder::new(
        &config.offline,
        gate,
        config.server.read_timeout(),
        config.server.max_frame_len,
    ));

    let monitor = HealthMonitor::new(
        Arc::clone(&state),
        config.server.backend.clone(),
        HealthCheckConfig::from(&config.health),
        shutdown_rx.clone(),
    );
    let monitor_handle = tokio::spawn(monitor.run());

    let gateway = GatewayServer::bind(
        &config.server.listen_addr(),
        config.server.backend.clone(),
        Arc::clone(&state),
        responder,
        config.server.dial_timeout(),
        shutdown_rx.clone(),
    )
    .await?;

    let gateway_handle = tokio::spawn(async move {
        if let Err(e) = gateway.run().await {
            error!(error = %e, "Gateway error");
        }
    });

    wait_for_shutdown_signal().await;

    let _ = shutdown_tx.send(true);

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = gateway_handle.await;
        let _ = monitor_handle.await;
    })
    .await;

    info!("Shutdown complete");
    Ok(())
}

/// Block until Ctrl+C (or SIGTERM on Unix)
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received SIGINT (Ctrl+C), shutting down...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    }
                }
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        // No signal handler, serve until killed
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down...");
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting gateway");
    info!(
        listen = %config.server.listen_addr(),
        backend = %config.server.backend,
        read_timeout_secs = config.server.read_timeout_secs,
        max_frame_len = config.server.max_frame_len,
        dial_timeout_ms = config.server.dial_timeout_ms,
        "Server configuration"
    );
    info!(
        interval_ms = config.health.interval_ms,
        timeout_ms = config.health.timeout_ms,
        "Health check settings"
    );
    info!(
        panel = %config.wake.url,
        server = %config.wake.server,
        timeout_secs = config.wake.timeout_secs,
        "Wake API settings"
    );
    info!(
        version_name = %config.offline.version_name,
        protocol = config.offline.protocol,
        max_players = config.offline.max_players,
        motd = %config.offline.motd,
        "Offline status settings"
    );
}
