use std::sync::Arc;

use tracing::{error, info};

use flow_dashboard::config::SimConfig;
use flow_dashboard::sim::{SimDevice, generate_pulses, server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = match SimConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let device = Arc::new(SimDevice::from_config(&config));
    let pulses = tokio::spawn(generate_pulses(Arc::clone(&device), config.pulses_per_sec));

    let listener = match tokio::net::TcpListener::bind(config.bind).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", config.bind, e);
            std::process::exit(1);
        }
    };

    info!(
        "Simulated flow device listening on {} ({} pulses/s, {:?} window, wifi={})",
        config.bind, config.pulses_per_sec, config.measure_window, config.wifi_connected,
    );

    if let Err(e) = axum::serve(listener, server::router(device))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    pulses.abort();
    info!("Simulated flow device stopped");
}

async fn shutdown_signal() {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
