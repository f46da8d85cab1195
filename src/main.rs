use std::time::Duration;

use tokio::net::TcpListener;

use ant::config::Config;
use ant::startup::{build_app, init_logging, resolve_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    // ANT_CONFIG > ./ant.toml > defaults
    let config = Config::load(resolve_config_path().as_deref())?;
    init_logging(&config);

    let (app, registry, shutdown_tx) = build_app(config.clone()).await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %addr, "listening");
    let listener = TcpListener::bind(&addr).await?;

    let shutdown_signal = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();
        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT"),
            _ = terminate => tracing::info!("received SIGTERM"),
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("server stopped, shutting down background tasks");
    let _ = shutdown_tx.send(true);

    // Wait for in-flight backups to release their instances.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(config.server.shutdown_timeout_secs);
    while tokio::time::Instant::now() < deadline {
        let registry_ref = registry.clone();
        let busy = tokio::task::spawn_blocking(move || {
            registry_ref.list_instances().iter().any(|name| {
                registry_ref
                    .get_instance(name)
                    .map(|i| i.mode() == ant::instance::WriteMode::Buffering)
                    .unwrap_or(false)
            })
        })
        .await
        .unwrap_or(false);
        if !busy {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tracing::info!(instances = registry.list_instances().len(), "ant shutdown complete");

    Ok(())
}
