//! Application startup and bootstrap logic, kept out of `main.rs` so it can
//! be exercised from tests.

use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::backup::{backup_loop, retention_loop};
use crate::config::Config;
use crate::registry::InstanceRegistry;
use crate::server::routes::build_router;
use crate::server::AppState;

/// Resolve the configuration file path.
///
/// Priority:
/// 1. `ANT_CONFIG` environment variable
/// 2. `./ant.toml` if it exists
/// 3. None (use defaults)
pub fn resolve_config_path() -> Option<String> {
    std::env::var("ANT_CONFIG").ok().or_else(|| {
        let default = "ant.toml";
        std::path::Path::new(default)
            .exists()
            .then(|| default.to_string())
    })
}

/// Initialize the tracing subscriber. `RUST_LOG` wins over
/// `config.logging.level`; `format` is `json` or plain text.
pub fn init_logging(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

/// Open the registry, recover every persisted instance, spawn the
/// background loops and build the router.
///
/// Returns the router, the shared registry, and the sender that stops the
/// background loops.
pub async fn build_app(
    config: Config,
) -> Result<(Router, Arc<InstanceRegistry>, watch::Sender<bool>), Box<dyn std::error::Error>> {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        data_dir = %config.storage.data_dir.display(),
        backup_enabled = config.backup.enabled,
        backup_interval_secs = config.backup.interval_secs,
        max_keep_versions = config.backup.max_keep_versions,
        "ant starting"
    );

    crate::metrics::init();

    let data_dir = config.storage.data_dir.clone();
    let registry = tokio::task::spawn_blocking(move || {
        let registry = InstanceRegistry::open(&data_dir)?;
        let count = registry.scan_and_register()?;
        tracing::info!(count, "registered existing instances");
        Ok::<_, crate::error::AntError>(registry)
    })
    .await??;
    let registry = Arc::new(registry);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if config.backup.enabled {
        tokio::spawn(backup_loop(
            registry.clone(),
            config.backup.clone(),
            shutdown_rx.clone(),
        ));
        tokio::spawn(retention_loop(
            registry.clone(),
            config.backup.clone(),
            shutdown_rx,
        ));
    } else {
        tracing::info!("background backups disabled");
    }

    let state = AppState {
        registry: registry.clone(),
        config: Arc::new(config),
    };
    Ok((build_router(state), registry, shutdown_tx))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(tmp: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = tmp.path().to_path_buf();
        config.backup.interval_secs = 9999;
        config.backup.retention_interval_secs = 9999;
        config
    }

    #[tokio::test]
    async fn test_build_app_empty_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let (_router, registry, shutdown_tx) = build_app(test_config(&tmp)).await.unwrap();
        assert!(registry.list_instances().is_empty());
        assert!(tmp.path().join("members").is_dir());
        let _ = shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn test_build_app_missing_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(&tmp);
        config.storage.data_dir = tmp.path().join("absent");
        assert!(build_app(config).await.is_err());
    }

    #[tokio::test]
    async fn test_build_app_recovers_instances() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let registry = InstanceRegistry::open(tmp.path()).unwrap();
            let instance = registry
                .create_instance("docs", crate::types::InstanceParams::new(2, 1))
                .unwrap();
            instance
                .build(vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![10, 20])
                .unwrap();
        }

        let (_router, registry, shutdown_tx) = build_app(test_config(&tmp)).await.unwrap();
        let instance = registry.get_instance("docs").unwrap();
        assert!(instance.is_built());
        assert_eq!(instance.count(), 2);
        let _ = shutdown_tx.send(true);
    }
}
