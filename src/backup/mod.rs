//! Periodic background jobs: versioned backups and version retention.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use crate::error::AntError;
use crate::registry::InstanceRegistry;

/// Back up every built instance, once per `interval_secs`, until shutdown.
pub async fn backup_loop(
    registry: Arc<InstanceRegistry>,
    config: BackupConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = config.interval_secs, "background backup loop started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.interval_secs)) => {},
            _ = shutdown.changed() => {
                info!("background backup loop shutting down");
                break;
            }
        }

        let names = registry.list_instances();
        debug!(instance_count = names.len(), "backup loop tick");
        for name in names {
            let registry = registry.clone();
            let task_name = name.clone();
            let result = tokio::task::spawn_blocking(move || backup_if_built(&registry, &task_name)).await;
            match result {
                Ok(Ok(Some(version))) => info!(instance = %name, %version, "backup completed"),
                Ok(Ok(None)) => debug!(instance = %name, "instance not built, backup skipped"),
                Ok(Err(AntError::BackupInProgress { version })) => {
                    debug!(instance = %name, %version, "backup already in progress")
                }
                // Deleted between listing and backing up.
                Ok(Err(AntError::InstanceNotFound { .. })) => {}
                Ok(Err(e)) => warn!(instance = %name, error = %e, "backup failed"),
                Err(e) => warn!(instance = %name, error = %e, "backup task panicked"),
            }
        }
    }
}

fn backup_if_built(registry: &InstanceRegistry, name: &str) -> crate::error::Result<Option<String>> {
    if !registry.get_instance(name)?.is_built() {
        return Ok(None);
    }
    registry.backup_instance(name).map(Some)
}

/// Prune each instance to `max_keep_versions`, once per
/// `retention_interval_secs`, until shutdown.
pub async fn retention_loop(
    registry: Arc<InstanceRegistry>,
    config: BackupConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        interval_secs = config.retention_interval_secs,
        max_keep_versions = config.max_keep_versions,
        "background retention loop started"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.retention_interval_secs)) => {},
            _ = shutdown.changed() => {
                info!("background retention loop shutting down");
                break;
            }
        }

        for name in registry.list_instances() {
            let registry = registry.clone();
            let task_name = name.clone();
            let max_keep = config.max_keep_versions;
            let result = tokio::task::spawn_blocking(move || {
                registry.prune_versions(&task_name, max_keep)
            })
            .await;
            match result {
                Ok(Ok(removed)) if removed.is_empty() => {}
                Ok(Ok(removed)) => {
                    info!(instance = %name, removed = removed.len(), "pruned old versions")
                }
                Ok(Err(AntError::InstanceNotFound { .. })) => {}
                Ok(Err(e)) => warn!(instance = %name, error = %e, "version pruning failed"),
                Err(e) => warn!(instance = %name, error = %e, "retention task panicked"),
            }
        }
    }
}
