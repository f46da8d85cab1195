use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::AntError;
use crate::server::AppState;

use super::ApiError;

#[derive(Debug, Serialize)]
pub struct BackupAccepted {
    pub instance: String,
    /// Version current when the backup was requested.
    pub from_version: String,
}

/// Start a backup in the background and return immediately.
#[instrument(skip(state), fields(instance = %name))]
pub async fn backup_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<BackupAccepted>), ApiError> {
    let instance = state.registry.get_instance(&name)?;
    if !instance.is_built() {
        return Err(ApiError(AntError::NotBuilt));
    }
    let from_version = instance.version();

    let registry = state.registry.clone();
    let target = name.clone();
    tokio::task::spawn_blocking(move || match registry.backup_instance(&target) {
        Ok(version) => info!(instance = %target, %version, "requested backup completed"),
        Err(e) => warn!(instance = %target, error = %e, "requested backup failed"),
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(BackupAccepted {
            instance: name,
            from_version,
        }),
    ))
}
