use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::server::AppState;
use crate::types::{InstanceInfo, InstanceParams};

use super::{blocking, validation, ApiError};

/// Request body for creating a new instance.
#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub name: String,
    pub dim: usize,
    /// Defaults to `indexing.default_nlist`.
    #[serde(default)]
    pub nlist: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    pub name: String,
    #[serde(flatten)]
    pub info: InstanceInfo,
}

#[derive(Debug, Serialize)]
pub struct ListInstancesResponse {
    pub instances: Vec<String>,
}

#[instrument(skip(state))]
pub async fn list_instances(State(state): State<AppState>) -> Json<ListInstancesResponse> {
    Json(ListInstancesResponse {
        instances: state.registry.list_instances(),
    })
}

#[instrument(skip(state), fields(instance = %req.name, dim = req.dim))]
pub async fn create_instance(
    State(state): State<AppState>,
    Json(req): Json<CreateInstanceRequest>,
) -> Result<(StatusCode, Json<InstanceResponse>), ApiError> {
    let max_dimensions = state.config.server.max_dimensions;
    if req.dim == 0 || req.dim > max_dimensions {
        return Err(validation(format!(
            "dim {} must be between 1 and {max_dimensions}",
            req.dim
        )));
    }

    let nlist = req.nlist.unwrap_or(state.config.indexing.default_nlist);
    let params = InstanceParams::new(req.dim, nlist).with_kmeans(state.config.kmeans_params());

    let registry = state.registry.clone();
    let name = req.name.clone();
    let info = blocking(move || {
        registry
            .create_instance(&name, params)
            .map(|instance| instance.get_info())
    })
    .await?;

    info!(instance = %req.name, nlist, "instance created");
    Ok((
        StatusCode::CREATED,
        Json(InstanceResponse {
            name: req.name,
            info,
        }),
    ))
}

#[instrument(skip(state), fields(instance = %name))]
pub async fn get_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<InstanceResponse>, ApiError> {
    let instance = state.registry.get_instance(&name)?;
    let info = blocking(move || Ok(instance.get_info())).await?;
    Ok(Json(InstanceResponse { name, info }))
}

#[instrument(skip(state), fields(instance = %name))]
pub async fn delete_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let registry = state.registry.clone();
    let target = name.clone();
    blocking(move || registry.delete_instance(&target)).await?;
    info!(instance = %name, "instance deleted");
    Ok(StatusCode::NO_CONTENT)
}
