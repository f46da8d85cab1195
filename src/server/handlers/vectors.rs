use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::server::AppState;
use crate::types::VectorId;

use super::{blocking, validation, ApiError};

/// Vectors with their ids, paired by position.
#[derive(Debug, Deserialize)]
pub struct VectorsRequest {
    pub vectors: Vec<Vec<f32>>,
    pub ids: Vec<VectorId>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveVectorsRequest {
    pub ids: Vec<VectorId>,
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    /// Number of ids in the accepted batch.
    pub count: usize,
    pub total: usize,
}

fn check_batch(state: &AppState, len: usize) -> Result<(), ApiError> {
    let max = state.config.server.max_batch_size;
    if len > max {
        return Err(validation(format!(
            "batch size {len} exceeds maximum of {max}"
        )));
    }
    Ok(())
}

#[instrument(skip(state, req), fields(instance = %name, count = req.ids.len()))]
pub async fn build_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<VectorsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    check_batch(&state, req.vectors.len().max(req.ids.len()))?;
    let instance = state.registry.get_instance(&name)?;
    let count = req.ids.len();
    let total = blocking(move || {
        instance.build(req.vectors, req.ids)?;
        Ok(instance.count())
    })
    .await?;
    info!(count, total, "instance built");
    Ok(Json(WriteResponse { count, total }))
}

#[instrument(skip(state, req), fields(instance = %name, count = req.ids.len()))]
pub async fn insert_vectors(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<VectorsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    check_batch(&state, req.vectors.len().max(req.ids.len()))?;
    let instance = state.registry.get_instance(&name)?;
    let count = req.ids.len();
    let total = blocking(move || {
        instance.insert(req.vectors, req.ids)?;
        Ok(instance.count())
    })
    .await?;
    info!(count, "vectors inserted");
    Ok(Json(WriteResponse { count, total }))
}

#[instrument(skip(state, req), fields(instance = %name, count = req.ids.len()))]
pub async fn update_vectors(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<VectorsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    check_batch(&state, req.vectors.len().max(req.ids.len()))?;
    let instance = state.registry.get_instance(&name)?;
    let count = req.ids.len();
    let total = blocking(move || {
        instance.update(req.vectors, req.ids)?;
        Ok(instance.count())
    })
    .await?;
    info!(count, "vectors updated");
    Ok(Json(WriteResponse { count, total }))
}

#[instrument(skip(state, req), fields(instance = %name, count = req.ids.len()))]
pub async fn remove_vectors(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<RemoveVectorsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    check_batch(&state, req.ids.len())?;
    let instance = state.registry.get_instance(&name)?;
    let count = req.ids.len();
    let total = blocking(move || {
        instance.remove(req.ids)?;
        Ok(instance.count())
    })
    .await?;
    info!(count, "vectors removed");
    Ok(Json(WriteResponse { count, total }))
}
