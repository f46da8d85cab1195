use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::metrics::{GaugeGuard, ACTIVE_SEARCHES, SEARCH_DURATION};
use crate::server::AppState;
use crate::types::SearchResult;

use super::{blocking, validation, ApiError};

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    /// One or more query vectors.
    pub vectors: Vec<Vec<f32>>,
    pub top_k: usize,
    /// Clusters probed per query. Defaults to `indexing.default_nprobe`.
    #[serde(default)]
    pub nprobe: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// One row per query, best match first.
    pub results: Vec<Vec<SearchResult>>,
}

#[instrument(skip(state, req), fields(instance = %name, queries = req.vectors.len(), top_k = req.top_k))]
pub async fn search_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let server = &state.config.server;
    if req.vectors.is_empty() {
        return Err(validation("vectors array cannot be empty"));
    }
    if req.vectors.len() > server.max_batch_size {
        return Err(validation(format!(
            "query batch size {} exceeds maximum of {}",
            req.vectors.len(),
            server.max_batch_size
        )));
    }
    if req.top_k == 0 {
        return Err(validation("top_k must be > 0"));
    }
    if req.top_k > server.max_top_k {
        return Err(validation(format!(
            "top_k {} exceeds maximum of {}",
            req.top_k, server.max_top_k
        )));
    }
    let nprobe = req.nprobe.unwrap_or(state.config.indexing.default_nprobe);
    if nprobe == 0 {
        return Err(validation("nprobe must be > 0"));
    }

    let instance = state.registry.get_instance(&name)?;

    ACTIVE_SEARCHES.inc();
    let _active = GaugeGuard(&ACTIVE_SEARCHES);
    let timer = SEARCH_DURATION.with_label_values(&[&name]).start_timer();
    let top_k = req.top_k;
    let results = blocking(move || instance.search(&req.vectors, top_k, nprobe)).await?;
    let elapsed = timer.stop_and_record();

    debug!(nprobe, elapsed_secs = elapsed, "search completed");
    Ok(Json(SearchResponse { results }))
}
