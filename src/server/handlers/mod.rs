/// Instance backup trigger.
pub mod backup;
/// Liveness probe handler.
pub mod health;
/// Instance lifecycle handlers.
pub mod instances;
/// Prometheus metrics exposition handler.
pub mod metrics;
/// Top-k search handler.
pub mod search;
/// Build, insert, update and remove handlers.
pub mod vectors;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::AntError;

/// Wrapper that converts `AntError` into an HTTP response.
pub struct ApiError(pub AntError);

impl From<AntError> for ApiError {
    fn from(e: AntError) -> Self {
        ApiError(e)
    }
}

/// Maps `ApiError` to an HTTP response with a JSON body and appropriate status code.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let status_code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status_code.is_server_error() {
            tracing::error!(error = %self.0, status, "server error");
        } else if status_code.is_client_error() {
            tracing::warn!(error = %self.0, status, "client error");
        }
        let body = json!({
            "error": self.0.to_string(),
            "status": status,
        });
        (status_code, axum::Json(body)).into_response()
    }
}

/// Run a blocking engine call off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(AntError::Internal(format!("engine task failed: {e}"))))?
        .map_err(ApiError)
}

pub(crate) fn validation(msg: impl Into<String>) -> ApiError {
    ApiError(AntError::Validation(msg.into()))
}
