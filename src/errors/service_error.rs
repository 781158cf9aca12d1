//! Error de la fachada de servicio y su traducción a HTTP.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use prop_core::{CoreEngineError, RunStatus};
use prop_domain::DomainError;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    /// Otro run activo para la misma propiedad con inputs distintos.
    #[error("{message}")]
    Conflict { message: String, run_id: Option<Uuid> },
    /// El run existe pero no tiene resultado: sigue en curso o terminó sin
    /// llegar a `compute_risk`.
    #[error("run {run_id} has no result yet")]
    NoResult {
        run_id: Uuid,
        status: RunStatus,
        last_error: Option<String>,
    },
    #[error("{0}")]
    InvalidState(String),
    #[error("upstream unavailable: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) | ServiceError::NoResult { .. } => StatusCode::NOT_FOUND,
            ServiceError::Conflict { .. } | ServiceError::InvalidState(_) => StatusCode::CONFLICT,
            ServiceError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreEngineError> for ServiceError {
    fn from(e: CoreEngineError) -> Self {
        match e {
            CoreEngineError::Validation(m) | CoreEngineError::MissingInputs(m) => ServiceError::Validation(m),
            CoreEngineError::NotFound(m) => ServiceError::NotFound(m),
            CoreEngineError::UnknownRun(id) => ServiceError::NotFound(format!("unknown run {id}")),
            CoreEngineError::UpstreamUnavailable(m) => ServiceError::Upstream(m),
            CoreEngineError::Conflict(m) => ServiceError::Conflict { message: m, run_id: None },
            CoreEngineError::InvalidState(m) => ServiceError::InvalidState(m),
            CoreEngineError::Cancelled => ServiceError::InvalidState("run cancelled".into()),
            CoreEngineError::FlowCompleted => ServiceError::InvalidState("run already completed".into()),
            CoreEngineError::FlowHasFailed => ServiceError::InvalidState("run has failed".into()),
            CoreEngineError::Compute(m) => ServiceError::Internal(format!("compute: {m}")),
            CoreEngineError::Persistence(m) => ServiceError::Internal(format!("persistence: {m}")),
            CoreEngineError::Internal(m) => ServiceError::Internal(m),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(m) => ServiceError::Validation(m),
            DomainError::Compute(m) => ServiceError::Internal(format!("compute: {m}")),
            DomainError::Storage(m) => ServiceError::Internal(format!("storage: {m}")),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ServiceError::Conflict { message, run_id: Some(id) } => json!({ "error": message, "runId": id }),
            ServiceError::NoResult { run_id, status, last_error } => json!({
                "error": self.to_string(),
                "runId": run_id,
                "status": status.as_str(),
                "lastError": last_error,
            }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
