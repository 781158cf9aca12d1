//! API HTTP JSON (axum) sobre `ValuationService`.
//!
//! Endpoints:
//! - GET  /health
//! - POST /workflows/start        - crea (o deduplica) un run
//! - POST /workflows/query        - filtra runs por atributos de búsqueda
//! - POST /workflows/revalue      - recalcula con overrides
//! - POST /workflows/cancel       - cancela un run activo
//! - GET  /workflows/last-result  - último resultado de un run
//! - GET  /workflows/progress     - estado por step
//! - GET  /workflows/history      - historial de resultados (opcional `at`)
//! - POST /workflows/schedules/ensure-weekly - revaloración semanal de una propiedad
//!
//! Las operaciones del servicio son bloqueantes (journal Postgres), así que
//! cada handler las ejecuta con `spawn_blocking`.

mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::errors::ServiceError;
use crate::service::ValuationService;

use self::handlers::{handle_cancel, handle_ensure_weekly, handle_health, handle_history, handle_last_result,
                     handle_progress, handle_query, handle_revalue, handle_start};

pub type AppState = Arc<ValuationService>;

/// Respuesta JSON de error con el código dado.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({ "error": message })))
}

async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// Ejecuta una operación del servicio en el pool bloqueante.
pub(crate) async fn blocking<T, F>(state: &AppState, op: F) -> Result<T, ServiceError>
    where F: FnOnce(AppState) -> Result<T, ServiceError> + Send + 'static,
          T: Send + 'static
{
    let svc = Arc::clone(state);
    tokio::task::spawn_blocking(move || op(svc)).await
                                                 .map_err(|e| ServiceError::Internal(format!("worker failed: {e}")))?
}

pub fn router(service: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any)
                               .allow_methods([Method::GET, Method::POST])
                               .allow_headers(Any);

    Router::new().route("/health", get(handle_health))
                 .route("/workflows/start", post(handle_start))
                 .route("/workflows/query", post(handle_query))
                 .route("/workflows/revalue", post(handle_revalue))
                 .route("/workflows/cancel", post(handle_cancel))
                 .route("/workflows/last-result", get(handle_last_result))
                 .route("/workflows/progress", get(handle_progress))
                 .route("/workflows/history", get(handle_history))
                 .route("/workflows/schedules/ensure-weekly", post(handle_ensure_weekly))
                 .fallback(handle_not_found)
                 .layer(cors)
                 .with_state(service)
}

/// Sirve la API hasta que `shutdown` se complete.
pub async fn serve<S>(listener: TcpListener, service: AppState, shutdown: S) -> std::io::Result<()>
    where S: Future<Output = ()> + Send + 'static
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "propflow listening");
    }
    axum::serve(listener, router(service)).with_graceful_shutdown(shutdown)
                                          .await
}
