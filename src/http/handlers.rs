//! Handlers de `/workflows/*` y `/health`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use prop_domain::{HistoryEntry, OverrideParameters};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use super::{blocking, AppState};
use crate::errors::ServiceError;
use crate::registry::RunQuery;
use crate::schedules::WEEKLY;
use crate::service::StartRequest;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload.map(|Json(v)| v)
           .map_err(|e| ServiceError::Validation(e.body_text()))
}

fn params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ServiceError> {
    query.map(|Query(v)| v)
         .map_err(|e| ServiceError::Validation(e.body_text()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunRef {
    run_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryParams {
    run_id: Uuid,
    #[serde(default)]
    at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RevalueRequest {
    run_id: Uuid,
    #[serde(default)]
    overrides: OverrideParameters,
}

fn result_json(entry: &HistoryEntry) -> serde_json::Value {
    json!({
        "resultId": entry.result_id,
        "source": entry.source.as_str(),
        "computedAt": entry.computed_at,
        "valuation": entry.valuation,
        "risk": entry.risk,
    })
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK,
     Json(json!({
         "status": "ok",
         "engineVersion": prop_core::constants::ENGINE_VERSION,
         "runs": state.registry().len(),
     })))
}

/// POST /workflows/start
pub(crate) async fn handle_start(State(state): State<AppState>,
                                 payload: Result<Json<StartRequest>, JsonRejection>)
                                 -> Result<impl IntoResponse, ServiceError> {
    let request = body(payload)?;
    debug!(property_id = %request.property_id, "start requested");
    let outcome = blocking(&state, move |svc| svc.start(request)).await?;
    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status,
        Json(json!({
            "runId": outcome.run_id,
            "status": outcome.status.as_str(),
        }))))
}

/// POST /workflows/query
pub(crate) async fn handle_query(State(state): State<AppState>,
                                 payload: Result<Json<RunQuery>, JsonRejection>)
                                 -> Result<impl IntoResponse, ServiceError> {
    let filter = body(payload)?;
    let items: Vec<serde_json::Value> = state.query(&filter)
                                             .iter()
                                             .map(|r| {
                                                 json!({
                                                     "runId": r.run_id,
                                                     "status": r.status.as_str(),
                                                     "startTime": r.start_time,
                                                     "searchAttributes": r.search_attributes,
                                                     "lastError": r.last_error,
                                                 })
                                             })
                                             .collect();
    Ok(Json(json!({ "items": items })))
}

/// POST /workflows/revalue
pub(crate) async fn handle_revalue(State(state): State<AppState>,
                                   payload: Result<Json<RevalueRequest>, JsonRejection>)
                                   -> Result<impl IntoResponse, ServiceError> {
    let RevalueRequest { run_id, overrides } = body(payload)?;
    let entry = blocking(&state, move |svc| svc.revalue(run_id, overrides)).await?;
    Ok(Json(json!({ "resultId": entry.result_id })))
}

/// POST /workflows/cancel
pub(crate) async fn handle_cancel(State(state): State<AppState>,
                                  payload: Result<Json<RunRef>, JsonRejection>)
                                  -> Result<impl IntoResponse, ServiceError> {
    let RunRef { run_id } = body(payload)?;
    let status = blocking(&state, move |svc| svc.cancel(run_id)).await?;
    Ok(Json(json!({ "runId": run_id, "status": status.as_str() })))
}

/// GET /workflows/last-result?runId=
pub(crate) async fn handle_last_result(State(state): State<AppState>,
                                       query: Result<Query<RunRef>, QueryRejection>)
                                       -> Result<impl IntoResponse, ServiceError> {
    let RunRef { run_id } = params(query)?;
    let entry = blocking(&state, move |svc| svc.last_result(run_id)).await?;
    Ok(Json(result_json(&entry)))
}

/// GET /workflows/progress?runId=
pub(crate) async fn handle_progress(State(state): State<AppState>,
                                    query: Result<Query<RunRef>, QueryRejection>)
                                    -> Result<impl IntoResponse, ServiceError> {
    let RunRef { run_id } = params(query)?;
    let progress = blocking(&state, move |svc| svc.progress(run_id)).await?;
    Ok(Json(progress))
}

/// GET /workflows/history?runId=&at=
pub(crate) async fn handle_history(State(state): State<AppState>,
                                   query: Result<Query<HistoryParams>, QueryRejection>)
                                   -> Result<impl IntoResponse, ServiceError> {
    let HistoryParams { run_id, at } = params(query)?;
    let entries = blocking(&state, move |svc| svc.history(run_id, at)).await?;
    let items: Vec<serde_json::Value> = entries.iter()
                                               .map(|e| {
                                                   let mut v = result_json(e);
                                                   v["overrides"] = json!(e.overrides);
                                                   v
                                               })
                                               .collect();
    Ok(Json(json!({ "runId": run_id, "items": items })))
}

/// POST /workflows/schedules/ensure-weekly
pub(crate) async fn handle_ensure_weekly(State(state): State<AppState>,
                                         payload: Result<Json<StartRequest>, JsonRejection>)
                                         -> Result<impl IntoResponse, ServiceError> {
    let request = body(payload)?;
    let info = blocking(&state, move |svc| svc.ensure_schedule(request, WEEKLY)).await?;
    Ok(Json(json!({
        "ok": true,
        "scheduleId": info.schedule_id,
        "propertyId": info.property_id,
        "intervalSecs": info.interval_secs,
        "created": info.created,
    })))
}
