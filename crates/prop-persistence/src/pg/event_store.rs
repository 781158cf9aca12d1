//! `EventStore` sobre Postgres.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::debug;
use serde_json::Value;
use uuid::Uuid;

use prop_core::{classify_error, Artifact, ArtifactKind, CoreEngineError, EventStore, FlowEvent, FlowEventKind};

use super::{with_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::{event_log, run_artifacts, step_execution_errors};

/// Fila de `event_log`. `payload` guarda el enum `FlowEventKind` completo;
/// `event_type` es su etiqueta (restringida por CHECK).
#[derive(Queryable, Debug)]
struct EventRow {
    seq: i64,
    run_id: Uuid,
    ts: DateTime<Utc>,
    #[allow(dead_code)]
    event_type: String,
    payload: Value,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = event_log)]
struct NewEventRow<'a> {
    run_id: &'a Uuid,
    event_type: &'a str,
    payload: &'a Value,
}

/// Fila de `run_artifacts`. `artifact_hash` es PK: un mismo contenido se
/// guarda una sola vez aunque lo produzcan varios runs.
#[derive(Queryable, Debug)]
struct ArtifactRow {
    artifact_hash: String,
    kind: String,
    payload: Value,
    metadata: Option<Value>,
    #[allow(dead_code)]
    produced_by: Uuid,
    #[allow(dead_code)]
    produced_in_seq: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = run_artifacts)]
struct NewArtifactRow<'a> {
    artifact_hash: &'a str,
    kind: &'a str,
    payload: &'a Value,
    metadata: Option<&'a Value>,
    produced_by: &'a Uuid,
    produced_in_seq: i64,
}

/// Fila de `step_execution_errors`: un registro por `StepFailed`, para
/// auditoría de intentos.
#[derive(Queryable, Debug, Clone)]
pub struct ErrorRow {
    pub id: i64,
    pub run_id: Uuid,
    pub step_id: String,
    pub attempt_number: i32,
    pub error_class: String,
    pub details: Option<Value>,
    pub ts: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = step_execution_errors)]
struct NewErrorRow<'a> {
    run_id: &'a Uuid,
    step_id: &'a str,
    attempt_number: i32,
    error_class: &'a str,
    details: Option<&'a Value>,
}

fn kind_from_label(label: &str) -> ArtifactKind {
    match label {
        "generic_json" => ArtifactKind::GenericJson,
        other => ArtifactKind::Named(other.to_string()),
    }
}

fn event_from_row(row: EventRow) -> Result<FlowEvent, PersistenceError> {
    let kind: FlowEventKind = serde_json::from_value(row.payload)?;
    Ok(FlowEvent { seq: row.seq as u64,
                   run_id: row.run_id,
                   kind,
                   ts: row.ts })
}

/// Journal append-only en Postgres.
///
/// - `append_with_artifacts`: evento, artifacts y (si es `StepFailed`) la
///   fila de error en una sola transacción.
/// - `list`: eventos de un run ordenados por `seq`, equivalente al backend en
///   memoria para el replay.
pub struct PgEventStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgEventStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn append_inner(&self,
                    run_id: Uuid,
                    kind: &FlowEventKind,
                    artifacts: &[Artifact])
                    -> Result<(i64, DateTime<Utc>), PersistenceError> {
        let event_type = kind.label();
        let payload = serde_json::to_value(kind)?;
        let failure = match kind {
            FlowEventKind::StepFailed { step_id, attempt, error, .. } => {
                Some((step_id.as_str(), *attempt as i32, classify_error(error).as_str(), serde_json::to_value(error)?))
            }
            _ => None,
        };

        with_retry("append", || {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx| {
                    let (seq, ts): (i64, DateTime<Utc>) =
                        diesel::insert_into(event_log::table).values(NewEventRow { run_id: &run_id,
                                                                                   event_type,
                                                                                   payload: &payload })
                                                             .returning((event_log::seq, event_log::ts))
                                                             .get_result(tx)?;

                    for a in artifacts {
                        let row = NewArtifactRow { artifact_hash: &a.hash,
                                                   kind: a.kind.label(),
                                                   payload: &a.payload,
                                                   metadata: a.metadata.as_ref(),
                                                   produced_by: &run_id,
                                                   produced_in_seq: seq };
                        // Dedupe por PK (artifact_hash)
                        diesel::insert_into(run_artifacts::table).values(&row)
                                                                 .on_conflict_do_nothing()
                                                                 .execute(tx)?;
                    }

                    if let Some((step_id, attempt_number, error_class, details)) = &failure {
                        diesel::insert_into(step_execution_errors::table).values(NewErrorRow { run_id: &run_id,
                                                                                               step_id: *step_id,
                                                                                               attempt_number: *attempt_number,
                                                                                               error_class: *error_class,
                                                                                               details: Some(details) })
                                                                         .execute(tx)?;
                    }

                    Ok::<_, diesel::result::Error>((seq, ts))
                })
                .map_err(PersistenceError::from)
        })
    }

    /// Errores de ejecución de un run, ordenados por ts.
    pub fn list_errors(&self, run_id: Uuid) -> Result<Vec<ErrorRow>, PersistenceError> {
        with_retry("list_errors", || {
            let mut conn = self.provider.connection()?;
            step_execution_errors::table.filter(step_execution_errors::run_id.eq(run_id))
                                        .order((step_execution_errors::ts.asc(), step_execution_errors::id.asc()))
                                        .load(&mut conn)
                                        .map_err(PersistenceError::from)
        })
    }
}

impl<P: ConnectionProvider> EventStore for PgEventStore<P> {
    fn append_with_artifacts(&self,
                             run_id: Uuid,
                             kind: FlowEventKind,
                             artifacts: &[Artifact])
                             -> Result<FlowEvent, CoreEngineError> {
        debug!("append:start run_id={run_id} kind={} artifacts={}", kind.label(), artifacts.len());
        let (seq, ts) = self.append_inner(run_id, &kind, artifacts)?;
        debug!("append:done run_id={run_id} seq={seq} kind={}", kind.label());
        Ok(FlowEvent { seq: seq as u64,
                       run_id,
                       kind,
                       ts })
    }

    fn list(&self, run_id: Uuid) -> Result<Vec<FlowEvent>, CoreEngineError> {
        let rows: Vec<EventRow> = with_retry("list", || {
            let mut conn = self.provider.connection()?;
            event_log::table.filter(event_log::run_id.eq(run_id))
                            .order(event_log::seq.asc())
                            .load(&mut conn)
                            .map_err(PersistenceError::from)
        })?;
        let events = rows.into_iter()
                         .map(event_from_row)
                         .collect::<Result<Vec<_>, _>>()?;
        debug!("list:done run_id={run_id} count={}", events.len());
        Ok(events)
    }

    fn list_run_ids(&self) -> Result<Vec<Uuid>, CoreEngineError> {
        let ids = with_retry("list_run_ids", || {
            let mut conn = self.provider.connection()?;
            event_log::table.filter(event_log::event_type.eq("run_initialized"))
                            .order(event_log::seq.asc())
                            .select(event_log::run_id)
                            .load::<Uuid>(&mut conn)
                            .map_err(PersistenceError::from)
        })?;
        Ok(ids)
    }

    fn load_artifact(&self, hash: &str) -> Result<Option<Artifact>, CoreEngineError> {
        let row: Option<ArtifactRow> = with_retry("load_artifact", || {
            let mut conn = self.provider.connection()?;
            run_artifacts::table.find(hash)
                                .first::<ArtifactRow>(&mut conn)
                                .optional()
                                .map_err(PersistenceError::from)
        })?;
        Ok(row.map(|r| Artifact { kind: kind_from_label(&r.kind),
                                  hash: r.artifact_hash,
                                  payload: r.payload,
                                  metadata: r.metadata }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_kind_label_roundtrip() {
        assert_eq!(kind_from_label(ArtifactKind::GenericJson.label()), ArtifactKind::GenericJson);
        let named = ArtifactKind::Named("valuation_result".into());
        assert_eq!(kind_from_label(named.label()), named);
    }
}
