//! Tipos de evento del flujo y estructura `FlowEvent`.
//!
//! Rol en el flujo:
//! - Cada ejecución del `FlowEngine` emite eventos a un `EventStore`
//!   append-only.
//! - Estos eventos permiten reconstruir el estado del run (replay) sin
//!   depender de estructuras mutables; tras un reinicio del proceso el
//!   journal es la única fuente de verdad.
//! - El enum `FlowEventKind` define el contrato observable y estable del motor.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::CoreEngineError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FlowEventKind {
    /// Primer evento de un run: fija propiedad, definición, clave de
    /// idempotencia y el seed (incluida la fecha de valoración).
    RunInitialized {
        property_id: String,
        definition_hash: String,
        step_count: usize,
        idempotency_key: String,
        seed: Value,
    },
    /// Un intento de step comenzó. No implica éxito.
    StepStarted { step_index: usize, step_id: String, attempt: u32 },
    /// Punto de commit durable: los artifacts se persisten junto al evento.
    StepFinished {
        step_index: usize,
        step_id: String,
        outputs: Vec<String>,
        fingerprint: String,
    },
    /// Un intento falló. `retryable` indica si habrá `RetryScheduled`.
    StepFailed {
        step_index: usize,
        step_id: String,
        attempt: u32,
        error: CoreEngineError,
        retryable: bool,
    },
    /// Backoff programado antes del siguiente intento del mismo step.
    RetryScheduled {
        step_index: usize,
        step_id: String,
        retry_index: u32,
        delay_ms: u64,
    },
    /// Hito ligero emitido por un step (no altera el estado principal).
    StepSignal {
        step_index: usize,
        step_id: String,
        signal: String,
        data: Value,
    },
    /// Atributos indexables (propertyId, municipality, riskLevel).
    SearchAttributesUpserted { attributes: BTreeMap<String, String> },
    RunFailed { step_id: String, error: CoreEngineError },
    RunCancelled { reason: String },
    /// Cierre con fingerprint agregado (hash de fingerprints ordenados).
    RunCompleted { flow_fingerprint: String },
}

impl FlowEventKind {
    /// Eventos que cierran un run; nada posterior altera su estado.
    pub fn is_terminal(&self) -> bool {
        matches!(self,
                 FlowEventKind::RunFailed { .. } | FlowEventKind::RunCancelled { .. } | FlowEventKind::RunCompleted { .. })
    }

    /// Etiqueta corta, usada en logs y en la columna `event_type`.
    pub fn label(&self) -> &'static str {
        match self {
            FlowEventKind::RunInitialized { .. } => "run_initialized",
            FlowEventKind::StepStarted { .. } => "step_started",
            FlowEventKind::StepFinished { .. } => "step_finished",
            FlowEventKind::StepFailed { .. } => "step_failed",
            FlowEventKind::RetryScheduled { .. } => "retry_scheduled",
            FlowEventKind::StepSignal { .. } => "step_signal",
            FlowEventKind::SearchAttributesUpserted { .. } => "search_attributes_upserted",
            FlowEventKind::RunFailed { .. } => "run_failed",
            FlowEventKind::RunCancelled { .. } => "run_cancelled",
            FlowEventKind::RunCompleted { .. } => "run_completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowEvent {
    pub seq: u64, // asignado por el EventStore (orden append)
    pub run_id: Uuid,
    pub kind: FlowEventKind,
    pub ts: DateTime<Utc>, // metadato (no entra en fingerprint)
}
