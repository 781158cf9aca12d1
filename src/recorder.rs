//! Registra en el historial el resultado de cada run del pipeline.
//!
//! Observa el journal: guarda la valoración al terminar `compute_valuation`
//! y, cuando `compute_risk` queda durable, agrega la entrada `Pipeline`.
//! Reproducir el journal completo (arranque) no duplica entradas.
//!
//! Si el historial rechaza la escritura tras los reintentos, la entrada
//! queda retenida en memoria y `flush` la escribe en la siguiente lectura
//! del run.
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use prop_adapters::artifacts::{RiskArtifact, ValuationArtifact};
use prop_adapters::pipeline::{COMPUTE_RISK, COMPUTE_VALUATION};
use prop_core::{Artifact, ArtifactSpec, FlowEvent, FlowEventKind, RunObserver};
use prop_domain::{DomainError, HistoryEntry, ResultHistoryStore, ResultSource, ValuationResult};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct PendingResult {
    property_id: String,
    valuation: Option<ValuationResult>,
}

const APPEND_ATTEMPTS: u32 = 3;
const APPEND_STEP_MS: u64 = 15;

pub struct PipelineResultRecorder {
    history: Arc<dyn ResultHistoryStore>,
    pending: DashMap<Uuid, PendingResult>,
    unrecorded: DashMap<Uuid, HistoryEntry>,
}

fn decode<T: ArtifactSpec>(artifacts: &[Artifact]) -> Option<T> {
    artifacts.iter().find_map(|a| T::from_artifact(a).ok())
}

impl PipelineResultRecorder {
    pub fn new(history: Arc<dyn ResultHistoryStore>) -> Self {
        Self { history,
               pending: DashMap::new(),
               unrecorded: DashMap::new() }
    }

    /// Escribe la entrada salvo que el run ya tenga la suya. `Ok(false)`
    /// si ya estaba.
    fn write(&self, entry: &HistoryEntry) -> Result<bool, DomainError> {
        if self.history.has_pipeline_entry(entry.run_id)? {
            return Ok(false);
        }
        self.history.append(entry.clone())?;
        Ok(true)
    }

    /// Reintenta con backoff lineal (15ms, 30ms); agotados los intentos la
    /// entrada queda en `unrecorded`.
    fn store(&self, entry: HistoryEntry) {
        let run_id = entry.run_id;
        let mut attempt = 1;
        loop {
            match self.write(&entry) {
                Ok(true) => {
                    info!(%run_id, result_id = %entry.result_id, "pipeline result recorded");
                    return;
                }
                Ok(false) => {
                    debug!(%run_id, "pipeline result already in history");
                    return;
                }
                Err(e) if attempt < APPEND_ATTEMPTS => {
                    let delay_ms = APPEND_STEP_MS * u64::from(attempt);
                    warn!(%run_id, attempt, error = %e, "history write failed; retrying in {delay_ms}ms");
                    std::thread::sleep(Duration::from_millis(delay_ms));
                    attempt += 1;
                }
                Err(e) => {
                    error!(%run_id, error = %e, "could not record pipeline result; holding it until the next read");
                    self.unrecorded.insert(run_id, entry);
                    return;
                }
            }
        }
    }

    /// Escribe el resultado retenido del run, si lo hay. El error se
    /// propaga al llamador y la entrada sigue retenida.
    pub fn flush(&self, run_id: Uuid) -> Result<(), DomainError> {
        let Some(entry) = self.unrecorded.get(&run_id).map(|e| e.value().clone()) else {
            return Ok(());
        };
        self.write(&entry)?;
        self.unrecorded.remove(&run_id);
        info!(%run_id, result_id = %entry.result_id, "held pipeline result recorded");
        Ok(())
    }

    fn record(&self, event: &FlowEvent, artifacts: &[Artifact]) {
        let run_id = event.run_id;
        let Some(risk) = decode::<RiskArtifact>(artifacts) else {
            error!(%run_id, "compute_risk finished without a risk artifact");
            return;
        };
        let Some((_, pending)) = self.pending.remove(&run_id) else {
            error!(%run_id, "compute_risk finished for a run that was never initialized");
            return;
        };
        let Some(valuation) = pending.valuation else {
            error!(%run_id, "compute_risk finished before any valuation was recorded");
            return;
        };
        let entry = HistoryEntry { result_id: Uuid::new_v4(),
                                   property_id: pending.property_id,
                                   run_id,
                                   source: ResultSource::Pipeline,
                                   valuation,
                                   risk: risk.risk,
                                   overrides: None,
                                   computed_at: event.ts };
        self.store(entry);
    }
}

impl RunObserver for PipelineResultRecorder {
    fn on_event(&self, event: &FlowEvent, artifacts: &[Artifact]) {
        match &event.kind {
            FlowEventKind::RunInitialized { property_id, .. } => {
                self.pending.insert(event.run_id,
                                    PendingResult { property_id: property_id.clone(),
                                                    valuation: None });
            }
            FlowEventKind::StepFinished { step_id, .. } if step_id == COMPUTE_VALUATION => {
                if let Some(mut p) = self.pending.get_mut(&event.run_id) {
                    p.valuation = decode::<ValuationArtifact>(artifacts).map(|v| v.valuation);
                }
            }
            FlowEventKind::StepFinished { step_id, .. } if step_id == COMPUTE_RISK => self.record(event, artifacts),
            FlowEventKind::RunFailed { .. } | FlowEventKind::RunCancelled { .. } | FlowEventKind::RunCompleted { .. } => {
                self.pending.remove(&event.run_id);
            }
            _ => {}
        }
    }
}
