//! Fachada del servicio de valoración.
//!
//! Reúne engine, registry, historial y revaluación. Los runs avanzan en
//! hilos bloqueantes de tokio (`spawn_blocking`), uno por run; los steps de
//! un run son secuenciales. Como máximo hay un run activo por propiedad: un
//! `start` con la misma clave de idempotencia devuelve el run existente y
//! uno con inputs distintos se rechaza con `Conflict`.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prop_adapters::{valuation_definition, PipelineConfig, PropertyDataSource, SeedInputs};
use prop_core::{idempotency_key, CoreEngineError, EventStore, FlowDefinition, FlowEngine, FlowEventKind, FlowInstance,
                InMemoryFlowRepository, RetryPolicy, RunObserver, RunStatus, StepStatus};
use prop_domain::history::{current_at, latest};
use prop_domain::{HistoryEntry, OverrideParameters, ResultHistoryStore};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use prop_adapters::pipeline::FETCH_STEPS;

use crate::errors::ServiceError;
use crate::recorder::PipelineResultRecorder;
use crate::registry::{RunQuery, RunRegistry, RunSummary};
use crate::revaluation::RevaluationController;
use crate::schedules::{ScheduleBook, ScheduleInfo};

pub type Engine = FlowEngine<Arc<dyn EventStore>, InMemoryFlowRepository>;

fn seed_inputs(request: StartRequest) -> SeedInputs {
    SeedInputs { property_id: request.property_id.trim().to_string(),
                 address: request.address,
                 area_m2: request.area_m2,
                 year_built: request.year_built,
                 municipality: request.municipality,
                 valuation_date: Utc::now().date_naive() }
}

/// Cuerpo de `POST /workflows/start`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub property_id: String,
    pub address: String,
    #[serde(default)]
    pub area_m2: Option<f64>,
    #[serde(default)]
    pub year_built: Option<i32>,
    #[serde(default)]
    pub municipality: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_id: String,
    pub status: &'static str,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunProgress {
    pub run_id: Uuid,
    pub status: &'static str,
    /// `started` → `features-ready` (los cuatro fetch listos) → `done`.
    pub stage: &'static str,
    /// Steps terminados sobre el total, en [0, 1].
    pub progress: f64,
    pub steps: Vec<StepProgress>,
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub retry: RetryPolicy,
    pub pipeline: PipelineConfig,
}

struct ActiveRun {
    run_id: Uuid,
    idempotency_key: String,
}

pub struct ValuationService {
    engine: Arc<Engine>,
    definition: Arc<FlowDefinition>,
    registry: Arc<RunRegistry>,
    recorder: Arc<PipelineResultRecorder>,
    history: Arc<dyn ResultHistoryStore>,
    revaluation: RevaluationController,
    active: DashMap<String, ActiveRun>,
    drivers: DashMap<Uuid, JoinHandle<()>>,
    schedules: ScheduleBook,
    runtime: Handle,
}

impl ValuationService {
    pub fn new(event_store: Arc<dyn EventStore>,
               history: Arc<dyn ResultHistoryStore>,
               source: Arc<dyn PropertyDataSource>,
               settings: ServiceSettings,
               runtime: Handle)
               -> Arc<Self> {
        let registry = Arc::new(RunRegistry::new());
        let recorder = Arc::new(PipelineResultRecorder::new(history.clone()));
        let engine = FlowEngine::builder(event_store, InMemoryFlowRepository::new())
            .retry_policy(settings.retry)
            .observer(registry.clone())
            .observer(recorder.clone())
            .build();
        let definition = valuation_definition(source.clone(), &settings.pipeline);
        let revaluation = RevaluationController::new(history.clone(), source, settings.pipeline);
        Arc::new(Self { engine: Arc::new(engine),
                        definition: Arc::new(definition),
                        registry,
                        recorder,
                        history,
                        revaluation,
                        active: DashMap::new(),
                        drivers: DashMap::new(),
                        schedules: ScheduleBook::new(),
                        runtime })
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Crea un run (o devuelve el activo con la misma clave) y lanza su
    /// driver.
    pub fn start(self: &Arc<Self>, request: StartRequest) -> Result<StartOutcome, ServiceError> {
        let seed = seed_inputs(request);
        seed.validate()?;
        let key = idempotency_key(&seed.property_id, &seed.request_inputs());

        let run_id = match self.active.entry(seed.property_id.clone()) {
            Entry::Occupied(existing) => {
                let active = existing.get();
                if active.idempotency_key == key {
                    let status = self.registry
                                     .get(active.run_id)
                                     .map_or(RunStatus::Running, |r| r.status);
                    info!(run_id = %active.run_id, property_id = %seed.property_id, "start deduplicated");
                    return Ok(StartOutcome { run_id: active.run_id,
                                             status,
                                             created: false });
                }
                return Err(ServiceError::Conflict { message: format!("property {} already has an active run with different inputs",
                                                                     seed.property_id),
                                                    run_id: Some(active.run_id) });
            }
            Entry::Vacant(slot) => {
                let run_id = Uuid::new_v4();
                self.engine
                    .start(run_id, &seed.property_id, key.clone(), seed.to_value()?, &self.definition)?;
                slot.insert(ActiveRun { run_id,
                                        idempotency_key: key });
                run_id
            }
        };
        info!(%run_id, property_id = %seed.property_id, "run started");
        self.spawn_driver(run_id, seed.property_id);
        Ok(StartOutcome { run_id,
                          status: RunStatus::Running,
                          created: true })
    }

    /// Crea o reemplaza la revaloración periódica de una propiedad. Cada
    /// tick equivale a un `start` con esta misma solicitud.
    pub fn ensure_schedule(self: &Arc<Self>,
                           request: StartRequest,
                           interval: Duration)
                           -> Result<ScheduleInfo, ServiceError> {
        let request = StartRequest { property_id: request.property_id.trim().to_string(),
                                     ..request };
        seed_inputs(request.clone()).validate()?;
        Ok(self.schedules.ensure(Arc::downgrade(self), request, interval, &self.runtime))
    }

    pub fn schedules(&self) -> &ScheduleBook {
        &self.schedules
    }

    fn spawn_driver(self: &Arc<Self>, run_id: Uuid, property_id: String) {
        let svc = Arc::clone(self);
        let handle = self.runtime.spawn_blocking(move || svc.drive(run_id, &property_id));
        self.drivers.insert(run_id, handle);
    }

    fn drive(&self, run_id: Uuid, property_id: &str) {
        let span = info_span!("run", %run_id, %property_id);
        let _enter = span.enter();
        match self.engine.resume(run_id, &self.definition) {
            Ok(inst) => info!(fingerprint = inst.flow_fingerprint.as_deref().unwrap_or(""), "run completed"),
            Err(CoreEngineError::Cancelled) => info!("run cancelled"),
            Err(CoreEngineError::Persistence(e)) => error!(error = %e, "journal unavailable; run will resume after restart"),
            Err(e) => warn!(error = %e, "run failed"),
        }
        // Un run que sigue abierto en el journal se reanuda tras reiniciar:
        // la propiedad sigue ocupada hasta entonces.
        match self.engine.instance(run_id, &self.definition) {
            Ok(inst) if inst.is_terminal() => {
                self.active.remove_if(property_id, |_, a| a.run_id == run_id);
            }
            Ok(inst) => warn!(status = inst.status.as_str(), "run left open; property stays reserved until resume"),
            Err(e) => error!(error = %e, "could not read run state; property stays reserved"),
        }
    }

    /// Espera a que termine el driver de un run (si existe) y devuelve su
    /// resumen.
    pub async fn wait_for(&self, run_id: Uuid) -> Option<Arc<RunSummary>> {
        if let Some((_, handle)) = self.drivers.remove(&run_id) {
            if let Err(e) = handle.await {
                error!(%run_id, error = %e, "run driver panicked");
            }
        }
        self.registry.get(run_id)
    }

    pub fn cancel(&self, run_id: Uuid) -> Result<RunStatus, ServiceError> {
        self.engine.cancel(run_id, "cancelled by client", &self.definition)?;
        if let Some(run) = self.registry.get(run_id) {
            self.active.remove_if(&run.property_id, |_, a| a.run_id == run_id);
        }
        info!(%run_id, "run cancellation requested");
        Ok(RunStatus::Cancelled)
    }

    pub fn query(&self, filter: &RunQuery) -> Vec<Arc<RunSummary>> {
        self.registry.query(filter)
    }

    fn instance(&self, run_id: Uuid) -> Result<FlowInstance, ServiceError> {
        Ok(self.engine.instance(run_id, &self.definition)?)
    }

    pub fn progress(&self, run_id: Uuid) -> Result<RunProgress, ServiceError> {
        let inst = self.instance(run_id)?;
        let done = inst.steps
                       .iter()
                       .filter(|s| s.status == StepStatus::Succeeded)
                       .count();
        let stage = if inst.status == RunStatus::Completed {
            "done"
        } else if FETCH_STEPS.iter().all(|s| inst.succeeded(s)) {
            "features-ready"
        } else {
            "started"
        };
        let steps = inst.steps
                        .iter()
                        .map(|s| StepProgress { step_id: s.step_id.clone(),
                                                status: s.status.as_str(),
                                                attempts: s.attempts,
                                                last_error: s.last_error.as_ref().map(ToString::to_string),
                                                started_at: s.started_at,
                                                finished_at: s.finished_at })
                        .collect();
        Ok(RunProgress { run_id,
                         status: inst.status.as_str(),
                         stage,
                         progress: done as f64 / inst.steps.len().max(1) as f64,
                         steps })
    }

    fn summary(&self, run_id: Uuid) -> Result<Arc<RunSummary>, ServiceError> {
        self.registry
            .get(run_id)
            .ok_or_else(|| ServiceError::NotFound(format!("unknown run {run_id}")))
    }

    /// Resultado vigente del run (pipeline o última revaluación). Sin
    /// resultado, el error lleva el estado y el último fallo del run.
    pub fn last_result(&self, run_id: Uuid) -> Result<HistoryEntry, ServiceError> {
        let run = self.summary(run_id)?;
        self.recorder.flush(run_id)?;
        let entries = self.history.entries_for_run(run_id)?;
        latest(&entries).cloned()
                        .ok_or_else(|| ServiceError::NoResult { run_id,
                                                                status: run.status,
                                                                last_error: run.last_error.clone() })
    }

    /// Historial del run; con `at`, sólo la entrada vigente en ese instante.
    pub fn history(&self, run_id: Uuid, at: Option<DateTime<Utc>>) -> Result<Vec<HistoryEntry>, ServiceError> {
        self.summary(run_id)?;
        self.recorder.flush(run_id)?;
        let entries = self.history.entries_for_run(run_id)?;
        Ok(match at {
            Some(t) => current_at(&entries, t).cloned().into_iter().collect(),
            None => entries,
        })
    }

    pub fn revalue(&self, run_id: Uuid, overrides: OverrideParameters) -> Result<HistoryEntry, ServiceError> {
        self.recorder.flush(run_id)?;
        Ok(self.revaluation.revalue(self.engine.as_ref(), &self.definition, run_id, overrides)?)
    }

    /// Reconstruye registry e historial desde el journal y relanza los runs
    /// no terminales. Devuelve cuántos se reanudaron.
    pub fn recover(self: &Arc<Self>) -> Result<usize, ServiceError> {
        let store = self.engine.event_store();
        let mut resumed = 0;
        for run_id in store.list_run_ids()? {
            for event in store.list(run_id)? {
                let artifacts = match &event.kind {
                    FlowEventKind::StepFinished { outputs, .. } => {
                        let mut loaded = Vec::with_capacity(outputs.len());
                        for hash in outputs {
                            if let Some(a) = store.load_artifact(hash)? {
                                loaded.push(a);
                            }
                        }
                        loaded
                    }
                    _ => Vec::new(),
                };
                self.registry.on_event(&event, &artifacts);
                self.recorder.on_event(&event, &artifacts);
            }
            let inst = self.instance(run_id)?;
            if inst.is_terminal() {
                continue;
            }
            self.active.insert(inst.property_id.clone(),
                               ActiveRun { run_id,
                                           idempotency_key: inst.idempotency_key.clone() });
            info!(%run_id, property_id = %inst.property_id, cursor = inst.cursor, "resuming run");
            self.spawn_driver(run_id, inst.property_id);
            resumed += 1;
        }
        info!(runs = self.registry.len(), resumed, "journal replayed");
        Ok(resumed)
    }
}
