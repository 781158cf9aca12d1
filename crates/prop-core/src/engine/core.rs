//! Core FlowEngine implementation

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use log::{debug, info, warn};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{EngineBuilder, RetryPolicy, RunObserver};
use crate::constants::{ENGINE_VERSION, SEARCH_ATTRIBUTES_SIGNAL};
use crate::errors::{classify_error, CoreEngineError};
use crate::event::{EventStore, FlowEvent, FlowEventKind};
use crate::hashing::hash_value;
use crate::model::{Artifact, ExecutionContext, StepFingerprintInput};
use crate::repo::{FlowDefinition, FlowInstance, FlowRepository};
use crate::step::{RunStatus, StepDefinition, StepRunResult, StepSignal};

/// Clave de idempotencia: `propertyId` + hash canónico de los inputs.
pub fn idempotency_key(property_id: &str, inputs: &Value) -> String {
    format!("{property_id}:{}", hash_value(inputs))
}

/// Motor de ejecución durable.
///
/// Todas las transiciones se escriben primero en el `EventStore`; el estado
/// se obtiene siempre reproduciendo el journal, por eso un proceso nuevo
/// puede retomar un run con `resume` sin repetir steps ya exitosos.
pub struct FlowEngine<E, R>
    where E: EventStore,
          R: FlowRepository
{
    event_store: E,
    repository: R,
    policy: RetryPolicy,
    observers: Vec<Arc<dyn RunObserver>>,
    run_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<E, R> FlowEngine<E, R>
    where E: EventStore,
          R: FlowRepository
{
    /// Crea un nuevo builder para configurar el engine
    #[inline]
    pub fn builder(event_store: E, repository: R) -> EngineBuilder<E, R> {
        EngineBuilder::new(event_store, repository)
    }

    /// Crea un nuevo motor con los stores proporcionados y la política por defecto
    pub fn new_with_stores(event_store: E, repository: R) -> Self {
        Self::from_parts(event_store, repository, RetryPolicy::default(), Vec::new())
    }

    pub(crate) fn from_parts(event_store: E,
                             repository: R,
                             policy: RetryPolicy,
                             observers: Vec<Arc<dyn RunObserver>>)
                             -> Self {
        Self { event_store,
               repository,
               policy,
               observers,
               run_locks: DashMap::new() }
    }

    pub fn event_store(&self) -> &E {
        &self.event_store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn append(&self, run_id: Uuid, kind: FlowEventKind, artifacts: &[Artifact]) -> Result<FlowEvent, CoreEngineError> {
        let ev = self.event_store.append_with_artifacts(run_id, kind, artifacts)?;
        debug!("run {} seq {} {}", run_id, ev.seq, ev.kind.label());
        for o in &self.observers {
            o.on_event(&ev, artifacts);
        }
        Ok(ev)
    }

    fn run_lock(&self, run_id: Uuid) -> Arc<Mutex<()>> {
        self.run_locks
            .entry(run_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lista eventos del run (orden por seq).
    pub fn events_for(&self, run_id: Uuid) -> Result<Vec<FlowEvent>, CoreEngineError> {
        self.event_store.list(run_id)
    }

    /// Crea un run nuevo escribiendo `RunInitialized`.
    ///
    /// La detección de duplicados entre runs activos es responsabilidad del
    /// llamador; aquí sólo se rechaza reutilizar un `run_id` con historia.
    pub fn start(&self,
                 run_id: Uuid,
                 property_id: &str,
                 idempotency_key: String,
                 seed: Value,
                 definition: &FlowDefinition)
                 -> Result<FlowEvent, CoreEngineError> {
        if !self.event_store.list(run_id)?.is_empty() {
            return Err(CoreEngineError::Conflict(format!("run {run_id} already exists")));
        }
        info!("run {run_id} initialized for property {property_id}");
        self.append(run_id,
                    FlowEventKind::RunInitialized { property_id: property_id.to_string(),
                                                    definition_hash: definition.definition_hash.clone(),
                                                    step_count: definition.len(),
                                                    idempotency_key,
                                                    seed },
                    &[])
    }

    /// Estado reconstruido del run.
    pub fn instance(&self, run_id: Uuid, definition: &FlowDefinition) -> Result<FlowInstance, CoreEngineError> {
        let events = self.event_store.list(run_id)?;
        if events.is_empty() {
            return Err(CoreEngineError::UnknownRun(run_id));
        }
        Ok(self.repository.load(run_id, &events, definition))
    }

    fn is_cancelled(&self, run_id: Uuid) -> Result<bool, CoreEngineError> {
        Ok(self.event_store
               .list(run_id)?
               .iter()
               .any(|e| matches!(e.kind, FlowEventKind::RunCancelled { .. })))
    }

    /// Cancela un run no terminal. No toma el lock de ejecución: el driver
    /// observa la cancelación antes de cada intento y antes de confirmar.
    pub fn cancel(&self, run_id: Uuid, reason: &str, definition: &FlowDefinition) -> Result<(), CoreEngineError> {
        let inst = self.instance(run_id, definition)?;
        if inst.is_terminal() {
            return Err(CoreEngineError::InvalidState(format!("run {run_id} is already {}", inst.status.as_str())));
        }
        self.append(run_id, FlowEventKind::RunCancelled { reason: reason.to_string() }, &[])?;
        // El driver no suelta el lock durante un step, así que el cierre puede
        // haberse escrito entre la lectura y el append: manda el journal.
        let after = self.instance(run_id, definition)?;
        if after.status != RunStatus::Cancelled {
            warn!("run {run_id} closed as {} before the cancellation landed", after.status.as_str());
            return Err(CoreEngineError::InvalidState(format!("run {run_id} is already {}", after.status.as_str())));
        }
        info!("run {run_id} cancelled: {reason}");
        Ok(())
    }

    /// Ejecuta hasta estado terminal. `Ok` sólo si el run quedó `Completed`.
    pub fn run_to_completion(&self, run_id: Uuid, definition: &FlowDefinition) -> Result<FlowInstance, CoreEngineError> {
        let outcome = loop {
            match self.next_with(run_id, definition) {
                Ok(()) => continue,
                Err(CoreEngineError::FlowCompleted) => break self.instance(run_id, definition),
                Err(e) => break Err(e),
            }
        };
        self.run_locks.remove(&run_id);
        outcome
    }

    /// Retoma un run tras un reinicio: los steps `Succeeded` no se re-ejecutan.
    pub fn resume(&self, run_id: Uuid, definition: &FlowDefinition) -> Result<FlowInstance, CoreEngineError> {
        let inst = self.instance(run_id, definition)?;
        if !inst.is_terminal() {
            info!("resuming run {} at step {} ({}/{})",
                  run_id,
                  inst.steps.get(inst.cursor).map_or("<complete>", |s| s.step_id.as_str()),
                  inst.cursor,
                  definition.len());
        }
        self.run_to_completion(run_id, definition)
    }

    /// Ejecuta exactamente un step (con su bucle de reintentos).
    ///
    /// Devuelve `Err(FlowCompleted)` cuando ya no queda nada por hacer,
    /// `Err(FlowHasFailed)` / `Err(Cancelled)` si el run está cerrado.
    pub fn next_with(&self, run_id: Uuid, definition: &FlowDefinition) -> Result<(), CoreEngineError> {
        let lock = self.run_lock(run_id);
        let _guard = lock.lock()
                         .map_err(|_| CoreEngineError::Internal(format!("run lock poisoned for {run_id}")))?;

        let inst = self.instance(run_id, definition)?;
        match inst.status {
            RunStatus::Completed => return Err(CoreEngineError::FlowCompleted),
            RunStatus::Failed => return Err(CoreEngineError::FlowHasFailed),
            RunStatus::Cancelled => return Err(CoreEngineError::Cancelled),
            RunStatus::Pending => return Err(CoreEngineError::InvalidState(format!("run {run_id} not initialized"))),
            RunStatus::Running => {}
        }

        let cursor = inst.cursor;
        if cursor >= definition.len() {
            // Crash entre el último StepFinished y RunCompleted.
            self.complete_flow(run_id, definition)?;
            return Ok(());
        }

        let step_def = definition.steps[cursor].as_ref();
        let inputs = self.collect_inputs(&inst, cursor)?;
        let params = step_def.base_params();
        let mut attempt = inst.steps[cursor].attempts;
        let mut last_error = inst.steps[cursor].last_error.clone();

        loop {
            if self.is_cancelled(run_id)? {
                return Err(CoreEngineError::Cancelled);
            }
            attempt += 1;
            if attempt > self.policy.max_attempts {
                let error = last_error.unwrap_or_else(|| {
                                          CoreEngineError::Internal(format!("step '{}' exhausted {} attempts",
                                                                            step_def.id(),
                                                                            self.policy.max_attempts))
                                      });
                warn!("run {run_id} step '{}' out of attempts: {error}", step_def.id());
                self.append(run_id,
                            FlowEventKind::RunFailed { step_id: step_def.id().to_string(),
                                                       error: error.clone() },
                            &[])?;
                return Err(error);
            }

            self.append(run_id,
                        FlowEventKind::StepStarted { step_index: cursor,
                                                     step_id: step_def.id().to_string(),
                                                     attempt },
                        &[])?;

            let ctx = ExecutionContext { run_id,
                                         seed: inst.seed.clone(),
                                         inputs: inputs.clone(),
                                         params: params.clone(),
                                         attempt };

            let (outputs, signals) = match step_def.run(&ctx) {
                StepRunResult::Success { outputs } => (outputs, Vec::new()),
                StepRunResult::SuccessWithSignals { outputs, signals } => (outputs, signals),
                StepRunResult::Failure { error } => {
                    let retryable = classify_error(&error).is_retryable() && attempt < self.policy.max_attempts;
                    warn!("run {run_id} step '{}' attempt {attempt} failed: {error}", step_def.id());
                    self.append(run_id,
                                FlowEventKind::StepFailed { step_index: cursor,
                                                            step_id: step_def.id().to_string(),
                                                            attempt,
                                                            error: error.clone(),
                                                            retryable },
                                &[])?;
                    if !retryable {
                        self.append(run_id,
                                    FlowEventKind::RunFailed { step_id: step_def.id().to_string(),
                                                               error: error.clone() },
                                    &[])?;
                        return Err(error);
                    }
                    let delay = self.policy.delay_for(attempt);
                    self.append(run_id,
                                FlowEventKind::RetryScheduled { step_index: cursor,
                                                                step_id: step_def.id().to_string(),
                                                                retry_index: attempt,
                                                                delay_ms: delay.as_millis() as u64 },
                                &[])?;
                    std::thread::sleep(delay);
                    last_error = Some(error);
                    continue;
                }
            };

            return self.commit_step(run_id, cursor, step_def, outputs, signals, &inputs, &params, definition);
        }
    }

    /// Artifacts de todos los steps previos, indexados por step id.
    fn collect_inputs(&self, inst: &FlowInstance, cursor: usize) -> Result<BTreeMap<String, Artifact>, CoreEngineError> {
        let mut inputs = BTreeMap::new();
        for slot in &inst.steps[..cursor] {
            let Some(hash) = slot.outputs.first() else {
                continue;
            };
            let artifact = self.event_store
                               .load_artifact(hash)?
                               .ok_or_else(|| CoreEngineError::MissingInputs(format!("artifact {hash} of '{}'", slot.step_id)))?;
            inputs.insert(slot.step_id.clone(), artifact);
        }
        Ok(inputs)
    }

    #[allow(clippy::too_many_arguments)]
    fn commit_step(&self,
                   run_id: Uuid,
                   cursor: usize,
                   step_def: &dyn StepDefinition,
                   mut outputs: Vec<Artifact>,
                   signals: Vec<StepSignal>,
                   inputs: &BTreeMap<String, Artifact>,
                   params: &Value,
                   definition: &FlowDefinition)
                   -> Result<(), CoreEngineError> {
        let output_hashes: Vec<String> = outputs.iter_mut()
                                                .map(|o| {
                                                    o.hash = hash_value(&o.payload);
                                                    o.hash.clone()
                                                })
                                                .collect();

        if self.is_cancelled(run_id)? {
            info!("run {run_id} cancelled while '{}' ran; output discarded", step_def.id());
            return Err(CoreEngineError::Cancelled);
        }

        for s in signals {
            let kind = if s.signal == SEARCH_ATTRIBUTES_SIGNAL {
                FlowEventKind::SearchAttributesUpserted { attributes: string_map(&s.data) }
            } else {
                FlowEventKind::StepSignal { step_index: cursor,
                                            step_id: step_def.id().to_string(),
                                            signal: s.signal,
                                            data: s.data }
            };
            self.append(run_id, kind, &[])?;
        }

        let mut input_hashes: Vec<String> = inputs.values().map(|a| a.hash.clone()).collect();
        input_hashes.sort();
        let fp_input = StepFingerprintInput { engine_version: ENGINE_VERSION,
                                              definition_hash: &definition.definition_hash,
                                              step_index: cursor,
                                              step_id: step_def.id(),
                                              input_hashes: &input_hashes,
                                              output_hashes: &output_hashes,
                                              params };
        let fp_value =
            serde_json::to_value(&fp_input).map_err(|e| CoreEngineError::Internal(format!("fingerprint: {e}")))?;
        let fingerprint = hash_value(&fp_value);

        self.append(run_id,
                    FlowEventKind::StepFinished { step_index: cursor,
                                                  step_id: step_def.id().to_string(),
                                                  outputs: output_hashes,
                                                  fingerprint },
                    &outputs)?;

        if cursor + 1 == definition.len() {
            self.complete_flow(run_id, definition)?;
        }
        Ok(())
    }

    fn complete_flow(&self, run_id: Uuid, definition: &FlowDefinition) -> Result<(), CoreEngineError> {
        let inst = self.instance(run_id, definition)?;
        let step_fps: Vec<String> = inst.steps.iter().filter_map(|s| s.fingerprint.clone()).collect();
        let flow_fp = hash_value(&json!({
                                     "engine_version": ENGINE_VERSION,
                                     "definition_hash": definition.definition_hash,
                                     "step_fingerprints": step_fps
                                 }));
        info!("run {run_id} completed");
        self.append(run_id, FlowEventKind::RunCompleted { flow_fingerprint: flow_fp }, &[])?;
        Ok(())
    }
}

/// Aplana un objeto JSON a `String -> String`; los valores no string se
/// serializan en su forma JSON.
fn string_map(data: &Value) -> BTreeMap<String, String> {
    data.as_object()
        .map(|m| {
            m.iter()
             .map(|(k, v)| {
                 let s = v.as_str().map_or_else(|| v.to_string(), str::to_string);
                 (k.clone(), s)
             })
             .collect()
        })
        .unwrap_or_default()
}
