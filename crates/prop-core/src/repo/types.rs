//! Tipos de repositorio: estado reconstruido (FlowInstance) y definición
//! (FlowDefinition).
//!
//! El repositorio aplica un replay lineal: consume eventos en orden y
//! actualiza un `FlowInstance`. No almacena artifacts completos (sólo
//! hashes); el contenido se recupera del `EventStore` por hash.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::PROPERTY_ID_ATTRIBUTE;
use crate::errors::CoreEngineError;
use crate::event::{FlowEvent, FlowEventKind};
use crate::step::{RunStatus, StepDefinition, StepStatus};

#[derive(Debug, Clone)]
pub struct FlowInstance {
    pub id: Uuid,
    pub property_id: String,
    pub idempotency_key: String,
    pub seed: Value,
    pub status: RunStatus,
    pub steps: Vec<StepSlot>,
    pub cursor: usize,
    pub search_attributes: BTreeMap<String, String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<CoreEngineError>,
    pub flow_fingerprint: Option<String>,
}

impl FlowInstance {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn slot(&self, step_id: &str) -> Option<&StepSlot> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn succeeded(&self, step_id: &str) -> bool {
        self.slot(step_id)
            .is_some_and(|s| s.status == StepStatus::Succeeded)
    }

    /// Primer hash de output de un step exitoso.
    pub fn output_hash(&self, step_id: &str) -> Option<&str> {
        self.slot(step_id)
            .filter(|s| s.status == StepStatus::Succeeded)
            .and_then(|s| s.outputs.first())
            .map(String::as_str)
    }
}

/// Estado de un step en la instancia.
#[derive(Debug, Clone)]
pub struct StepSlot {
    pub step_id: String,
    pub status: StepStatus,
    pub fingerprint: Option<String>,
    pub outputs: Vec<String>, // sólo hashes
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts: u32, // intentos iniciados, incluidos los interrumpidos por un reinicio
    pub last_error: Option<CoreEngineError>,
}

/// Trait para reconstruir (`replay`) estado de un run a partir de eventos.
pub trait FlowRepository: Send + Sync {
    fn load(&self, run_id: Uuid, events: &[FlowEvent], definition: &FlowDefinition) -> FlowInstance;
}

/// Definición inmutable del Flow.
pub struct FlowDefinition {
    pub steps: Vec<Box<dyn StepDefinition>>,
    pub definition_hash: String,
}

impl FlowDefinition {
    pub fn new(steps: Vec<Box<dyn StepDefinition>>, definition_hash: String) -> Self {
        Self { steps, definition_hash }
    }
    pub fn len(&self) -> usize {
        self.steps.len()
    }
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
    pub fn index_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id() == step_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFlowRepository;

impl InMemoryFlowRepository {
    pub fn new() -> Self {
        Self
    }
}

impl FlowRepository for InMemoryFlowRepository {
    fn load(&self, run_id: Uuid, events: &[FlowEvent], definition: &FlowDefinition) -> FlowInstance {
        let steps: Vec<StepSlot> = definition.steps
                                             .iter()
                                             .map(|s| StepSlot { step_id: s.id().to_string(),
                                                                 status: StepStatus::Pending,
                                                                 fingerprint: None,
                                                                 outputs: vec![],
                                                                 started_at: None,
                                                                 finished_at: None,
                                                                 attempts: 0,
                                                                 last_error: None })
                                             .collect();
        let mut inst = FlowInstance { id: run_id,
                                      property_id: String::new(),
                                      idempotency_key: String::new(),
                                      seed: Value::Null,
                                      status: RunStatus::Pending,
                                      steps,
                                      cursor: 0,
                                      search_attributes: BTreeMap::new(),
                                      started_at: None,
                                      finished_at: None,
                                      last_error: None,
                                      flow_fingerprint: None };
        for ev in events {
            if inst.is_terminal() {
                break;
            }
            match &ev.kind {
                FlowEventKind::RunInitialized { property_id,
                                                idempotency_key,
                                                seed,
                                                .. } => {
                    inst.property_id = property_id.clone();
                    inst.idempotency_key = idempotency_key.clone();
                    inst.seed = seed.clone();
                    inst.status = RunStatus::Running;
                    inst.started_at = Some(ev.ts);
                    inst.search_attributes
                        .insert(PROPERTY_ID_ATTRIBUTE.to_string(), property_id.clone());
                }
                FlowEventKind::StepStarted { step_index, attempt, .. } => {
                    if let Some(slot) = inst.steps.get_mut(*step_index) {
                        slot.status = StepStatus::Running;
                        slot.started_at = Some(ev.ts);
                        slot.finished_at = None;
                        slot.attempts = slot.attempts.max(*attempt);
                    }
                }
                FlowEventKind::StepFinished { step_index,
                                              outputs,
                                              fingerprint,
                                              .. } => {
                    if let Some(slot) = inst.steps.get_mut(*step_index) {
                        slot.status = StepStatus::Succeeded;
                        slot.fingerprint = Some(fingerprint.clone());
                        slot.outputs = outputs.clone();
                        slot.finished_at = Some(ev.ts);
                        slot.last_error = None;
                    }
                }
                FlowEventKind::StepFailed { step_index, error, .. } => {
                    if let Some(slot) = inst.steps.get_mut(*step_index) {
                        slot.status = StepStatus::Failed;
                        slot.finished_at = Some(ev.ts);
                        slot.last_error = Some(error.clone());
                    }
                    inst.last_error = Some(error.clone());
                }
                FlowEventKind::RetryScheduled { step_index, .. } => {
                    if let Some(slot) = inst.steps.get_mut(*step_index) {
                        slot.status = StepStatus::Pending;
                    }
                }
                FlowEventKind::StepSignal { .. } => {}
                FlowEventKind::SearchAttributesUpserted { attributes } => {
                    inst.search_attributes
                        .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                FlowEventKind::RunFailed { error, .. } => {
                    inst.status = RunStatus::Failed;
                    inst.finished_at = Some(ev.ts);
                    inst.last_error = Some(error.clone());
                }
                FlowEventKind::RunCancelled { .. } => {
                    inst.status = RunStatus::Cancelled;
                    inst.finished_at = Some(ev.ts);
                }
                FlowEventKind::RunCompleted { flow_fingerprint } => {
                    inst.status = RunStatus::Completed;
                    inst.finished_at = Some(ev.ts);
                    inst.flow_fingerprint = Some(flow_fingerprint.clone());
                }
            }
        }
        inst.cursor = inst.steps
                          .iter()
                          .position(|s| s.status != StepStatus::Succeeded)
                          .unwrap_or(inst.steps.len());
        inst
    }
}

pub fn build_flow_definition(step_ids: &[&str], steps: Vec<Box<dyn StepDefinition>>) -> FlowDefinition {
    use crate::hashing::{hash_str, to_canonical_json};
    use serde_json::json;
    let ids_json = json!(step_ids);
    let canonical = to_canonical_json(&ids_json);
    let definition_hash = hash_str(&canonical);
    FlowDefinition::new(steps, definition_hash)
}

/// Builder alternativo: recibe directamente los steps y extrae sus ids en
/// orden.
pub fn build_flow_definition_auto(steps: Vec<Box<dyn StepDefinition>>) -> FlowDefinition {
    let ids: Vec<String> = steps.iter().map(|s| s.id().to_string()).collect();
    let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
    build_flow_definition(&id_refs, steps)
}
