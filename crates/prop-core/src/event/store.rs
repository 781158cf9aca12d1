use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use super::{FlowEvent, FlowEventKind};
use crate::errors::CoreEngineError;
use crate::model::Artifact;

/// Almacenamiento de eventos append-only.
///
/// Las implementaciones se comparten entre hilos (un driver por run), por
/// eso todos los métodos toman `&self`.
pub trait EventStore: Send + Sync {
    /// Agrega un evento sin artifacts y devuelve el evento completo (con seq y ts).
    fn append_kind(&self, run_id: Uuid, kind: FlowEventKind) -> Result<FlowEvent, CoreEngineError> {
        self.append_with_artifacts(run_id, kind, &[])
    }

    /// Agrega un evento y los artifacts que produjo en una única escritura
    /// atómica: o ambos quedan durables o ninguno.
    fn append_with_artifacts(&self,
                             run_id: Uuid,
                             kind: FlowEventKind,
                             artifacts: &[Artifact])
                             -> Result<FlowEvent, CoreEngineError>;

    /// Lista eventos de un run (orden ascendente por seq).
    fn list(&self, run_id: Uuid) -> Result<Vec<FlowEvent>, CoreEngineError>;

    /// Ids de todos los runs con al menos un evento.
    fn list_run_ids(&self) -> Result<Vec<Uuid>, CoreEngineError>;

    /// Recupera un artifact por hash.
    fn load_artifact(&self, hash: &str) -> Result<Option<Artifact>, CoreEngineError>;
}

impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    fn append_kind(&self, run_id: Uuid, kind: FlowEventKind) -> Result<FlowEvent, CoreEngineError> {
        (**self).append_kind(run_id, kind)
    }
    fn append_with_artifacts(&self,
                             run_id: Uuid,
                             kind: FlowEventKind,
                             artifacts: &[Artifact])
                             -> Result<FlowEvent, CoreEngineError> {
        (**self).append_with_artifacts(run_id, kind, artifacts)
    }
    fn list(&self, run_id: Uuid) -> Result<Vec<FlowEvent>, CoreEngineError> {
        (**self).list(run_id)
    }
    fn list_run_ids(&self) -> Result<Vec<Uuid>, CoreEngineError> {
        (**self).list_run_ids()
    }
    fn load_artifact(&self, hash: &str) -> Result<Option<Artifact>, CoreEngineError> {
        (**self).load_artifact(hash)
    }
}

#[derive(Default)]
struct MemState {
    events: HashMap<Uuid, Vec<FlowEvent>>,
    order: Vec<Uuid>,
    artifacts: HashMap<String, Artifact>,
}

/// Store en memoria. Útil para tests y para el modo sin `DATABASE_URL`.
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: Mutex<MemState>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemState>, CoreEngineError> {
        self.inner
            .lock()
            .map_err(|_| CoreEngineError::Internal("in-memory event store poisoned".into()))
    }
}

impl EventStore for InMemoryEventStore {
    fn append_with_artifacts(&self,
                             run_id: Uuid,
                             kind: FlowEventKind,
                             artifacts: &[Artifact])
                             -> Result<FlowEvent, CoreEngineError> {
        let mut st = self.lock()?;
        for a in artifacts {
            st.artifacts.entry(a.hash.clone()).or_insert_with(|| a.clone());
        }
        if !st.events.contains_key(&run_id) {
            st.order.push(run_id);
        }
        let vec = st.events.entry(run_id).or_default();
        let seq = vec.len() as u64;
        let ev = FlowEvent { seq,
                             run_id,
                             kind,
                             ts: Utc::now() };
        vec.push(ev.clone());
        Ok(ev)
    }

    fn list(&self, run_id: Uuid) -> Result<Vec<FlowEvent>, CoreEngineError> {
        Ok(self.lock()?.events.get(&run_id).cloned().unwrap_or_default())
    }

    fn list_run_ids(&self) -> Result<Vec<Uuid>, CoreEngineError> {
        Ok(self.lock()?.order.clone())
    }

    fn load_artifact(&self, hash: &str) -> Result<Option<Artifact>, CoreEngineError> {
        Ok(self.lock()?.artifacts.get(hash).cloned())
    }
}
