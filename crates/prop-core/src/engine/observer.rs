use crate::event::FlowEvent;
use crate::model::Artifact;

/// Observador síncrono del journal.
///
/// El engine lo invoca después de cada append durable, en el mismo hilo del
/// driver del run; `artifacts` son los persistidos junto al evento (vacío
/// salvo en `StepFinished`). Las proyecciones (registry, historial) se
/// construyen así, y también al reproducir el journal en el arranque.
pub trait RunObserver: Send + Sync {
    fn on_event(&self, event: &FlowEvent, artifacts: &[Artifact]);
}
