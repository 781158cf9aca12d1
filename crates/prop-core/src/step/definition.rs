use serde_json::Value;

use super::run_result::StepRunResult;
use crate::model::ExecutionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Source,
    Transform,
    Sink,
}

/// Trait que define un Step. El resultado debe depender sólo del seed, los
/// inputs y los params; los efectos externos (HTTP) se consideran lecturas.
pub trait StepDefinition: Send + Sync {
    /// Identificador estable y único dentro del Flow.
    fn id(&self) -> &str;

    /// Nombre opcional amigable.
    fn name(&self) -> &str {
        self.id()
    }

    /// Parámetros deterministas; entran en el fingerprint del step.
    fn base_params(&self) -> Value;

    fn run(&self, ctx: &ExecutionContext) -> StepRunResult;

    fn kind(&self) -> StepKind;
}
