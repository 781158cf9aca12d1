use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use super::{Artifact, ArtifactSpec};
use crate::errors::CoreEngineError;

/// Contexto de ejecución entregado a `StepDefinition::run`.
///
/// `inputs` contiene el output de cada step previo ya marcado como exitoso,
/// indexado por `step_id`; así un step de cómputo puede leer todo lo
/// acumulado y no sólo el output inmediatamente anterior.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub seed: Value,
    pub inputs: BTreeMap<String, Artifact>,
    pub params: Value,
    pub attempt: u32,
}

impl ExecutionContext {
    pub fn input(&self, step_id: &str) -> Option<&Artifact> {
        self.inputs.get(step_id)
    }

    /// Decodifica el output tipado de un step previo.
    pub fn decode_input<T: ArtifactSpec>(&self, step_id: &str) -> Result<T, CoreEngineError> {
        let artifact = self.input(step_id)
                           .ok_or_else(|| CoreEngineError::MissingInputs(format!("output of '{step_id}'")))?;
        T::from_artifact(artifact).map_err(|e| CoreEngineError::Internal(format!("decode '{step_id}': {e}")))
    }

    pub fn seed_as<T: DeserializeOwned>(&self) -> Result<T, CoreEngineError> {
        serde_json::from_value(self.seed.clone()).map_err(|e| CoreEngineError::Validation(format!("seed: {e}")))
    }

    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, CoreEngineError> {
        serde_json::from_value(self.params.clone()).map_err(|e| CoreEngineError::Internal(format!("params: {e}")))
    }
}
