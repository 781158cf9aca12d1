use serde_json::Value;

use crate::{errors::CoreEngineError, model::Artifact};

/// Resultado abstracto de ejecutar un step.
pub enum StepRunResult {
    Success { outputs: Vec<Artifact> },
    /// Éxito con señales; se registran antes del `StepFinished`.
    SuccessWithSignals { outputs: Vec<Artifact>, signals: Vec<StepSignal> },
    Failure { error: CoreEngineError },
}

impl StepRunResult {
    pub fn failure(error: impl Into<CoreEngineError>) -> Self {
        StepRunResult::Failure { error: error.into() }
    }
}

impl From<Result<Artifact, CoreEngineError>> for StepRunResult {
    fn from(r: Result<Artifact, CoreEngineError>) -> Self {
        match r {
            Ok(a) => StepRunResult::Success { outputs: vec![a] },
            Err(error) => StepRunResult::Failure { error },
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepSignal {
    pub signal: String,
    pub data: Value,
}
