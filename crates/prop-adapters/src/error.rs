use prop_core::CoreEngineError;
use prop_domain::DomainError;
use thiserror::Error;

/// Errores al preparar una fuente de datos (arranque), no durante un step.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("dataset io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dataset parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("upstream config error: {0}")]
    Config(String),
}

/// Traduce un error de dominio a la taxonomía del engine.
pub fn domain_error(e: DomainError) -> CoreEngineError {
    match e {
        DomainError::Validation(m) => CoreEngineError::Validation(m),
        DomainError::Compute(m) => CoreEngineError::Compute(m),
        DomainError::Storage(m) => CoreEngineError::Persistence(m),
    }
}
