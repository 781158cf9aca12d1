//! Errores del motor y clasificación para la política de reintentos.
//!
//! `CoreEngineError` viaja dentro de los eventos `StepFailed` / `RunFailed`,
//! por eso es `Serialize + Deserialize` y sólo contiene strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum CoreEngineError {
    /// Entrada mal formada (start / revalue). Nunca se reintenta.
    #[error("validation error: {0}")]
    Validation(String),
    /// No existe registro de propiedad o venta. Terminal.
    #[error("not found: {0}")]
    NotFound(String),
    /// Fallo transitorio de la fuente externa. Se reintenta con backoff.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// Precondiciones de las calculadoras violadas. Determinista, terminal.
    #[error("compute error: {0}")]
    Compute(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Fallo de escritura/lectura del journal durable.
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("run cancelled")]
    Cancelled,
    #[error("unknown run {0}")]
    UnknownRun(Uuid),
    #[error("flow already completed")]
    FlowCompleted,
    #[error("flow has failed previously (stop-on-failure invariant)")]
    FlowHasFailed,
    #[error("missing required inputs: {0}")]
    MissingInputs(String),
    #[error("internal: {0}")]
    Internal(String),
}

/// Clase de error usada por el engine para decidir si reintentar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    Validation,
    Transient,
    Permanent,
    Runtime,
}

impl ErrorClass {
    /// Sólo los errores transitorios se reintentan.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Transient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Validation => "validation",
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Runtime => "runtime",
        }
    }
}

/// Clasifica un error del core.
///
/// `Persistence` es `Runtime`: es fatal para el intento en curso y la
/// recuperación se hace vía reinicio + `resume`, no reintentando en caliente.
pub fn classify_error(err: &CoreEngineError) -> ErrorClass {
    match err {
        CoreEngineError::UpstreamUnavailable(_) => ErrorClass::Transient,
        CoreEngineError::Validation(_) | CoreEngineError::MissingInputs(_) => ErrorClass::Validation,
        CoreEngineError::NotFound(_)
        | CoreEngineError::Compute(_)
        | CoreEngineError::Conflict(_)
        | CoreEngineError::InvalidState(_)
        | CoreEngineError::Cancelled
        | CoreEngineError::UnknownRun(_)
        | CoreEngineError::FlowCompleted
        | CoreEngineError::FlowHasFailed => ErrorClass::Permanent,
        CoreEngineError::Persistence(_) | CoreEngineError::Internal(_) => ErrorClass::Runtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_upstream_failures_are_retryable() {
        assert!(classify_error(&CoreEngineError::UpstreamUnavailable("503".into())).is_retryable());
        assert!(!classify_error(&CoreEngineError::NotFound("sale".into())).is_retryable());
        assert!(!classify_error(&CoreEngineError::Compute("empty comparables".into())).is_retryable());
        assert!(!classify_error(&CoreEngineError::Persistence("write".into())).is_retryable());
    }

    #[test]
    fn error_roundtrips_through_json() {
        let e = CoreEngineError::Compute("zero area".into());
        let v = serde_json::to_value(&e).unwrap();
        let back: CoreEngineError = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
        assert_eq!(classify_error(&back).as_str(), "permanent");
    }
}
