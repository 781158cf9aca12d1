use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Datos de entrada mal formados (se detecta al construir el modelo).
    #[error("validation error: {0}")]
    Validation(String),
    /// Precondición de una calculadora violada o resultado no finito.
    #[error("compute error: {0}")]
    Compute(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::Validation(e.to_string())
    }
}
