//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas y de ahí al
//! error del core.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use prop_core::CoreEngineError;
use prop_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl PersistenceError {
    /// Errores que vale la pena repetir con un backoff corto.
    ///
    /// Algunos fallos de conexión llegan como `Unknown` con texto; se
    /// detectan por mensaje sin acoplarse a SQLSTATE.
    pub fn is_retryable(&self) -> bool {
        match self {
            PersistenceError::SerializationConflict | PersistenceError::TransientIo(_) => true,
            PersistenceError::Unknown(msg) => {
                let m = msg.to_lowercase();
                m.contains("deadlock detected")
                || m.contains("could not serialize access")
                || m.contains("terminating connection")
                || m.contains("connection closed")
                || m.contains("connection refused")
                || m.contains("timeout")
            }
            _ => false,
        }
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Codec(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Codec(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            other => Self::Unknown(format!("diesel error: {other}")),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Codec(e.to_string())
    }
}

impl From<PersistenceError> for CoreEngineError {
    fn from(e: PersistenceError) -> Self {
        CoreEngineError::Persistence(e.to_string())
    }
}

impl From<PersistenceError> for DomainError {
    fn from(e: PersistenceError) -> Self {
        DomainError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failures_are_retryable_constraint_failures_are_not() {
        assert!(PersistenceError::SerializationConflict.is_retryable());
        assert!(PersistenceError::TransientIo("pool timed out".into()).is_retryable());
        assert!(PersistenceError::Unknown("Connection refused (os error 111)".into()).is_retryable());
        assert!(!PersistenceError::UniqueViolation("dup".into()).is_retryable());
        assert!(!PersistenceError::Codec("bad json".into()).is_retryable());
    }

    #[test]
    fn maps_into_core_and_domain_errors() {
        let core: CoreEngineError = PersistenceError::NotFound.into();
        assert_eq!(core, CoreEngineError::Persistence("not found".into()));
        let dom: DomainError = PersistenceError::Config("x".into()).into();
        assert!(matches!(dom, DomainError::Storage(_)));
    }
}
