//! Tipado fuerte opcional para `Artifact` manteniendo el núcleo agnóstico.
//! Permite describir artifacts con un tipo de datos concreto y validaciones.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{Artifact, ArtifactKind};
use crate::errors::CoreEngineError;

/// Errores posibles al decodificar un artifact tipado.
#[derive(Debug, Error)]
pub enum ArtifactDecodeError {
    #[error("kind mismatch: expected {expected:?}, found {found:?}")]
    KindMismatch { expected: ArtifactKind, found: ArtifactKind },
    #[error("schema version mismatch: expected {expected}, found {found:?}")]
    VersionMismatch { expected: u32, found: Option<u32> },
    #[error("deserialize: {0}")]
    Deserialize(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Especificación de un artifact tipado.
pub trait ArtifactSpec: Sized + Serialize + DeserializeOwned + Clone {
    /// Nombre estable del kind (distingue artifacts en runtime).
    const KIND_NAME: &'static str;
    /// Versión de esquema (incrementar en cambios incompatibles).
    const SCHEMA_VERSION: u32 = 1;

    fn kind() -> ArtifactKind {
        ArtifactKind::Named(Self::KIND_NAME.to_string())
    }

    /// Validación semántica ligera (sin efectos secundarios).
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Serializa a `Artifact` sin hash (lo añade el engine). Inserta
    /// `schema_version` si el tipo no lo trae.
    fn into_artifact(self) -> Result<Artifact, CoreEngineError> {
        let mut value = serde_json::to_value(&self).map_err(|e| CoreEngineError::Internal(format!("serialize {}: {e}", Self::KIND_NAME)))?;
        if let Value::Object(map) = &mut value {
            map.entry("schema_version".to_string())
               .or_insert(Value::from(Self::SCHEMA_VERSION));
        }
        Ok(Artifact::new_unhashed(Self::kind(), value, None))
    }

    /// Decodifica verificando kind, versión y validación.
    fn from_artifact(a: &Artifact) -> Result<Self, ArtifactDecodeError> {
        if a.kind != Self::kind() {
            return Err(ArtifactDecodeError::KindMismatch { expected: Self::kind(),
                                                           found: a.kind.clone() });
        }
        let found = a.payload
                     .get("schema_version")
                     .and_then(|v| v.as_u64())
                     .map(|v| v as u32);
        if found != Some(Self::SCHEMA_VERSION) {
            return Err(ArtifactDecodeError::VersionMismatch { expected: Self::SCHEMA_VERSION,
                                                              found });
        }
        let decoded: Self =
            serde_json::from_value(a.payload.clone()).map_err(|e| ArtifactDecodeError::Deserialize(e.to_string()))?;
        decoded.validate().map_err(ArtifactDecodeError::Validation)?;
        Ok(decoded)
    }
}
