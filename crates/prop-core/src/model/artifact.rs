//! Artifact neutral del flujo.
//!
//! Un `Artifact` es la unidad de datos que un step deja en el journal:
//! - `payload` es JSON genérico; el motor no interpreta su semántica.
//! - `hash` lo calcula el engine sobre el JSON canonicalizado y es la
//!   identidad usada en fingerprints y en la tabla de artifacts.
//! - `metadata` permite anotar información auxiliar que no entra al hash.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tipos neutrales de artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// JSON genérico sin semántica.
    GenericJson,
    /// Artifact tipado; el nombre lo fija `ArtifactSpec::KIND_NAME`.
    Named(String),
}

impl ArtifactKind {
    pub fn label(&self) -> &str {
        match self {
            ArtifactKind::GenericJson => "generic_json",
            ArtifactKind::Named(name) => name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub hash: String,            // hash canónico del payload (asignado por engine)
    pub payload: Value,          // contenido neutro JSON
    pub metadata: Option<Value>, // información auxiliar (no entra al hash)
}

impl Artifact {
    /// Constructor sin hash; el engine lo completa al persistir.
    pub fn new_unhashed(kind: ArtifactKind, payload: Value, metadata: Option<Value>) -> Self {
        Self { kind,
               hash: String::new(),
               payload,
               metadata }
    }
}
