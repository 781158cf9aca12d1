//! Constantes del motor core.
//!
//! Valores estáticos que participan en el cálculo de fingerprints. Cambios en
//! `ENGINE_VERSION` invalidan deterministamente los fingerprints previos.

/// Versión lógica del motor. Se incluye en el fingerprint de cada step.
pub const ENGINE_VERSION: &str = "PF1.0";

/// Nombre de la señal que un step emite para actualizar atributos de búsqueda
/// del run (p. ej. municipio o nivel de riesgo).
pub const SEARCH_ATTRIBUTES_SIGNAL: &str = "search_attributes";

/// Atributo de búsqueda fijado por el propio `RunInitialized`.
pub const PROPERTY_ID_ATTRIBUTE: &str = "propertyId";
