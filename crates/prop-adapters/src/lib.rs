//! prop-adapters: capa de adaptación Dominio ↔ Core
//!
//! Este crate provee:
//! - Artifacts tipados para cada output del pipeline de valoración.
//! - Fuentes de datos (`PropertyDataSource`): dataset local y upstream HTTP.
//! - Los siete steps del pipeline y `valuation_definition`, que los ordena.
//!
//! Nota: el core sólo conoce `Artifact { kind, hash, payload, metadata }`;
//! aquí se fija la forma del `payload` de cada paso.

pub mod artifacts;
pub mod dataset;
pub mod error;
pub mod limiter;
pub mod pipeline;
pub mod seed;
pub mod source;
pub mod steps;
pub mod upstream;

pub use dataset::DatasetSource;
pub use error::{domain_error, AdapterError};
pub use limiter::RateCeiling;
pub use pipeline::{valuation_definition, PipelineConfig};
pub use seed::SeedInputs;
pub use source::PropertyDataSource;
pub use upstream::UpstreamSource;
