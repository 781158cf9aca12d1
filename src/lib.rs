//! PropFlow: orquestación de valoraciones inmobiliarias.
//!
//! Este crate une las piezas del workspace en un servicio:
//! - `service`: start / cancel / query / progress / resultados / revaluación.
//! - `registry` y `recorder`: observers del engine (visibilidad e historial).
//! - `schedules`: revaloración periódica (semanal) por propiedad.
//! - `http`: API JSON sobre el servicio.
//! - `config`: configuración por variables de entorno.

pub mod config;
pub mod errors;
pub mod http;
pub mod recorder;
pub mod registry;
pub mod revaluation;
pub mod schedules;
pub mod service;

pub use config::AppConfig;
pub use errors::{ConfigError, ServiceError};
pub use registry::{RunQuery, RunRegistry, RunSummary};
pub use schedules::{ScheduleInfo, WEEKLY};
pub use service::{RunProgress, ServiceSettings, StartOutcome, StartRequest, ValuationService};
