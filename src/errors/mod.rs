//! Errores del servicio y de la configuración.

pub mod config_error;
pub mod service_error;

pub use config_error::ConfigError;
pub use service_error::ServiceError;
