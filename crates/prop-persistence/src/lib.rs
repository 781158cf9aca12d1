//! prop-persistence
//!
//! Implementaciones Postgres (Diesel + r2d2) del journal de runs y del
//! historial de resultados.
//!
//! Módulos:
//! - `pg`: `PgEventStore` (event_log + run_artifacts + step_execution_errors)
//!   y `PgResultHistory` (valuation_history).
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgEventStore, PgPool, PgResultHistory, PoolProvider};
