//! Implementaciones Postgres (Diesel) de los traits del core y del dominio.
//!
//! - `PgEventStore`: journal append-only con orden total por `seq`
//!   (BIGSERIAL). Los artifacts de un `StepFinished` se insertan en la MISMA
//!   transacción que el evento.
//! - `PgResultHistory`: historial de resultados por propiedad, sin updates ni
//!   deletes.
//!
//! Errores transitorios de pool/conexión se reintentan aquí con un backoff
//! corto (`with_retry`); si persisten, el engine recibe `Persistence`.

mod event_store;
mod history;

use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use log::{info, warn};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;

pub use event_store::{ErrorRow, PgEventStore};
pub use history::PgResultHistory;

/// Pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Debe devolver una conexión válida o `PersistenceError::TransientIo`.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooled, PersistenceError>;
}

/// `ConnectionProvider` respaldado por un `PgPool`.
#[derive(Clone)]
pub struct PoolProvider {
    pub pool: PgPool,
}

impl PoolProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooled, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_STEP_MS: u64 = 15;

/// Retry simple con backoff lineal (15ms, 30ms, 45ms).
///
/// Sólo repite la unidad de trabajo provista por `f`; las transacciones se
/// abren dentro de `f`, así que cada intento es atómico.
pub(crate) fn with_retry<F, T>(op: &str, mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if e.is_retryable() && attempts < RETRY_ATTEMPTS => {
                let delay_ms = RETRY_STEP_MS * u64::from(attempts + 1);
                warn!("{op}: retryable error (attempt {}): {e} -> sleeping {delay_ms}ms",
                      attempts + 1);
                std::thread::sleep(Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Construye un pool Postgres r2d2 y corre las migraciones pendientes.
///
/// Tamaños en cero se elevan a 1; si `min_size > max_size` se usa
/// `min = max`.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let max = max_size.max(1);
    let min = min_size.max(1);
    if min > max {
        warn!("min_size > max_size ({min} > {max}), using min = max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min.min(max)))
                                    .max_size(max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    info!("postgres pool ready (min_idle={}, max_size={max})", min.min(max));
    Ok(pool)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn with_retry_repeats_transient_errors_then_gives_up() {
        let calls = Cell::new(0);
        let r: Result<(), _> = with_retry("test", || {
            calls.set(calls.get() + 1);
            Err(PersistenceError::TransientIo("reset".into()))
        });
        assert!(r.is_err());
        assert_eq!(calls.get(), RETRY_ATTEMPTS + 1);
    }

    #[test]
    fn with_retry_does_not_repeat_permanent_errors() {
        let calls = Cell::new(0);
        let r: Result<(), _> = with_retry("test", || {
            calls.set(calls.get() + 1);
            Err(PersistenceError::CheckViolation("event_type".into()))
        });
        assert!(matches!(r, Err(PersistenceError::CheckViolation(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn with_retry_returns_first_success() {
        let calls = Cell::new(0);
        let r = with_retry("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                Err(PersistenceError::SerializationConflict)
            } else {
                Ok(7)
            }
        });
        assert_eq!(r.unwrap(), 7);
        assert_eq!(calls.get(), 2);
    }
}
