//! Configuración central de la aplicación.
//! Carga variables de entorno (.env una sola vez) y las valida en un
//! `AppConfig` inmutable. Todas tienen un valor por defecto salvo
//! `DATABASE_URL` y `PROPFLOW_UPSTREAM_URL`, cuya ausencia selecciona el
//! backend en memoria y el dataset local respectivamente.
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use prop_adapters::PipelineConfig;
use prop_core::RetryPolicy;
use prop_domain::{RiskWeights, ValuationParams};
use prop_persistence::DbConfig;

use crate::errors::ConfigError;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv(); // ignora error si no existe .env
});

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_DATASET_PATH: &str = "data/sample_properties.json";

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: Option<String>,
    pub timeout: Duration,
    /// Peticiones por segundo compartidas entre todos los runs.
    pub rate_limit: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub dataset_path: PathBuf,
    pub upstream: UpstreamConfig,
    pub retry: RetryPolicy,
    pub pipeline: PipelineConfig,
    /// `None` → stores en memoria.
    pub database: Option<DbConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Lazy::force(&DOTENV_LOADED);
        let mut cfg = Self::from_lookup(|k| env::var(k).ok())?;
        if DbConfig::is_configured() {
            let db = DbConfig::from_env().map_err(|e| ConfigError::invalid("DATABASE_URL", "<redacted>", e.to_string()))?;
            cfg.database = Some(db);
        }
        Ok(cfg)
    }

    /// Construye la configuración a partir de una función de búsqueda;
    /// `from_env` la usa con `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind = parse_or(&get, "PROPFLOW_BIND", || DEFAULT_BIND.parse().map_err(|_| "bad default".to_string()))?;
        let dataset_path = get("PROPFLOW_DATASET_PATH").map(PathBuf::from)
                                                       .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASET_PATH));

        let timeout_ms: u64 = parse_or(&get, "PROPFLOW_UPSTREAM_TIMEOUT_MS", || Ok(5_000))?;
        let rate_limit: u32 = parse_or(&get, "PROPFLOW_UPSTREAM_RATE_LIMIT", || Ok(10))?;
        if rate_limit == 0 {
            return Err(ConfigError::invalid("PROPFLOW_UPSTREAM_RATE_LIMIT", "0", "must be at least 1"));
        }
        let upstream = UpstreamConfig { url: get("PROPFLOW_UPSTREAM_URL"),
                                        timeout: Duration::from_millis(timeout_ms),
                                        rate_limit };

        let defaults = RetryPolicy::default();
        let max_attempts: u32 = parse_or(&get, "PROPFLOW_MAX_ATTEMPTS", || Ok(defaults.max_attempts))?;
        let base_ms: u64 = parse_or(&get, "PROPFLOW_BACKOFF_BASE_MS", || Ok(defaults.base_backoff.as_millis() as u64))?;
        let max_ms: u64 = parse_or(&get, "PROPFLOW_BACKOFF_MAX_MS", || Ok(defaults.max_backoff.as_millis() as u64))?;
        let retry = RetryPolicy::new(max_attempts, Duration::from_millis(base_ms), Duration::from_millis(max_ms));

        let risk_weights = match get("PROPFLOW_RISK_WEIGHTS") {
            Some(raw) => RiskWeights::parse(&raw).map_err(|e| ConfigError::invalid("PROPFLOW_RISK_WEIGHTS", &raw, e.to_string()))?,
            None => RiskWeights::default(),
        };
        let valuation_defaults = ValuationParams::default();
        let growth: f64 = parse_or(&get, "PROPFLOW_GROWTH_RATE", || Ok(valuation_defaults.annual_growth_rate))?;
        let cap: f64 = parse_or(&get, "PROPFLOW_CONFIDENCE_CAP", || Ok(valuation_defaults.confidence_cap))?;
        if !growth.is_finite() || !cap.is_finite() {
            return Err(ConfigError::invalid("PROPFLOW_GROWTH_RATE", &growth.to_string(), "must be finite"));
        }
        let pipeline = PipelineConfig { valuation: ValuationParams::new(growth, cap),
                                        risk_weights };

        Ok(Self { bind,
                  dataset_path,
                  upstream,
                  retry,
                  pipeline,
                  database: None })
    }
}

fn parse_or<T, G, D>(get: &G, var: &str, default: D) -> Result<T, ConfigError>
    where T: FromStr,
          T::Err: std::fmt::Display,
          G: Fn(&str) -> Option<String>,
          D: FnOnce() -> Result<T, String>
{
    match get(var) {
        Some(raw) => raw.parse::<T>()
                        .map_err(|e| ConfigError::invalid(var, &raw, e.to_string())),
        None => default().map_err(|reason| ConfigError::invalid(var, "", reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = from(&[]).unwrap();
        assert_eq!(cfg.bind, DEFAULT_BIND.parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.base_backoff, Duration::from_millis(200));
        assert_eq!(cfg.retry.max_backoff, Duration::from_secs(5));
        assert_eq!(cfg.pipeline.risk_weights, RiskWeights::default());
        assert!(cfg.upstream.url.is_none());
        assert!(cfg.database.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = from(&[("PROPFLOW_BIND", "0.0.0.0:9000"),
                         ("PROPFLOW_MAX_ATTEMPTS", "5"),
                         ("PROPFLOW_RISK_WEIGHTS", "1,1,1,1"),
                         ("PROPFLOW_CONFIDENCE_CAP", "0.95"),
                         ("PROPFLOW_UPSTREAM_URL", "http://localhost:9999")]).unwrap();
        assert_eq!(cfg.bind.port(), 9000);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.pipeline.risk_weights.age, 1.0);
        assert_eq!(cfg.pipeline.valuation.confidence_cap, 0.9);
        assert_eq!(cfg.upstream.url.as_deref(), Some("http://localhost:9999"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(from(&[("PROPFLOW_MAX_ATTEMPTS", "many")]).is_err());
        assert!(from(&[("PROPFLOW_RISK_WEIGHTS", "0,0,0,0")]).is_err());
        assert!(from(&[("PROPFLOW_RISK_WEIGHTS", "1,2")]).is_err());
        assert!(from(&[("PROPFLOW_UPSTREAM_RATE_LIMIT", "0")]).is_err());
    }
}
