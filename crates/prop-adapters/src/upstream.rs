//! Fuente HTTP para mercado, costos y cumplimiento energético.
//!
//! Usa `ureq` (síncrono): los steps ya corren en hilos bloqueantes. Los
//! datos base siguen saliendo del dataset local. Rutas consultadas:
//! `{base}/properties/{id}/market`, `/cost`, `/energy-compliance`.
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use prop_core::CoreEngineError;
use prop_domain::{CostData, EnergyCompliance, MarketComparableSet, PropertyRecord};
use serde::de::DeserializeOwned;
use ureq::Agent;

use crate::dataset::DatasetSource;
use crate::error::{domain_error, AdapterError};
use crate::limiter::RateCeiling;
use crate::seed::SeedInputs;
use crate::source::PropertyDataSource;

pub struct UpstreamSource {
    base_url: String,
    agent: Agent,
    limiter: Arc<RateCeiling>,
    dataset: Arc<DatasetSource>,
}

impl UpstreamSource {
    pub fn new(base_url: &str,
               timeout: Duration,
               limiter: Arc<RateCeiling>,
               dataset: Arc<DatasetSource>)
               -> Result<Self, AdapterError> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AdapterError::Config(format!("upstream url must be http(s): {base_url}")));
        }
        let agent: Agent = Agent::config_builder().timeout_global(Some(timeout))
                                                  .build()
                                                  .into();
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(),
                  agent,
                  limiter,
                  dataset })
    }

    fn url(&self, property_id: &str, resource: &str) -> String {
        format!("{}/properties/{}/{}", self.base_url, property_id, resource)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CoreEngineError> {
        self.limiter.acquire();
        debug!("GET {url}");
        let response = self.agent.get(url).call().map_err(|e| map_ureq_error(url, e))?;
        response.into_body()
                .read_json::<T>()
                .map_err(|e| CoreEngineError::Internal(format!("invalid JSON from {url}: {e}")))
    }
}

/// 404 → `NotFound`; 408/429/5xx y fallos de transporte → reintentables.
fn map_ureq_error(url: &str, e: ureq::Error) -> CoreEngineError {
    match e {
        ureq::Error::StatusCode(404) => CoreEngineError::NotFound(format!("{url} returned 404")),
        ureq::Error::StatusCode(code) if code == 408 || code == 429 || code >= 500 => {
            warn!("upstream {url} returned {code}");
            CoreEngineError::UpstreamUnavailable(format!("{url} returned {code}"))
        }
        ureq::Error::StatusCode(code) => CoreEngineError::Internal(format!("{url} rejected request with {code}")),
        other => {
            warn!("upstream {url} unreachable: {other}");
            CoreEngineError::UpstreamUnavailable(format!("{url}: {other}"))
        }
    }
}

impl PropertyDataSource for UpstreamSource {
    fn fetch_base(&self, seed: &SeedInputs) -> Result<PropertyRecord, CoreEngineError> {
        self.dataset.fetch_base(seed)
    }

    fn fetch_market(&self, property: &PropertyRecord) -> Result<MarketComparableSet, CoreEngineError> {
        let market: MarketComparableSet = self.get_json(&self.url(&property.property_id, "market"))?;
        market.validate().map_err(domain_error)?;
        Ok(market)
    }

    fn fetch_cost(&self, property: &PropertyRecord) -> Result<CostData, CoreEngineError> {
        self.get_json(&self.url(&property.property_id, "cost"))
    }

    fn fetch_energy_compliance(&self, property: &PropertyRecord) -> Result<EnergyCompliance, CoreEngineError> {
        self.get_json(&self.url(&property.property_id, "energy-compliance"))
    }
}
