//! Definición del pipeline de valoración: ids de step, atributos de
//! búsqueda y construcción del `FlowDefinition`.
use std::sync::Arc;

use prop_core::{build_flow_definition_auto, FlowDefinition, StepDefinition};
use prop_domain::{RiskWeights, ValuationParams};

use crate::source::PropertyDataSource;
use crate::steps::{ComputeRiskStep, ComputeValuationStep, FetchBaseStep, FetchCostStep, FetchEnergyComplianceStep,
                   FetchMarketStep, GenerateSummaryStep};

pub const FETCH_BASE: &str = "fetch_base";
pub const FETCH_MARKET: &str = "fetch_market";
pub const FETCH_COST: &str = "fetch_cost";
pub const FETCH_ENERGY_COMPLIANCE: &str = "fetch_energy_compliance";
pub const COMPUTE_VALUATION: &str = "compute_valuation";
pub const COMPUTE_RISK: &str = "compute_risk";
pub const GENERATE_SUMMARY: &str = "generate_summary";

/// Steps que deben haber terminado para poder revaluar.
pub const FETCH_STEPS: [&str; 4] = [FETCH_BASE, FETCH_MARKET, FETCH_COST, FETCH_ENERGY_COMPLIANCE];

pub const ATTR_PROPERTY_ID: &str = prop_core::constants::PROPERTY_ID_ATTRIBUTE;
pub const ATTR_MUNICIPALITY: &str = "municipality";
pub const ATTR_RISK_LEVEL: &str = "riskLevel";
pub const ATTR_HAS_OVK: &str = "hasOvk";
/// Lo fija el índice al cerrar el run, con el timestamp del journal.
pub const ATTR_LAST_RUN_AT: &str = "lastRunAt";

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfig {
    pub valuation: ValuationParams,
    pub risk_weights: RiskWeights,
}

pub fn valuation_definition(source: Arc<dyn PropertyDataSource>, config: &PipelineConfig) -> FlowDefinition {
    let steps: Vec<Box<dyn StepDefinition>> = vec![Box::new(FetchBaseStep::new(source.clone())),
                                                   Box::new(FetchMarketStep::new(source.clone())),
                                                   Box::new(FetchCostStep::new(source.clone())),
                                                   Box::new(FetchEnergyComplianceStep::new(source)),
                                                   Box::new(ComputeValuationStep::new(config.valuation)),
                                                   Box::new(ComputeRiskStep::new(config.risk_weights)),
                                                   Box::new(GenerateSummaryStep)];
    build_flow_definition_auto(steps)
}
