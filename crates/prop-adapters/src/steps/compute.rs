//! Steps de cómputo: envuelven las calculadoras puras. Sus errores son
//! `Compute` y nunca se reintentan.

use std::collections::BTreeMap;

use prop_core::constants::SEARCH_ATTRIBUTES_SIGNAL;
use prop_core::{Artifact, ArtifactSpec, CoreEngineError, ExecutionContext, StepDefinition, StepKind, StepRunResult,
                StepSignal};
use prop_domain::{assess_risk, calculate_valuation, PropertyInputs, RiskWeights, ValuationParams};
use serde_json::{json, Value};

use super::finish;
use crate::artifacts::{BaseDataArtifact, CostDataArtifact, EnergyComplianceArtifact, MarketDataArtifact, RiskArtifact,
                       ValuationArtifact};
use crate::error::domain_error;
use crate::pipeline::{ATTR_RISK_LEVEL, COMPUTE_RISK, COMPUTE_VALUATION, FETCH_BASE, FETCH_COST,
                      FETCH_ENERGY_COMPLIANCE, FETCH_MARKET};
use crate::seed::SeedInputs;

/// Reúne los outputs de los cuatro fetch en un `PropertyInputs`.
pub fn property_inputs(ctx: &ExecutionContext) -> Result<PropertyInputs, CoreEngineError> {
    let base: BaseDataArtifact = ctx.decode_input(FETCH_BASE)?;
    let market: MarketDataArtifact = ctx.decode_input(FETCH_MARKET)?;
    let cost: CostDataArtifact = ctx.decode_input(FETCH_COST)?;
    let energy: EnergyComplianceArtifact = ctx.decode_input(FETCH_ENERGY_COMPLIANCE)?;
    Ok(PropertyInputs { property: base.property,
                        market: market.market,
                        cost: cost.cost,
                        compliance: energy.compliance })
}

/// Inverso de `property_inputs`: artifacts de fetch listos para un contexto
/// de ejecución (usado al revaluar con inputs modificados).
pub fn fetched_artifacts(inputs: &PropertyInputs) -> Result<BTreeMap<String, Artifact>, CoreEngineError> {
    let mut map = BTreeMap::new();
    map.insert(FETCH_BASE.to_string(),
               BaseDataArtifact { property: inputs.property.clone() }.into_artifact()?);
    map.insert(FETCH_MARKET.to_string(),
               MarketDataArtifact { market: inputs.market.clone() }.into_artifact()?);
    map.insert(FETCH_COST.to_string(),
               CostDataArtifact { cost: inputs.cost.clone() }.into_artifact()?);
    map.insert(FETCH_ENERGY_COMPLIANCE.to_string(),
               EnergyComplianceArtifact { compliance: inputs.compliance.clone() }.into_artifact()?);
    Ok(map)
}

pub struct ComputeValuationStep {
    params: ValuationParams,
}

impl ComputeValuationStep {
    pub fn new(params: ValuationParams) -> Self {
        Self { params }
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<StepRunResult, CoreEngineError> {
        let seed: SeedInputs = ctx.seed_as()?;
        let inputs = property_inputs(ctx)?;
        let valuation = calculate_valuation(&inputs, &self.params, seed.valuation_date).map_err(domain_error)?;
        let artifact = ValuationArtifact { valuation,
                                           as_of: seed.valuation_date };
        Ok(StepRunResult::Success { outputs: vec![artifact.into_artifact()?] })
    }
}

impl StepDefinition for ComputeValuationStep {
    fn id(&self) -> &str {
        COMPUTE_VALUATION
    }
    fn name(&self) -> &str {
        "ComputeValuation"
    }
    fn base_params(&self) -> Value {
        json!({
            "annualGrowthRate": self.params.annual_growth_rate,
            "confidenceCap": self.params.confidence_cap,
        })
    }
    fn run(&self, ctx: &ExecutionContext) -> StepRunResult {
        finish(self.execute(ctx))
    }
    fn kind(&self) -> StepKind {
        StepKind::Transform
    }
}

pub struct ComputeRiskStep {
    weights: RiskWeights,
}

impl ComputeRiskStep {
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<StepRunResult, CoreEngineError> {
        let seed: SeedInputs = ctx.seed_as()?;
        let inputs = property_inputs(ctx)?;
        let risk = assess_risk(&inputs, &self.weights, seed.valuation_date).map_err(domain_error)?;
        let signal = StepSignal { signal: SEARCH_ATTRIBUTES_SIGNAL.to_string(),
                                  data: json!({ (ATTR_RISK_LEVEL): risk.level.as_str() }) };
        Ok(StepRunResult::SuccessWithSignals { outputs: vec![RiskArtifact { risk }.into_artifact()?],
                                               signals: vec![signal] })
    }
}

impl StepDefinition for ComputeRiskStep {
    fn id(&self) -> &str {
        COMPUTE_RISK
    }
    fn name(&self) -> &str {
        "ComputeRisk"
    }
    fn base_params(&self) -> Value {
        json!({
            "compliance": self.weights.compliance,
            "energy": self.weights.energy,
            "cost": self.weights.cost,
            "age": self.weights.age,
        })
    }
    fn run(&self, ctx: &ExecutionContext) -> StepRunResult {
        finish(self.execute(ctx))
    }
    fn kind(&self) -> StepKind {
        StepKind::Transform
    }
}
