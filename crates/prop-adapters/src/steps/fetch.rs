//! Steps de obtención de datos. Son los únicos con efectos externos; sus
//! fallos transitorios se reintentan según la política del engine.

use std::sync::Arc;

use log::debug;
use prop_core::constants::SEARCH_ATTRIBUTES_SIGNAL;
use prop_domain::OvkStatus;
use prop_core::{ArtifactSpec, CoreEngineError, ExecutionContext, StepDefinition, StepKind, StepRunResult, StepSignal};
use serde_json::{json, Value};

use super::finish;
use crate::artifacts::{BaseDataArtifact, CostDataArtifact, EnergyComplianceArtifact, MarketDataArtifact};
use crate::pipeline::{ATTR_HAS_OVK, ATTR_MUNICIPALITY, FETCH_BASE, FETCH_COST, FETCH_ENERGY_COMPLIANCE, FETCH_MARKET};
use crate::seed::SeedInputs;
use crate::source::PropertyDataSource;

pub struct FetchBaseStep {
    source: Arc<dyn PropertyDataSource>,
}

impl FetchBaseStep {
    pub fn new(source: Arc<dyn PropertyDataSource>) -> Self {
        Self { source }
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<StepRunResult, CoreEngineError> {
        let seed: SeedInputs = ctx.seed_as()?;
        let property = self.source.fetch_base(&seed)?;
        debug!("run {} base data for {} (attempt {})", ctx.run_id, property.property_id, ctx.attempt);
        let mut attrs = json!({ (ATTR_HAS_OVK): property.ovk_status != OvkStatus::Missing });
        if !property.municipality.is_empty() {
            attrs[ATTR_MUNICIPALITY] = json!(property.municipality);
        }
        let signals = vec![StepSignal { signal: SEARCH_ATTRIBUTES_SIGNAL.to_string(),
                                        data: attrs }];
        Ok(StepRunResult::SuccessWithSignals { outputs: vec![BaseDataArtifact { property }.into_artifact()?],
                                               signals })
    }
}

impl StepDefinition for FetchBaseStep {
    fn id(&self) -> &str {
        FETCH_BASE
    }
    fn name(&self) -> &str {
        "FetchBase"
    }
    fn base_params(&self) -> Value {
        json!({})
    }
    fn run(&self, ctx: &ExecutionContext) -> StepRunResult {
        finish(self.execute(ctx))
    }
    fn kind(&self) -> StepKind {
        StepKind::Source
    }
}

pub struct FetchMarketStep {
    source: Arc<dyn PropertyDataSource>,
}

impl FetchMarketStep {
    pub fn new(source: Arc<dyn PropertyDataSource>) -> Self {
        Self { source }
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<StepRunResult, CoreEngineError> {
        let base: BaseDataArtifact = ctx.decode_input(FETCH_BASE)?;
        let market = self.source.fetch_market(&base.property)?;
        Ok(StepRunResult::Success { outputs: vec![MarketDataArtifact { market }.into_artifact()?] })
    }
}

impl StepDefinition for FetchMarketStep {
    fn id(&self) -> &str {
        FETCH_MARKET
    }
    fn name(&self) -> &str {
        "FetchMarket"
    }
    fn base_params(&self) -> Value {
        json!({})
    }
    fn run(&self, ctx: &ExecutionContext) -> StepRunResult {
        finish(self.execute(ctx))
    }
    fn kind(&self) -> StepKind {
        StepKind::Source
    }
}

pub struct FetchCostStep {
    source: Arc<dyn PropertyDataSource>,
}

impl FetchCostStep {
    pub fn new(source: Arc<dyn PropertyDataSource>) -> Self {
        Self { source }
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<StepRunResult, CoreEngineError> {
        let base: BaseDataArtifact = ctx.decode_input(FETCH_BASE)?;
        let cost = self.source.fetch_cost(&base.property)?;
        Ok(StepRunResult::Success { outputs: vec![CostDataArtifact { cost }.into_artifact()?] })
    }
}

impl StepDefinition for FetchCostStep {
    fn id(&self) -> &str {
        FETCH_COST
    }
    fn name(&self) -> &str {
        "FetchCost"
    }
    fn base_params(&self) -> Value {
        json!({})
    }
    fn run(&self, ctx: &ExecutionContext) -> StepRunResult {
        finish(self.execute(ctx))
    }
    fn kind(&self) -> StepKind {
        StepKind::Source
    }
}

pub struct FetchEnergyComplianceStep {
    source: Arc<dyn PropertyDataSource>,
}

impl FetchEnergyComplianceStep {
    pub fn new(source: Arc<dyn PropertyDataSource>) -> Self {
        Self { source }
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<StepRunResult, CoreEngineError> {
        let base: BaseDataArtifact = ctx.decode_input(FETCH_BASE)?;
        let compliance = self.source.fetch_energy_compliance(&base.property)?;
        Ok(StepRunResult::Success { outputs: vec![EnergyComplianceArtifact { compliance }.into_artifact()?] })
    }
}

impl StepDefinition for FetchEnergyComplianceStep {
    fn id(&self) -> &str {
        FETCH_ENERGY_COMPLIANCE
    }
    fn name(&self) -> &str {
        "FetchEnergyCompliance"
    }
    fn base_params(&self) -> Value {
        json!({})
    }
    fn run(&self, ctx: &ExecutionContext) -> StepRunResult {
        finish(self.execute(ctx))
    }
    fn kind(&self) -> StepKind {
        StepKind::Source
    }
}
