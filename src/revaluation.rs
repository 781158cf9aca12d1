//! Revaluación: vuelve a ejecutar sólo ComputeValuation y ComputeRisk sobre
//! una copia de los inputs de un run, con overrides, y agrega el resultado al
//! historial de la propiedad.
//!
//! El journal del run original no se modifica. El único lock que se toma es
//! el del historial de la propiedad, durante la lectura del último resultado
//! y el append.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use dashmap::DashMap;
use prop_adapters::artifacts::{RiskArtifact, ValuationArtifact};
use prop_adapters::pipeline::FETCH_STEPS;
use prop_adapters::steps::{fetched_artifacts, property_inputs, ComputeRiskStep, ComputeValuationStep};
use prop_adapters::{domain_error, PipelineConfig, PropertyDataSource, SeedInputs};
use prop_core::{ArtifactSpec, CoreEngineError, EventStore, ExecutionContext, FlowDefinition, FlowEngine, FlowRepository,
                StepDefinition, StepRunResult};
use prop_domain::history::latest;
use prop_domain::{HistoryEntry, OverrideParameters, PropertyInputs, ResultHistoryStore, ResultSource};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

pub struct RevaluationController {
    history: Arc<dyn ResultHistoryStore>,
    source: Arc<dyn PropertyDataSource>,
    config: PipelineConfig,
    property_locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Único output tipado de un step ejecutado fuera del engine.
fn single_output<T: ArtifactSpec>(result: StepRunResult) -> Result<T, CoreEngineError> {
    let outputs = match result {
        StepRunResult::Success { outputs } | StepRunResult::SuccessWithSignals { outputs, .. } => outputs,
        StepRunResult::Failure { error } => return Err(error),
    };
    let artifact = outputs.first()
                          .ok_or_else(|| CoreEngineError::Internal(format!("step produced no {}", T::KIND_NAME)))?;
    T::from_artifact(artifact).map_err(|e| CoreEngineError::Internal(format!("decode {}: {e}", T::KIND_NAME)))
}

impl RevaluationController {
    pub fn new(history: Arc<dyn ResultHistoryStore>, source: Arc<dyn PropertyDataSource>, config: PipelineConfig) -> Self {
        Self { history,
               source,
               config,
               property_locks: DashMap::new() }
    }

    fn property_lock(&self, property_id: &str) -> Arc<Mutex<()>> {
        self.property_locks
            .entry(property_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Inputs con los que el run calculó: outputs de los cuatro fetch.
    fn original_inputs<E, R>(&self,
                             engine: &FlowEngine<E, R>,
                             definition: &FlowDefinition,
                             run_id: Uuid)
                             -> Result<(PropertyInputs, SeedInputs), CoreEngineError>
        where E: EventStore,
              R: FlowRepository
    {
        let inst = engine.instance(run_id, definition)?;
        let missing: Vec<&str> = FETCH_STEPS.iter().copied().filter(|s| !inst.succeeded(s)).collect();
        if !missing.is_empty() {
            return Err(CoreEngineError::InvalidState(format!("run {run_id} has not completed {}", missing.join(", "))));
        }
        let mut inputs = BTreeMap::new();
        for step_id in FETCH_STEPS {
            let hash = inst.output_hash(step_id)
                           .ok_or_else(|| CoreEngineError::MissingInputs(format!("output of '{step_id}'")))?;
            let artifact = engine.event_store()
                                 .load_artifact(hash)?
                                 .ok_or_else(|| CoreEngineError::MissingInputs(format!("artifact {hash} of '{step_id}'")))?;
            inputs.insert(step_id.to_string(), artifact);
        }
        let ctx = ExecutionContext { run_id,
                                     seed: inst.seed.clone(),
                                     inputs,
                                     params: json!({}),
                                     attempt: 1 };
        Ok((property_inputs(&ctx)?, ctx.seed_as()?))
    }

    pub fn revalue<E, R>(&self,
                         engine: &FlowEngine<E, R>,
                         definition: &FlowDefinition,
                         run_id: Uuid,
                         overrides: OverrideParameters)
                         -> Result<HistoryEntry, CoreEngineError>
        where E: EventStore,
              R: FlowRepository
    {
        overrides.validate().map_err(domain_error)?;
        let (original, original_seed) = self.original_inputs(engine, definition, run_id)?;

        let seed = SeedInputs { address: overrides.address.clone().unwrap_or(original_seed.address),
                                valuation_date: Utc::now().date_naive(),
                                ..original_seed };
        let merged = if overrides.requires_base_refetch() {
            let mut refetched = original;
            refetched.property = self.source.fetch_base(&seed)?;
            overrides.apply(&refetched)
        } else {
            overrides.apply(&original)
        };

        let ctx = ExecutionContext { run_id,
                                     seed: seed.to_value()?,
                                     inputs: fetched_artifacts(&merged)?,
                                     params: json!({}),
                                     attempt: 1 };
        let valuation: ValuationArtifact =
            single_output(ComputeValuationStep::new(self.config.valuation).run(&ctx))?;
        let risk: RiskArtifact = single_output(ComputeRiskStep::new(self.config.risk_weights).run(&ctx))?;

        let property_id = seed.property_id;
        let lock = self.property_lock(&property_id);
        let _guard = lock.lock()
                         .map_err(|_| CoreEngineError::Internal(format!("history lock poisoned for {property_id}")))?;
        let previous = self.history.entries_for_property(&property_id).map_err(domain_error)?;
        // computed_at estrictamente creciente por propiedad
        let mut computed_at = Utc::now();
        if let Some(last) = latest(&previous) {
            if computed_at <= last.computed_at {
                computed_at = last.computed_at + Duration::microseconds(1);
            }
        }
        let entry = HistoryEntry { result_id: Uuid::new_v4(),
                                   property_id,
                                   run_id,
                                   source: ResultSource::Revaluation,
                                   valuation: valuation.valuation,
                                   risk: risk.risk,
                                   overrides: Some(overrides),
                                   computed_at };
        self.history.append(entry.clone()).map_err(domain_error)?;
        info!(%run_id, result_id = %entry.result_id, point = entry.valuation.point_estimate, "revaluation recorded");
        Ok(entry)
    }
}
