//! Steps del pipeline de valoración.
//!
//! Orden fijo: fetch_base → fetch_market → fetch_cost →
//! fetch_energy_compliance → compute_valuation → compute_risk →
//! generate_summary. Cada step lee del contexto los outputs previos que
//! necesita, por step id.

pub mod compute;
pub mod fetch;
pub mod summary;

pub use compute::{fetched_artifacts, property_inputs, ComputeRiskStep, ComputeValuationStep};
pub use fetch::{FetchBaseStep, FetchCostStep, FetchEnergyComplianceStep, FetchMarketStep};
pub use summary::GenerateSummaryStep;

use prop_core::{CoreEngineError, StepRunResult};

/// Convierte el `Result` de la ejecución en el resultado que espera el engine.
pub(crate) fn finish(result: Result<StepRunResult, CoreEngineError>) -> StepRunResult {
    result.unwrap_or_else(|error| StepRunResult::Failure { error })
}
