use prop_core::{ArtifactSpec, CoreEngineError, ExecutionContext, StepDefinition, StepKind, StepRunResult};
use serde_json::{json, Value};

use super::finish;
use crate::artifacts::{BaseDataArtifact, RiskArtifact, SummaryArtifact, ValuationArtifact};
use crate::pipeline::{COMPUTE_RISK, COMPUTE_VALUATION, FETCH_BASE, GENERATE_SUMMARY};

/// Agrupa miles con espacio, como se escriben montos en SEK.
pub fn format_sek(amount: f64) -> String {
    let whole = amount.trunc().abs() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    if amount < 0.0 {
        out.insert(0, '-');
    }
    out
}

/// Último step: texto resumen e informe JSON. Sin efectos secundarios.
#[derive(Debug, Default)]
pub struct GenerateSummaryStep;

impl GenerateSummaryStep {
    fn execute(&self, ctx: &ExecutionContext) -> Result<StepRunResult, CoreEngineError> {
        let base: BaseDataArtifact = ctx.decode_input(FETCH_BASE)?;
        let valuation: ValuationArtifact = ctx.decode_input(COMPUTE_VALUATION)?;
        let risk: RiskArtifact = ctx.decode_input(COMPUTE_RISK)?;
        let text = format!("The property is valued around {} SEK with risk level {}.",
                           format_sek(valuation.valuation.point_estimate),
                           risk.risk.level);
        let report = json!({
            "propertyId": base.property.property_id,
            "address": base.property.address,
            "municipality": base.property.municipality,
            "asOf": valuation.as_of,
            "valuation": valuation.valuation,
            "risk": risk.risk,
            "summary": text,
        });
        let artifact = SummaryArtifact { property_id: base.property.property_id,
                                         text,
                                         report };
        Ok(StepRunResult::Success { outputs: vec![artifact.into_artifact()?] })
    }
}

impl StepDefinition for GenerateSummaryStep {
    fn id(&self) -> &str {
        GENERATE_SUMMARY
    }
    fn name(&self) -> &str {
        "GenerateSummary"
    }
    fn base_params(&self) -> Value {
        json!({})
    }
    fn run(&self, ctx: &ExecutionContext) -> StepRunResult {
        finish(self.execute(ctx))
    }
    fn kind(&self) -> StepKind {
        StepKind::Sink
    }
}
