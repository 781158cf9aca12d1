//! Artifacts tipados del pipeline de valoración.
//!
//! Cada tipo fija la forma del `payload` JSON de un step; el engine calcula
//! el hash sobre el payload canónico, así que ningún artifact lleva marcas
//! de tiempo ni datos no deterministas.

use chrono::NaiveDate;
use prop_core::ArtifactSpec;
use prop_domain::{CostData, EnergyCompliance, MarketComparableSet, PropertyRecord, RiskAssessment, ValuationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BaseDataArtifact {
    pub property: PropertyRecord,
}

impl ArtifactSpec for BaseDataArtifact {
    const KIND_NAME: &'static str = "property_record";
    fn validate(&self) -> Result<(), String> {
        if self.property.living_area_m2 <= 0.0 {
            return Err("living area must be positive".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketDataArtifact {
    pub market: MarketComparableSet,
}

impl ArtifactSpec for MarketDataArtifact {
    const KIND_NAME: &'static str = "market_comparables";
    fn validate(&self) -> Result<(), String> {
        self.market.validate().map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostDataArtifact {
    pub cost: CostData,
}

impl ArtifactSpec for CostDataArtifact {
    const KIND_NAME: &'static str = "cost_data";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyComplianceArtifact {
    pub compliance: EnergyCompliance,
}

impl ArtifactSpec for EnergyComplianceArtifact {
    const KIND_NAME: &'static str = "energy_compliance";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValuationArtifact {
    pub valuation: ValuationResult,
    pub as_of: NaiveDate,
}

impl ArtifactSpec for ValuationArtifact {
    const KIND_NAME: &'static str = "valuation_result";
    fn validate(&self) -> Result<(), String> {
        if self.valuation.min_value > self.valuation.max_value {
            return Err("min value above max value".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskArtifact {
    pub risk: RiskAssessment,
}

impl ArtifactSpec for RiskArtifact {
    const KIND_NAME: &'static str = "risk_assessment";
}

/// Resumen final: texto legible + informe JSON con todo lo calculado.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryArtifact {
    pub property_id: String,
    pub text: String,
    pub report: Value,
}

impl ArtifactSpec for SummaryArtifact {
    const KIND_NAME: &'static str = "summary_report";
}
