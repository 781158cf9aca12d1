//! Calculadora de riesgo: cuatro factores puntuados en [0,1] y combinados con
//! pesos normalizados.
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::{EnergyClass, OvkStatus, PropertyInputs};
use crate::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.33 {
            RiskLevel::Low
        } else if score < 0.66 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(DomainError::Validation(format!("unknown risk level '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RiskFactor {
    Compliance,
    EnergyClass,
    CostRatio,
    BuildingAge,
}

/// Pesos de los factores. Se normalizan para sumar 1 antes de usarse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskWeights {
    pub compliance: f64,
    pub energy: f64,
    pub cost: f64,
    pub age: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self { compliance: 0.35,
               energy: 0.25,
               cost: 0.25,
               age: 0.15 }
    }
}

impl RiskWeights {
    /// Formato `compliance,energy,cost,age` (p. ej. `0.35,0.25,0.25,0.15`).
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let parts: Vec<f64> = raw.split(',')
                                 .map(|p| {
                                     p.trim()
                                      .parse::<f64>()
                                      .map_err(|e| DomainError::Validation(format!("risk weight '{p}': {e}")))
                                 })
                                 .collect::<Result<_, _>>()?;
        let [compliance, energy, cost, age] = parts[..] else {
            return Err(DomainError::Validation(format!("expected 4 risk weights, got {}", parts.len())));
        };
        let w = Self { compliance,
                       energy,
                       cost,
                       age };
        w.normalized().map_err(|e| DomainError::Validation(e.to_string()))?;
        Ok(w)
    }

    pub fn normalized(&self) -> Result<Self, DomainError> {
        let all = [self.compliance, self.energy, self.cost, self.age];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(DomainError::Compute("risk weights must be finite and non-negative".into()));
        }
        let total: f64 = all.iter().sum();
        if total <= 0.0 {
            return Err(DomainError::Compute("risk weights sum to zero".into()));
        }
        Ok(Self { compliance: self.compliance / total,
                  energy: self.energy / total,
                  cost: self.cost / total,
                  age: self.age / total })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorScore {
    pub factor: RiskFactor,
    pub weight: f64,
    pub score: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: f64,
    pub factors: Vec<FactorScore>,
}

fn compliance_score(ovk: OvkStatus, radon: Option<f64>) -> f64 {
    let base: f64 = match ovk {
        OvkStatus::Approved => 0.0,
        OvkStatus::NotApproved => 1.0,
        OvkStatus::Missing => 0.7,
    };
    match radon {
        Some(r) if r > 200.0 => base.max(0.8),
        Some(r) if r > 100.0 => base.max(0.5),
        _ => base,
    }
}

fn energy_score(class: Option<EnergyClass>) -> f64 {
    match class {
        Some(EnergyClass::A) => 0.0,
        Some(EnergyClass::B) => 0.1,
        Some(EnergyClass::C) => 0.25,
        Some(EnergyClass::D) => 0.5,
        Some(EnergyClass::E) => 0.75,
        Some(EnergyClass::F) => 0.9,
        Some(EnergyClass::G) => 1.0,
        None => 0.5,
    }
}

/// (cuota/m²) / (media de la zona por m²): ≤1.0 → 0, ≥1.5 → 1, lineal entre ambos.
fn cost_ratio_score(fee: Option<f64>, area: f64, area_avg_per_m2: Option<f64>) -> f64 {
    let (Some(fee), Some(avg)) = (fee, area_avg_per_m2) else {
        return 0.5;
    };
    if area <= 0.0 || avg <= 0.0 {
        return 0.5;
    }
    let ratio = (fee / area) / avg;
    if !ratio.is_finite() {
        return 0.5;
    }
    ((ratio - 1.0) / 0.5).clamp(0.0, 1.0)
}

fn age_score(age: i32) -> f64 {
    ((f64::from(age) - 10.0) / 50.0).clamp(0.0, 1.0)
}

pub fn assess_risk(inputs: &PropertyInputs, weights: &RiskWeights, as_of: NaiveDate) -> Result<RiskAssessment, DomainError> {
    let w = weights.normalized()?;
    let p = &inputs.property;
    let scored = [(RiskFactor::Compliance, w.compliance, compliance_score(inputs.compliance.ovk_status, p.radon_bq_m3)),
                  (RiskFactor::EnergyClass, w.energy, energy_score(p.energy_class)),
                  (RiskFactor::CostRatio,
                   w.cost,
                   cost_ratio_score(inputs.cost.monthly_fee_sek, p.living_area_m2, inputs.cost.area_avg_fee_per_m2)),
                  (RiskFactor::BuildingAge, w.age, age_score(as_of.year() - p.construction_year))];

    let factors: Vec<FactorScore> = scored.into_iter()
                                          .map(|(factor, weight, score)| FactorScore { factor,
                                                                                       weight,
                                                                                       score,
                                                                                       contribution: weight * score })
                                          .collect();
    let score: f64 = factors.iter().map(|f| f.contribution).sum();
    if !score.is_finite() {
        return Err(DomainError::Compute("risk score is not finite".into()));
    }
    let score = score.clamp(0.0, 1.0);
    Ok(RiskAssessment { level: RiskLevel::from_score(score),
                        score,
                        factors })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radon_raises_compliance_floor() {
        assert_eq!(compliance_score(OvkStatus::Approved, Some(250.0)), 0.8);
        assert_eq!(compliance_score(OvkStatus::Approved, Some(150.0)), 0.5);
        assert_eq!(compliance_score(OvkStatus::Approved, Some(60.0)), 0.0);
        assert_eq!(compliance_score(OvkStatus::NotApproved, Some(250.0)), 1.0);
        assert_eq!(compliance_score(OvkStatus::Missing, None), 0.7);
    }

    #[test]
    fn cost_ratio_is_linear_between_bounds() {
        // 64 m², referencia 60 SEK/m²
        assert_eq!(cost_ratio_score(Some(3840.0), 64.0, Some(60.0)), 0.0);
        assert!((cost_ratio_score(Some(4800.0), 64.0, Some(60.0)) - 0.5).abs() < 1e-9);
        assert_eq!(cost_ratio_score(Some(9000.0), 64.0, Some(60.0)), 1.0);
        assert_eq!(cost_ratio_score(None, 64.0, Some(60.0)), 0.5);
        assert_eq!(cost_ratio_score(Some(4000.0), 64.0, None), 0.5);
    }

    #[test]
    fn age_and_level_bands() {
        assert_eq!(age_score(5), 0.0);
        assert_eq!(age_score(35), 0.5);
        assert_eq!(age_score(80), 1.0);
        assert_eq!(RiskLevel::from_score(0.32), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.33), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.66), RiskLevel::High);
    }

    #[test]
    fn weights_parse_and_normalize() {
        let w = RiskWeights::parse("2, 1, 1, 0").unwrap().normalized().unwrap();
        assert_eq!(w.compliance, 0.5);
        assert_eq!(w.age, 0.0);
        assert!(RiskWeights::parse("1,2,3").is_err());
        assert!(RiskWeights::parse("0,0,0,0").is_err());
        let zero = RiskWeights { compliance: 0.0,
                                 energy: 0.0,
                                 cost: 0.0,
                                 age: 0.0 };
        assert!(matches!(zero.normalized(), Err(DomainError::Compute(_))));
        assert_eq!("HIGH".parse::<RiskLevel>().unwrap(), RiskLevel::High);
    }
}
