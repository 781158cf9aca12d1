//! Calculadora de valor de mercado.
//!
//! Determinista: el año de referencia sale de `as_of` (fecha de valoración
//! fijada al iniciar el run), nunca del reloj. El orden de los ajustes es
//! fijo:
//! 1. precio base = última venta
//! 2. precio medio por m² de las comparables
//! 3. ajuste hacia la media de la calle
//! 4. multiplicador por clase energética
//! 5. multiplicador por edad del edificio
//! 6. penalización técnica (SFP > 2)
//! 7. crecimiento anual compuesto desde la venta
//! 8. confianza según cantidad de comparables
//! 9. intervalo simétrico alrededor del precio ajustado
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::{EnergyClass, PropertyInputs};
use crate::DomainError;

/// Techo absoluto de la confianza.
pub const MAX_CONFIDENCE: f64 = 0.9;
const BASE_CONFIDENCE: f64 = 0.8;
const CONFIDENCE_PER_COMPARABLE: f64 = 0.02;
const SFP_PENALTY_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationParams {
    pub annual_growth_rate: f64,
    pub confidence_cap: f64,
}

impl Default for ValuationParams {
    fn default() -> Self {
        Self { annual_growth_rate: 0.03,
               confidence_cap: MAX_CONFIDENCE }
    }
}

impl ValuationParams {
    /// El techo configurado nunca supera `MAX_CONFIDENCE`.
    pub fn new(annual_growth_rate: f64, confidence_cap: f64) -> Self {
        Self { annual_growth_rate,
               confidence_cap: confidence_cap.clamp(0.0, MAX_CONFIDENCE) }
    }
}

/// Factores intermedios, útiles para el informe y para depurar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationBreakdown {
    pub avg_street_price_per_m2: f64,
    pub adjustment_factor: f64,
    pub energy_multiplier: f64,
    pub age_years: i32,
    pub age_multiplier: f64,
    pub technical_multiplier: f64,
    pub years_since_sale: i32,
    pub growth_multiplier: f64,
    pub comparables_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationResult {
    pub min_value: f64,
    pub max_value: f64,
    pub confidence: f64,
    pub point_estimate: f64,
    pub breakdown: ValuationBreakdown,
}

/// A 1.05, B 1.03, C 1.00, D 0.97, E 0.95; el resto (y ausente) 1.00.
pub fn energy_multiplier(class: Option<EnergyClass>) -> f64 {
    match class {
        Some(EnergyClass::A) => 1.05,
        Some(EnergyClass::B) => 1.03,
        Some(EnergyClass::C) => 1.00,
        Some(EnergyClass::D) => 0.97,
        Some(EnergyClass::E) => 0.95,
        _ => 1.00,
    }
}

fn age_multiplier(age: i32) -> f64 {
    if age < 10 {
        1.05
    } else if age > 40 {
        0.85
    } else {
        1.0
    }
}

fn finite(label: &str, v: f64) -> Result<f64, DomainError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(DomainError::Compute(format!("{label} is not finite")))
    }
}

pub fn calculate_valuation(inputs: &PropertyInputs,
                           params: &ValuationParams,
                           as_of: NaiveDate)
                           -> Result<ValuationResult, DomainError> {
    let market = &inputs.market;
    let property = &inputs.property;

    let mut base_price = market.property_price;
    if !(base_price.is_finite() && base_price > 0.0) {
        return Err(DomainError::Compute(format!("property price must be positive, got {base_price}")));
    }
    let living_area = property.living_area_m2;
    if !(living_area.is_finite() && living_area > 0.0) {
        return Err(DomainError::Compute(format!("living area must be positive, got {living_area}")));
    }

    if market.comparables.is_empty() {
        return Err(DomainError::Compute("no comparable sales".into()));
    }
    let mut sum = 0.0;
    for c in &market.comparables {
        if !(c.living_area_m2.is_finite() && c.living_area_m2 > 0.0) {
            return Err(DomainError::Compute(format!("comparable with non-positive living area {}", c.living_area_m2)));
        }
        sum += c.amount / c.living_area_m2;
    }
    let avg_street = finite("average street price", sum / market.comparables.len() as f64)?;

    let adjustment_factor = finite("adjustment factor", avg_street / (base_price / living_area))?;
    base_price *= adjustment_factor;

    let energy = energy_multiplier(property.energy_class);
    base_price *= energy;

    let year = as_of.year();
    let age_years = year - property.construction_year;
    let age_mult = age_multiplier(age_years);
    base_price *= age_mult;

    let technical = match inputs.compliance.technical.specific_fan_power {
        Some(sfp) if sfp > SFP_PENALTY_THRESHOLD => 0.95,
        _ => 1.0,
    };
    base_price *= technical;

    let years_since_sale = year - market.sale_date.year();
    let growth = finite("growth multiplier",
                        (1.0 + params.annual_growth_rate).powi(years_since_sale))?;
    base_price = finite("adjusted price", base_price * growth)?;

    let comparables_count = market.comparables.len();
    let cap = params.confidence_cap.min(MAX_CONFIDENCE);
    let confidence = cap.min(BASE_CONFIDENCE + CONFIDENCE_PER_COMPARABLE * comparables_count as f64);

    let half_spread = (1.0 - confidence) / 2.0;
    let min_value = finite("min value", base_price * (1.0 - half_spread))?;
    let max_value = finite("max value", base_price * (1.0 + half_spread))?;

    Ok(ValuationResult { min_value,
                         max_value,
                         confidence,
                         point_estimate: base_price,
                         breakdown: ValuationBreakdown { avg_street_price_per_m2: avg_street,
                                                         adjustment_factor,
                                                         energy_multiplier: energy,
                                                         age_years,
                                                         age_multiplier: age_mult,
                                                         technical_multiplier: technical,
                                                         years_since_sale,
                                                         growth_multiplier: growth,
                                                         comparables_count } })
}
