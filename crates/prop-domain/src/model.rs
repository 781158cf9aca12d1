//! Modelo de datos de una propiedad tal como lo producen los steps de fetch.
//!
//! Los registros son inmutables una vez obtenidos para un run; la
//! revaluación trabaja sobre copias (`PropertyInputs`).
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Clase energética de la energideklaration (A mejor, G peor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EnergyClass {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl EnergyClass {
    /// Acepta mayúsculas/minúsculas y espacios alrededor; `None` si no es A–G.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Some(EnergyClass::A),
            "B" => Some(EnergyClass::B),
            "C" => Some(EnergyClass::C),
            "D" => Some(EnergyClass::D),
            "E" => Some(EnergyClass::E),
            "F" => Some(EnergyClass::F),
            "G" => Some(EnergyClass::G),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnergyClass::A => "A",
            EnergyClass::B => "B",
            EnergyClass::C => "C",
            EnergyClass::D => "D",
            EnergyClass::E => "E",
            EnergyClass::F => "F",
            EnergyClass::G => "G",
        }
    }
}

impl FromStr for EnergyClass {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnergyClass::parse(s).ok_or_else(|| DomainError::Validation(format!("unknown energy class '{s}'")))
    }
}

impl TryFrom<String> for EnergyClass {
    type Error = DomainError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EnergyClass> for String {
    fn from(c: EnergyClass) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for EnergyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estado de la obligatorisk ventilationskontroll (OVK).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OvkStatus {
    Approved,
    NotApproved,
    Missing,
}

impl OvkStatus {
    /// Interpreta los textos libres del dataset ("Godkänd", "Ej godkänd", ...).
    pub fn from_label(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return OvkStatus::Missing;
        };
        let norm = raw.trim().to_lowercase();
        if norm.is_empty() || norm.contains("saknas") || norm == "missing" {
            OvkStatus::Missing
        } else if norm.starts_with("ej") || norm.contains("underkänd") || norm.contains("not") {
            OvkStatus::NotApproved
        } else if norm.contains("godkänd") || norm == "ok" || norm == "approved" || norm == "ja" {
            OvkStatus::Approved
        } else {
            OvkStatus::Missing
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    pub property_id: String,
    pub address: String,
    pub living_area_m2: f64,
    pub construction_year: i32,
    pub municipality: String,
    pub energy_class: Option<EnergyClass>,
    pub ovk_status: OvkStatus,
    /// kWh/m²·år
    pub energy_performance: Option<f64>,
    /// Bq/m³
    pub radon_bq_m3: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparableSale {
    pub amount: f64,
    pub sold_at: NaiveDate,
    pub living_area_m2: f64,
    pub rooms: u32,
}

/// Última venta de la propiedad y ventas comparables cercanas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketComparableSet {
    pub property_price: f64,
    pub sale_date: NaiveDate,
    pub comparables: Vec<ComparableSale>,
}

impl MarketComparableSet {
    /// Construye el set validando que toda venta tenga superficie positiva.
    pub fn new(property_price: f64, sale_date: NaiveDate, comparables: Vec<ComparableSale>) -> Result<Self, DomainError> {
        let set = Self { property_price,
                         sale_date,
                         comparables };
        set.validate()?;
        Ok(set)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !(self.property_price.is_finite() && self.property_price > 0.0) {
            return Err(DomainError::Validation(format!("sale price must be positive, got {}", self.property_price)));
        }
        if let Some((i, c)) = self.comparables
                                  .iter()
                                  .enumerate()
                                  .find(|(_, c)| !(c.living_area_m2.is_finite() && c.living_area_m2 > 0.0))
        {
            return Err(DomainError::Validation(format!("comparable #{i} has non-positive living area {}",
                                                       c.living_area_m2)));
        }
        Ok(())
    }
}

/// Costos mensuales de la bostadsrätt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CostData {
    pub monthly_fee_sek: Option<f64>,
    pub operating_costs_sek: Option<f64>,
    #[serde(default)]
    pub parking_available: bool,
    /// Cuota mensual media por m² de la zona (referencia del factor de costo).
    pub area_avg_fee_per_m2: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalInspectionData {
    /// SFP, kW por m³/s
    pub specific_fan_power: Option<f64>,
    pub projected_flow_ls: Option<f64>,
    pub measured_flow_ls: Option<f64>,
    pub supply_filter_class: Option<String>,
    pub exhaust_filter_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyCompliance {
    pub ovk_status: OvkStatus,
    pub inspection_date: Option<NaiveDate>,
    #[serde(default)]
    pub technical: TechnicalInspectionData,
}

/// Todo lo que consumen las calculadoras, reunido desde los cuatro fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInputs {
    pub property: PropertyRecord,
    pub market: MarketComparableSet,
    pub cost: CostData,
    pub compliance: EnergyCompliance,
}
