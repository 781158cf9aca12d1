use chrono::NaiveDate;
use prop_core::CoreEngineError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::source::normalize_address;

/// Seed de un run. La fecha de valoración se fija al iniciar y viaja en el
/// `RunInitialized`, así una reanudación calcula con el mismo año.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedInputs {
    pub property_id: String,
    pub address: String,
    pub area_m2: Option<f64>,
    pub year_built: Option<i32>,
    pub municipality: Option<String>,
    pub valuation_date: NaiveDate,
}

impl SeedInputs {
    pub fn validate(&self) -> Result<(), CoreEngineError> {
        if self.property_id.trim().is_empty() {
            return Err(CoreEngineError::Validation("propertyId must not be empty".into()));
        }
        if self.address.trim().is_empty() {
            return Err(CoreEngineError::Validation("address must not be empty".into()));
        }
        if let Some(a) = self.area_m2 {
            if !(a.is_finite() && a > 0.0) {
                return Err(CoreEngineError::Validation(format!("areaM2 must be positive, got {a}")));
            }
        }
        Ok(())
    }

    /// Inputs que identifican la petición (sin la fecha de valoración); base
    /// de la clave de idempotencia. La dirección va normalizada.
    pub fn request_inputs(&self) -> Value {
        json!({
            "propertyId": self.property_id,
            "address": normalize_address(&self.address),
            "areaM2": self.area_m2,
            "yearBuilt": self.year_built,
            "municipality": self.municipality,
        })
    }

    pub fn to_value(&self) -> Result<Value, CoreEngineError> {
        serde_json::to_value(self).map_err(|e| CoreEngineError::Internal(format!("seed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(address: &str, area: Option<f64>) -> SeedInputs {
        SeedInputs { property_id: "P-1".into(),
                     address: address.into(),
                     area_m2: area,
                     year_built: None,
                     municipality: None,
                     valuation_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap() }
    }

    #[test]
    fn request_inputs_ignore_address_formatting_and_date() {
        let mut later = seed("  GÖTGATAN   48 ", None);
        later.valuation_date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(seed("Götgatan 48", None).request_inputs(), later.request_inputs());
        assert_ne!(seed("Götgatan 48", None).request_inputs(), seed("Götgatan 48", Some(70.0)).request_inputs());
    }

    #[test]
    fn validation_rejects_blank_fields() {
        assert!(seed("Götgatan 48", None).validate().is_ok());
        assert!(seed("  ", None).validate().is_err());
        assert!(seed("Götgatan 48", Some(0.0)).validate().is_err());
    }
}
