//! Overrides de revaluación: campos opcionales que reemplazan valores de los
//! inputs originales en una copia.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{EnergyClass, OvkStatus, PropertyInputs};
use crate::DomainError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OverrideParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_fee_sek: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_costs_sek: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub living_area_m2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub construction_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_class: Option<EnergyClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ovk_status: Option<OvkStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_fan_power: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sale_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sale_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radon_bq_m3: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

fn check(label: &str, v: Option<f64>, positive: bool) -> Result<(), DomainError> {
    match v {
        Some(x) if !x.is_finite() => Err(DomainError::Validation(format!("{label} must be finite"))),
        Some(x) if positive && x <= 0.0 => Err(DomainError::Validation(format!("{label} must be positive"))),
        Some(x) if x < 0.0 => Err(DomainError::Validation(format!("{label} must not be negative"))),
        _ => Ok(()),
    }
}

impl OverrideParameters {
    pub fn validate(&self) -> Result<(), DomainError> {
        check("monthlyFeeSek", self.monthly_fee_sek, false)?;
        check("operatingCostsSek", self.operating_costs_sek, false)?;
        check("livingAreaM2", self.living_area_m2, true)?;
        check("specificFanPower", self.specific_fan_power, false)?;
        check("lastSalePrice", self.last_sale_price, true)?;
        check("radonBqM3", self.radon_bq_m3, false)?;
        if let Some(y) = self.construction_year {
            if !(1000..=3000).contains(&y) {
                return Err(DomainError::Validation(format!("constructionYear {y} out of range")));
            }
        }
        if self.address.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(DomainError::Validation("address must not be empty".into()));
        }
        Ok(())
    }

    /// Si cambia la dirección hay que volver a obtener los datos base.
    pub fn requires_base_refetch(&self) -> bool {
        self.address.is_some()
    }

    /// Aplica los overrides sobre una copia; `inputs` original no se toca.
    pub fn apply(&self, inputs: &PropertyInputs) -> PropertyInputs {
        let mut out = inputs.clone();
        if let Some(v) = self.monthly_fee_sek {
            out.cost.monthly_fee_sek = Some(v);
        }
        if let Some(v) = self.operating_costs_sek {
            out.cost.operating_costs_sek = Some(v);
        }
        if let Some(v) = self.living_area_m2 {
            out.property.living_area_m2 = v;
        }
        if let Some(v) = self.construction_year {
            out.property.construction_year = v;
        }
        if let Some(v) = self.energy_class {
            out.property.energy_class = Some(v);
        }
        if let Some(v) = self.ovk_status {
            out.property.ovk_status = v;
            out.compliance.ovk_status = v;
        }
        if let Some(v) = self.specific_fan_power {
            out.compliance.technical.specific_fan_power = Some(v);
        }
        if let Some(v) = self.last_sale_price {
            out.market.property_price = v;
        }
        if let Some(v) = self.last_sale_date {
            out.market.sale_date = v;
        }
        if let Some(v) = self.radon_bq_m3 {
            out.property.radon_bq_m3 = Some(v);
        }
        if let Some(v) = &self.address {
            out.property.address = v.clone();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_fields_and_bad_values_are_rejected() {
        assert!(serde_json::from_value::<OverrideParameters>(json!({"poolSize": 3})).is_err());
        let o: OverrideParameters = serde_json::from_value(json!({"livingAreaM2": 0})).unwrap();
        assert!(o.validate().is_err());
        let o: OverrideParameters = serde_json::from_value(json!({"energyClass": "b", "monthlyFeeSek": 3900})).unwrap();
        assert!(o.validate().is_ok());
        assert_eq!(o.energy_class, Some(EnergyClass::B));
        assert!(!o.requires_base_refetch());
    }
}
