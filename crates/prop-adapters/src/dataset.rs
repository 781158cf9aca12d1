//! Dataset local de propiedades (archivo JSON leído una vez al arrancar).
//!
//! Acepta dos formas:
//! - un array plano de propiedades;
//! - `{ "energideklarationer": [ { "fastigheter": [ ... ] } ] }`, donde la
//!   dirección puede venir como `streetAddress` o `adress`.
//!
//! Cada entrada se parsea a `DatasetRecord`, con campos opcionales
//! explícitos; los valores por defecto se aplican al construir el modelo
//! de dominio.
use std::path::Path;

use chrono::NaiveDate;
use log::{debug, info};
use prop_core::CoreEngineError;
use prop_domain::{ComparableSale, CostData, EnergyClass, EnergyCompliance, MarketComparableSet, OvkStatus,
                  PropertyRecord, TechnicalInspectionData};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{domain_error, AdapterError};
use crate::seed::SeedInputs;
use crate::source::{normalize_address, PropertyDataSource};

/// Número que puede venir como string ("95", "95,5") en los exportes.
fn lenient_f64<'de, D>(de: D) -> Result<Option<f64>, D::Error>
    where D: Deserializer<'de>
{
    let v = Option::<Value>::deserialize(de)?;
    Ok(match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSale {
    pub amount: f64,
    pub sold_at: NaiveDate,
    pub living_area: f64,
    #[serde(default)]
    pub number_of_rooms: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetRecord {
    #[serde(default, rename = "propertyId", alias = "fastighetsbeteckning")]
    pub property_id: Option<String>,
    #[serde(default, rename = "streetAddress", alias = "adress")]
    pub street_address: Option<String>,
    #[serde(default, rename = "livingArea", alias = "boarea", deserialize_with = "lenient_f64")]
    pub living_area: Option<f64>,
    #[serde(default, rename = "byggnadsar", alias = "constructionYear")]
    pub construction_year: Option<i32>,
    #[serde(default, rename = "kommun", alias = "municipality")]
    pub municipality: Option<String>,
    #[serde(default, rename = "energiklass", alias = "energyClass")]
    pub energy_class: Option<String>,
    #[serde(default, rename = "energiprestanda", deserialize_with = "lenient_f64")]
    pub energy_performance: Option<f64>,
    #[serde(default, rename = "radonmatning", deserialize_with = "lenient_f64")]
    pub radon: Option<f64>,
    #[serde(default, rename = "ventilationskontroll")]
    pub ovk: Option<String>,
    #[serde(default, rename = "ovkDatum")]
    pub ovk_date: Option<NaiveDate>,

    #[serde(default, rename = "propertyPrice", deserialize_with = "lenient_f64")]
    pub sale_price: Option<f64>,
    #[serde(default, rename = "saleDate")]
    pub sale_date: Option<NaiveDate>,
    #[serde(default, rename = "streetSales")]
    pub street_sales: Vec<DatasetSale>,

    #[serde(default, rename = "avgift", alias = "monthlyFeeSek", deserialize_with = "lenient_f64")]
    pub monthly_fee: Option<f64>,
    #[serde(default, rename = "driftkostnad", alias = "operatingCostsSek", deserialize_with = "lenient_f64")]
    pub operating_costs: Option<f64>,
    #[serde(default, rename = "parkering")]
    pub parking: Option<bool>,
    #[serde(default, rename = "omradeAvgiftPerKvm", deserialize_with = "lenient_f64")]
    pub area_avg_fee_per_m2: Option<f64>,

    #[serde(default, rename = "sfp_kw_per_m3s", deserialize_with = "lenient_f64")]
    pub sfp: Option<f64>,
    #[serde(default, rename = "proj_floede_ls", deserialize_with = "lenient_f64")]
    pub projected_flow: Option<f64>,
    #[serde(default, rename = "uppm_floede_ls", deserialize_with = "lenient_f64")]
    pub measured_flow: Option<f64>,
    #[serde(default, rename = "tilluft_filterklass")]
    pub supply_filter: Option<String>,
    #[serde(default, rename = "franluft_filterklass")]
    pub exhaust_filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatasetSource {
    records: Vec<DatasetRecord>,
}

impl DatasetSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let value: Value = serde_json::from_str(&raw)?;
        let source = Self::from_value(value)?;
        info!("dataset {} loaded: {} properties", path.as_ref().display(), source.len());
        Ok(source)
    }

    pub fn from_value(value: Value) -> Result<Self, AdapterError> {
        let candidates: Vec<Value> = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("energideklarationer") {
                Some(Value::Array(decls)) => decls.into_iter()
                                                  .filter_map(|mut d| match d.get_mut("fastigheter").map(Value::take) {
                                                      Some(Value::Array(f)) => Some(f),
                                                      _ => None,
                                                  })
                                                  .flatten()
                                                  .collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        let records = candidates.into_iter()
                                .map(serde_json::from_value::<DatasetRecord>)
                                .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Match por dirección normalizada; ante varios, gana el de igual id.
    pub fn find_by_address(&self, property_id: &str, address: &str) -> Option<&DatasetRecord> {
        let target = normalize_address(address);
        let mut matches = self.records.iter().filter(|r| {
                                                 r.street_address
                                                  .as_deref()
                                                  .is_some_and(|a| normalize_address(a) == target)
                                             });
        let first = matches.next()?;
        if first.property_id.as_deref() == Some(property_id) {
            return Some(first);
        }
        Some(matches.find(|r| r.property_id.as_deref() == Some(property_id))
                    .unwrap_or(first))
    }

    /// Registro de una propiedad ya resuelta: por id y, si no, por dirección.
    fn record_for(&self, property: &PropertyRecord) -> Result<&DatasetRecord, CoreEngineError> {
        self.records
            .iter()
            .find(|r| r.property_id.as_deref() == Some(property.property_id.as_str()))
            .or_else(|| self.find_by_address(&property.property_id, &property.address))
            .ok_or_else(|| CoreEngineError::NotFound(format!("property {} not in dataset", property.property_id)))
    }
}

impl PropertyDataSource for DatasetSource {
    fn fetch_base(&self, seed: &SeedInputs) -> Result<PropertyRecord, CoreEngineError> {
        let rec = self.find_by_address(&seed.property_id, &seed.address)
                      .ok_or_else(|| CoreEngineError::NotFound(format!("no property at address '{}'", seed.address)))?;
        debug!("dataset match for {}: {:?}", seed.property_id, rec.property_id);
        let living_area_m2 = rec.living_area
                                .or(seed.area_m2)
                                .ok_or_else(|| CoreEngineError::Validation(format!("living area unknown for {}", seed.property_id)))?;
        let construction_year =
            rec.construction_year
               .or(seed.year_built)
               .ok_or_else(|| CoreEngineError::Validation(format!("construction year unknown for {}", seed.property_id)))?;
        Ok(PropertyRecord { property_id: seed.property_id.clone(),
                            address: rec.street_address.clone().unwrap_or_else(|| seed.address.clone()),
                            living_area_m2,
                            construction_year,
                            municipality: rec.municipality
                                             .clone()
                                             .or_else(|| seed.municipality.clone())
                                             .unwrap_or_default(),
                            energy_class: rec.energy_class.as_deref().and_then(EnergyClass::parse),
                            ovk_status: OvkStatus::from_label(rec.ovk.as_deref()),
                            energy_performance: rec.energy_performance,
                            radon_bq_m3: rec.radon })
    }

    fn fetch_market(&self, property: &PropertyRecord) -> Result<MarketComparableSet, CoreEngineError> {
        let rec = self.record_for(property)?;
        let (Some(price), Some(date)) = (rec.sale_price, rec.sale_date) else {
            return Err(CoreEngineError::NotFound(format!("no recorded sale for {}", property.property_id)));
        };
        let comparables = rec.street_sales
                             .iter()
                             .map(|s| ComparableSale { amount: s.amount,
                                                       sold_at: s.sold_at,
                                                       living_area_m2: s.living_area,
                                                       rooms: s.number_of_rooms })
                             .collect();
        MarketComparableSet::new(price, date, comparables).map_err(domain_error)
    }

    fn fetch_cost(&self, property: &PropertyRecord) -> Result<CostData, CoreEngineError> {
        let rec = self.record_for(property)?;
        Ok(CostData { monthly_fee_sek: rec.monthly_fee,
                      operating_costs_sek: rec.operating_costs,
                      parking_available: rec.parking.unwrap_or(false),
                      area_avg_fee_per_m2: rec.area_avg_fee_per_m2 })
    }

    fn fetch_energy_compliance(&self, property: &PropertyRecord) -> Result<EnergyCompliance, CoreEngineError> {
        let rec = self.record_for(property)?;
        Ok(EnergyCompliance { ovk_status: OvkStatus::from_label(rec.ovk.as_deref()),
                              inspection_date: rec.ovk_date,
                              technical: TechnicalInspectionData { specific_fan_power: rec.sfp,
                                                                   projected_flow_ls: rec.projected_flow,
                                                                   measured_flow_ls: rec.measured_flow,
                                                                   supply_filter_class: rec.supply_filter.clone(),
                                                                   exhaust_filter_class: rec.exhaust_filter.clone() } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed(id: &str, address: &str) -> SeedInputs {
        SeedInputs { property_id: id.into(),
                     address: address.into(),
                     area_m2: Some(55.0),
                     year_built: Some(1980),
                     municipality: Some("Solna".into()),
                     valuation_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap() }
    }

    #[test]
    fn nested_layout_with_adress_and_seed_defaults() {
        let data = json!({
            "energideklarationer": [
                {"fastigheter": [
                    {"fastighetsbeteckning": "X-1", "adress": "Storgatan 1", "energiklass": "d", "energiprestanda": "120,5"},
                    {"fastighetsbeteckning": "X-2", "adress": "storgatan  1", "kommun": "Stockholm", "livingArea": 70}
                ]},
                {"note": "no properties here"}
            ]
        });
        let ds = DatasetSource::from_value(data).unwrap();
        assert_eq!(ds.len(), 2);

        let first = ds.fetch_base(&seed("P-9", " STORGATAN 1 ")).unwrap();
        assert_eq!(first.living_area_m2, 55.0);
        assert_eq!(first.municipality, "Solna");
        assert_eq!(first.energy_class, Some(EnergyClass::D));
        assert_eq!(first.energy_performance, Some(120.5));
        assert_eq!(first.ovk_status, OvkStatus::Missing);

        let preferred = ds.fetch_base(&seed("X-2", "Storgatan 1")).unwrap();
        assert_eq!(preferred.municipality, "Stockholm");
        assert_eq!(preferred.living_area_m2, 70.0);
    }

    #[test]
    fn unknown_address_and_missing_sale_are_not_found() {
        let ds = DatasetSource::from_value(json!([{"propertyId": "A", "streetAddress": "Vägen 2", "livingArea": 40, "byggnadsar": 2001}])).unwrap();
        assert!(matches!(ds.fetch_base(&seed("A", "Annan väg 3")), Err(CoreEngineError::NotFound(_))));
        let base = ds.fetch_base(&seed("A", "vägen 2")).unwrap();
        assert!(matches!(ds.fetch_market(&base), Err(CoreEngineError::NotFound(_))));
        let cost = ds.fetch_cost(&base).unwrap();
        assert_eq!(cost, CostData::default());
    }
}
