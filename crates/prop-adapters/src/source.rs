use prop_core::CoreEngineError;
use prop_domain::{CostData, EnergyCompliance, MarketComparableSet, PropertyRecord};

use crate::seed::SeedInputs;

/// Fuente de datos de una propiedad. Cada método corresponde a un step de
/// fetch; los errores transitorios deben salir como `UpstreamUnavailable`
/// para que el engine los reintente.
pub trait PropertyDataSource: Send + Sync {
    /// Registro base por dirección normalizada; `NotFound` si no hay match.
    fn fetch_base(&self, seed: &SeedInputs) -> Result<PropertyRecord, CoreEngineError>;

    fn fetch_market(&self, property: &PropertyRecord) -> Result<MarketComparableSet, CoreEngineError>;

    fn fetch_cost(&self, property: &PropertyRecord) -> Result<CostData, CoreEngineError>;

    fn fetch_energy_compliance(&self, property: &PropertyRecord) -> Result<EnergyCompliance, CoreEngineError>;
}

/// trim + minúsculas + espacios colapsados.
pub fn normalize_address(raw: &str) -> String {
    raw.split_whitespace()
       .map(str::to_lowercase)
       .collect::<Vec<_>>()
       .join(" ")
}
