// prop-domain: modelo de propiedad y calculadoras puras (valoración y riesgo)
pub mod error;
pub mod history;
pub mod model;
pub mod overrides;
pub mod risk;
pub mod valuation;

pub use error::DomainError;
pub use history::{HistoryEntry, InMemoryResultHistory, ResultHistoryStore, ResultSource};
pub use model::{ComparableSale, CostData, EnergyClass, EnergyCompliance, MarketComparableSet, OvkStatus, PropertyInputs,
                PropertyRecord, TechnicalInspectionData};
pub use overrides::OverrideParameters;
pub use risk::{assess_risk, FactorScore, RiskAssessment, RiskFactor, RiskLevel, RiskWeights};
pub use valuation::{calculate_valuation, ValuationParams, ValuationResult};
