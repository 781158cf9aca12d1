//! Historial de resultados por propiedad. Append-only: las entradas nunca se
//! modifican ni se borran; una revaluación agrega una entrada nueva.
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::overrides::OverrideParameters;
use crate::risk::RiskAssessment;
use crate::valuation::ValuationResult;
use crate::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultSource {
    Pipeline,
    Revaluation,
}

impl ResultSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultSource::Pipeline => "Pipeline",
            ResultSource::Revaluation => "Revaluation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub result_id: Uuid,
    pub property_id: String,
    pub run_id: Uuid,
    pub source: ResultSource,
    pub valuation: ValuationResult,
    pub risk: RiskAssessment,
    pub overrides: Option<OverrideParameters>,
    pub computed_at: DateTime<Utc>,
}

pub trait ResultHistoryStore: Send + Sync {
    fn append(&self, entry: HistoryEntry) -> Result<(), DomainError>;

    /// Entradas de una propiedad, ordenadas por `computed_at` ascendente.
    fn entries_for_property(&self, property_id: &str) -> Result<Vec<HistoryEntry>, DomainError>;

    /// Entradas originadas en un run (pipeline + revaluaciones), ascendente.
    fn entries_for_run(&self, run_id: Uuid) -> Result<Vec<HistoryEntry>, DomainError>;

    fn has_pipeline_entry(&self, run_id: Uuid) -> Result<bool, DomainError> {
        Ok(self.entries_for_run(run_id)?
               .iter()
               .any(|e| e.source == ResultSource::Pipeline))
    }
}

/// Entrada más reciente.
pub fn latest(entries: &[HistoryEntry]) -> Option<&HistoryEntry> {
    entries.iter().max_by_key(|e| e.computed_at)
}

/// Entrada vigente en `at`: la última con `computed_at <= at`.
pub fn current_at(entries: &[HistoryEntry], at: DateTime<Utc>) -> Option<&HistoryEntry> {
    entries.iter()
           .filter(|e| e.computed_at <= at)
           .max_by_key(|e| e.computed_at)
}

#[derive(Default)]
pub struct InMemoryResultHistory {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl InMemoryResultHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn filtered(&self, pred: impl Fn(&HistoryEntry) -> bool) -> Result<Vec<HistoryEntry>, DomainError> {
        let guard = self.entries
                        .read()
                        .map_err(|_| DomainError::Storage("history lock poisoned".into()))?;
        let mut out: Vec<HistoryEntry> = guard.iter().filter(|e| pred(e)).cloned().collect();
        out.sort_by_key(|e| e.computed_at);
        Ok(out)
    }
}

impl ResultHistoryStore for InMemoryResultHistory {
    fn append(&self, entry: HistoryEntry) -> Result<(), DomainError> {
        let mut guard = self.entries
                            .write()
                            .map_err(|_| DomainError::Storage("history lock poisoned".into()))?;
        if guard.iter().any(|e| e.result_id == entry.result_id) {
            return Err(DomainError::Storage(format!("result {} already recorded", entry.result_id)));
        }
        guard.push(entry);
        Ok(())
    }

    fn entries_for_property(&self, property_id: &str) -> Result<Vec<HistoryEntry>, DomainError> {
        self.filtered(|e| e.property_id == property_id)
    }

    fn entries_for_run(&self, run_id: Uuid) -> Result<Vec<HistoryEntry>, DomainError> {
        self.filtered(|e| e.run_id == run_id)
    }
}
