//! Índice de runs para consultas.
//!
//! Proyección del journal mantenida como `RunObserver`: cada evento que
//! cambia estado o atributos de búsqueda reemplaza el `Arc<RunSummary>` del
//! run por una copia nueva. Las consultas sólo clonan esos `Arc` y nunca
//! tocan los locks de ejecución del engine.
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use prop_core::constants::PROPERTY_ID_ATTRIBUTE;
use prop_core::{Artifact, FlowEvent, FlowEventKind, RunObserver, RunStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use prop_adapters::pipeline::{ATTR_LAST_RUN_AT, ATTR_MUNICIPALITY, ATTR_RISK_LEVEL};

/// Máximo de filas devueltas por consulta.
pub const QUERY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub property_id: String,
    pub idempotency_key: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub search_attributes: BTreeMap<String, String>,
    pub last_error: Option<String>,
}

/// Filtro conjuntivo; los campos ausentes no filtran. Comparación sin
/// distinguir mayúsculas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQuery {
    pub property_id: Option<String>,
    pub municipality: Option<String>,
    pub risk_level: Option<String>,
}

impl RunQuery {
    fn matches(&self, run: &RunSummary) -> bool {
        let check = |attr: &str, wanted: &Option<String>| match wanted.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(w) => run.search_attributes
                          .get(attr)
                          .is_some_and(|v| v.to_lowercase() == w.to_lowercase()),
        };
        check(PROPERTY_ID_ATTRIBUTE, &self.property_id)
        && check(ATTR_MUNICIPALITY, &self.municipality)
        && check(ATTR_RISK_LEVEL, &self.risk_level)
    }
}

#[derive(Default)]
pub struct RunRegistry {
    runs: DashMap<Uuid, Arc<RunSummary>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, run_id: Uuid) -> Option<Arc<RunSummary>> {
        self.runs.get(&run_id).map(|r| Arc::clone(r.value()))
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Runs que cumplen el filtro, del más reciente al más antiguo (empate
    /// por `run_id`).
    pub fn query(&self, filter: &RunQuery) -> Vec<Arc<RunSummary>> {
        let mut out: Vec<Arc<RunSummary>> = self.runs
                                                .iter()
                                                .filter(|r| filter.matches(r.value()))
                                                .map(|r| Arc::clone(r.value()))
                                                .collect();
        out.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| a.run_id.cmp(&b.run_id)));
        out.truncate(QUERY_LIMIT);
        out
    }

    /// Primer cierre gana: igual que el replay, nada posterior a un estado
    /// terminal lo cambia.
    fn close(&self, run_id: Uuid, status: RunStatus, error: Option<String>, at: DateTime<Utc>) {
        self.update(run_id, |r| {
                if r.status.is_terminal() {
                    return;
                }
                r.status = status;
                if status == RunStatus::Completed {
                    r.search_attributes.insert(ATTR_LAST_RUN_AT.to_string(), at.to_rfc3339());
                }
                if error.is_some() {
                    r.last_error = error;
                }
            });
    }

    fn update<F>(&self, run_id: Uuid, f: F)
        where F: FnOnce(&mut RunSummary)
    {
        if let Some(mut entry) = self.runs.get_mut(&run_id) {
            let mut next = RunSummary::clone(entry.value());
            f(&mut next);
            *entry.value_mut() = Arc::new(next);
        }
    }
}

impl RunObserver for RunRegistry {
    fn on_event(&self, event: &FlowEvent, _artifacts: &[Artifact]) {
        let run_id = event.run_id;
        match &event.kind {
            FlowEventKind::RunInitialized { property_id, idempotency_key, .. } => {
                let mut attrs = BTreeMap::new();
                attrs.insert(PROPERTY_ID_ATTRIBUTE.to_string(), property_id.clone());
                self.runs.insert(run_id,
                                 Arc::new(RunSummary { run_id,
                                                       property_id: property_id.clone(),
                                                       idempotency_key: idempotency_key.clone(),
                                                       status: RunStatus::Running,
                                                       start_time: event.ts,
                                                       search_attributes: attrs,
                                                       last_error: None }));
            }
            FlowEventKind::SearchAttributesUpserted { attributes } => self.update(run_id, |r| {
                r.search_attributes.extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
            }),
            FlowEventKind::StepFailed { error, .. } => self.update(run_id, |r| r.last_error = Some(error.to_string())),
            FlowEventKind::RunFailed { error, .. } => {
                self.close(run_id, RunStatus::Failed, Some(error.to_string()), event.ts)
            }
            FlowEventKind::RunCancelled { .. } => self.close(run_id, RunStatus::Cancelled, None, event.ts),
            FlowEventKind::RunCompleted { .. } => self.close(run_id, RunStatus::Completed, None, event.ts),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use prop_core::CoreEngineError;
    use serde_json::json;

    fn ev(run_id: Uuid, kind: FlowEventKind, ts: DateTime<Utc>) -> FlowEvent {
        FlowEvent { seq: 0, run_id, kind, ts }
    }

    fn init(reg: &RunRegistry, run_id: Uuid, pid: &str, ts: DateTime<Utc>) {
        reg.on_event(&ev(run_id,
                         FlowEventKind::RunInitialized { property_id: pid.into(),
                                                         definition_hash: "d".into(),
                                                         step_count: 7,
                                                         idempotency_key: format!("{pid}:k"),
                                                         seed: json!({}) },
                         ts),
                     &[]);
    }

    fn attrs(reg: &RunRegistry, run_id: Uuid, pairs: &[(&str, &str)]) {
        let attributes = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        reg.on_event(&ev(run_id, FlowEventKind::SearchAttributesUpserted { attributes }, Utc::now()), &[]);
    }

    #[test]
    fn filters_are_conjunctive_and_case_insensitive() {
        let reg = RunRegistry::new();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        init(&reg, a, "P-1", t0);
        init(&reg, b, "P-2", t0 + Duration::seconds(1));
        init(&reg, c, "P-3", t0 + Duration::seconds(2));
        attrs(&reg, a, &[("municipality", "Stockholm"), ("riskLevel", "Low")]);
        attrs(&reg, b, &[("municipality", "Stockholm"), ("riskLevel", "High")]);
        attrs(&reg, c, &[("municipality", "Solna"), ("riskLevel", "Low")]);

        let q = RunQuery { municipality: Some("stockholm".into()),
                           risk_level: Some("LOW".into()),
                           ..Default::default() };
        let hits: Vec<Uuid> = reg.query(&q).iter().map(|r| r.run_id).collect();
        assert_eq!(hits, vec![a]);

        let all: Vec<Uuid> = reg.query(&RunQuery::default()).iter().map(|r| r.run_id).collect();
        assert_eq!(all, vec![c, b, a]);
    }

    #[test]
    fn ties_on_start_time_are_ordered_by_run_id() {
        let reg = RunRegistry::new();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        for id in &ids {
            init(&reg, *id, "P-1", t0);
        }
        ids.sort();
        let got: Vec<Uuid> = reg.query(&RunQuery::default()).iter().map(|r| r.run_id).collect();
        assert_eq!(got, ids);
    }

    #[test]
    fn status_transitions_replace_the_snapshot() {
        let reg = RunRegistry::new();
        let id = Uuid::new_v4();
        init(&reg, id, "P-1", Utc::now());
        let before = reg.get(id).unwrap();
        reg.on_event(&ev(id,
                         FlowEventKind::RunFailed { step_id: "fetch_market".into(),
                                                    error: CoreEngineError::NotFound("sale".into()) },
                         Utc::now()),
                     &[]);
        let after = reg.get(id).unwrap();
        assert_eq!(before.status, RunStatus::Running);
        assert_eq!(after.status, RunStatus::Failed);
        assert_eq!(after.last_error.as_deref(), Some("not found: sale"));
    }

    #[test]
    fn first_terminal_event_wins() {
        let reg = RunRegistry::new();
        let id = Uuid::new_v4();
        init(&reg, id, "P-1", Utc::now());
        let done = Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap();
        reg.on_event(&ev(id, FlowEventKind::RunCompleted { flow_fingerprint: "fp".into() }, done), &[]);
        reg.on_event(&ev(id, FlowEventKind::RunCancelled { reason: "late".into() }, Utc::now()), &[]);
        let summary = reg.get(id).unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.search_attributes.get("lastRunAt").map(String::as_str), Some("2024-06-03T09:30:00+00:00"));

        let failed = Uuid::new_v4();
        init(&reg, failed, "P-2", Utc::now());
        reg.on_event(&ev(failed,
                         FlowEventKind::RunFailed { step_id: "fetch_base".into(),
                                                    error: CoreEngineError::NotFound("address".into()) },
                         Utc::now()),
                     &[]);
        reg.on_event(&ev(failed, FlowEventKind::RunCompleted { flow_fingerprint: "fp".into() }, Utc::now()), &[]);
        let summary = reg.get(failed).unwrap();
        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.last_error.as_deref(), Some("not found: address"));
        assert!(!summary.search_attributes.contains_key("lastRunAt"));
    }
}
