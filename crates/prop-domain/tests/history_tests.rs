use chrono::{Duration, TimeZone, Utc};
use prop_domain::history::{current_at, latest};
use prop_domain::risk::RiskLevel;
use prop_domain::valuation::ValuationBreakdown;
use prop_domain::{HistoryEntry, InMemoryResultHistory, OverrideParameters, ResultHistoryStore, ResultSource,
                  RiskAssessment, ValuationResult};
use uuid::Uuid;

fn entry(run_id: Uuid, source: ResultSource, point: f64, minutes: i64) -> HistoryEntry {
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    HistoryEntry { result_id: Uuid::new_v4(),
                   property_id: "P-1".into(),
                   run_id,
                   source,
                   valuation: ValuationResult { min_value: point * 0.92,
                                                max_value: point * 1.08,
                                                confidence: 0.84,
                                                point_estimate: point,
                                                breakdown: ValuationBreakdown { avg_street_price_per_m2: 0.0,
                                                                                adjustment_factor: 1.0,
                                                                                energy_multiplier: 1.0,
                                                                                age_years: 0,
                                                                                age_multiplier: 1.0,
                                                                                technical_multiplier: 1.0,
                                                                                years_since_sale: 0,
                                                                                growth_multiplier: 1.0,
                                                                                comparables_count: 2 } },
                   risk: RiskAssessment { level: RiskLevel::Low,
                                          score: 0.1,
                                          factors: vec![] },
                   overrides: None,
                   computed_at: t0 + Duration::minutes(minutes) }
}

#[test]
fn revaluation_adds_entry_and_original_stays_retrievable() {
    let store = InMemoryResultHistory::new();
    let run = Uuid::new_v4();
    let original = entry(run, ResultSource::Pipeline, 3_000_000.0, 0);
    let mut revalued = entry(run, ResultSource::Revaluation, 3_200_000.0, 30);
    revalued.overrides = Some(OverrideParameters { monthly_fee_sek: Some(3500.0),
                                                   ..Default::default() });
    store.append(original.clone()).unwrap();
    store.append(revalued.clone()).unwrap();

    let all = store.entries_for_run(run).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(latest(&all), Some(&revalued));
    assert_eq!(current_at(&all, original.computed_at + Duration::minutes(10)), Some(&original));
    assert_eq!(current_at(&all, original.computed_at - Duration::minutes(1)), None);
    assert!(store.has_pipeline_entry(run).unwrap());
    assert_eq!(store.entries_for_property("P-1").unwrap().len(), 2);
}

#[test]
fn duplicate_result_id_is_rejected() {
    let store = InMemoryResultHistory::new();
    let e = entry(Uuid::new_v4(), ResultSource::Pipeline, 1.0, 0);
    store.append(e.clone()).unwrap();
    assert!(store.append(e).is_err());
}
