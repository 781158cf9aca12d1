use chrono::{Duration, TimeZone, Utc};
use prop_domain::history::{current_at, latest};
use prop_domain::risk::RiskLevel;
use prop_domain::valuation::ValuationBreakdown;
use prop_domain::{HistoryEntry, OverrideParameters, ResultHistoryStore, ResultSource, RiskAssessment, ValuationResult};
use prop_persistence::pg::{PgResultHistory, PoolProvider};
use uuid::Uuid;

use test_support::with_pool;

fn entry(property_id: &str, run_id: Uuid, source: ResultSource, point: f64, minutes: i64) -> HistoryEntry {
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    HistoryEntry { result_id: Uuid::new_v4(),
                   property_id: property_id.to_string(),
                   run_id,
                   source,
                   valuation: ValuationResult { min_value: 2_760_000.0,
                                                max_value: 3_240_000.0,
                                                confidence: 0.84,
                                                point_estimate: point,
                                                breakdown: ValuationBreakdown { avg_street_price_per_m2: 48_000.0,
                                                                                adjustment_factor: 1.0,
                                                                                energy_multiplier: 1.0,
                                                                                age_years: 29,
                                                                                age_multiplier: 1.0,
                                                                                technical_multiplier: 1.0,
                                                                                years_since_sale: 2,
                                                                                growth_multiplier: 1.0609,
                                                                                comparables_count: 2 } },
                   risk: RiskAssessment { level: RiskLevel::Medium,
                                          score: 0.4,
                                          factors: vec![] },
                   overrides: None,
                   computed_at: t0 + Duration::minutes(minutes) }
}

#[test]
fn history_is_append_only_and_queryable_by_time() {
    let Some(pool) = with_pool(|p| p.clone()) else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let store = PgResultHistory::new(PoolProvider::new(pool));
    let property = format!("P-{}", Uuid::new_v4());
    let run = Uuid::new_v4();

    let original = entry(&property, run, ResultSource::Pipeline, 3_000_000.0, 0);
    let mut revalued = entry(&property, run, ResultSource::Revaluation, 3_100_000.0, 45);
    revalued.overrides = Some(OverrideParameters { monthly_fee_sek: Some(4200.0),
                                                   ..Default::default() });
    store.append(revalued.clone()).unwrap();
    store.append(original.clone()).unwrap();
    assert!(store.append(original.clone()).is_err(), "duplicate result id must be rejected");

    let all = store.entries_for_property(&property).unwrap();
    assert_eq!(all, vec![original.clone(), revalued.clone()]);
    assert_eq!(latest(&all), Some(&revalued));
    assert_eq!(current_at(&all, original.computed_at + Duration::minutes(5)), Some(&original));
    assert!(store.has_pipeline_entry(run).unwrap());
    assert!(!store.has_pipeline_entry(Uuid::new_v4()).unwrap());
}
