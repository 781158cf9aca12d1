use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use prop_adapters::artifacts::{SummaryArtifact, ValuationArtifact};
use prop_adapters::pipeline::{ATTR_HAS_OVK, ATTR_MUNICIPALITY, ATTR_RISK_LEVEL, COMPUTE_VALUATION, GENERATE_SUMMARY};
use prop_adapters::{valuation_definition, DatasetSource, PipelineConfig, PropertyDataSource, SeedInputs};
use prop_core::{idempotency_key, ArtifactSpec, CoreEngineError, EventStore, FlowEngine, InMemoryEventStore,
                InMemoryFlowRepository, RetryPolicy, RunStatus, StepStatus};
use prop_domain::{CostData, EnergyCompliance, MarketComparableSet, PropertyRecord};
use serde_json::json;
use uuid::Uuid;

fn dataset() -> DatasetSource {
    DatasetSource::from_value(json!([{
        "propertyId": "P-1",
        "streetAddress": "Storgatan 1",
        "livingArea": 64,
        "byggnadsar": 1995,
        "kommun": "Stockholm",
        "energiklass": "C",
        "ventilationskontroll": "Godkänd",
        "radonmatning": "60",
        "propertyPrice": 3000000,
        "saleDate": "2022-01-01",
        "streetSales": [
            {"amount": 3100000, "soldAt": "2023-04-01", "livingArea": 65, "numberOfRooms": 3},
            {"amount": 2900000, "soldAt": "2023-09-15", "livingArea": 60, "numberOfRooms": 2}
        ],
        "avgift": 4200,
        "driftkostnad": 900,
        "parkering": true,
        "omradeAvgiftPerKvm": 60,
        "sfp_kw_per_m3s": 1.5
    }, {
        "propertyId": "P-2",
        "streetAddress": "Lillgatan 2",
        "livingArea": 50,
        "byggnadsar": 2001,
        "propertyPrice": 2000000,
        "saleDate": "2021-03-01",
        "streetSales": []
    }]))
    .unwrap()
}

fn seed(id: &str, address: &str) -> SeedInputs {
    SeedInputs { property_id: id.into(),
                 address: address.into(),
                 area_m2: None,
                 year_built: None,
                 municipality: None,
                 valuation_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap() }
}

fn start(engine: &FlowEngine<Arc<InMemoryEventStore>, InMemoryFlowRepository>,
         def: &prop_core::FlowDefinition,
         s: &SeedInputs)
         -> Uuid {
    let run = Uuid::new_v4();
    engine.start(run,
                 &s.property_id,
                 idempotency_key(&s.property_id, &s.request_inputs()),
                 s.to_value().unwrap(),
                 def)
          .unwrap();
    run
}

#[test]
fn full_pipeline_over_dataset() {
    let store = Arc::new(InMemoryEventStore::new());
    let engine = FlowEngine::new_with_stores(store.clone(), InMemoryFlowRepository::new());
    let def = valuation_definition(Arc::new(dataset()), &PipelineConfig::default());
    let run = start(&engine, &def, &seed("P-1", "  storgatan 1"));

    let inst = engine.run_to_completion(run, &def).unwrap();
    assert_eq!(inst.status, RunStatus::Completed);
    assert!(inst.steps.iter().all(|s| s.status == StepStatus::Succeeded));
    assert_eq!(inst.search_attributes.get(ATTR_MUNICIPALITY).map(String::as_str), Some("Stockholm"));
    assert_eq!(inst.search_attributes.get(ATTR_RISK_LEVEL).map(String::as_str), Some("Low"));
    assert_eq!(inst.search_attributes.get(ATTR_HAS_OVK).map(String::as_str), Some("true"));

    let val_hash = inst.output_hash(COMPUTE_VALUATION).unwrap();
    let val = ValuationArtifact::from_artifact(&store.load_artifact(val_hash).unwrap().unwrap()).unwrap();
    assert!((val.valuation.point_estimate - 3_259_955.0).abs() < 5.0);
    assert_eq!(val.as_of, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());

    let sum_hash = inst.output_hash(GENERATE_SUMMARY).unwrap();
    let summary = SummaryArtifact::from_artifact(&store.load_artifact(sum_hash).unwrap().unwrap()).unwrap();
    assert_eq!(summary.text, "The property is valued around 3 259 955 SEK with risk level Low.");
    assert_eq!(summary.report["propertyId"], "P-1");
}

#[test]
fn empty_comparables_fail_at_compute_without_retry() {
    let engine = FlowEngine::builder(Arc::new(InMemoryEventStore::new()), InMemoryFlowRepository::new()).retry_policy(RetryPolicy::immediate(3))
                                                                                                        .build();
    let def = valuation_definition(Arc::new(dataset()), &PipelineConfig::default());
    let run = start(&engine, &def, &seed("P-2", "Lillgatan 2"));
    let err = engine.run_to_completion(run, &def).unwrap_err();
    assert!(matches!(err, CoreEngineError::Compute(_)), "{err:?}");
    let inst = engine.instance(run, &def).unwrap();
    assert_eq!(inst.status, RunStatus::Failed);
    assert_eq!(inst.slot(COMPUTE_VALUATION).unwrap().attempts, 1);
}

#[test]
fn unknown_address_fails_with_not_found() {
    let engine = FlowEngine::new_with_stores(Arc::new(InMemoryEventStore::new()), InMemoryFlowRepository::new());
    let def = valuation_definition(Arc::new(dataset()), &PipelineConfig::default());
    let run = start(&engine, &def, &seed("P-3", "Okänd väg 9"));
    assert!(matches!(engine.run_to_completion(run, &def), Err(CoreEngineError::NotFound(_))));
}

/// Delega al dataset pero el mercado falla las primeras `n` veces.
struct FlakyMarket {
    inner: DatasetSource,
    failures_left: AtomicUsize,
    market_calls: AtomicUsize,
}

impl PropertyDataSource for FlakyMarket {
    fn fetch_base(&self, seed: &SeedInputs) -> Result<PropertyRecord, CoreEngineError> {
        self.inner.fetch_base(seed)
    }
    fn fetch_market(&self, property: &PropertyRecord) -> Result<MarketComparableSet, CoreEngineError> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(CoreEngineError::UpstreamUnavailable("market api 503".into()));
        }
        self.inner.fetch_market(property)
    }
    fn fetch_cost(&self, property: &PropertyRecord) -> Result<CostData, CoreEngineError> {
        self.inner.fetch_cost(property)
    }
    fn fetch_energy_compliance(&self, property: &PropertyRecord) -> Result<EnergyCompliance, CoreEngineError> {
        self.inner.fetch_energy_compliance(property)
    }
}

#[test]
fn transient_market_failures_are_retried() {
    let source = Arc::new(FlakyMarket { inner: dataset(),
                                        failures_left: AtomicUsize::new(2),
                                        market_calls: AtomicUsize::new(0) });
    let engine = FlowEngine::builder(Arc::new(InMemoryEventStore::new()), InMemoryFlowRepository::new()).retry_policy(RetryPolicy::immediate(3))
                                                                                                        .build();
    let def = valuation_definition(source.clone(), &PipelineConfig::default());
    let run = start(&engine, &def, &seed("P-1", "Storgatan 1"));
    let inst = engine.run_to_completion(run, &def).unwrap();
    assert_eq!(inst.status, RunStatus::Completed);
    assert_eq!(source.market_calls.load(Ordering::SeqCst), 3);
}
