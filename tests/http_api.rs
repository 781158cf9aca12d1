use std::sync::Arc;

use prop_adapters::DatasetSource;
use prop_core::{InMemoryEventStore, RetryPolicy};
use prop_domain::InMemoryResultHistory;
use propflow::{ServiceSettings, ValuationService};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use ureq::Agent;

struct TestServer {
    base: String,
    service: Arc<ValuationService>,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}

async fn spawn_server() -> TestServer {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/sample_properties.json");
    let service = ValuationService::new(Arc::new(InMemoryEventStore::new()),
                                        Arc::new(InMemoryResultHistory::new()),
                                        Arc::new(DatasetSource::from_path(path).unwrap()),
                                        ServiceSettings { retry: RetryPolicy::immediate(3),
                                                          pipeline: Default::default() },
                                        Handle::current());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let svc = service.clone();
    tokio::spawn(async move {
        let _ = propflow::http::serve(listener, svc, async {
                    let _ = rx.await;
                })
                .await;
    });
    TestServer { base: format!("http://{addr}"),
                 service,
                 stop: Some(tx) }
}

fn agent() -> Agent {
    Agent::config_builder().http_status_as_error(false)
                           .build()
                           .into()
}

fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
    let mut resp = agent().post(&format!("{base}{path}")).send_json(body).unwrap();
    let status = resp.status().as_u16();
    (status, resp.body_mut().read_json::<Value>().unwrap())
}

fn get(base: &str, path: &str) -> (u16, Value) {
    let mut resp = agent().get(&format!("{base}{path}")).call().unwrap();
    let status = resp.status().as_u16();
    (status, resp.body_mut().read_json::<Value>().unwrap())
}

/// Ejecuta llamadas HTTP bloqueantes fuera del runtime.
async fn blocking<T, F>(f: F) -> T
    where F: FnOnce() -> T + Send + 'static,
          T: Send + 'static
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn start_query_and_read_results_over_http() {
    let server = spawn_server().await;
    let base = server.base.clone();

    let (status, body) = blocking({
                             let base = base.clone();
                             move || {
                                 post(&base,
                                      "/workflows/start",
                                      json!({"propertyId": "SOFIA 12:4", "address": "Götgatan 48"}))
                             }
                         }).await;
    assert_eq!(status, 201, "{body}");
    assert_eq!(body["status"], "Running");
    let run_id: uuid::Uuid = body["runId"].as_str().unwrap().parse().unwrap();
    server.service.wait_for(run_id).await;

    let (status, body) = blocking({
                             let base = base.clone();
                             move || get(&base, &format!("/workflows/last-result?runId={run_id}"))
                         }).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["source"], "Pipeline");
    assert!((body["valuation"]["confidence"].as_f64().unwrap() - 0.84).abs() < 1e-9);
    assert!(body["resultId"].is_string());
    assert!(body["computedAt"].is_string());

    let (status, body) = blocking({
                             let base = base.clone();
                             move || post(&base, "/workflows/query", json!({"municipality": "Stockholm"}))
                         }).await;
    assert_eq!(status, 200);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["runId"], run_id.to_string());
    assert_eq!(items[0]["status"], "Completed");
    assert_eq!(items[0]["searchAttributes"]["municipality"], "Stockholm");
    assert!(items[0]["searchAttributes"]["hasOvk"].is_string());
    assert!(items[0]["searchAttributes"]["lastRunAt"].is_string());
    assert!(items[0]["lastError"].is_null());

    let (status, body) = blocking({
                             let base = base.clone();
                             move || get(&base, &format!("/workflows/progress?runId={run_id}"))
                         }).await;
    assert_eq!(status, 200);
    assert_eq!(body["stage"], "done");
    assert_eq!(body["steps"].as_array().unwrap().len(), 7);

    let (status, body) = blocking({
                             let base = base.clone();
                             move || {
                                 post(&base,
                                      "/workflows/revalue",
                                      json!({"runId": run_id, "overrides": {"energyClass": "A"}}))
                             }
                         }).await;
    assert_eq!(status, 200, "{body}");
    let result_id = body["resultId"].as_str().unwrap().to_string();

    let (status, body) = blocking({
                             let base = base.clone();
                             move || get(&base, &format!("/workflows/history?runId={run_id}"))
                         }).await;
    assert_eq!(status, 200);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["resultId"], result_id.as_str());
    assert_eq!(items[1]["overrides"]["energyClass"], "A");

    let (status, body) = blocking(move || post(&base, "/workflows/cancel", json!({"runId": run_id}))).await;
    assert_eq!(status, 409, "{body}");
}

#[tokio::test(flavor = "multi_thread")]
async fn errors_map_to_status_codes() {
    let server = spawn_server().await;
    let base = server.base.clone();

    let results = blocking(move || {
                      let unknown = uuid::Uuid::new_v4();
                      let malformed = agent().post(&format!("{base}/workflows/start"))
                                             .header("content-type", "application/json")
                                             .send("{not json")
                                             .unwrap()
                                             .status()
                                             .as_u16();
                      vec![("malformed json", malformed, 400),
                           ("empty address",
                            post(&base, "/workflows/start", json!({"propertyId": "X", "address": " "})).0,
                            400),
                           ("unknown override field",
                            post(&base, "/workflows/revalue", json!({"runId": unknown, "overrides": {"colour": "red"}})).0,
                            400),
                           ("bad run id", get(&base, "/workflows/last-result?runId=nope").0, 400),
                           ("unknown run", get(&base, &format!("/workflows/last-result?runId={unknown}")).0, 404),
                           ("revalue unknown run", post(&base, "/workflows/revalue", json!({"runId": unknown})).0, 404),
                           ("cancel unknown run", post(&base, "/workflows/cancel", json!({"runId": unknown})).0, 404),
                           ("schedule without address",
                            post(&base, "/workflows/schedules/ensure-weekly", json!({"propertyId": "X", "address": ""})).0,
                            400),
                           ("no such route", get(&base, "/nope").0, 404),
                           ("health", get(&base, "/health").0, 200)]
                  }).await;
    for (case, got, want) in results {
        assert_eq!(got, want, "{case}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_address_fails_the_run_not_the_request() {
    let server = spawn_server().await;
    let base = server.base.clone();
    let (status, body) = blocking(move || {
                             post(&base,
                                  "/workflows/start",
                                  json!({"propertyId": "GHOST 1:1", "address": "Okänd väg 9"}))
                         }).await;
    assert_eq!(status, 201);
    let run_id: uuid::Uuid = body["runId"].as_str().unwrap().parse().unwrap();
    let summary = server.service.wait_for(run_id).await.unwrap();
    assert_eq!(summary.status, prop_core::RunStatus::Failed);
    assert!(summary.last_error.as_deref().is_some_and(|e| e.starts_with("not found")));

    let base = server.base.clone();
    let (listed, missing) = blocking(move || {
                                (post(&base, "/workflows/query", json!({"propertyId": "ghost 1:1"})),
                                 get(&base, &format!("/workflows/last-result?runId={run_id}")))
                            }).await;
    assert_eq!(listed.0, 200);
    let item = &listed.1["items"][0];
    assert_eq!(item["status"], "Failed");
    assert_eq!(item["lastError"].as_str(), summary.last_error.as_deref());

    assert_eq!(missing.0, 404);
    assert_eq!(missing.1["runId"], run_id.to_string());
    assert_eq!(missing.1["status"], "Failed");
    assert_eq!(missing.1["lastError"].as_str(), summary.last_error.as_deref());
}

#[tokio::test(flavor = "multi_thread")]
async fn weekly_schedule_is_created_then_replaced() {
    let server = spawn_server().await;
    let base = server.base.clone();
    let (first, second) = blocking(move || {
                              let payload = json!({"propertyId": "SOFIA 12:4", "address": "Götgatan 48"});
                              (post(&base, "/workflows/schedules/ensure-weekly", payload.clone()),
                               post(&base, "/workflows/schedules/ensure-weekly", payload))
                          }).await;
    assert_eq!(first.0, 200, "{}", first.1);
    assert_eq!(first.1["ok"], true);
    assert_eq!(first.1["scheduleId"], "sched-SOFIA 12:4");
    assert_eq!(first.1["intervalSecs"], 7 * 24 * 60 * 60);
    assert_eq!(first.1["created"], true);
    assert_eq!(second.1["created"], false);
    assert_eq!(server.service.schedules().len(), 1);
    // El primer tick llega dentro de una semana.
    assert!(server.service.registry().is_empty());
}
