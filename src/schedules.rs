//! Revaloración periódica por propiedad.
//!
//! Cada schedule es una tarea de tokio que, en cada tick, pide un `start`
//! con la misma solicitud. Si la propiedad aún tiene un run activo el tick
//! se salta: la deduplicación de `start` (o su `Conflict`) ya lo garantiza.
//! Hay a lo sumo un schedule por propiedad; asegurar uno existente lo
//! reemplaza.
use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::errors::ServiceError;
use crate::service::{StartRequest, ValuationService};

pub const WEEKLY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub fn schedule_id(property_id: &str) -> String {
    format!("sched-{property_id}")
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInfo {
    pub schedule_id: String,
    pub property_id: String,
    pub interval_secs: u64,
    /// `false` si reemplazó un schedule existente.
    pub created: bool,
}

struct Schedule {
    task: JoinHandle<()>,
}

#[derive(Default)]
pub struct ScheduleBook {
    entries: DashMap<String, Schedule>,
}

impl ScheduleBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Crea o reemplaza el schedule de `request.property_id`. El primer
    /// tick llega tras un intervalo completo.
    pub fn ensure(&self,
                  service: Weak<ValuationService>,
                  request: StartRequest,
                  interval: Duration,
                  runtime: &Handle)
                  -> ScheduleInfo {
        let property_id = request.property_id.clone();
        let id = schedule_id(&property_id);
        let task = runtime.spawn(tick_loop(service, request, interval, id.clone()));
        let created = match self.entries.insert(property_id.clone(), Schedule { task }) {
            Some(previous) => {
                previous.task.abort();
                false
            }
            None => true,
        };
        info!(schedule_id = %id, interval_secs = interval.as_secs(), created, "schedule ensured");
        ScheduleInfo { schedule_id: id,
                       property_id,
                       interval_secs: interval.as_secs(),
                       created }
    }
}

impl Drop for ScheduleBook {
    fn drop(&mut self) {
        for entry in self.entries.iter() {
            entry.value().task.abort();
        }
    }
}

async fn tick_loop(service: Weak<ValuationService>, request: StartRequest, interval: Duration, id: String) {
    let period = interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(svc) = service.upgrade() else {
            debug!(schedule_id = %id, "service gone; schedule stops");
            return;
        };
        let req = request.clone();
        match tokio::task::spawn_blocking(move || svc.start(req)).await {
            Ok(Ok(outcome)) if outcome.created => info!(schedule_id = %id, run_id = %outcome.run_id, "scheduled run started"),
            Ok(Ok(outcome)) => debug!(schedule_id = %id, run_id = %outcome.run_id, "previous run still active; tick skipped"),
            Ok(Err(ServiceError::Conflict { run_id, .. })) => {
                debug!(schedule_id = %id, ?run_id, "previous run still active; tick skipped")
            }
            Ok(Err(e)) => warn!(schedule_id = %id, error = %e, "scheduled start rejected"),
            Err(e) => error!(schedule_id = %id, error = %e, "scheduled start panicked"),
        }
    }
}
