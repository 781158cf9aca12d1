//! Builder para `FlowEngine`.
//!
//! Reúne stores, política de reintentos y observadores antes de construir el
//! engine. Los observadores se fijan aquí porque el engine se comparte
//! inmutable entre drivers.
use std::sync::Arc;

use super::{FlowEngine, RetryPolicy, RunObserver};
use crate::event::EventStore;
use crate::repo::FlowRepository;

pub struct EngineBuilder<E, R>
    where E: EventStore,
          R: FlowRepository
{
    event_store: E,
    repository: R,
    policy: RetryPolicy,
    observers: Vec<Arc<dyn RunObserver>>,
}

impl<E, R> EngineBuilder<E, R>
    where E: EventStore,
          R: FlowRepository
{
    pub fn new(event_store: E, repository: R) -> Self {
        Self { event_store,
               repository,
               policy: RetryPolicy::default(),
               observers: Vec::new() }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> FlowEngine<E, R> {
        FlowEngine::from_parts(self.event_store, self.repository, self.policy, self.observers)
    }
}
