//! Engine: ejecución durable de un `FlowDefinition` sobre un journal.

pub mod builder;
pub mod core;
pub mod observer;
pub mod retry;

pub use builder::EngineBuilder;
pub use core::{idempotency_key, FlowEngine};
pub use observer::RunObserver;
pub use retry::RetryPolicy;

pub use crate::event::{EventStore, FlowEvent, FlowEventKind, InMemoryEventStore};
pub use crate::repo::{FlowDefinition, FlowRepository, InMemoryFlowRepository};
pub use crate::step::{RunStatus, StepRunResult, StepStatus};
