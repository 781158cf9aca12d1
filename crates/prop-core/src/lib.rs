//! prop-core: motor durable de steps con journal append-only, replay,
//! reintentos con backoff y reanudación tras reinicio.
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod model;
pub mod repo;
pub mod step;

pub use engine::{idempotency_key, EngineBuilder, FlowEngine, RetryPolicy, RunObserver};
pub use errors::{classify_error, CoreEngineError, ErrorClass};
pub use event::{EventStore, FlowEvent, FlowEventKind, InMemoryEventStore};
pub use model::{Artifact, ArtifactKind, ArtifactSpec, ExecutionContext};
pub use repo::{build_flow_definition, build_flow_definition_auto, FlowDefinition, FlowInstance, FlowRepository,
               InMemoryFlowRepository, StepSlot};
pub use step::{RunStatus, StepDefinition, StepKind, StepRunResult, StepSignal, StepStatus};
