//! Repositorio: reconstrucción del estado de un run a partir del journal.

pub mod types;

pub use types::{build_flow_definition, build_flow_definition_auto, FlowDefinition, FlowInstance, FlowRepository,
                InMemoryFlowRepository, StepSlot};
