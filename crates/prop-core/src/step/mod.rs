//! Definiciones relacionadas a Steps.
//!
//! Un Step es una unidad reintentable que lee el seed del run y los outputs
//! de los steps previos, y produce 0..n artifacts. Este módulo define:
//! - `StepDefinition`: interfaz neutral usada por el engine.
//! - `StepRunResult` y señales (`StepSignal`).
//! - `StepStatus` / `RunStatus`.

pub mod definition;
mod run_result;
mod status;

pub use definition::{StepDefinition, StepKind};
pub use run_result::{StepRunResult, StepSignal};
pub use status::{RunStatus, StepStatus};
