//! Steps de prueba con contadores de invocación y fallos programados.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use prop_core::model::ExecutionContext;
use prop_core::{Artifact, ArtifactKind, CoreEngineError, StepDefinition, StepKind, StepRunResult, StepSignal};
use serde_json::{json, Value};

pub struct CountingStep {
    pub id: &'static str,
    pub calls: Arc<AtomicUsize>,
    failures: Mutex<VecDeque<CoreEngineError>>,
    signal: Option<(String, Value)>,
}

impl CountingStep {
    pub fn new(id: &'static str) -> Self {
        Self { id,
               calls: Arc::new(AtomicUsize::new(0)),
               failures: Mutex::new(VecDeque::new()),
               signal: None }
    }

    /// Los primeros intentos fallan con estos errores, en orden.
    pub fn failing_with(mut self, errors: Vec<CoreEngineError>) -> Self {
        self.failures = Mutex::new(errors.into());
        self
    }

    pub fn with_signal(mut self, name: &str, data: Value) -> Self {
        self.signal = Some((name.to_string(), data));
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl StepDefinition for CountingStep {
    fn id(&self) -> &str {
        self.id
    }
    fn base_params(&self) -> Value {
        json!({"step": self.id})
    }
    fn run(&self, ctx: &ExecutionContext) -> StepRunResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return StepRunResult::Failure { error: err };
        }
        // Output determinista: depende sólo del seed y de los inputs.
        let upstream: Vec<&str> = ctx.inputs.keys().map(String::as_str).collect();
        let payload = json!({"step": self.id, "seed": ctx.seed, "upstream": upstream});
        let outputs = vec![Artifact::new_unhashed(ArtifactKind::GenericJson, payload, None)];
        match &self.signal {
            Some((signal, data)) => StepRunResult::SuccessWithSignals { outputs,
                                                                        signals: vec![StepSignal { signal: signal.clone(),
                                                                                                   data: data.clone() }] },
            None => StepRunResult::Success { outputs },
        }
    }
    fn kind(&self) -> StepKind {
        StepKind::Transform
    }
}

pub fn calls(c: &Arc<AtomicUsize>) -> usize {
    c.load(Ordering::SeqCst)
}
