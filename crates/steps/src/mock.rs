//! `MockHandler`: a test double for `StepHandler`.
//!
//! Useful in unit and integration tests where a real handler is either
//! unavailable or irrelevant.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::{ExecutionContext, RunResults, StepError, StepHandler, StepKind};

/// A mock handler that records every input it receives and replies from a
/// script, falling back to a fixed outcome once the script runs dry.
pub struct MockHandler {
    kind: StepKind,
    script: Mutex<VecDeque<Result<Value, StepError>>>,
    fallback: Result<Value, StepError>,
    /// All inputs seen by this handler (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockHandler {
    /// A mock that always succeeds with `value`.
    pub fn returning(kind: StepKind, value: Value) -> Self {
        Self::scripted(kind, Vec::new(), Ok(value))
    }

    /// A mock that always fails with a handler error.
    pub fn failing(kind: StepKind, msg: impl Into<String>) -> Self {
        Self::scripted(kind, Vec::new(), Err(StepError::Handler(msg.into())))
    }

    /// A mock that fails `failures` times, then succeeds with `value`.
    pub fn flaky(kind: StepKind, failures: usize, value: Value) -> Self {
        let script = (0..failures)
            .map(|i| Err(StepError::Handler(format!("transient failure #{}", i + 1))))
            .collect();
        Self::scripted(kind, script, Ok(value))
    }

    pub fn scripted(
        kind: StepKind,
        script: Vec<Result<Value, StepError>>,
        fallback: Result<Value, StepError>,
    ) -> Self {
        Self {
            kind,
            script: Mutex::new(script.into()),
            fallback,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this handler has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StepHandler for MockHandler {
    fn kind(&self) -> StepKind {
        self.kind.clone()
    }

    async fn execute(
        &self,
        input: Value,
        _ctx: &ExecutionContext,
        _results: &mut RunResults,
    ) -> Result<Value, StepError> {
        self.calls.lock().unwrap().push(input);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}
