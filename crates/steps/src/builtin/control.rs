//! Control-flow handlers that need no collaborator: `wait` and `condition`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::expression;
use crate::{ExecutionContext, RunResults, StepError, StepHandler, StepKind};

/// `wait`
///
/// Suspends only the current run. Durations longer than `max_wait` are
/// clamped.
pub struct WaitStep {
    max_wait: Duration,
}

impl WaitStep {
    pub fn new(max_wait: Duration) -> Self {
        Self { max_wait }
    }

    fn requested(input: &Value) -> Result<Duration, StepError> {
        let amount = match input.get("duration") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(-1.0),
            Some(Value::String(s)) if !s.contains("${") => s.trim().parse::<f64>().map_err(|_| {
                StepError::InvalidInput(format!("wait duration '{s}' is not a number"))
            })?,
            _ => return Err(StepError::missing("wait", "duration")),
        };
        if !amount.is_finite() || amount < 0.0 {
            return Err(StepError::InvalidInput(format!(
                "wait duration must be a non-negative number, got {amount}"
            )));
        }

        let unit = input.get("unit").and_then(Value::as_str).unwrap_or("ms");
        let millis_per_unit = match unit {
            "ms" | "millis" | "milliseconds" => 1.0,
            "s" | "seconds" => 1_000.0,
            "m" | "minutes" => 60_000.0,
            "h" | "hours" => 3_600_000.0,
            "d" | "days" => 86_400_000.0,
            other => {
                return Err(StepError::InvalidInput(format!("unknown wait unit '{other}'")));
            }
        };
        Ok(Duration::from_millis((amount * millis_per_unit).round() as u64))
    }
}

#[async_trait]
impl StepHandler for WaitStep {
    fn kind(&self) -> StepKind {
        StepKind::Wait
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
        _results: &mut RunResults,
    ) -> Result<Value, StepError> {
        let mut duration = Self::requested(&input)?;
        if duration > self.max_wait {
            warn!(
                run_id = %ctx.run_id,
                requested_ms = duration.as_millis() as u64,
                max_ms = self.max_wait.as_millis() as u64,
                "wait exceeds the configured maximum, clamping"
            );
            duration = self.max_wait;
        }

        debug!(run_id = %ctx.run_id, ms = duration.as_millis() as u64, "waiting");
        tokio::time::sleep(duration).await;

        Ok(json!({ "waited": true, "duration": duration.as_millis() as u64 }))
    }
}

/// `condition`
///
/// `action.condition` is either a boolean (typically a resolved
/// `${...}` reference) or an expression string. The output names the branch
/// target: `action.then` when true, `action.else` otherwise, `null` when that
/// branch is not given.
pub struct ConditionStep;

#[async_trait]
impl StepHandler for ConditionStep {
    fn kind(&self) -> StepKind {
        StepKind::Condition
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
        _results: &mut RunResults,
    ) -> Result<Value, StepError> {
        let condition = input
            .get("condition")
            .or_else(|| input.get("expression"))
            .ok_or_else(|| StepError::missing("condition", "condition"))?;

        let outcome = match condition {
            Value::Bool(b) => *b,
            Value::String(source) => expression::evaluate(source, &ctx.to_value())?,
            other => expression::is_truthy(other),
        };

        let branch = if outcome { "then" } else { "else" };
        let next_step_id = match input.get(branch) {
            Some(Value::String(id)) if !id.is_empty() => Value::String(id.clone()),
            _ => Value::Null,
        };

        Ok(json!({ "condition": outcome, "nextStepId": next_step_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ctx(trigger: Value) -> ExecutionContext {
        ExecutionContext::new(Uuid::new_v4(), Uuid::new_v4(), "ws-1", "user-1", trigger)
    }

    #[tokio::test(start_paused = true)]
    async fn wait_sleeps_for_the_requested_duration() {
        let handler = WaitStep::new(Duration::from_secs(3600));
        let start = tokio::time::Instant::now();

        let out = handler
            .execute(json!({ "duration": 2, "unit": "minutes" }), &ctx(json!({})), &mut RunResults::default())
            .await
            .unwrap();

        assert_eq!(out, json!({ "waited": true, "duration": 120_000 }));
        assert!(start.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_is_clamped_to_max() {
        let handler = WaitStep::new(Duration::from_secs(10));
        let out = handler
            .execute(json!({ "duration": 1, "unit": "days" }), &ctx(json!({})), &mut RunResults::default())
            .await
            .unwrap();
        assert_eq!(out["duration"], 10_000);
    }

    #[tokio::test]
    async fn wait_rejects_bad_input() {
        let handler = WaitStep::new(Duration::from_secs(10));
        for input in [
            json!({}),
            json!({ "duration": -5 }),
            json!({ "duration": 5, "unit": "fortnights" }),
            json!({ "duration": "soon" }),
        ] {
            assert!(handler
                .execute(input, &ctx(json!({})), &mut RunResults::default())
                .await
                .is_err());
        }
    }

    #[tokio::test]
    async fn condition_picks_then_branch() {
        let out = ConditionStep
            .execute(
                json!({ "condition": "trigger.score >= 70", "then": "vip_path", "else": "nurture" }),
                &ctx(json!({ "score": 85 })),
                &mut RunResults::default(),
            )
            .await
            .unwrap();
        assert_eq!(out, json!({ "condition": true, "nextStepId": "vip_path" }));
    }

    #[tokio::test]
    async fn condition_without_else_yields_null_target() {
        let out = ConditionStep
            .execute(
                json!({ "condition": false, "then": "vip_path" }),
                &ctx(json!({})),
                &mut RunResults::default(),
            )
            .await
            .unwrap();
        assert_eq!(out, json!({ "condition": false, "nextStepId": null }));
    }

    #[tokio::test]
    async fn condition_with_unresolved_reference_is_an_expression_error() {
        let err = ConditionStep
            .execute(
                json!({ "condition": "${steps.missing.value} > 3", "then": "x" }),
                &ctx(json!({})),
                &mut RunResults::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Expression(_)));
    }
}
