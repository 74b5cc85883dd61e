//! Definition validation: run this before persisting or executing a workflow.
//!
//! Rules enforced:
//! 1. An enabled workflow has at least one step.
//! 2. Step IDs are non-blank.
//! 3. Step IDs are unique within the workflow.

use std::collections::HashSet;

use crate::{EngineError, models::WorkflowDefinition};

/// Validate the workflow's step list.
///
/// # Errors
/// - [`EngineError::EmptyWorkflow`] if an enabled workflow has no steps.
/// - [`EngineError::BlankStepId`] if a step ID is empty or whitespace.
/// - [`EngineError::DuplicateStepId`] if two steps share an ID.
pub fn validate_definition(workflow: &WorkflowDefinition) -> Result<(), EngineError> {
    if workflow.enabled && workflow.steps.is_empty() {
        return Err(EngineError::EmptyWorkflow(workflow.id));
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for (position, step) in workflow.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(EngineError::BlankStepId(position));
        }
        if !seen_ids.insert(step.id.as_str()) {
            return Err(EngineError::DuplicateStepId(step.id.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepDefinition;
    use serde_json::Value;
    use steps::StepKind;

    fn make_step(id: &str) -> StepDefinition {
        StepDefinition::new(id, StepKind::Custom("mock".into()), Value::Null)
    }

    fn make_workflow(steps: Vec<StepDefinition>) -> WorkflowDefinition {
        WorkflowDefinition::new("test", "ws-1", "manual", steps)
    }

    #[test]
    fn linear_workflow_is_valid() {
        let workflow = make_workflow(vec![make_step("a"), make_step("b"), make_step("c")]);
        assert!(validate_definition(&workflow).is_ok());
    }

    #[test]
    fn duplicate_step_id_is_rejected() {
        let workflow = make_workflow(vec![make_step("a"), make_step("b"), make_step("a")]);
        assert!(matches!(
            validate_definition(&workflow),
            Err(EngineError::DuplicateStepId(id)) if id == "a"
        ));
    }

    #[test]
    fn blank_step_id_is_rejected() {
        let workflow = make_workflow(vec![make_step("a"), make_step("  ")]);
        assert!(matches!(
            validate_definition(&workflow),
            Err(EngineError::BlankStepId(1))
        ));
    }

    #[test]
    fn enabled_workflow_without_steps_is_rejected() {
        let workflow = make_workflow(vec![]);
        assert!(matches!(
            validate_definition(&workflow),
            Err(EngineError::EmptyWorkflow(id)) if id == workflow.id
        ));
    }

    #[test]
    fn disabled_draft_may_be_empty() {
        let mut workflow = make_workflow(vec![]);
        workflow.enabled = false;
        assert!(validate_definition(&workflow).is_ok());
    }
}
