//! Built-in step handlers.
//!
//! CRM, scoring and messaging handlers are thin adapters over the injected
//! collaborators: they validate the resolved action, make one external call,
//! bump the matching run counter and shape the output. `wait` and `condition`
//! are handled locally.

mod control;
mod crm;
mod messaging;

pub use control::{ConditionStep, WaitStep};
pub use crm::{AddTag, AssignUser, CreateEntity, EnrichContact, ScoreLead, UpdateField};
pub use messaging::{SendEmail, SendNotification, WebhookStep};

use serde_json::{Map, Value};

use crate::collaborators::{Actor, EntityKind};
use crate::resolver::has_unresolved;
use crate::{ExecutionContext, StepError, StepKind};

fn actor(ctx: &ExecutionContext) -> Actor {
    Actor {
        workspace_id: ctx.workspace_id.clone(),
        user_id: ctx.user_id.clone(),
    }
}

/// A required scalar input. Absent, null, blank and unresolved values all
/// count as a missing dependency.
fn require_str(input: &Value, field: &str, kind: &StepKind) -> Result<String, StepError> {
    optional_str(input, field).ok_or_else(|| StepError::missing(kind.as_str(), field))
}

fn optional_str(input: &Value, field: &str) -> Option<String> {
    let value = input.get(field)?;
    if has_unresolved(value) {
        return None;
    }
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn require_entity(input: &Value, kind: &StepKind) -> Result<EntityKind, StepError> {
    let tag = require_str(input, "entity", kind)?;
    EntityKind::parse(&tag)
        .ok_or_else(|| StepError::InvalidInput(format!("{kind}: unknown entity type '{tag}'")))
}

/// The action as an object; `null` is treated as an empty action.
fn fields(input: &Value, kind: &StepKind) -> Result<Map<String, Value>, StepError> {
    match input {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(StepError::InvalidInput(format!(
            "{kind}: action must be an object, got {other}"
        ))),
    }
}
