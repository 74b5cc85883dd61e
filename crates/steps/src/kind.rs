//! The typed step-kind tag.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Selects the handler that runs a step.
///
/// Serialised as the plain snake_case tag (`"create_lead"`). Tags that are not
/// built in deserialise to [`StepKind::Custom`] so a definition referencing an
/// unregistered handler still loads and fails at execution time instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    CreateContact,
    CreateLead,
    CreateDeal,
    CreateProject,
    ScoreLead,
    EnrichContact,
    SendEmail,
    SendNotification,
    UpdateField,
    AddTag,
    AssignUser,
    Webhook,
    Wait,
    Condition,
    Custom(String),
}

impl StepKind {
    /// Every built-in kind, in documentation order.
    pub const BUILTIN: [StepKind; 14] = [
        StepKind::CreateContact,
        StepKind::CreateLead,
        StepKind::CreateDeal,
        StepKind::CreateProject,
        StepKind::ScoreLead,
        StepKind::EnrichContact,
        StepKind::SendEmail,
        StepKind::SendNotification,
        StepKind::UpdateField,
        StepKind::AddTag,
        StepKind::AssignUser,
        StepKind::Webhook,
        StepKind::Wait,
        StepKind::Condition,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateContact => "create_contact",
            Self::CreateLead => "create_lead",
            Self::CreateDeal => "create_deal",
            Self::CreateProject => "create_project",
            Self::ScoreLead => "score_lead",
            Self::EnrichContact => "enrich_contact",
            Self::SendEmail => "send_email",
            Self::SendNotification => "send_notification",
            Self::UpdateField => "update_field",
            Self::AddTag => "add_tag",
            Self::AssignUser => "assign_user",
            Self::Webhook => "webhook",
            Self::Wait => "wait",
            Self::Condition => "condition",
            Self::Custom(tag) => tag,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl From<&str> for StepKind {
    fn from(tag: &str) -> Self {
        match tag {
            "create_contact" => Self::CreateContact,
            "create_lead" => Self::CreateLead,
            "create_deal" => Self::CreateDeal,
            "create_project" => Self::CreateProject,
            "score_lead" => Self::ScoreLead,
            "enrich_contact" => Self::EnrichContact,
            "send_email" => Self::SendEmail,
            "send_notification" => Self::SendNotification,
            "update_field" => Self::UpdateField,
            "add_tag" => Self::AddTag,
            "assign_user" => Self::AssignUser,
            "webhook" => Self::Webhook,
            "wait" => Self::Wait,
            "condition" => Self::Condition,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl From<String> for StepKind {
    fn from(tag: String) -> Self {
        match StepKind::from(tag.as_str()) {
            Self::Custom(_) => Self::Custom(tag),
            builtin => builtin,
        }
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        match kind {
            StepKind::Custom(tag) => tag,
            builtin => builtin.as_str().to_owned(),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
