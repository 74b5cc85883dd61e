//! Interfaces of the external services built-in handlers delegate to.
//!
//! CRM persistence, lead scoring and message transport are owned elsewhere;
//! the engine only needs these narrow async contracts. Implementations are
//! injected into [`StepRegistry::with_builtins`](crate::StepRegistry::with_builtins).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// CRM entity types a workflow can create or touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Contact,
    Lead,
    Deal,
    Project,
    Booking,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Lead => "lead",
            Self::Deal => "deal",
            Self::Project => "project",
            Self::Booking => "booking",
        }
    }

    /// Output key carrying the id of a newly created entity (`leadId`, …).
    pub fn id_field(self) -> &'static str {
        match self {
            Self::Contact => "contactId",
            Self::Lead => "leadId",
            Self::Deal => "dealId",
            Self::Project => "projectId",
            Self::Booking => "bookingId",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "contact" => Some(Self::Contact),
            "lead" => Some(Self::Lead),
            "deal" => Some(Self::Deal),
            "project" => Some(Self::Project),
            "booking" => Some(Self::Booking),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a CRM write is performed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub workspace_id: String,
    pub user_id: String,
}

#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// Create an entity and return its id.
    async fn create(
        &self,
        actor: &Actor,
        entity: EntityKind,
        fields: Map<String, Value>,
    ) -> anyhow::Result<String>;

    async fn update_field(
        &self,
        actor: &Actor,
        entity: EntityKind,
        entity_id: &str,
        field: &str,
        value: Value,
    ) -> anyhow::Result<()>;

    async fn add_tag(
        &self,
        actor: &Actor,
        entity: EntityKind,
        entity_id: &str,
        tag: &str,
    ) -> anyhow::Result<()>;

    async fn assign_user(
        &self,
        actor: &Actor,
        entity: EntityKind,
        entity_id: &str,
        assignee: &str,
    ) -> anyhow::Result<()>;

    /// Look up third-party data for a contact and store it; returns what was added.
    async fn enrich_contact(&self, actor: &Actor, contact_id: &str) -> anyhow::Result<Value>;
}

/// Result of scoring a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    pub score: u32,
    pub grade: String,
}

#[async_trait]
pub trait LeadScorer: Send + Sync {
    /// Score a lead; `signals` is the step's resolved action.
    async fn score(&self, actor: &Actor, lead_id: &str, signals: &Value)
        -> anyhow::Result<LeadScore>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: Option<String>,
    pub template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub title: Option<String>,
    pub message: String,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub url: String,
    pub method: String,
    pub headers: Map<String, Value>,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: Value,
}

/// Outbound message transport. The engine signals the intent; delivery is the
/// implementation's concern.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns the provider's message id.
    async fn send_email(&self, actor: &Actor, email: EmailMessage) -> anyhow::Result<String>;

    /// Returns the notification id.
    async fn send_notification(
        &self,
        actor: &Actor,
        notification: Notification,
    ) -> anyhow::Result<String>;

    async fn call_webhook(&self, request: WebhookRequest) -> anyhow::Result<WebhookResponse>;
}
