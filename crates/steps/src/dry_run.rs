//! `DryRunBackend`: a collaborator that performs no external side effects.
//!
//! It implements every collaborator trait by logging the intent, recording it
//! in memory and returning generated ids. The CLI wires it in for `run` and for
//! `serve` when no real backends are configured; tests use it as a fake.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::collaborators::{
    Actor, CrmGateway, EmailMessage, EntityKind, LeadScore, LeadScorer, Notification, Notifier,
    WebhookRequest, WebhookResponse,
};

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Create { entity: EntityKind, id: String, fields: Map<String, Value> },
    UpdateField { entity: EntityKind, entity_id: String, field: String, value: Value },
    AddTag { entity: EntityKind, entity_id: String, tag: String },
    AssignUser { entity: EntityKind, entity_id: String, assignee: String },
    Enrich { contact_id: String },
    Score { lead_id: String, score: u32 },
    Email(EmailMessage),
    Notification(Notification),
    Webhook(WebhookRequest),
}

#[derive(Default)]
pub struct DryRunBackend {
    intents: Mutex<Vec<Intent>>,
    fixed_ids: HashMap<EntityKind, String>,
    failures: HashMap<&'static str, String>,
    webhook_status: Option<u16>,
}

impl DryRunBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always return `id` for newly created entities of this kind.
    pub fn with_id(mut self, entity: EntityKind, id: impl Into<String>) -> Self {
        self.fixed_ids.insert(entity, id.into());
        self
    }

    /// Make one operation (`"create"`, `"update_field"`, `"add_tag"`,
    /// `"assign_user"`, `"enrich_contact"`, `"score"`, `"send_email"`,
    /// `"send_notification"`, `"call_webhook"`) fail with `message`.
    pub fn failing_on(mut self, operation: &'static str, message: impl Into<String>) -> Self {
        self.failures.insert(operation, message.into());
        self
    }

    /// Status code returned by `call_webhook` (default 200).
    pub fn with_webhook_status(mut self, status: u16) -> Self {
        self.webhook_status = Some(status);
        self
    }

    /// Every call recorded so far, in order.
    pub fn intents(&self) -> Vec<Intent> {
        self.intents.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn check(&self, operation: &'static str) -> anyhow::Result<()> {
        match self.failures.get(operation) {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }

    fn record(&self, intent: Intent) {
        self.intents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(intent);
    }
}

#[async_trait]
impl CrmGateway for DryRunBackend {
    async fn create(
        &self,
        actor: &Actor,
        entity: EntityKind,
        fields: Map<String, Value>,
    ) -> anyhow::Result<String> {
        self.check("create")?;
        let id = self
            .fixed_ids
            .get(&entity)
            .cloned()
            .unwrap_or_else(|| format!("{}_{}", entity.as_str(), Uuid::new_v4().simple()));
        info!(workspace = %actor.workspace_id, %entity, %id, "[dry-run] create");
        self.record(Intent::Create { entity, id: id.clone(), fields });
        Ok(id)
    }

    async fn update_field(
        &self,
        _actor: &Actor,
        entity: EntityKind,
        entity_id: &str,
        field: &str,
        value: Value,
    ) -> anyhow::Result<()> {
        self.check("update_field")?;
        info!(%entity, entity_id, field, "[dry-run] update field");
        self.record(Intent::UpdateField {
            entity,
            entity_id: entity_id.to_owned(),
            field: field.to_owned(),
            value,
        });
        Ok(())
    }

    async fn add_tag(
        &self,
        _actor: &Actor,
        entity: EntityKind,
        entity_id: &str,
        tag: &str,
    ) -> anyhow::Result<()> {
        self.check("add_tag")?;
        info!(%entity, entity_id, tag, "[dry-run] add tag");
        self.record(Intent::AddTag {
            entity,
            entity_id: entity_id.to_owned(),
            tag: tag.to_owned(),
        });
        Ok(())
    }

    async fn assign_user(
        &self,
        _actor: &Actor,
        entity: EntityKind,
        entity_id: &str,
        assignee: &str,
    ) -> anyhow::Result<()> {
        self.check("assign_user")?;
        info!(%entity, entity_id, assignee, "[dry-run] assign user");
        self.record(Intent::AssignUser {
            entity,
            entity_id: entity_id.to_owned(),
            assignee: assignee.to_owned(),
        });
        Ok(())
    }

    async fn enrich_contact(&self, _actor: &Actor, contact_id: &str) -> anyhow::Result<Value> {
        self.check("enrich_contact")?;
        info!(contact_id, "[dry-run] enrich contact");
        self.record(Intent::Enrich { contact_id: contact_id.to_owned() });
        Ok(json!({ "source": "dry-run" }))
    }
}

#[async_trait]
impl LeadScorer for DryRunBackend {
    async fn score(
        &self,
        _actor: &Actor,
        lead_id: &str,
        signals: &Value,
    ) -> anyhow::Result<LeadScore> {
        self.check("score")?;
        // Deterministic stand-in: 40 points, plus 10 per non-null signal.
        let present = signals
            .as_object()
            .map(|m| m.iter().filter(|(k, v)| *k != "leadId" && !v.is_null()).count())
            .unwrap_or(0) as u32;
        let score = (40 + present * 10).min(100);
        let grade = match score {
            80.. => "A",
            60..=79 => "B",
            _ => "C",
        };
        info!(lead_id, score, "[dry-run] score lead");
        self.record(Intent::Score { lead_id: lead_id.to_owned(), score });
        Ok(LeadScore { score, grade: grade.to_owned() })
    }
}

#[async_trait]
impl Notifier for DryRunBackend {
    async fn send_email(&self, _actor: &Actor, email: EmailMessage) -> anyhow::Result<String> {
        self.check("send_email")?;
        info!(to = %email.to, subject = %email.subject, "[dry-run] send email");
        self.record(Intent::Email(email));
        Ok(format!("msg_{}", Uuid::new_v4().simple()))
    }

    async fn send_notification(
        &self,
        _actor: &Actor,
        notification: Notification,
    ) -> anyhow::Result<String> {
        self.check("send_notification")?;
        info!(user_id = %notification.user_id, "[dry-run] send notification");
        self.record(Intent::Notification(notification));
        Ok(format!("ntf_{}", Uuid::new_v4().simple()))
    }

    async fn call_webhook(&self, request: WebhookRequest) -> anyhow::Result<WebhookResponse> {
        self.check("call_webhook")?;
        info!(url = %request.url, method = %request.method, "[dry-run] call webhook");
        self.record(Intent::Webhook(request));
        Ok(WebhookResponse {
            status: self.webhook_status.unwrap_or(200),
            body: Value::Null,
        })
    }
}
