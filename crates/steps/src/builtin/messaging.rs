//! Outbound messaging handlers: e-mail, in-app notifications and webhooks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{actor, optional_str, require_str};
use crate::collaborators::{EmailMessage, Notification, Notifier, WebhookRequest};
use crate::{ExecutionContext, RunResults, StepError, StepHandler, StepKind};

/// `send_email`
pub struct SendEmail {
    notifier: Arc<dyn Notifier>,
}

impl SendEmail {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl StepHandler for SendEmail {
    fn kind(&self) -> StepKind {
        StepKind::SendEmail
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
        results: &mut RunResults,
    ) -> Result<Value, StepError> {
        let kind = self.kind();
        let email = EmailMessage {
            to: require_str(&input, "to", &kind)?,
            subject: require_str(&input, "subject", &kind)?,
            body: optional_str(&input, "body"),
            template: optional_str(&input, "template"),
        };
        let to = email.to.clone();

        let message_id = self
            .notifier
            .send_email(&actor(ctx), email)
            .await
            .map_err(StepError::handler)?;
        results.emails_sent += 1;

        Ok(json!({ "sent": true, "to": to, "messageId": message_id }))
    }
}

/// `send_notification`
///
/// Notifies the run's user unless the action names another `userId`.
pub struct SendNotification {
    notifier: Arc<dyn Notifier>,
}

impl SendNotification {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl StepHandler for SendNotification {
    fn kind(&self) -> StepKind {
        StepKind::SendNotification
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
        results: &mut RunResults,
    ) -> Result<Value, StepError> {
        let notification = Notification {
            user_id: optional_str(&input, "userId").unwrap_or_else(|| ctx.user_id.clone()),
            title: optional_str(&input, "title"),
            message: require_str(&input, "message", &self.kind())?,
            channel: optional_str(&input, "channel"),
        };
        let recipient = notification.user_id.clone();

        let notification_id = self
            .notifier
            .send_notification(&actor(ctx), notification)
            .await
            .map_err(StepError::handler)?;
        results.notifications_sent += 1;

        Ok(json!({ "sent": true, "userId": recipient, "notificationId": notification_id }))
    }
}

/// `webhook`
///
/// Any non-2xx response is a step failure, so `onError: retry` applies to
/// flaky receivers.
pub struct WebhookStep {
    notifier: Arc<dyn Notifier>,
}

impl WebhookStep {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl StepHandler for WebhookStep {
    fn kind(&self) -> StepKind {
        StepKind::Webhook
    }

    async fn execute(
        &self,
        input: Value,
        _ctx: &ExecutionContext,
        results: &mut RunResults,
    ) -> Result<Value, StepError> {
        let url = require_str(&input, "url", &self.kind())?;
        let method = optional_str(&input, "method")
            .map(|m| m.to_ascii_uppercase())
            .unwrap_or_else(|| "POST".to_owned());
        let headers = match input.get("headers") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                return Err(StepError::InvalidInput(format!(
                    "webhook headers must be an object, got {other}"
                )))
            }
        };
        let body = input
            .get("body")
            .or_else(|| input.get("payload"))
            .cloned()
            .unwrap_or(Value::Null);

        let response = self
            .notifier
            .call_webhook(WebhookRequest { url: url.clone(), method, headers, body })
            .await
            .map_err(StepError::handler)?;
        results.webhooks_called += 1;

        if !(200..300).contains(&response.status) {
            return Err(StepError::Handler(format!(
                "webhook {url} responded with status {}",
                response.status
            )));
        }
        Ok(json!({ "status": response.status, "body": response.body }))
    }
}
