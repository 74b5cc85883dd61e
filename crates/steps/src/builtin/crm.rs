//! CRM and scoring handlers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{actor, fields, require_entity, require_str};
use crate::collaborators::{CrmGateway, EntityKind, LeadScorer};
use crate::{ExecutionContext, RunResults, StepError, StepHandler, StepKind};

/// `create_contact`, `create_lead`, `create_deal` and `create_project`.
///
/// The resolved action is passed through as the entity's fields. Deals must
/// reference the contact they belong to; projects are opened from a booking
/// or given an explicit name.
pub struct CreateEntity {
    entity: EntityKind,
    crm: Arc<dyn CrmGateway>,
}

impl CreateEntity {
    pub fn new(entity: EntityKind, crm: Arc<dyn CrmGateway>) -> Self {
        Self { entity, crm }
    }

    fn check_required(&self, input: &Value) -> Result<(), StepError> {
        let kind = self.kind();
        match self.entity {
            EntityKind::Contact | EntityKind::Lead => require_str(input, "email", &kind).map(drop),
            EntityKind::Deal => require_str(input, "contactId", &kind).map(drop),
            EntityKind::Project => require_str(input, "bookingId", &kind)
                .or_else(|_| require_str(input, "name", &kind))
                .map_err(|_| StepError::missing(kind.as_str(), "bookingId"))
                .map(drop),
            // Bookings come from the tour operator, never from a workflow.
            EntityKind::Booking => Err(StepError::InvalidInput("bookings cannot be created".into())),
        }
    }
}

#[async_trait]
impl StepHandler for CreateEntity {
    fn kind(&self) -> StepKind {
        match self.entity {
            EntityKind::Contact => StepKind::CreateContact,
            EntityKind::Lead => StepKind::CreateLead,
            EntityKind::Deal => StepKind::CreateDeal,
            EntityKind::Project => StepKind::CreateProject,
            EntityKind::Booking => StepKind::Custom("create_booking".into()),
        }
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
        results: &mut RunResults,
    ) -> Result<Value, StepError> {
        self.check_required(&input)?;
        let fields = fields(&input, &self.kind())?;

        let id = self
            .crm
            .create(&actor(ctx), self.entity, fields)
            .await
            .map_err(StepError::handler)?;
        results.entities_created += 1;
        debug!(entity = %self.entity, %id, "entity created");

        let mut output = Map::new();
        output.insert(self.entity.id_field().to_owned(), Value::String(id));
        Ok(Value::Object(output))
    }
}

/// `enrich_contact`
pub struct EnrichContact {
    crm: Arc<dyn CrmGateway>,
}

impl EnrichContact {
    pub fn new(crm: Arc<dyn CrmGateway>) -> Self {
        Self { crm }
    }
}

#[async_trait]
impl StepHandler for EnrichContact {
    fn kind(&self) -> StepKind {
        StepKind::EnrichContact
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
        results: &mut RunResults,
    ) -> Result<Value, StepError> {
        let contact_id = require_str(&input, "contactId", &self.kind())?;
        let enrichment = self
            .crm
            .enrich_contact(&actor(ctx), &contact_id)
            .await
            .map_err(StepError::handler)?;
        results.entities_updated += 1;
        Ok(json!({ "contactId": contact_id, "enrichment": enrichment }))
    }
}

/// `update_field`
pub struct UpdateField {
    crm: Arc<dyn CrmGateway>,
}

impl UpdateField {
    pub fn new(crm: Arc<dyn CrmGateway>) -> Self {
        Self { crm }
    }
}

#[async_trait]
impl StepHandler for UpdateField {
    fn kind(&self) -> StepKind {
        StepKind::UpdateField
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
        results: &mut RunResults,
    ) -> Result<Value, StepError> {
        let kind = self.kind();
        let entity = require_entity(&input, &kind)?;
        let entity_id = require_str(&input, "entityId", &kind)?;
        let field = require_str(&input, "field", &kind)?;
        let value = input.get("value").cloned().unwrap_or(Value::Null);

        self.crm
            .update_field(&actor(ctx), entity, &entity_id, &field, value.clone())
            .await
            .map_err(StepError::handler)?;
        results.entities_updated += 1;

        Ok(json!({
            "updated": true,
            "entity": entity,
            "entityId": entity_id,
            "field": field,
            "value": value,
        }))
    }
}

/// `add_tag`
pub struct AddTag {
    crm: Arc<dyn CrmGateway>,
}

impl AddTag {
    pub fn new(crm: Arc<dyn CrmGateway>) -> Self {
        Self { crm }
    }
}

#[async_trait]
impl StepHandler for AddTag {
    fn kind(&self) -> StepKind {
        StepKind::AddTag
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
        results: &mut RunResults,
    ) -> Result<Value, StepError> {
        let kind = self.kind();
        let entity = require_entity(&input, &kind)?;
        let entity_id = require_str(&input, "entityId", &kind)?;
        let tag = require_str(&input, "tag", &kind)?;

        self.crm
            .add_tag(&actor(ctx), entity, &entity_id, &tag)
            .await
            .map_err(StepError::handler)?;
        results.entities_updated += 1;

        Ok(json!({ "tagged": true, "entity": entity, "entityId": entity_id, "tag": tag }))
    }
}

/// `assign_user`
pub struct AssignUser {
    crm: Arc<dyn CrmGateway>,
}

impl AssignUser {
    pub fn new(crm: Arc<dyn CrmGateway>) -> Self {
        Self { crm }
    }
}

#[async_trait]
impl StepHandler for AssignUser {
    fn kind(&self) -> StepKind {
        StepKind::AssignUser
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
        results: &mut RunResults,
    ) -> Result<Value, StepError> {
        let kind = self.kind();
        let entity = require_entity(&input, &kind)?;
        let entity_id = require_str(&input, "entityId", &kind)?;
        let assignee = require_str(&input, "userId", &kind)?;

        self.crm
            .assign_user(&actor(ctx), entity, &entity_id, &assignee)
            .await
            .map_err(StepError::handler)?;
        results.entities_updated += 1;

        Ok(json!({
            "assigned": true,
            "entity": entity,
            "entityId": entity_id,
            "userId": assignee,
        }))
    }
}

/// `score_lead`
pub struct ScoreLead {
    scorer: Arc<dyn LeadScorer>,
}

impl ScoreLead {
    pub fn new(scorer: Arc<dyn LeadScorer>) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl StepHandler for ScoreLead {
    fn kind(&self) -> StepKind {
        StepKind::ScoreLead
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
        _results: &mut RunResults,
    ) -> Result<Value, StepError> {
        let lead_id = require_str(&input, "leadId", &self.kind())?;
        let scored = self
            .scorer
            .score(&actor(ctx), &lead_id, &input)
            .await
            .map_err(StepError::handler)?;
        Ok(json!({ "leadId": lead_id, "score": scored.score, "grade": scored.grade }))
    }
}
