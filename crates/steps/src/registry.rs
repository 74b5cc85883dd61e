//! Step handler registry and dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builtin::{
    AddTag, AssignUser, ConditionStep, CreateEntity, EnrichContact, ScoreLead, SendEmail,
    SendNotification, UpdateField, WaitStep, WebhookStep,
};
use crate::collaborators::{CrmGateway, EntityKind, LeadScorer, Notifier};
use crate::{StepHandler, StepKind};

/// Maps step kinds to handler implementations.
///
/// Built once at startup and handed to the engine; handlers are stateless
/// apart from their injected collaborators, so one registry serves every
/// concurrent run.
#[derive(Clone, Default)]
pub struct StepRegistry {
    handlers: HashMap<StepKind, Arc<dyn StepHandler>>,
}

impl StepRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with every built-in step kind.
    pub fn with_builtins(
        crm: Arc<dyn CrmGateway>,
        scorer: Arc<dyn LeadScorer>,
        notifier: Arc<dyn Notifier>,
        max_wait: std::time::Duration,
    ) -> Self {
        let mut registry = Self::new();
        for entity in [
            EntityKind::Contact,
            EntityKind::Lead,
            EntityKind::Deal,
            EntityKind::Project,
        ] {
            registry.register(CreateEntity::new(entity, crm.clone()));
        }
        registry.register(EnrichContact::new(crm.clone()));
        registry.register(UpdateField::new(crm.clone()));
        registry.register(AddTag::new(crm.clone()));
        registry.register(AssignUser::new(crm));
        registry.register(ScoreLead::new(scorer));
        registry.register(SendEmail::new(notifier.clone()));
        registry.register(SendNotification::new(notifier.clone()));
        registry.register(WebhookStep::new(notifier));
        registry.register(WaitStep::new(max_wait));
        registry.register(ConditionStep);
        registry
    }

    /// Register a handler under its own kind, replacing any previous one.
    pub fn register<H: StepHandler + 'static>(&mut self, handler: H) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: &StepKind) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn has(&self, kind: &StepKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, sorted by tag.
    pub fn kinds(&self) -> Vec<&StepKind> {
        let mut kinds: Vec<&StepKind> = self.handlers.keys().collect();
        kinds.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        kinds
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
