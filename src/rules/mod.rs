//! Sanitization and Validation Rules Module
//!
//! Rules are registered by name and invoked by name: a schema field carries
//! an ordered chain of rule bindings, and the registries here dispatch each
//! link. Sanitizers transform a value; validators only pass or fail.
//!
//! Rules that resolve entity references need a way back into the manager;
//! they receive it through the [`RuleContext`] built for each invocation,
//! never through shared global state.

mod sanitizers;
mod validators;

use crate::core::{EntityError, Result};
use crate::entity::FieldValue;
use crate::manager::Manager;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub use sanitizers::{EntitiesSanitizer, EntitySanitizer, TrimSanitizer};
pub use validators::{EntitiesValidator, EntityValidator, MachineNameValidator};

/// Per-invocation context handed to every rule.
#[derive(Clone, Default)]
pub struct RuleContext {
    manager: Option<Manager>,
}

impl RuleContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manager(manager: Manager) -> Self {
        Self {
            manager: Some(manager),
        }
    }

    /// The manager behind this invocation; entity-aware rules cannot run
    /// without one.
    pub fn manager(&self) -> Result<&Manager> {
        self.manager
            .as_ref()
            .ok_or_else(|| EntityError::Unsupported("rule requires a manager context".to_string()))
    }
}

/// A named transform applied to a field value before storage.
#[async_trait]
pub trait SanitizeRule: Send + Sync {
    async fn apply(
        &self,
        ctx: &RuleContext,
        value: FieldValue,
        options: &Value,
    ) -> Result<FieldValue>;
}

/// A named check applied to a field value; failing aborts the operation.
#[async_trait]
pub trait ValidateRule: Send + Sync {
    async fn check(&self, ctx: &RuleContext, value: &FieldValue, options: &Value) -> Result<()>;
}

/// The sanitizer registry.
#[derive(Default)]
pub struct Sanitizers {
    rules: RwLock<HashMap<String, Arc<dyn SanitizeRule>>>,
}

impl Sanitizers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, rule: Arc<dyn SanitizeRule>) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        rules.insert(name.into(), rule);
    }

    pub fn registered(&self, name: &str) -> bool {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        rules.contains_key(name)
    }

    /// Applies the named rule to `value`, returning the sanitized value.
    pub async fn sanitize(
        &self,
        ctx: &RuleContext,
        name: &str,
        value: FieldValue,
        options: &Value,
    ) -> Result<FieldValue> {
        let rule = {
            let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
            rules.get(name).cloned()
        };
        let rule = rule.ok_or_else(|| EntityError::UnknownSanitizer(name.to_string()))?;
        rule.apply(ctx, value, options).await
    }
}

/// The validator registry.
#[derive(Default)]
pub struct Validators {
    rules: RwLock<HashMap<String, Arc<dyn ValidateRule>>>,
}

impl Validators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, rule: Arc<dyn ValidateRule>) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        rules.insert(name.into(), rule);
    }

    pub fn registered(&self, name: &str) -> bool {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        rules.contains_key(name)
    }

    /// Runs the named rule against `value`.
    pub async fn validate(
        &self,
        ctx: &RuleContext,
        name: &str,
        value: &FieldValue,
        options: &Value,
    ) -> Result<()> {
        let rule = {
            let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
            rules.get(name).cloned()
        };
        let rule = rule.ok_or_else(|| EntityError::UnknownValidator(name.to_string()))?;
        rule.check(ctx, value, options).await
    }
}
