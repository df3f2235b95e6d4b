//! Schema Module
//!
//! A [`Schema`] names an entity kind and defines its fields: each field has
//! a type from the closed [`FieldType`] set, descriptive metadata, free-form
//! options, and two ordered rule chains (sanitizers, validators) kept sorted
//! by ascending weight. Schemas persist as documents in the shared
//! `schemas` collection and derive the collection name their entities live
//! in from their own machine name.

use crate::core::{EntityError, Result};
use crate::entity::FieldValue;
use crate::manager::{Manager, SCHEMAS_COLLECTION};
use crate::persist::{Lifecycle, Persistable};
use crate::rules::RuleContext;
use crate::store::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Free-form per-field options, e.g. `default` or `required`.
pub type FieldOptions = serde_json::Map<String, Value>;

/// The closed set of field types a schema may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Mixed,
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
    Entity,
    Entities,
}

impl FieldType {
    /// Parses a declared type name for `field`.
    pub fn parse(field: &str, type_name: &str) -> Result<Self> {
        match type_name {
            "Mixed" => Ok(Self::Mixed),
            "String" => Ok(Self::String),
            "Number" => Ok(Self::Number),
            "Boolean" => Ok(Self::Boolean),
            "Date" => Ok(Self::Date),
            "Array" => Ok(Self::Array),
            "Object" => Ok(Self::Object),
            "Entity" => Ok(Self::Entity),
            "Entities" => Ok(Self::Entities),
            _ => Err(EntityError::UnknownFieldType {
                field: field.to_string(),
                type_name: type_name.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mixed => "Mixed",
            Self::String => "String",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::Array => "Array",
            Self::Object => "Object",
            Self::Entity => "Entity",
            Self::Entities => "Entities",
        }
    }

    /// Whether values of this type hold references to other entities.
    pub fn is_reference(self) -> bool {
        matches!(self, Self::Entity | Self::Entities)
    }
}

/// One link in a field's sanitizer or validator chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleBinding {
    pub rule: String,
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub weight: i64,
}

/// A field definition within a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub options: FieldOptions,
    #[serde(default)]
    pub sanitizers: Vec<RuleBinding>,
    #[serde(default)]
    pub validators: Vec<RuleBinding>,
}

/// The outcome of a sanitizer chain: what went in and what came out.
#[derive(Debug, Clone)]
pub struct Sanitized {
    pub original: FieldValue,
    pub value: FieldValue,
}

/// A named entity kind: field definitions plus their rule chains.
#[derive(Debug, Clone)]
pub struct Schema {
    manager: Manager,
    lifecycle: Lifecycle,
    title: String,
    description: String,
    fields: BTreeMap<String, FieldDef>,
}

impl Schema {
    pub fn new(manager: Manager) -> Self {
        Self {
            manager,
            lifecycle: Lifecycle::new(),
            title: String::new(),
            description: String::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.lifecycle.mark_updated();
        self.title = title.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.lifecycle.mark_updated();
        self.description = description.into();
    }

    pub fn set_machine_name(&mut self, machine_name: impl Into<String>) {
        self.lifecycle.set_machine_name(machine_name);
    }

    /// The collection entities of this kind persist into.
    pub fn entity_collection_name(&self) -> String {
        format!("entity-{}", self.lifecycle.machine_name())
    }

    /// The defined field names.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Looks up a field definition.
    pub fn field(&self, name: &str) -> Result<&FieldDef> {
        self.fields
            .get(name)
            .ok_or_else(|| EntityError::UnknownSchemaField(name.to_string()))
    }

    /// Defines a new field. The name must not already be defined.
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        field_type: FieldType,
        options: Option<FieldOptions>,
    ) -> Result<&mut Self> {
        let name = name.into();
        if self.fields.contains_key(&name) {
            return Err(EntityError::SchemaFieldDefined(name));
        }

        self.lifecycle.mark_updated();
        self.fields.insert(
            name,
            FieldDef {
                field_type,
                title: title.into(),
                description: description.into(),
                options: options.unwrap_or_default(),
                sanitizers: Vec::new(),
                validators: Vec::new(),
            },
        );
        Ok(self)
    }

    /// Removes a field definition.
    pub fn del_field(&mut self, name: &str) -> Result<&mut Self> {
        if self.fields.remove(name).is_none() {
            return Err(EntityError::UnknownSchemaField(name.to_string()));
        }
        self.lifecycle.mark_updated();
        Ok(self)
    }

    /// Appends a sanitization rule to a field's chain. The chain stays
    /// sorted by ascending weight, insertion order preserved for ties.
    pub fn add_field_sanitization(
        &mut self,
        name: &str,
        rule: impl Into<String>,
        options: Option<Value>,
        weight: i64,
    ) -> Result<&mut Self> {
        let rule = rule.into();
        let field = self
            .fields
            .get_mut(name)
            .ok_or_else(|| EntityError::UnknownSchemaField(name.to_string()))?;
        if !self.manager.sanitizers().registered(&rule) {
            return Err(EntityError::UnknownSanitizer(rule));
        }

        field.sanitizers.push(RuleBinding {
            rule,
            options: options.unwrap_or(Value::Null),
            weight,
        });
        field.sanitizers.sort_by_key(|binding| binding.weight);
        self.lifecycle.mark_updated();
        Ok(self)
    }

    /// Appends a validation rule to a field's chain. Same ordering contract
    /// as [`Schema::add_field_sanitization`].
    pub fn add_field_validation(
        &mut self,
        name: &str,
        rule: impl Into<String>,
        options: Option<Value>,
        weight: i64,
    ) -> Result<&mut Self> {
        let rule = rule.into();
        let field = self
            .fields
            .get_mut(name)
            .ok_or_else(|| EntityError::UnknownSchemaField(name.to_string()))?;
        if !self.manager.validators().registered(&rule) {
            return Err(EntityError::UnknownValidator(rule));
        }

        field.validators.push(RuleBinding {
            rule,
            options: options.unwrap_or(Value::Null),
            weight,
        });
        field.validators.sort_by_key(|binding| binding.weight);
        self.lifecycle.mark_updated();
        Ok(self)
    }

    /// Runs a field's sanitizer chain over `value`, each rule receiving the
    /// previous rule's output. The first failure aborts the chain.
    pub async fn sanitize_field(&self, name: &str, value: FieldValue) -> Result<Sanitized> {
        let field = self.field(name)?;
        let ctx = RuleContext::with_manager(self.manager.clone());
        let original = value.clone();
        let mut value = value;
        for binding in &field.sanitizers {
            value = self
                .manager
                .sanitizers()
                .sanitize(&ctx, &binding.rule, value, &binding.options)
                .await?;
        }
        Ok(Sanitized { original, value })
    }

    /// Runs a field's validator chain over `value`. The first failure
    /// aborts the chain and is returned unchanged.
    pub async fn validate_field(&self, name: &str, value: &FieldValue) -> Result<()> {
        let field = self.field(name)?;
        let ctx = RuleContext::with_manager(self.manager.clone());
        for binding in &field.validators {
            self.manager
                .validators()
                .validate(&ctx, &binding.rule, value, &binding.options)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Persistable for Schema {
    fn manager(&self) -> &Manager {
        &self.manager
    }

    fn collection_name(&self) -> String {
        SCHEMAS_COLLECTION.to_string()
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    async fn extend_doc(&self, doc: &mut Document) -> Result<()> {
        doc.insert("title".to_string(), Value::String(self.title.clone()));
        doc.insert(
            "description".to_string(),
            Value::String(self.description.clone()),
        );
        doc.insert("fields".to_string(), serde_json::to_value(&self.fields)?);
        Ok(())
    }

    async fn absorb_doc(&mut self, doc: &Document) -> Result<()> {
        self.title = doc
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.description = doc
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.fields = match doc.get("fields") {
            Some(fields) => serde_json::from_value(fields.clone())?,
            None => BTreeMap::new(),
        };
        Ok(())
    }
}
