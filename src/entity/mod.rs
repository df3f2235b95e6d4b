//! Entity Module
//!
//! An [`Entity`] is a schema-bound record: its field values are keyed by the
//! bound schema's field definitions, sanitized on assignment, and persisted
//! into the schema's own entity collection. Fields declared as `Entity` or
//! `Entities` hold live references to other entities; they are flattened to
//! light `{type, subtype, machineName}` references on save and resolved back
//! into full instances on load.

mod value;

use crate::core::{EntityError, Result};
use crate::manager::Manager;
use crate::persist::{Lifecycle, Persistable};
use crate::schema::{FieldType, Schema};
use crate::store::Document;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use value::{EntityGroup, EntityRef, FieldValue};

/// A schema-bound record with typed field data.
#[derive(Debug, Clone)]
pub struct Entity {
    manager: Manager,
    schema: Arc<Schema>,
    lifecycle: Lifecycle,
    subtype: Option<String>,
    field_data: BTreeMap<String, FieldValue>,
}

impl Entity {
    /// Constructs a fresh, unsaved entity bound to `schema` and announces
    /// it through the manager's event sink.
    pub(crate) fn new(manager: Manager, schema: Arc<Schema>, subtype: Option<String>) -> Self {
        let entity = Self {
            manager: manager.clone(),
            schema,
            lifecycle: Lifecycle::new(),
            subtype,
            field_data: BTreeMap::new(),
        };
        manager.fire_construct(&entity);
        entity
    }

    /// The entity type, derived from the bound schema's machine name.
    pub fn entity_type(&self) -> &str {
        self.schema.lifecycle().machine_name()
    }

    pub fn subtype(&self) -> Option<&str> {
        self.subtype.as_deref()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn set_machine_name(&mut self, machine_name: impl Into<String>) {
        self.lifecycle.set_machine_name(machine_name);
    }

    /// The light reference other entities store to point at this one.
    pub fn to_ref(&self) -> EntityRef {
        EntityRef {
            entity_type: self.entity_type().to_string(),
            subtype: self.subtype.clone(),
            machine_name: self.lifecycle.machine_name().to_string(),
        }
    }

    /// Returns a field's value: the stored value, the schema's configured
    /// default, or null, in that order.
    pub fn get(&self, field: &str) -> Result<FieldValue> {
        let def = self.schema.field(field)?;
        if let Some(value) = self.field_data.get(field) {
            return Ok(value.clone());
        }
        if let Some(default) = def.options.get("default") {
            return Ok(FieldValue::Value(default.clone()));
        }
        Ok(FieldValue::null())
    }

    /// Assigns a field's value after running it through the field's
    /// sanitizer chain. On failure nothing is stored.
    pub async fn set(&mut self, field: &str, value: impl Into<FieldValue> + Send) -> Result<()> {
        if !self.schema.has_field(field) {
            return Err(EntityError::UnknownSchemaField(field.to_string()));
        }
        let sanitized = self.schema.sanitize_field(field, value.into()).await?;
        self.field_data.insert(field.to_string(), sanitized.value);
        Ok(())
    }
}

/// Resolves one light reference into a live entity through the manager.
pub(crate) async fn resolve_reference(manager: &Manager, reference: &EntityRef) -> Result<Entity> {
    let entity = manager
        .load(&reference.entity_type, &reference.machine_name, false)
        .await?;
    entity.ok_or_else(|| EntityError::CantFindEntity {
        collection: format!("entity-{}", reference.entity_type),
        machine_name: reference.machine_name.clone(),
    })
}

fn reference_from(field: &str, value: &Value) -> Result<EntityRef> {
    EntityRef::from_value(value).ok_or_else(|| {
        EntityError::UnexpectedFieldValue(format!(
            "field '{field}' does not hold an entity reference"
        ))
    })
}

#[async_trait]
impl Persistable for Entity {
    fn manager(&self) -> &Manager {
        &self.manager
    }

    fn collection_name(&self) -> String {
        self.schema.entity_collection_name()
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    async fn extend_doc(&self, doc: &mut Document) -> Result<()> {
        doc.insert(
            "type".to_string(),
            Value::String(self.entity_type().to_string()),
        );
        doc.insert(
            "subtype".to_string(),
            self.subtype
                .as_ref()
                .map(|s| Value::String(s.clone()))
                .unwrap_or(Value::Null),
        );

        let mut field_data = Document::new();
        for (name, value) in &self.field_data {
            // unknown fields are a usage error, never dropped silently
            self.schema.field(name)?;
            let projected = match value {
                FieldValue::Value(value) => value.clone(),
                FieldValue::Entity(entity) => entity.to_ref().to_value(),
                FieldValue::Entities(EntityGroup::List(list)) => {
                    Value::Array(list.iter().map(|e| e.to_ref().to_value()).collect())
                }
                FieldValue::Entities(EntityGroup::Keyed(map)) => {
                    let mut keyed = Document::new();
                    for (key, entity) in map {
                        keyed.insert(key.clone(), entity.to_ref().to_value());
                    }
                    Value::Object(keyed)
                }
            };
            field_data.insert(name.clone(), projected);
        }
        doc.insert("fieldData".to_string(), Value::Object(field_data));
        Ok(())
    }

    async fn absorb_doc(&mut self, doc: &Document) -> Result<()> {
        self.subtype = doc
            .get("subtype")
            .and_then(Value::as_str)
            .map(str::to_string);

        let raw = doc
            .get("fieldData")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        self.field_data = raw
            .iter()
            .map(|(name, value)| (name.clone(), FieldValue::Value(value.clone())))
            .collect();

        // Reference-typed fields resolve together; the load finishes once
        // every resolution has, and the first failure wins.
        let mut resolutions: Vec<BoxFuture<'static, Result<(String, FieldValue)>>> = Vec::new();
        for (name, value) in &raw {
            let def = self.schema.field(name)?;
            match def.field_type {
                FieldType::Entity if value.is_null() => {}
                FieldType::Entity => {
                    let reference = reference_from(name, value)?;
                    let manager = self.manager.clone();
                    let name = name.clone();
                    resolutions.push(
                        async move {
                            let entity = resolve_reference(&manager, &reference).await?;
                            Ok((name, FieldValue::Entity(Box::new(entity))))
                        }
                        .boxed(),
                    );
                }
                FieldType::Entities => match value {
                    Value::Null => {}
                    Value::Array(items) => {
                        let references = items
                            .iter()
                            .map(|item| reference_from(name, item))
                            .collect::<Result<Vec<_>>>()?;
                        let manager = self.manager.clone();
                        let name = name.clone();
                        resolutions.push(
                            async move {
                                let loads = references.iter().map(|reference| {
                                    let manager = manager.clone();
                                    async move { resolve_reference(&manager, reference).await }
                                });
                                let entities = try_join_all(loads).await?;
                                Ok((name, FieldValue::Entities(EntityGroup::List(entities))))
                            }
                            .boxed(),
                        );
                    }
                    Value::Object(map) => {
                        let references = map
                            .iter()
                            .map(|(key, item)| Ok((key.clone(), reference_from(name, item)?)))
                            .collect::<Result<Vec<_>>>()?;
                        let manager = self.manager.clone();
                        let name = name.clone();
                        resolutions.push(
                            async move {
                                let loads = references.iter().map(|(key, reference)| {
                                    let manager = manager.clone();
                                    async move {
                                        let entity =
                                            resolve_reference(&manager, reference).await?;
                                        Ok::<_, EntityError>((key.clone(), entity))
                                    }
                                });
                                let entities: BTreeMap<String, Entity> =
                                    try_join_all(loads).await?.into_iter().collect();
                                Ok((name, FieldValue::Entities(EntityGroup::Keyed(entities))))
                            }
                            .boxed(),
                        );
                    }
                    _ => {
                        return Err(EntityError::UnexpectedFieldValue(format!(
                            "field '{name}' does not hold an entity reference collection"
                        )));
                    }
                },
                _ => {}
            }
        }

        for (name, value) in try_join_all(resolutions).await? {
            self.field_data.insert(name, value);
        }
        Ok(())
    }
}
