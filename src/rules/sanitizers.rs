use super::{RuleContext, SanitizeRule};
use crate::core::{EntityError, Result};
use crate::entity::{Entity, EntityGroup, FieldValue, resolve_reference};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::BTreeMap;

/// Trims leading and trailing whitespace from string values. Null passes
/// through untouched.
pub struct TrimSanitizer;

#[async_trait]
impl SanitizeRule for TrimSanitizer {
    async fn apply(
        &self,
        _ctx: &RuleContext,
        value: FieldValue,
        _options: &Value,
    ) -> Result<FieldValue> {
        match value {
            FieldValue::Value(Value::String(s)) => {
                Ok(FieldValue::Value(Value::String(s.trim().to_string())))
            }
            FieldValue::Value(Value::Null) => Ok(FieldValue::null()),
            _ => Err(EntityError::UnexpectedFieldValue(
                "trim expects a string".to_string(),
            )),
        }
    }
}

/// Turns a light entity reference into the live entity it points at. An
/// already-resolved entity passes through.
pub struct EntitySanitizer;

#[async_trait]
impl SanitizeRule for EntitySanitizer {
    async fn apply(
        &self,
        ctx: &RuleContext,
        value: FieldValue,
        _options: &Value,
    ) -> Result<FieldValue> {
        match value {
            FieldValue::Entity(entity) => Ok(FieldValue::Entity(entity)),
            FieldValue::Value(value) => {
                let reference = crate::entity::EntityRef::from_value(&value).ok_or_else(|| {
                    EntityError::UnexpectedFieldValue(
                        "expected an entity or an entity reference".to_string(),
                    )
                })?;
                let entity = resolve_reference(ctx.manager()?, &reference).await?;
                Ok(FieldValue::Entity(Box::new(entity)))
            }
            FieldValue::Entities(_) => Err(EntityError::UnexpectedFieldValue(
                "expected a single entity, not a collection".to_string(),
            )),
        }
    }
}

/// Resolves a list or keyed mapping of light references element-wise. A
/// collection of already-resolved entities passes through.
pub struct EntitiesSanitizer;

#[async_trait]
impl SanitizeRule for EntitiesSanitizer {
    async fn apply(
        &self,
        ctx: &RuleContext,
        value: FieldValue,
        _options: &Value,
    ) -> Result<FieldValue> {
        match value {
            FieldValue::Entities(group) => Ok(FieldValue::Entities(group)),
            FieldValue::Value(Value::Array(items)) => {
                let references = items
                    .iter()
                    .map(|item| {
                        crate::entity::EntityRef::from_value(item).ok_or_else(|| {
                            EntityError::UnexpectedFieldValue(
                                "expected a list of entity references".to_string(),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let manager = ctx.manager()?;
                let loads = references
                    .iter()
                    .map(|reference| resolve_reference(manager, reference));
                let entities = try_join_all(loads).await?;
                Ok(FieldValue::Entities(EntityGroup::List(entities)))
            }
            FieldValue::Value(Value::Object(map)) => {
                let references = map
                    .iter()
                    .map(|(key, item)| {
                        let reference =
                            crate::entity::EntityRef::from_value(item).ok_or_else(|| {
                                EntityError::UnexpectedFieldValue(
                                    "expected a mapping of entity references".to_string(),
                                )
                            })?;
                        Ok((key.clone(), reference))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let manager = ctx.manager()?;
                let loads = references.iter().map(|(key, reference)| async move {
                    let entity = resolve_reference(manager, reference).await?;
                    Ok::<_, EntityError>((key.clone(), entity))
                });
                let entities: BTreeMap<String, Entity> =
                    try_join_all(loads).await?.into_iter().collect();
                Ok(FieldValue::Entities(EntityGroup::Keyed(entities)))
            }
            _ => Err(EntityError::UnexpectedFieldValue(
                "expected a list or mapping of entities".to_string(),
            )),
        }
    }
}
