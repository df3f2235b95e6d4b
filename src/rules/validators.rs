use super::{RuleContext, ValidateRule};
use crate::core::{EntityError, Result};
use crate::entity::{Entity, FieldValue};
use crate::persist::Persistable;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref MACHINE_NAME: Regex =
        Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("machine name pattern");
}

/// Checks that a value is a well-formed machine name: lowercase
/// alphanumerics, underscores and dashes, starting with an alphanumeric.
pub struct MachineNameValidator;

#[async_trait]
impl ValidateRule for MachineNameValidator {
    async fn check(&self, _ctx: &RuleContext, value: &FieldValue, _options: &Value) -> Result<()> {
        match value {
            FieldValue::Value(Value::String(s)) if MACHINE_NAME.is_match(s) => Ok(()),
            FieldValue::Value(Value::String(s)) => Err(EntityError::ValidationFailed {
                rule: "machine-name".to_string(),
                reason: format!("'{s}' is not a valid machine name"),
            }),
            _ => Err(EntityError::UnexpectedFieldValue(
                "machine name must be a string".to_string(),
            )),
        }
    }
}

/// Compares an entity's `type`, `subtype` or `machineName` against the
/// expectation named by an options key. Any mismatch, or an option key the
/// entity cannot answer, fails that key's check.
fn check_entity_options(entity: &Entity, options: &Value) -> Result<()> {
    let Some(options) = options.as_object() else {
        return Ok(());
    };
    for (key, expected) in options {
        let actual = match key.as_str() {
            "type" => Value::String(entity.entity_type().to_string()),
            "subtype" => entity
                .subtype()
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null),
            "machineName" => Value::String(entity.machine_name().to_string()),
            _ => return Err(EntityError::FailedEntity(key.clone())),
        };
        if &actual != expected {
            return Err(EntityError::FailedEntity(key.clone()));
        }
    }
    Ok(())
}

/// Checks that a value is a resolved entity matching the configured
/// expectations. Null passes.
pub struct EntityValidator;

#[async_trait]
impl ValidateRule for EntityValidator {
    async fn check(&self, _ctx: &RuleContext, value: &FieldValue, options: &Value) -> Result<()> {
        match value {
            FieldValue::Value(Value::Null) => Ok(()),
            FieldValue::Entity(entity) => check_entity_options(entity, options),
            _ => Err(EntityError::UnexpectedFieldValue(
                "expected a resolved entity".to_string(),
            )),
        }
    }
}

/// Checks that every element of an entity collection is a resolved entity
/// matching the configured expectations. Null passes.
pub struct EntitiesValidator;

#[async_trait]
impl ValidateRule for EntitiesValidator {
    async fn check(&self, _ctx: &RuleContext, value: &FieldValue, options: &Value) -> Result<()> {
        match value {
            FieldValue::Value(Value::Null) => Ok(()),
            FieldValue::Entities(group) => {
                for entity in group.entities() {
                    check_entity_options(entity, options)?;
                }
                Ok(())
            }
            _ => Err(EntityError::UnexpectedFieldValue(
                "expected a collection of resolved entities".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn machine_name_accepts_sane_keys() {
        for name in ["test", "test2", "a-long_name-42"] {
            MachineNameValidator
                .check(&RuleContext::new(), &FieldValue::from(name), &Value::Null)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn machine_name_rejects_bad_keys() {
        for name in ["", "Has Spaces", "UPPER", "-leading", "trailing!"] {
            let err = MachineNameValidator
                .check(&RuleContext::new(), &FieldValue::from(name), &Value::Null)
                .await
                .unwrap_err();
            assert!(
                matches!(err, EntityError::ValidationFailed { .. }),
                "'{name}' should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn entity_validator_passes_null_and_rejects_plain_values() {
        EntityValidator
            .check(&RuleContext::new(), &FieldValue::null(), &Value::Null)
            .await
            .unwrap();

        let err = EntityValidator
            .check(
                &RuleContext::new(),
                &FieldValue::Value(json!("not an entity")),
                &Value::Null,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EntityError::UnexpectedFieldValue(_)));
    }
}
