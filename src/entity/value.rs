use super::Entity;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// The light reference persisted in place of a referenced entity's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(rename = "machineName")]
    pub machine_name: String,
}

impl EntityRef {
    /// Reads a light reference out of a raw stored value, if it is one.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        json!({
            "type": self.entity_type,
            "subtype": self.subtype,
            "machineName": self.machine_name,
        })
    }
}

/// A collection of resolved referenced entities, mirroring the stored shape.
#[derive(Debug, Clone)]
pub enum EntityGroup {
    List(Vec<Entity>),
    Keyed(BTreeMap<String, Entity>),
}

impl EntityGroup {
    pub fn len(&self) -> usize {
        match self {
            Self::List(list) => list.len(),
            Self::Keyed(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entities(&self) -> Vec<&Entity> {
        match self {
            Self::List(list) => list.iter().collect(),
            Self::Keyed(map) => map.values().collect(),
        }
    }
}

/// A single field's value: a plain datum, one resolved entity, or a
/// collection of resolved entities. Matched exhaustively wherever field
/// data is serialized, sanitized or resolved.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Value(Value),
    Entity(Box<Entity>),
    Entities(EntityGroup),
}

impl FieldValue {
    pub fn null() -> Self {
        Self::Value(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_entities(&self) -> Option<&EntityGroup> {
        match self {
            Self::Entities(group) => Some(group),
            _ => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<Entity> for FieldValue {
    fn from(entity: Entity) -> Self {
        Self::Entity(Box::new(entity))
    }
}

impl From<Vec<Entity>> for FieldValue {
    fn from(entities: Vec<Entity>) -> Self {
        Self::Entities(EntityGroup::List(entities))
    }
}

impl From<BTreeMap<String, Entity>> for FieldValue {
    fn from(entities: BTreeMap<String, Entity>) -> Self {
        Self::Entities(EntityGroup::Keyed(entities))
    }
}

impl From<EntityGroup> for FieldValue {
    fn from(group: EntityGroup) -> Self {
        Self::Entities(group)
    }
}
