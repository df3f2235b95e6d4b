use super::{Collection, Document, DocumentStore, FindOptions};
use crate::core::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// An in-memory document store.
///
/// Collections preserve insertion order, which doubles as the default find
/// order when no sort specification is given. Cloning the store clones the
/// handle, not the data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Arc<MemoryCollection>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the collections that currently exist.
    pub fn collection_names(&self) -> Vec<String> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        collections.keys().cloned().collect()
    }
}

impl DocumentStore for MemoryStore {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::default()))
            .clone()
    }
}

#[derive(Default)]
struct MemoryCollection {
    docs: tokio::sync::RwLock<Vec<Document>>,
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn count(&self, filter: &Document) -> Result<u64> {
        let docs = self.docs.read().await;
        Ok(docs.iter().filter(|doc| matches(doc, filter)).count() as u64)
    }

    async fn find_one(&self, filter: &Document) -> Result<Option<Document>> {
        let docs = self.docs.read().await;
        Ok(docs.iter().find(|doc| matches(doc, filter)).cloned())
    }

    async fn find(&self, filter: &Document, options: FindOptions) -> Result<Vec<Document>> {
        let docs = self.docs.read().await;
        let mut found: Vec<Document> = docs
            .iter()
            .filter(|doc| matches(doc, filter))
            .cloned()
            .collect();

        if let Some(sort) = &options.sort {
            found.sort_by(|a, b| compare_by_spec(a, b, sort));
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let found = found.into_iter().skip(skip);
        let found = match options.limit {
            Some(limit) => found.take(limit as usize).collect(),
            None => found.collect(),
        };

        Ok(found)
    }

    async fn save(&self, mut doc: Document) -> Result<Document> {
        let mut docs = self.docs.write().await;

        let id = doc.get("_id").and_then(Value::as_str).map(str::to_string);
        match id {
            Some(id) => {
                let slot = docs
                    .iter_mut()
                    .find(|d| d.get("_id").and_then(Value::as_str) == Some(id.as_str()));
                match slot {
                    Some(existing) => *existing = doc.clone(),
                    None => docs.push(doc.clone()),
                }
            }
            None => {
                doc.insert(
                    "_id".to_string(),
                    Value::String(Uuid::new_v4().to_string()),
                );
                docs.push(doc.clone());
            }
        }

        Ok(doc)
    }

    async fn remove(&self, filter: &Document) -> Result<u64> {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|doc| !matches(doc, filter));
        Ok((before - docs.len()) as u64)
    }
}

/// Top-level equality matching: every filter key must be present in the
/// document with an equal value.
fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| {
        doc.get(key)
            .map(|actual| actual == expected)
            .unwrap_or(false)
    })
}

fn compare_by_spec(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (key, direction) in sort {
        let left = a.get(key).unwrap_or(&Value::Null);
        let right = b.get(key).unwrap_or(&Value::Null);
        let mut ordering = compare_values(left, right);
        if direction.as_i64().unwrap_or(1) < 0 {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
