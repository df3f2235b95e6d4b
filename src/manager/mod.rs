//! Entity Manager Module
//!
//! The [`Manager`] is the aggregate root: it resolves schemas, constructs
//! entities bound to them, answers existence/count/paginated-find queries,
//! and owns the collaborators every record needs (the document store, both
//! rule registries, the event sink). It is a cheap handle over shared
//! state; clone it freely.

use crate::core::{EntityError, Result};
use crate::entity::Entity;
use crate::events::{EventSink, NullEventSink};
use crate::persist::Persistable;
use crate::rules::{
    EntitiesSanitizer, EntitiesValidator, EntitySanitizer, EntityValidator, MachineNameValidator,
    Sanitizers, TrimSanitizer, Validators,
};
use crate::schema::Schema;
use crate::store::{Collection, Document, DocumentStore, FindOptions};
use log::debug;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The one collection every schema persists into.
pub const SCHEMAS_COLLECTION: &str = "schemas";

/// The one collection soft-deleted records of every kind share.
pub const TRASH_COLLECTION: &str = "trash";

/// Page size applied when a caller has no opinion.
pub const DEFAULT_PER_PAGE: u64 = 25;

/// Find criteria: a filter document plus an optional sort specification.
///
/// A plain filter converts directly; a `{"filter": .., "orderBy": ..}`
/// envelope splits into both parts.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: Document,
    pub order_by: Option<Document>,
}

impl FindQuery {
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            order_by: None,
        }
    }

    pub fn with_order_by(mut self, order_by: Document) -> Self {
        self.order_by = Some(order_by);
        self
    }
}

impl From<Document> for FindQuery {
    fn from(filter: Document) -> Self {
        Self::new(filter)
    }
}

impl From<Value> for FindQuery {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                if map.contains_key("filter") || map.contains_key("orderBy") {
                    let filter = map
                        .get("filter")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    let order_by = map.get("orderBy").and_then(Value::as_object).cloned();
                    Self { filter, order_by }
                } else {
                    Self::new(map)
                }
            }
            _ => Self::default(),
        }
    }
}

/// A registered schema summary, as returned by [`Manager::schemas`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInfo {
    pub machine_name: String,
    pub title: String,
    pub description: String,
}

/// One page of find results.
#[derive(Debug)]
pub struct FindPage {
    pub entities: Vec<Entity>,
    pub page: u64,
    pub total: u64,
    pub per_page: u64,
    pub page_count: u64,
}

struct ManagerInner {
    store: Arc<dyn DocumentStore>,
    sanitizers: Sanitizers,
    validators: Validators,
    events: Arc<dyn EventSink>,
}

/// The aggregate root tying schemas, entities and collaborators together.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager").finish_non_exhaustive()
    }
}

impl Manager {
    /// Creates a manager over `store` with no event sink.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_events(store, Arc::new(NullEventSink))
    }

    /// Creates a manager over `store`, announcing constructions to `events`.
    pub fn with_events(store: Arc<dyn DocumentStore>, events: Arc<dyn EventSink>) -> Self {
        let manager = Self {
            inner: Arc::new(ManagerInner {
                store,
                sanitizers: Sanitizers::new(),
                validators: Validators::new(),
                events,
            }),
        };
        manager.register_builtin_rules();
        manager
    }

    fn register_builtin_rules(&self) {
        let sanitizers = self.sanitizers();
        sanitizers.register("trim", Arc::new(TrimSanitizer));
        sanitizers.register("entity", Arc::new(EntitySanitizer));
        sanitizers.register("entities", Arc::new(EntitiesSanitizer));

        let validators = self.validators();
        validators.register("machine-name", Arc::new(MachineNameValidator));
        validators.register("entity", Arc::new(EntityValidator));
        validators.register("entities", Arc::new(EntitiesValidator));
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    pub fn sanitizers(&self) -> &Sanitizers {
        &self.inner.sanitizers
    }

    pub fn validators(&self) -> &Validators {
        &self.inner.validators
    }

    /// The shared soft-delete collection.
    pub fn trash_collection(&self) -> Arc<dyn Collection> {
        self.inner.store.collection(TRASH_COLLECTION)
    }

    pub(crate) fn fire_construct(&self, entity: &Entity) {
        let events = [
            format!("entity[{}].construct", entity.entity_type()),
            "entity.construct".to_string(),
        ];
        self.inner.events.fire(&events, entity);
    }

    /// Summaries of every registered schema.
    pub async fn schemas(&self) -> Result<Vec<SchemaInfo>> {
        let docs = self
            .inner
            .store
            .collection(SCHEMAS_COLLECTION)
            .find(&Document::new(), FindOptions::default())
            .await?;

        Ok(docs
            .iter()
            .map(|doc| SchemaInfo {
                machine_name: doc
                    .get("machineName")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                title: doc
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                description: doc
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect())
    }

    /// Loads a schema by machine name. `Ok(None)` only for a schema that
    /// loaded as brand-new, which a persisted schema never does.
    pub async fn schema(&self, name: &str) -> Result<Option<Schema>> {
        let mut schema = Schema::new(self.clone());
        schema.set_machine_name(name);
        schema.load(None).await?;
        Ok(if schema.is_new() { None } else { Some(schema) })
    }

    async fn require_schema(&self, entity_type: &str) -> Result<Schema> {
        self.schema(entity_type)
            .await?
            .ok_or_else(|| EntityError::InvalidEntityType(entity_type.to_string()))
    }

    /// Whether an entity of `entity_type` exists under `machine_name`.
    pub async fn exists(&self, entity_type: &str, machine_name: &str) -> Result<bool> {
        let schema = self.require_schema(entity_type).await?;
        let mut filter = Document::new();
        filter.insert(
            "machineName".to_string(),
            Value::String(machine_name.to_string()),
        );
        let count = self
            .inner
            .store
            .collection(&schema.entity_collection_name())
            .count(&filter)
            .await?;
        Ok(count > 0)
    }

    /// The number of entities of `entity_type`.
    pub async fn count(&self, entity_type: &str) -> Result<u64> {
        let schema = self.require_schema(entity_type).await?;
        self.inner
            .store
            .collection(&schema.entity_collection_name())
            .count(&Document::new())
            .await
    }

    /// Constructs a fresh, unsaved entity of `entity_type`.
    pub async fn create(&self, entity_type: &str, subtype: Option<&str>) -> Result<Entity> {
        let schema = self.require_schema(entity_type).await?;
        Ok(Entity::new(
            self.clone(),
            Arc::new(schema),
            subtype.map(str::to_string),
        ))
    }

    /// Loads an entity by type and machine name. A missing entity is
    /// `Ok(None)` when `force` is set; otherwise the not-found error
    /// propagates. Any other error propagates unconditionally.
    pub async fn load(
        &self,
        entity_type: &str,
        machine_name: &str,
        force: bool,
    ) -> Result<Option<Entity>> {
        let schema = self.require_schema(entity_type).await?;
        let mut entity = Entity::new(self.clone(), Arc::new(schema), None);
        entity.set_machine_name(machine_name);

        match entity.load(None).await {
            Ok(()) => Ok(Some(entity)),
            Err(EntityError::CantFindEntity { .. }) if force => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Finds entities of `entity_type` matching `query`, one page at a
    /// time. `per_page` of zero means unlimited; `page` counts from one.
    /// Each found document is materialized through the full load path, so
    /// referenced entities come back resolved, in store-returned order.
    pub async fn find(
        &self,
        entity_type: &str,
        query: impl Into<FindQuery> + Send,
        per_page: u64,
        page: u64,
    ) -> Result<FindPage> {
        let query = query.into();
        let page = page.max(1);

        let schema = Arc::new(self.require_schema(entity_type).await?);
        let collection = self
            .inner
            .store
            .collection(&schema.entity_collection_name());

        let total = collection.count(&query.filter).await?;
        let page_count = if per_page == 0 {
            u64::from(total > 0)
        } else {
            total.div_ceil(per_page)
        };

        let options = FindOptions {
            sort: query.order_by.clone(),
            skip: (per_page > 0).then(|| per_page * (page - 1)),
            limit: (per_page > 0).then_some(per_page),
        };
        let docs = collection.find(&query.filter, options).await?;
        debug!(
            "find '{}': {} of {} documents on page {}",
            entity_type,
            docs.len(),
            total,
            page
        );

        let mut entities = Vec::with_capacity(docs.len());
        for doc in &docs {
            let mut entity = Entity::new(self.clone(), schema.clone(), None);
            entity.from_doc(doc).await?;
            entities.push(entity);
        }

        Ok(FindPage {
            entities,
            page,
            total,
            per_page,
            page_count,
        })
    }
}
