//! Persistence Lifecycle Module
//!
//! Everything this crate stores (schemas and entities alike) shares one
//! lifecycle: a [`Lifecycle`] record carrying identity, machine name,
//! transient state flags and audit stamps, plus the [`Persistable`] trait
//! whose provided methods implement the generic save/load/delete algorithm.
//! Implementors supply the override points: the owning manager, the target
//! collection name, and the document mapping for their own fields.
//!
//! Soft deletes move a serialized snapshot of the record into the shared
//! trash collection; saving a trashed record restores it.

use crate::core::{EntityError, Result};
use crate::entity::FieldValue;
use crate::manager::Manager;
use crate::rules::RuleContext;
use crate::store::{Collection, Document};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// Actor recorded on audit stamps when the caller does not name one.
pub const DEFAULT_ACTOR: &str = "system";

/// An audit stamp: when something happened and who did it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamp {
    pub on: DateTime<Utc>,
    #[serde(default)]
    pub by: Option<String>,
}

/// The lifecycle state every persisted record carries.
///
/// The flags are transient: they describe the in-memory instance and are
/// never written to the store.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    id: Option<String>,
    machine_name: String,
    is_new: bool,
    is_updated: bool,
    is_trashed: bool,
    is_renaming: bool,
    created: Stamp,
    updated: Stamp,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: None,
            machine_name: String::new(),
            is_new: true,
            is_updated: false,
            is_trashed: false,
            is_renaming: false,
            created: Stamp { on: now, by: None },
            updated: Stamp { on: now, by: None },
        }
    }

    /// The store-assigned identity, absent until the first save.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The unique, human-chosen key. Empty until assigned.
    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_updated(&self) -> bool {
        self.is_updated
    }

    pub fn is_trashed(&self) -> bool {
        self.is_trashed
    }

    pub fn is_renaming(&self) -> bool {
        self.is_renaming
    }

    pub fn created(&self) -> &Stamp {
        &self.created
    }

    pub fn updated(&self) -> &Stamp {
        &self.updated
    }

    /// Assigns the machine name. Changing the name of a record that has
    /// already been persisted stages a rename for the next save.
    pub fn set_machine_name(&mut self, value: impl Into<String>) {
        let value = value.into();
        if self.machine_name != value {
            if !self.is_new && !self.machine_name.is_empty() {
                self.is_renaming = true;
            }
            self.is_updated = true;
            self.machine_name = value;
        }
    }

    pub(crate) fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    pub(crate) fn set_trashed(&mut self, trashed: bool) {
        self.is_trashed = trashed;
    }

    pub(crate) fn mark_updated(&mut self) {
        self.is_updated = true;
    }

    /// Clears the new/updated flags, as after absorbing a stored document.
    pub(crate) fn clear_dirty(&mut self) {
        self.is_new = false;
        self.is_updated = false;
    }

    /// Settles all transient flags after a successful save.
    pub(crate) fn mark_clean(&mut self) {
        self.is_new = false;
        self.is_updated = false;
        self.is_renaming = false;
    }

    /// Serializes the base fields into a store document.
    pub fn to_base_doc(&self, by: &str, now: DateTime<Utc>) -> Document {
        let mut doc = Document::new();
        if let Some(id) = &self.id {
            doc.insert("_id".to_string(), Value::String(id.clone()));
        }
        doc.insert(
            "machineName".to_string(),
            Value::String(self.machine_name.clone()),
        );
        doc.insert(
            "created".to_string(),
            json!({
                "on": self.created.on,
                "by": self.created.by.as_deref().unwrap_or(by),
            }),
        );
        doc.insert("updated".to_string(), json!({ "on": now, "by": by }));
        doc
    }

    /// Populates the base fields from a stored document.
    pub fn absorb_base_doc(&mut self, doc: &Document) -> Result<()> {
        self.id = doc.get("_id").and_then(Value::as_str).map(str::to_string);
        if let Some(name) = doc.get("machineName").and_then(Value::as_str) {
            self.machine_name = name.to_string();
        }
        self.absorb_stamps(doc)
    }

    /// Refreshes the audit stamps from a stored document.
    pub(crate) fn absorb_stamps(&mut self, doc: &Document) -> Result<()> {
        if let Some(created) = doc.get("created") {
            self.created = serde_json::from_value(created.clone())?;
        }
        if let Some(updated) = doc.get("updated") {
            self.updated = serde_json::from_value(updated.clone())?;
        }
        Ok(())
    }
}

fn machine_name_filter(machine_name: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(
        "machineName".to_string(),
        Value::String(machine_name.to_string()),
    );
    filter
}

fn trash_filter(collection: &str, machine_name: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(
        "collection".to_string(),
        Value::String(collection.to_string()),
    );
    filter.insert(
        "machineName".to_string(),
        Value::String(machine_name.to_string()),
    );
    filter
}

/// A record that can be persisted through the shared lifecycle.
///
/// Implementors provide the override points; the provided methods supply
/// the save/load/delete machinery. Every step of those pipelines runs
/// strictly in sequence and the first failure aborts the remainder.
#[async_trait]
pub trait Persistable: Send + Sync {
    /// The manager this record belongs to.
    fn manager(&self) -> &Manager;

    /// The name of the collection this record persists into.
    fn collection_name(&self) -> String;

    fn lifecycle(&self) -> &Lifecycle;

    fn lifecycle_mut(&mut self) -> &mut Lifecycle;

    /// Writes the record's own fields into `doc`, on top of the base fields.
    async fn extend_doc(&self, doc: &mut Document) -> Result<()>;

    /// Reads the record's own fields out of a stored document.
    async fn absorb_doc(&mut self, doc: &Document) -> Result<()>;

    /// The collection this record persists into.
    fn collection(&self) -> Arc<dyn Collection> {
        self.manager().store().collection(&self.collection_name())
    }

    fn machine_name(&self) -> &str {
        self.lifecycle().machine_name()
    }

    fn is_new(&self) -> bool {
        self.lifecycle().is_new()
    }

    fn is_trashed(&self) -> bool {
        self.lifecycle().is_trashed()
    }

    /// Serializes the whole record into a store document.
    async fn to_doc(&self, by: Option<&str>) -> Result<Document> {
        let by = by.unwrap_or(DEFAULT_ACTOR);
        let mut doc = self.lifecycle().to_base_doc(by, Utc::now());
        self.extend_doc(&mut doc).await?;
        Ok(doc)
    }

    /// Populates the record from a stored document and clears the
    /// new/updated flags.
    async fn from_doc(&mut self, doc: &Document) -> Result<()> {
        self.lifecycle_mut().clear_dirty();
        self.lifecycle_mut().absorb_base_doc(doc)?;
        self.absorb_doc(doc).await
    }

    /// Validates the record prior to saving.
    async fn validate(&self) -> Result<()> {
        let machine_name = self.lifecycle().machine_name().to_string();
        if machine_name.is_empty() {
            return Err(EntityError::MissingMachineName);
        }

        let ctx = RuleContext::with_manager(self.manager().clone());
        self.manager()
            .validators()
            .validate(
                &ctx,
                "machine-name",
                &FieldValue::Value(Value::String(machine_name)),
                &Value::Null,
            )
            .await
    }

    /// Saves the record: sanitize, validate, serialize, probe for a
    /// machine-name collision, upsert, and reconcile the trash entry of a
    /// previously trashed record.
    async fn save(&mut self, by: Option<&str>) -> Result<()> {
        // Machine name runs through the registered trim rule before
        // anything else looks at it.
        let ctx = RuleContext::with_manager(self.manager().clone());
        let raw = FieldValue::Value(Value::String(
            self.lifecycle().machine_name().to_string(),
        ));
        let trimmed = self
            .manager()
            .sanitizers()
            .sanitize(&ctx, "trim", raw, &Value::Null)
            .await?;
        if let FieldValue::Value(Value::String(name)) = trimmed {
            self.lifecycle_mut().set_machine_name(name);
        }

        self.validate().await?;

        let doc = self.to_doc(by).await?;
        let machine_name = self.lifecycle().machine_name().to_string();
        let collection_name = self.collection_name();
        let collection = self.collection();

        // A hit under this machine name belonging to a different record is
        // a collision; our own document (same _id) is being overwritten.
        if let Some(existing) = collection.find_one(&machine_name_filter(&machine_name)).await? {
            let existing_id = existing.get("_id").and_then(Value::as_str);
            if existing_id.is_none() || existing_id != self.lifecycle().id() {
                return Err(EntityError::MachineNameExists(machine_name));
            }
        }

        let stored = collection.save(doc).await?;

        if self.lifecycle().is_trashed() {
            self.manager()
                .trash_collection()
                .remove(&trash_filter(&collection_name, &machine_name))
                .await?;
            self.lifecycle_mut().set_trashed(false);
        }

        let id = stored.get("_id").and_then(Value::as_str).map(str::to_string);
        let lifecycle = self.lifecycle_mut();
        lifecycle.set_id(id);
        lifecycle.absorb_stamps(&stored)?;
        lifecycle.mark_clean();

        debug!("saved '{}' into '{}'", machine_name, collection_name);
        Ok(())
    }

    /// Loads the record by machine name, falling back to the shared trash
    /// collection for soft-deleted records.
    async fn load(&mut self, machine_name: Option<&str>) -> Result<()> {
        let machine_name = match machine_name {
            Some(name) => name.to_string(),
            None if !self.lifecycle().machine_name().is_empty() => {
                self.lifecycle().machine_name().to_string()
            }
            None => return Err(EntityError::MissingMachineName),
        };

        let collection_name = self.collection_name();
        let mut doc = self
            .collection()
            .find_one(&machine_name_filter(&machine_name))
            .await?;

        if doc.is_none() {
            let envelope = self
                .manager()
                .trash_collection()
                .find_one(&trash_filter(&collection_name, &machine_name))
                .await?;
            if let Some(envelope) = envelope {
                let mut inner = envelope
                    .get("doc")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                inner.insert(
                    "machineName".to_string(),
                    Value::String(machine_name.clone()),
                );
                if let Some(id) = envelope.get("_id") {
                    inner.insert("_id".to_string(), id.clone());
                }
                self.lifecycle_mut().set_trashed(true);
                doc = Some(inner);
            }
        }

        let doc = doc.ok_or_else(|| EntityError::CantFindEntity {
            collection: collection_name,
            machine_name: machine_name.clone(),
        })?;

        self.from_doc(&doc).await
    }

    /// Trashes the record, or removes it for good.
    ///
    /// A record that is already trashed is always removed permanently. A
    /// soft delete snapshots the record into the trash collection before
    /// removing it from its own collection.
    async fn delete(&mut self, by: Option<&str>, permanently: bool) -> Result<()> {
        if self.lifecycle().machine_name().is_empty() {
            return Err(EntityError::MissingMachineName);
        }

        let was_trashed = self.lifecycle().is_trashed();
        let permanently = was_trashed || permanently;
        let collection_name = self.collection_name();

        if !permanently {
            if self.lifecycle().is_new() || self.lifecycle().is_updated() {
                self.load(None).await?;
            }

            let machine_name = self.lifecycle().machine_name().to_string();
            let mut doc = self.to_doc(by).await?;
            doc.remove("_id");
            doc.remove("machineName");

            let mut envelope = Document::new();
            envelope.insert(
                "collection".to_string(),
                Value::String(collection_name.clone()),
            );
            envelope.insert(
                "machineName".to_string(),
                Value::String(machine_name.clone()),
            );
            envelope.insert("doc".to_string(), Value::Object(doc));

            let stored = self.manager().trash_collection().save(envelope).await?;
            let id = stored.get("_id").and_then(Value::as_str).map(str::to_string);
            let lifecycle = self.lifecycle_mut();
            lifecycle.set_trashed(true);
            lifecycle.set_id(id);

            self.collection()
                .remove(&machine_name_filter(&machine_name))
                .await?;
            debug!("trashed '{}' from '{}'", machine_name, collection_name);
            return Ok(());
        }

        let machine_name = self.lifecycle().machine_name().to_string();
        if was_trashed {
            self.manager()
                .trash_collection()
                .remove(&trash_filter(&collection_name, &machine_name))
                .await?;
        } else {
            self.collection()
                .remove(&machine_name_filter(&machine_name))
                .await?;
        }
        debug!(
            "permanently deleted '{}' from '{}'",
            machine_name, collection_name
        );
        Ok(())
    }
}
