// ============================================================================
// entitystore Library
// ============================================================================
//
// A schema-governed entity layer above a document store: typed record
// schemas with per-field sanitization and validation chains, a shared
// persistence lifecycle with soft delete and restore, and lazy resolution
// of cross-entity references.

pub mod core;
pub mod entity;
pub mod events;
pub mod manager;
pub mod persist;
pub mod rules;
pub mod schema;
pub mod store;

// Re-export main types for convenience
pub use crate::core::{EntityError, Result};
pub use crate::entity::{Entity, EntityGroup, EntityRef, FieldValue};
pub use crate::events::{EventSink, NullEventSink};
pub use crate::manager::{
    DEFAULT_PER_PAGE, FindPage, FindQuery, Manager, SCHEMAS_COLLECTION, SchemaInfo,
    TRASH_COLLECTION,
};
pub use crate::persist::{DEFAULT_ACTOR, Lifecycle, Persistable, Stamp};
pub use crate::rules::{RuleContext, SanitizeRule, Sanitizers, ValidateRule, Validators};
pub use crate::schema::{FieldDef, FieldOptions, FieldType, RuleBinding, Sanitized, Schema};
pub use crate::store::{Collection, Document, DocumentStore, FindOptions, MemoryStore};
