//! Construction-event notification facility.
//!
//! The manager fires `entity[<type>].construct` and `entity.construct`
//! whenever a new entity instance comes into being. Sinks are observation
//! hooks only: they are invoked synchronously, their return value is
//! ignored, and nothing in the data model depends on them running.

use crate::entity::Entity;

/// Receives fire-and-forget notifications.
pub trait EventSink: Send + Sync {
    /// Handles the given event names, fired in order, for one entity.
    fn fire(&self, events: &[String], entity: &Entity);
}

/// A sink that discards every notification. The default.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn fire(&self, _events: &[String], _entity: &Entity) {}
}
