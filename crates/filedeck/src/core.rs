//! Core event types shared by the bus and its handlers.

use std::any::{type_name, TypeId};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An event is a fact that something happened.
///
/// Any `Clone + Send + Sync + 'static` type is an event; the bus keys its
/// subscriber lists by the event's concrete type.
pub trait Event: Clone + Send + Sync + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + 'static {}

/// Identity of the payload type a subscriber listens for.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    id: TypeId,
    name: &'static str,
}

impl EventKey {
    pub fn of<E: Event>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: type_name::<E>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name, for logs.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventKey").field(&self.name).finish()
    }
}

/// Token returned by every subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a subscriber is driven during dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Invoked inline, before any async handler.
    Sync,
    /// Awaited after all sync handlers have run.
    Async,
}
