//! Lifecycle signals and their delivery.
//!
//! # Overview
//!
//! The coordinator announces every lifecycle change as a [`Signal`]:
//! - **EntityCreated** once a host object is fully bound
//! - **EntityDestroying** just before an entity is torn down, carrying a
//!   snapshot of its final components
//! - **ComponentAdded** / **ComponentRemoved** for every component change
//!
//! Signals are delivered by the [`Bus`] to listeners subscribed to their
//! [`Kind`], in subscription order. Listeners get a [`Context`] with
//! read-only access to the bridge and may enqueue mutations, which are
//! applied at the next flush.
//!
//! # Re-entrancy
//!
//! A listener may publish a signal of a different kind from inside its
//! callback; delivery nests. Publishing the kind currently being delivered
//! fails with [`Error::ReentrantPublish`](crate::bridge::Error::ReentrantPublish).
//!
//! # Named Signals
//!
//! Besides lifecycle signals, the [`named`] module provides user-defined
//! signals addressed by name to a set of entities, optionally delayed.

mod bus;
pub mod named;

use std::{fmt, sync::Arc};

use thiserror::Error;

pub use bus::Bus;

use crate::bridge::{
    component,
    entity::{self, Handle},
    error::Result,
    host,
    mutation::{self, Mutation},
    value::Value,
    world::World,
};

/// The kind of a lifecycle signal. Listeners subscribe per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    EntityCreated,
    EntityDestroying,
    ComponentAdded,
    ComponentRemoved,
}

impl Kind {
    pub const ALL: [Kind; 4] = [
        Kind::EntityCreated,
        Kind::EntityDestroying,
        Kind::ComponentAdded,
        Kind::ComponentRemoved,
    ];

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::EntityCreated => "EntityCreated",
            Kind::EntityDestroying => "EntityDestroying",
            Kind::ComponentAdded => "ComponentAdded",
            Kind::ComponentRemoved => "ComponentRemoved",
        };
        f.write_str(name)
    }
}

/// A lifecycle signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    EntityCreated {
        handle: Handle,
        host: host::Id,
    },
    EntityDestroying {
        handle: Handle,
        host: host::Id,
        /// The entity's components at the moment of teardown.
        components: Vec<(component::Id, Value)>,
    },
    ComponentAdded {
        handle: Handle,
        component: component::Id,
        value: Value,
    },
    ComponentRemoved {
        handle: Handle,
        component: component::Id,
        value: Value,
    },
}

impl Signal {
    pub fn kind(&self) -> Kind {
        match self {
            Signal::EntityCreated { .. } => Kind::EntityCreated,
            Signal::EntityDestroying { .. } => Kind::EntityDestroying,
            Signal::ComponentAdded { .. } => Kind::ComponentAdded,
            Signal::ComponentRemoved { .. } => Kind::ComponentRemoved,
        }
    }

    pub fn handle(&self) -> Handle {
        match self {
            Signal::EntityCreated { handle, .. }
            | Signal::EntityDestroying { handle, .. }
            | Signal::ComponentAdded { handle, .. }
            | Signal::ComponentRemoved { handle, .. } => *handle,
        }
    }
}

/// Error returned by a listener callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerError {
    /// The listener failed but left no lasting damage. Dispatch continues and
    /// the entity is marked degraded.
    #[error("{0}")]
    Recoverable(String),
    /// The listener left shared state inconsistent. Dispatch still delivers
    /// the remaining signals, then reports the failure as an error.
    #[error("corrupted state: {0}")]
    Corrupted(String),
}

impl ListenerError {
    #[inline]
    pub fn is_corrupted(&self) -> bool {
        matches!(self, ListenerError::Corrupted(_))
    }
}

/// A listener callback that failed during delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("listener {subscription} failed on {kind} for {handle}: {error}")]
pub struct ListenerFailure {
    pub subscription: Subscription,
    pub kind: Kind,
    pub handle: Handle,
    #[source]
    pub error: ListenerError,
}

/// Identifies a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    kind: Kind,
    id: u64,
}

impl Subscription {
    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

/// A signal listener.
///
/// Closures `FnMut(&Signal, &Context) -> Result<(), ListenerError>` implement
/// this trait; implement it directly for listeners with their own state.
pub trait Listener {
    fn on_signal(
        &mut self,
        signal: &Signal,
        cx: &Context<'_>,
    ) -> std::result::Result<(), ListenerError>;
}

impl<F> Listener for F
where
    F: FnMut(&Signal, &Context<'_>) -> std::result::Result<(), ListenerError>,
{
    fn on_signal(
        &mut self,
        signal: &Signal,
        cx: &Context<'_>,
    ) -> std::result::Result<(), ListenerError> {
        self(signal, cx)
    }
}

/// What a listener may touch while a signal is being delivered.
///
/// Everything is read-only except the bus (publish, subscribe, unsubscribe)
/// and the mutation queue. Structural changes requested here take effect at
/// the next flush.
pub struct Context<'a> {
    bus: &'a Bus,
    registry: &'a entity::Registry,
    world: &'a World,
    components: &'a component::Registry,
    mutations: &'a mutation::Queue,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        bus: &'a Bus,
        registry: &'a entity::Registry,
        world: &'a World,
        components: &'a component::Registry,
        mutations: &'a mutation::Queue,
    ) -> Self {
        Self {
            bus,
            registry,
            world,
            components,
            mutations,
        }
    }

    /// The handle bound to a host object.
    pub fn lookup(&self, host: host::Id) -> Option<Handle> {
        self.registry.lookup_id(host)
    }

    /// The host object behind a bound handle.
    pub fn host(&self, handle: Handle) -> Option<&host::Ref> {
        self.registry.resolve(handle)
    }

    #[inline]
    pub fn is_bound(&self, handle: Handle) -> bool {
        self.registry.is_bound(handle)
    }

    /// A component of a bound entity.
    pub fn component(&self, handle: Handle, component: component::Id) -> Option<&Value> {
        if !self.registry.is_bound(handle) {
            return None;
        }
        self.world.get(handle, component)
    }

    pub fn component_id(&self, name: &str) -> Option<component::Id> {
        self.components.get(name)
    }

    /// Queue a structural change for the next flush. Returns its sequence
    /// number.
    pub fn enqueue(&self, mutation: Mutation) -> u64 {
        self.mutations.enqueue(mutation)
    }

    /// Queue a named signal for delivery in the next reaction phase.
    pub fn signal(&self, name: impl Into<Arc<str>>, entities: Vec<Handle>) -> u64 {
        self.mutations.enqueue(Mutation::Signal {
            name: name.into(),
            entities,
            delay: None,
        })
    }

    /// Deliver a signal of another kind immediately.
    pub fn publish(&self, signal: &Signal) -> Result<Vec<ListenerFailure>> {
        self.bus.publish(signal, self)
    }

    /// Subscribe a listener. It first sees signals published after the
    /// current delivery pass.
    pub fn subscribe<F>(&self, kind: Kind, listener: F) -> Subscription
    where
        F: FnMut(&Signal, &Context<'_>) -> std::result::Result<(), ListenerError> + 'static,
    {
        self.bus.subscribe(kind, listener)
    }

    /// Remove a subscription. Removal of a listener in the middle of its own
    /// delivery pass takes effect once the pass completes.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.bus.unsubscribe(subscription)
    }
}
