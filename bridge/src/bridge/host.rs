//! Host-runtime objects as seen by the bridge.
//!
//! The bridge never owns host objects. It keeps a [`Ref`], a weak reference
//! tagged with the object's stable [`Id`], and upgrades it only for the
//! duration of a materialization or synchronization call.

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, PoisonError, RwLock, Weak},
};

use thiserror::Error;

use crate::bridge::value::Value;

/// Stable identity of a host object, assigned by the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u64);

impl Id {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

/// A named feature a host object may expose, e.g. `transform` or `health`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Capability(Arc<str>);

impl Capability {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Capability {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Capability {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure to read or write a capability on a host object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("capability `{0}` is not exposed")]
    Unsupported(Capability),
    #[error("capability `{capability}` rejected the value: {reason}")]
    Rejected {
        capability: Capability,
        reason: String,
    },
    #[error("host object is no longer available")]
    Gone,
}

/// The surface a host runtime implements for each bridgeable object.
///
/// Implementations must be thread safe: bulk synchronization may read and
/// write different host objects from several worker threads at once. A single
/// object is never touched by two workers in the same pass.
pub trait HostObject: Send + Sync {
    fn id(&self) -> Id;

    fn has_capability(&self, capability: &Capability) -> bool;

    fn read(&self, capability: &Capability) -> Result<Value, AccessError>;

    fn write(&self, capability: &Capability, value: Value) -> Result<(), AccessError>;
}

/// Non-owning reference to a host object.
///
/// Two refs are equal when they name the same [`Id`], whether or not the
/// object behind them is still alive.
#[derive(Clone)]
pub struct Ref {
    id: Id,
    object: Weak<dyn HostObject>,
}

impl Ref {
    pub fn new<T: HostObject + 'static>(object: &Arc<T>) -> Self {
        let weak: Weak<T> = Arc::downgrade(object);
        Self {
            id: object.id(),
            object: weak,
        }
    }

    pub fn from_dyn(object: &Arc<dyn HostObject>) -> Self {
        Self {
            id: object.id(),
            object: Arc::downgrade(object),
        }
    }

    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Borrow the host object for the duration of a call.
    pub fn upgrade(&self) -> Option<Arc<dyn HostObject>> {
        self.object.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.object.strong_count() > 0
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Ref {}

impl Hash for Ref {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// A host object backed by a property map.
///
/// Suitable for hosts whose objects are plain bags of named values, such as
/// scripting runtimes or data-driven scenes, and for driving the bridge in
/// tests and benchmarks.
pub struct PropertyObject {
    id: Id,
    properties: RwLock<HashMap<Capability, Value>>,
}

impl PropertyObject {
    pub fn new(id: u64) -> Self {
        Self {
            id: Id::new(id),
            properties: RwLock::new(HashMap::new()),
        }
    }

    /// Builder-style property insertion.
    pub fn with(self, capability: impl Into<Capability>, value: impl Into<Value>) -> Self {
        self.set(capability, value);
        self
    }

    pub fn set(&self, capability: impl Into<Capability>, value: impl Into<Value>) {
        self.properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(capability.into(), value.into());
    }

    pub fn get(&self, capability: &str) -> Option<Value> {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Capability::from(capability))
            .cloned()
    }

    pub fn remove(&self, capability: &str) -> Option<Value> {
        self.properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&Capability::from(capability))
    }
}

impl HostObject for PropertyObject {
    fn id(&self) -> Id {
        self.id
    }

    fn has_capability(&self, capability: &Capability) -> bool {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(capability)
    }

    fn read(&self, capability: &Capability) -> Result<Value, AccessError> {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(capability)
            .cloned()
            .ok_or_else(|| AccessError::Unsupported(capability.clone()))
    }

    fn write(&self, capability: &Capability, value: Value) -> Result<(), AccessError> {
        let mut properties = self
            .properties
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match properties.get_mut(capability) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(AccessError::Unsupported(capability.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_does_not_extend_lifetime() {
        // Given
        let object = Arc::new(PropertyObject::new(7));
        let host = Ref::new(&object);
        assert!(host.is_alive());

        // When
        drop(object);

        // Then
        assert!(!host.is_alive());
        assert!(host.upgrade().is_none());
        assert_eq!(host.id(), Id::new(7));
    }

    #[test]
    fn refs_compare_by_id() {
        let a = Arc::new(PropertyObject::new(1));
        let b = Arc::new(PropertyObject::new(1));
        let c = Arc::new(PropertyObject::new(2));

        assert_eq!(Ref::new(&a), Ref::new(&b));
        assert_ne!(Ref::new(&a), Ref::new(&c));
    }

    #[test]
    fn property_object_rejects_unknown_writes() {
        // Given
        let object = PropertyObject::new(1).with("health", 100i64);

        // When
        let known = object.write(&"health".into(), Value::Int(50));
        let unknown = object.write(&"armor".into(), Value::Int(5));

        // Then
        assert!(known.is_ok());
        assert_eq!(object.get("health"), Some(Value::Int(50)));
        assert_eq!(
            unknown,
            Err(AccessError::Unsupported(Capability::from("armor")))
        );
        assert!(!object.has_capability(&"armor".into()));
    }
}
