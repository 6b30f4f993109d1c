//! Component type identities.
//!
//! Bound components are identified by name (`"Position"`, `"Health"`) and
//! interned to a compact [`Id`] used by world storage and signals.

mod registry;

use std::{fmt, sync::Arc};

pub use registry::Registry;

/// Identifier of a registered component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for Id {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}", self.0)
    }
}

/// Registration record for a component type.
#[derive(Debug, Clone)]
pub struct Info {
    id: Id,
    name: Arc<str>,
}

impl Info {
    fn new(id: Id, name: Arc<str>) -> Self {
        Self { id, name }
    }

    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }
}
