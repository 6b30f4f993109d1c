use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicU32, Ordering},
};

use dashmap::DashMap;

use crate::bridge::component::{Id, Info};

/// A thread-safe component registry mapping component names to ids.
///
/// Lookups by name go through a `DashMap`; registration takes a single shard
/// lock plus a short write lock on the info list. Synchronization workers
/// resolve names concurrently, so the registry is shared by reference across
/// threads.
pub struct Registry {
    /// Map from component name to id.
    names: DashMap<Arc<str>, Id>,

    /// Registered component records, indexed by id.
    components: RwLock<Vec<Option<Info>>>,

    /// Next available component identifier.
    next_id: AtomicU32,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[inline]
    pub fn new() -> Self {
        Self {
            names: DashMap::new(),
            components: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(0),
        }
    }

    /// Register a component name and get its id. Registering a name twice
    /// returns the existing id.
    pub fn register(&self, name: &str) -> Id {
        // Fast path: already registered
        if let Some(id) = self.names.get(name) {
            return *id;
        }

        // Entry API so two racing registrations agree on one id.
        *self
            .names
            .entry(Arc::from(name))
            .or_insert_with(|| {
                let id = Id(self.next_id.fetch_add(1, Ordering::Relaxed));
                let mut components = self
                    .components
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                let index = id.index();
                if index >= components.len() {
                    components.resize(index + 1, None);
                }
                components[index] = Some(Info::new(id, Arc::from(name)));
                id
            })
            .value()
    }

    /// Get the id of a registered component name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<Id> {
        self.names.get(name).map(|id| *id)
    }

    /// Get the registration record for an id.
    pub fn info(&self, id: Id) -> Option<Info> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id.index())
            .cloned()
            .flatten()
    }

    /// Name of a registered component.
    pub fn name(&self, id: Id) -> Option<Arc<str>> {
        self.info(id).map(|info| info.name().clone())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
