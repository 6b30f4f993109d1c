use std::collections::HashMap;

use log::{debug, warn};

use crate::bridge::{
    entity::{Allocator, Generation, Handle, Index, Lifecycle, Target},
    error::{Error, Result},
    host,
};

/// A live binding between a host object and an entity handle.
#[derive(Debug, Clone)]
pub struct Entry {
    handle: Handle,
    host: host::Ref,
    state: Lifecycle,
    degraded: bool,
}

impl Entry {
    #[inline]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    #[inline]
    pub fn host(&self) -> &host::Ref {
        &self.host
    }

    #[inline]
    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Whether a materialization step or listener failed for this entity.
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// Bidirectional host object <-> entity handle map.
///
/// At most one live handle exists per host object, and a handle resolves to
/// exactly one host object while it is live. Unbinding frees the slot with a
/// bumped generation, so a later binding of the same host gets a distinct
/// handle.
#[derive(Debug, Default)]
pub struct Registry {
    allocator: Allocator,
    entries: Vec<Option<Entry>>,
    by_host: HashMap<host::Id, Handle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle for a host object. The new entry starts in
    /// [`Lifecycle::Binding`].
    pub fn bind(&mut self, host: &host::Ref) -> Result<Handle> {
        if let Some(&handle) = self.by_host.get(&host.id()) {
            return Err(Error::AlreadyBound {
                host: host.id(),
                handle,
            });
        }

        let handle = self.allocator.alloc();
        let slot = handle.slot();
        if self.entries.len() <= slot {
            self.entries.resize_with(slot + 1, || None);
        }
        self.entries[slot] = Some(Entry {
            handle,
            host: host.clone(),
            state: Lifecycle::Binding,
            degraded: false,
        });
        self.by_host.insert(host.id(), handle);

        debug!("Allocated {} for {}", handle, host.id());
        Ok(handle)
    }

    /// Remove a binding and invalidate its handle. Returns the host reference
    /// the handle was bound to.
    pub fn unbind(&mut self, handle: Handle) -> Result<host::Ref> {
        self.entry(handle)?;
        let Some(entry) = self.entries[handle.slot()].take() else {
            return Err(Error::NotBound(Target::Handle(handle)));
        };

        self.by_host.remove(&entry.host.id());
        if !self.allocator.free(handle) {
            warn!("Released {} whose slot was already free", handle);
        }
        Ok(entry.host)
    }

    /// The entry for a handle in any lifecycle state.
    ///
    /// Fails with [`Error::StaleHandle`] when the slot has moved on to a newer
    /// generation, and with [`Error::NotBound`] when nothing was ever bound
    /// under this handle.
    pub fn entry(&self, handle: Handle) -> Result<&Entry> {
        match self.entries.get(handle.slot()) {
            Some(Some(entry)) if entry.handle == handle => Ok(entry),
            _ => match self.allocator.current(handle.index()) {
                Some(current) if current != handle.generation() => {
                    Err(Error::StaleHandle(handle))
                }
                _ => Err(Error::NotBound(Target::Handle(handle))),
            },
        }
    }

    /// The entry for a handle, only if it is fully bound.
    pub fn bound(&self, handle: Handle) -> Result<&Entry> {
        let entry = self.entry(handle)?;
        if entry.state != Lifecycle::Bound {
            return Err(Error::NotBound(Target::Handle(handle)));
        }
        Ok(entry)
    }

    /// The handle bound to a host object, if the binding is complete.
    pub fn lookup(&self, host: &host::Ref) -> Option<Handle> {
        self.lookup_id(host.id())
    }

    pub fn lookup_id(&self, host: host::Id) -> Option<Handle> {
        let handle = *self.by_host.get(&host)?;
        self.bound(handle).ok().map(Entry::handle)
    }

    /// The host object a handle is bound to, if the binding is complete.
    pub fn resolve(&self, handle: Handle) -> Option<&host::Ref> {
        self.bound(handle).ok().map(Entry::host)
    }

    #[inline]
    pub fn is_bound(&self, handle: Handle) -> bool {
        self.bound(handle).is_ok()
    }

    /// Lifecycle state of a host object's binding.
    pub fn state_of(&self, host: host::Id) -> Lifecycle {
        self.by_host
            .get(&host)
            .and_then(|&handle| self.entry(handle).ok())
            .map_or(Lifecycle::Unbound, Entry::state)
    }

    pub(crate) fn set_state(&mut self, handle: Handle, state: Lifecycle) -> Result<()> {
        self.entry(handle)?;
        if let Some(Some(entry)) = self.entries.get_mut(handle.slot()) {
            entry.state = state;
        }
        Ok(())
    }

    /// Flag a live entity as degraded. Unknown or stale handles are ignored.
    pub(crate) fn mark_degraded(&mut self, handle: Handle) -> bool {
        match self.entries.get_mut(handle.slot()) {
            Some(Some(entry)) if entry.handle == handle => {
                entry.degraded = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_degraded(&self, handle: Handle) -> bool {
        self.entry(handle).is_ok_and(Entry::is_degraded)
    }

    /// Bound entries whose host object has been dropped.
    pub fn orphans(&self) -> Vec<Handle> {
        self.bound_entries()
            .filter(|entry| !entry.host.is_alive())
            .map(Entry::handle)
            .collect()
    }

    /// All fully bound entries, in slot order.
    pub fn bound_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .flatten()
            .filter(|entry| entry.state == Lifecycle::Bound)
    }

    /// Number of live bindings in any state.
    #[inline]
    pub fn len(&self) -> usize {
        self.by_host.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_host.is_empty()
    }

    /// The current generation of a slot, if it was ever allocated.
    pub fn generation_of(&self, index: Index) -> Option<Generation> {
        self.allocator.current(index)
    }
}
