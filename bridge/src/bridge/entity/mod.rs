//! Entity handles and their allocation.
//!
//! # Architecture
//!
//! - **[`Handle`]**: identifies an entity bound to a host object. It combines an
//!   [`Index`] (the slot) with a [`Generation`] (how many times the slot has been
//!   reused), so a handle held past its entity's teardown can be detected as stale.
//!
//! - **[`Allocator`]**: hands out handles and recycles freed slots. Freed slots are
//!   reused in the order they were released, with the generation bumped on free.
//!
//! - **[`Registry`]**: the host object <-> handle map built on top of the allocator,
//!   tracking each binding's [`Lifecycle`].
//!
//! # Generation Tracking
//!
//! ```rust,ignore
//! let handle = allocator.alloc(); // Handle { index: 0, generation: 0 }
//! allocator.free(handle);
//! let reused = allocator.alloc(); // Handle { index: 0, generation: 1 }
//! // `handle` no longer matches the slot's generation and is stale.
//! ```

mod registry;

use std::{collections::VecDeque, fmt};

pub use registry::{Entry, Registry};

use crate::bridge::host;

/// How many times an entity slot has been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u32);

impl Generation {
    /// The first generation of an entity slot.
    pub const FIRST: Self = Self(0);

    /// Get the next generation from the current.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0
    }
}

/// An entity slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Index(u32);

impl From<u32> for Index {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Index {
    #[inline]
    pub fn get(&self) -> u32 {
        self.0
    }
}

/// A generational entity handle.
///
/// A handle is valid only while its generation matches the registry's current
/// generation for the slot and the slot is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle {
    index: Index,
    generation: Generation,
}

impl Handle {
    #[inline]
    pub const fn new(index: Index, generation: Generation) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn index(&self) -> Index {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Index of this handle in slot-indexed storage.
    #[inline]
    pub fn slot(&self) -> usize {
        self.index.0 as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {}v{}", self.index.0, self.generation.0)
    }
}

/// Lifecycle of a host object's binding.
///
/// `Unbound -> Binding -> Bound -> Unbinding -> Unbound`. Only `Bound`
/// entities are visible to lookups and component reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifecycle {
    #[default]
    Unbound,
    Binding,
    Bound,
    Unbinding,
}

/// The target of a lifecycle request: an entity handle or the host object it
/// was bound for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Handle(Handle),
    Host(host::Id),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Handle(handle) => handle.fmt(f),
            Target::Host(id) => id.fmt(f),
        }
    }
}

impl From<Handle> for Target {
    fn from(value: Handle) -> Self {
        Target::Handle(value)
    }
}

impl From<host::Id> for Target {
    fn from(value: host::Id) -> Self {
        Target::Host(value)
    }
}

/// Handle allocator with slot recycling.
#[derive(Debug, Default)]
pub struct Allocator {
    /// Current generation of every slot ever allocated.
    generations: Vec<Generation>,

    /// Released slots, reused oldest first.
    dead_pool: VecDeque<Index>,
}

impl Allocator {
    pub const fn new() -> Self {
        Self {
            generations: Vec::new(),
            dead_pool: VecDeque::new(),
        }
    }

    /// Allocate a handle, reusing a released slot when one is available.
    pub fn alloc(&mut self) -> Handle {
        if let Some(index) = self.dead_pool.pop_front() {
            return Handle::new(index, self.generations[index.0 as usize]);
        }

        let index = Index(self.generations.len() as u32);
        self.generations.push(Generation::FIRST);
        Handle::new(index, Generation::FIRST)
    }

    /// Release a handle's slot. Returns false if the handle does not carry the
    /// slot's current generation (already freed or never issued).
    pub fn free(&mut self, handle: Handle) -> bool {
        match self.generations.get_mut(handle.slot()) {
            Some(generation) if *generation == handle.generation => {
                *generation = generation.next();
                self.dead_pool.push_back(handle.index);
                true
            }
            _ => false,
        }
    }

    /// The current generation of a slot, if it was ever allocated.
    #[inline]
    pub fn current(&self, index: Index) -> Option<Generation> {
        self.generations.get(index.0 as usize).copied()
    }

    /// Number of slots ever allocated.
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }

    /// Number of released slots waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.dead_pool.len()
    }
}

#[test]
fn allocator_uniqueness() {
    // Given
    let mut allocator = Allocator::default();

    // When
    let mut handles: Vec<_> = (0..200).map(|_| allocator.alloc()).collect();

    // Then - No dupes generated
    let pre_len = handles.len();
    handles.sort();
    handles.dedup();
    assert_eq!(pre_len, handles.len());
}

#[test]
fn allocator_reuses_in_release_order() {
    // Given
    let mut allocator = Allocator::new();
    let a = allocator.alloc();
    let b = allocator.alloc();
    let c = allocator.alloc();

    // When
    allocator.free(c);
    allocator.free(a);

    // Then - Oldest release first, with the next generation
    let first = allocator.alloc();
    let second = allocator.alloc();
    assert_eq!(first.index(), c.index());
    assert_eq!(second.index(), a.index());
    assert_eq!(first.generation(), Generation(1));
    assert_eq!(allocator.pooled(), 0);

    // And a fresh slot once the pool is empty
    let fresh = allocator.alloc();
    assert_eq!(fresh.index(), Index(3));
    assert_eq!(fresh.generation(), Generation::FIRST);
    assert_ne!(b, fresh);
}

#[test]
fn allocator_free_rejects_stale_handle() {
    // Given
    let mut allocator = Allocator::new();
    let handle = allocator.alloc();

    // When
    let first = allocator.free(handle);
    let second = allocator.free(handle);

    // Then
    assert!(first);
    assert!(!second);
    assert_eq!(allocator.pooled(), 1);
    assert_eq!(allocator.current(handle.index()), Some(Generation(1)));
    assert_eq!(allocator.current(Index(9)), None);
}

#[test]
fn handle_display() {
    let handle = Handle::new(Index(4), Generation(2));
    assert_eq!(handle.to_string(), "entity 4v2");
}
