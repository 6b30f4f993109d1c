//! Deferred structural changes.
//!
//! Creation, destruction and component changes requested from listeners or
//! from other threads are queued here and applied by the coordinator at the
//! next flush, in the order they were submitted.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crossbeam::queue::SegQueue;

use crate::bridge::{
    component,
    entity::{Handle, Target},
    host,
    value::Value,
};

/// A queued structural change.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Bind a host object.
    Create { host: host::Ref },
    /// Tear down an entity, addressed by handle or by its host object.
    Destroy { target: Target },
    AddComponent {
        handle: Handle,
        component: component::Id,
        value: Value,
    },
    RemoveComponent {
        handle: Handle,
        component: component::Id,
    },
    /// Raise a named signal in the next reaction phase, or `delay` after it.
    Signal {
        name: Arc<str>,
        entities: Vec<Handle>,
        delay: Option<Duration>,
    },
}

impl Mutation {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Create { .. } => "create",
            Mutation::Destroy { .. } => "destroy",
            Mutation::AddComponent { .. } => "add component",
            Mutation::RemoveComponent { .. } => "remove component",
            Mutation::Signal { .. } => "signal",
        }
    }
}

/// A mutation tagged with its submission sequence number.
#[derive(Debug, Clone)]
pub struct Pending {
    pub sequence: u64,
    pub mutation: Mutation,
}

/// Multi-producer queue of pending mutations.
///
/// Producers on any thread push concurrently. Each mutation is stamped with a
/// global sequence number on entry and [`Queue::drain`] returns them sorted by
/// it, so the order of application is the order of submission even across
/// threads.
///
/// A sequence number is taken before its mutation lands in the queue. When a
/// drain sees a gap, everything after it is held back for the next drain.
#[derive(Debug, Default)]
pub struct Queue {
    pending: SegQueue<Pending>,
    sequence: AtomicU64,
    /// Next sequence number a drain may hand out.
    next: AtomicU64,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mutation. Returns its sequence number.
    pub fn enqueue(&self, mutation: Mutation) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.pending.push(Pending { sequence, mutation });
        sequence
    }

    /// Take every pending mutation in submission order, up to the first
    /// sequence number that has been claimed but not yet pushed.
    pub fn drain(&self) -> Vec<Pending> {
        let mut drained = Vec::with_capacity(self.pending.len());
        while let Some(pending) = self.pending.pop() {
            drained.push(pending);
        }
        drained.sort_by_key(|pending| pending.sequence);

        let mut next = self.next.load(Ordering::Acquire);
        let ready = drained
            .iter()
            .take_while(|pending| {
                let contiguous = pending.sequence == next;
                next += u64::from(contiguous);
                contiguous
            })
            .count();
        for held in drained.split_off(ready) {
            self.pending.push(held);
        }
        self.next.store(next, Ordering::Release);
        drained
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A cloneable, thread-safe handle for submitting mutations.
///
/// Host runtimes keep one of these to report object creation and destruction
/// from whatever thread they happen on.
#[derive(Debug, Clone, Default)]
pub struct Mutations {
    queue: Arc<Queue>,
}

impl Mutations {
    pub(crate) fn new(queue: Arc<Queue>) -> Self {
        Self { queue }
    }

    pub fn enqueue(&self, mutation: Mutation) -> u64 {
        self.queue.enqueue(mutation)
    }

    pub fn create(&self, host: host::Ref) -> u64 {
        self.enqueue(Mutation::Create { host })
    }

    pub fn destroy(&self, handle: Handle) -> u64 {
        self.enqueue(Mutation::Destroy {
            target: Target::Handle(handle),
        })
    }

    /// Report that a host object was destroyed on the host side.
    pub fn host_destroyed(&self, host: host::Id) -> u64 {
        self.enqueue(Mutation::Destroy {
            target: Target::Host(host),
        })
    }

    pub fn add_component(&self, handle: Handle, component: component::Id, value: Value) -> u64 {
        self.enqueue(Mutation::AddComponent {
            handle,
            component,
            value,
        })
    }

    pub fn remove_component(&self, handle: Handle, component: component::Id) -> u64 {
        self.enqueue(Mutation::RemoveComponent { handle, component })
    }

    pub fn signal(&self, name: impl Into<Arc<str>>, entities: Vec<Handle>) -> u64 {
        self.enqueue(Mutation::Signal {
            name: name.into(),
            entities,
            delay: None,
        })
    }

    pub fn delay_signal(
        &self,
        name: impl Into<Arc<str>>,
        entities: Vec<Handle>,
        delay: Duration,
    ) -> u64 {
        self.enqueue(Mutation::Signal {
            name: name.into(),
            entities,
            delay: Some(delay),
        })
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
