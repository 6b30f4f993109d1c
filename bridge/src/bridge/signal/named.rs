//! User-defined signals addressed by name to a set of entities.
//!
//! Named signals complement the lifecycle signals: gameplay code raises
//! `"door_opened"` for the entities involved, immediately, after a delay, or
//! deferred through the mutation queue. Every entity remembers which names
//! were raised for it during the current frame (see [`Lookup`]).

use std::{collections::HashMap, sync::Arc, time::Duration};

use log::{debug, warn};

use crate::bridge::entity::Handle;

type Callback = Box<dyn FnMut(&str, &[Handle])>;

/// Identifies a named-signal subscription for later removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    name: Arc<str>,
    id: u64,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
struct Delayed {
    name: Arc<str>,
    entities: Vec<Handle>,
    due: Duration,
}

/// Per-frame record of which signal names were raised for which entity.
///
/// Names are interned to single bits, so at most [`Lookup::MAX_NAMES`]
/// distinct names can be tracked between resets.
#[derive(Debug, Default)]
pub struct Lookup {
    names: Vec<Arc<str>>,
    entity_signals: HashMap<Handle, u64>,
}

impl Lookup {
    pub const MAX_NAMES: usize = 64;

    /// The bit for a name, interning it if needed. Returns 0 once
    /// [`Lookup::MAX_NAMES`] names are in use.
    pub fn get_or_add(&mut self, name: &str) -> u64 {
        if let Some(index) = self.names.iter().position(|n| &**n == name) {
            return 1 << index;
        }
        if self.names.len() >= Self::MAX_NAMES {
            warn!("Signal lookup is full, `{}` will not be tracked", name);
            return 0;
        }
        self.names.push(Arc::from(name));
        1 << (self.names.len() - 1)
    }

    pub fn add_to_entity(&mut self, entity: Handle, flag: u64) {
        if flag != 0 {
            *self.entity_signals.entry(entity).or_default() |= flag;
        }
    }

    /// Names raised for an entity since the last reset, in interning order.
    pub fn signals_for(&self, entity: Handle) -> Vec<&str> {
        let Some(&mask) = self.entity_signals.get(&entity) else {
            return Vec::new();
        };
        self.names
            .iter()
            .enumerate()
            .filter(|(index, _)| mask & (1 << index) != 0)
            .map(|(_, name)| &**name)
            .collect()
    }

    pub fn reset(&mut self) {
        self.names.clear();
        self.entity_signals.clear();
    }
}

/// Named-signal listeners, pending delayed signals, and the frame lookup.
#[derive(Default)]
pub struct Signals {
    listeners: HashMap<Arc<str>, Vec<(u64, Callback)>>,
    delayed: Vec<Delayed>,
    lookup: Lookup,
    next_id: u64,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, name: &str, listener: F) -> Subscription
    where
        F: FnMut(&str, &[Handle]) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        let name: Arc<str> = Arc::from(name);
        self.listeners
            .entry(name.clone())
            .or_default()
            .push((id, Box::new(listener)));
        Subscription { name, id }
    }

    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        let Some(listeners) = self.listeners.get_mut(&subscription.name) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription.id);
        before != listeners.len()
    }

    /// Raise a signal for entities now. Returns the number of listeners invoked.
    pub fn signal(&mut self, name: &str, entities: &[Handle]) -> usize {
        if entities.is_empty() {
            debug!("Ignoring signal [{}] raised for no entities", name);
            return 0;
        }

        let flag = self.lookup.get_or_add(name);
        for &entity in entities {
            self.lookup.add_to_entity(entity, flag);
        }

        match entities {
            [entity] => debug!("Raising signal [{}] to {}", name, entity),
            _ => debug!("Raising signal [{}] to {} entities", name, entities.len()),
        }

        let Some(listeners) = self.listeners.get_mut(name) else {
            return 0;
        };
        for (_, listener) in listeners.iter_mut() {
            listener(name, entities);
        }
        listeners.len()
    }

    /// Schedule a signal to be raised once the frame clock reaches `now + delay`.
    pub fn delay(&mut self, name: &str, entities: Vec<Handle>, delay: Duration, now: Duration) {
        debug!(
            "Delay signal [{}] to {} entities in {:.2}s",
            name,
            entities.len(),
            delay.as_secs_f64()
        );
        self.delayed.push(Delayed {
            name: Arc::from(name),
            entities,
            due: now + delay,
        });
    }

    /// Raise every delayed signal that is due, dropping entities that are no
    /// longer live. Returns the number of signals raised.
    pub fn tick(&mut self, now: Duration, is_live: impl Fn(Handle) -> bool) -> usize {
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.delayed)
            .into_iter()
            .partition(|delayed| delayed.due <= now);
        self.delayed = pending;

        let mut raised = 0;
        for delayed in due {
            let entities: Vec<Handle> = delayed
                .entities
                .into_iter()
                .filter(|&handle| is_live(handle))
                .collect();
            if entities.is_empty() {
                debug!("Dropping signal [{}], no live entities remain", delayed.name);
                continue;
            }
            self.signal(&delayed.name, &entities);
            raised += 1;
        }
        raised
    }

    /// Delayed signals not yet raised.
    pub fn pending(&self) -> usize {
        self.delayed.len()
    }

    #[inline]
    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    /// Forget which names were raised this frame.
    pub fn end_frame(&mut self) {
        self.lookup.reset();
    }
}
