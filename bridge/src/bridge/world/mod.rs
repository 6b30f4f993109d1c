//! ECS-side storage for bound entities.
//!
//! Each bound entity owns a [`Row`] of component [`Slot`]s. A slot keeps the
//! current ECS value next to the value last agreed with the host object, which
//! is what synchronization compares against and what merge resolvers receive
//! as the common base.

use std::collections::BTreeMap;

use crate::bridge::{component, entity::Handle, value::Value};

/// A component value together with its last synchronized snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    value: Value,
    synced: Value,
}

impl Slot {
    pub fn new(value: Value) -> Self {
        Self {
            synced: value.clone(),
            value,
        }
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The value both sides agreed on at the last synchronization.
    #[inline]
    pub fn synced(&self) -> &Value {
        &self.synced
    }

    /// Whether the ECS side changed the value since the last synchronization.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.value != self.synced
    }

    pub(crate) fn set(&mut self, value: Value) {
        self.value = value;
    }

    pub(crate) fn settle(&mut self, value: Value) {
        self.synced = value.clone();
        self.value = value;
    }

    pub(crate) fn set_synced(&mut self, value: Value) {
        self.synced = value;
    }
}

/// The components of one entity.
#[derive(Debug, Clone)]
pub struct Row {
    handle: Handle,
    slots: BTreeMap<component::Id, Slot>,
}

impl Row {
    fn new(handle: Handle) -> Self {
        Self {
            handle,
            slots: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn get(&self, component: component::Id) -> Option<&Value> {
        self.slots.get(&component).map(Slot::value)
    }

    /// Mutable access to a component value, as an ECS system would write it.
    /// The change is pushed to the host at the next synchronization.
    pub fn get_mut(&mut self, component: component::Id) -> Option<&mut Value> {
        self.slots.get_mut(&component).map(|slot| &mut slot.value)
    }

    pub fn slot(&self, component: component::Id) -> Option<&Slot> {
        self.slots.get(&component)
    }

    pub(crate) fn slot_mut(&mut self, component: component::Id) -> Option<&mut Slot> {
        self.slots.get_mut(&component)
    }

    #[inline]
    pub fn contains(&self, component: component::Id) -> bool {
        self.slots.contains_key(&component)
    }

    /// Components in id order.
    pub fn components(&self) -> impl Iterator<Item = (component::Id, &Value)> {
        self.slots.iter().map(|(id, slot)| (*id, slot.value()))
    }

    /// Owned copy of every component value.
    pub fn snapshot(&self) -> Vec<(component::Id, Value)> {
        self.slots
            .iter()
            .map(|(id, slot)| (*id, slot.value.clone()))
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert or overwrite a component. Returns true if the component is new.
    pub(crate) fn insert(&mut self, component: component::Id, value: Value) -> bool {
        match self.slots.get_mut(&component) {
            Some(slot) => {
                slot.settle(value);
                false
            }
            None => {
                self.slots.insert(component, Slot::new(value));
                true
            }
        }
    }

    pub(crate) fn remove(&mut self, component: component::Id) -> Option<Value> {
        self.slots.remove(&component).map(|slot| slot.value)
    }
}

/// Entity rows indexed by handle slot.
#[derive(Debug, Default)]
pub struct World {
    rows: Vec<Option<Row>>,
    len: usize,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty row for a handle. Returns false if the slot is occupied.
    pub(crate) fn spawn(&mut self, handle: Handle) -> bool {
        let slot = handle.slot();
        if self.rows.len() <= slot {
            self.rows.resize_with(slot + 1, || None);
        }
        if self.rows[slot].is_some() {
            return false;
        }
        self.rows[slot] = Some(Row::new(handle));
        self.len += 1;
        true
    }

    /// Remove a handle's row, returning it if the handle matched.
    pub(crate) fn despawn(&mut self, handle: Handle) -> Option<Row> {
        let slot = self.rows.get_mut(handle.slot())?;
        if slot.as_ref().is_none_or(|row| row.handle != handle) {
            return None;
        }
        self.len -= 1;
        slot.take()
    }

    pub fn row(&self, handle: Handle) -> Option<&Row> {
        self.rows
            .get(handle.slot())?
            .as_ref()
            .filter(|row| row.handle == handle)
    }

    pub fn row_mut(&mut self, handle: Handle) -> Option<&mut Row> {
        self.rows
            .get_mut(handle.slot())?
            .as_mut()
            .filter(|row| row.handle == handle)
    }

    #[inline]
    pub fn contains(&self, handle: Handle) -> bool {
        self.row(handle).is_some()
    }

    pub fn get(&self, handle: Handle, component: component::Id) -> Option<&Value> {
        self.row(handle)?.get(component)
    }

    pub fn get_mut(&mut self, handle: Handle, component: component::Id) -> Option<&mut Value> {
        self.row_mut(handle)?.get_mut(component)
    }

    /// Insert or overwrite a component on a spawned entity.
    ///
    /// Returns `None` if the entity is not spawned, otherwise whether the
    /// component is new.
    pub(crate) fn insert(
        &mut self,
        handle: Handle,
        component: component::Id,
        value: Value,
    ) -> Option<bool> {
        Some(self.row_mut(handle)?.insert(component, value))
    }

    pub(crate) fn remove(&mut self, handle: Handle, component: component::Id) -> Option<Value> {
        self.row_mut(handle)?.remove(component)
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().flatten()
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut Row> {
        self.rows.iter_mut().flatten()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
