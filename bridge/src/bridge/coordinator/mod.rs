//! The bridge coordinator.
//!
//! [`Coordinator`] owns the registry, the ECS world, the binding table, the
//! signal bus and the mutation queue, and is the only place structural
//! changes happen.
//!
//! # Frame Model
//!
//! ```text
//! step(delta)
//!   ├─► flush()             structural: reap dropped hosts, apply queued mutations
//!   ├─► synchronize_all()   synchronization: move values across bindings
//!   └─► dispatch()          reaction: deliver signals raised this frame, end the frame
//! ```
//!
//! Lifecycle operations performed during the structural phase queue their
//! signals, and [`Coordinator::dispatch`] delivers them. Listeners only get a
//! read-only [`Context`]; anything structural they want is queued and lands in
//! the next frame's flush.

mod report;

use std::{
    collections::VecDeque, marker::PhantomData, panic, sync::Arc, time::Duration,
};

use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{debug, error, trace, warn};

pub use report::{DispatchReport, FlushReport, FrameReport, Incident};

use crate::{
    bridge::{
        binding::{self, Direction, Resolvers, SyncReport},
        component,
        config::Config,
        entity::{self, Handle, Lifecycle, Target},
        error::{Error, Result},
        host,
        mutation::{self, Mutation, Mutations, Pending},
        signal::{
            Bus, Context, Kind, Listener, ListenerError, ListenerFailure, Signal, Subscription,
            named,
        },
        value::Value,
        world::{Row, World},
    },
    core::frame::{Frame, Phase},
};

/// Mirrors host objects into an ECS world and keeps the two consistent.
///
/// The coordinator is single-threaded and stays on the thread that created it.
/// Other threads submit work through [`Mutations`], obtained from
/// [`Coordinator::mutations`].
pub struct Coordinator {
    config: Config,
    registry: entity::Registry,
    world: World,
    bindings: binding::Table,
    bus: Bus,
    named: named::Signals,
    queue: Arc<mutation::Queue>,

    /// Lifecycle signals raised this frame, delivered at dispatch.
    outbox: VecDeque<Signal>,

    frame: Frame,
    incidents: Option<Sender<Incident>>,

    /// Marker to make the coordinator !Send.
    _not_send: PhantomData<*mut ()>,
}

impl Coordinator {
    pub fn new(bindings: binding::Table) -> Self {
        Self::with_config(bindings, Config::default())
    }

    /// Create a coordinator using `config` for runtime settings. The bindings
    /// listed in `config` are ignored; see [`Coordinator::from_config`].
    pub fn with_config(bindings: binding::Table, config: Config) -> Self {
        Self {
            config,
            registry: entity::Registry::new(),
            world: World::new(),
            bindings,
            bus: Bus::new(),
            named: named::Signals::new(),
            queue: Arc::new(mutation::Queue::new()),
            outbox: VecDeque::new(),
            frame: Frame::new(),
            incidents: None,
            _not_send: PhantomData,
        }
    }

    /// Create a coordinator with the bindings and settings of `config`.
    pub fn from_config(config: Config, resolvers: &Resolvers) -> Result<Self> {
        let bindings = binding::Table::from_config(&config.bindings, resolvers)?;
        Ok(Self::with_config(bindings, config))
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    #[inline]
    pub fn registry(&self) -> &entity::Registry {
        &self.registry
    }

    #[inline]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to component values. Entity structure can only change
    /// through the coordinator.
    #[inline]
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[inline]
    pub fn bindings(&self) -> &binding::Table {
        &self.bindings
    }

    /// Receive incidents from now on. Replaces any earlier receiver.
    pub fn incidents(&mut self) -> Receiver<Incident> {
        let (sender, receiver) = unbounded();
        self.incidents = Some(sender);
        receiver
    }

    fn report(&self, incident: Incident) {
        if let Some(sender) = &self.incidents {
            let _ = sender.send(incident);
        }
    }

    // ==================== Components ====================

    pub fn component_id(&self, name: &str) -> Option<component::Id> {
        self.bindings.components().get(name)
    }

    /// Register a component name that is not fed by a binding.
    pub fn register_component(&self, name: &str) -> component::Id {
        self.bindings.components().register(name)
    }

    /// A component of a bound entity.
    pub fn component(&self, handle: Handle, component: component::Id) -> Option<&Value> {
        if !self.registry.is_bound(handle) {
            return None;
        }
        self.world.get(handle, component)
    }

    pub fn component_mut(
        &mut self,
        handle: Handle,
        component: component::Id,
    ) -> Option<&mut Value> {
        if !self.registry.is_bound(handle) {
            return None;
        }
        self.world.get_mut(handle, component)
    }

    /// Add a component to a bound entity, or overwrite it if present. Returns
    /// true and raises `ComponentAdded` if the component is new.
    pub fn add_component(
        &mut self,
        handle: Handle,
        component: component::Id,
        value: Value,
    ) -> Result<bool> {
        self.registry.bound(handle)?;
        let added = self
            .world
            .insert(handle, component, value.clone())
            .ok_or(Error::NotBound(Target::Handle(handle)))?;
        if added {
            self.outbox.push_back(Signal::ComponentAdded {
                handle,
                component,
                value,
            });
        }
        Ok(added)
    }

    /// Remove a component from a bound entity. Raises `ComponentRemoved` if
    /// the component was present.
    pub fn remove_component(
        &mut self,
        handle: Handle,
        component: component::Id,
    ) -> Result<Option<Value>> {
        self.registry.bound(handle)?;
        let removed = self.world.remove(handle, component);
        if let Some(value) = &removed {
            self.outbox.push_back(Signal::ComponentRemoved {
                handle,
                component,
                value: value.clone(),
            });
        }
        Ok(removed)
    }

    // ==================== Lifecycle ====================

    /// Bind a host object: allocate its handle, materialize its bound
    /// capabilities as components and raise `EntityCreated` followed by one
    /// `ComponentAdded` per component.
    ///
    /// A capability that fails to read leaves the entity bound without that
    /// component and marks it degraded. If the host object is dropped while
    /// binding, the entity still completes binding and is then torn down.
    pub fn bind(&mut self, host: &host::Ref) -> Result<Handle> {
        let object = host.upgrade().ok_or(Error::HostDropped(host.id()))?;
        let handle = self.registry.bind(host)?;

        self.world.spawn(handle);
        let materialized = match self.world.row_mut(handle) {
            Some(row) => self.bindings.materialize(handle, object.as_ref(), row),
            None => binding::Materialized::default(),
        };
        drop(object);

        self.registry.set_state(handle, Lifecycle::Bound)?;
        if !materialized.is_complete() {
            self.registry.mark_degraded(handle);
            for failure in materialized.failures {
                warn!("{}", failure);
                self.report(Incident::Materialization(failure));
            }
        }

        self.outbox.push_back(Signal::EntityCreated {
            handle,
            host: host.id(),
        });
        for component in materialized.components {
            if let Some(value) = self.world.get(handle, component) {
                self.outbox.push_back(Signal::ComponentAdded {
                    handle,
                    component,
                    value: value.clone(),
                });
            }
        }
        debug!("Bound {} to {}", host.id(), handle);

        if !host.is_alive() {
            debug!("{} was dropped while binding, tearing down {}", host.id(), handle);
            self.unbind(handle)?;
        }
        Ok(handle)
    }

    /// Tear down a bound entity: raise `EntityDestroying` with its final
    /// components, remove it from the world and invalidate its handle.
    pub fn unbind(&mut self, handle: Handle) -> Result<()> {
        let entry = self.registry.bound(handle)?;
        let host = entry.host().id();
        self.registry.set_state(handle, Lifecycle::Unbinding)?;

        let components = self
            .world
            .row(handle)
            .map(Row::snapshot)
            .unwrap_or_default();
        self.outbox.push_back(Signal::EntityDestroying {
            handle,
            host,
            components,
        });

        self.world.despawn(handle);
        self.registry.unbind(handle)?;
        debug!("Unbound {} from {}", host, handle);
        Ok(())
    }

    /// Tear down the entity bound to a host object.
    pub fn unbind_host(&mut self, host: host::Id) -> Result<()> {
        let handle = self
            .registry
            .lookup_id(host)
            .ok_or(Error::NotBound(Target::Host(host)))?;
        self.unbind(handle)
    }

    /// Tear down every binding whose host object has been dropped. Returns
    /// the number of bindings removed.
    pub fn reap(&mut self) -> usize {
        let orphans = self.registry.orphans();
        let mut reaped = 0;
        for handle in orphans {
            match self.unbind(handle) {
                Ok(()) => reaped += 1,
                Err(e) => warn!("Failed to reap {}: {}", handle, e),
            }
        }
        if reaped > 0 {
            debug!("Reaped {} binding(s) with dropped hosts", reaped);
        }
        reaped
    }

    #[inline]
    pub fn lookup(&self, host: &host::Ref) -> Option<Handle> {
        self.registry.lookup(host)
    }

    #[inline]
    pub fn resolve(&self, handle: Handle) -> Option<&host::Ref> {
        self.registry.resolve(handle)
    }

    #[inline]
    pub fn state_of(&self, host: host::Id) -> Lifecycle {
        self.registry.state_of(host)
    }

    #[inline]
    pub fn is_degraded(&self, handle: Handle) -> bool {
        self.registry.is_degraded(handle)
    }

    /// Number of live bindings.
    #[inline]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    // ==================== Mutations ====================

    /// A thread-safe handle for queueing mutations.
    pub fn mutations(&self) -> Mutations {
        Mutations::new(self.queue.clone())
    }

    pub fn enqueue(&self, mutation: Mutation) -> u64 {
        self.queue.enqueue(mutation)
    }

    /// Apply every queued mutation in submission order.
    ///
    /// Bindings whose host object was dropped are reaped first. Mutations
    /// whose target is already gone are counted as stale and skipped; other
    /// failures are collected in the report. Only one flush is allowed per
    /// frame.
    pub fn flush(&mut self) -> Result<FlushReport> {
        if self.frame.is_flushed() {
            return Err(Error::AlreadyFlushed(self.frame.number()));
        }
        self.frame.enter(Phase::Structural);
        self.frame.mark_flushed();

        let mut report = FlushReport {
            reaped: self.reap(),
            ..Default::default()
        };
        for pending in self.queue.drain() {
            self.apply(pending, &mut report);
        }

        trace!(
            "Flushed frame {}: {} applied, {} stale, {} rejected",
            self.frame.number(),
            report.applied,
            report.stale,
            report.rejected.len()
        );
        Ok(report)
    }

    fn apply(&mut self, pending: Pending, report: &mut FlushReport) {
        let Pending { sequence, mutation } = pending;
        let kind = mutation.name();

        let result = match mutation {
            Mutation::Create { host } => self.bind(&host).map(drop),
            Mutation::Destroy {
                target: Target::Handle(handle),
            } => self.unbind(handle),
            Mutation::Destroy {
                target: Target::Host(host),
            } => self.unbind_host(host),
            Mutation::AddComponent {
                handle,
                component,
                value,
            } => self.add_component(handle, component, value).map(drop),
            Mutation::RemoveComponent { handle, component } => {
                self.remove_component(handle, component).map(drop)
            }
            Mutation::Signal {
                name,
                entities,
                delay,
            } => {
                self.named
                    .delay(&name, entities, delay.unwrap_or_default(), self.frame.time());
                Ok(())
            }
        };

        match result {
            Ok(()) => report.applied += 1,
            Err(error) if error.is_stale() => {
                if self.config.queue.warn_on_stale {
                    warn!("Skipping stale {} mutation #{}: {}", kind, sequence, error);
                } else {
                    debug!("Skipping stale {} mutation #{}: {}", kind, sequence, error);
                }
                report.stale += 1;
                self.report(Incident::StaleMutation { sequence, error });
            }
            Err(error) => {
                warn!("Rejected {} mutation #{}: {}", kind, sequence, error);
                self.report(Incident::Rejected {
                    sequence,
                    error: error.clone(),
                });
                report.rejected.push(error);
            }
        }
    }

    // ==================== Synchronization ====================

    /// Synchronize one entity with its host object.
    pub fn synchronize(&mut self, handle: Handle, direction: Direction) -> Result<SyncReport> {
        let host = self.registry.bound(handle)?.host();
        let object = host.upgrade().ok_or(Error::HostDropped(host.id()))?;
        let row = self
            .world
            .row_mut(handle)
            .ok_or(Error::NotBound(Target::Handle(handle)))?;
        let report = self
            .bindings
            .synchronize(handle, object.as_ref(), row, direction);
        self.log_sync_failures(&report);
        Ok(report)
    }

    /// Synchronize every bound entity.
    ///
    /// Above the configured threshold the entities are split into chunks and
    /// synchronized on scoped worker threads. Each entity is visited by
    /// exactly one worker.
    pub fn synchronize_all(&mut self, direction: Direction) -> SyncReport {
        self.frame.enter(Phase::Synchronization);
        let workers = self.config.sync.workers.max(1);
        let threshold = self.config.sync.parallel_threshold;

        let registry = &self.registry;
        let bindings = &self.bindings;
        let mut rows: Vec<&mut Row> = self
            .world
            .rows_mut()
            .filter(|row| registry.is_bound(row.handle()))
            .collect();

        let mut report = SyncReport::default();
        if workers == 1 || rows.is_empty() || rows.len() < threshold {
            for row in rows {
                if let Some(partial) = synchronize_row(registry, bindings, row, direction) {
                    report.merge(partial);
                }
            }
        } else {
            let chunk_size = rows.len().div_ceil(workers);
            let partials = crossbeam::thread::scope(|scope| {
                let handles: Vec<_> = rows
                    .chunks_mut(chunk_size)
                    .map(|chunk| {
                        scope.spawn(move |_| {
                            let mut partial = SyncReport::default();
                            for row in chunk.iter_mut() {
                                if let Some(r) =
                                    synchronize_row(registry, bindings, row, direction)
                                {
                                    partial.merge(r);
                                }
                            }
                            partial
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|payload| panic::resume_unwind(payload));

            for partial in partials {
                match partial {
                    Ok(partial) => report.merge(partial),
                    Err(payload) => panic::resume_unwind(payload),
                }
            }
        }

        self.log_sync_failures(&report);
        report
    }

    fn log_sync_failures(&self, report: &SyncReport) {
        for failure in &report.failures {
            warn!("{}", failure);
            self.report(Incident::Synchronization(failure.clone()));
        }
    }

    // ==================== Signals ====================

    /// Subscribe to a lifecycle signal kind.
    pub fn subscribe<F>(&self, kind: Kind, listener: F) -> Subscription
    where
        F: FnMut(&Signal, &Context<'_>) -> std::result::Result<(), ListenerError> + 'static,
    {
        self.bus.subscribe(kind, listener)
    }

    pub fn subscribe_listener<L>(&self, kind: Kind, listener: L) -> Subscription
    where
        L: Listener + 'static,
    {
        self.bus.subscribe_listener(kind, listener)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.bus.unsubscribe(subscription)
    }

    /// Deliver a lifecycle signal immediately, outside the frame's outbox.
    pub fn publish(&self, signal: &Signal) -> Result<Vec<ListenerFailure>> {
        self.bus.publish(signal, &self.context())
    }

    fn context(&self) -> Context<'_> {
        Context::new(
            &self.bus,
            &self.registry,
            &self.world,
            self.bindings.components(),
            &self.queue,
        )
    }

    /// Signals raised this frame and not yet delivered.
    pub fn pending_signals(&self) -> impl Iterator<Item = &Signal> {
        self.outbox.iter()
    }

    /// Deliver this frame's signals and end the frame.
    ///
    /// Lifecycle signals go out in the order they were raised, then due named
    /// signals. A failing listener marks its entity degraded and delivery
    /// continues. If any listener reported corrupted state, the whole batch of
    /// failures is returned as [`Error::ListenerFailure`] after delivery.
    pub fn dispatch(&mut self) -> Result<DispatchReport> {
        self.frame.enter(Phase::Reaction);
        let signals: Vec<Signal> = self.outbox.drain(..).collect();

        let mut failures = Vec::new();
        {
            let cx = self.context();
            for signal in &signals {
                failures.extend(self.bus.publish(signal, &cx)?);
            }
        }

        let now = self.frame.time();
        let registry = &self.registry;
        let named = self.named.tick(now, |handle| registry.is_bound(handle));

        let mut corrupted = false;
        for failure in &failures {
            self.registry.mark_degraded(failure.handle);
            if failure.error.is_corrupted() {
                corrupted = true;
                error!("{}", failure);
            } else {
                warn!("{}", failure);
            }
            self.report(Incident::Listener(failure.clone()));
        }

        self.end_frame();

        if corrupted {
            return Err(Error::ListenerFailure(failures));
        }
        Ok(DispatchReport {
            delivered: signals.len(),
            named,
            failures,
        })
    }

    fn end_frame(&mut self) {
        self.named.end_frame();
        self.frame = self.frame.next();
    }

    /// Run one full frame: flush, synchronize in both directions, dispatch.
    ///
    /// The flush is skipped if the queue was already flushed this frame.
    pub fn step(&mut self, delta: Duration) -> Result<FrameReport> {
        self.frame.advance(delta);
        let frame = self.frame.number();

        let flush = if self.frame.is_flushed() {
            FlushReport::default()
        } else {
            self.flush()?
        };
        let sync = self.synchronize_all(Direction::Bidirectional);
        let dispatch = self.dispatch()?;

        debug!(
            "Frame {}: {} mutation(s), {} entities synchronized, {} signal(s)",
            frame,
            flush.applied,
            sync.entities,
            dispatch.delivered + dispatch.named
        );
        Ok(FrameReport {
            frame,
            flush,
            sync,
            dispatch,
        })
    }

    // ==================== Named signals ====================

    pub fn subscribe_named<F>(&mut self, name: &str, listener: F) -> named::Subscription
    where
        F: FnMut(&str, &[Handle]) + 'static,
    {
        self.named.subscribe(name, listener)
    }

    pub fn unsubscribe_named(&mut self, subscription: &named::Subscription) -> bool {
        self.named.unsubscribe(subscription)
    }

    /// Raise a named signal now for the bound entities among `entities`.
    pub fn signal(&mut self, name: &str, entities: &[Handle]) -> usize {
        let live: Vec<Handle> = entities
            .iter()
            .copied()
            .filter(|&handle| self.registry.is_bound(handle))
            .collect();
        self.named.signal(name, &live)
    }

    /// Raise a named signal once the frame clock has advanced by `delay`.
    pub fn delay_signal(&mut self, name: &str, entities: Vec<Handle>, delay: Duration) {
        self.named.delay(name, entities, delay, self.frame.time());
    }

    #[inline]
    pub fn named(&self) -> &named::Signals {
        &self.named
    }
}

fn synchronize_row(
    registry: &entity::Registry,
    bindings: &binding::Table,
    row: &mut Row,
    direction: Direction,
) -> Option<SyncReport> {
    let object = registry.resolve(row.handle())?.upgrade()?;
    Some(bindings.synchronize(row.handle(), object.as_ref(), row, direction))
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        rc::Rc,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::bridge::{
        binding::ConflictPolicy,
        config::SyncConfig,
        host::{AccessError, Capability, HostObject, PropertyObject},
    };

    fn table() -> binding::Table {
        let mut table = binding::Table::new();
        table
            .register(
                "transform",
                "Position",
                Direction::Bidirectional,
                ConflictPolicy::HostWins,
            )
            .unwrap();
        table
            .register("health", "Health", Direction::HostToEcs, ConflictPolicy::HostWins)
            .unwrap();
        table
    }

    fn actor(id: u64) -> Arc<PropertyObject> {
        Arc::new(
            PropertyObject::new(id)
                .with("transform", [1.0, 2.0, 3.0])
                .with("health", 100i64),
        )
    }

    /// Host object kept alive only by itself, released on its first read.
    struct Transient {
        owner: Mutex<Option<Arc<Transient>>>,
    }

    impl Transient {
        fn spawn() -> host::Ref {
            let object = Arc::new(Transient {
                owner: Mutex::new(None),
            });
            *object.owner.lock().unwrap() = Some(object.clone());
            host::Ref::new(&object)
        }
    }

    impl HostObject for Transient {
        fn id(&self) -> host::Id {
            host::Id::new(9)
        }

        fn has_capability(&self, capability: &Capability) -> bool {
            matches!(capability.name(), "transform" | "health")
        }

        fn read(&self, capability: &Capability) -> std::result::Result<Value, AccessError> {
            let released = self.owner.lock().unwrap().take();
            drop(released);
            match capability.name() {
                "transform" => Ok(Value::Vec3([0.0; 3])),
                _ => Ok(Value::Int(1)),
            }
        }

        fn write(&self, _: &Capability, _: Value) -> std::result::Result<(), AccessError> {
            Ok(())
        }
    }

    /// Host object that exposes `health` but cannot read it.
    struct Flaky;

    impl HostObject for Flaky {
        fn id(&self) -> host::Id {
            host::Id::new(7)
        }

        fn has_capability(&self, capability: &Capability) -> bool {
            matches!(capability.name(), "transform" | "health")
        }

        fn read(&self, capability: &Capability) -> std::result::Result<Value, AccessError> {
            match capability.name() {
                "transform" => Ok(Value::Vec3([0.0; 3])),
                _ => Err(AccessError::Rejected {
                    capability: capability.clone(),
                    reason: "locked".into(),
                }),
            }
        }

        fn write(&self, _: &Capability, _: Value) -> std::result::Result<(), AccessError> {
            Ok(())
        }
    }

    // ==================== Lifecycle ====================

    #[test]
    fn bind_materializes_components_and_queues_signals() {
        // Given
        let mut bridge = Coordinator::new(table());
        let host = actor(1);

        // When
        let handle = bridge.bind(&host::Ref::new(&host)).unwrap();

        // Then
        let position = bridge.component_id("Position").unwrap();
        let health = bridge.component_id("Health").unwrap();
        assert_eq!(
            bridge.component(handle, position),
            Some(&Value::Vec3([1.0, 2.0, 3.0]))
        );
        assert_eq!(bridge.component(handle, health), Some(&Value::Int(100)));
        assert_eq!(bridge.state_of(host.id()), Lifecycle::Bound);

        let kinds: Vec<Kind> = bridge.pending_signals().map(Signal::kind).collect();
        assert_eq!(
            kinds,
            vec![Kind::EntityCreated, Kind::ComponentAdded, Kind::ComponentAdded]
        );
    }

    #[test]
    fn bind_twice_is_rejected() {
        let mut bridge = Coordinator::new(table());
        let host = actor(1);
        let handle = bridge.bind(&host::Ref::new(&host)).unwrap();

        let result = bridge.bind(&host::Ref::new(&host));

        assert!(matches!(result, Err(Error::AlreadyBound { handle: h, .. }) if h == handle));
        assert_eq!(bridge.len(), 1);
    }

    #[test]
    fn bind_dropped_host_fails() {
        let mut bridge = Coordinator::new(table());
        let host = actor(1);
        let reference = host::Ref::new(&host);
        drop(host);

        assert!(matches!(bridge.bind(&reference), Err(Error::HostDropped(_))));
        assert!(bridge.is_empty());
    }

    #[test]
    fn host_dropped_while_binding_is_created_then_destroyed() {
        // Given
        let mut bridge = Coordinator::new(table());
        let host = Transient::spawn();

        // When
        let handle = bridge.bind(&host).unwrap();

        // Then
        assert!(!host.is_alive());
        assert_eq!(bridge.lookup(&host), None);
        assert!(bridge.resolve(handle).is_none());
        assert_eq!(bridge.state_of(host.id()), Lifecycle::Unbound);
        assert!(bridge.world().is_empty());

        let kinds: Vec<Kind> = bridge.pending_signals().map(Signal::kind).collect();
        assert_eq!(
            kinds,
            vec![
                Kind::EntityCreated,
                Kind::ComponentAdded,
                Kind::ComponentAdded,
                Kind::EntityDestroying,
            ]
        );
        assert!(
            bridge
                .pending_signals()
                .all(|signal| signal.handle() == handle)
        );
    }

    #[test]
    fn failed_read_degrades_entity() {
        // Given
        let mut bridge = Coordinator::new(table());
        let incidents = bridge.incidents();
        let host: Arc<dyn HostObject> = Arc::new(Flaky);

        // When
        let handle = bridge.bind(&host::Ref::from_dyn(&host)).unwrap();

        // Then
        assert!(bridge.is_degraded(handle));
        let health = bridge.component_id("Health").unwrap();
        assert_eq!(bridge.component(handle, health), None);
        assert!(matches!(
            incidents.try_recv(),
            Ok(Incident::Materialization(Error::Materialization { .. }))
        ));
    }

    #[test]
    fn unbind_raises_destroying_with_snapshot() {
        // Given
        let mut bridge = Coordinator::new(table());
        let host = actor(1);
        let reference = host::Ref::new(&host);
        let handle = bridge.bind(&reference).unwrap();
        bridge.dispatch().unwrap();

        // When
        bridge.unbind(handle).unwrap();

        // Then
        let signals: Vec<&Signal> = bridge.pending_signals().collect();
        assert_eq!(signals.len(), 1);
        match signals[0] {
            Signal::EntityDestroying { components, .. } => assert_eq!(components.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(bridge.lookup(&reference), None);
        assert!(bridge.resolve(handle).is_none());
        assert!(matches!(bridge.unbind(handle), Err(Error::StaleHandle(_))));
    }

    #[test]
    fn add_component_signals_only_when_new() {
        let mut bridge = Coordinator::new(table());
        let host = actor(1);
        let handle = bridge.bind(&host::Ref::new(&host)).unwrap();
        bridge.dispatch().unwrap();
        let tag = bridge.register_component("Tag");

        assert!(bridge.add_component(handle, tag, "enemy".into()).unwrap());
        assert!(!bridge.add_component(handle, tag, "boss".into()).unwrap());
        assert_eq!(bridge.pending_signals().count(), 1);
        assert_eq!(bridge.component(handle, tag), Some(&Value::from("boss")));

        assert_eq!(
            bridge.remove_component(handle, tag).unwrap(),
            Some(Value::from("boss"))
        );
        assert_eq!(bridge.remove_component(handle, tag).unwrap(), None);
        assert_eq!(bridge.pending_signals().count(), 2);
    }

    #[test]
    fn reap_unbinds_dropped_hosts() {
        let mut bridge = Coordinator::new(table());
        let kept = actor(1);
        let dropped = actor(2);
        bridge.bind(&host::Ref::new(&kept)).unwrap();
        let orphan = bridge.bind(&host::Ref::new(&dropped)).unwrap();
        drop(dropped);

        assert_eq!(bridge.reap(), 1);
        assert_eq!(bridge.len(), 1);
        assert!(!bridge.registry().is_bound(orphan));
    }

    // ==================== Flush ====================

    #[test]
    fn flush_applies_in_order_and_counts_stale() {
        // Given
        let mut bridge = Coordinator::new(table());
        let incidents = bridge.incidents();
        let host = actor(1);
        let handle = bridge.bind(&host::Ref::new(&host)).unwrap();
        let mutations = bridge.mutations();
        mutations.destroy(handle);
        mutations.destroy(handle);

        // When
        let report = bridge.flush().unwrap();

        // Then
        assert_eq!(report.applied, 1);
        assert_eq!(report.stale, 1);
        assert!(report.rejected.is_empty());
        assert!(bridge.is_empty());
        assert!(matches!(
            incidents.try_recv(),
            Ok(Incident::StaleMutation { sequence: 1, .. })
        ));
    }

    #[test]
    fn flush_collects_rejected_mutations() {
        let mut bridge = Coordinator::new(table());
        let host = actor(1);
        bridge.bind(&host::Ref::new(&host)).unwrap();
        bridge.mutations().create(host::Ref::new(&host));

        let report = bridge.flush().unwrap();

        assert_eq!(report.applied, 0);
        assert!(matches!(report.rejected[..], [Error::AlreadyBound { .. }]));
    }

    #[test]
    fn second_flush_in_a_frame_is_rejected() {
        let mut bridge = Coordinator::new(table());

        bridge.flush().unwrap();
        assert!(matches!(bridge.flush(), Err(Error::AlreadyFlushed(0))));

        bridge.dispatch().unwrap();
        assert!(bridge.flush().is_ok());
    }

    // ==================== Synchronization ====================

    #[test]
    fn host_wins_reverts_ecs_edit() {
        // Given
        let mut bridge = Coordinator::new(table());
        let host = actor(1);
        let handle = bridge.bind(&host::Ref::new(&host)).unwrap();
        let position = bridge.component_id("Position").unwrap();
        *bridge.component_mut(handle, position).unwrap() = Value::Vec3([9.0, 9.0, 9.0]);

        // When
        let report = bridge.synchronize(handle, Direction::Bidirectional).unwrap();

        // Then
        assert_eq!(report.conflicts, 1);
        assert_eq!(
            bridge.component(handle, position),
            Some(&Value::Vec3([1.0, 2.0, 3.0]))
        );
        assert_eq!(host.get("transform"), Some(Value::Vec3([1.0, 2.0, 3.0])));
    }

    #[test]
    fn parallel_pass_matches_sequential() {
        // Given
        let config = Config {
            sync: SyncConfig {
                workers: 4,
                parallel_threshold: 1,
            },
            ..Default::default()
        };
        let mut bridge = Coordinator::with_config(table(), config);
        let hosts: Vec<_> = (0..64).map(actor).collect();
        for host in &hosts {
            bridge.bind(&host::Ref::new(host)).unwrap();
        }
        for host in &hosts {
            host.set("health", 50i64);
        }

        // When
        let report = bridge.synchronize_all(Direction::Bidirectional);

        // Then
        assert_eq!(report.entities, 64);
        assert_eq!(report.to_ecs, 64);
        assert!(report.is_clean());
        let health = bridge.component_id("Health").unwrap();
        assert!(bridge.world().rows().all(|row| row.get(health) == Some(&Value::Int(50))));
    }

    #[test]
    fn zero_threshold_with_no_entities_stays_on_caller() {
        // Given
        let config = Config {
            sync: SyncConfig {
                workers: 4,
                parallel_threshold: 0,
            },
            ..Default::default()
        };
        let mut bridge = Coordinator::with_config(binding::Table::new(), config);

        // When
        let report = bridge.synchronize_all(Direction::Bidirectional);
        let frame = bridge.step(Duration::from_millis(16)).unwrap();

        // Then
        assert_eq!(report.entities, 0);
        assert_eq!(frame.sync.entities, 0);
    }

    // ==================== Dispatch ====================

    #[test]
    fn dispatch_delivers_in_order_and_ends_frame() {
        // Given
        let mut bridge = Coordinator::new(table());
        let seen = Rc::new(RefCell::new(Vec::new()));
        for kind in Kind::ALL {
            let sink = seen.clone();
            bridge.subscribe(kind, move |signal, _| {
                sink.borrow_mut().push(signal.kind());
                Ok(())
            });
        }
        let host = actor(1);
        let handle = bridge.bind(&host::Ref::new(&host)).unwrap();
        bridge.unbind(handle).unwrap();

        // When
        let report = bridge.dispatch().unwrap();

        // Then
        assert_eq!(report.delivered, 4);
        assert_eq!(
            *seen.borrow(),
            vec![
                Kind::EntityCreated,
                Kind::ComponentAdded,
                Kind::ComponentAdded,
                Kind::EntityDestroying
            ]
        );
        assert_eq!(bridge.frame().number(), 1);
        assert_eq!(bridge.pending_signals().count(), 0);
    }

    #[test]
    fn listener_mutations_land_next_flush() {
        // Given
        let mut bridge = Coordinator::new(table());
        bridge.subscribe(Kind::EntityCreated, |signal, cx| {
            cx.enqueue(Mutation::Destroy {
                target: Target::Handle(signal.handle()),
            });
            Ok(())
        });
        let host = actor(1);
        bridge.mutations().create(host::Ref::new(&host));

        // When
        bridge.step(Duration::from_millis(16)).unwrap();

        // Then - Created this frame, destroyed by the next flush
        assert_eq!(bridge.len(), 1);
        let report = bridge.step(Duration::from_millis(16)).unwrap();
        assert_eq!(report.flush.applied, 1);
        assert!(bridge.is_empty());
    }

    #[test]
    fn recoverable_failure_degrades_and_continues() {
        let mut bridge = Coordinator::new(table());
        let incidents = bridge.incidents();
        bridge.subscribe(Kind::EntityCreated, |_, _| {
            Err(ListenerError::Recoverable("no sprite".into()))
        });
        let host = actor(1);
        let handle = bridge.bind(&host::Ref::new(&host)).unwrap();

        let report = bridge.dispatch().unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(bridge.is_degraded(handle));
        assert!(matches!(incidents.try_recv(), Ok(Incident::Listener(_))));
    }

    #[test]
    fn corrupted_failure_is_returned_after_delivery() {
        // Given
        let mut bridge = Coordinator::new(table());
        let delivered = Rc::new(RefCell::new(0));
        bridge.subscribe(Kind::EntityCreated, |_, _| {
            Err(ListenerError::Corrupted("index out of sync".into()))
        });
        let counter = delivered.clone();
        bridge.subscribe(Kind::ComponentAdded, move |_, _| {
            *counter.borrow_mut() += 1;
            Ok(())
        });
        let host = actor(1);
        bridge.bind(&host::Ref::new(&host)).unwrap();

        // When
        let result = bridge.dispatch();

        // Then
        assert!(matches!(result, Err(Error::ListenerFailure(ref f)) if f.len() == 1));
        assert_eq!(*delivered.borrow(), 2);
        assert_eq!(bridge.frame().number(), 1);
    }

    // ==================== Named signals ====================

    #[test]
    fn queued_named_signal_is_raised_at_dispatch() {
        // Given
        let mut bridge = Coordinator::new(table());
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        bridge.subscribe_named("door_opened", move |_, entities| {
            sink.borrow_mut().extend_from_slice(entities)
        });
        let host = actor(1);
        let handle = bridge.bind(&host::Ref::new(&host)).unwrap();
        bridge.mutations().signal("door_opened", vec![handle]);

        // When
        let report = bridge.step(Duration::from_millis(16)).unwrap();

        // Then
        assert_eq!(report.dispatch.named, 1);
        assert_eq!(*received.borrow(), vec![handle]);
    }

    #[test]
    fn delayed_signal_waits_for_frame_clock() {
        let mut bridge = Coordinator::new(table());
        let count = Rc::new(RefCell::new(0));
        let counter = count.clone();
        bridge.subscribe_named("respawn", move |_, _| *counter.borrow_mut() += 1);
        let host = actor(1);
        let handle = bridge.bind(&host::Ref::new(&host)).unwrap();
        bridge.delay_signal("respawn", vec![handle], Duration::from_millis(40));

        bridge.step(Duration::from_millis(16)).unwrap();
        bridge.step(Duration::from_millis(16)).unwrap();
        assert_eq!(*count.borrow(), 0);

        bridge.step(Duration::from_millis(16)).unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn immediate_signal_skips_unbound_handles() {
        let mut bridge = Coordinator::new(table());
        let host = actor(1);
        let handle = bridge.bind(&host::Ref::new(&host)).unwrap();
        bridge.subscribe_named("ping", |_, entities| assert_eq!(entities.len(), 1));
        bridge.unbind(handle).unwrap();

        assert_eq!(bridge.signal("ping", &[handle]), 0);
    }
}
