use std::{
    cell::{Cell, RefCell},
    mem,
    rc::Rc,
};

use log::trace;

use crate::bridge::{
    error::{Error, Result},
    signal::{Context, Kind, Listener, ListenerError, ListenerFailure, Signal, Subscription},
};

#[derive(Clone)]
struct Subscriber {
    subscription: Subscription,
    listener: Rc<RefCell<dyn Listener>>,
}

/// Subscribers of a single signal kind.
#[derive(Default)]
struct Channel {
    subscribers: RefCell<Vec<Subscriber>>,
    /// Set while a pass over this channel is running.
    dispatching: Cell<bool>,
    /// Unsubscribed during the running pass, removed when it ends.
    retired: RefCell<Vec<Subscription>>,
}

impl Channel {
    fn contains(&self, subscription: Subscription) -> bool {
        self.subscribers
            .borrow()
            .iter()
            .any(|s| s.subscription == subscription)
    }

    fn remove(&self, subscription: Subscription) {
        self.subscribers
            .borrow_mut()
            .retain(|s| s.subscription != subscription);
    }
}

/// Clears the dispatching flag and applies deferred removals when a pass ends,
/// including by unwinding.
struct PassGuard<'a> {
    channel: &'a Channel,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.channel.dispatching.set(false);
        let retired = mem::take(&mut *self.channel.retired.borrow_mut());
        if !retired.is_empty() {
            self.channel
                .subscribers
                .borrow_mut()
                .retain(|s| !retired.contains(&s.subscription));
        }
    }
}

/// Ordered, per-kind signal delivery.
///
/// Listeners of a kind are invoked in subscription order. Each pass runs over
/// the subscriber list as it was when the pass started: listeners added
/// during the pass are first invoked on the next one, and listeners removed
/// during the pass are still invoked in it.
///
/// The bus lives on the coordinator's thread and is not `Sync`.
pub struct Bus {
    channels: [Channel; 4],
    next_id: Cell<u64>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            channels: Default::default(),
            next_id: Cell::new(0),
        }
    }

    /// Subscribe a closure to a signal kind.
    pub fn subscribe<F>(&self, kind: Kind, listener: F) -> Subscription
    where
        F: FnMut(&Signal, &Context<'_>) -> std::result::Result<(), ListenerError> + 'static,
    {
        self.subscribe_listener(kind, listener)
    }

    /// Subscribe a [`Listener`] implementation to a signal kind.
    pub fn subscribe_listener<L>(&self, kind: Kind, listener: L) -> Subscription
    where
        L: Listener + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let subscription = Subscription { kind, id };
        let listener: Rc<RefCell<dyn Listener>> = Rc::new(RefCell::new(listener));
        self.channels[kind.index()]
            .subscribers
            .borrow_mut()
            .push(Subscriber {
                subscription,
                listener,
            });
        subscription
    }

    /// Remove a subscription. Returns false if it was not subscribed.
    ///
    /// During a pass over the subscription's own kind, removal is deferred
    /// until the pass ends.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let channel = &self.channels[subscription.kind.index()];
        if !channel.contains(subscription) || channel.retired.borrow().contains(&subscription) {
            return false;
        }

        if channel.dispatching.get() {
            channel.retired.borrow_mut().push(subscription);
        } else {
            channel.remove(subscription);
        }
        true
    }

    /// Deliver a signal to every listener of its kind.
    ///
    /// Listener errors do not stop delivery; they are collected and returned.
    /// Fails without invoking anyone if a pass over the same kind is already
    /// running.
    pub fn publish(&self, signal: &Signal, cx: &Context<'_>) -> Result<Vec<ListenerFailure>> {
        let kind = signal.kind();
        let channel = &self.channels[kind.index()];
        if channel.dispatching.replace(true) {
            return Err(Error::ReentrantPublish(kind));
        }
        let _guard = PassGuard { channel };

        let pass: Vec<Subscriber> = channel.subscribers.borrow().clone();
        trace!("Publishing {} to {} listener(s)", kind, pass.len());

        let mut failures = Vec::new();
        for subscriber in &pass {
            let result = subscriber.listener.borrow_mut().on_signal(signal, cx);
            if let Err(error) = result {
                failures.push(ListenerFailure {
                    subscription: subscriber.subscription,
                    kind,
                    handle: signal.handle(),
                    error,
                });
            }
        }
        Ok(failures)
    }

    /// Number of listeners subscribed to a kind.
    pub fn listeners(&self, kind: Kind) -> usize {
        self.channels[kind.index()].subscribers.borrow().len()
    }

    /// Whether a pass over a kind is running.
    pub fn is_dispatching(&self, kind: Kind) -> bool {
        self.channels[kind.index()].dispatching.get()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::bridge::{
        component,
        entity::{self, Generation, Handle, Index},
        host,
        mutation::{self, Mutation},
        world::World,
    };

    struct Fixture {
        bus: Bus,
        registry: entity::Registry,
        world: World,
        components: component::Registry,
        mutations: mutation::Queue,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                bus: Bus::new(),
                registry: entity::Registry::new(),
                world: World::new(),
                components: component::Registry::new(),
                mutations: mutation::Queue::new(),
            }
        }

        fn cx(&self) -> Context<'_> {
            Context::new(
                &self.bus,
                &self.registry,
                &self.world,
                &self.components,
                &self.mutations,
            )
        }
    }

    fn created() -> Signal {
        Signal::EntityCreated {
            handle: Handle::new(Index::from(0), Generation::FIRST),
            host: host::Id::new(1),
        }
    }

    fn added() -> Signal {
        Signal::ComponentAdded {
            handle: Handle::new(Index::from(0), Generation::FIRST),
            component: component::Id::from(0),
            value: 1i64.into(),
        }
    }

    // ==================== Ordering ====================

    #[test]
    fn listeners_run_in_subscription_order() {
        // Given
        let fixture = Fixture::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["L1", "L2", "L3"] {
            let log = log.clone();
            fixture.bus.subscribe(Kind::EntityCreated, move |_, _| {
                log.borrow_mut().push(name);
                Ok(())
            });
        }

        // When
        let failures = fixture.bus.publish(&created(), &fixture.cx()).unwrap();

        // Then
        assert!(failures.is_empty());
        assert_eq!(*log.borrow(), vec!["L1", "L2", "L3"]);
    }

    #[test]
    fn other_kinds_are_not_invoked() {
        let fixture = Fixture::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        fixture.bus.subscribe(Kind::ComponentAdded, move |_, _| {
            counter.set(counter.get() + 1);
            Ok(())
        });

        fixture.bus.publish(&created(), &fixture.cx()).unwrap();

        assert_eq!(calls.get(), 0);
    }

    // ==================== Failures ====================

    #[test]
    fn failing_listener_does_not_stop_delivery() {
        // Given
        let fixture = Fixture::new();
        let reached = Rc::new(Cell::new(false));
        fixture.bus.subscribe(Kind::EntityCreated, |_, _| {
            Err(ListenerError::Recoverable("boom".into()))
        });
        let flag = reached.clone();
        fixture.bus.subscribe(Kind::EntityCreated, move |_, _| {
            flag.set(true);
            Ok(())
        });

        // When
        let failures = fixture.bus.publish(&created(), &fixture.cx()).unwrap();

        // Then
        assert!(reached.get());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, Kind::EntityCreated);
        assert_eq!(failures[0].error, ListenerError::Recoverable("boom".into()));
    }

    // ==================== Re-entrancy ====================

    #[test]
    fn same_kind_publish_is_rejected_and_enqueue_allowed() {
        // Given
        let fixture = Fixture::new();
        let outcome = Rc::new(RefCell::new(None));
        let seen = outcome.clone();
        fixture.bus.subscribe(Kind::EntityCreated, move |signal, cx| {
            let nested = cx.publish(signal);
            *seen.borrow_mut() = Some(matches!(
                nested,
                Err(Error::ReentrantPublish(Kind::EntityCreated))
            ));
            cx.enqueue(Mutation::Destroy {
                target: entity::Target::Handle(signal.handle()),
            });
            Ok(())
        });

        // When
        fixture.bus.publish(&created(), &fixture.cx()).unwrap();

        // Then
        assert_eq!(*outcome.borrow(), Some(true));
        assert_eq!(fixture.mutations.len(), 1);
        assert!(!fixture.bus.is_dispatching(Kind::EntityCreated));
    }

    #[test]
    fn other_kind_publish_nests() {
        // Given
        let fixture = Fixture::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let outer = order.clone();
        fixture.bus.subscribe(Kind::EntityCreated, move |_, cx| {
            outer.borrow_mut().push("created:start");
            cx.publish(&added()).unwrap();
            outer.borrow_mut().push("created:end");
            Ok(())
        });
        let inner = order.clone();
        fixture.bus.subscribe(Kind::ComponentAdded, move |_, _| {
            inner.borrow_mut().push("added");
            Ok(())
        });

        // When
        fixture.bus.publish(&created(), &fixture.cx()).unwrap();

        // Then
        assert_eq!(
            *order.borrow(),
            vec!["created:start", "added", "created:end"]
        );
    }

    // ==================== Subscription changes ====================

    #[test]
    fn unsubscribe_during_pass_is_deferred() {
        // Given
        let fixture = Fixture::new();
        let calls = Rc::new(Cell::new(0));
        let target = Rc::new(Cell::new(None));

        let remover = target.clone();
        fixture.bus.subscribe(Kind::EntityCreated, move |_, cx| {
            if let Some(subscription) = remover.get() {
                assert!(cx.unsubscribe(subscription));
            }
            Ok(())
        });
        let counter = calls.clone();
        let victim = fixture.bus.subscribe(Kind::EntityCreated, move |_, _| {
            counter.set(counter.get() + 1);
            Ok(())
        });
        target.set(Some(victim));

        // When
        fixture.bus.publish(&created(), &fixture.cx()).unwrap();

        // Then - Still invoked in the pass that removed it
        assert_eq!(calls.get(), 1);
        assert_eq!(fixture.bus.listeners(Kind::EntityCreated), 1);

        // When
        target.set(None);
        fixture.bus.publish(&created(), &fixture.cx()).unwrap();

        // Then
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn subscribe_during_pass_waits_for_next_pass() {
        // Given
        let fixture = Fixture::new();
        let late_calls = Rc::new(Cell::new(0));
        let subscribed = Rc::new(Cell::new(false));

        let counter = late_calls.clone();
        let once = subscribed.clone();
        fixture.bus.subscribe(Kind::EntityCreated, move |_, cx| {
            if !once.replace(true) {
                let counter = counter.clone();
                cx.subscribe(Kind::EntityCreated, move |_, _| {
                    counter.set(counter.get() + 1);
                    Ok(())
                });
            }
            Ok(())
        });

        // When
        fixture.bus.publish(&created(), &fixture.cx()).unwrap();

        // Then
        assert_eq!(late_calls.get(), 0);

        // When
        fixture.bus.publish(&created(), &fixture.cx()).unwrap();

        // Then
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn unsubscribe_twice() {
        let fixture = Fixture::new();
        let subscription = fixture.bus.subscribe(Kind::ComponentRemoved, |_, _| Ok(()));

        assert!(fixture.bus.unsubscribe(subscription));
        assert!(!fixture.bus.unsubscribe(subscription));
        assert_eq!(fixture.bus.listeners(Kind::ComponentRemoved), 0);
    }

    struct Counting {
        seen: Rc<Cell<usize>>,
    }

    impl Listener for Counting {
        fn on_signal(
            &mut self,
            _: &Signal,
            _: &Context<'_>,
        ) -> std::result::Result<(), ListenerError> {
            self.seen.set(self.seen.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn struct_listeners() {
        let fixture = Fixture::new();
        let seen = Rc::new(Cell::new(0));
        fixture.bus.subscribe_listener(
            Kind::ComponentAdded,
            Counting { seen: seen.clone() },
        );

        fixture.bus.publish(&added(), &fixture.cx()).unwrap();
        fixture.bus.publish(&added(), &fixture.cx()).unwrap();

        assert_eq!(seen.get(), 2);
    }
}
