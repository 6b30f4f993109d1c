//! Object churn scenario.
//!
//! A loader thread reports new host objects through the mutation queue while
//! the main thread drops a share of the live ones each frame. Dropped objects
//! are reaped at the next flush, so every frame binds, tears down and signals.

use std::{sync::Arc, thread, time::Duration};

use rand::Rng;
use rusty_bridge::bridge::{
    Coordinator,
    host::{self, PropertyObject},
    signal::{Kind, ListenerError, Signal},
};

use crate::{
    hosts::{self, HostFactory},
    scenarios::Scenario,
};

pub struct ChurnConfig {
    /// Live host objects in steady state.
    pub population: usize,
    /// Fraction of the population replaced each frame.
    pub turnover: f64,
    pub delta: Duration,
    pub workers: usize,
    pub seed: u64,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            population: 10_000,
            turnover: 0.05,
            delta: Duration::from_nanos(16_666_666),
            workers: 4,
            seed: 12345,
        }
    }
}

pub struct ChurnScenario {
    config: ChurnConfig,
    bridge: Coordinator,
    factory: HostFactory,
    live: Vec<Arc<PropertyObject>>,
}

impl ChurnScenario {
    pub fn new() -> Self {
        Self::with_config(ChurnConfig::default())
    }

    pub fn with_config(config: ChurnConfig) -> Self {
        Self {
            bridge: hosts::coordinator(config.workers),
            factory: HostFactory::new(config.seed),
            live: Vec::with_capacity(config.population),
            config,
        }
    }

    pub fn bridge(&self) -> &Coordinator {
        &self.bridge
    }

    fn replaced_per_frame(&self) -> usize {
        (self.config.population as f64 * self.config.turnover).ceil() as usize
    }

    /// Queue creation of `count` new host objects from a loader thread.
    fn spawn_from_loader(&mut self, count: usize) {
        let fresh = self.factory.actors(count);
        let mutations = self.bridge.mutations();
        thread::scope(|scope| {
            scope.spawn(|| {
                for actor in &fresh {
                    mutations.create(host::Ref::new(actor));
                }
            });
        });
        self.live.extend(fresh);
    }
}

impl Default for ChurnScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario for ChurnScenario {
    fn name(&self) -> &'static str {
        "churn"
    }

    fn description(&self) -> &'static str {
        "Host objects created on a loader thread and dropped every frame"
    }

    fn binding_count(&self) -> usize {
        self.config.population
    }

    fn setup(&mut self) {
        // Typical listener work: index on create, clean up on destroy
        self.bridge.subscribe(Kind::EntityCreated, |signal, cx| {
            if cx.host(signal.handle()).is_none() {
                return Err(ListenerError::Recoverable("created without a host".into()));
            }
            Ok(())
        });
        self.bridge.subscribe(Kind::EntityDestroying, |signal, _| {
            if let Signal::EntityDestroying { components, .. } = signal {
                std::hint::black_box(components.len());
            }
            Ok(())
        });

        self.spawn_from_loader(self.config.population);
        if let Err(e) = self.bridge.step(self.config.delta) {
            panic!("churn setup failed: {e}");
        }
    }

    fn update(&mut self) {
        let replaced = self.replaced_per_frame().min(self.live.len());
        for _ in 0..replaced {
            let index = self.factory.rng().gen_range(0..self.live.len());
            self.live.swap_remove(index);
        }
        self.spawn_from_loader(replaced);

        if let Err(e) = self.bridge.step(self.config.delta) {
            panic!("churn frame failed: {e}");
        }
    }

    fn teardown(&mut self) {
        self.live.clear();
        let _ = self.bridge.step(self.config.delta);
    }
}
