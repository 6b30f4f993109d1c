//! Crowd synchronization scenario.
//!
//! A fixed population where both sides edit every frame:
//! - the host moves every actor along its velocity
//! - ECS gameplay damages a random share of actors and renames a few
//!
//! This scenario tests:
//! - Bulk synchronization throughput, split across workers above the threshold
//! - Conflict resolution for bidirectional bindings
//! - One-way propagation in both directions

use std::{sync::Arc, time::Duration};

use rand::Rng;
use rusty_bridge::bridge::{Coordinator, Direction, Value, component, host::PropertyObject};

use crate::{
    hosts::{self, HostFactory},
    scenarios::Scenario,
};

pub struct CrowdConfig {
    pub population: usize,
    /// Fraction of actors damaged on the ECS side each frame.
    pub damaged: f64,
    /// Fraction of actors renamed on the ECS side each frame.
    pub renamed: f64,
    pub delta: Duration,
    pub workers: usize,
    pub seed: u64,
}

impl Default for CrowdConfig {
    fn default() -> Self {
        Self {
            population: 10_000,
            damaged: 0.1,
            renamed: 0.01,
            delta: Duration::from_nanos(16_666_666),
            workers: 4,
            seed: 12345,
        }
    }
}

pub struct CrowdScenario {
    config: CrowdConfig,
    bridge: Coordinator,
    factory: HostFactory,
    actors: Vec<Arc<PropertyObject>>,
    health: Option<component::Id>,
    name: Option<component::Id>,
    frame: u64,
}

impl CrowdScenario {
    pub fn new() -> Self {
        Self::with_config(CrowdConfig::default())
    }

    pub fn with_config(config: CrowdConfig) -> Self {
        Self {
            bridge: hosts::coordinator(config.workers),
            factory: HostFactory::new(config.seed),
            actors: Vec::new(),
            health: None,
            name: None,
            frame: 0,
            config,
        }
    }

    pub fn bridge(&self) -> &Coordinator {
        &self.bridge
    }

    pub fn actors(&self) -> &[Arc<PropertyObject>] {
        &self.actors
    }

    /// Host-side update: integrate every actor's position.
    pub fn host_update(&mut self) {
        let dt = self.config.delta.as_secs_f64();
        for actor in &self.actors {
            HostFactory::advance(actor, dt);
        }
    }

    /// ECS-side update: damage and rename random entities.
    pub fn ecs_update(&mut self) {
        let (Some(health), Some(name)) = (self.health, self.name) else {
            return;
        };
        let handles: Vec<_> = self.bridge.world().rows().map(|row| row.handle()).collect();
        if handles.is_empty() {
            return;
        }

        let damaged = (handles.len() as f64 * self.config.damaged) as usize;
        for _ in 0..damaged {
            let handle = handles[self.factory.rng().gen_range(0..handles.len())];
            if let Some(Value::Float(hp)) = self.bridge.component_mut(handle, health) {
                *hp = (*hp - 1.0).max(0.0);
            }
        }

        let renamed = (handles.len() as f64 * self.config.renamed) as usize;
        for i in 0..renamed {
            let handle = handles[self.factory.rng().gen_range(0..handles.len())];
            if let Some(value) = self.bridge.component_mut(handle, name) {
                *value = Value::Text(format!("renamed-{}-{}", self.frame, i));
            }
        }
    }

    /// Synchronization pass alone, for isolating it from the frame.
    pub fn synchronize(&mut self) -> usize {
        self.bridge.synchronize_all(Direction::Bidirectional).entities
    }
}

impl Default for CrowdScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario for CrowdScenario {
    fn name(&self) -> &'static str {
        "crowd"
    }

    fn description(&self) -> &'static str {
        "Stable population edited on both sides every frame"
    }

    fn binding_count(&self) -> usize {
        self.config.population
    }

    fn setup(&mut self) {
        self.actors = self.factory.actors(self.config.population);
        hosts::bind_all(&mut self.bridge, &self.actors);
        self.health = self.bridge.component_id("Health");
        self.name = self.bridge.component_id("Name");
    }

    fn update(&mut self) {
        self.host_update();
        self.ecs_update();
        if let Err(e) = self.bridge.step(self.config.delta) {
            panic!("crowd frame failed: {e}");
        }
        self.frame += 1;
    }

    fn teardown(&mut self) {
        self.actors.clear();
        let _ = self.bridge.step(self.config.delta);
    }
}
