//! Host object fixtures shared by the benchmarks.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rusty_bridge::bridge::{
    ConflictPolicy, Coordinator, Direction, Value,
    binding::{Resolvers, Table},
    config::{Config, SyncConfig},
    host::{self, PropertyObject},
};

pub const TRANSFORM: &str = "transform";
pub const VELOCITY: &str = "velocity";
pub const HEALTH: &str = "health";
pub const NAME: &str = "name";

/// The binding set used by every benchmark: one binding per direction plus a
/// merged one.
pub fn table() -> Table {
    let resolvers = Resolvers::default();
    let mut table = Table::new();
    let rules = [
        (TRANSFORM, "Position", Direction::Bidirectional, ConflictPolicy::HostWins),
        (VELOCITY, "Velocity", Direction::HostToEcs, ConflictPolicy::HostWins),
        (NAME, "Name", Direction::EcsToHost, ConflictPolicy::HostWins),
    ];
    for (capability, component, direction, policy) in rules {
        table
            .register(capability, component, direction, policy)
            .unwrap_or_else(|e| panic!("fixture binding: {e}"));
    }
    let merge = resolvers
        .policy("average")
        .unwrap_or_else(|e| panic!("fixture resolver: {e}"));
    table
        .register(HEALTH, "Health", Direction::Bidirectional, merge)
        .unwrap_or_else(|e| panic!("fixture binding: {e}"));
    table
}

/// A coordinator over [`table`] with the given worker count.
pub fn coordinator(workers: usize) -> Coordinator {
    let config = Config {
        sync: SyncConfig {
            workers,
            parallel_threshold: 256,
        },
        ..Default::default()
    };
    Coordinator::with_config(table(), config)
}

/// Deterministic source of host objects.
pub struct HostFactory {
    rng: ChaCha8Rng,
    next_id: u64,
}

impl HostFactory {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 1,
        }
    }

    pub fn actor(&mut self) -> Arc<PropertyObject> {
        let id = self.next_id;
        self.next_id += 1;

        let rng = &mut self.rng;
        Arc::new(
            PropertyObject::new(id)
                .with(TRANSFORM, vec3(rng, 100.0))
                .with(VELOCITY, vec3(rng, 10.0))
                .with(HEALTH, rng.gen_range(1.0f64..100.0))
                .with(NAME, format!("actor-{id}")),
        )
    }

    pub fn actors(&mut self, count: usize) -> Vec<Arc<PropertyObject>> {
        (0..count).map(|_| self.actor()).collect()
    }

    /// Move the actor along its velocity, as a host-side update would.
    pub fn advance(actor: &PropertyObject, dt: f64) {
        let (Some(Value::Vec3(p)), Some(Value::Vec3(v))) =
            (actor.get(TRANSFORM), actor.get(VELOCITY))
        else {
            return;
        };
        actor.set(
            TRANSFORM,
            [p[0] + v[0] * dt, p[1] + v[1] * dt, p[2] + v[2] * dt],
        );
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

fn vec3(rng: &mut ChaCha8Rng, extent: f64) -> [f64; 3] {
    [
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
    ]
}

/// Bind every actor directly, bypassing the queue.
pub fn bind_all(bridge: &mut Coordinator, actors: &[Arc<PropertyObject>]) {
    for actor in actors {
        bridge
            .bind(&host::Ref::new(actor))
            .unwrap_or_else(|e| panic!("fixture bind: {e}"));
    }
    bridge
        .dispatch()
        .unwrap_or_else(|e| panic!("fixture dispatch: {e}"));
}
