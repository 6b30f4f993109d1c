//! Walkthrough of a host runtime driving the bridge.
//!
//! This example shows:
//! - Declaring bindings from TOML
//! - Creating host objects from another thread through the mutation queue
//! - Reacting to lifecycle signals
//! - Host-wins and merge conflict resolution
//! - Reaping bindings whose host object was dropped

use std::{sync::Arc, thread, time::Duration};

use log::LevelFilter;
use rusty_bridge::{
    bridge::{
        Coordinator, Value,
        binding::Resolvers,
        config::Config,
        host::{self, PropertyObject},
        signal::{Kind, Signal},
    },
    core::{frame::SIXTY_FPS, log::init as init_logging},
};

const CONFIG: &str = r#"
[sync]
workers = 2
parallel_threshold = 64

[[bindings]]
capability = "transform"
component = "Position"

[[bindings]]
capability = "health"
component = "Health"
direction = "host_to_ecs"

[[bindings]]
capability = "score"
component = "Score"
policy = { merge = "changed_side" }
"#;

// ============================================================================
// Host objects
// ============================================================================

fn actor(id: u64, x: f64) -> Arc<PropertyObject> {
    Arc::new(
        PropertyObject::new(id)
            .with("transform", [x, 0.0, 0.0])
            .with("health", 100i64)
            .with("score", 0i64),
    )
}

fn print_world(bridge: &Coordinator) {
    let names = ["Position", "Health", "Score"].map(|name| (name, bridge.component_id(name)));
    for row in bridge.world().rows() {
        let values: Vec<String> = names
            .iter()
            .filter_map(|(name, id)| Some(format!("{}={}", name, row.get((*id)?)?)))
            .collect();
        println!("  {}: {}", row.handle(), values.join(" "));
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logs = init_logging(LevelFilter::Debug)?;

    println!("=============================================================");
    println!("Bind and Sync Demo");
    println!("=============================================================");

    let config = Config::from_toml_str(CONFIG)?;
    let mut bridge = Coordinator::from_config(config, &Resolvers::default())?;

    bridge.subscribe(Kind::EntityCreated, |signal, cx| {
        if let Signal::EntityCreated { handle, host } = signal {
            println!("  + {} for {}", handle, host);
            cx.signal("spawned", vec![*handle]);
        }
        Ok(())
    });
    bridge.subscribe(Kind::EntityDestroying, |signal, _| {
        if let Signal::EntityDestroying {
            handle, components, ..
        } = signal
        {
            println!("  - {} with {} component(s)", handle, components.len());
        }
        Ok(())
    });
    bridge.subscribe_named("spawned", |name, entities| {
        println!("  [{}] {:?}", name, entities);
    });

    // Host objects are created on a loader thread and reported via the queue
    println!("\nLoading actors...");
    let actors: Vec<_> = (0..3).map(|i| actor(i, i as f64 * 10.0)).collect();
    let mutations = bridge.mutations();
    thread::scope(|scope| {
        scope.spawn(|| {
            for actor in &actors {
                mutations.create(host::Ref::new(actor));
            }
        });
    });

    let report = bridge.step(SIXTY_FPS)?;
    println!("Frame {}: {} mutation(s) applied", report.frame, report.flush.applied);
    bridge.step(SIXTY_FPS)?;
    print_world(&bridge);

    // Host moves an actor and takes damage; ECS edits another actor's position
    println!("\nEditing both sides...");
    actors[0].set("transform", [5.0, 5.0, 0.0]);
    actors[0].set("health", 80i64);
    let second = bridge
        .lookup(&host::Ref::new(&actors[1]))
        .ok_or("actor 1 is not bound")?;
    if let Some(position) = bridge.component_id("Position") {
        if let Some(value) = bridge.component_mut(second, position) {
            *value = Value::Vec3([99.0, 99.0, 99.0]);
        }
    }
    // Score changed on the ECS side only, so the merge keeps it
    if let Some(score) = bridge.component_id("Score") {
        if let Some(value) = bridge.component_mut(second, score) {
            *value = Value::Int(250);
        }
    }

    let report = bridge.step(SIXTY_FPS)?;
    println!(
        "Synchronized {} entities: {} to ECS, {} to host, {} conflict(s)",
        report.sync.entities, report.sync.to_ecs, report.sync.to_host, report.sync.conflicts
    );
    print_world(&bridge);
    println!("  host score of actor 1: {:?}", actors[1].get("score"));

    // Dropping a host object tears its entity down on the next flush
    println!("\nDropping actor 2...");
    let mut actors = actors;
    actors.pop();
    let report = bridge.step(SIXTY_FPS)?;
    println!("Reaped {} binding(s)", report.flush.reaped);
    bridge.step(Duration::from_millis(16))?;
    print_world(&bridge);

    println!("\n=== Log ===");
    for message in logs.try_iter() {
        println!("  [{}] {}: {}", message.level, message.target, message.message);
    }

    Ok(())
}
