//! Host object / ECS entity bridge.
//!
//! # Architecture
//!
//! - [`entity::Registry`]: the bidirectional host object <-> handle map with
//!   generational handles.
//! - [`binding::Table`]: capability -> component rules, materialization and
//!   value synchronization.
//! - [`signal::Bus`]: ordered delivery of lifecycle signals to listeners.
//! - [`mutation::Queue`]: deferred structural changes, applied in
//!   submission order at the next flush.
//! - [`Coordinator`]: owns all of the above and drives the per-frame
//!   structural / synchronization / reaction phases.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut bindings = binding::Table::new();
//! bindings.register("transform", "Position", Direction::Bidirectional, ConflictPolicy::HostWins)?;
//!
//! let mut bridge = Coordinator::new(bindings);
//! let mutations = bridge.mutations();
//! mutations.create(host::Ref::new(&actor));
//!
//! bridge.step(Duration::from_millis(16))?;
//! ```

pub mod binding;
pub mod component;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod host;
pub mod mutation;
pub mod signal;
pub mod value;
pub mod world;

pub use binding::{ConflictPolicy, Direction};
pub use coordinator::{Coordinator, DispatchReport, FlushReport, FrameReport, Incident};
pub use entity::Handle;
pub use error::{Error, Result};
pub use value::Value;
