//! Lifecycle bridge between host-runtime objects and ECS entities.
//!
//! A host runtime (scripting layer, editor, scene graph) owns objects with
//! their own lifetime. This crate mirrors those objects into an ECS world:
//! every bound host object gets exactly one entity handle, declared
//! capabilities are materialized as components, values are synchronized in
//! either direction, and lifecycle changes are announced as signals.
//!
//! The entry point is [`bridge::Coordinator`]. See the [`bridge`] module for the
//! frame model and the invariants the coordinator maintains.

pub mod bridge;
pub mod core;
