//! Benchmark utilities for the host/ECS bridge.
//!
//! - **Microbenchmarks**: bind, unbind, flush, synchronization and signal
//!   delivery in isolation
//! - **Scenario benchmarks**: frames of a host runtime churning and editing
//!   objects
//! - **Memory tracking**: heap allocation profiling via dhat
//! - **Frame timing**: per-frame `step` measurement
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench -p rusty_bridge_bench
//!
//! # Only the synchronization group
//! cargo bench -p rusty_bridge_bench -- synchronize
//!
//! # With heap profiling (slower)
//! cargo bench -p rusty_bridge_bench --features memory_profiling
//! ```
//!
//! Criterion writes HTML reports to `target/criterion/`.

pub mod frame_timer;
pub mod hosts;
pub mod memory;
pub mod scenarios;
