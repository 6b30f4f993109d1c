//! Host runtime workloads driven through full frames.
//!
//! # Scenarios
//!
//! - **Churn**: host objects created and dropped every frame from a loader
//!   thread, exercising the mutation queue, reaping and lifecycle signals
//! - **Crowd**: a stable population edited on both sides every frame,
//!   exercising bulk synchronization and conflict resolution

pub mod churn;
pub mod crowd;

pub use churn::{ChurnConfig, ChurnScenario};
pub use crowd::{CrowdConfig, CrowdScenario};

/// A repeatable frame workload.
pub trait Scenario {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Host objects bound in steady state.
    fn binding_count(&self) -> usize;

    /// Create and bind the initial population.
    fn setup(&mut self);

    /// Run one frame, host-side work included.
    fn update(&mut self);

    fn teardown(&mut self);
}
