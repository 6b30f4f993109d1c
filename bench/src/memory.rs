//! Heap footprint of bridge workloads, measured with dhat.
//!
//! A footprint separates the one-off cost of binding a population from the
//! allocations of steady-state frames. A healthy bridge allocates per
//! binding at setup and close to nothing per frame afterwards.
//!
//! Profiling is compiled in only with the `memory_profiling` feature:
//!
//! ```bash
//! cargo bench -p rusty_bridge_bench --features memory_profiling
//! ```
//!
//! The profile is written to `dhat-heap.json`, viewable at
//! <https://nnethercote.github.io/dh_view/dh_view.html>.

use std::fmt;

use crate::scenarios::Scenario;

/// Cumulative heap counters at a point in a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapCounters {
    pub bytes: u64,
    pub blocks: u64,
    pub peak_bytes: u64,
}

impl HeapCounters {
    /// Allocation between `earlier` and `self`. Peak stays the profile-wide
    /// high-water mark.
    pub fn since(&self, earlier: &HeapCounters) -> HeapCounters {
        HeapCounters {
            bytes: self.bytes.saturating_sub(earlier.bytes),
            blocks: self.blocks.saturating_sub(earlier.blocks),
            peak_bytes: self.peak_bytes,
        }
    }
}

/// Setup and steady-state heap usage of one scenario run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footprint {
    pub bindings: usize,
    pub frames: usize,
    pub setup: HeapCounters,
    pub steady: HeapCounters,
}

impl Footprint {
    pub fn bytes_per_binding(&self) -> f64 {
        per(self.setup.bytes, self.bindings)
    }

    /// High-water heap usage per binding across the whole run.
    pub fn peak_per_binding(&self) -> f64 {
        per(self.steady.peak_bytes.max(self.setup.peak_bytes), self.bindings)
    }

    pub fn blocks_per_frame(&self) -> f64 {
        per(self.steady.blocks, self.frames)
    }
}

fn per(total: u64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    total as f64 / count as f64
}

impl fmt::Display for Footprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bindings: {:.1} bytes/binding, peak {:.1} bytes/binding, \
             {:.1} blocks/frame over {} frames",
            self.bindings,
            self.bytes_per_binding(),
            self.peak_per_binding(),
            self.blocks_per_frame(),
            self.frames
        )
    }
}

/// An active heap profile. Only one may exist at a time.
#[cfg(feature = "memory_profiling")]
pub struct HeapProfile {
    _profiler: dhat::Profiler,
}

#[cfg(feature = "memory_profiling")]
impl HeapProfile {
    pub fn start() -> Self {
        Self {
            _profiler: dhat::Profiler::new_heap(),
        }
    }

    pub fn counters(&self) -> HeapCounters {
        let stats = dhat::HeapStats::get();
        HeapCounters {
            bytes: stats.total_bytes,
            blocks: stats.total_blocks,
            peak_bytes: stats.max_bytes as u64,
        }
    }
}

#[cfg(not(feature = "memory_profiling"))]
pub struct HeapProfile;

#[cfg(not(feature = "memory_profiling"))]
impl HeapProfile {
    pub fn start() -> Self {
        Self
    }

    pub fn counters(&self) -> HeapCounters {
        HeapCounters::default()
    }
}

/// Set up `scenario` and run `frames` updates under one heap profile.
/// Counters are zero without `memory_profiling`.
pub fn measure_footprint<S: Scenario>(scenario: &mut S, frames: usize) -> Footprint {
    let profile = HeapProfile::start();
    let start = profile.counters();

    scenario.setup();
    let bound = profile.counters();

    for _ in 0..frames {
        scenario.update();
    }
    let end = profile.counters();

    Footprint {
        bindings: scenario.binding_count(),
        frames,
        setup: bound.since(&start),
        steady: end.since(&bound),
    }
}
