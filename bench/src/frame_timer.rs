//! Per-frame timing of [`Coordinator::step`].
//!
//! Frame times are collected into [`FrameStats`] for percentile reporting,
//! and the work each frame did is summed into [`FrameTotals`] so a run can be
//! checked for stale or failed work as well as speed.

use std::{
    fmt,
    time::{Duration, Instant},
};

use rusty_bridge::bridge::{Coordinator, FrameReport};

/// Distribution of measured frame times.
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    sorted: Vec<Duration>,
    total: Duration,
}

impl FrameStats {
    pub fn from_times(mut times: Vec<Duration>) -> Self {
        times.sort_unstable();
        Self {
            total: times.iter().sum(),
            sorted: times,
        }
    }

    pub fn frames(&self) -> usize {
        self.sorted.len()
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn mean(&self) -> Duration {
        match self.sorted.len() {
            0 => Duration::ZERO,
            n => self.total / n as u32,
        }
    }

    /// Nearest-rank percentile, `p` clamped to 0..=100.
    pub fn percentile(&self, p: usize) -> Duration {
        let Some(last) = self.sorted.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        self.sorted[(self.sorted.len() * p.min(100) / 100).min(last)]
    }

    pub fn min(&self) -> Duration {
        self.sorted.first().copied().unwrap_or_default()
    }

    pub fn max(&self) -> Duration {
        self.sorted.last().copied().unwrap_or_default()
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        write!(
            f,
            "{} frames, mean {:.3}ms, p50 {:.3}ms, p99 {:.3}ms, max {:.3}ms",
            self.frames(),
            ms(self.mean()),
            ms(self.percentile(50)),
            ms(self.percentile(99)),
            ms(self.max()),
        )
    }
}

/// Work done across a run of frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameTotals {
    pub applied: usize,
    pub stale: usize,
    pub reaped: usize,
    pub rejected: usize,
    pub synchronized: usize,
    pub conflicts: usize,
    pub signals: usize,
    pub listener_failures: usize,
}

impl FrameTotals {
    pub fn add(&mut self, report: &FrameReport) {
        self.applied += report.flush.applied;
        self.stale += report.flush.stale;
        self.reaped += report.flush.reaped;
        self.rejected += report.flush.rejected.len();
        self.synchronized += report.sync.entities;
        self.conflicts += report.sync.conflicts;
        self.signals += report.dispatch.delivered + report.dispatch.named;
        self.listener_failures += report.dispatch.failures.len();
    }
}

/// Run `frames` frames of `delta`, calling `before_step` ahead of each one to
/// simulate host-side work. Only the `step` itself is timed.
///
/// Panics if a frame fails, which in a benchmark means the fixture is broken.
pub fn measure_steps<F>(
    bridge: &mut Coordinator,
    frames: usize,
    delta: Duration,
    mut before_step: F,
) -> (FrameStats, FrameTotals)
where
    F: FnMut(&mut Coordinator, usize),
{
    let mut times = Vec::with_capacity(frames);
    let mut totals = FrameTotals::default();

    for frame in 0..frames {
        before_step(bridge, frame);

        let start = Instant::now();
        let report = bridge
            .step(delta)
            .unwrap_or_else(|e| panic!("frame {frame} failed: {e}"));
        times.push(start.elapsed());

        totals.add(&report);
    }

    (FrameStats::from_times(times), totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::{self, HostFactory};

    #[test]
    fn stats_percentiles() {
        let stats = FrameStats::from_times(
            [4, 1, 3, 2, 10].map(Duration::from_millis).to_vec(),
        );

        assert_eq!(stats.frames(), 5);
        assert_eq!(stats.min(), Duration::from_millis(1));
        assert_eq!(stats.max(), Duration::from_millis(10));
        assert_eq!(stats.percentile(50), Duration::from_millis(3));
        assert_eq!(stats.mean(), Duration::from_millis(4));
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = FrameStats::default();

        assert_eq!(stats.mean(), Duration::ZERO);
        assert_eq!(stats.percentile(99), Duration::ZERO);
    }

    #[test]
    fn measure_steps_sums_reports() {
        // Given
        let mut bridge = hosts::coordinator(1);
        let actors = HostFactory::new(3).actors(5);
        let mutations = bridge.mutations();
        for actor in &actors {
            mutations.create(rusty_bridge::bridge::host::Ref::new(actor));
        }

        // When
        let (stats, totals) = measure_steps(&mut bridge, 3, Duration::from_millis(16), |_, _| {});

        // Then
        assert_eq!(stats.frames(), 3);
        assert_eq!(totals.applied, 5);
        // Synchronized in each of the three frames
        assert_eq!(totals.synchronized, 15);
        // EntityCreated plus four ComponentAdded per actor
        assert_eq!(totals.signals, 25);
    }
}
