//! Frame clock and phase tracking for the bridge.

use std::{fmt, time::Duration};

/// Nominal delta of a 60 Hz frame.
pub const SIXTY_FPS: Duration = Duration::from_nanos(16_666_666);

/// The three phases of a bridge frame, in execution order.
///
/// - **Structural**: queued mutations are applied (`flush`).
/// - **Synchronization**: values move between host objects and components.
/// - **Reaction**: signals raised this frame are delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Phase {
    #[default]
    Structural,
    Synchronization,
    Reaction,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Structural => "structural",
            Phase::Synchronization => "synchronization",
            Phase::Reaction => "reaction",
        };
        f.write_str(name)
    }
}

/// A frame of the bridge clock. Frames advance by caller-supplied deltas, so
/// the clock follows the host's simulation time rather than wall time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame {
    number: u64,
    /// Total simulated time at the start of this frame.
    time: Duration,
    /// The delta this frame advanced by.
    delta: Duration,
    phase: Phase,
    flushed: bool,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn number(&self) -> u64 {
        self.number
    }

    #[inline]
    pub fn time(&self) -> Duration {
        self.time
    }

    #[inline]
    pub fn delta(&self) -> Duration {
        self.delta
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the mutation queue was flushed in this frame.
    #[inline]
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Move the clock forward within the current frame.
    pub fn advance(&mut self, delta: Duration) {
        self.delta = delta;
        self.time += delta;
    }

    pub(crate) fn enter(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn mark_flushed(&mut self) {
        self.flushed = true;
    }

    /// The frame following this one, starting in the structural phase.
    pub fn next(self) -> Self {
        Self {
            number: self.number + 1,
            time: self.time,
            delta: Duration::ZERO,
            phase: Phase::Structural,
            flushed: false,
        }
    }
}
