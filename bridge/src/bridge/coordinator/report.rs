use crate::bridge::{
    binding::SyncReport,
    error::Error,
    signal::ListenerFailure,
};

/// Outcome of applying the mutation queue.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Mutations applied.
    pub applied: usize,
    /// Mutations dropped because their target was already gone.
    pub stale: usize,
    /// Bindings torn down because their host object was dropped.
    pub reaped: usize,
    /// Mutations that failed for any other reason.
    pub rejected: Vec<Error>,
}

/// Outcome of a reaction phase.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Lifecycle signals delivered.
    pub delivered: usize,
    /// Named signals raised.
    pub named: usize,
    pub failures: Vec<ListenerFailure>,
}

/// Outcome of a full frame.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub frame: u64,
    pub flush: FlushReport,
    pub sync: SyncReport,
    pub dispatch: DispatchReport,
}

/// A contained failure, reported out of band.
///
/// Incidents are informational: by the time one is received the bridge has
/// already recovered from it.
#[derive(Debug, Clone)]
pub enum Incident {
    /// A capability could not be read while binding; the entity is degraded.
    Materialization(Error),
    /// A value could not be read or written during synchronization.
    Synchronization(Error),
    /// A listener returned an error; the entity is degraded.
    Listener(ListenerFailure),
    /// A queued mutation targeted an entity that no longer exists.
    StaleMutation { sequence: u64, error: Error },
    /// A queued mutation was refused.
    Rejected { sequence: u64, error: Error },
}
