use std::sync::Arc;

use thiserror::Error;

use crate::bridge::{
    entity::{Handle, Target},
    host::{self, AccessError, Capability},
    signal::{self, ListenerFailure},
};

/// Errors raised by the bridge.
///
/// Programmer errors ([`Error::is_programmer_error`]) mean the caller broke an
/// API contract and should be fixed at the call site. Recoverable errors
/// ([`Error::is_recoverable`]) have already been contained by the bridge.
/// Queued mutations treat stale targets ([`Error::is_stale`]) as skips rather
/// than failures.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("{host} is already bound to {handle}")]
    AlreadyBound { host: host::Id, handle: Handle },

    #[error("{0} is not bound")]
    NotBound(Target),

    #[error("binding `{capability}` -> `{component}` is already registered")]
    DuplicateBinding {
        capability: Capability,
        component: Arc<str>,
    },

    #[error("re-entrant publish of {0} while it is being dispatched; enqueue a mutation instead")]
    ReentrantPublish(signal::Kind),

    #[error("stale handle {0}")]
    StaleHandle(Handle),

    #[error("failed to materialize `{component}` from `{capability}` on {handle}: {source}")]
    Materialization {
        handle: Handle,
        capability: Capability,
        component: Arc<str>,
        source: AccessError,
    },

    #[error("failed to synchronize `{capability}` on {handle}: {source}")]
    Synchronization {
        handle: Handle,
        capability: Capability,
        source: AccessError,
    },

    #[error("{} listener(s) reported corrupted state during dispatch", .0.len())]
    ListenerFailure(Vec<ListenerFailure>),

    #[error("{0} was dropped before it could be bound")]
    HostDropped(host::Id),

    #[error("mutation queue was already flushed in frame {0}")]
    AlreadyFlushed(u64),

    #[error("no merge resolver named `{0}`")]
    UnknownResolver(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Contract violations by the caller.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Error::AlreadyBound { .. }
                | Error::DuplicateBinding { .. }
                | Error::ReentrantPublish(_)
                | Error::StaleHandle(_)
                | Error::AlreadyFlushed(_)
                | Error::UnknownResolver(_)
        )
    }

    /// Failures the bridge contains itself: the entity stays tracked, flagged
    /// degraded where it applies.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Materialization { .. }
                | Error::Synchronization { .. }
                | Error::ListenerFailure(_)
        )
    }

    /// Expected outcomes of queued requests racing against teardown. The
    /// mutation queue skips these instead of failing.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            Error::StaleHandle(_) | Error::NotBound(_) | Error::HostDropped(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
