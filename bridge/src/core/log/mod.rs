//! Logging backends for the `log` facade.

mod channel;

pub use channel::{ChannelLogger, LogMessage, init};
