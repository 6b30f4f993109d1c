//! Bridge configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! [sync]
//! workers = 4
//! parallel_threshold = 256
//!
//! [queue]
//! warn_on_stale = false
//!
//! [[bindings]]
//! capability = "transform"
//! component = "Position"
//! direction = "bidirectional"
//! policy = "host_wins"
//!
//! [[bindings]]
//! capability = "health"
//! component = "Health"
//! policy = { merge = "changed_side" }
//! ```

use std::{fs, num::NonZeroUsize, path::Path, thread};

use serde::{Deserialize, Serialize};

use crate::bridge::{
    binding::Direction,
    error::{Error, Result},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub queue: QueueConfig,
    pub bindings: Vec<BindingConfig>,
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Bulk synchronization settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Worker threads used by `synchronize_all`. 1 keeps the pass on the
    /// calling thread.
    pub workers: usize,
    /// Minimum number of bound entities before the pass is split across
    /// workers. 0 splits every non-empty pass.
    pub parallel_threshold: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, NonZeroUsize::get),
            parallel_threshold: 256,
        }
    }
}

/// Mutation queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Log stale mutations at warn level instead of debug.
    pub warn_on_stale: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            warn_on_stale: true,
        }
    }
}

/// A binding rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConfig {
    pub capability: String,
    pub component: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// A conflict policy as written in configuration. Merge resolvers are
/// referenced by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyConfig {
    #[default]
    HostWins,
    EcsWins,
    Merge(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        // Given
        let source = r#"
            [sync]
            workers = 4
            parallel_threshold = 64

            [queue]
            warn_on_stale = false

            [[bindings]]
            capability = "transform"
            component = "Position"
            direction = "bidirectional"
            policy = "ecs_wins"

            [[bindings]]
            capability = "health"
            component = "Health"
            direction = "host_to_ecs"
            policy = { merge = "changed_side" }
        "#;

        // When
        let config = Config::from_toml_str(source).unwrap();

        // Then
        assert_eq!(config.sync.workers, 4);
        assert_eq!(config.sync.parallel_threshold, 64);
        assert!(!config.queue.warn_on_stale);
        assert_eq!(config.bindings.len(), 2);
        assert_eq!(config.bindings[0].policy, PolicyConfig::EcsWins);
        assert_eq!(config.bindings[1].direction, Direction::HostToEcs);
        assert_eq!(
            config.bindings[1].policy,
            PolicyConfig::Merge("changed_side".into())
        );
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = Config::from_toml_str(
            r#"
            [[bindings]]
            capability = "transform"
            component = "Position"
            "#,
        )
        .unwrap();

        assert!(config.queue.warn_on_stale);
        assert_eq!(config.sync.parallel_threshold, 256);
        assert!(config.sync.workers >= 1);
        assert_eq!(config.bindings[0].direction, Direction::Bidirectional);
        assert_eq!(config.bindings[0].policy, PolicyConfig::HostWins);
    }

    #[test]
    fn invalid_documents_are_config_errors() {
        let result = Config::from_toml_str("[[bindings]]\ncapability = 3");

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        let result = Config::load("/definitely/not/here/bridge.toml");

        assert!(matches!(result, Err(Error::Config(message)) if message.contains("bridge.toml")));
    }

    #[test]
    fn serializes_back_to_toml() {
        let mut config = Config::default();
        config.bindings.push(BindingConfig {
            capability: "transform".into(),
            component: "Position".into(),
            direction: Direction::EcsToHost,
            policy: PolicyConfig::EcsWins,
        });

        let text = config.to_toml_string().unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();

        assert_eq!(parsed, config);
    }
}
