//! Capability -> component binding rules.
//!
//! A [`Binding`] says that host objects exposing a capability get a component
//! of the given type, that values flow in the given [`Direction`], and how a
//! disagreement between the two sides is settled ([`ConflictPolicy`]).
//!
//! # Conflicts
//!
//! Host objects carry no change tracking the bridge could observe, so for a
//! bidirectional binding any divergence between the host value and the ECS
//! value at synchronization time is a conflict and the policy picks the
//! winner. Merge resolvers also receive the last synchronized value as the
//! common base, which lets them tell which side actually moved (see
//! [`resolvers::changed_side`]).

mod table;

use std::{collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

pub use table::{Materialized, SyncReport, Table};

use crate::bridge::{
    component,
    error::{Error, Result},
    host::Capability,
    value::Value,
};

/// Which way values flow for a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HostToEcs,
    EcsToHost,
    #[default]
    Bidirectional,
}

impl Direction {
    #[inline]
    pub fn reads_host(self) -> bool {
        matches!(self, Direction::HostToEcs | Direction::Bidirectional)
    }

    #[inline]
    pub fn writes_host(self) -> bool {
        matches!(self, Direction::EcsToHost | Direction::Bidirectional)
    }

    /// The flow permitted by both directions, if any.
    pub fn restrict(self, other: Direction) -> Option<Direction> {
        match (self, other) {
            (Direction::Bidirectional, d) | (d, Direction::Bidirectional) => Some(d),
            (a, b) if a == b => Some(a),
            _ => None,
        }
    }
}

/// The three values a merge resolver sees.
#[derive(Debug, Clone, Copy)]
pub struct Merge<'a> {
    pub host: &'a Value,
    pub ecs: &'a Value,
    /// The value both sides agreed on at the last synchronization.
    pub base: &'a Value,
}

/// A named merge function.
pub type Resolver = Arc<dyn Fn(Merge<'_>) -> Value + Send + Sync>;

/// How a bidirectional conflict is settled.
#[derive(Clone, Default)]
pub enum ConflictPolicy {
    #[default]
    HostWins,
    EcsWins,
    Merge { name: Arc<str>, resolver: Resolver },
}

impl ConflictPolicy {
    pub fn merge<F>(name: impl Into<Arc<str>>, resolver: F) -> Self
    where
        F: Fn(Merge<'_>) -> Value + Send + Sync + 'static,
    {
        ConflictPolicy::Merge {
            name: name.into(),
            resolver: Arc::new(resolver),
        }
    }

    /// Pick the value both sides should hold.
    pub fn resolve(&self, merge: Merge<'_>) -> Value {
        match self {
            ConflictPolicy::HostWins => merge.host.clone(),
            ConflictPolicy::EcsWins => merge.ecs.clone(),
            ConflictPolicy::Merge { resolver, .. } => resolver(merge),
        }
    }
}

impl fmt::Debug for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::HostWins => f.write_str("HostWins"),
            ConflictPolicy::EcsWins => f.write_str("EcsWins"),
            ConflictPolicy::Merge { name, .. } => write!(f, "Merge({name})"),
        }
    }
}

/// Named merge resolvers available to configuration.
#[derive(Clone)]
pub struct Resolvers {
    by_name: HashMap<String, Resolver>,
}

impl Default for Resolvers {
    /// The built-in resolvers.
    fn default() -> Self {
        let mut builtin = Self::empty();
        builtin
            .register("changed_side", resolvers::changed_side)
            .register("average", resolvers::average);
        builtin
    }
}

impl Resolvers {
    pub fn empty() -> Self {
        Self {
            by_name: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, resolver: F) -> &mut Self
    where
        F: Fn(Merge<'_>) -> Value + Send + Sync + 'static,
    {
        self.by_name.insert(name.into(), Arc::new(resolver));
        self
    }

    /// Build a merge policy from a registered resolver.
    pub fn policy(&self, name: &str) -> Result<ConflictPolicy> {
        let resolver = self
            .by_name
            .get(name)
            .ok_or_else(|| Error::UnknownResolver(name.to_string()))?;
        Ok(ConflictPolicy::Merge {
            name: Arc::from(name),
            resolver: resolver.clone(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

/// Built-in merge resolvers.
pub mod resolvers {
    use super::Merge;
    use crate::bridge::value::Value;

    /// Keep whichever side moved away from the last synchronized value. The
    /// host wins when both moved.
    pub fn changed_side(merge: Merge<'_>) -> Value {
        if merge.host == merge.base {
            merge.ecs.clone()
        } else {
            merge.host.clone()
        }
    }

    /// Component-wise mean of numeric values. Non-numeric values fall back to
    /// the host side.
    pub fn average(merge: Merge<'_>) -> Value {
        match (merge.host, merge.ecs) {
            (Value::Float(a), Value::Float(b)) => Value::Float((a + b) / 2.0),
            (Value::Int(a), Value::Int(b)) => Value::Int(((*a as i128 + *b as i128) / 2) as i64),
            (Value::Vec3(a), Value::Vec3(b)) => {
                Value::Vec3([(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0, (a[2] + b[2]) / 2.0])
            }
            (host, _) => host.clone(),
        }
    }
}

/// A registered capability -> component rule.
#[derive(Debug, Clone)]
pub struct Binding {
    capability: Capability,
    component: component::Id,
    component_name: Arc<str>,
    direction: Direction,
    policy: ConflictPolicy,
}

impl Binding {
    #[inline]
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    #[inline]
    pub fn component(&self) -> component::Id {
        self.component
    }

    #[inline]
    pub fn component_name(&self) -> &Arc<str> {
        &self.component_name
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restrict_direction() {
        use Direction::*;

        assert_eq!(Bidirectional.restrict(HostToEcs), Some(HostToEcs));
        assert_eq!(EcsToHost.restrict(Bidirectional), Some(EcsToHost));
        assert_eq!(Bidirectional.restrict(Bidirectional), Some(Bidirectional));
        assert_eq!(HostToEcs.restrict(HostToEcs), Some(HostToEcs));
        assert_eq!(HostToEcs.restrict(EcsToHost), None);
    }

    #[test]
    fn policies_pick_a_side() {
        let host = Value::Int(1);
        let ecs = Value::Int(5);
        let merge = Merge {
            host: &host,
            ecs: &ecs,
            base: &host,
        };

        assert_eq!(ConflictPolicy::HostWins.resolve(merge), Value::Int(1));
        assert_eq!(ConflictPolicy::EcsWins.resolve(merge), Value::Int(5));
        assert_eq!(
            ConflictPolicy::merge("max", |m| {
                Value::Int(m.host.as_int().max(m.ecs.as_int()).unwrap_or_default())
            })
            .resolve(merge),
            Value::Int(5)
        );
    }

    #[test]
    fn average_of_large_ints_does_not_overflow() {
        // Given
        let high = Value::Int(i64::MAX);
        let near = Value::Int(i64::MAX - 2);
        let low = Value::Int(i64::MIN);
        let base = Value::Int(0);
        let average = |host: &Value, ecs: &Value| {
            resolvers::average(Merge {
                host,
                ecs,
                base: &base,
            })
        };

        // Then
        assert_eq!(average(&high, &near), Value::Int(i64::MAX - 1));
        assert_eq!(average(&low, &low), Value::Int(i64::MIN));
        assert_eq!(average(&high, &low), Value::Int(0));
    }

    #[test]
    fn changed_side_follows_the_mover() {
        let base = Value::Int(0);
        let moved = Value::Int(7);

        let ecs_moved = Merge {
            host: &base,
            ecs: &moved,
            base: &base,
        };
        let host_moved = Merge {
            host: &moved,
            ecs: &base,
            base: &base,
        };

        assert_eq!(resolvers::changed_side(ecs_moved), Value::Int(7));
        assert_eq!(resolvers::changed_side(host_moved), Value::Int(7));
    }

    #[test]
    fn average_of_vectors() {
        let host = Value::Vec3([0.0, 2.0, 4.0]);
        let ecs = Value::Vec3([2.0, 2.0, 0.0]);
        let merge = Merge {
            host: &host,
            ecs: &ecs,
            base: &host,
        };

        assert_eq!(resolvers::average(merge), Value::Vec3([1.0, 2.0, 2.0]));
    }

    #[test]
    fn unknown_resolver_is_rejected() {
        let resolvers = Resolvers::default();

        assert!(resolvers.policy("changed_side").is_ok());
        assert!(matches!(
            resolvers.policy("nope"),
            Err(Error::UnknownResolver(name)) if name == "nope"
        ));
    }
}
