use std::{collections::HashSet, sync::Arc};

use log::{debug, trace};

use crate::bridge::{
    binding::{Binding, ConflictPolicy, Direction, Merge, Resolvers},
    component,
    config::{BindingConfig, PolicyConfig},
    entity::Handle,
    error::{Error, Result},
    host::{Capability, HostObject},
    world::Row,
};

/// Components created for a newly bound entity.
#[derive(Debug, Default)]
pub struct Materialized {
    /// Components added, in binding registration order.
    pub components: Vec<component::Id>,
    /// Capabilities that could not be read. The entity stays bound without them.
    pub failures: Vec<Error>,
}

impl Materialized {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a synchronization pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Entities visited.
    pub entities: usize,
    /// Values written to ECS components.
    pub to_ecs: usize,
    /// Values written to host objects.
    pub to_host: usize,
    /// Bidirectional divergences settled by a conflict policy.
    pub conflicts: usize,
    pub failures: Vec<Error>,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.entities += other.entities;
        self.to_ecs += other.to_ecs;
        self.to_host += other.to_host;
        self.conflicts += other.conflicts;
        self.failures.extend(other.failures);
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The registered binding rules.
///
/// Registration order is significant: materialization visits bindings in the
/// order they were registered, and when two capabilities feed the same
/// component the first one registered provides the initial value.
#[derive(Default)]
pub struct Table {
    components: component::Registry,
    bindings: Vec<Binding>,
    pairs: HashSet<(Capability, component::Id)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from configuration, resolving merge policies by name.
    pub fn from_config(configs: &[BindingConfig], resolvers: &Resolvers) -> Result<Self> {
        let mut table = Self::new();
        for config in configs {
            let policy = match &config.policy {
                PolicyConfig::HostWins => ConflictPolicy::HostWins,
                PolicyConfig::EcsWins => ConflictPolicy::EcsWins,
                PolicyConfig::Merge(name) => resolvers.policy(name)?,
            };
            table.register(
                config.capability.as_str(),
                &config.component,
                config.direction,
                policy,
            )?;
        }
        Ok(table)
    }

    /// Register a capability -> component rule. Returns the component's id.
    pub fn register(
        &mut self,
        capability: impl Into<Capability>,
        component: &str,
        direction: Direction,
        policy: ConflictPolicy,
    ) -> Result<component::Id> {
        let capability = capability.into();
        let id = self.components.register(component);
        if !self.pairs.insert((capability.clone(), id)) {
            return Err(Error::DuplicateBinding {
                capability,
                component: Arc::from(component),
            });
        }

        debug!(
            "Binding `{}` -> `{}` ({:?}, {:?})",
            capability, component, direction, policy
        );
        self.bindings.push(Binding {
            capability,
            component: id,
            component_name: Arc::from(component),
            direction,
            policy,
        });
        Ok(id)
    }

    /// All bindings in registration order.
    #[inline]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Component names known to the bridge.
    #[inline]
    pub fn components(&self) -> &component::Registry {
        &self.components
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings whose capability the host object exposes.
    pub fn applicable<'a>(
        &'a self,
        host: &'a dyn HostObject,
    ) -> impl Iterator<Item = &'a Binding> + 'a {
        self.bindings
            .iter()
            .filter(move |binding| host.has_capability(&binding.capability))
    }

    /// Read every applicable capability into a component on `row`.
    ///
    /// A capability that fails to read is reported and skipped; the remaining
    /// bindings are still materialized.
    pub fn materialize(
        &self,
        handle: Handle,
        host: &dyn HostObject,
        row: &mut Row,
    ) -> Materialized {
        let mut materialized = Materialized::default();
        for binding in self.applicable(host) {
            if row.contains(binding.component) {
                continue;
            }
            match host.read(&binding.capability) {
                Ok(value) => {
                    row.insert(binding.component, value);
                    materialized.components.push(binding.component);
                }
                Err(source) => materialized.failures.push(Error::Materialization {
                    handle,
                    capability: binding.capability.clone(),
                    component: binding.component_name.clone(),
                    source,
                }),
            }
        }
        materialized
    }

    /// Propagate values between a host object and its entity.
    ///
    /// `direction` limits which side this call may write: a binding only
    /// moves values along the flow both it and `direction` permit. One-way
    /// bindings mirror their source side. Bidirectional bindings resolve any
    /// divergence through their conflict policy.
    pub fn synchronize(
        &self,
        handle: Handle,
        host: &dyn HostObject,
        row: &mut Row,
        direction: Direction,
    ) -> SyncReport {
        let mut report = SyncReport {
            entities: 1,
            ..Default::default()
        };

        for binding in &self.bindings {
            let Some(flow) = binding.direction.restrict(direction) else {
                continue;
            };
            let Some(slot) = row.slot_mut(binding.component) else {
                continue;
            };
            if !host.has_capability(&binding.capability) {
                continue;
            }

            let host_value = match host.read(&binding.capability) {
                Ok(value) => value,
                Err(source) => {
                    report.failures.push(Error::Synchronization {
                        handle,
                        capability: binding.capability.clone(),
                        source,
                    });
                    continue;
                }
            };

            if host_value == *slot.value() {
                slot.set_synced(host_value);
                continue;
            }

            let target = match binding.direction {
                Direction::HostToEcs => host_value.clone(),
                Direction::EcsToHost => slot.value().clone(),
                Direction::Bidirectional => {
                    report.conflicts += 1;
                    binding.policy.resolve(Merge {
                        host: &host_value,
                        ecs: slot.value(),
                        base: slot.synced(),
                    })
                }
            };
            trace!(
                "Synchronizing `{}` on {}: host {} ecs {} -> {}",
                binding.capability,
                handle,
                host_value,
                slot.value(),
                target
            );

            let mut settled = true;
            if *slot.value() != target {
                if flow.reads_host() {
                    slot.set(target.clone());
                    report.to_ecs += 1;
                } else {
                    settled = false;
                }
            }
            if host_value != target {
                if !flow.writes_host() {
                    settled = false;
                } else {
                    match host.write(&binding.capability, target.clone()) {
                        Ok(()) => report.to_host += 1,
                        Err(source) => {
                            settled = false;
                            report.failures.push(Error::Synchronization {
                                handle,
                                capability: binding.capability.clone(),
                                source,
                            });
                        }
                    }
                }
            }
            if settled {
                slot.set_synced(target);
            }
        }

        report
    }
}
