/// The configuration graph: components, links and initial events.
///
/// A model front-end assembles the graph with the transient
/// [`GraphBuilder`]; `build()` checks its structure and yields an
/// immutable [`ConfigGraph`] that the kernel consumes once at `INIT`.
/// The builder is not retained by the simulation.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{Params, SimConfig};
use crate::error::ConfigError;
use crate::event::{Payload, Side, INITIAL_PRIORITY};
use crate::id::{ComponentId, ComponentKey, LinkId, PartitionId};
use crate::time::SimTime;

// ── Descriptors ───────────────────────────────────────────────────────

/// A subcomponent loaded into a named slot of its parent. Only its
/// identity and type are described; the parent instantiates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubComponentDesc {
    pub name: String,
    pub slot: u32,
    pub type_tag: String,
}

/// A component as described by the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDesc {
    pub id: ComponentId,
    pub type_tag: String,
    pub partition: PartitionId,
    pub params: Params,
    pub subcomponents: Vec<SubComponentDesc>,
}

impl ComponentDesc {
    /// A component on partition `(0, 0)` with no parameters.
    pub fn new(id: u64, type_tag: impl Into<String>) -> Self {
        ComponentDesc {
            id: ComponentId::new(id),
            type_tag: type_tag.into(),
            partition: PartitionId::default(),
            params: Params::new(),
            subcomponents: Vec::new(),
        }
    }

    /// Assign the component to `(rank, thread)`.
    pub fn on(mut self, rank: u32, thread: u32) -> Self {
        self.partition = PartitionId::new(rank, thread);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn subcomponent(mut self, name: impl Into<String>, slot: u32, type_tag: impl Into<String>) -> Self {
        self.subcomponents.push(SubComponentDesc {
            name: name.into(),
            slot,
            type_tag: type_tag.into(),
        });
        self
    }

    pub fn key(&self) -> ComponentKey {
        ComponentKey::Component(self.id)
    }

    fn subcomponent_key(&self, sub: &SubComponentDesc) -> ComponentKey {
        ComponentKey::SubComponent {
            parent: self.id,
            slot: sub.slot,
            name: sub.name.clone(),
        }
    }
}

/// A component port: one end of a link.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    pub component: ComponentId,
    pub port: String,
}

impl Endpoint {
    pub fn new(component: u64, port: impl Into<String>) -> Self {
        Endpoint {
            component: ComponentId::new(component),
            port: port.into(),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.component, self.port)
    }
}

/// A bidirectional link between two endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDesc {
    pub id: LinkId,
    pub a: Endpoint,
    pub b: Endpoint,
    pub latency: SimTime,
}

impl LinkDesc {
    pub fn endpoint(&self, side: Side) -> &Endpoint {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }
}

/// An event placed in the vortex before the first epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialEvent {
    pub target: Endpoint,
    pub time: SimTime,
    pub priority: i32,
    pub payload: Payload,
}

// ── ConfigGraph ───────────────────────────────────────────────────────

/// Immutable, structurally valid graph description.
#[derive(Debug, Clone, Default)]
pub struct ConfigGraph {
    components: BTreeMap<ComponentId, ComponentDesc>,
    links: BTreeMap<LinkId, LinkDesc>,
    initial_events: Vec<InitialEvent>,
}

impl ConfigGraph {
    pub fn component(&self, id: ComponentId) -> Option<&ComponentDesc> {
        self.components.get(&id)
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentDesc> {
        self.components.values()
    }

    pub fn link(&self, id: LinkId) -> Option<&LinkDesc> {
        self.links.get(&id)
    }

    pub fn links(&self) -> impl Iterator<Item = &LinkDesc> {
        self.links.values()
    }

    pub fn initial_events(&self) -> &[InitialEvent] {
        &self.initial_events
    }

    pub fn partition_of(&self, id: ComponentId) -> Option<PartitionId> {
        self.components.get(&id).map(|c| c.partition)
    }

    /// Whether the two ends of `link` live in different partitions.
    pub fn is_cross_partition(&self, link: &LinkDesc) -> bool {
        self.partition_of(link.a.component) != self.partition_of(link.b.component)
    }

    /// Smallest latency over all cross-partition links, or
    /// [`SimTime::MAX`] when no link crosses a partition boundary.
    ///
    /// Partitions compute the same value collectively at startup; this
    /// is the whole-graph view of it.
    pub fn min_cross_latency(&self) -> SimTime {
        self.links
            .values()
            .filter(|l| self.is_cross_partition(l))
            .map(|l| l.latency)
            .min()
            .unwrap_or(SimTime::MAX)
    }

    /// Every identity in the graph, components and subcomponents, in
    /// [`ComponentKey`] order.
    pub fn keys(&self) -> Vec<ComponentKey> {
        let mut keys: Vec<ComponentKey> = self
            .components
            .values()
            .flat_map(|c| {
                std::iter::once(c.key()).chain(c.subcomponents.iter().map(|s| c.subcomponent_key(s)))
            })
            .collect();
        keys.sort();
        keys
    }

    /// Type tag of a component or subcomponent.
    pub fn type_of(&self, key: &ComponentKey) -> Option<&str> {
        match key {
            ComponentKey::Component(id) => self.components.get(id).map(|c| c.type_tag.as_str()),
            ComponentKey::SubComponent { parent, slot, name } => self
                .components
                .get(parent)?
                .subcomponents
                .iter()
                .find(|s| s.slot == *slot && &s.name == name)
                .map(|s| s.type_tag.as_str()),
        }
    }

    /// Check that every component sits in a partition `config` runs.
    pub fn check_partitions(&self, config: &SimConfig) -> Result<(), ConfigError> {
        config.validate()?;
        for c in self.components.values() {
            if !config.contains(c.partition) {
                return Err(ConfigError::PartitionOutOfRange {
                    component: c.id,
                    partition: c.partition,
                });
            }
        }
        Ok(())
    }
}

// ── GraphBuilder ──────────────────────────────────────────────────────

/// Fluent builder for a [`ConfigGraph`].
///
/// # Example
/// ```rust
/// use parsim::graph::{ComponentDesc, GraphBuilder};
///
/// let graph = GraphBuilder::new()
///     .component(ComponentDesc::new(0, "clock").on(0, 0).param("period", 5))
///     .component(ComponentDesc::new(1, "echo").on(0, 1))
///     .link(0, (0, "out"), (1, "port"), 2)
///     .initial(0, "tick", 0)
///     .build()
///     .unwrap();
/// assert_eq!(graph.min_cross_latency().ticks(), 2);
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    components: Vec<ComponentDesc>,
    links: Vec<LinkDesc>,
    initial_events: Vec<InitialEvent>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    pub fn component(mut self, desc: ComponentDesc) -> Self {
        self.components.push(desc);
        self
    }

    /// Connect `a` and `b` with a link of `latency` ticks.
    pub fn link(mut self, id: u64, a: (u64, &str), b: (u64, &str), latency: u64) -> Self {
        self.links.push(LinkDesc {
            id: LinkId::new(id),
            a: Endpoint::new(a.0, a.1),
            b: Endpoint::new(b.0, b.1),
            latency: SimTime::new(latency),
        });
        self
    }

    /// Seed an empty-payload event at `time` on `component`'s `port`.
    pub fn initial(self, component: u64, port: &str, time: u64) -> Self {
        self.initial_with(component, port, time, Payload::Empty)
    }

    pub fn initial_with(mut self, component: u64, port: &str, time: u64, payload: Payload) -> Self {
        self.initial_events.push(InitialEvent {
            target: Endpoint::new(component, port),
            time: SimTime::new(time),
            priority: INITIAL_PRIORITY,
            payload,
        });
        self
    }

    /// Check the structure and freeze the graph.
    ///
    /// Rejects duplicate ids, dangling endpoints, ports connected twice,
    /// duplicate subcomponent slots, zero-latency cross-partition links
    /// and initial events aimed at unknown components.
    pub fn build(self) -> Result<ConfigGraph, ConfigError> {
        let mut components = BTreeMap::new();
        for desc in self.components {
            let mut slots = BTreeSet::new();
            for sub in &desc.subcomponents {
                let key = desc.subcomponent_key(sub);
                if !slots.insert(key.clone()) {
                    return Err(ConfigError::DuplicateSubComponent(key));
                }
            }
            let id = desc.id;
            if components.insert(id, desc).is_some() {
                return Err(ConfigError::DuplicateComponent(id));
            }
        }

        let mut links = BTreeMap::new();
        let mut used_ports = BTreeSet::new();
        for link in self.links {
            for end in [&link.a, &link.b] {
                if !components.contains_key(&end.component) {
                    return Err(ConfigError::DanglingEndpoint {
                        link: link.id,
                        component: end.component,
                    });
                }
                if !used_ports.insert(end.clone()) {
                    return Err(ConfigError::PortAlreadyConnected {
                        component: end.component,
                        port: end.port.clone(),
                    });
                }
            }
            let id = link.id;
            if links.insert(id, link).is_some() {
                return Err(ConfigError::DuplicateLink(id));
            }
        }

        for event in &self.initial_events {
            if !components.contains_key(&event.target.component) {
                return Err(ConfigError::UnknownInitialTarget(event.target.component));
            }
        }

        let graph = ConfigGraph {
            components,
            links,
            initial_events: self.initial_events,
        };

        for link in graph.links.values() {
            if graph.is_cross_partition(link) && link.latency == SimTime::ZERO {
                return Err(ConfigError::ZeroLatencyCrossPartition { link: link.id });
            }
        }

        Ok(graph)
    }
}
