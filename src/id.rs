//! Identifiers — lightweight, ordered, copyable newtypes.
//!
//! Each identifier wraps a bare integer so that component ids, link ids
//! and partition ids cannot be confused with each other (or with ticks
//! and sequence numbers) at compile time.

use std::cmp::Ordering;

/// A unique identifier for a component in the configuration graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ComponentId(u64);

impl ComponentId {
    #[inline]
    pub const fn new(id: u64) -> Self {
        ComponentId(id)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// A unique identifier for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkId(u64);

impl LinkId {
    #[inline]
    pub const fn new(id: u64) -> Self {
        LinkId(id)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A parallel execution partition: one thread of one rank.
///
/// Partitions order by `(rank, thread)`, which is also the order used
/// whenever the kernel needs a deterministic iteration over peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PartitionId {
    pub rank: u32,
    pub thread: u32,
}

impl PartitionId {
    #[inline]
    pub const fn new(rank: u32, thread: u32) -> Self {
        PartitionId { rank, thread }
    }
}

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}.{}", self.rank, self.thread)
    }
}

/// Identity of anything placed in the configuration graph.
///
/// Top-level components are identified by id alone; subcomponents by the
/// slot they occupy on their parent. The derived order puts every
/// component before every subcomponent, and orders subcomponents by
/// parent, slot, then name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ComponentKey {
    Component(ComponentId),
    SubComponent {
        parent: ComponentId,
        slot: u32,
        name: String,
    },
}

impl ComponentKey {
    /// The top-level component that owns this key.
    pub fn base(&self) -> ComponentId {
        match self {
            ComponentKey::Component(id) => *id,
            ComponentKey::SubComponent { parent, .. } => *parent,
        }
    }

    /// Compare only the owning components, ignoring slots.
    pub fn cmp_base(&self, other: &ComponentKey) -> Ordering {
        self.base().cmp(&other.base())
    }
}

impl From<ComponentId> for ComponentKey {
    fn from(id: ComponentId) -> Self {
        ComponentKey::Component(id)
    }
}

impl std::fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentKey::Component(id) => write!(f, "{}", id),
            ComponentKey::SubComponent { parent, slot, name } => {
                write!(f, "{}:{}[{}]", parent, name, slot)
            }
        }
    }
}
