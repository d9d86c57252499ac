//! Statistics hook invoked at every synchronized epoch boundary.
//!
//! The kernel does not format or store statistics. It hands each
//! partition's collector a read-only [`EpochSample`] right after the
//! epoch's inbound events were delivered; what to keep is up to the
//! collector.

use std::collections::BTreeMap;

use crate::component::Component;
use crate::id::{ComponentId, PartitionId};
use crate::time::SimTime;

/// Read-only view of a partition at an epoch boundary.
pub struct EpochSample<'a> {
    pub partition: PartitionId,
    /// Index of the epoch that just closed.
    pub epoch: u64,
    pub epoch_bound: SimTime,
    pub clock: SimTime,
    pub dispatched: u64,
    /// Events in the vortex, including the ones just delivered.
    pub pending: usize,
    pub next_time: Option<SimTime>,
    pub(crate) components: &'a BTreeMap<ComponentId, Box<dyn Component>>,
}

impl EpochSample<'_> {
    /// Downcast a component of this partition for inspection.
    pub fn component<T: Component + 'static>(&self, id: ComponentId) -> Option<&T> {
        self.components.get(&id)?.as_any().downcast_ref::<T>()
    }

    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.keys().copied()
    }
}

/// Receives one [`EpochSample`] per epoch.
pub trait StatsCollector: Send {
    fn collect(&mut self, sample: &EpochSample<'_>);
}

/// Blanket implementation so closures can be used as collectors.
impl<F> StatsCollector for F
where
    F: FnMut(&EpochSample<'_>) + Send,
{
    fn collect(&mut self, sample: &EpochSample<'_>) {
        self(sample)
    }
}
