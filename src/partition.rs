//! Partition — one thread's share of the model.
//!
//! A partition exclusively owns a subset of the components, one
//! [`TimeVortex`], the local clock, and the sequence counter its events
//! are stamped with. Nothing in here is shared with other partitions;
//! the only way out is the [`SyncManager`]'s outbound buffer.

use std::collections::BTreeMap;

use tracing::trace;

use crate::component::{Component, HandlerContext};
use crate::config::SimConfig;
use crate::driver::DriverState;
use crate::error::{CausalityError, SimError, SimResult, SnapshotError};
use crate::event::{Destination, Event, SequenceGen};
use crate::graph::ConfigGraph;
use crate::id::{ComponentId, PartitionId};
use crate::link::LinkTable;
use crate::registry::ComponentRegistry;
use crate::report::PartitionReport;
use crate::snapshot::PartitionSnapshot;
use crate::stats::{EpochSample, StatsCollector};
use crate::sync::{EpochPhase, SyncManager};
use crate::time::SimTime;
use crate::trace::TraceEntry;
use crate::vortex::TimeVortex;

// ── PartitionCore ─────────────────────────────────────────────────────

/// Scheduling state of a partition: everything except the components
/// themselves, so that a handler can borrow it while its own component
/// is borrowed mutably.
#[derive(Debug)]
pub struct PartitionCore {
    id: PartitionId,
    clock: SimTime,
    vortex: TimeVortex,
    sequence: SequenceGen,
    links: LinkTable,
    sync: SyncManager,
    dispatched: u64,
    trace: Option<Vec<TraceEntry>>,
}

impl PartitionCore {
    fn new(id: PartitionId, links: LinkTable, record_trace: bool) -> Self {
        PartitionCore {
            id,
            clock: SimTime::ZERO,
            vortex: TimeVortex::new(),
            sequence: SequenceGen::new(),
            links,
            sync: SyncManager::new(),
            dispatched: 0,
            trace: record_trace.then(Vec::new),
        }
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn clock(&self) -> SimTime {
        self.clock
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    pub fn vortex(&self) -> &TimeVortex {
        &self.vortex
    }

    pub fn sync(&self) -> &SyncManager {
        &self.sync
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.sequence.next_sequence()
    }

    /// Insert into the local vortex, refusing anything in the past.
    pub(crate) fn schedule(&mut self, event: Event) -> SimResult<()> {
        if event.delivery_time < self.clock {
            return Err(CausalityError {
                partition: self.id,
                requested: event.delivery_time,
                clock: self.clock,
            }
            .into());
        }
        self.vortex.insert(event);
        Ok(())
    }

    /// Local destinations go straight into the vortex; remote ones wait
    /// in the outbound buffer for the next exchange.
    pub(crate) fn route(&mut self, event: Event, to: PartitionId) -> SimResult<()> {
        if to == self.id {
            self.schedule(event)
        } else {
            self.sync.buffer(to, event);
            Ok(())
        }
    }
}

// ── Partition ─────────────────────────────────────────────────────────

/// Components plus their scheduling state.
pub struct Partition {
    components: BTreeMap<ComponentId, Box<dyn Component>>,
    core: PartitionCore,
    collector: Option<Box<dyn StatsCollector>>,
    state: DriverState,
}

impl Partition {
    /// Instantiate the components assigned to `id`. Neither initial
    /// events nor `setup` run yet; see [`seed`](Self::seed).
    pub fn build(
        id: PartitionId,
        graph: &ConfigGraph,
        registry: &ComponentRegistry,
        config: &SimConfig,
    ) -> SimResult<Self> {
        let mut components = BTreeMap::new();
        for desc in graph.components().filter(|c| c.partition == id) {
            components.insert(desc.id, registry.create(desc)?);
        }
        Ok(Partition {
            components,
            core: PartitionCore::new(id, LinkTable::for_partition(graph, id), config.record_trace),
            collector: None,
            state: DriverState::Init,
        })
    }

    /// Queue the graph's initial events for this partition, then call
    /// `setup` on every component in id order.
    pub fn seed(&mut self, graph: &ConfigGraph) -> SimResult<()> {
        for initial in graph.initial_events() {
            if !self.components.contains_key(&initial.target.component) {
                continue;
            }
            let event = Event {
                payload: initial.payload.clone(),
                delivery_time: initial.time,
                priority: initial.priority,
                sequence: self.core.next_sequence(),
                origin: self.core.id,
                destination: Destination::Port {
                    component: initial.target.component,
                    port: initial.target.port.clone(),
                },
            };
            self.core.schedule(event)?;
        }
        for (id, component) in self.components.iter_mut() {
            let mut ctx = HandlerContext::new(&mut self.core, *id);
            component.setup(&mut ctx)?;
        }
        Ok(())
    }

    // ── Accessors ─────────────────────────────────────────────────────

    pub fn id(&self) -> PartitionId {
        self.core.id
    }

    pub fn clock(&self) -> SimTime {
        self.core.clock
    }

    pub fn pending(&self) -> usize {
        self.core.vortex.len()
    }

    pub fn next_time(&self) -> Option<SimTime> {
        self.core.vortex.next_time()
    }

    pub fn dispatched(&self) -> u64 {
        self.core.dispatched
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn core(&self) -> &PartitionCore {
        &self.core
    }

    pub fn sync(&self) -> &SyncManager {
        &self.core.sync
    }

    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.components.keys().copied().collect()
    }

    /// Downcast a component reference for inspection.
    ///
    /// Returns `None` if the component is not here or has another type.
    pub fn component<T: Component + 'static>(&self, id: ComponentId) -> Option<&T> {
        self.components.get(&id)?.as_any().downcast_ref::<T>()
    }

    pub fn component_mut<T: Component + 'static>(&mut self, id: ComponentId) -> Option<&mut T> {
        self.components.get_mut(&id)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn attach_collector(&mut self, collector: Box<dyn StatsCollector>) {
        self.collector = Some(collector);
    }

    pub(crate) fn set_state(&mut self, state: DriverState) {
        self.state = state;
    }

    pub(crate) fn sync_mut(&mut self) -> &mut SyncManager {
        &mut self.core.sync
    }

    /// This partition's contribution to the lookahead reduction.
    pub(crate) fn local_lookahead(&self) -> SimTime {
        self.core.links.min_remote_latency(self.core.id)
    }

    // ── Execution ─────────────────────────────────────────────────────

    /// Pop the smallest event, advance the clock, and run its handler.
    pub fn dispatch_next(&mut self) -> SimResult<()> {
        let event = self.core.vortex.pop_min()?;
        let partition = self.core.id;
        let (component, port) = match &event.destination {
            Destination::Port { component, port } => (*component, port.clone()),
            Destination::Link(end) => {
                let endpoint = self
                    .core
                    .links
                    .resolve(*end)
                    .ok_or(SimError::Unroutable { partition, end: *end })?;
                (endpoint.component, endpoint.port.clone())
            }
        };
        let target = self
            .components
            .get_mut(&component)
            .ok_or(SimError::UnknownComponent { component, partition })?;

        self.core.clock = event.delivery_time;
        self.core.dispatched += 1;
        trace!(%event, %component, "dispatch");
        if let Some(entries) = self.core.trace.as_mut() {
            entries.push(TraceEntry {
                time: event.delivery_time,
                priority: event.priority,
                sequence: event.sequence,
                origin: event.origin,
                component,
                port: port.clone(),
            });
        }

        let mut ctx = HandlerContext::new(&mut self.core, component);
        target.handle(&mut ctx, &port, event)
    }

    /// Insert events received in an exchange.
    pub fn deliver(&mut self, events: Vec<Event>) -> SimResult<()> {
        for event in events {
            self.core.schedule(event)?;
        }
        Ok(())
    }

    /// Hand the attached collector a view of this partition.
    pub fn collect(&mut self) {
        if let Some(collector) = self.collector.as_mut() {
            let sample = EpochSample {
                partition: self.core.id,
                epoch: self.core.sync.epoch(),
                epoch_bound: self.core.sync.epoch_bound(),
                clock: self.core.clock,
                dispatched: self.core.dispatched,
                pending: self.core.vortex.len(),
                next_time: self.core.vortex.next_time(),
                components: &self.components,
            };
            collector.collect(&sample);
        }
    }

    pub fn finish(&mut self) {
        let now = self.core.clock;
        for component in self.components.values_mut() {
            component.finish(now);
        }
    }

    /// Report of this partition. Drains the trace recorded so far.
    pub(crate) fn report(&mut self) -> PartitionReport {
        PartitionReport {
            id: self.core.id,
            clock: self.core.clock,
            epoch: self.core.sync.epoch(),
            dispatched: self.core.dispatched,
            pending: self.core.vortex.len(),
            sent_remote: self.core.sync.sent_remote(),
            received_remote: self.core.sync.received_remote(),
            trace: self
                .core
                .trace
                .as_mut()
                .map(std::mem::take)
                .unwrap_or_default(),
        }
    }

    // ── Snapshots ─────────────────────────────────────────────────────

    pub fn snapshot(&self) -> PartitionSnapshot {
        PartitionSnapshot {
            id: self.core.id,
            phase: self.core.sync.phase(),
            epoch: self.core.sync.epoch(),
            epoch_bound: self.core.sync.epoch_bound(),
            clock: self.core.clock,
            next_sequence: self.core.sequence.peek(),
            dispatched: self.core.dispatched,
            sent_remote: self.core.sync.sent_remote(),
            received_remote: self.core.sync.received_remote(),
            components: self
                .components
                .iter()
                .map(|(id, c)| (*id, c.save_state()))
                .collect(),
            pending: self.core.vortex.to_ordered_vec(),
            outbound: self.core.sync.outbound().clone(),
        }
    }

    /// Re-seed this freshly built partition from `snapshot`. `peers`
    /// lists every partition of the simulation, this one included.
    ///
    /// Pending events go back through the causality check; a snapshot
    /// that would move the clock backwards is refused, not repaired.
    pub fn restore(
        &mut self,
        snapshot: &PartitionSnapshot,
        lookahead: Option<SimTime>,
        peers: &[PartitionId],
    ) -> SimResult<()> {
        if snapshot.id != self.core.id {
            return Err(SnapshotError::Mismatch(format!(
                "snapshot of {} applied to {}",
                snapshot.id, self.core.id
            ))
            .into());
        }
        if matches!(snapshot.phase, EpochPhase::Complete(_)) {
            return Err(SnapshotError::NotAtBoundary.into());
        }
        let ours: Vec<ComponentId> = self.components.keys().copied().collect();
        let theirs: Vec<ComponentId> = snapshot.components.keys().copied().collect();
        if ours != theirs {
            return Err(SnapshotError::Mismatch(format!(
                "{} holds components {:?}, snapshot has {:?}",
                self.core.id, ours, theirs
            ))
            .into());
        }

        // Before the lookahead is known the bound is still zero.
        if lookahead.is_some() && snapshot.clock >= snapshot.epoch_bound {
            return Err(SnapshotError::Mismatch(format!(
                "{} clock {} is not below its epoch bound {}",
                self.core.id, snapshot.clock, snapshot.epoch_bound
            ))
            .into());
        }
        for (dest, events) in &snapshot.outbound {
            if *dest == self.core.id || !peers.contains(dest) {
                return Err(SnapshotError::Mismatch(format!(
                    "{} buffers events for unknown peer {}",
                    self.core.id, dest
                ))
                .into());
            }
            if let Some(early) = events.iter().find(|e| e.delivery_time < snapshot.epoch_bound) {
                return Err(SnapshotError::Mismatch(format!(
                    "{} buffers an event for {} at {}, before the epoch bound {}",
                    self.core.id, dest, early.delivery_time, snapshot.epoch_bound
                ))
                .into());
            }
        }

        for (id, component) in self.components.iter_mut() {
            if let Some(state) = snapshot.components.get(id) {
                component.load_state(state)?;
            }
        }
        self.core.clock = snapshot.clock;
        self.core.sequence = SequenceGen::starting_at(snapshot.next_sequence);
        self.core.dispatched = snapshot.dispatched;
        self.core.vortex = TimeVortex::new();
        for event in &snapshot.pending {
            self.core.schedule(event.clone())?;
        }
        self.core.sync = SyncManager::restore(
            lookahead,
            snapshot.epoch,
            snapshot.epoch_bound,
            snapshot.phase,
            snapshot.outbound.clone(),
            snapshot.sent_remote,
            snapshot.received_remote,
        );
        Ok(())
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("id", &self.core.id)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("clock", &self.core.clock)
            .field("pending", &self.core.vortex.len())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::builtin::{Echo, Sink};
    use crate::event::Payload;
    use crate::graph::{ComponentDesc, GraphBuilder};

    fn pair() -> ConfigGraph {
        GraphBuilder::new()
            .component(ComponentDesc::new(0, "echo"))
            .component(ComponentDesc::new(1, "sink"))
            .link(0, (0, "out"), (1, "in"), 3)
            .initial_with(0, "out", 2, Payload::Int(1))
            .build()
            .unwrap()
    }

    fn partition(graph: &ConfigGraph) -> Partition {
        let registry = ComponentRegistry::with_builtins();
        let config = SimConfig::sequential().with_trace();
        let mut p = Partition::build(PartitionId::new(0, 0), graph, &registry, &config).unwrap();
        p.seed(graph).unwrap();
        p
    }

    #[test]
    fn test_seed_queues_initial_events() {
        let p = partition(&pair());
        assert_eq!(p.pending(), 1);
        assert_eq!(p.next_time(), Some(SimTime::new(2)));
        assert_eq!(p.component_ids(), vec![ComponentId::new(0), ComponentId::new(1)]);
    }

    #[test]
    fn test_dispatch_advances_clock_and_follows_link() {
        let mut p = partition(&pair());
        // Echo at T=2 replies Int(0) on "out", arriving at the sink at T=5.
        p.dispatch_next().unwrap();
        assert_eq!(p.clock(), SimTime::new(2));
        assert_eq!(p.next_time(), Some(SimTime::new(5)));

        p.dispatch_next().unwrap();
        assert_eq!(p.clock(), SimTime::new(5));
        let sink = p.component::<Sink>(ComponentId::new(1)).unwrap();
        assert_eq!(sink.received().len(), 1);
        assert_eq!(sink.received()[0].payload, Payload::Int(0));
        assert!(p.component::<Echo>(ComponentId::new(1)).is_none());
        assert_eq!(p.dispatched(), 2);
        assert_eq!(p.report().trace.len(), 2);
    }

    #[test]
    fn test_deliver_into_past_is_causality_error() {
        let mut p = partition(&pair());
        p.dispatch_next().unwrap();
        let late = Event {
            payload: Payload::Empty,
            delivery_time: SimTime::new(1),
            priority: 0,
            sequence: 0,
            origin: PartitionId::new(1, 0),
            destination: Destination::Port {
                component: ComponentId::new(1),
                port: "in".into(),
            },
        };
        let err = p.deliver(vec![late]).unwrap_err();
        assert_eq!(
            err,
            SimError::Causality(CausalityError {
                partition: PartitionId::new(0, 0),
                requested: SimTime::new(1),
                clock: SimTime::new(2),
            })
        );
    }

    #[test]
    fn test_snapshot_restore_resumes_sequence() {
        let graph = pair();
        let mut p = partition(&graph);
        p.dispatch_next().unwrap();
        let snap = p.snapshot();
        assert_eq!(snap.pending.len(), 1);

        let registry = ComponentRegistry::with_builtins();
        let mut fresh =
            Partition::build(PartitionId::new(0, 0), &graph, &registry, &SimConfig::sequential()).unwrap();
        fresh.restore(&snap, None, &[PartitionId::new(0, 0)]).unwrap();
        assert_eq!(fresh.clock(), SimTime::new(2));
        assert_eq!(fresh.core().sequence.peek(), p.core().sequence.peek());
        assert_eq!(fresh.snapshot(), snap);
    }

    #[test]
    fn test_restore_rejects_foreign_snapshot() {
        let graph = pair();
        let p = partition(&graph);
        let mut snap = p.snapshot();
        snap.components.remove(&ComponentId::new(1));

        let registry = ComponentRegistry::with_builtins();
        let mut fresh =
            Partition::build(PartitionId::new(0, 0), &graph, &registry, &SimConfig::sequential()).unwrap();
        assert!(matches!(
            fresh.restore(&snap, None, &[PartitionId::new(0, 0)]),
            Err(SimError::Snapshot(SnapshotError::Mismatch(_)))
        ));
    }
}
