/// Simulation: builds the partitions and runs them in parallel.
///
/// Every partition runs its [`Driver`] on its own scoped thread and
/// talks to its peers only through a [`ChannelCollective`]. The run
/// returns when every partition has completed or paused, or when one
/// of them failed and the abort has reached the others.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tracing::{error, info, info_span};

use crate::component::Component;
use crate::config::SimConfig;
use crate::driver::{Driver, DriverState};
use crate::error::{AbortReason, ConfigError, SimError, SimResult, SnapshotError};
use crate::exchange::{ChannelCollective, Collective};
use crate::graph::ConfigGraph;
use crate::id::{ComponentId, PartitionId};
use crate::partition::Partition;
use crate::registry::ComponentRegistry;
use crate::report::{RunReport, RunStatus};
use crate::snapshot::{Snapshot, SNAPSHOT_VERSION};
use crate::stats::StatsCollector;
use crate::sync::EpochPhase;
use crate::time::SimTime;

/// Top-level simulation.
///
/// Built from an immutable [`ConfigGraph`]; the graph is not needed
/// after construction.
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    partitions: Vec<Partition>,
    aborted: Option<SimError>,
}

impl Simulation {
    /// Validate the graph against `config` and `registry`, build every
    /// partition, seed initial events and call `setup`.
    ///
    /// Every configuration error is reported here, before any event is
    /// processed.
    pub fn new(graph: &ConfigGraph, registry: &ComponentRegistry, config: SimConfig) -> SimResult<Self> {
        let mut sim = Self::build(graph, registry, config)?;
        for partition in &mut sim.partitions {
            partition.seed(graph)?;
        }
        info!(
            partitions = sim.partitions.len(),
            components = graph.components().count(),
            links = graph.links().count(),
            "simulation built"
        );
        Ok(sim)
    }

    /// Rebuild a simulation from `snapshot` instead of seeding it.
    ///
    /// `graph`, `registry` and the partition layout of `config` must be
    /// the ones the snapshot was taken with.
    pub fn restore(
        graph: &ConfigGraph,
        registry: &ComponentRegistry,
        config: SimConfig,
        snapshot: &Snapshot,
    ) -> SimResult<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            }
            .into());
        }
        let mut sim = Self::build(graph, registry, config)?;

        let ours: Vec<PartitionId> = sim.partitions.iter().map(Partition::id).collect();
        let theirs: Vec<PartitionId> = snapshot.partitions.iter().map(|p| p.id).collect();
        if ours != theirs {
            return Err(SnapshotError::Mismatch(format!(
                "simulation has partitions {:?}, snapshot has {:?}",
                ours, theirs
            ))
            .into());
        }

        for (partition, state) in sim.partitions.iter_mut().zip(&snapshot.partitions) {
            partition.restore(state, snapshot.lookahead, &ours)?;
            if state.phase == EpochPhase::AwaitingExchange {
                partition.set_state(DriverState::Paused);
            }
        }
        info!(
            partitions = sim.partitions.len(),
            events = snapshot.event_count(),
            "simulation restored"
        );
        Ok(sim)
    }

    fn build(graph: &ConfigGraph, registry: &ComponentRegistry, config: SimConfig) -> SimResult<Self> {
        graph.check_partitions(&config)?;
        registry.check(graph)?;
        let partitions = config
            .partitions()
            .into_iter()
            .map(|id| Partition::build(id, graph, registry, &config))
            .collect::<SimResult<Vec<_>>>()?;
        Ok(Simulation {
            config,
            partitions,
            aborted: None,
        })
    }

    // ── Running ───────────────────────────────────────────────────────

    /// Run until every partition agrees to stop.
    pub fn run(&mut self) -> SimResult<RunReport> {
        self.execute(None)
    }

    /// Run until the first epoch boundary at or after `bound`, then
    /// pause every partition just before that boundary's exchange.
    ///
    /// Returns a completed report instead if the run ends earlier.
    pub fn run_until(&mut self, bound: SimTime) -> SimResult<RunReport> {
        self.execute(Some(bound))
    }

    fn execute(&mut self, pause_at: Option<SimTime>) -> SimResult<RunReport> {
        if let Some(err) = &self.aborted {
            return Err(err.clone());
        }

        let ids: Vec<PartitionId> = self.partitions.iter().map(Partition::id).collect();
        let mesh = ChannelCollective::mesh(&ids, self.config.exchange_timeout);
        let end_time = self.config.end_time;
        info!(partitions = ids.len(), ?end_time, ?pause_at, "simulation running");

        let results: Vec<SimResult<RunStatus>> = thread::scope(|s| {
            let handles: Vec<_> = self
                .partitions
                .iter_mut()
                .zip(mesh)
                .map(|(partition, collective)| {
                    s.spawn(move || run_partition(partition, collective, end_time, pause_at))
                })
                .collect();
            handles
                .into_iter()
                .zip(&ids)
                .map(|(handle, id)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(SimError::Panicked {
                            partition: *id,
                            message: "partition thread panicked".into(),
                        })
                    })
                })
                .collect()
        });

        // The first failure that is not an echo of a peer's abort is
        // the root cause.
        let mut root = None;
        let mut echo = None;
        let mut statuses = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(status) => statuses.push(status),
                Err(err) if err.is_peer_abort() => {
                    echo.get_or_insert(err);
                }
                Err(err) => {
                    root.get_or_insert(err);
                }
            }
        }
        if let Some(err) = root.or(echo) {
            error!(%err, exit_code = err.exit_code(), "simulation aborted");
            self.aborted = Some(err.clone());
            return Err(err);
        }

        let status = statuses
            .first()
            .copied()
            .ok_or(SimError::Config(ConfigError::NoPartitions))?;
        let report = RunReport {
            status,
            lookahead: self.lookahead().unwrap_or(SimTime::MAX),
            partitions: self.partitions.iter_mut().map(Partition::report).collect(),
        };
        info!(
            %status,
            epochs = report.epochs(),
            dispatched = report.total_dispatched(),
            "simulation finished"
        );
        Ok(report)
    }

    // ── Snapshots ─────────────────────────────────────────────────────

    /// Capture the state of every partition.
    ///
    /// Only valid at an epoch boundary: before the first run, or after
    /// [`run_until`](Self::run_until) paused.
    pub fn snapshot(&self) -> SimResult<Snapshot> {
        if self.aborted.is_some() {
            return Err(SnapshotError::NotAtBoundary.into());
        }
        let partitions = self.partitions.iter().map(Partition::snapshot).collect::<Vec<_>>();
        if partitions
            .iter()
            .any(|p| matches!(p.phase, EpochPhase::Complete(_)))
        {
            return Err(SnapshotError::NotAtBoundary.into());
        }
        Ok(Snapshot {
            version: SNAPSHOT_VERSION,
            lookahead: self.lookahead(),
            partitions,
        })
    }

    // ── Inspection ────────────────────────────────────────────────────

    /// Attach a statistics collector to `partition`. Returns `false` if
    /// there is no such partition.
    pub fn attach_collector<S: StatsCollector + 'static>(&mut self, partition: PartitionId, collector: S) -> bool {
        match self.partitions.iter_mut().find(|p| p.id() == partition) {
            Some(p) => {
                p.attach_collector(Box::new(collector));
                true
            }
            None => false,
        }
    }

    /// Agreed lookahead, once the first run has started.
    pub fn lookahead(&self) -> Option<SimTime> {
        self.partitions.first().and_then(|p| p.sync().lookahead())
    }

    /// Downcast a component, wherever it lives.
    pub fn component<T: Component + 'static>(&self, id: ComponentId) -> Option<&T> {
        self.partitions.iter().find_map(|p| p.component::<T>(id))
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn partition(&self, id: PartitionId) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.id() == id)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The error that aborted the last run, if any.
    pub fn error(&self) -> Option<&SimError> {
        self.aborted.as_ref()
    }
}

/// Body of one partition thread. A panic anywhere below is converted
/// into an abort so that the peers are released.
///
/// The collective outlives the driver so that peers see the abort
/// before they can see this partition's channel close.
fn run_partition(
    partition: &mut Partition,
    mut collective: ChannelCollective,
    end_time: Option<SimTime>,
    pause_at: Option<SimTime>,
) -> SimResult<RunStatus> {
    let id = partition.id();
    let span = info_span!("partition", %id);
    let _guard = span.enter();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        Driver::new(&mut *partition, &mut collective)
            .with_end_time(end_time)
            .with_pause_at(pause_at)
            .run()
    }));
    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%message, "partition panicked");
            collective.broadcast_abort(AbortReason::HandlerFault);
            partition.set_state(DriverState::Abort);
            Err(SimError::Panicked {
                partition: id,
                message,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComponentDesc, GraphBuilder};

    fn ring(partitions: u32) -> ConfigGraph {
        let mut builder = GraphBuilder::new();
        for i in 0..partitions {
            builder = builder.component(ComponentDesc::new(u64::from(i), "echo").on(0, i));
        }
        for i in 0..partitions {
            let next = (i + 1) % partitions;
            builder = builder.link(u64::from(i), (u64::from(i), "right"), (u64::from(next), "left"), 3);
        }
        builder.initial_with(0, "right", 0, crate::event::Payload::Int(6)).build().unwrap()
    }

    #[test]
    fn test_partition_out_of_range_rejected() {
        let graph = ring(3);
        let err = Simulation::new(&graph, &ComponentRegistry::with_builtins(), SimConfig::threads(2)).unwrap_err();
        assert_eq!(
            err,
            SimError::Config(ConfigError::PartitionOutOfRange {
                component: ComponentId::new(2),
                partition: PartitionId::new(0, 2),
            })
        );
    }

    #[test]
    fn test_unknown_type_rejected_before_any_dispatch() {
        let graph = ring(2);
        let err = Simulation::new(&graph, &ComponentRegistry::new(), SimConfig::threads(2)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_lookahead_known_after_run() {
        let graph = ring(3);
        let mut sim = Simulation::new(&graph, &ComponentRegistry::with_builtins(), SimConfig::threads(3)).unwrap();
        assert_eq!(sim.lookahead(), None);
        let report = sim.run().unwrap();
        assert_eq!(sim.lookahead(), Some(SimTime::new(3)));
        assert_eq!(report.lookahead, SimTime::new(3));
        // Int(6) travels 7 hops around the ring.
        assert_eq!(report.total_dispatched(), 7);
    }

    #[test]
    fn test_snapshot_refused_after_completion() {
        let graph = ring(2);
        let mut sim = Simulation::new(&graph, &ComponentRegistry::with_builtins(), SimConfig::threads(2)).unwrap();
        assert!(sim.snapshot().is_ok());
        sim.run().unwrap();
        assert_eq!(sim.snapshot(), Err(SimError::Snapshot(SnapshotError::NotAtBoundary)));
    }

    #[test]
    fn test_collector_attached_by_partition() {
        let graph = ring(2);
        let mut sim = Simulation::new(&graph, &ComponentRegistry::with_builtins(), SimConfig::threads(2)).unwrap();
        assert!(sim.attach_collector(PartitionId::new(0, 1), |_: &crate::stats::EpochSample<'_>| {}));
        assert!(!sim.attach_collector(PartitionId::new(3, 0), |_: &crate::stats::EpochSample<'_>| {}));
    }
}
