/// Per-partition control loop.
///
/// ```text
///   Init ─▶ Running ─▶ Dispatch ⇄ SyncWait ─▶ Complete
///                         │          │
///                         │          └──▶ Paused (run_until)
///                         └─────────────▶ Abort (any fatal error)
/// ```
///
/// The driver dispatches local events below the current epoch bound,
/// then blocks in the collective exchange, delivers what arrived, and
/// either completes or moves the bound forward.

use tracing::{debug, error, info};

use crate::error::SimResult;
use crate::exchange::Collective;
use crate::partition::Partition;
use crate::report::{Completion, RunStatus};
use crate::sync::EpochPhase;
use crate::time::SimTime;

/// Where a partition's driver currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum DriverState {
    Init,
    Running,
    Dispatch,
    SyncWait,
    Paused,
    Complete,
    Abort,
}

/// Drives one partition through epochs until it completes, pauses, or
/// fails.
pub struct Driver<'p, C: Collective> {
    partition: &'p mut Partition,
    collective: C,
    end_time: Option<SimTime>,
    pause_at: Option<SimTime>,
}

impl<'p, C: Collective> Driver<'p, C> {
    pub fn new(partition: &'p mut Partition, collective: C) -> Self {
        Driver {
            partition,
            collective,
            end_time: None,
            pause_at: None,
        }
    }

    /// Never dispatch events later than `end`, and complete once the
    /// epoch bound passes it.
    pub fn with_end_time(mut self, end: Option<SimTime>) -> Self {
        self.end_time = end;
        self
    }

    /// Pause at the first epoch boundary at or after `bound`.
    pub fn with_pause_at(mut self, bound: Option<SimTime>) -> Self {
        self.pause_at = bound;
        self
    }

    /// Run to completion, pause, or abort.
    ///
    /// On a local failure every peer is told to abort before the error
    /// is returned, so nobody is left waiting in an exchange.
    pub fn run(mut self) -> SimResult<RunStatus> {
        match self.drive() {
            Ok(status) => Ok(status),
            Err(err) => {
                if !err.is_peer_abort() {
                    error!(partition = %self.partition.id(), %err, "aborting run");
                    self.collective.broadcast_abort(err.abort_reason());
                } else {
                    debug!(partition = %self.partition.id(), %err, "peer aborted");
                }
                self.partition.set_state(DriverState::Abort);
                Err(err)
            }
        }
    }

    fn drive(&mut self) -> SimResult<RunStatus> {
        if let EpochPhase::Complete(how) = self.partition.sync().phase() {
            return Ok(RunStatus::Complete(how));
        }
        self.partition.set_state(DriverState::Running);

        if self.partition.sync().lookahead().is_none() {
            let local = self.partition.local_lookahead();
            let lookahead = self
                .partition
                .sync_mut()
                .establish_lookahead(local, &mut self.collective)?;
            info!(partition = %self.partition.id(), %lookahead, "partition running");
        }

        loop {
            if self.partition.sync().phase() == EpochPhase::Accumulate {
                self.accumulate()?;
                self.partition.sync_mut().await_exchange();
                self.partition.set_state(DriverState::SyncWait);

                let bound = self.partition.sync().epoch_bound();
                if self.pause_at.is_some_and(|pause| bound >= pause) {
                    self.partition.set_state(DriverState::Paused);
                    debug!(partition = %self.partition.id(), %bound, "paused");
                    return Ok(RunStatus::Paused { epoch_bound: bound });
                }
            }

            self.partition.set_state(DriverState::SyncWait);
            let vortex_empty = self.partition.pending() == 0;
            let exchanged = self
                .partition
                .sync_mut()
                .exchange(vortex_empty, &mut self.collective)?;
            self.partition.deliver(exchanged.inbound)?;
            self.partition.collect();

            let bound = self.partition.sync().epoch_bound();
            if exchanged.all_done {
                return Ok(self.complete(Completion::Drained));
            }
            if self.end_time.is_some_and(|end| bound > end) {
                return Ok(self.complete(Completion::EndTime));
            }
            self.partition.sync_mut().advance_horizon();
        }
    }

    /// Dispatch every local event of the current epoch.
    fn accumulate(&mut self) -> SimResult<()> {
        self.partition.set_state(DriverState::Dispatch);
        while let Some(next) = self.partition.next_time() {
            if !self.partition.sync().admits(next) {
                break;
            }
            if self.end_time.is_some_and(|end| next > end) {
                break;
            }
            self.partition.dispatch_next()?;
        }
        Ok(())
    }

    fn complete(&mut self, how: Completion) -> RunStatus {
        self.partition.finish();
        self.partition.sync_mut().complete(how);
        self.partition.set_state(DriverState::Complete);
        info!(
            partition = %self.partition.id(),
            clock = %self.partition.clock(),
            dispatched = self.partition.dispatched(),
            ?how,
            "partition complete"
        );
        RunStatus::Complete(how)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::SimConfig;
    use crate::error::{AbortReason, CausalityError, SimError, SyncFailure};
    use crate::event::{Destination, Event, Payload};
    use crate::exchange::{ChannelCollective, Exchanged};
    use crate::graph::{ComponentDesc, ConfigGraph, GraphBuilder};
    use crate::id::{ComponentId, PartitionId};
    use crate::registry::ComponentRegistry;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Stands in for the peers: fixed lookahead, scripted inbound
    /// batches, records aborts.
    struct Scripted {
        lookahead: SimTime,
        inbound: Vec<Vec<Event>>,
        peer_done: bool,
        aborts: Arc<Mutex<Vec<AbortReason>>>,
    }

    impl Collective for Scripted {
        fn partition(&self) -> PartitionId {
            PartitionId::new(0, 0)
        }

        fn all_reduce_min(&mut self, value: SimTime) -> Result<SimTime, SyncFailure> {
            Ok(value.min(self.lookahead))
        }

        fn exchange(
            &mut self,
            _outbound: BTreeMap<PartitionId, Vec<Event>>,
            done: bool,
        ) -> Result<Exchanged, SyncFailure> {
            let inbound = if self.inbound.is_empty() {
                Vec::new()
            } else {
                self.inbound.remove(0)
            };
            let all_done = done && self.peer_done && inbound.is_empty();
            Ok(Exchanged { inbound, all_done })
        }

        fn broadcast_abort(&self, reason: AbortReason) {
            self.aborts.lock().push(reason);
        }
    }

    fn single(graph: &ConfigGraph) -> Partition {
        let registry = ComponentRegistry::with_builtins();
        let mut p = Partition::build(PartitionId::new(0, 0), graph, &registry, &SimConfig::sequential()).unwrap();
        p.seed(graph).unwrap();
        p
    }

    fn clock_graph(limit: u64) -> ConfigGraph {
        GraphBuilder::new()
            .component(
                ComponentDesc::new(0, "clock")
                    .param("period", 10)
                    .param("limit", limit),
            )
            .component(ComponentDesc::new(1, "sink"))
            .link(0, (0, "out"), (1, "in"), 1)
            .build()
            .unwrap()
    }

    fn solo() -> ChannelCollective {
        ChannelCollective::mesh(&[PartitionId::new(0, 0)], None).remove(0)
    }

    #[test]
    fn test_single_partition_drains() {
        let graph = clock_graph(3);
        let mut p = single(&graph);
        let status = Driver::new(&mut p, solo()).run().unwrap();
        assert_eq!(status, RunStatus::Complete(Completion::Drained));
        assert_eq!(p.state(), DriverState::Complete);
        // Ticks at 0, 10, 20 and three deliveries to the sink.
        assert_eq!(p.dispatched(), 6);
        assert_eq!(p.clock(), SimTime::new(21));
        // Unbounded lookahead: a single epoch is enough.
        assert_eq!(p.sync().epoch(), 0);
    }

    #[test]
    fn test_end_time_stops_dispatch() {
        let graph = clock_graph(1000);
        let mut p = single(&graph);
        let status = Driver::new(&mut p, solo())
            .with_end_time(Some(SimTime::new(35)))
            .run()
            .unwrap();
        assert_eq!(status, RunStatus::Complete(Completion::EndTime));
        assert!(p.clock() <= SimTime::new(35));
        assert!(p.pending() > 0);
    }

    #[test]
    fn test_pause_then_resume() {
        let graph = clock_graph(3);
        let mut p = single(&graph);
        let aborts = Arc::new(Mutex::new(Vec::new()));
        let collective = Scripted {
            lookahead: SimTime::new(5),
            inbound: Vec::new(),
            peer_done: true,
            aborts: Arc::clone(&aborts),
        };
        let status = Driver::new(&mut p, collective)
            .with_pause_at(Some(SimTime::new(12)))
            .run()
            .unwrap();
        assert_eq!(status, RunStatus::Paused { epoch_bound: SimTime::new(15) });
        assert_eq!(p.state(), DriverState::Paused);
        assert_eq!(p.sync().phase(), EpochPhase::AwaitingExchange);
        // Ticks 0 and 10 plus their deliveries at 1 and 11.
        assert_eq!(p.dispatched(), 4);

        let collective = Scripted {
            lookahead: SimTime::new(5),
            inbound: Vec::new(),
            peer_done: true,
            aborts,
        };
        let status = Driver::new(&mut p, collective).run().unwrap();
        assert_eq!(status, RunStatus::Complete(Completion::Drained));
        assert_eq!(p.dispatched(), 6);
    }

    #[test]
    fn test_late_inbound_event_aborts_with_causality() {
        let graph = clock_graph(3);
        let mut p = single(&graph);
        let aborts = Arc::new(Mutex::new(Vec::new()));
        // The first epoch [0, 5) dispatches T=0 and T=1; an inbound event
        // for T=0 is then in the partition's past.
        let stale = Event {
            payload: Payload::Empty,
            delivery_time: SimTime::ZERO,
            priority: 0,
            sequence: 0,
            origin: PartitionId::new(1, 0),
            destination: Destination::Port {
                component: ComponentId::new(1),
                port: "in".into(),
            },
        };
        let collective = Scripted {
            lookahead: SimTime::new(5),
            inbound: vec![vec![stale]],
            peer_done: false,
            aborts: Arc::clone(&aborts),
        };
        let err = Driver::new(&mut p, collective).run().unwrap_err();
        assert_eq!(
            err,
            SimError::Causality(CausalityError {
                partition: PartitionId::new(0, 0),
                requested: SimTime::ZERO,
                clock: SimTime::new(1),
            })
        );
        assert_eq!(p.state(), DriverState::Abort);
        assert_eq!(aborts.lock().as_slice(), &[AbortReason::Causality]);
    }
}
