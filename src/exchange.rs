//! Collective operations between partitions.
//!
//! The [`Collective`] trait is the only way partitions communicate. The
//! kernel needs two operations: a min-reduction (to agree on the
//! lookahead at startup) and an all-to-all event exchange with a
//! termination vote (once per epoch).
//!
//! [`ChannelCollective`] implements both for partitions running as
//! threads of one process, over `crossbeam-channel`. Every partition
//! sends exactly one contribution to every peer per round, so a round
//! completes when a contribution from each peer has arrived. A peer can
//! run at most one round ahead; its early contributions are parked
//! until the local side reaches that round.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{AbortReason, SyncFailure};
use crate::event::Event;
use crate::id::PartitionId;
use crate::time::SimTime;

// ── Collective trait ──────────────────────────────────────────────────

/// Result of one epoch exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exchanged {
    /// Every event any peer addressed to this partition.
    pub inbound: Vec<Event>,
    /// `true` iff every partition (this one included) proposed "done".
    pub all_done: bool,
}

/// Communication between partitions at epoch boundaries.
pub trait Collective: Send {
    /// The partition this endpoint belongs to.
    fn partition(&self) -> PartitionId;

    /// Global minimum of `value` over all partitions.
    fn all_reduce_min(&mut self, value: SimTime) -> Result<SimTime, SyncFailure>;

    /// Hand over `outbound` (keyed by destination) and this partition's
    /// termination proposal; receive everything addressed here.
    fn exchange(
        &mut self,
        outbound: BTreeMap<PartitionId, Vec<Event>>,
        done: bool,
    ) -> Result<Exchanged, SyncFailure>;

    /// Tell every peer the run is over, so none of them blocks on a
    /// future round.
    fn broadcast_abort(&self, reason: AbortReason);
}

impl<C: Collective + ?Sized> Collective for &mut C {
    fn partition(&self) -> PartitionId {
        (**self).partition()
    }

    fn all_reduce_min(&mut self, value: SimTime) -> Result<SimTime, SyncFailure> {
        (**self).all_reduce_min(value)
    }

    fn exchange(
        &mut self,
        outbound: BTreeMap<PartitionId, Vec<Event>>,
        done: bool,
    ) -> Result<Exchanged, SyncFailure> {
        (**self).exchange(outbound, done)
    }

    fn broadcast_abort(&self, reason: AbortReason) {
        (**self).broadcast_abort(reason)
    }
}

// ── Channel implementation ────────────────────────────────────────────

#[derive(Debug)]
enum Contribution {
    Min(SimTime),
    Events { events: Vec<Event>, done: bool },
}

#[derive(Debug)]
enum Envelope {
    Round {
        round: u64,
        from: PartitionId,
        body: Contribution,
    },
    Abort {
        from: PartitionId,
        reason: AbortReason,
    },
}

/// First abort raised anywhere in the mesh.
#[derive(Debug, Default)]
struct Shared {
    aborted: Mutex<Option<(PartitionId, AbortReason)>>,
}

/// Sends the abort notice to every peer. Cheap to clone, and usable
/// after the owning [`ChannelCollective`] has been dropped.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    me: PartitionId,
    peers: Vec<(PartitionId, Sender<Envelope>)>,
    shared: Arc<Shared>,
}

impl AbortHandle {
    pub fn broadcast(&self, reason: AbortReason) {
        {
            let mut aborted = self.shared.aborted.lock();
            if aborted.is_none() {
                *aborted = Some((self.me, reason));
            }
        }
        for (peer, tx) in &self.peers {
            if tx
                .send(Envelope::Abort {
                    from: self.me,
                    reason,
                })
                .is_err()
            {
                debug!(partition = %self.me, %peer, "peer already gone, abort not delivered");
            }
        }
    }

    /// The abort raised by another partition, if any.
    fn raised_elsewhere(&self) -> Option<(PartitionId, AbortReason)> {
        (*self.shared.aborted.lock()).filter(|(from, _)| *from != self.me)
    }
}

/// In-process collective over crossbeam channels.
#[derive(Debug)]
pub struct ChannelCollective {
    me: PartitionId,
    inbox: Receiver<Envelope>,
    abort: AbortHandle,
    parked: BTreeMap<u64, Vec<(PartitionId, Contribution)>>,
    round: u64,
    timeout: Option<Duration>,
}

impl ChannelCollective {
    /// Build a fully connected mesh, one endpoint per partition, in the
    /// order of `partitions`. With `timeout` unset a round waits until
    /// every peer contributed, aborted or went away.
    pub fn mesh(partitions: &[PartitionId], timeout: Option<Duration>) -> Vec<ChannelCollective> {
        let channels: Vec<(Sender<Envelope>, Receiver<Envelope>)> =
            partitions.iter().map(|_| unbounded()).collect();
        let shared = Arc::new(Shared::default());

        partitions
            .iter()
            .enumerate()
            .map(|(i, &me)| {
                let peers = partitions
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(j, &peer)| (peer, channels[j].0.clone()))
                    .collect();
                ChannelCollective {
                    me,
                    inbox: channels[i].1.clone(),
                    abort: AbortHandle {
                        me,
                        peers,
                        shared: Arc::clone(&shared),
                    },
                    parked: BTreeMap::new(),
                    round: 0,
                    timeout,
                }
            })
            .collect()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Number of rounds completed so far.
    pub fn rounds(&self) -> u64 {
        self.round
    }

    /// Run one round: send `contribution(peer)` to every peer and wait
    /// for one contribution from each of them.
    fn round_trip(
        &mut self,
        mut contribution: impl FnMut(PartitionId) -> Contribution,
    ) -> Result<BTreeMap<PartitionId, Contribution>, SyncFailure> {
        if let Some((peer, reason)) = self.abort.raised_elsewhere() {
            return Err(SyncFailure::PeerAborted { peer, reason });
        }

        self.round += 1;
        let round = self.round;

        for (peer, tx) in &self.abort.peers {
            let envelope = Envelope::Round {
                round,
                from: self.me,
                body: contribution(*peer),
            };
            if tx.send(envelope).is_err() {
                return Err(self.lost_peer(*peer));
            }
        }

        let mut received: BTreeMap<PartitionId, Contribution> = self
            .parked
            .remove(&round)
            .unwrap_or_default()
            .into_iter()
            .collect();

        let started = Instant::now();
        let deadline = self.timeout.map(|timeout| started + timeout);
        while received.len() < self.abort.peers.len() {
            let next = match deadline {
                Some(deadline) => self.inbox.recv_deadline(deadline),
                None => self.inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match next {
                Ok(Envelope::Round { round: r, from, body }) => {
                    if r == round {
                        received.insert(from, body);
                    } else if r > round {
                        self.parked.entry(r).or_default().push((from, body));
                    } else {
                        warn!(partition = %self.me, %from, stale = r, round, "dropping stale contribution");
                    }
                }
                Ok(Envelope::Abort { from, reason }) => {
                    return Err(SyncFailure::PeerAborted { peer: from, reason });
                }
                Err(RecvTimeoutError::Timeout) => {
                    let missing = self
                        .abort
                        .peers
                        .iter()
                        .map(|(p, _)| *p)
                        .filter(|p| !received.contains_key(p))
                        .collect();
                    return Err(SyncFailure::Timeout {
                        partition: self.me,
                        round,
                        waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        missing,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let peer = self
                        .abort
                        .peers
                        .iter()
                        .map(|(p, _)| *p)
                        .find(|p| !received.contains_key(p))
                        .unwrap_or(self.me);
                    return Err(self.lost_peer(peer));
                }
            }
        }

        Ok(received)
    }

    /// A peer's channel closed. If someone aborted in the meantime that
    /// abort is what tore it down.
    fn lost_peer(&self, peer: PartitionId) -> SyncFailure {
        match self.abort.raised_elsewhere() {
            Some((peer, reason)) => SyncFailure::PeerAborted { peer, reason },
            None => SyncFailure::PeerDisconnected {
                partition: self.me,
                peer,
            },
        }
    }
}

impl Collective for ChannelCollective {
    fn partition(&self) -> PartitionId {
        self.me
    }

    fn all_reduce_min(&mut self, value: SimTime) -> Result<SimTime, SyncFailure> {
        let received = self.round_trip(|_| Contribution::Min(value))?;
        Ok(received
            .into_values()
            .filter_map(|c| match c {
                Contribution::Min(v) => Some(v),
                Contribution::Events { .. } => None,
            })
            .fold(value, SimTime::min))
    }

    fn exchange(
        &mut self,
        mut outbound: BTreeMap<PartitionId, Vec<Event>>,
        done: bool,
    ) -> Result<Exchanged, SyncFailure> {
        let received = self.round_trip(|peer| Contribution::Events {
            events: outbound.remove(&peer).unwrap_or_default(),
            done,
        })?;

        let mut result = Exchanged {
            inbound: Vec::new(),
            all_done: done,
        };
        for contribution in received.into_values() {
            if let Contribution::Events { events, done } = contribution {
                result.inbound.extend(events);
                result.all_done &= done;
            }
        }
        Ok(result)
    }

    fn broadcast_abort(&self, reason: AbortReason) {
        self.abort.broadcast(reason);
    }
}
