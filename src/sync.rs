//! Conservative synchronization between partitions.
//!
//! Time is cut into epochs of `lookahead` ticks. Within an epoch a
//! partition dispatches its own events freely: no event created by a
//! peer during the same epoch can land before the epoch's bound, since
//! every cross-partition link is at least `lookahead` long. At the bound
//! partitions swap the events they buffered for each other and vote on
//! termination, then move the bound forward.
//!
//! ```text
//!   ACCUMULATE ──▶ BARRIER_EXCHANGE ──▶ DELIVER ──▶ ADVANCE_HORIZON ─┐
//!       ▲                                                            │
//!       └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`SyncManager`] holds the state machine; the collective it talks
//! through is supplied by the caller (see [`Collective`]).

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::SyncFailure;
use crate::event::Event;
use crate::exchange::{Collective, Exchanged};
use crate::id::PartitionId;
use crate::report::Completion;
use crate::time::SimTime;

/// Where the partition stands within the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum EpochPhase {
    /// Dispatching events below the bound.
    Accumulate,
    /// Done dispatching; the exchange closing this epoch is next.
    AwaitingExchange,
    /// The run is over.
    Complete(Completion),
}

/// Per-partition synchronization state.
#[derive(Debug, Clone)]
pub struct SyncManager {
    lookahead: Option<SimTime>,
    epoch: u64,
    epoch_bound: SimTime,
    outbound: BTreeMap<PartitionId, Vec<Event>>,
    phase: EpochPhase,
    sent_remote: u64,
    received_remote: u64,
}

impl SyncManager {
    pub fn new() -> Self {
        SyncManager {
            lookahead: None,
            epoch: 0,
            epoch_bound: SimTime::ZERO,
            outbound: BTreeMap::new(),
            phase: EpochPhase::Accumulate,
            sent_remote: 0,
            received_remote: 0,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────

    /// `None` until [`establish_lookahead`](Self::establish_lookahead) ran.
    pub fn lookahead(&self) -> Option<SimTime> {
        self.lookahead
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Exclusive upper bound of the current epoch.
    pub fn epoch_bound(&self) -> SimTime {
        self.epoch_bound
    }

    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    pub fn outbound(&self) -> &BTreeMap<PartitionId, Vec<Event>> {
        &self.outbound
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.values().map(Vec::len).sum()
    }

    pub fn sent_remote(&self) -> u64 {
        self.sent_remote
    }

    pub fn received_remote(&self) -> u64 {
        self.received_remote
    }

    // ── Epoch protocol ────────────────────────────────────────────────

    /// Hold an event for `dest` until the next exchange.
    pub fn buffer(&mut self, dest: PartitionId, event: Event) {
        self.sent_remote += 1;
        self.outbound.entry(dest).or_default().push(event);
    }

    /// Agree on the global lookahead: the minimum of every partition's
    /// smallest outgoing cross-partition latency.
    ///
    /// The first epoch covers `[0, lookahead)`.
    pub fn establish_lookahead(
        &mut self,
        local_min: SimTime,
        collective: &mut dyn Collective,
    ) -> Result<SimTime, SyncFailure> {
        let lookahead = collective.all_reduce_min(local_min)?;
        self.lookahead = Some(lookahead);
        self.epoch_bound = lookahead;
        debug!(%lookahead, "lookahead established");
        Ok(lookahead)
    }

    /// `true` if an event at `time` belongs to the current epoch.
    pub fn admits(&self, time: SimTime) -> bool {
        time < self.epoch_bound || self.epoch_bound.is_unbounded()
    }

    /// Close the epoch: hand the outbound buffers to the collective and
    /// propose termination iff nothing is pending here.
    pub fn exchange(
        &mut self,
        vortex_empty: bool,
        collective: &mut dyn Collective,
    ) -> Result<Exchanged, SyncFailure> {
        self.phase = EpochPhase::AwaitingExchange;
        let done = vortex_empty && self.outbound.is_empty();
        let outbound = std::mem::take(&mut self.outbound);
        let exchanged = collective.exchange(outbound, done)?;
        self.received_remote += exchanged.inbound.len() as u64;
        debug!(
            epoch = self.epoch,
            bound = %self.epoch_bound,
            done,
            all_done = exchanged.all_done,
            inbound = exchanged.inbound.len(),
            "epoch exchanged"
        );
        Ok(exchanged)
    }

    /// Mark the end of accumulation without exchanging yet.
    pub fn await_exchange(&mut self) {
        self.phase = EpochPhase::AwaitingExchange;
    }

    /// Move to the next epoch: `epoch_bound += lookahead`, saturating so
    /// an unbounded horizon stays unbounded.
    pub fn advance_horizon(&mut self) {
        let step = self.lookahead.unwrap_or(SimTime::MAX);
        self.epoch += 1;
        self.epoch_bound = self.epoch_bound.saturating_add(step);
        self.phase = EpochPhase::Accumulate;
    }

    pub fn complete(&mut self, how: Completion) {
        self.phase = EpochPhase::Complete(how);
    }

    /// Rebuild the state captured by a snapshot.
    pub(crate) fn restore(
        lookahead: Option<SimTime>,
        epoch: u64,
        epoch_bound: SimTime,
        phase: EpochPhase,
        outbound: BTreeMap<PartitionId, Vec<Event>>,
        sent_remote: u64,
        received_remote: u64,
    ) -> Self {
        SyncManager {
            lookahead,
            epoch,
            epoch_bound,
            outbound,
            phase,
            sent_remote,
            received_remote,
        }
    }
}

impl Default for SyncManager {
    fn default() -> Self {
        Self::new()
    }
}
