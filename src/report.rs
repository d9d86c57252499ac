/// Run outcome and per-partition reports.
///
/// A run ends either in [`RunStatus::Complete`] (every partition agreed
/// to stop) or [`RunStatus::Paused`] (every partition stopped at the
/// same epoch boundary on request). Aborts are not a status: they are
/// returned as [`SimError`](crate::error::SimError) values.

use crate::id::PartitionId;
use crate::time::SimTime;
use crate::trace::TraceEntry;

// ── Status ────────────────────────────────────────────────────────────

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Completion {
    /// Every vortex and outbound buffer was empty at the same boundary.
    Drained,
    /// The epoch horizon passed the configured end time.
    EndTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum RunStatus {
    Complete(Completion),
    /// Stopped just before the exchange closing the epoch that ends at
    /// `epoch_bound`. A snapshot can be taken now.
    Paused { epoch_bound: SimTime },
}

impl RunStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, RunStatus::Complete(_))
    }

    /// `0` for every non-aborted outcome.
    pub fn exit_code(&self) -> i32 {
        0
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Complete(Completion::Drained) => write!(f, "complete (drained)"),
            RunStatus::Complete(Completion::EndTime) => write!(f, "complete (end time)"),
            RunStatus::Paused { epoch_bound } => write!(f, "paused at {}", epoch_bound),
        }
    }
}

// ── Reports ───────────────────────────────────────────────────────────

/// What one partition did during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PartitionReport {
    pub id: PartitionId,
    pub clock: SimTime,
    /// Epochs completed so far.
    pub epoch: u64,
    /// Events dispatched since the partition was built.
    pub dispatched: u64,
    /// Events still waiting in the vortex.
    pub pending: usize,
    pub sent_remote: u64,
    pub received_remote: u64,
    /// Dispatches of this run call, empty unless tracing is enabled.
    pub trace: Vec<TraceEntry>,
}

/// Outcome of [`Simulation::run`](crate::simulation::Simulation::run).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RunReport {
    pub status: RunStatus,
    /// Agreed lookahead. `SimTime::MAX` when no link crosses partitions.
    pub lookahead: SimTime,
    pub partitions: Vec<PartitionReport>,
}

impl RunReport {
    pub fn total_dispatched(&self) -> u64 {
        self.partitions.iter().map(|p| p.dispatched).sum()
    }

    pub fn epochs(&self) -> u64 {
        self.partitions.first().map_or(0, |p| p.epoch)
    }

    pub fn partition(&self, id: PartitionId) -> Option<&PartitionReport> {
        self.partitions.iter().find(|p| p.id == id)
    }

    /// Hash of every partition's trace, in partition order.
    ///
    /// Equal fingerprints mean equal dispatch orders; the demo binary
    /// prints it so that two invocations can be compared by eye.
    pub fn fingerprint(&self) -> u64 {
        let mut h: u64 = 0;
        for partition in &self.partitions {
            h = hash_combine(h, u64::from(partition.id.rank));
            h = hash_combine(h, u64::from(partition.id.thread));
            for entry in &partition.trace {
                h = hash_combine(h, entry.time.ticks());
                h = hash_combine(h, entry.priority as u64);
                h = hash_combine(h, entry.sequence);
                h = hash_combine(h, entry.component.raw());
                h = hash_combine(h, hash_bytes(entry.port.as_bytes()));
            }
        }
        h
    }

    /// Export the report as a JSON string.
    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".into())
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "status: {}, lookahead: {}", self.status, self.lookahead)?;
        for p in &self.partitions {
            writeln!(
                f,
                "  {}: clock={} epochs={} dispatched={} pending={} sent={} received={}",
                p.id, p.clock, p.epoch, p.dispatched, p.pending, p.sent_remote, p.received_remote
            )?;
        }
        Ok(())
    }
}

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

/// Hash a byte slice deterministically (FNV-1a variant).
pub fn hash_bytes(data: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}
