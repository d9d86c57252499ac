//! Structured error types for parsim.
//!
//! Fallible public APIs return `SimResult<T>`. The fatal categories
//! (configuration, causality, synchronization, handler faults) each have
//! their own type so that a caller can tell a bad model apart from a bad
//! graph or a lost peer. None of them is ever retried by the kernel.

use thiserror::Error;

use crate::event::LinkEnd;
use crate::id::{ComponentId, ComponentKey, LinkId, PartitionId};
use crate::time::SimTime;

// ── Configuration ─────────────────────────────────────────────────────

/// The configuration graph cannot be run.
///
/// Always reported before the first event is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("component {0} is defined twice")]
    DuplicateComponent(ComponentId),

    #[error("link {0} is defined twice")]
    DuplicateLink(LinkId),

    #[error("link {link} references unknown component {component}")]
    DanglingEndpoint { link: LinkId, component: ComponentId },

    #[error("port {port:?} of component {component} is connected more than once")]
    PortAlreadyConnected { component: ComponentId, port: String },

    #[error("component {component} has unknown type {type_tag:?}")]
    UnknownComponentType { component: ComponentId, type_tag: String },

    #[error("link {link} crosses partitions with zero latency")]
    ZeroLatencyCrossPartition { link: LinkId },

    #[error("component {component} is assigned to {partition}, which does not exist")]
    PartitionOutOfRange {
        component: ComponentId,
        partition: PartitionId,
    },

    #[error("slot already taken: {0}")]
    DuplicateSubComponent(ComponentKey),

    #[error("component {component}: parameter {key:?} has invalid value {value:?}")]
    InvalidParam {
        component: ComponentId,
        key: String,
        value: String,
    },

    #[error("component {component}: required parameter {key:?} is missing")]
    MissingParam { component: ComponentId, key: String },

    #[error("initial event targets unknown component {0}")]
    UnknownInitialTarget(ComponentId),

    #[error("simulation must have at least one rank and one thread per rank")]
    NoPartitions,
}

// ── Causality ─────────────────────────────────────────────────────────

/// An event was scheduled or delivered into a partition's past.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{partition}: event for {requested} arrived at local time {clock}")]
pub struct CausalityError {
    pub partition: PartitionId,
    pub requested: SimTime,
    pub clock: SimTime,
}

// ── Synchronization ───────────────────────────────────────────────────

/// The collective exchange between partitions broke down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncFailure {
    #[error("{partition}: no batch from {missing:?} after {waited_ms} ms in round {round}")]
    Timeout {
        partition: PartitionId,
        round: u64,
        waited_ms: u64,
        missing: Vec<PartitionId>,
    },

    #[error("{partition}: peer {peer} disconnected")]
    PeerDisconnected {
        partition: PartitionId,
        peer: PartitionId,
    },

    #[error("peer {peer} aborted: {reason}")]
    PeerAborted { peer: PartitionId, reason: AbortReason },
}

// ── Handler faults ────────────────────────────────────────────────────

/// An unrecoverable condition raised by a component's handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerFault {
    pub message: String,
}

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerFault {
            message: message.into(),
        }
    }
}

// ── Snapshots ─────────────────────────────────────────────────────────

/// A snapshot could not be decoded or does not fit the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("malformed snapshot at line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("snapshot does not match the graph: {0}")]
    Mismatch(String),

    #[error("snapshots can only be taken at an epoch boundary")]
    NotAtBoundary,
}

// ── Abort reasons ─────────────────────────────────────────────────────

/// Why a run ended in `ABORT`, as reported to peers and to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum AbortReason {
    Config,
    Causality,
    SyncFailure,
    HandlerFault,
    Snapshot,
}

impl AbortReason {
    /// Process exit code for this reason. `0` is reserved for `COMPLETE`.
    pub fn exit_code(self) -> i32 {
        match self {
            AbortReason::Config => 2,
            AbortReason::Causality => 3,
            AbortReason::SyncFailure => 4,
            AbortReason::HandlerFault => 5,
            AbortReason::Snapshot => 6,
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AbortReason::Config => "configuration error",
            AbortReason::Causality => "causality violation",
            AbortReason::SyncFailure => "synchronization failure",
            AbortReason::HandlerFault => "handler fault",
            AbortReason::Snapshot => "snapshot error",
        };
        f.write_str(s)
    }
}

// ── SimError ──────────────────────────────────────────────────────────

/// The top-level error type of the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Causality(#[from] CausalityError),

    #[error(transparent)]
    Sync(#[from] SyncFailure),

    #[error("component {component} faulted at {time}: {fault}")]
    Handler {
        component: ComponentId,
        time: SimTime,
        fault: HandlerFault,
    },

    #[error("component {component} has no link on port {port:?}")]
    UnknownPort { component: ComponentId, port: String },

    #[error("no component {component} in {partition}")]
    UnknownComponent {
        component: ComponentId,
        partition: PartitionId,
    },

    #[error("time overflow scheduling {delay} ticks after {now}")]
    TimeOverflow { now: SimTime, delay: u64 },

    #[error("time vortex is empty")]
    EmptyVortex,

    #[error("{partition}: nothing attached at {end}")]
    Unroutable { partition: PartitionId, end: LinkEnd },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("{partition} panicked: {message}")]
    Panicked { partition: PartitionId, message: String },
}

impl SimError {
    /// The abort category this error escalates to.
    pub fn abort_reason(&self) -> AbortReason {
        match self {
            SimError::Config(_) => AbortReason::Config,
            SimError::Causality(_) => AbortReason::Causality,
            SimError::Sync(_) => AbortReason::SyncFailure,
            SimError::Snapshot(_) => AbortReason::Snapshot,
            // Misuse of the send API is a model bug, same as a fault.
            SimError::Handler { .. }
            | SimError::UnknownPort { .. }
            | SimError::UnknownComponent { .. }
            | SimError::TimeOverflow { .. }
            | SimError::EmptyVortex
            | SimError::Unroutable { .. }
            | SimError::Panicked { .. } => AbortReason::HandlerFault,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.abort_reason().exit_code()
    }

    /// `true` when this partition only failed because a peer aborted.
    pub(crate) fn is_peer_abort(&self) -> bool {
        matches!(self, SimError::Sync(SyncFailure::PeerAborted { .. }))
    }
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
