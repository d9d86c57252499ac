/// Events exchanged between components.
///
/// Every interaction between components is an `Event`: an immutable
/// record carrying an opaque payload, the virtual time at which it must
/// be dispatched, and the keys that make dispatch order total.

use std::cmp::Ordering;

use crate::id::{ComponentId, LinkId, PartitionId};
use crate::time::SimTime;

/// Priority given to events sent without an explicit priority.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Priority of initial events seeded from the configuration graph.
///
/// Lower values dispatch first, so seeds run ahead of ordinary traffic
/// delivered at the same tick.
pub const INITIAL_PRIORITY: i32 = 25;

// ── Payload ───────────────────────────────────────────────────────────

/// Opaque data carried by an event.
///
/// The kernel never looks inside a payload; the variants exist so that
/// models can pick the cheapest representation for their traffic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Payload {
    /// No data (clock ticks, acks).
    #[default]
    Empty,
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Human-readable text, convenient in tests.
    Text(String),
    /// A single integer.
    Int(i64),
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Empty => write!(f, "Empty"),
            Payload::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Payload::Text(s) => {
                if s.chars().count() > 32 {
                    let head: String = s.chars().take(32).collect();
                    write!(f, "Text(\"{}…\")", head)
                } else {
                    write!(f, "Text({:?})", s)
                }
            }
            Payload::Int(v) => write!(f, "Int({})", v),
        }
    }
}

// ── Destination ───────────────────────────────────────────────────────

/// Which end of a link an event travels towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// One end of a link; the receiving end of a one-way delivery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkEnd {
    pub link: LinkId,
    pub side: Side,
}

impl std::fmt::Display for LinkEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = match self.side {
            Side::A => "a",
            Side::B => "b",
        };
        write!(f, "{}.{}", self.link, side)
    }
}

/// Where an event is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Destination {
    /// Across a link, to whatever is attached at this end.
    Link(LinkEnd),
    /// Straight to a port of a component in the same partition.
    /// Used for self-scheduled events and initial events.
    Port { component: ComponentId, port: String },
}

impl Destination {
    /// The link this event travels on, if any.
    pub fn link(&self) -> Option<LinkId> {
        match self {
            Destination::Link(end) => Some(end.link),
            Destination::Port { .. } => None,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Link(end) => write!(f, "{}", end),
            Destination::Port { component, port } => write!(f, "{}/{}", component, port),
        }
    }
}

// ── Sequence generator ────────────────────────────────────────────────

/// Per-partition, strictly increasing sequence counter.
///
/// Every event a partition creates takes the next value, so the
/// tie-break between equal `(time, priority)` pairs never depends on
/// thread interleaving.
#[derive(Debug, Clone, Default)]
pub struct SequenceGen {
    next: u64,
}

impl SequenceGen {
    pub fn new() -> Self {
        SequenceGen { next: 0 }
    }

    /// Resume counting at `start` (used by snapshot restore).
    pub fn starting_at(start: u64) -> Self {
        SequenceGen { next: start }
    }

    pub fn next_sequence(&mut self) -> u64 {
        let seq = self.next;
        self.next += 1;
        seq
    }

    /// The value the next call to `next_sequence` will return.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A single simulation event.
///
/// Created by a handler (or by the graph as an initial event), consumed
/// exactly once by the destination handler.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub payload: Payload,
    pub delivery_time: SimTime,
    pub priority: i32,
    pub sequence: u64,
    /// The partition that created the event (and assigned `sequence`).
    pub origin: PartitionId,
    pub destination: Destination,
}

impl Event {
    /// The ordering key of this event. See [`EventKey`].
    pub fn key(&self) -> EventKey {
        EventKey {
            time: self.delivery_time,
            priority: self.priority,
            sequence: self.sequence,
            origin: self.origin,
        }
    }
}

/// Dispatch-order key.
///
/// Events are ordered by:
/// 1. Delivery time (earlier first)
/// 2. Priority (lower first)
/// 3. Sequence number (creation order)
/// 4. Origin partition
///
/// Sequence numbers are unique within a partition, so the last field
/// only separates events created by different partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub time: SimTime,
    pub priority: i32,
    pub sequence: u64,
    pub origin: PartitionId,
}

/// Events order by their [`EventKey`]: the smallest dispatches first.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} p={} #{}@{}] → {} {}",
            self.delivery_time,
            self.priority,
            self.sequence,
            self.origin,
            self.destination,
            self.payload
        )
    }
}
