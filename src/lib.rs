//! # parsim — Parallel Discrete-Event Simulation Kernel
//!
//! Components exchange timestamped events over fixed-latency links.
//! The model is split into partitions, one per `(rank, thread)` pair,
//! and every partition runs on its own thread. Partitions stay in step
//! through conservative epoch synchronization: no partition dispatches
//! an event before every event that could still reach it from a peer
//! has arrived.
//!
//! A run is deterministic: the same graph and partition layout always
//! dispatch the same events in the same order.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                Simulation                  │ ← builds, spawns, reports
//! │  ┌──────────────────────┐  ┌────────────┐  │
//! │  │  Driver (per thread) │◀▶│ Collective │  │ ← epoch exchange, abort
//! │  │  ┌────────────────┐  │  └────────────┘  │
//! │  │  │   Partition     │  │                  │
//! │  │  │  ┌──────────┐   │  │                  │
//! │  │  │  │ Vortex   │   │  │                  │ ← ordered pending events
//! │  │  │  └──────────┘   │  │                  │
//! │  │  │  ┌──────────┐   │  │                  │
//! │  │  │  │ Links    │   │  │                  │ ← port → route table
//! │  │  │  └──────────┘   │  │                  │
//! │  │  │  ┌──────────┐   │  │                  │
//! │  │  │  │ Sync     │   │  │                  │ ← lookahead, outbound
//! │  │  │  └──────────┘   │  │                  │
//! │  │  │  Components     │  │                  │ ← user models
//! │  │  └────────────────┘  │                  │
//! │  └──────────────────────┘                  │
//! └────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use parsim::{ComponentDesc, ComponentRegistry, GraphBuilder, SimConfig, Simulation};
//!
//! let graph = GraphBuilder::new()
//!     .component(ComponentDesc::new(0, "clock").on(0, 0).param("period", 5).param("limit", 3))
//!     .component(ComponentDesc::new(1, "sink").on(0, 1))
//!     .link(0, (0, "out"), (1, "in"), 4)
//!     .build()
//!     .unwrap();
//!
//! let mut sim = Simulation::new(&graph, &ComponentRegistry::with_builtins(), SimConfig::threads(2)).unwrap();
//! let report = sim.run().unwrap();
//! assert!(report.status.is_complete());
//! assert_eq!(report.total_dispatched(), 6);
//! ```

pub mod component;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod exchange;
pub mod graph;
pub mod id;
pub mod link;
pub mod partition;
pub mod registry;
pub mod report;
pub mod simulation;
pub mod snapshot;
pub mod stats;
pub mod sync;
pub mod time;
pub mod trace;
pub mod vortex;

// Re-exports for convenience.
pub use component::{Clock, Component, Echo, HandlerContext, SendOptions, Sink};
pub use config::{Params, SimConfig};
pub use driver::{Driver, DriverState};
pub use error::{AbortReason, CausalityError, ConfigError, HandlerFault, SimError, SimResult, SnapshotError, SyncFailure};
pub use event::{Destination, Event, LinkEnd, Payload, Side};
pub use exchange::{ChannelCollective, Collective};
pub use graph::{ComponentDesc, ConfigGraph, GraphBuilder};
pub use id::{ComponentId, ComponentKey, LinkId, PartitionId};
pub use partition::Partition;
pub use registry::ComponentRegistry;
pub use report::{Completion, PartitionReport, RunReport, RunStatus};
pub use simulation::Simulation;
pub use snapshot::{PartitionSnapshot, Snapshot};
pub use stats::{EpochSample, StatsCollector};
pub use sync::{EpochPhase, SyncManager};
pub use time::SimTime;
pub use trace::TraceEntry;
pub use vortex::TimeVortex;
