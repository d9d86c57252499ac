//! TraceEntry — records every event dispatched by a partition.

use crate::id::{ComponentId, PartitionId};
use crate::time::SimTime;

/// A record of a single dispatch.
///
/// Appended by the partition on every dispatch when tracing is enabled
/// in [`SimConfig`](crate::config::SimConfig). Two runs of the same
/// graph produce identical traces, which is what the determinism tests
/// compare.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceEntry {
    /// Delivery time of the event, i.e. the clock after dispatch.
    pub time: SimTime,
    pub priority: i32,
    pub sequence: u64,
    /// Partition that created the event.
    pub origin: PartitionId,
    /// Component that handled it.
    pub component: ComponentId,
    pub port: String,
}

impl std::fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} p={} #{}@{}] {}/{}",
            self.time, self.priority, self.sequence, self.origin, self.component, self.port,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let entry = TraceEntry {
            time: SimTime::new(12),
            priority: 50,
            sequence: 4,
            origin: PartitionId::new(0, 1),
            component: ComponentId::new(3),
            port: "in".into(),
        };
        assert_eq!(entry.to_string(), "[T=12 p=50 #4@P0.1] C3/in");
    }
}
