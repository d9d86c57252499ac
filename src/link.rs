/// Links: fixed-latency delivery paths between component ports.
///
/// A link is bidirectional in the graph and modeled here as two one-way
/// paths. Every partition builds a [`LinkTable`] holding the paths that
/// start at its own components (outgoing routes) and the link ends that
/// terminate at them (incoming resolution).

use std::collections::BTreeMap;

use crate::error::{SimError, SimResult};
use crate::event::{LinkEnd, Side};
use crate::graph::{ConfigGraph, Endpoint};
use crate::id::{ComponentId, LinkId, PartitionId};
use crate::time::SimTime;

/// One outgoing delivery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub link: LinkId,
    pub latency: SimTime,
    /// The receiving end of the path.
    pub to: LinkEnd,
    /// The partition that owns the receiving component.
    pub to_partition: PartitionId,
}

impl Route {
    /// `now + latency + extra_delay`.
    pub fn delivery_time(&self, now: SimTime, extra_delay: u64) -> SimResult<SimTime> {
        now.checked_add(self.latency)
            .and_then(|t| t.checked_add(SimTime::new(extra_delay)))
            .ok_or(SimError::TimeOverflow {
                now,
                delay: self.latency.ticks().saturating_add(extra_delay),
            })
    }

    pub fn is_remote(&self, here: PartitionId) -> bool {
        self.to_partition != here
    }
}

/// Routing state of one partition.
#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    outgoing: BTreeMap<(ComponentId, String), Route>,
    incoming: BTreeMap<LinkEnd, Endpoint>,
}

impl LinkTable {
    /// Collect the routes touching `partition`.
    pub fn for_partition(graph: &ConfigGraph, partition: PartitionId) -> Self {
        let mut table = LinkTable::default();
        for link in graph.links() {
            for side in [Side::A, Side::B] {
                let from = link.endpoint(side);
                if graph.partition_of(from.component) != Some(partition) {
                    continue;
                }
                let to = link.endpoint(side.opposite());
                let to_partition = graph.partition_of(to.component).unwrap_or(partition);
                table.outgoing.insert(
                    (from.component, from.port.clone()),
                    Route {
                        link: link.id,
                        latency: link.latency,
                        to: LinkEnd {
                            link: link.id,
                            side: side.opposite(),
                        },
                        to_partition,
                    },
                );
                table.incoming.insert(LinkEnd { link: link.id, side }, from.clone());
            }
        }
        table
    }

    /// The path leaving `component` through `port`.
    pub fn route(&self, component: ComponentId, port: &str) -> Option<&Route> {
        self.outgoing.get(&(component, port.to_string()))
    }

    /// The local endpoint attached at `end`.
    pub fn resolve(&self, end: LinkEnd) -> Option<&Endpoint> {
        self.incoming.get(&end)
    }

    /// Smallest latency of any path leaving this partition for another.
    ///
    /// This is the partition's contribution to the global lookahead
    /// reduction; [`SimTime::MAX`] when nothing leaves.
    pub fn min_remote_latency(&self, here: PartitionId) -> SimTime {
        self.outgoing
            .values()
            .filter(|r| r.is_remote(here))
            .map(|r| r.latency)
            .min()
            .unwrap_or(SimTime::MAX)
    }

    pub fn routes(&self) -> impl Iterator<Item = (&(ComponentId, String), &Route)> {
        self.outgoing.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComponentDesc, GraphBuilder};

    fn graph() -> ConfigGraph {
        GraphBuilder::new()
            .component(ComponentDesc::new(0, "echo").on(0, 0))
            .component(ComponentDesc::new(1, "echo").on(0, 0))
            .component(ComponentDesc::new(2, "echo").on(1, 0))
            .link(10, (0, "local"), (1, "local"), 1)
            .link(11, (1, "remote"), (2, "remote"), 6)
            .build()
            .unwrap()
    }

    #[test]
    fn test_routes_of_partition() {
        let p0 = PartitionId::new(0, 0);
        let table = LinkTable::for_partition(&graph(), p0);

        let local = table.route(ComponentId::new(0), "local").unwrap();
        assert_eq!(local.to, LinkEnd { link: LinkId::new(10), side: Side::B });
        assert!(!local.is_remote(p0));

        let remote = table.route(ComponentId::new(1), "remote").unwrap();
        assert_eq!(remote.to_partition, PartitionId::new(1, 0));
        assert!(remote.is_remote(p0));

        // Component 2 lives elsewhere: no outgoing route from here.
        assert!(table.route(ComponentId::new(2), "remote").is_none());
        assert_eq!(table.routes().count(), 3);
    }

    #[test]
    fn test_resolve_incoming_end() {
        let table = LinkTable::for_partition(&graph(), PartitionId::new(1, 0));
        let end = LinkEnd { link: LinkId::new(11), side: Side::B };
        assert_eq!(table.resolve(end), Some(&Endpoint::new(2, "remote")));
        // The other end belongs to partition 0.
        let far = LinkEnd { link: LinkId::new(11), side: Side::A };
        assert!(table.resolve(far).is_none());
    }

    #[test]
    fn test_min_remote_latency() {
        let g = graph();
        let p0 = PartitionId::new(0, 0);
        assert_eq!(LinkTable::for_partition(&g, p0).min_remote_latency(p0), SimTime::new(6));

        let lonely = GraphBuilder::new()
            .component(ComponentDesc::new(0, "echo"))
            .build()
            .unwrap();
        assert!(LinkTable::for_partition(&lonely, p0)
            .min_remote_latency(p0)
            .is_unbounded());
    }

    #[test]
    fn test_delivery_time() {
        let route = Route {
            link: LinkId::new(0),
            latency: SimTime::new(4),
            to: LinkEnd { link: LinkId::new(0), side: Side::B },
            to_partition: PartitionId::new(0, 0),
        };
        assert_eq!(route.delivery_time(SimTime::new(10), 0), Ok(SimTime::new(14)));
        assert_eq!(route.delivery_time(SimTime::new(10), 3), Ok(SimTime::new(17)));
        assert!(matches!(
            route.delivery_time(SimTime::new(u64::MAX - 1), 0),
            Err(SimError::TimeOverflow { .. })
        ));
    }
}
