//! Tests for `HandlerContext` and the built-in components.
//!
//! Each test builds a single sequential partition and dispatches events
//! by hand, so handler behavior can be checked without the driver.

use crate::component::{Clock, Component, Echo, HandlerContext, SendOptions, Sink};
use crate::config::SimConfig;
use crate::error::{ConfigError, SimError, SimResult};
use crate::event::{Event, Payload, DEFAULT_PRIORITY, INITIAL_PRIORITY};
use crate::graph::{ComponentDesc, ConfigGraph, GraphBuilder};
use crate::id::{ComponentId, PartitionId};
use crate::partition::Partition;
use crate::registry::ComponentRegistry;
use crate::time::SimTime;

fn build(graph: &ConfigGraph, registry: &ComponentRegistry) -> Partition {
    let config = SimConfig::sequential().with_trace();
    let mut p = Partition::build(PartitionId::new(0, 0), graph, registry, &config).unwrap();
    p.seed(graph).unwrap();
    p
}

fn drain(p: &mut Partition) -> SimResult<()> {
    while p.next_time().is_some() {
        p.dispatch_next()?;
    }
    Ok(())
}

// ── Clock / Sink ──────────────────────────────────────────────────────

#[test]
fn test_clock_ticks_until_limit() {
    let graph = GraphBuilder::new()
        .component(ComponentDesc::new(0, "clock").param("period", 5).param("limit", 4))
        .component(ComponentDesc::new(1, "sink"))
        .link(0, (0, "out"), (1, "in"), 2)
        .build()
        .unwrap();
    let mut p = build(&graph, &ComponentRegistry::with_builtins());
    drain(&mut p).unwrap();

    let sink = p.component::<Sink>(ComponentId::new(1)).unwrap();
    let times: Vec<u64> = sink.received().iter().map(|r| r.time.ticks()).collect();
    assert_eq!(times, vec![2, 7, 12, 17]);
    let values: Vec<Payload> = sink.received().iter().map(|r| r.payload.clone()).collect();
    assert_eq!(
        values,
        vec![Payload::Int(1), Payload::Int(2), Payload::Int(3), Payload::Int(4)]
    );
    assert_eq!(p.component::<Clock>(ComponentId::new(0)).unwrap().ticks, 4);
}

#[test]
fn test_unconnected_clock_still_ticks() {
    let graph = GraphBuilder::new()
        .component(ComponentDesc::new(0, "clock").param("limit", 3))
        .build()
        .unwrap();
    let mut p = build(&graph, &ComponentRegistry::with_builtins());
    drain(&mut p).unwrap();
    assert_eq!(p.dispatched(), 3);
    assert_eq!(p.clock(), SimTime::new(2));
}

#[test]
fn test_clock_count_past_int_range_is_a_fault() {
    let graph = GraphBuilder::new()
        .component(ComponentDesc::new(0, "clock"))
        .component(ComponentDesc::new(1, "sink"))
        .link(0, (0, "out"), (1, "in"), 1)
        .build()
        .unwrap();
    let mut p = build(&graph, &ComponentRegistry::with_builtins());
    p.component_mut::<Clock>(ComponentId::new(0)).unwrap().ticks = i64::MAX as u64;

    match p.dispatch_next() {
        Err(SimError::Handler { component, fault, .. }) => {
            assert_eq!(component, ComponentId::new(0));
            assert!(fault.message.contains("does not fit"));
        }
        other => panic!("expected handler fault, got {:?}", other),
    }
}

#[test]
fn test_clock_rejects_zero_period() {
    let desc = ComponentDesc::new(7, "clock").param("period", 0);
    assert!(matches!(
        Clock::from_desc(&desc),
        Err(ConfigError::InvalidParam { ref key, .. }) if key == "period"
    ));
}

#[test]
fn test_sink_state_round_trip() {
    let graph = GraphBuilder::new()
        .component(ComponentDesc::new(0, "sink"))
        .initial_with(0, "in port", 3, Payload::Text("a b".into()))
        .initial_with(0, "in", 4, Payload::Bytes(vec![1, 2]))
        .build()
        .unwrap();
    let mut p = build(&graph, &ComponentRegistry::with_builtins());
    drain(&mut p).unwrap();

    let sink = p.component::<Sink>(ComponentId::new(0)).unwrap();
    let mut copy = Sink::new();
    copy.load_state(&sink.save_state()).unwrap();
    assert_eq!(copy.received(), sink.received());
    assert!(copy.load_state(b"garbage").is_err());
}

// ── Echo ──────────────────────────────────────────────────────────────

#[test]
fn test_echo_ping_pong_between_two_echoes() {
    let graph = GraphBuilder::new()
        .component(ComponentDesc::new(0, "echo"))
        .component(ComponentDesc::new(1, "echo"))
        .link(0, (0, "p"), (1, "p"), 3)
        .initial_with(0, "p", 0, Payload::Int(4))
        .build()
        .unwrap();
    let mut p = build(&graph, &ComponentRegistry::with_builtins());
    drain(&mut p).unwrap();

    // 4 → 3 → 2 → 1 → 0: five deliveries, the last one is not echoed.
    assert_eq!(p.dispatched(), 5);
    assert_eq!(p.clock(), SimTime::new(12));
    let a = p.component::<Echo>(ComponentId::new(0)).unwrap();
    let b = p.component::<Echo>(ComponentId::new(1)).unwrap();
    assert_eq!(a.handled + b.handled, 5);
    assert_eq!(a.echoed + b.echoed, 4);
}

#[test]
fn test_echo_fault_carries_component_and_time() {
    let graph = GraphBuilder::new()
        .component(ComponentDesc::new(3, "echo").param("fail_after", 1))
        .initial(3, "p", 6)
        .build()
        .unwrap();
    let mut p = build(&graph, &ComponentRegistry::with_builtins());
    match p.dispatch_next() {
        Err(SimError::Handler { component, time, fault }) => {
            assert_eq!(component, ComponentId::new(3));
            assert_eq!(time, SimTime::new(6));
            assert!(fault.message.contains("gave up"));
        }
        other => panic!("expected handler fault, got {:?}", other),
    }
}

#[test]
fn test_echo_on_unconnected_port_is_an_error() {
    let graph = GraphBuilder::new()
        .component(ComponentDesc::new(0, "echo"))
        .initial_with(0, "nowhere", 0, Payload::Int(1))
        .build()
        .unwrap();
    let mut p = build(&graph, &ComponentRegistry::with_builtins());
    assert_eq!(
        p.dispatch_next(),
        Err(SimError::UnknownPort {
            component: ComponentId::new(0),
            port: "nowhere".into(),
        })
    );
}

// ── HandlerContext ────────────────────────────────────────────────────

/// Records what the context reports and exercises each send flavor on
/// its first event.
#[derive(Default)]
struct Probe {
    seen: Vec<(SimTime, String, i32, u64)>,
    sent: bool,
}

impl Component for Probe {
    fn handle(&mut self, ctx: &mut HandlerContext, port: &str, event: Event) -> SimResult<()> {
        assert_eq!(ctx.partition(), PartitionId::new(0, 0));
        self.seen
            .push((ctx.now(), port.to_string(), event.priority, event.sequence));
        if !self.sent && ctx.component() == ComponentId::new(0) {
            self.sent = true;
            assert!(ctx.is_connected("out"));
            assert!(!ctx.is_connected("missing"));
            ctx.send("out", Payload::Int(1))?;
            ctx.send_with("out", Payload::Int(2), SendOptions::priority(10))?;
            ctx.send_with("out", Payload::Int(3), SendOptions::delayed(5))?;
            ctx.schedule_self("wake", 1, Payload::Empty)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[test]
fn test_send_flavors_and_ordering() {
    let registry = ComponentRegistry::new().with("probe", |_| Ok(Box::new(Probe::default())));
    let graph = GraphBuilder::new()
        .component(ComponentDesc::new(0, "probe"))
        .component(ComponentDesc::new(1, "probe"))
        .link(0, (0, "out"), (1, "in"), 2)
        .initial(0, "go", 10)
        .build()
        .unwrap();
    let mut p = build(&graph, &registry);
    drain(&mut p).unwrap();

    let first = p.component::<Probe>(ComponentId::new(0)).unwrap();
    assert_eq!(first.seen[0], (SimTime::new(10), "go".to_string(), INITIAL_PRIORITY, 0));
    assert_eq!(first.seen[1].0, SimTime::new(11));
    assert_eq!(first.seen[1].1, "wake");

    // At T=12 the priority-10 send overtakes the default one; the
    // delayed send lands at T=17.
    let second = p.component::<Probe>(ComponentId::new(1)).unwrap();
    let arrivals: Vec<(u64, i32)> = second.seen.iter().map(|s| (s.0.ticks(), s.2)).collect();
    assert_eq!(
        arrivals,
        vec![(12, 10), (12, DEFAULT_PRIORITY), (17, DEFAULT_PRIORITY)]
    );
}

#[test]
fn test_schedule_self_overflow() {
    struct Greedy;
    impl Component for Greedy {
        fn handle(&mut self, ctx: &mut HandlerContext, _port: &str, _event: Event) -> SimResult<()> {
            ctx.schedule_self("again", u64::MAX, Payload::Empty)
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    let registry = ComponentRegistry::new().with("greedy", |_| Ok(Box::new(Greedy)));
    let graph = GraphBuilder::new()
        .component(ComponentDesc::new(0, "greedy"))
        .initial(0, "go", 1)
        .build()
        .unwrap();
    let mut p = build(&graph, &registry);
    assert_eq!(
        p.dispatch_next(),
        Err(SimError::TimeOverflow {
            now: SimTime::new(1),
            delay: u64::MAX,
        })
    );
}
