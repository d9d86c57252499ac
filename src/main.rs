use std::process;

use parsim::{
    ComponentDesc, ComponentRegistry, ConfigGraph, GraphBuilder, Payload, RunReport, SimConfig,
    SimError, SimTime, Simulation, Snapshot,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    println!("═══════════════════════════════════════════════════════");
    println!("  parsim — Parallel Discrete-Event Simulation");
    println!("  4 partitions, clock ring + cross-partition echo");
    println!("═══════════════════════════════════════════════════════");
    println!();

    let graph = match demo_graph() {
        Ok(graph) => graph,
        Err(err) => fail(err.into()),
    };
    let registry = ComponentRegistry::with_builtins();

    // ── Run 1 and Run 2: identical full runs ──────────────────
    let first = run_full(&graph, &registry, "Run 1").unwrap_or_else(|err| fail(err));
    let second = run_full(&graph, &registry, "Run 2").unwrap_or_else(|err| fail(err));

    // ── Run 3: pause at T=20, snapshot, restore, finish ───────
    let resumed = run_checkpointed(&graph, &registry, SimTime::new(20)).unwrap_or_else(|err| fail(err));

    // ── Verify ────────────────────────────────────────────────
    println!("  Verification:");
    println!("    Run 1 fingerprint: {:016x}", first.fingerprint());
    println!("    Run 2 fingerprint: {:016x}", second.fingerprint());
    if first.fingerprint() == second.fingerprint() {
        println!("    ✓ Traces are IDENTICAL — deterministic execution confirmed.");
    } else {
        println!("    ✗ MISMATCH — determinism violation detected!");
    }
    println!(
        "    Checkpointed run dispatched {} events (full run: {})",
        resumed,
        first.total_dispatched()
    );
    println!();
    println!("  ✓ Demo complete.");
}

/// Four clocks in a ring, each feeding the sink of the next partition,
/// plus an echo pair bouncing a counter between P0.0 and P1.1.
fn demo_graph() -> Result<ConfigGraph, parsim::ConfigError> {
    let placement = [(0, 0), (0, 1), (1, 0), (1, 1)];
    let mut builder = GraphBuilder::new();
    for (i, &(rank, thread)) in placement.iter().enumerate() {
        let clock = i as u64 * 2;
        builder = builder
            .component(
                ComponentDesc::new(clock, "clock")
                    .on(rank, thread)
                    .param("period", 3 + i)
                    .param("limit", 8),
            )
            .component(ComponentDesc::new(clock + 1, "sink").on(rank, thread));
    }
    for i in 0..4u64 {
        let sink = ((i + 1) % 4) * 2 + 1;
        builder = builder.link(i, (i * 2, "out"), (sink, "in"), 3 + i);
    }
    builder
        .component(ComponentDesc::new(100, "echo").on(0, 0))
        .component(ComponentDesc::new(101, "echo").on(1, 1))
        .link(100, (100, "peer"), (101, "peer"), 5)
        .initial_with(100, "peer", 1, Payload::Int(10))
        .build()
}

fn run_full(graph: &ConfigGraph, registry: &ComponentRegistry, label: &str) -> Result<RunReport, SimError> {
    let mut sim = Simulation::new(graph, registry, SimConfig::grid(2, 2).with_trace())?;
    let report = sim.run()?;
    println!("  {}: {} events in {} epochs", label, report.total_dispatched(), report.epochs());
    print!("{}", report);
    println!();
    Ok(report)
}

fn run_checkpointed(graph: &ConfigGraph, registry: &ComponentRegistry, at: SimTime) -> Result<u64, SimError> {
    let config = SimConfig::grid(2, 2);
    let mut sim = Simulation::new(graph, registry, config.clone())?;
    let head = sim.run_until(at)?;
    println!("  Run 3: {} after {} events", head.status, head.total_dispatched());

    let text = sim.snapshot()?.to_text();
    let snapshot = Snapshot::from_text(&text)?;
    println!("    Snapshot: {} bytes, {} events in flight", text.len(), snapshot.event_count());

    let mut restored = Simulation::restore(graph, registry, config, &snapshot)?;
    let tail = restored.run()?;
    println!("    Resumed: {}, {} events in total", tail.status, tail.total_dispatched());
    println!();
    Ok(tail.total_dispatched())
}

fn fail(err: SimError) -> ! {
    eprintln!("  ✗ simulation aborted: {}", err);
    process::exit(err.exit_code())
}
