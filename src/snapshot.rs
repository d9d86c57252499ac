/// Snapshots: the complete state of a simulation at an epoch boundary.
///
/// A snapshot holds, per partition, the opaque state of each component,
/// the pending vortex events, and the events buffered for other
/// partitions but not yet exchanged (in flight on their links).
/// Restoring it into a freshly built simulation of the same graph
/// reproduces the original run's dispatch order exactly.
///
/// The text form is line-oriented and versioned:
///
/// ```text
/// # PARSIM SNAPSHOT v1
/// V <lookahead | ->
/// P <rank> <thread> <phase> <epoch> <bound> <clock> <next-seq> <dispatched> <sent> <received>
/// S <component> <state>
/// Q <event>
/// O <dest-rank> <dest-thread> <event>
/// ```
///
/// `S`, `Q` and `O` lines belong to the preceding `P` line. Byte strings
/// are written as `x` followed by lowercase hex.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use crate::error::SnapshotError;
use crate::event::{Destination, Event, LinkEnd, Payload, Side};
use crate::id::{ComponentId, LinkId, PartitionId};
use crate::report::Completion;
use crate::sync::EpochPhase;
use crate::time::SimTime;

/// Format version written by [`Snapshot::encode`].
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER: &str = "# PARSIM SNAPSHOT v";

// ── Types ─────────────────────────────────────────────────────────────

/// State of the whole simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub version: u32,
    /// `None` for a snapshot taken before the first run.
    pub lookahead: Option<SimTime>,
    pub partitions: Vec<PartitionSnapshot>,
}

/// State of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSnapshot {
    pub id: PartitionId,
    pub phase: EpochPhase,
    pub epoch: u64,
    pub epoch_bound: SimTime,
    pub clock: SimTime,
    pub next_sequence: u64,
    pub dispatched: u64,
    pub sent_remote: u64,
    pub received_remote: u64,
    /// `Component::save_state` of every component, by id.
    pub components: BTreeMap<ComponentId, Vec<u8>>,
    /// Vortex contents in dispatch order.
    pub pending: Vec<Event>,
    /// Outbound buffers, by destination partition.
    pub outbound: BTreeMap<PartitionId, Vec<Event>>,
}

impl PartitionSnapshot {
    /// Outbound events grouped by the link they travel on.
    pub fn in_flight(&self) -> BTreeMap<LinkId, Vec<&Event>> {
        let mut by_link: BTreeMap<LinkId, Vec<&Event>> = BTreeMap::new();
        for event in self.outbound.values().flatten() {
            if let Some(link) = event.destination.link() {
                by_link.entry(link).or_default().push(event);
            }
        }
        by_link
    }

    pub fn in_flight_on(&self, link: LinkId) -> Vec<&Event> {
        self.outbound
            .values()
            .flatten()
            .filter(|e| e.destination.link() == Some(link))
            .collect()
    }
}

impl Snapshot {
    pub fn partition(&self, id: PartitionId) -> Option<&PartitionSnapshot> {
        self.partitions.iter().find(|p| p.id == id)
    }

    /// Events in flight on `link`, whichever partition buffered them.
    pub fn in_flight_on(&self, link: LinkId) -> Vec<&Event> {
        self.partitions.iter().flat_map(|p| p.in_flight_on(link)).collect()
    }

    /// Pending plus in-flight events over all partitions.
    pub fn event_count(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| p.pending.len() + p.outbound.values().map(Vec::len).sum::<usize>())
            .sum()
    }

    // ── Encode ────────────────────────────────────────────────────────

    /// Write the snapshot in the versioned text format.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "{}{}", HEADER, self.version)?;
        match self.lookahead {
            Some(l) => writeln!(w, "V {}", l.ticks())?,
            None => writeln!(w, "V -")?,
        }
        for p in &self.partitions {
            writeln!(
                w,
                "P {} {} {} {} {} {} {} {} {} {}",
                p.id.rank,
                p.id.thread,
                phase_token(p.phase),
                p.epoch,
                p.epoch_bound.ticks(),
                p.clock.ticks(),
                p.next_sequence,
                p.dispatched,
                p.sent_remote,
                p.received_remote
            )?;
            for (id, state) in &p.components {
                writeln!(w, "S {} {}", id.raw(), hex_encode(state))?;
            }
            for event in &p.pending {
                writeln!(w, "Q {}", event_token(event))?;
            }
            for (dest, events) in &p.outbound {
                for event in events {
                    writeln!(w, "O {} {} {}", dest.rank, dest.thread, event_token(event))?;
                }
            }
        }
        Ok(())
    }

    pub fn to_text(&self) -> String {
        let mut buf = Vec::new();
        // Writing to a Vec cannot fail.
        let _ = self.encode(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Export to a file path.
    pub fn encode_to_file(&self, path: &str) -> io::Result<()> {
        let mut f = std::fs::File::create(path)?;
        self.encode(&mut f)
    }

    // ── Decode ────────────────────────────────────────────────────────

    /// Read a snapshot written by [`encode`](Self::encode).
    pub fn decode<R: BufRead>(r: R) -> Result<Snapshot, SnapshotError> {
        let mut version = None;
        let mut lookahead = None;
        let mut partitions: Vec<PartitionSnapshot> = Vec::new();

        for (index, line) in r.lines().enumerate() {
            let n = index + 1;
            let malformed = |message: String| SnapshotError::Malformed { line: n, message };
            let line = line.map_err(|e| malformed(e.to_string()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if version.is_none() {
                let found = line
                    .strip_prefix(HEADER)
                    .ok_or_else(|| malformed("missing snapshot header".into()))?
                    .parse::<u32>()
                    .map_err(|e| malformed(format!("bad version: {}", e)))?;
                if found != SNAPSHOT_VERSION {
                    return Err(SnapshotError::UnsupportedVersion {
                        found,
                        expected: SNAPSHOT_VERSION,
                    });
                }
                version = Some(found);
                continue;
            }
            if line.starts_with('#') {
                continue;
            }

            let (tag, rest) = line.split_once(' ').unwrap_or((line, ""));
            match tag {
                "V" => {
                    lookahead = match rest {
                        "-" => None,
                        t => Some(SimTime::new(parse_num(t, "lookahead").map_err(malformed)?)),
                    };
                }
                "P" => partitions.push(parse_partition(rest).map_err(malformed)?),
                "S" | "Q" | "O" => {
                    let current = partitions
                        .last_mut()
                        .ok_or_else(|| malformed(format!("{} line before any P line", tag)))?;
                    match tag {
                        "S" => {
                            let (id, state) = rest
                                .split_once(' ')
                                .ok_or_else(|| malformed("bad component state".into()))?;
                            let id = ComponentId::new(parse_num(id, "component").map_err(malformed)?);
                            current.components.insert(id, hex_decode(state).map_err(malformed)?);
                        }
                        "Q" => current.pending.push(parse_event(rest).map_err(malformed)?),
                        _ => {
                            let mut parts = rest.splitn(3, ' ');
                            let rank = parse_num(parts.next().unwrap_or(""), "rank").map_err(malformed)?;
                            let thread = parse_num(parts.next().unwrap_or(""), "thread").map_err(malformed)?;
                            let event = parse_event(parts.next().unwrap_or("")).map_err(malformed)?;
                            current
                                .outbound
                                .entry(PartitionId::new(rank, thread))
                                .or_default()
                                .push(event);
                        }
                    }
                }
                other => return Err(malformed(format!("unknown line tag {:?}", other))),
            }
        }

        let version = version.ok_or(SnapshotError::Malformed {
            line: 0,
            message: "empty snapshot".into(),
        })?;
        Ok(Snapshot {
            version,
            lookahead,
            partitions,
        })
    }

    pub fn from_text(text: &str) -> Result<Snapshot, SnapshotError> {
        Self::decode(text.as_bytes())
    }
}

// ── Token helpers ─────────────────────────────────────────────────────

/// `x` followed by lowercase hex.
pub fn hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(1 + data.len() * 2);
    out.push('x');
    for b in data {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Inverse of [`hex_encode`].
pub fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    let hex = s
        .strip_prefix('x')
        .ok_or_else(|| format!("byte string {:?} lacks the x prefix", s))?;
    if hex.len() % 2 != 0 {
        return Err("odd hex length".into());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .ok_or_else(|| "non-ascii hex".to_string())
                .and_then(|pair| u8::from_str_radix(pair, 16).map_err(|e| format!("hex decode error: {}", e)))
        })
        .collect()
}

/// Single-token form of a payload: `E`, `B:<bytes>`, `T:<bytes>` or
/// `I:<n>`.
pub fn payload_token(payload: &Payload) -> String {
    match payload {
        Payload::Empty => "E".into(),
        Payload::Bytes(b) => format!("B:{}", hex_encode(b)),
        Payload::Text(t) => format!("T:{}", hex_encode(t.as_bytes())),
        Payload::Int(v) => format!("I:{}", v),
    }
}

/// Inverse of [`payload_token`].
pub fn parse_payload_token(s: &str) -> Result<Payload, String> {
    if s == "E" {
        return Ok(Payload::Empty);
    }
    if let Some(hex) = s.strip_prefix("B:") {
        return Ok(Payload::Bytes(hex_decode(hex)?));
    }
    if let Some(hex) = s.strip_prefix("T:") {
        let text = String::from_utf8(hex_decode(hex)?).map_err(|e| format!("utf8 error: {}", e))?;
        return Ok(Payload::Text(text));
    }
    if let Some(v) = s.strip_prefix("I:") {
        return v.parse().map(Payload::Int).map_err(|e| format!("bad int payload: {}", e));
    }
    Err(format!("unknown payload: {}", s))
}

fn phase_token(phase: EpochPhase) -> &'static str {
    match phase {
        EpochPhase::Accumulate => "accumulate",
        EpochPhase::AwaitingExchange => "exchange",
        EpochPhase::Complete(Completion::Drained) => "drained",
        EpochPhase::Complete(Completion::EndTime) => "endtime",
    }
}

fn parse_phase(s: &str) -> Result<EpochPhase, String> {
    match s {
        "accumulate" => Ok(EpochPhase::Accumulate),
        "exchange" => Ok(EpochPhase::AwaitingExchange),
        "drained" => Ok(EpochPhase::Complete(Completion::Drained)),
        "endtime" => Ok(EpochPhase::Complete(Completion::EndTime)),
        other => Err(format!("unknown phase {:?}", other)),
    }
}

fn event_token(e: &Event) -> String {
    let dest = match &e.destination {
        Destination::Link(end) => {
            let side = match end.side {
                Side::A => 'a',
                Side::B => 'b',
            };
            format!("L{}.{}", end.link.raw(), side)
        }
        Destination::Port { component, port } => {
            format!("C{}/{}", component.raw(), hex_encode(port.as_bytes()))
        }
    };
    format!(
        "{} {} {} {} {} {} {}",
        e.delivery_time.ticks(),
        e.priority,
        e.sequence,
        e.origin.rank,
        e.origin.thread,
        dest,
        payload_token(&e.payload)
    )
}

fn parse_num<T: std::str::FromStr>(s: &str, label: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    s.parse::<T>().map_err(|e| format!("invalid {} {:?}: {}", label, s, e))
}

fn parse_destination(s: &str) -> Result<Destination, String> {
    if let Some(rest) = s.strip_prefix('L') {
        let (link, side) = rest
            .split_once('.')
            .ok_or_else(|| format!("bad link end {:?}", s))?;
        let side = match side {
            "a" => Side::A,
            "b" => Side::B,
            other => return Err(format!("bad link side {:?}", other)),
        };
        return Ok(Destination::Link(LinkEnd {
            link: LinkId::new(parse_num(link, "link")?),
            side,
        }));
    }
    if let Some(rest) = s.strip_prefix('C') {
        let (component, port) = rest
            .split_once('/')
            .ok_or_else(|| format!("bad port destination {:?}", s))?;
        let port = String::from_utf8(hex_decode(port)?).map_err(|e| format!("utf8 error: {}", e))?;
        return Ok(Destination::Port {
            component: ComponentId::new(parse_num(component, "component")?),
            port,
        });
    }
    Err(format!("unknown destination {:?}", s))
}

fn parse_event(s: &str) -> Result<Event, String> {
    let parts: Vec<&str> = s.split(' ').collect();
    if parts.len() != 7 {
        return Err(format!("invalid event: {}", s));
    }
    Ok(Event {
        delivery_time: SimTime::new(parse_num(parts[0], "time")?),
        priority: parse_num(parts[1], "priority")?,
        sequence: parse_num(parts[2], "sequence")?,
        origin: PartitionId::new(parse_num(parts[3], "rank")?, parse_num(parts[4], "thread")?),
        destination: parse_destination(parts[5])?,
        payload: parse_payload_token(parts[6])?,
    })
}

fn parse_partition(s: &str) -> Result<PartitionSnapshot, String> {
    let parts: Vec<&str> = s.split(' ').collect();
    if parts.len() != 10 {
        return Err(format!("invalid partition line: {}", s));
    }
    Ok(PartitionSnapshot {
        id: PartitionId::new(parse_num(parts[0], "rank")?, parse_num(parts[1], "thread")?),
        phase: parse_phase(parts[2])?,
        epoch: parse_num(parts[3], "epoch")?,
        epoch_bound: SimTime::new(parse_num(parts[4], "bound")?),
        clock: SimTime::new(parse_num(parts[5], "clock")?),
        next_sequence: parse_num(parts[6], "sequence")?,
        dispatched: parse_num(parts[7], "dispatched")?,
        sent_remote: parse_num(parts[8], "sent")?,
        received_remote: parse_num(parts[9], "received")?,
        components: BTreeMap::new(),
        pending: Vec::new(),
        outbound: BTreeMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(time: u64, destination: Destination, payload: Payload) -> Event {
        Event {
            payload,
            delivery_time: SimTime::new(time),
            priority: 50,
            sequence: time,
            origin: PartitionId::new(0, 1),
            destination,
        }
    }

    fn sample() -> Snapshot {
        let to_link = |link, side| Destination::Link(LinkEnd { link: LinkId::new(link), side });
        let mut outbound = BTreeMap::new();
        outbound.insert(
            PartitionId::new(1, 0),
            vec![
                event(9, to_link(4, Side::B), Payload::Int(-3)),
                event(10, to_link(5, Side::A), Payload::Text("hi there".into())),
                event(11, to_link(4, Side::B), Payload::Empty),
            ],
        );
        let mut components = BTreeMap::new();
        components.insert(ComponentId::new(2), vec![1, 0, 0, 0, 0, 0, 0, 0]);
        components.insert(ComponentId::new(3), Vec::new());
        Snapshot {
            version: SNAPSHOT_VERSION,
            lookahead: Some(SimTime::new(4)),
            partitions: vec![PartitionSnapshot {
                id: PartitionId::new(0, 1),
                phase: EpochPhase::AwaitingExchange,
                epoch: 2,
                epoch_bound: SimTime::new(12),
                clock: SimTime::new(8),
                next_sequence: 12,
                dispatched: 7,
                sent_remote: 3,
                received_remote: 1,
                components,
                pending: vec![event(
                    13,
                    Destination::Port {
                        component: ComponentId::new(2),
                        port: "tick".into(),
                    },
                    Payload::Bytes(vec![0xde, 0xad]),
                )],
                outbound,
            }],
        }
    }

    #[test]
    fn test_text_round_trip() {
        let snap = sample();
        let text = snap.to_text();
        assert!(text.starts_with("# PARSIM SNAPSHOT v1\n"));
        assert_eq!(Snapshot::from_text(&text), Ok(snap));
    }

    #[test]
    fn test_in_flight_by_link() {
        let snap = sample();
        let p = snap.partition(PartitionId::new(0, 1)).unwrap();
        let by_link = p.in_flight();
        assert_eq!(by_link[&LinkId::new(4)].len(), 2);
        assert_eq!(by_link[&LinkId::new(5)].len(), 1);
        assert_eq!(snap.in_flight_on(LinkId::new(4)).len(), 2);
        assert!(snap.in_flight_on(LinkId::new(6)).is_empty());
        assert_eq!(snap.event_count(), 4);
    }

    #[test]
    fn test_unsupported_version() {
        let text = sample().to_text().replacen("v1", "v9", 1);
        assert_eq!(
            Snapshot::from_text(&text),
            Err(SnapshotError::UnsupportedVersion { found: 9, expected: 1 })
        );
    }

    #[test]
    fn test_malformed_lines_report_line_number() {
        let err = Snapshot::from_text("# PARSIM SNAPSHOT v1\nV -\nQ 1 2 3 0 0 L1.a E\n").unwrap_err();
        assert!(matches!(err, SnapshotError::Malformed { line: 3, .. }));

        let err = Snapshot::from_text("V 4\n").unwrap_err();
        assert!(matches!(err, SnapshotError::Malformed { line: 1, .. }));

        let err = Snapshot::from_text("").unwrap_err();
        assert!(matches!(err, SnapshotError::Malformed { line: 0, .. }));
    }

    #[test]
    fn test_payload_tokens() {
        for payload in [
            Payload::Empty,
            Payload::Int(i64::MIN),
            Payload::Bytes(Vec::new()),
            Payload::Text("with spaces".into()),
        ] {
            let token = payload_token(&payload);
            assert!(!token.contains(' '));
            assert_eq!(parse_payload_token(&token), Ok(payload));
        }
        assert!(parse_payload_token("Z").is_err());
    }

    #[test]
    fn test_hex_requires_prefix() {
        assert_eq!(hex_encode(&[0x0a, 0xff]), "x0aff");
        assert_eq!(hex_decode("x0aff"), Ok(vec![0x0a, 0xff]));
        assert_eq!(hex_decode("x"), Ok(Vec::new()));
        assert!(hex_decode("0aff").is_err());
        assert!(hex_decode("x0af").is_err());
    }
}
