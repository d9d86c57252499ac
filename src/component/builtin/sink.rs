//! `Sink` — records everything it receives.

use crate::component::context::HandlerContext;
use crate::component::traits::Component;
use crate::error::{SimError, SimResult, SnapshotError};
use crate::event::{Event, Payload};
use crate::snapshot::{hex_decode, hex_encode, parse_payload_token, payload_token};
use crate::time::SimTime;

/// One received event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub time: SimTime,
    pub port: String,
    pub payload: Payload,
}

/// Terminal component for tests and demos. Never sends.
#[derive(Debug, Clone, Default)]
pub struct Sink {
    received: Vec<Received>,
    finished_at: Option<SimTime>,
}

impl Sink {
    pub fn new() -> Self {
        Sink::default()
    }

    pub fn received(&self) -> &[Received] {
        &self.received
    }

    /// Time `finish` was called at, once the run completed.
    pub fn finished_at(&self) -> Option<SimTime> {
        self.finished_at
    }
}

impl Component for Sink {
    fn handle(&mut self, ctx: &mut HandlerContext, port: &str, event: Event) -> SimResult<()> {
        self.received.push(Received {
            time: ctx.now(),
            port: port.to_string(),
            payload: event.payload,
        });
        Ok(())
    }

    fn finish(&mut self, now: SimTime) {
        self.finished_at = Some(now);
    }

    /// One line per record: `<time> <port> <payload>`.
    fn save_state(&self) -> Vec<u8> {
        let mut out = String::new();
        for r in &self.received {
            out.push_str(&format!(
                "{} {} {}\n",
                r.time.ticks(),
                hex_encode(r.port.as_bytes()),
                payload_token(&r.payload)
            ));
        }
        out.into_bytes()
    }

    fn load_state(&mut self, state: &[u8]) -> SimResult<()> {
        let bad = |message: String| SimError::Snapshot(SnapshotError::Mismatch(message));
        let text = std::str::from_utf8(state).map_err(|e| bad(format!("sink state: {}", e)))?;
        let mut received = Vec::new();
        for line in text.lines() {
            let parts: Vec<&str> = line.split(' ').collect();
            if parts.len() != 3 {
                return Err(bad(format!("sink record {:?}", line)));
            }
            let time = parts[0]
                .parse::<u64>()
                .map_err(|e| bad(format!("sink time: {}", e)))?;
            let port = hex_decode(parts[1])
                .and_then(|b| String::from_utf8(b).map_err(|e| e.to_string()))
                .map_err(bad)?;
            let payload = parse_payload_token(parts[2]).map_err(bad)?;
            received.push(Received {
                time: SimTime::new(time),
                port,
                payload,
            });
        }
        self.received = received;
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
