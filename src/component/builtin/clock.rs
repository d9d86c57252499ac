//! `Clock` — emits a numbered tick on a fixed period.

use crate::component::context::HandlerContext;
use crate::component::traits::{read_words, write_words, Component};
use crate::error::{ConfigError, SimResult};
use crate::event::{Event, Payload};
use crate::graph::ComponentDesc;
use crate::id::ComponentId;

/// Self-scheduled timer that sends `Int(n)` on its `out` port for the
/// n-th tick, starting at `T=0`.
///
/// Parameters: `period` (ticks, default 1, must be positive) and
/// `limit` (number of ticks, unbounded when absent).
#[derive(Debug, Clone)]
pub struct Clock {
    pub id: ComponentId,
    pub period: u64,
    pub limit: Option<u64>,
    pub ticks: u64,
}

impl Clock {
    pub fn new(id: ComponentId, period: u64, limit: Option<u64>) -> Self {
        Clock {
            id,
            period,
            limit,
            ticks: 0,
        }
    }

    pub fn from_desc(desc: &ComponentDesc) -> Result<Self, ConfigError> {
        let period: u64 = desc.params.get_or(desc.id, "period", 1)?;
        if period == 0 {
            return Err(ConfigError::InvalidParam {
                component: desc.id,
                key: "period".into(),
                value: "0".into(),
            });
        }
        let limit = desc.params.get(desc.id, "limit")?;
        Ok(Clock::new(desc.id, period, limit))
    }

    fn exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.ticks >= limit)
    }
}

impl Component for Clock {
    fn setup(&mut self, ctx: &mut HandlerContext) -> SimResult<()> {
        if !self.exhausted() {
            ctx.schedule_self("tick", 0, Payload::Empty)?;
        }
        Ok(())
    }

    fn handle(&mut self, ctx: &mut HandlerContext, port: &str, _event: Event) -> SimResult<()> {
        if port != "tick" {
            return Err(ctx.fault(format!("clock has no input port {:?}", port)));
        }
        self.ticks += 1;
        if ctx.is_connected("out") {
            let count = i64::try_from(self.ticks)
                .map_err(|_| ctx.fault(format!("tick count {} does not fit an Int payload", self.ticks)))?;
            ctx.send("out", Payload::Int(count))?;
        }
        if !self.exhausted() {
            ctx.schedule_self("tick", self.period, Payload::Empty)?;
        }
        Ok(())
    }

    fn save_state(&self) -> Vec<u8> {
        write_words(&[self.ticks])
    }

    fn load_state(&mut self, state: &[u8]) -> SimResult<()> {
        let [ticks] = read_words::<1>(state)?;
        self.ticks = ticks;
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
