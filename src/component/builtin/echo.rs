//! `Echo` — bounces integer payloads back down the port they came in on.

use crate::component::context::HandlerContext;
use crate::component::traits::{read_words, write_words, Component};
use crate::error::{ConfigError, SimResult};
use crate::event::{Event, Payload};
use crate::graph::ComponentDesc;
use crate::id::ComponentId;

/// Replies to `Int(n)` with `Int(n - 1)` on the same port while `n > 0`;
/// every other payload is only counted.
///
/// With the optional `fail_after` parameter the component raises a
/// handler fault on that many-th event, which is how tests provoke an
/// abort.
#[derive(Debug, Clone)]
pub struct Echo {
    pub id: ComponentId,
    pub handled: u64,
    pub echoed: u64,
    pub fail_after: Option<u64>,
}

impl Echo {
    pub fn new(id: ComponentId) -> Self {
        Echo {
            id,
            handled: 0,
            echoed: 0,
            fail_after: None,
        }
    }

    pub fn from_desc(desc: &ComponentDesc) -> Result<Self, ConfigError> {
        Ok(Echo {
            fail_after: desc.params.get(desc.id, "fail_after")?,
            ..Echo::new(desc.id)
        })
    }
}

impl Component for Echo {
    fn handle(&mut self, ctx: &mut HandlerContext, port: &str, event: Event) -> SimResult<()> {
        self.handled += 1;
        if self.fail_after.is_some_and(|n| self.handled >= n) {
            return Err(ctx.fault(format!("echo gave up after {} events", self.handled)));
        }
        if let Payload::Int(n) = event.payload {
            if n > 0 {
                self.echoed += 1;
                ctx.send(port, Payload::Int(n - 1))?;
            }
        }
        Ok(())
    }

    fn save_state(&self) -> Vec<u8> {
        write_words(&[self.handled, self.echoed])
    }

    fn load_state(&mut self, state: &[u8]) -> SimResult<()> {
        let [handled, echoed] = read_words::<2>(state)?;
        self.handled = handled;
        self.echoed = echoed;
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
