//! `HandlerContext` — what a handler can see and do.

use crate::error::{HandlerFault, SimError, SimResult};
use crate::event::{Destination, Event, Payload, DEFAULT_PRIORITY};
use crate::id::{ComponentId, PartitionId};
use crate::partition::PartitionCore;
use crate::time::SimTime;

/// Per-send overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Lower dispatches first among events with equal delivery time.
    pub priority: i32,
    /// Ticks added on top of the link latency.
    pub extra_delay: u64,
}

impl Default for SendOptions {
    fn default() -> Self {
        SendOptions {
            priority: DEFAULT_PRIORITY,
            extra_delay: 0,
        }
    }
}

impl SendOptions {
    pub fn priority(priority: i32) -> Self {
        SendOptions {
            priority,
            ..Self::default()
        }
    }

    pub fn delayed(extra_delay: u64) -> Self {
        SendOptions {
            extra_delay,
            ..Self::default()
        }
    }
}

/// Borrowed view of the partition handed to a component for the
/// duration of one handler call.
pub struct HandlerContext<'a> {
    core: &'a mut PartitionCore,
    component: ComponentId,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(core: &'a mut PartitionCore, component: ComponentId) -> Self {
        HandlerContext { core, component }
    }

    /// Current virtual time of the partition.
    pub fn now(&self) -> SimTime {
        self.core.clock()
    }

    /// The component being called.
    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn partition(&self) -> PartitionId {
        self.core.id()
    }

    /// `true` if `port` of this component has a link attached.
    pub fn is_connected(&self, port: &str) -> bool {
        self.core.links().route(self.component, port).is_some()
    }

    /// Send `payload` over the link attached at `port`.
    ///
    /// Delivered at `now + latency` with the default priority.
    pub fn send(&mut self, port: &str, payload: Payload) -> SimResult<()> {
        self.send_with(port, payload, SendOptions::default())
    }

    /// Send with an explicit priority and/or extra delay.
    pub fn send_with(&mut self, port: &str, payload: Payload, options: SendOptions) -> SimResult<()> {
        let route = *self
            .core
            .links()
            .route(self.component, port)
            .ok_or_else(|| SimError::UnknownPort {
                component: self.component,
                port: port.to_string(),
            })?;
        let delivery_time = route.delivery_time(self.now(), options.extra_delay)?;
        let event = Event {
            payload,
            delivery_time,
            priority: options.priority,
            sequence: self.core.next_sequence(),
            origin: self.core.id(),
            destination: Destination::Link(route.to),
        };
        self.core.route(event, route.to_partition)
    }

    /// Deliver `payload` to this component's own `port` after `delay`
    /// ticks. The port need not be connected.
    pub fn schedule_self(&mut self, port: &str, delay: u64, payload: Payload) -> SimResult<()> {
        let now = self.now();
        let delivery_time = now
            .checked_add(SimTime::new(delay))
            .ok_or(SimError::TimeOverflow { now, delay })?;
        let event = Event {
            payload,
            delivery_time,
            priority: DEFAULT_PRIORITY,
            sequence: self.core.next_sequence(),
            origin: self.core.id(),
            destination: Destination::Port {
                component: self.component,
                port: port.to_string(),
            },
        };
        self.core.schedule(event)
    }

    /// Build the error a handler returns to abort the run.
    pub fn fault(&self, message: impl Into<String>) -> SimError {
        SimError::Handler {
            component: self.component,
            time: self.now(),
            fault: HandlerFault::new(message),
        }
    }
}
