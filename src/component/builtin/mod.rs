//! Built-in components — Clock, Echo and Sink.
//!
//! Small reference models used by the tests and the demo binary. They
//! are registered under the type tags `clock`, `echo` and `sink` by
//! [`ComponentRegistry::with_builtins`](crate::registry::ComponentRegistry::with_builtins).

pub mod clock;
pub mod echo;
pub mod sink;

pub use clock::Clock;
pub use echo::Echo;
pub use sink::{Received, Sink};
