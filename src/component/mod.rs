//! Components: the models that exchange events.
//!
//! Components never share memory with each other. All interaction is
//! mediated by links and the partition's vortex, reached through the
//! [`HandlerContext`] passed to every handler.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`traits`] | [`Component`] trait, state encoding helpers |
//! | [`context`] | [`HandlerContext`], [`SendOptions`] |
//! | [`builtin`] | [`Clock`], [`Echo`], [`Sink`] |

pub mod builtin;
pub mod context;
pub mod traits;

pub use builtin::{Clock, Echo, Sink};
pub use context::{HandlerContext, SendOptions};
pub use traits::{read_words, write_words, Component};

#[cfg(test)]
mod tests;
