//! `Component` trait: the capability every simulated model implements.

use crate::error::{SimError, SimResult, SnapshotError};
use crate::event::Event;
use crate::time::SimTime;

use super::context::HandlerContext;

/// Trait implemented by every simulated component.
///
/// Components react to events arriving on their ports and interact with
/// the rest of the model only through the [`HandlerContext`]: sends go
/// over links, timers are self events.
///
/// # Contract
///
/// Implementations **must**:
/// - Not share mutable state with other components.
/// - Route all side effects through `ctx`.
/// - Be deterministic for equal inputs.
///
/// # Example
///
/// ```rust
/// use parsim::component::{Component, HandlerContext};
/// use parsim::error::SimResult;
/// use parsim::event::Event;
///
/// struct Counter { seen: u32 }
///
/// impl Component for Counter {
///     fn handle(&mut self, _ctx: &mut HandlerContext, _port: &str, _event: Event) -> SimResult<()> {
///         self.seen += 1;
///         Ok(())
///     }
///     fn as_any(&self) -> &dyn std::any::Any { self }
///     fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
/// }
/// ```
pub trait Component: Send {
    /// React to an event delivered on `port`.
    ///
    /// An `Err` aborts the whole run. Use [`HandlerContext::fault`] to
    /// report a model-level failure.
    fn handle(&mut self, ctx: &mut HandlerContext, port: &str, event: Event) -> SimResult<()>;

    /// Called once after the partition is built, before the first
    /// epoch. Not called when the partition is restored from a snapshot.
    fn setup(&mut self, _ctx: &mut HandlerContext) -> SimResult<()> {
        Ok(())
    }

    /// Called once when the run completes.
    fn finish(&mut self, _now: SimTime) {}

    /// Opaque state for snapshots. The default saves nothing.
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Inverse of [`save_state`](Self::save_state).
    fn load_state(&mut self, _state: &[u8]) -> SimResult<()> {
        Ok(())
    }

    /// Downcast support — required for `Simulation::component::<T>()`.
    fn as_any(&self) -> &dyn std::any::Any;
    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Decode helper for `load_state` implementations that store a fixed
/// number of little-endian `u64` words.
pub fn read_words<const N: usize>(state: &[u8]) -> SimResult<[u64; N]> {
    if state.len() != N * 8 {
        return Err(SimError::Snapshot(SnapshotError::Mismatch(format!(
            "expected {} bytes of component state, found {}",
            N * 8,
            state.len()
        ))));
    }
    let mut words = [0u64; N];
    for (word, chunk) in words.iter_mut().zip(state.chunks_exact(8)) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        *word = u64::from_le_bytes(buf);
    }
    Ok(words)
}

/// Encode helper matching [`read_words`].
pub fn write_words(words: &[u64]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
