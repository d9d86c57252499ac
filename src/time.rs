/// Virtual simulation time.
///
/// A `SimTime` is a logical tick with no dependency on `std::time`.
/// A partition's clock moves only when its driver dispatches an event.

/// A tick of simulation time.
///
/// `SimTime::MAX` doubles as "unbounded": it is the lookahead of a
/// simulation that has no cross-partition link, and the horizon of an
/// epoch that never needs to synchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(u64);

impl SimTime {
    /// The zero-point of simulation time.
    pub const ZERO: SimTime = SimTime(0);

    /// The largest representable time.
    pub const MAX: SimTime = SimTime(u64::MAX);

    #[inline]
    pub const fn new(ticks: u64) -> Self {
        SimTime(ticks)
    }

    #[inline]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// `self + delta`, or `None` on overflow.
    #[inline]
    pub fn checked_add(self, delta: SimTime) -> Option<SimTime> {
        self.0.checked_add(delta.0).map(SimTime)
    }

    /// `self + delta`, clamped at [`SimTime::MAX`].
    ///
    /// Epoch horizons use this so an unbounded lookahead stays unbounded.
    #[inline]
    pub fn saturating_add(self, delta: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(delta.0))
    }

    /// Ticks elapsed since `earlier`, or `None` if `earlier` is later.
    #[inline]
    pub fn duration_since(self, earlier: SimTime) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }

    #[inline]
    pub fn is_unbounded(self) -> bool {
        self == SimTime::MAX
    }
}

impl From<u64> for SimTime {
    fn from(ticks: u64) -> Self {
        SimTime(ticks)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unbounded() {
            write!(f, "T=∞")
        } else {
            write!(f, "T={}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(SimTime::new(10) < SimTime::new(20));
        assert!(SimTime::ZERO < SimTime::MAX);
    }

    #[test]
    fn test_checked_add_overflow() {
        assert_eq!(
            SimTime::new(5).checked_add(SimTime::new(7)),
            Some(SimTime::new(12))
        );
        assert!(SimTime::MAX.checked_add(SimTime::new(1)).is_none());
    }

    #[test]
    fn test_saturating_add_keeps_unbounded() {
        let bound = SimTime::new(100).saturating_add(SimTime::MAX);
        assert!(bound.is_unbounded());
    }

    #[test]
    fn test_duration_since() {
        let t1 = SimTime::new(10);
        let t2 = SimTime::new(30);
        assert_eq!(t2.duration_since(t1), Some(20));
        assert_eq!(t1.duration_since(t2), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(SimTime::new(42).to_string(), "T=42");
        assert_eq!(SimTime::MAX.to_string(), "T=∞");
    }
}
