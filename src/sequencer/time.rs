// src/sequencer/time.rs

use std::cmp::Ordering;
use std::ops::{Add, Sub};

/// A position in musical time: whole ticks plus a fraction of a tick.
///
/// `fraction` is kept in `[0, 1)`. Arithmetic carries into and borrows
/// from `ticks` to maintain that.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceTime {
    pub ticks: i64,
    pub fraction: f64,
}

impl SequenceTime {
    pub const ZERO: SequenceTime = SequenceTime {
        ticks: 0,
        fraction: 0.0,
    };

    pub const fn new(ticks: i64, fraction: f64) -> Self {
        Self { ticks, fraction }
    }

    #[inline]
    pub const fn from_ticks(ticks: i64) -> Self {
        Self {
            ticks,
            fraction: 0.0,
        }
    }

    /// Split a fractional tick count into ticks and fraction.
    pub fn from_ticks_f64(ticks: f64) -> Self {
        let whole = ticks.floor();
        Self {
            ticks: whole as i64,
            fraction: ticks - whole,
        }
    }

    #[inline]
    pub fn as_ticks_f64(&self) -> f64 {
        self.ticks as f64 + self.fraction
    }
}

impl PartialEq for SequenceTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SequenceTime {}

impl PartialOrd for SequenceTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SequenceTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ticks
            .cmp(&other.ticks)
            .then_with(|| self.fraction.total_cmp(&other.fraction))
    }
}

impl Add for SequenceTime {
    type Output = SequenceTime;

    fn add(self, rhs: SequenceTime) -> SequenceTime {
        let mut fraction = self.fraction + rhs.fraction;
        let carry = if fraction >= 1.0 { 1 } else { 0 };
        fraction -= carry as f64;

        SequenceTime {
            ticks: self.ticks + rhs.ticks + carry,
            fraction,
        }
    }
}

impl Sub for SequenceTime {
    type Output = SequenceTime;

    fn sub(self, rhs: SequenceTime) -> SequenceTime {
        let mut fraction = self.fraction - rhs.fraction;
        let borrow = if fraction < 0.0 { 1 } else { 0 };
        fraction += borrow as f64;

        SequenceTime {
            ticks: self.ticks - rhs.ticks - borrow,
            fraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_add_carries() {
        let sum = SequenceTime::new(1, 0.75) + SequenceTime::new(2, 0.5);
        assert_eq!(sum, SequenceTime::new(4, 0.25));
    }

    #[test]
    fn test_sub_borrows() {
        let diff = SequenceTime::new(10, 0.0) - SequenceTime::new(5, 0.5);
        assert_eq!(diff, SequenceTime::new(4, 0.5));
    }

    #[test]
    fn test_ordering() {
        assert!(SequenceTime::new(1, 0.9) < SequenceTime::new(2, 0.0));
        assert!(SequenceTime::new(2, 0.1) < SequenceTime::new(2, 0.2));
        assert_eq!(SequenceTime::from_ticks(3), SequenceTime::new(3, 0.0));
    }

    #[test]
    fn test_f64_conversion() {
        let time = SequenceTime::from_ticks_f64(12.25);
        assert_eq!(time, SequenceTime::new(12, 0.25));
        assert_eq!(time.as_ticks_f64(), 12.25);

        let negative = SequenceTime::from_ticks_f64(-0.5);
        assert_eq!(negative, SequenceTime::new(-1, 0.5));
    }

    fn time_strategy() -> impl Strategy<Value = SequenceTime> {
        // Quarter-tick fractions stay exact in f64
        (-10_000i64..10_000, 0u8..4).prop_map(|(t, q)| SequenceTime::new(t, q as f64 * 0.25))
    }

    proptest! {
        #[test]
        fn prop_fraction_stays_normalized(a in time_strategy(), b in time_strategy()) {
            for t in [a + b, a - b] {
                prop_assert!(t.fraction >= 0.0 && t.fraction < 1.0);
            }
        }

        #[test]
        fn prop_add_then_sub_is_identity(a in time_strategy(), b in time_strategy()) {
            prop_assert_eq!((a + b) - b, a);
        }

        #[test]
        fn prop_order_matches_f64(a in time_strategy(), b in time_strategy()) {
            prop_assert_eq!(a.cmp(&b), a.as_ticks_f64().total_cmp(&b.as_ticks_f64()));
        }
    }
}
