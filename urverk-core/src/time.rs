//! ## urverk-core::time
//! **Simulation time with `+∞`**
//!
//! Ordinary values are finite non-negative reals; `Time::INFINITY` retires a
//! simulator. Equality is exact representation, never tolerance-based:
//! tolerance belongs to the model, not the scheduler.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// A point (or duration) on the simulation clock.
///
/// Arithmetic contracts: `t + ∞ = ∞`, `∞ − t = ∞`. `∞ − ∞` is undefined and
/// must not occur; debug builds assert against it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(f64);

impl Time {
    pub const ZERO: Time = Time(0.0);
    pub const INFINITY: Time = Time(f64::INFINITY);

    /// Wraps a raw clock value. NaN and negative values are outside the
    /// domain; debug builds assert.
    pub fn new(t: f64) -> Self {
        debug_assert!(!t.is_nan(), "simulation time cannot be NaN");
        debug_assert!(t >= 0.0, "simulation time cannot be negative");
        // normalise -0.0 so exact equality and total ordering agree
        Time(if t == 0.0 { 0.0 } else { t })
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn is_infinite(self) -> bool {
        self.0.is_infinite()
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    #[inline]
    pub fn min(self, other: Time) -> Time {
        if self <= other {
            self
        } else {
            other
        }
    }
}

impl From<f64> for Time {
    fn from(t: f64) -> Self {
        Time::new(t)
    }
}

impl Add for Time {
    type Output = Time;

    #[inline]
    fn add(self, rhs: Time) -> Time {
        // f64 addition saturates at +inf, no explicit clamp needed
        Time(self.0 + rhs.0)
    }
}

impl AddAssign for Time {
    #[inline]
    fn add_assign(&mut self, rhs: Time) {
        self.0 += rhs.0;
    }
}

impl Sub for Time {
    type Output = Time;

    #[inline]
    fn sub(self, rhs: Time) -> Time {
        debug_assert!(
            !(self.0.is_infinite() && rhs.0.is_infinite()),
            "∞ − ∞ is undefined"
        );
        if self.0.is_infinite() {
            return Time::INFINITY;
        }
        Time::new(self.0 - rhs.0)
    }
}

impl PartialEq for Time {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        // NaN is excluded by construction, so total_cmp is a plain numeric order
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_infinite() {
            write!(f, "+inf")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn infinity_absorbs_addition() {
        assert_eq!(Time::new(3.0) + Time::INFINITY, Time::INFINITY);
        assert_eq!(Time::INFINITY + Time::ZERO, Time::INFINITY);
    }

    #[test]
    fn infinity_minus_finite_is_infinity() {
        assert_eq!(Time::INFINITY - Time::new(10.0), Time::INFINITY);
    }

    #[test]
    fn zero_means_immediate() {
        let t = Time::new(4.5);
        assert_eq!(t + Time::ZERO, t);
    }

    #[test]
    fn exact_equality() {
        assert_eq!(Time::new(0.1) + Time::new(0.2), Time::new(0.1 + 0.2));
        assert_ne!(Time::new(0.30000000000000004), Time::new(0.3));
    }

    #[test]
    fn negative_zero_normalised() {
        assert_eq!(Time::new(-0.0).cmp(&Time::ZERO), Ordering::Equal);
    }

    #[test]
    #[should_panic(expected = "simulation time cannot be negative")]
    fn rejects_negative() {
        Time::new(-1.0);
    }

    proptest! {
        #[test]
        fn ordering_is_total(a in 0.0..1e12f64, b in 0.0..1e12f64) {
            let (ta, tb) = (Time::new(a), Time::new(b));
            prop_assert_eq!(ta < tb, a < b);
            prop_assert!(ta < Time::INFINITY);
        }

        #[test]
        fn addition_is_monotonic(t in 0.0..1e9f64, tau in 0.0..1e9f64) {
            let next = Time::new(t) + Time::new(tau);
            prop_assert!(next >= Time::new(t));
        }
    }
}
