//! Rational media timestamps.
//!
//! Sample times are carried as `(ticks, timescale)` pairs and advanced
//! with exact integer arithmetic. Converting to floating seconds inside
//! the assembly loop would accumulate drift over thousands of samples,
//! so seconds are only available as a terminal convenience accessor.

use std::cmp::Ordering;

/// A point in time or a duration, expressed in timescale ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct MediaTime {
    /// Tick count.
    pub ticks: u64,
    /// Ticks per second.
    pub timescale: u32,
}

impl MediaTime {
    /// Create a media time from ticks in the given timescale.
    pub fn new(ticks: u64, timescale: u32) -> Self {
        Self { ticks, timescale }
    }

    /// Zero in the given timescale.
    pub fn zero(timescale: u32) -> Self {
        Self { ticks: 0, timescale }
    }

    /// Add a tick count in the same timescale.
    pub fn add_ticks(self, ticks: u64) -> Self {
        Self {
            ticks: self.ticks.saturating_add(ticks),
            timescale: self.timescale,
        }
    }

    /// Offset by a signed tick count, saturating at both ends of the
    /// tick range. The widening keeps bases above `i64::MAX` exact.
    pub fn offset_ticks(self, ticks: i64) -> Self {
        let shifted = i128::from(self.ticks) + i128::from(ticks);
        Self {
            ticks: shifted.clamp(0, i128::from(u64::MAX)) as u64,
            timescale: self.timescale,
        }
    }

    /// Value in seconds. For display only, never fed back into timing.
    pub fn as_secs_f64(self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.ticks as f64 / self.timescale as f64
        }
    }
}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        // Cross-multiply in u128 so mixed timescales compare exactly.
        let lhs = self.ticks as u128 * other.timescale.max(1) as u128;
        let rhs = other.ticks as u128 * self.timescale.max(1) as u128;
        lhs.cmp(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_ticks_is_exact() {
        let mut t = MediaTime::zero(90000);
        for _ in 0..10_000 {
            t = t.add_ticks(3003);
        }
        assert_eq!(t.ticks, 30_030_000);
    }

    #[test]
    fn test_cross_timescale_ordering() {
        let half_sec_a = MediaTime::new(500, 1000);
        let half_sec_b = MediaTime::new(45000, 90000);
        assert_eq!(half_sec_a.cmp(&half_sec_b), std::cmp::Ordering::Equal);
        assert!(MediaTime::new(501, 1000) > half_sec_b);
    }

    #[test]
    fn test_offset_clamps_at_zero() {
        let t = MediaTime::new(100, 1000);
        assert_eq!(t.offset_ticks(-200).ticks, 0);
        assert_eq!(t.offset_ticks(50).ticks, 150);
    }

    #[test]
    fn test_offset_exact_beyond_i64_range() {
        // bases above i64::MAX stay exact, no wrap, no panic
        let t = MediaTime::new(1 << 63, 90_000);
        assert_eq!(t.offset_ticks(-1).ticks, (1 << 63) - 1);

        let t = MediaTime::new(u64::MAX - 10, 90_000);
        assert_eq!(t.offset_ticks(5).ticks, u64::MAX - 5);
        assert_eq!(t.offset_ticks(i64::MAX).ticks, u64::MAX);
    }
}
