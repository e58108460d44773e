//! Per-partition timestamp watermark.
//!
//! # Invariants
//!
//! - **Non-decreasing**: an observation is accepted only if its `timestamp`
//!   is >= the last accepted timestamp for its partition. Equal timestamps
//!   are accepted (a producer may emit several entities in one poll).
//! - **No timestamp -> rejected**: `timestamp <= 0` can never be ordered.
//! - **Advances only on acceptance**: rejections do not move the watermark.

/// Result of checking a timestamp against the watermark.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimestampFreshness {
    Fresh,
    /// Strictly older than the last accepted timestamp.
    Stale { watermark: i64, got: i64 },
    NoTimestamp,
}

impl TimestampFreshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, TimestampFreshness::Fresh)
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_fresh()
    }
}

#[derive(Clone, Debug)]
pub struct TimestampWatermark {
    /// Starts at `i64::MIN` so any positive timestamp is fresh.
    last_accepted: i64,
}

impl Default for TimestampWatermark {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampWatermark {
    pub fn new() -> Self {
        Self {
            last_accepted: i64::MIN,
        }
    }

    /// Check freshness without advancing the watermark.
    pub fn check(&self, timestamp: i64) -> TimestampFreshness {
        if timestamp <= 0 {
            return TimestampFreshness::NoTimestamp;
        }
        if timestamp < self.last_accepted {
            return TimestampFreshness::Stale {
                watermark: self.last_accepted,
                got: timestamp,
            };
        }
        TimestampFreshness::Fresh
    }

    /// Check freshness and advance the watermark if fresh.
    pub fn accept(&mut self, timestamp: i64) -> TimestampFreshness {
        let result = self.check(timestamp);
        if result.is_fresh() {
            self.last_accepted = timestamp;
        }
        result
    }

    pub fn last_accepted(&self) -> Option<i64> {
        (self.last_accepted > i64::MIN).then_some(self.last_accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_then_equal_then_stale() {
        let mut wm = TimestampWatermark::new();
        assert_eq!(wm.last_accepted(), None);
        assert!(wm.accept(100).is_fresh());
        assert!(wm.accept(100).is_fresh(), "equal timestamps are accepted");
        assert_eq!(
            wm.accept(99),
            TimestampFreshness::Stale {
                watermark: 100,
                got: 99
            }
        );
        assert_eq!(wm.last_accepted(), Some(100), "rejection does not move the watermark");
    }

    #[test]
    fn zero_timestamp_is_rejected() {
        let mut wm = TimestampWatermark::new();
        assert_eq!(wm.accept(0), TimestampFreshness::NoTimestamp);
        assert!(!wm.check(-5).is_fresh());
    }
}
