//! Wall-clock access for relative dates and presence computations.

use chrono::Utc;

/// Source of the current time, in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// System time shifted by a fixed offset (the offset comes from the
/// time synchronization layer, which lives outside this workspace).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    offset_ms: i64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset(offset_ms: i64) -> Self {
        Self { offset_ms }
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis().saturating_add(self.offset_ms)
    }
}

/// A clock frozen at a given instant. Used for reproducible evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        assert_eq!(FixedClock(42).now_millis(), 42);
    }

    #[test]
    fn test_system_clock_offset() {
        let base = SystemClock::new().now_millis();
        let shifted = SystemClock::with_offset(3_600_000).now_millis();
        assert!(shifted - base >= 3_600_000);
        assert!(shifted - base < 3_700_000);
    }
}
