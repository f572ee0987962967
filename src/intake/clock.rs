use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Millisecond clock that never repeats or goes backwards.
///
/// Each tick is `max(wall clock, previous tick + 1)`, so two submissions
/// stamped by the same clock always get distinct, ordered timestamps. The
/// clock saturates at `i64::MAX` instead of overflowing.
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: AtomicI64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wall.max(last.saturating_add(1)))
            })
            .unwrap_or(wall);
        wall.max(previous.saturating_add(1))
    }

    /// Advance past an externally supplied timestamp.
    pub fn observe(&self, time_stamp: i64) {
        self.last.fetch_max(time_stamp, Ordering::SeqCst);
    }

    pub fn last(&self) -> i64 {
        self.last.load(Ordering::SeqCst)
    }
}
