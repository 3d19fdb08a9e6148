use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{Duration, TimeZone as _, Utc};

pub type Timestamp = chrono::DateTime<Utc>;

/// Source of "now" for cooldown checks.
pub trait Clock: std::fmt::Debug + Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used to simulate the passage of time in tests.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn at_millis(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.millis
            .fetch_add(duration.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Convert epoch milliseconds, as kept in the store, into a [Timestamp].
///
/// Values outside of chrono's representable range saturate to the unix epoch.
pub fn from_millis(millis: i64) -> Timestamp {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

/// Format a remaining cooldown as `minutes:seconds`, rounding up to the next whole second.
pub fn countdown(remaining: Duration) -> String {
    let millis = remaining.num_milliseconds().max(0);
    let seconds = (millis + 999) / 1000;

    format!("{}:{:02}", seconds / 60, seconds % 60)
}
