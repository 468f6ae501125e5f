//! Time source for everything that depends on "now" or "today".
//!
//! Day boundaries are computed in an explicit fixed offset rather than the
//! host's default timezone.

#[cfg(test)]
use std::sync::RwLock;

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};

use crate::model::attendance::DayKey;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Offset of the deployment's local calendar.
    fn offset(&self) -> FixedOffset;

    /// Start of the current local day, as epoch seconds.
    fn today(&self) -> DayKey {
        day_key_of(self.now(), self.offset())
    }

    /// Current local wall-clock time as `HH:MM:SS`.
    fn time_of_day(&self) -> String {
        self.now()
            .with_timezone(&self.offset())
            .format("%H:%M:%S")
            .to_string()
    }
}

/// Normalizes an instant to the start of its local calendar day.
pub fn day_key_of(instant: DateTime<Utc>, offset: FixedOffset) -> DayKey {
    let local_midnight = instant
        .with_timezone(&offset)
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp();
    DayKey(local_midnight - i64::from(offset.local_minus_utc()))
}

/// Normalizes raw epoch seconds to a day key; `None` when out of range.
pub fn normalize_epoch(epoch_secs: i64, offset: FixedOffset) -> Option<DayKey> {
    DateTime::from_timestamp(epoch_secs, 0).map(|instant| day_key_of(instant, offset))
}

pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Manually driven clock.
#[cfg(test)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
    offset: FixedOffset,
}

#[cfg(test)]
impl FixedClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: RwLock::new(now),
            offset,
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write().expect("clock poisoned");
        *now += by;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().expect("clock poisoned")
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}
