use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Hours after the booked instant at which a pending appointment counts as done.
pub const COMPLETION_GRACE_HOURS: i64 = 1;

/// Source of "now", swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotParseError {
    #[error("invalid appointment date/time '{0}'")]
    Malformed(String),
    #[error("appointment time '{0}' does not exist in the business timezone")]
    NonExistent(String),
}

/// Clock bound to the business timezone. Appointment dates and times are
/// naive strings interpreted in `tz`.
#[derive(Clone)]
pub struct BusinessTime {
    tz: Tz,
    clock: Arc<dyn Clock>,
}

impl BusinessTime {
    pub fn new(tz: Tz, clock: Arc<dyn Clock>) -> Self {
        Self { tz, clock }
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn now_local(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.tz)
    }

    pub fn today(&self) -> NaiveDate {
        self.now_local().date_naive()
    }

    /// Resolves `YYYY-MM-DD` + `HH:MM` to an instant in the business timezone.
    /// Ambiguous local times resolve to the earlier instant.
    pub fn slot_instant(&self, date: &str, time: &str) -> Result<DateTime<Tz>, SlotParseError> {
        let raw = format!("{} {}", date.trim(), time.trim());
        let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M")
            .map_err(|_| SlotParseError::Malformed(raw.clone()))?;
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .ok_or(SlotParseError::NonExistent(raw))
    }

    /// Whether the slot's completion threshold (instant + grace) has passed.
    pub fn is_past_completion(&self, date: &str, time: &str) -> Result<bool, SlotParseError> {
        let threshold = self.slot_instant(date, time)? + Duration::hours(COMPLETION_GRACE_HOURS);
        Ok(self.now_local() >= threshold)
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Manually driven clock.
    #[derive(Debug)]
    pub struct FixedClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        pub fn new(now: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(now),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }
}
