use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use std::cell::Cell;
use std::rc::Rc;

/// Wall-clock source injected into the engine.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds since the Unix epoch, used for debounce deadlines and ids.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Calendar day used by the daily session counter.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and scripted runs. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance_millis(&self, millis: i64) {
        self.now.set(self.now.get() + TimeDelta::milliseconds(millis));
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_millis(secs * 1_000);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.now.set(at);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}
