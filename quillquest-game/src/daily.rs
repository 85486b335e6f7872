use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::KeyValueStore;
use crate::constants::KEY_DAILY_SESSION;
use crate::error::EngineResult;
use crate::storage::{read_json, write_json};
use crate::timer::format_hms;

/// Seconds of running time accumulated today, across every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySessionCounter {
    pub date: NaiveDate,
    pub total_seconds: u64,
}

impl DailySessionCounter {
    #[must_use]
    pub const fn fresh(date: NaiveDate) -> Self {
        Self {
            date,
            total_seconds: 0,
        }
    }

    /// Read the stored counter, starting over if it belongs to another day.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn load<S: KeyValueStore + ?Sized>(store: &S, today: NaiveDate) -> EngineResult<Self> {
        let stored: Option<Self> = read_json(store, KEY_DAILY_SESSION)?;
        Ok(match stored {
            Some(counter) if counter.date == today => counter,
            _ => Self::fresh(today),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &S) -> EngineResult<()> {
        write_json(store, KEY_DAILY_SESSION, self)
    }

    /// Count one running second. Returns whether this tick is a flush point.
    pub fn tick(&mut self, today: NaiveDate, flush_every: u64) -> bool {
        if self.date != today {
            debug!("daily counter rolled over from {} to {today}", self.date);
            *self = Self::fresh(today);
        }
        self.total_seconds += 1;
        self.total_seconds % flush_every.max(1) == 0
    }

    #[must_use]
    pub fn formatted(&self) -> String {
        format_hms(self.total_seconds)
    }
}
