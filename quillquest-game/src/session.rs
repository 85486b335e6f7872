use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::KeyValueStore;
use crate::constants::{KEY_SESSION_INDEX, RESERVED_KEYS};
use crate::error::EngineResult;
use crate::sequencer::{Phase, StageSequencer};
use crate::stage::{StageDefinition, check_stored_stages};
use crate::storage::{read_json, remove_key, write_json};

/// Everything needed to bring a named session back exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeState {
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_key: Option<String>,
    pub stages: Vec<StageDefinition>,
    pub current_stage_index: usize,
    pub time_left_in_stage: i64,
    #[serde(default)]
    pub extra_time: u64,
    pub is_running: bool,
    pub is_paused: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notes: String,
    #[serde(default)]
    pub pomodoros_completed: u32,
    #[serde(default)]
    pub awaiting_cycle_decision: bool,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl RuntimeState {
    #[must_use]
    pub fn capture(
        sequencer: &StageSequencer,
        template_key: Option<&str>,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let (is_running, is_paused) = match sequencer.phase {
            Phase::Idle => (false, true),
            Phase::Running | Phase::AwaitingCycleDecision => (true, false),
            Phase::Paused => (true, true),
        };
        Self {
            last_modified: now,
            template_key: template_key.map(str::to_string),
            stages: sequencer.stages.clone(),
            current_stage_index: sequencer.index,
            time_left_in_stage: sequencer.time_left,
            extra_time: sequencer.extra_time,
            is_running,
            is_paused,
            notes: notes.to_string(),
            pomodoros_completed: sequencer.pomodoros,
            awaiting_cycle_decision: sequencer.phase == Phase::AwaitingCycleDecision,
        }
    }

    /// Rebuild the sequencer verbatim. A running record comes back running;
    /// the caller is responsible for re-arming its tick.
    #[must_use]
    pub fn restore(&self) -> StageSequencer {
        let phase = if self.stages.is_empty() {
            Phase::Idle
        } else if self.awaiting_cycle_decision {
            Phase::AwaitingCycleDecision
        } else {
            match (self.is_running, self.is_paused) {
                (true, false) => Phase::Running,
                (true, true) => Phase::Paused,
                (false, _) => Phase::Idle,
            }
        };
        let index = if phase == Phase::AwaitingCycleDecision {
            self.current_stage_index.min(self.stages.len())
        } else {
            self.current_stage_index
                .min(self.stages.len().saturating_sub(1))
        };
        StageSequencer {
            stages: self.stages.clone(),
            index,
            time_left: self.time_left_in_stage,
            extra_time: self.extra_time,
            pomodoros: self.pomodoros_completed,
            phase,
        }
    }
}

/// Named session records plus the index of known names.
#[derive(Debug, Clone, Copy)]
pub struct SessionStore<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> SessionStore<'a, S> {
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Names that would collide with engine-owned keys.
    #[must_use]
    pub fn is_reserved(name: &str) -> bool {
        RESERVED_KEYS.contains(&name)
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn names(&self) -> EngineResult<Vec<String>> {
        Ok(read_json(self.store, KEY_SESSION_INDEX)?.unwrap_or_default())
    }

    /// Add a name to the index unless it is already there.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn register(&self, name: &str) -> EngineResult<()> {
        let mut names = self.names()?;
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
            write_json(self.store, KEY_SESSION_INDEX, &names)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or the store fails.
    pub fn save(&self, name: &str, state: &RuntimeState) -> EngineResult<()> {
        write_json(self.store, name, state)
    }

    /// A record whose stage list is malformed is treated as missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn load(&self, name: &str) -> EngineResult<Option<RuntimeState>> {
        let Some(state) = read_json::<RuntimeState, S>(self.store, name)? else {
            return Ok(None);
        };
        if let Err(err) = check_stored_stages(&state.stages) {
            warn!("discarding session `{name}`: {err}");
            return Ok(None);
        }
        Ok(Some(state))
    }

    /// Remove the record and its index entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn delete(&self, name: &str) -> EngineResult<()> {
        remove_key(self.store, name)?;
        let names: Vec<String> = self
            .names()?
            .into_iter()
            .filter(|n| n != name)
            .collect();
        write_json(self.store, KEY_SESSION_INDEX, &names)?;
        info!("deleted session `{name}`");
        Ok(())
    }

    /// Index entries with the time each was last saved, if readable.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn listing(&self) -> EngineResult<Vec<(String, Option<DateTime<Utc>>)>> {
        self.names()?
            .into_iter()
            .map(|name| {
                let saved = self.load(&name)?.map(|state| state.last_modified);
                Ok((name, saved))
            })
            .collect()
    }
}
