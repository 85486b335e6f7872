use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

use crate::constants::SECONDS_PER_MINUTE;

/// What a stage does when it is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Plain countdown.
    Timed { minutes: u32 },
    /// Countdown that bumps the pomodoro counter on completion.
    Pomodoro { minutes: u32 },
    /// Unbounded terminal phase that counts up.
    Extra,
}

/// One named, timed phase of a work session.
///
/// Persisted in the flat `{id, label, duration, isExtra, isPomodoro}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawStage", into = "RawStage")]
pub struct StageDefinition {
    pub id: String,
    pub label: String,
    pub kind: StageKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStage {
    id: String,
    label: String,
    #[serde(default)]
    duration: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    is_extra: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    is_pomodoro: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl From<RawStage> for StageDefinition {
    fn from(raw: RawStage) -> Self {
        let kind = if raw.is_extra {
            StageKind::Extra
        } else if raw.is_pomodoro {
            StageKind::Pomodoro {
                minutes: raw.duration,
            }
        } else {
            StageKind::Timed {
                minutes: raw.duration,
            }
        };
        Self {
            id: raw.id,
            label: raw.label,
            kind,
        }
    }
}

impl From<StageDefinition> for RawStage {
    fn from(stage: StageDefinition) -> Self {
        let (duration, is_extra, is_pomodoro) = match stage.kind {
            StageKind::Timed { minutes } => (minutes, false, false),
            StageKind::Pomodoro { minutes } => (minutes, false, true),
            StageKind::Extra => (0, true, false),
        };
        Self {
            id: stage.id,
            label: stage.label,
            duration,
            is_extra,
            is_pomodoro,
        }
    }
}

impl StageDefinition {
    pub fn timed(id: impl Into<String>, label: impl Into<String>, minutes: u32) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: StageKind::Timed { minutes },
        }
    }

    pub fn pomodoro(id: impl Into<String>, label: impl Into<String>, minutes: u32) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: StageKind::Pomodoro { minutes },
        }
    }

    pub fn extra(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: StageKind::Extra,
        }
    }

    #[must_use]
    pub const fn is_extra(&self) -> bool {
        matches!(self.kind, StageKind::Extra)
    }

    #[must_use]
    pub const fn is_pomodoro(&self) -> bool {
        matches!(self.kind, StageKind::Pomodoro { .. })
    }

    /// Planned length in minutes; zero for the extra stage.
    #[must_use]
    pub const fn minutes(&self) -> u32 {
        match self.kind {
            StageKind::Timed { minutes } | StageKind::Pomodoro { minutes } => minutes,
            StageKind::Extra => 0,
        }
    }

    #[must_use]
    pub const fn duration_secs(&self) -> i64 {
        self.minutes() as i64 * SECONDS_PER_MINUTE
    }

    /// Change the planned length, returning the previous one.
    /// The extra stage has no length and is left untouched.
    pub fn set_minutes(&mut self, new_minutes: u32) -> Option<u32> {
        match &mut self.kind {
            StageKind::Timed { minutes } | StageKind::Pomodoro { minutes } => {
                let old = *minutes;
                *minutes = new_minutes;
                Some(old)
            }
            StageKind::Extra => None,
        }
    }
}

/// Violations of the stage-list shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageListError {
    #[error("stage list is empty")]
    Empty,
    #[error("stage id `{0}` appears more than once")]
    DuplicateId(String),
    #[error("more than one extra stage")]
    MultipleExtra,
    #[error("extra stage must be the last stage (found at {index} of {len})")]
    ExtraNotTerminal { index: usize, len: usize },
}

/// Position of the extra stage, if the list has one.
#[must_use]
pub fn extra_index(stages: &[StageDefinition]) -> Option<usize> {
    stages.iter().position(StageDefinition::is_extra)
}

/// Sum of the planned seconds of all countdown stages.
#[must_use]
pub fn total_planned_secs(stages: &[StageDefinition]) -> i64 {
    stages
        .iter()
        .filter(|stage| !stage.is_extra())
        .map(StageDefinition::duration_secs)
        .sum()
}

/// Check that ids are unique and the extra stage, if any, is single and last.
///
/// # Errors
///
/// Returns the first violation found.
pub fn check_stage_list(stages: &[StageDefinition]) -> Result<(), StageListError> {
    if stages.is_empty() {
        return Err(StageListError::Empty);
    }
    let mut seen = HashSet::new();
    for stage in stages {
        if !seen.insert(stage.id.as_str()) {
            return Err(StageListError::DuplicateId(stage.id.clone()));
        }
    }
    let extras: Vec<usize> = stages
        .iter()
        .enumerate()
        .filter(|(_, stage)| stage.is_extra())
        .map(|(index, _)| index)
        .collect();
    match extras.as_slice() {
        [] => Ok(()),
        [index] if *index + 1 == stages.len() => Ok(()),
        [index] => Err(StageListError::ExtraNotTerminal {
            index: *index,
            len: stages.len(),
        }),
        _ => Err(StageListError::MultipleExtra),
    }
}

/// Like [`check_stage_list`], but an empty list is acceptable. Stored
/// sessions and templates may legitimately have had every stage deleted.
///
/// # Errors
///
/// Returns the first shape violation found.
pub fn check_stored_stages(stages: &[StageDefinition]) -> Result<(), StageListError> {
    match check_stage_list(stages) {
        Err(StageListError::Empty) => Ok(()),
        other => other,
    }
}

fn whitespace_run() -> Option<&'static Regex> {
    static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").ok()).as_ref()
}

/// Lowercase a display name and collapse whitespace runs into `-`.
#[must_use]
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    match whitespace_run() {
        Some(re) => re.replace_all(&lowered, "-").into_owned(),
        None => lowered.split_whitespace().collect::<Vec<_>>().join("-"),
    }
}

/// Fresh stage id combining the label slug and a millisecond timestamp.
#[must_use]
pub fn mint_stage_id(label: &str, millis: i64, taken: &[StageDefinition]) -> String {
    let base = format!("{}-{millis}", slugify(label));
    if !taken.iter().any(|stage| stage.id == base) {
        return base;
    }
    let free = (2_u32..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.iter().any(|stage| &stage.id == candidate));
    free.unwrap_or(base)
}
