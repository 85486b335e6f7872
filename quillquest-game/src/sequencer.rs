//! Stage sequencing state machine.
//!
//! The sequencer is pure: it never touches storage, timers or dialogs. Each
//! operation returns what happened and the [`crate::engine::EssayTimer`]
//! turns that into side effects. The cycle-complete decision is modelled as
//! the [`Phase::AwaitingCycleDecision`] phase; the caller answers it later
//! through [`StageSequencer::resolve_cycle`].

use log::debug;

use crate::stage::{StageDefinition, extra_index};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing started yet, reset, or the cycle was finished.
    #[default]
    Idle,
    Running,
    Paused,
    /// A cycle ended and the user has not said whether to go again.
    AwaitingCycleDecision,
}

/// Answer to the cycle-complete question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleChoice {
    /// Start over from the first stage.
    Restart,
    /// Go into extra time, or finish when there is no extra stage.
    Continue,
}

impl From<bool> for CycleChoice {
    fn from(restart: bool) -> Self {
        if restart { Self::Restart } else { Self::Continue }
    }
}

/// Result of entering the stage under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEntry {
    Countdown {
        index: usize,
        label: String,
        secs: i64,
    },
    Extra {
        index: usize,
        label: String,
    },
    /// The cursor reached the extra stage or ran off the end.
    CycleDecision,
    /// The user declined a restart and there is no extra stage.
    Finished,
}

/// The stage that just ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCompletion {
    pub index: usize,
    pub id: String,
    pub label: String,
    pub pomodoro: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running, or waiting on the cycle decision.
    Ignored,
    Countdown { time_left: i64 },
    Extra { extra_time: u64 },
    Completed {
        completed: StageCompletion,
        entry: StageEntry,
    },
}

impl TickOutcome {
    /// Whether this tick counted as running time.
    #[must_use]
    pub const fn counted(&self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

/// What removing a stage did to the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRemoval {
    Missing,
    Removed,
    /// The active stage was removed; the stage now under the cursor was entered.
    ActiveReplaced(StageEntry),
    /// The list is empty now and the sequencer went idle.
    Emptied,
}

/// Where the cursor stood when a batch of stage edits began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorMark {
    stage_id: Option<String>,
    index: usize,
    time_left: i64,
    extra_time: u64,
    phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageSequencer {
    pub(crate) stages: Vec<StageDefinition>,
    pub(crate) index: usize,
    pub(crate) time_left: i64,
    pub(crate) extra_time: u64,
    pub(crate) pomodoros: u32,
    pub(crate) phase: Phase,
}

impl StageSequencer {
    #[must_use]
    pub fn new(stages: Vec<StageDefinition>) -> Self {
        let time_left = stages.first().map_or(0, StageDefinition::duration_secs);
        Self {
            stages,
            time_left,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn time_left(&self) -> i64 {
        self.time_left
    }

    #[must_use]
    pub const fn extra_time(&self) -> u64 {
        self.extra_time
    }

    #[must_use]
    pub const fn pomodoros(&self) -> u32 {
        self.pomodoros
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<&StageDefinition> {
        self.stages.get(self.index)
    }

    /// Anything other than idle: the countdown state is meaningful.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Whether the host timer should be armed.
    #[must_use]
    pub fn wants_ticks(&self) -> bool {
        matches!(self.phase, Phase::Running | Phase::AwaitingCycleDecision)
    }

    /// Start from idle (entering the current stage) or resume from pause.
    ///
    /// Returns the entry when a stage was freshly entered.
    pub fn start(&mut self) -> Option<StageEntry> {
        match self.phase {
            Phase::Idle if !self.stages.is_empty() => {
                self.index = self.index.min(self.stages.len() - 1);
                self.phase = Phase::Running;
                Some(self.enter_current())
            }
            Phase::Paused => {
                self.phase = Phase::Running;
                None
            }
            _ => None,
        }
    }

    /// Freeze the countdown. Returns whether anything changed.
    pub fn pause(&mut self) -> bool {
        if self.phase == Phase::Running {
            self.phase = Phase::Paused;
            true
        } else {
            false
        }
    }

    pub fn resume(&mut self) -> bool {
        if self.phase == Phase::Paused {
            self.phase = Phase::Running;
            true
        } else {
            false
        }
    }

    /// Advance one second.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != Phase::Running {
            return TickOutcome::Ignored;
        }
        let Some(stage) = self.stages.get(self.index) else {
            return TickOutcome::Ignored;
        };
        if stage.is_extra() {
            self.extra_time += 1;
            return TickOutcome::Extra {
                extra_time: self.extra_time,
            };
        }
        self.time_left -= 1;
        if self.time_left > 0 {
            return TickOutcome::Countdown {
                time_left: self.time_left,
            };
        }

        let completed = StageCompletion {
            index: self.index,
            id: stage.id.clone(),
            label: stage.label.clone(),
            pomodoro: stage.is_pomodoro(),
        };
        if completed.pomodoro {
            self.pomodoros += 1;
        }
        debug!("stage `{}` expired at index {}", completed.id, completed.index);
        self.index += 1;
        let entry = self.enter_current();
        TickOutcome::Completed { completed, entry }
    }

    /// Answer a pending cycle decision. `None` when nothing was pending.
    pub fn resolve_cycle(&mut self, choice: CycleChoice) -> Option<StageEntry> {
        if self.phase != Phase::AwaitingCycleDecision {
            return None;
        }
        match choice {
            CycleChoice::Restart => {
                self.index = 0;
                self.phase = Phase::Running;
                Some(self.enter_current())
            }
            CycleChoice::Continue => match extra_index(&self.stages) {
                Some(index) => {
                    self.index = index;
                    self.phase = Phase::Running;
                    Some(StageEntry::Extra {
                        index,
                        label: self.stages[index].label.clone(),
                    })
                }
                None => {
                    self.index = self.stages.len().saturating_sub(1);
                    self.phase = Phase::Idle;
                    Some(StageEntry::Finished)
                }
            },
        }
    }

    /// Back to the first stage. A full reset also clears the pomodoro count.
    pub fn reset(&mut self, full: bool) {
        self.phase = Phase::Idle;
        self.index = 0;
        self.extra_time = 0;
        self.time_left = self.stages.first().map_or(0, StageDefinition::duration_secs);
        if full {
            self.pomodoros = 0;
        }
    }

    /// Swap in a new stage list, keeping the cursor in range.
    pub fn replace_stages(&mut self, stages: Vec<StageDefinition>) {
        self.stages = stages;
        if self.phase != Phase::AwaitingCycleDecision {
            self.index = self.index.min(self.stages.len().saturating_sub(1));
        }
        if self.stages.is_empty() {
            self.phase = Phase::Idle;
            self.time_left = 0;
        }
    }

    #[must_use]
    pub fn mark(&self) -> CursorMark {
        CursorMark {
            stage_id: self.current_stage().map(|stage| stage.id.clone()),
            index: self.index,
            time_left: self.time_left,
            extra_time: self.extra_time,
            phase: self.phase,
        }
    }

    /// Put back a stage list saved at `mark` time.
    ///
    /// Without `rewind` the cursor follows the live stage by id and keeps its
    /// countdown. With `rewind`, or when the live stage is not in `stages`,
    /// the cursor returns to the marked stage with the marked countdown.
    pub fn restore_stages(
        &mut self,
        stages: Vec<StageDefinition>,
        mark: &CursorMark,
        rewind: bool,
    ) {
        let live = self
            .current_stage()
            .and_then(|live| stages.iter().position(|stage| stage.id == live.id));
        self.stages = stages;
        match live {
            Some(position) if !rewind => self.index = position,
            _ => {
                self.index = mark
                    .stage_id
                    .as_deref()
                    .and_then(|id| self.stages.iter().position(|stage| stage.id == id))
                    .unwrap_or(mark.index);
                self.time_left = mark.time_left;
                self.extra_time = mark.extra_time;
                self.phase = mark.phase;
            }
        }
        debug!("stage list restored, cursor at {} ({:?})", self.index, self.phase);
    }

    /// Change one stage's length. A live countdown on that stage moves by the
    /// same delta, never below zero. Returns `false` for unknown ids.
    pub fn set_stage_minutes(&mut self, id: &str, minutes: u32) -> bool {
        let Some(position) = self.stages.iter().position(|s| s.id == id) else {
            return false;
        };
        let Some(old) = self.stages[position].set_minutes(minutes) else {
            return true;
        };
        if self.is_started() && position == self.index {
            let delta =
                (i64::from(minutes) - i64::from(old)) * crate::constants::SECONDS_PER_MINUTE;
            self.time_left = (self.time_left + delta).max(0);
            debug!("active stage `{id}` resized by {delta}s, {}s left", self.time_left);
        }
        true
    }

    /// Insert before the extra stage (or append). Returns the position used.
    pub fn insert_stage(&mut self, stage: StageDefinition) -> usize {
        let position = extra_index(&self.stages).unwrap_or(self.stages.len());
        self.stages.insert(position, stage);
        if self.is_started() && position <= self.index {
            self.index += 1;
        }
        position
    }

    pub fn remove_stage(&mut self, id: &str) -> StageRemoval {
        let Some(position) = self.stages.iter().position(|s| s.id == id) else {
            return StageRemoval::Missing;
        };
        self.stages.remove(position);
        if self.stages.is_empty() {
            self.reset(false);
            return StageRemoval::Emptied;
        }
        if position < self.index {
            self.index -= 1;
            return StageRemoval::Removed;
        }
        let was_active = position == self.index;
        self.index = self.index.min(self.stages.len() - 1);
        match self.phase {
            Phase::Running | Phase::Paused if was_active => {
                StageRemoval::ActiveReplaced(self.enter_current())
            }
            _ => StageRemoval::Removed,
        }
    }

    fn has_countdown_stages(&self) -> bool {
        self.stages.iter().any(|stage| !stage.is_extra())
    }

    fn enter_current(&mut self) -> StageEntry {
        let at_end = self.index >= self.stages.len();
        let at_extra = extra_index(&self.stages) == Some(self.index);
        if (at_end || at_extra) && self.has_countdown_stages() {
            self.phase = Phase::AwaitingCycleDecision;
            debug!("cycle complete, awaiting decision");
            return StageEntry::CycleDecision;
        }
        if self.phase == Phase::AwaitingCycleDecision || self.phase == Phase::Idle {
            self.phase = Phase::Running;
        }
        match self.stages.get(self.index) {
            Some(stage) if stage.is_extra() => StageEntry::Extra {
                index: self.index,
                label: stage.label.clone(),
            },
            Some(stage) => {
                self.time_left = stage.duration_secs();
                StageEntry::Countdown {
                    index: self.index,
                    label: stage.label.clone(),
                    secs: self.time_left,
                }
            }
            None => {
                self.phase = Phase::Idle;
                StageEntry::Finished
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn essay() -> Vec<StageDefinition> {
        vec![
            StageDefinition::timed("writing", "Writing", 5),
            StageDefinition::extra("extra", "Extra Time"),
        ]
    }

    fn run(seq: &mut StageSequencer, ticks: usize) -> Vec<TickOutcome> {
        (0..ticks).map(|_| seq.tick()).collect()
    }

    #[test]
    fn five_minute_stage_expires_on_tick_300() {
        let mut seq = StageSequencer::new(essay());
        assert!(matches!(seq.start(), Some(StageEntry::Countdown { secs: 300, .. })));
        let outcomes = run(&mut seq, 300);
        assert!(outcomes[..299].iter().all(|o| matches!(o, TickOutcome::Countdown { .. })));
        assert!(matches!(
            &outcomes[299],
            TickOutcome::Completed { entry: StageEntry::CycleDecision, .. }
        ));
        assert_eq!(seq.phase(), Phase::AwaitingCycleDecision);
        assert_eq!(seq.extra_time(), 0);

        assert!(matches!(
            seq.resolve_cycle(CycleChoice::Restart),
            Some(StageEntry::Countdown { index: 0, .. })
        ));
        assert_eq!((seq.index(), seq.time_left()), (0, 300));
    }

    #[test]
    fn declining_restart_counts_extra_time_up() {
        let mut seq = StageSequencer::new(essay());
        seq.start();
        run(&mut seq, 300);
        assert_eq!(seq.tick(), TickOutcome::Ignored);
        seq.resolve_cycle(CycleChoice::Continue);
        assert_eq!(seq.phase(), Phase::Running);
        let last = run(&mut seq, 42).pop().unwrap();
        assert_eq!(last, TickOutcome::Extra { extra_time: 42 });
        assert_eq!(seq.index(), 1);
    }

    #[test]
    fn list_without_extra_finishes_on_decline() {
        let mut seq = StageSequencer::new(vec![
            StageDefinition::timed("a", "A", 0),
            StageDefinition::timed("b", "B", 0),
        ]);
        seq.start();
        assert!(matches!(
            seq.tick(),
            TickOutcome::Completed { entry: StageEntry::Countdown { index: 1, .. }, .. }
        ));
        assert!(matches!(
            seq.tick(),
            TickOutcome::Completed { entry: StageEntry::CycleDecision, .. }
        ));
        assert_eq!(seq.resolve_cycle(CycleChoice::Continue), Some(StageEntry::Finished));
        assert_eq!((seq.phase(), seq.index()), (Phase::Idle, 1));
    }

    #[test]
    fn pause_resume_without_ticks_is_idempotent() {
        let mut seq = StageSequencer::new(essay());
        seq.start();
        run(&mut seq, 17);
        let before = seq.clone();
        assert!(seq.pause());
        assert_eq!(seq.tick(), TickOutcome::Ignored);
        assert!(seq.resume());
        assert_eq!(seq, before);
    }

    #[test]
    fn resizing_active_stage_shifts_countdown() {
        let mut seq = StageSequencer::new(vec![
            StageDefinition::timed("a", "A", 10),
            StageDefinition::timed("b", "B", 10),
        ]);
        seq.start();
        run(&mut seq, 60);
        assert!(seq.set_stage_minutes("a", 15));
        assert_eq!(seq.time_left(), 540 + 300);
        assert!(seq.set_stage_minutes("a", 1));
        assert_eq!(seq.time_left(), 0);
        assert!(seq.set_stage_minutes("b", 20));
        assert_eq!(seq.time_left(), 0);
        assert!(!seq.set_stage_minutes("zzz", 1));
    }

    #[test]
    fn pomodoro_completions_are_counted() {
        let mut seq = StageSequencer::new(vec![
            StageDefinition::pomodoro("p", "Pomodoro", 0),
            StageDefinition::timed("b", "Break", 0),
            StageDefinition::extra("x", "Extra"),
        ]);
        seq.start();
        run(&mut seq, 2);
        assert_eq!(seq.pomodoros(), 1);
        seq.reset(false);
        assert_eq!(seq.pomodoros(), 1);
        seq.reset(true);
        assert_eq!(seq.pomodoros(), 0);
    }

    #[test]
    fn edits_keep_cursor_on_the_same_stage() {
        let mut seq = StageSequencer::new(vec![
            StageDefinition::timed("a", "A", 1),
            StageDefinition::timed("b", "B", 1),
            StageDefinition::extra("x", "Extra"),
        ]);
        seq.start();
        run(&mut seq, 60);
        assert_eq!(seq.current_stage().unwrap().id, "b");

        assert_eq!(seq.insert_stage(StageDefinition::timed("c", "C", 1)), 2);
        assert_eq!(seq.current_stage().unwrap().id, "b");
        assert_eq!(seq.remove_stage("a"), StageRemoval::Removed);
        assert_eq!(seq.current_stage().unwrap().id, "b");

        let removal = seq.remove_stage("b");
        assert!(matches!(
            removal,
            StageRemoval::ActiveReplaced(StageEntry::Countdown { index: 0, .. })
        ));
        assert_eq!(seq.current_stage().unwrap().id, "c");
        assert_eq!(seq.remove_stage("nope"), StageRemoval::Missing);
    }
}
