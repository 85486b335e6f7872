//! Quillquest Game Engine
//!
//! Platform-agnostic core for the Quillquest essay timer: a stage sequencer
//! with resumable persistence, a companion that takes damage as stages are
//! completed, missions walked room by room, and a dungeon traversal gated by
//! work/rest timers. Rendering, audio and dialogs belong to the host, which
//! plugs in through the collaborator traits defined here.

pub mod bestiary;
pub mod clock;
pub mod companion;
pub mod config;
pub mod constants;
pub mod daily;
pub mod debounce;
pub mod dungeon;
pub mod edit;
pub mod engine;
pub mod error;
pub mod events;
pub mod mission;
pub mod sequencer;
pub mod session;
pub mod stage;
pub mod storage;
pub mod template;
pub mod timer;
pub mod view;

// Re-export commonly used types
pub use bestiary::{MonsterSpec, default_roster};
pub use clock::{Clock, ManualClock, SystemClock};
pub use companion::{Companion, CompanionRoster, DamageOutcome};
pub use config::{ConfigError, DungeonTiming, TimerConfig};
pub use daily::DailySessionCounter;
pub use debounce::SaveDebouncer;
pub use dungeon::{
    Direction, DungeonError, DungeonEvent, DungeonGraph, DungeonPhase, DungeonRun, NodeId,
    TileContent,
};
pub use edit::{EditSession, parse_positive};
pub use engine::EssayTimer;
pub use error::{EngineError, EngineResult};
pub use events::EngineEvent;
pub use mission::{Mission, MissionAdvance, MissionCatalog, MissionRun, RoomSpec, RoomStep};
pub use sequencer::{CursorMark, CycleChoice, Phase, StageEntry, StageSequencer, TickOutcome};
pub use session::{RuntimeState, SessionStore};
pub use stage::{StageDefinition, StageKind, StageListError};
pub use storage::{MemoryStore, NamespacedStore};
pub use template::{SavedTemplate, Template, TemplateCatalog};
pub use timer::{ManualScheduler, Scheduler, TimerId, TimerSlot, format_clock, format_hms};
#[cfg(feature = "async")]
pub use timer::TokioScheduler;
pub use view::{CompanionHud, StageView, TileView, Urgency};

/// Trait for abstracting the per-user key/value persistence service
/// Platform-specific implementations should provide this
pub trait KeyValueStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read a structured value
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, Self::Error>;

    /// Write a structured value, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the write.
    fn set(&self, key: &str, value: serde_json::Value) -> Result<(), Self::Error>;

    /// Remove a value; absent keys are not an error
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be modified.
    fn remove(&self, key: &str) -> Result<(), Self::Error>;
}

/// Trait for the prompt/confirm/alert dialogs the host shows the user
pub trait Interaction {
    /// Ask for free text; `None` when the user cancels.
    fn prompt_text(&mut self, message: &str, default: &str) -> Option<String>;

    /// Ask a yes/no question.
    fn confirm(&mut self, message: &str) -> bool;

    /// Fire-and-forget alert.
    fn notify(&mut self, message: &str);
}

/// Scripted [`Interaction`] that replays canned answers and records notices.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInteraction {
    pub prompts: std::collections::VecDeque<Option<String>>,
    pub confirms: std::collections::VecDeque<bool>,
    pub notices: Vec<String>,
    /// Answer given once `confirms` runs dry.
    pub default_confirm: bool,
}

impl ScriptedInteraction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn confirming(mut self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.confirms.extend(answers);
        self
    }

    #[must_use]
    pub fn prompting(mut self, answers: impl IntoIterator<Item = Option<String>>) -> Self {
        self.prompts.extend(answers);
        self
    }
}

impl Interaction for ScriptedInteraction {
    fn prompt_text(&mut self, _message: &str, _default: &str) -> Option<String> {
        self.prompts.pop_front().flatten()
    }

    fn confirm(&mut self, _message: &str) -> bool {
        self.confirms.pop_front().unwrap_or(self.default_confirm)
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}
