//! Centralized tuning constants for the Quillquest engine.
//!
//! Runtime-overridable values are mirrored in [`crate::config::TimerConfig`];
//! these constants only supply its defaults and the persisted key layout.

// Persisted key layout -----------------------------------------------------
pub const KEY_TEMPLATES: &str = "templates";
pub const KEY_MISSIONS: &str = "missions";
pub const KEY_SESSION_INDEX: &str = "index";
pub const KEY_DAILY_SESSION: &str = "dailySession";
pub const KEY_CURRENT_MONSTER: &str = "currentMonster";
pub const KEY_CURRENT_MONSTER_INDEX: &str = "currentMonsterIndex";

/// Keys a user-chosen session name may never shadow.
pub const RESERVED_KEYS: [&str; 6] = [
    KEY_TEMPLATES,
    KEY_MISSIONS,
    KEY_SESSION_INDEX,
    KEY_DAILY_SESSION,
    KEY_CURRENT_MONSTER,
    KEY_CURRENT_MONSTER_INDEX,
];

// Built-in template keys ---------------------------------------------------
pub const TEMPLATE_DEFAULT: &str = "default";
pub const TEMPLATE_POMODORO: &str = "pomodoro30";

// Sequencer tuning ---------------------------------------------------------
pub(crate) const DAMAGE_PER_STAGE: u32 = 5;
pub(crate) const TICK_INTERVAL_MS: u64 = 1_000;
pub(crate) const SAVE_QUIET_MS: u64 = 1_500;
pub(crate) const DAILY_FLUSH_EVERY: u64 = 5;
pub(crate) const NAMESPACE_PREFIX: &str = "essayTimer_";
pub(crate) const REST_MARKERS: [&str; 3] = ["break", "rest", "descanso"];
pub(crate) const SECONDS_PER_MINUTE: i64 = 60;

// Edit mode prompts --------------------------------------------------------
pub(crate) const DEFAULT_NEW_STAGE_MINUTES: u32 = 10;

// Mission generator --------------------------------------------------------
pub(crate) const DEFAULT_MISSION_ROOMS: u32 = 3;
pub(crate) const MAX_MISSION_ROOMS: u32 = 50;
pub(crate) const DEFAULT_MISSION_DIFFICULTY: &str = "Easy";
pub(crate) const GENERATED_ITEM_NAME: &str = "Treasure";
pub(crate) const FILLER_MONSTER_CHANCE: f64 = 0.5;
pub(crate) const FILLER_ITEM_CHANCE: f64 = 0.8;

// Dungeon traversal --------------------------------------------------------
pub(crate) const DUNGEON_WORK_SECS: u32 = 30 * 60;
pub(crate) const DUNGEON_REST_SECS: u32 = 5 * 60;

// View thresholds ----------------------------------------------------------
pub(crate) const URGENCY_ORANGE_RATIO: f64 = 0.5;
pub(crate) const URGENCY_RED_RATIO: f64 = 0.2;
