use std::fmt;

/// Side effects the engine asks its host to present.
///
/// Events queue up inside the engine and are drained with
/// [`crate::engine::EssayTimer::drain_events`] or handled in one go by
/// [`crate::engine::EssayTimer::pump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    StageStarted { index: usize, label: String },
    StageCompleted { index: usize, label: String },
    PomodoroCompleted { total: u32 },
    /// The host must ask whether to restart and answer through `resolve_cycle`.
    CycleDecisionRequired,
    CycleRestarted,
    ExtraTimeEntered,
    CycleFinished,
    CompanionLoaded { name: String, max_hp: u32 },
    CompanionDamaged { name: String, hp: u32, max_hp: u32 },
    CompanionDefeated { name: String },
    NoMoreOpponents,
    MissionStarted { key: String, name: String },
    RoomItemFound { item: String },
    RoomEmpty,
    MissionCompleted { name: String },
    SessionSaved { name: String },
    TemplateSaved { key: String, replaced: bool },
    OverlayRefreshed { text: String },
    /// Rejected input or a blocked action.
    Notice(String),
}

impl EngineEvent {
    /// Alert text for events the user should be told about.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::CompanionDefeated { name } => Some(format!("You defeated {name}!")),
            Self::NoMoreOpponents => Some("No more opponents.".to_string()),
            Self::RoomItemFound { item } => Some(format!("You found: {item}")),
            Self::RoomEmpty => Some("The room is empty.".to_string()),
            Self::MissionCompleted { name } => Some(format!("You completed the mission {name}!")),
            Self::TemplateSaved {
                key,
                replaced: true,
            } => Some(format!("Template `{key}` was overwritten.")),
            Self::CycleFinished => Some("Cycle finished.".to_string()),
            Self::Notice(text) => Some(text.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageStarted { index, label } => write!(f, "stage {index} started: {label}"),
            Self::StageCompleted { index, label } => {
                write!(f, "stage {index} completed: {label}")
            }
            Self::PomodoroCompleted { total } => write!(f, "pomodoro #{total} completed"),
            Self::CycleDecisionRequired => f.write_str("cycle complete, decision required"),
            Self::CycleRestarted => f.write_str("cycle restarted"),
            Self::ExtraTimeEntered => f.write_str("extra time"),
            Self::CompanionLoaded { name, max_hp } => write!(f, "{name} appears ({max_hp} HP)"),
            Self::CompanionDamaged { name, hp, max_hp } => write!(f, "{name} {hp}/{max_hp}"),
            Self::MissionStarted { key, name } => write!(f, "mission {key}: {name}"),
            Self::SessionSaved { name } => write!(f, "saved {name}"),
            Self::TemplateSaved { key, replaced } => {
                write!(f, "template {key} saved (replaced: {replaced})")
            }
            Self::OverlayRefreshed { text } => f.write_str(text),
            other => f.write_str(&other.message().unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_user_facing_events_notify() {
        assert_eq!(
            EngineEvent::CompanionDefeated { name: "Slime".into() }.message().as_deref(),
            Some("You defeated Slime!")
        );
        assert!(EngineEvent::CycleRestarted.message().is_none());
        assert!(
            EngineEvent::TemplateSaved { key: "a".into(), replaced: false }
                .message()
                .is_none()
        );
        assert_eq!(EngineEvent::RoomEmpty.to_string(), "The room is empty.");
    }
}
