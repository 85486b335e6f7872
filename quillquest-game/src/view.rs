//! Render-ready projections of engine state.
//!
//! Nothing here mutates the engine; a host redraws from these structs after
//! every tick or event.

use serde::Serialize;

use crate::companion::Companion;
use crate::constants::{URGENCY_ORANGE_RATIO, URGENCY_RED_RATIO};
use crate::dungeon::{NodeId, TileContent};
use crate::sequencer::StageSequencer;
use crate::stage::total_planned_secs;
use crate::timer::format_clock;

/// Colour band of a countdown display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Green,
    Orange,
    Red,
}

impl Urgency {
    #[must_use]
    pub fn for_ratio(ratio: f64) -> Self {
        if ratio <= URGENCY_RED_RATIO {
            Self::Red
        } else if ratio <= URGENCY_ORANGE_RATIO {
            Self::Orange
        } else {
            Self::Green
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageView {
    pub id: String,
    pub label: String,
    /// `mm:ss`
    pub display: String,
    /// Remaining share of the stage in percent; `None` for the extra stage.
    pub percent: Option<f64>,
    pub urgency: Option<Urgency>,
    pub highlighted: bool,
}

impl StageView {
    /// One card per stage. While a session is under way the active card shows
    /// the live clock and finished cards show zero; otherwise every card
    /// shows its full length.
    #[must_use]
    pub fn all(sequencer: &StageSequencer) -> Vec<Self> {
        let started = sequencer.is_started();
        let cursor = sequencer.index();
        sequencer
            .stages()
            .iter()
            .enumerate()
            .map(|(index, stage)| {
                let seconds = if stage.is_extra() {
                    i64::try_from(sequencer.extra_time()).unwrap_or(i64::MAX)
                } else if started && index == cursor {
                    sequencer.time_left()
                } else if started && index < cursor {
                    0
                } else {
                    stage.duration_secs()
                };
                let (percent, urgency) = if stage.is_extra() {
                    (None, None)
                } else {
                    let planned = stage.duration_secs().max(1) as f64;
                    let ratio = seconds as f64 / planned;
                    (Some((ratio * 100.0).max(0.0)), Some(Urgency::for_ratio(ratio)))
                };
                Self {
                    id: stage.id.clone(),
                    label: stage.label.clone(),
                    display: format_clock(seconds),
                    percent,
                    urgency,
                    highlighted: index == cursor,
                }
            })
            .collect()
    }
}

/// Opponent panel contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanionHud {
    pub name: String,
    pub hp: u32,
    #[serde(rename = "maxHP")]
    pub max_hp: u32,
    pub image: Option<String>,
    pub health_percent: f64,
}

impl CompanionHud {
    #[must_use]
    pub fn from_companion(companion: Option<&Companion>) -> Self {
        match companion {
            Some(c) => Self {
                name: c.name.clone(),
                hp: c.hp,
                max_hp: c.max_hp,
                image: (!c.image.is_empty()).then(|| c.image.clone()),
                health_percent: c.health_percent(),
            },
            None => Self {
                name: "No monster".to_string(),
                hp: 0,
                max_hp: 0,
                image: None,
                health_percent: 0.0,
            },
        }
    }
}

/// One square of the dungeon map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileView {
    pub id: NodeId,
    pub coords: [u16; 2],
    pub visited: bool,
    pub selectable: bool,
    pub player_here: bool,
    /// Revealed once the tile has been visited.
    pub icon: Option<TileContent>,
}

/// Sum of all countdown stages as `mm:ss`.
#[must_use]
pub fn total_planned(sequencer: &StageSequencer) -> String {
    format_clock(total_planned_secs(sequencer.stages()))
}

/// Window title: the live clock while a session is under way.
#[must_use]
pub fn page_title(sequencer: &StageSequencer) -> String {
    match sequencer.current_stage() {
        Some(stage) if sequencer.is_started() => {
            let seconds = if stage.is_extra() {
                i64::try_from(sequencer.extra_time()).unwrap_or(i64::MAX)
            } else {
                sequencer.time_left()
            };
            format!("{} - {}", format_clock(seconds), stage.label)
        }
        _ => "Quillquest".to_string(),
    }
}

/// Text for the floating overlay shown while the page is hidden.
#[must_use]
pub fn overlay_text(sequencer: &StageSequencer) -> Option<String> {
    let stage = sequencer.current_stage()?;
    let seconds = if stage.is_extra() {
        i64::try_from(sequencer.extra_time()).unwrap_or(i64::MAX)
    } else {
        sequencer.time_left()
    };
    Some(format!("{}: {}", stage.label, format_clock(seconds)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bestiary::default_roster;
    use crate::stage::StageDefinition;

    fn sequencer() -> StageSequencer {
        StageSequencer::new(vec![
            StageDefinition::timed("a", "Outline", 10),
            StageDefinition::timed("b", "Draft", 10),
            StageDefinition::extra("x", "Extra Time"),
        ])
    }

    #[test]
    fn idle_cards_show_full_lengths() {
        let views = StageView::all(&sequencer());
        let displays: Vec<&str> = views.iter().map(|v| v.display.as_str()).collect();
        assert_eq!(displays, vec!["10:00", "10:00", "00:00"]);
        assert_eq!(views[0].urgency, Some(Urgency::Green));
        assert!(views[0].highlighted);
        assert_eq!(views[2].percent, None);
        assert_eq!(page_title(&sequencer()), "Quillquest");
    }

    #[test]
    fn live_cards_track_cursor() {
        let mut seq = sequencer();
        seq.start();
        for _ in 0..(600 + 540) {
            seq.tick();
        }
        let views = StageView::all(&seq);
        assert_eq!(views[0].display, "00:00");
        assert_eq!(views[1].display, "01:00");
        assert_eq!(views[1].urgency, Some(Urgency::Red));
        assert!(views[1].highlighted && !views[0].highlighted);
        assert_eq!(page_title(&seq), "01:00 - Draft");
        assert_eq!(overlay_text(&seq).as_deref(), Some("Draft: 01:00"));
        assert_eq!(total_planned(&seq), "20:00");
    }

    #[test]
    fn urgency_bands() {
        assert_eq!(Urgency::for_ratio(0.51), Urgency::Green);
        assert_eq!(Urgency::for_ratio(0.5), Urgency::Orange);
        assert_eq!(Urgency::for_ratio(0.2), Urgency::Red);
    }

    #[test]
    fn hud_without_companion() {
        let hud = CompanionHud::from_companion(None);
        assert_eq!((hud.hp, hud.max_hp), (0, 0));
        let slime = Companion::from_spec(&default_roster()[0]);
        let hud = CompanionHud::from_companion(Some(&slime));
        assert!((hud.health_percent - 100.0).abs() < f64::EPSILON);
    }
}
