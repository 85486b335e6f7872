use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::KeyValueStore;
use crate::bestiary::MonsterSpec;
use crate::constants::{
    DEFAULT_MISSION_DIFFICULTY, DEFAULT_MISSION_ROOMS, FILLER_ITEM_CHANCE, FILLER_MONSTER_CHANCE,
    GENERATED_ITEM_NAME, KEY_MISSIONS, MAX_MISSION_ROOMS,
};
use crate::edit::parse_positive;
use crate::error::EngineResult;
use crate::stage::slugify;
use crate::storage::{read_json, write_json};

/// One room of a mission, stored as `{"type": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RoomSpec {
    Empty,
    Item {
        item: String,
    },
    Monster {
        #[serde(rename = "monsterIndex")]
        monster_index: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub name: String,
    pub difficulty: String,
    #[serde(default)]
    pub description: String,
    pub rooms: Vec<RoomSpec>,
}

impl Mission {
    /// Forest walk: an empty clearing, the Slime, then a potion.
    #[must_use]
    pub fn tutorial() -> Self {
        Self {
            name: "Starting Forest".to_string(),
            difficulty: DEFAULT_MISSION_DIFFICULTY.to_string(),
            description: "Explore the forest and defeat the Slime.".to_string(),
            rooms: vec![
                RoomSpec::Empty,
                RoomSpec::Monster { monster_index: 0 },
                RoomSpec::Item {
                    item: "Healing Potion".to_string(),
                },
            ],
        }
    }
}

/// Where the room walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStep {
    /// A monster room; the caller loads this opponent.
    Encounter { monster_index: usize },
    /// The cursor moved past the last room.
    Completed,
}

/// Rooms walked through on the way to the next stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionAdvance {
    pub passed: Vec<RoomSpec>,
    pub step: RoomStep,
}

/// An active mission and its room cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionRun {
    key: String,
    mission: Mission,
    room_index: usize,
}

impl MissionRun {
    #[must_use]
    pub fn new(key: impl Into<String>, mission: Mission) -> Self {
        Self {
            key: key.into(),
            mission,
            room_index: 0,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn mission(&self) -> &Mission {
        &self.mission
    }

    #[must_use]
    pub const fn room_index(&self) -> usize {
        self.room_index
    }

    /// Walk from the cursor until a monster room or the end of the mission.
    /// Item and empty rooms are passed through.
    pub fn walk(&mut self) -> MissionAdvance {
        let mut passed = Vec::new();
        loop {
            let Some(room) = self.mission.rooms.get(self.room_index) else {
                return MissionAdvance {
                    passed,
                    step: RoomStep::Completed,
                };
            };
            match room {
                RoomSpec::Monster { monster_index } => {
                    return MissionAdvance {
                        passed,
                        step: RoomStep::Encounter {
                            monster_index: *monster_index,
                        },
                    };
                }
                RoomSpec::Item { .. } | RoomSpec::Empty => {
                    passed.push(room.clone());
                    self.room_index += 1;
                }
            }
        }
    }

    /// Leave the current room (its monster was defeated) and walk on.
    pub fn advance(&mut self) -> MissionAdvance {
        self.room_index = self.room_index.saturating_add(1);
        self.walk()
    }
}

/// Build a random mission: `rooms - 1` filler rooms and a boss room.
///
/// Returns `None` when the name is blank. An unparseable or zero room count
/// falls back to three rooms and a blank difficulty to "Easy". Room counts
/// are capped at fifty.
pub fn generate_mission<R: Rng + ?Sized>(
    name: &str,
    rooms_input: &str,
    difficulty: Option<&str>,
    roster: &[MonsterSpec],
    rng: &mut R,
) -> Option<(String, Mission)> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let room_count =
        parse_positive(rooms_input, DEFAULT_MISSION_ROOMS).min(MAX_MISSION_ROOMS) as usize;
    let monster_slots = roster.len().max(1);

    let mut rooms = Vec::with_capacity(room_count);
    for _ in 1..room_count {
        let roll: f64 = rng.r#gen();
        let room = if roll < FILLER_MONSTER_CHANCE {
            RoomSpec::Monster {
                monster_index: rng.gen_range(0..monster_slots),
            }
        } else if roll < FILLER_ITEM_CHANCE {
            RoomSpec::Item {
                item: GENERATED_ITEM_NAME.to_string(),
            }
        } else {
            RoomSpec::Empty
        };
        rooms.push(room);
    }
    let boss = rng.gen_range(0..monster_slots);
    rooms.push(RoomSpec::Monster {
        monster_index: boss,
    });
    let boss_name = roster.get(boss).map_or("boss", |spec| spec.name.as_str());

    let difficulty = difficulty
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_MISSION_DIFFICULTY);
    let mission = Mission {
        name: name.to_string(),
        difficulty: difficulty.to_string(),
        description: format!("Defeat the {boss_name} to complete the mission."),
        rooms,
    };
    Some((slugify(name), mission))
}

/// Stored missions, seeded with the tutorial on first use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissionCatalog {
    missions: BTreeMap<String, Mission>,
}

impl MissionCatalog {
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn load_or_seed<S: KeyValueStore + ?Sized>(store: &S) -> EngineResult<Self> {
        let missions: BTreeMap<String, Mission> =
            read_json(store, KEY_MISSIONS)?.unwrap_or_default();
        if !missions.is_empty() {
            return Ok(Self { missions });
        }
        let missions = BTreeMap::from([("tutorial".to_string(), Mission::tutorial())]);
        write_json(store, KEY_MISSIONS, &missions)?;
        Ok(Self { missions })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Mission> {
        self.missions.get(key)
    }

    /// `(key, display name)` pairs for a mission picker.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        self.missions
            .iter()
            .map(|(key, mission)| (key.clone(), mission.name.clone()))
            .collect()
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn insert<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &S,
        key: &str,
        mission: Mission,
    ) -> EngineResult<()> {
        info!("storing mission `{key}` ({} rooms)", mission.rooms.len());
        self.missions.insert(key.to_string(), mission);
        write_json(store, KEY_MISSIONS, &self.missions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bestiary::default_roster;
    use crate::storage::MemoryStore;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use serde_json::json;

    #[test]
    fn rooms_use_type_tag_layout() {
        let rooms = Mission::tutorial().rooms;
        assert_eq!(
            serde_json::to_value(&rooms).unwrap(),
            json!([
                {"type": "empty"},
                {"type": "monster", "monsterIndex": 0},
                {"type": "item", "item": "Healing Potion"},
            ])
        );
    }

    #[test]
    fn walk_skips_to_first_monster_then_completes() {
        let mut run = MissionRun::new("tutorial", Mission::tutorial());
        let first = run.walk();
        assert_eq!(first.passed, vec![RoomSpec::Empty]);
        assert_eq!(first.step, RoomStep::Encounter { monster_index: 0 });
        assert_eq!(run.room_index(), 1);

        let next = run.advance();
        assert_eq!(next.passed.len(), 1);
        assert_eq!(next.step, RoomStep::Completed);
        assert_eq!(run.room_index(), 3);
    }

    #[test]
    fn generated_missions_end_in_a_boss() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let (key, mission) =
            generate_mission("Night Raid", "5", Some("Hard"), default_roster(), &mut rng).unwrap();
        assert_eq!(key, "night-raid");
        assert_eq!(mission.rooms.len(), 5);
        assert_eq!(mission.difficulty, "Hard");
        let RoomSpec::Monster { monster_index } = mission.rooms[4] else {
            panic!("last room must hold the boss");
        };
        let boss = &default_roster()[monster_index].name;
        assert_eq!(mission.description, format!("Defeat the {boss} to complete the mission."));
    }

    #[test]
    fn bad_generator_input_falls_back_or_aborts() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        assert!(generate_mission("   ", "3", None, default_roster(), &mut rng).is_none());
        let (_, mission) = generate_mission("x", "lots", None, default_roster(), &mut rng).unwrap();
        assert_eq!(mission.rooms.len(), 3);
        assert_eq!(mission.difficulty, "Easy");
        let (_, zero) = generate_mission("y", "0", Some(""), default_roster(), &mut rng).unwrap();
        assert_eq!(zero.rooms.len(), 3);
    }

    #[test]
    fn huge_room_counts_are_capped() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let (_, mission) =
            generate_mission("Endless", "4000000000", None, default_roster(), &mut rng).unwrap();
        assert_eq!(mission.rooms.len(), MAX_MISSION_ROOMS as usize);
        assert!(matches!(mission.rooms.last(), Some(RoomSpec::Monster { .. })));
    }

    #[test]
    fn catalog_seeds_tutorial_once() {
        let store = MemoryStore::new();
        let mut catalog = MissionCatalog::load_or_seed(&store).unwrap();
        assert!(catalog.get("tutorial").is_some());
        catalog.insert(&store, "mine", Mission::tutorial()).unwrap();
        let reloaded = MissionCatalog::load_or_seed(&store).unwrap();
        assert_eq!(reloaded.entries().len(), 2);
    }
}
