use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::KeyValueStore;
use crate::bestiary::MonsterSpec;
use crate::constants::{KEY_CURRENT_MONSTER, KEY_CURRENT_MONSTER_INDEX};
use crate::error::EngineResult;
use crate::storage::{read_json, remove_key, write_json};

/// The opponent currently soaking up stage-completion damage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Companion {
    pub name: String,
    pub hp: u32,
    #[serde(rename = "maxHP")]
    pub max_hp: u32,
    #[serde(rename = "img", default, skip_serializing_if = "String::is_empty")]
    pub image: String,
}

impl Companion {
    #[must_use]
    pub fn from_spec(spec: &MonsterSpec) -> Self {
        Self {
            name: spec.name.clone(),
            hp: spec.max_hp,
            max_hp: spec.max_hp,
            image: spec.image.clone(),
        }
    }

    #[must_use]
    pub const fn is_defeated(&self) -> bool {
        self.hp == 0
    }

    /// Remaining health in percent, clamped to `0..=100`.
    #[must_use]
    pub fn health_percent(&self) -> f64 {
        if self.max_hp == 0 {
            return 0.0;
        }
        (f64::from(self.hp) / f64::from(self.max_hp) * 100.0).clamp(0.0, 100.0)
    }
}

/// What a single damage application did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DamageOutcome {
    /// No companion is loaded; nothing changed.
    NoCompanion,
    Wounded { name: String, hp: u32, max_hp: u32 },
    /// Health reached zero. The caller advances to the next opponent or room.
    Defeated { name: String },
    /// Health was already zero; the hit is absorbed without a second advance.
    AlreadyDefeated { name: String },
}

/// Ordered opponent list plus the persisted "current monster" cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionRoster {
    roster: Vec<MonsterSpec>,
    index: usize,
    current: Option<Companion>,
}

impl CompanionRoster {
    /// Empty roster cursor that has not loaded anything yet.
    #[must_use]
    pub const fn new(roster: Vec<MonsterSpec>) -> Self {
        Self {
            roster,
            index: 0,
            current: None,
        }
    }

    /// Restore the saved opponent, or load the one at the saved index.
    ///
    /// An out-of-range saved index falls back to the first opponent. A saved
    /// companion missing its image borrows the roster entry's image. A saved
    /// companion at zero health was beaten, so the next one is loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn restore<S: KeyValueStore + ?Sized>(
        store: &S,
        roster: Vec<MonsterSpec>,
    ) -> EngineResult<Self> {
        let mut this = Self::new(roster);
        let saved_index: Option<usize> = read_json(store, KEY_CURRENT_MONSTER_INDEX)?;
        this.index = saved_index
            .filter(|index| *index < this.roster.len())
            .unwrap_or(0);

        let saved: Option<Companion> = read_json(store, KEY_CURRENT_MONSTER)?;
        match saved.filter(|c| !c.name.is_empty() && c.max_hp > 0) {
            Some(companion) if companion.is_defeated() => {
                info!("saved companion {} was already beaten", companion.name);
                this.load_next(store)?;
            }
            Some(mut companion) => {
                companion.hp = companion.hp.min(companion.max_hp);
                if companion.image.is_empty()
                    && let Some(spec) = this.roster.get(this.index)
                {
                    companion.image.clone_from(&spec.image);
                }
                debug!(
                    "restored companion {} ({}/{})",
                    companion.name, companion.hp, companion.max_hp
                );
                this.current = Some(companion);
            }
            None => {
                this.load(store, this.index)?;
            }
        }
        Ok(this)
    }

    #[must_use]
    pub const fn current(&self) -> Option<&Companion> {
        self.current.as_ref()
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn roster(&self) -> &[MonsterSpec] {
        &self.roster
    }

    /// Load the opponent at `index` at full health.
    ///
    /// An index past the roster clears the companion; `None` means there are
    /// no more opponents.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn load<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &S,
        index: usize,
    ) -> EngineResult<Option<&Companion>> {
        self.index = index;
        match self.roster.get(index) {
            Some(spec) => {
                self.current = Some(Companion::from_spec(spec));
                self.persist(store)?;
                info!("companion {} loaded", spec.name);
            }
            None => {
                self.current = None;
                write_json(store, KEY_CURRENT_MONSTER_INDEX, &index)?;
                remove_key(store, KEY_CURRENT_MONSTER)?;
                info!("no opponent at index {index}");
            }
        }
        Ok(self.current.as_ref())
    }

    /// Load the opponent after the current one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn load_next<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &S,
    ) -> EngineResult<Option<&Companion>> {
        self.load(store, self.index.saturating_add(1))
    }

    /// Subtract `amount` hit points, never going below zero, and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn apply_damage<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &S,
        amount: u32,
    ) -> EngineResult<DamageOutcome> {
        let Some(companion) = self.current.as_mut() else {
            return Ok(DamageOutcome::NoCompanion);
        };
        if companion.is_defeated() {
            return Ok(DamageOutcome::AlreadyDefeated {
                name: companion.name.clone(),
            });
        }
        companion.hp = companion.hp.saturating_sub(amount);
        let outcome = if companion.is_defeated() {
            DamageOutcome::Defeated {
                name: companion.name.clone(),
            }
        } else {
            DamageOutcome::Wounded {
                name: companion.name.clone(),
                hp: companion.hp,
                max_hp: companion.max_hp,
            }
        };
        self.persist(store)?;
        debug!("companion damaged by {amount}: {outcome:?}");
        Ok(outcome)
    }

    fn persist<S: KeyValueStore + ?Sized>(&self, store: &S) -> EngineResult<()> {
        if let Some(companion) = &self.current {
            write_json(store, KEY_CURRENT_MONSTER, companion)?;
            write_json(store, KEY_CURRENT_MONSTER_INDEX, &self.index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bestiary::default_roster;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn roster() -> Vec<MonsterSpec> {
        default_roster().to_vec()
    }

    #[test]
    fn fresh_store_loads_first_opponent() {
        let store = MemoryStore::new();
        let companions = CompanionRoster::restore(&store, roster()).unwrap();
        let slime = companions.current().unwrap();
        assert_eq!((slime.name.as_str(), slime.hp, slime.max_hp), ("Slime", 20, 20));
        assert_eq!(store.get(KEY_CURRENT_MONSTER_INDEX).unwrap(), Some(json!(0)));
    }

    #[test]
    fn hp_reaches_zero_exactly_once() {
        let store = MemoryStore::new();
        let mut companions = CompanionRoster::restore(&store, roster()).unwrap();
        let mut defeats = 0;
        for _ in 0..6 {
            if let DamageOutcome::Defeated { .. } = companions.apply_damage(&store, 5).unwrap() {
                defeats += 1;
            }
        }
        assert_eq!(defeats, 1);
        assert!(matches!(
            companions.apply_damage(&store, 5).unwrap(),
            DamageOutcome::AlreadyDefeated { .. }
        ));
        assert_eq!(companions.current().unwrap().hp, 0);
    }

    #[test]
    fn overkill_clamps_at_zero() {
        let store = MemoryStore::new();
        let mut companions = CompanionRoster::restore(&store, roster()).unwrap();
        let outcome = companions.apply_damage(&store, 500).unwrap();
        assert_eq!(outcome, DamageOutcome::Defeated { name: "Slime".into() });
        assert_eq!(companions.current().unwrap().hp, 0);
    }

    #[test]
    fn out_of_range_load_clears_companion() {
        let store = MemoryStore::new();
        let mut companions = CompanionRoster::restore(&store, roster()).unwrap();
        assert!(companions.load(&store, 5).unwrap().is_none());
        assert!(store.get(KEY_CURRENT_MONSTER).unwrap().is_none());
        assert_eq!(store.get(KEY_CURRENT_MONSTER_INDEX).unwrap(), Some(json!(5)));
        assert_eq!(
            companions.apply_damage(&store, 5).unwrap(),
            DamageOutcome::NoCompanion
        );
    }

    #[test]
    fn restoring_a_beaten_companion_moves_on() {
        let store = MemoryStore::new();
        store
            .set(KEY_CURRENT_MONSTER, json!({"name": "Slime", "hp": 0, "maxHP": 20}))
            .unwrap();
        store.set(KEY_CURRENT_MONSTER_INDEX, json!(0)).unwrap();

        let mut companions = CompanionRoster::restore(&store, roster()).unwrap();
        assert_eq!(companions.index(), 1);
        assert_eq!(companions.current().unwrap().name, "Goblin");
        assert_eq!(store.get(KEY_CURRENT_MONSTER_INDEX).unwrap(), Some(json!(1)));
        assert!(matches!(
            companions.apply_damage(&store, 5).unwrap(),
            DamageOutcome::Wounded { hp: 25, .. }
        ));
    }

    #[test]
    fn restore_fills_missing_image_and_ignores_bad_index() {
        let store = MemoryStore::new();
        store
            .set(KEY_CURRENT_MONSTER, json!({"name": "Slime", "hp": 7, "maxHP": 20}))
            .unwrap();
        store.set(KEY_CURRENT_MONSTER_INDEX, json!(42)).unwrap();

        let companions = CompanionRoster::restore(&store, roster()).unwrap();
        assert_eq!(companions.index(), 0);
        let slime = companions.current().unwrap();
        assert_eq!(slime.hp, 7);
        assert_eq!(slime.image, default_roster()[0].image);
    }
}
