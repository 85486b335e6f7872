use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Static description of an opponent in the companion roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterSpec {
    pub name: String,
    #[serde(rename = "maxHP")]
    pub max_hp: u32,
    #[serde(rename = "img")]
    pub image: String,
}

impl MonsterSpec {
    fn new(name: &str, max_hp: u32, codepoint: &str) -> Self {
        Self {
            name: name.to_string(),
            max_hp,
            image: format!("https://openmoji.org/data/color/svg/{codepoint}.svg"),
        }
    }
}

/// Fixed, ordered opponent list: Slime, Goblin, Orc, Troll, Dragon.
#[must_use]
pub fn default_roster() -> &'static [MonsterSpec] {
    static ROSTER: OnceLock<Vec<MonsterSpec>> = OnceLock::new();
    ROSTER.get_or_init(|| {
        vec![
            MonsterSpec::new("Slime", 20, "1F9EA"),
            MonsterSpec::new("Goblin", 30, "1F47E"),
            MonsterSpec::new("Orc", 40, "1F479"),
            MonsterSpec::new("Troll", 60, "1F47A"),
            MonsterSpec::new("Dragon", 80, "1F409"),
        ]
    })
}
