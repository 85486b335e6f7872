use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Id of a room or corridor section (corridors themselves are not tiles).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileContent {
    Empty,
    Battle,
    Curio,
    Trap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Start,
    #[default]
    Standard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "type", default)]
    pub kind: RoomKind,
    pub content: TileContent,
    /// Direction to corridor id.
    #[serde(default)]
    pub connections: BTreeMap<Direction, NodeId>,
    pub coords: [u16; 2],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: NodeId,
    pub content: TileContent,
    pub coords: [u16; 2],
}

/// Ordered chain of sections running from one room to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corridor {
    pub from: NodeId,
    pub to: NodeId,
    pub sections: Vec<Section>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DungeonError {
    #[error("start room `{0}` does not exist")]
    MissingStart(NodeId),
    #[error("room `{room}` connects to unknown corridor `{corridor}`")]
    UnknownCorridor { room: NodeId, corridor: NodeId },
    #[error("corridor `{corridor}` ends at unknown room `{room}`")]
    UnknownRoom { corridor: NodeId, room: NodeId },
    #[error("room `{room}` connects to corridor `{corridor}`, which does not touch it")]
    DetachedConnection { room: NodeId, corridor: NodeId },
    #[error("corridor `{0}` has no sections")]
    EmptyCorridor(NodeId),
    #[error("node id `{0}` is used more than once")]
    DuplicateNode(NodeId),
    #[error("dungeon map is not valid JSON: {0}")]
    Parse(String),
}

/// A tile looked up by id.
#[derive(Debug, Clone, Copy)]
pub enum Tile<'a> {
    Room(&'a Room),
    Section {
        corridor: &'a Corridor,
        index: usize,
        section: &'a Section,
    },
}

impl Tile<'_> {
    #[must_use]
    pub const fn content(&self) -> TileContent {
        match self {
            Self::Room(room) => room.content,
            Self::Section { section, .. } => section.content,
        }
    }

    #[must_use]
    pub const fn coords(&self) -> [u16; 2] {
        match self {
            Self::Room(room) => room.coords,
            Self::Section { section, .. } => section.coords,
        }
    }
}

pub type Neighbors = SmallVec<[NodeId; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonGraph {
    pub start_room_id: NodeId,
    pub rooms: BTreeMap<NodeId, Room>,
    pub corridors: BTreeMap<NodeId, Corridor>,
}

impl DungeonGraph {
    /// Parse and validate a map document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the graph is inconsistent.
    pub fn from_json(json: &str) -> Result<Self, DungeonError> {
        let graph: Self =
            serde_json::from_str(json).map_err(|err| DungeonError::Parse(err.to_string()))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Three rooms joined by two three-section corridors.
    #[must_use]
    pub fn default_map() -> Self {
        fn room(kind: RoomKind, content: TileContent, links: &[(Direction, &str)], x: u16) -> Room {
            Room {
                kind,
                content,
                connections: links.iter().map(|(d, c)| (*d, NodeId::from(*c))).collect(),
                coords: [x, 4],
            }
        }
        fn corridor(
            from: &str,
            to: &str,
            prefix: char,
            start_x: u16,
            contents: [TileContent; 3],
        ) -> Corridor {
            Corridor {
                from: from.into(),
                to: to.into(),
                sections: contents
                    .into_iter()
                    .zip(0_u16..)
                    .map(|(content, n)| Section {
                        id: NodeId(format!("{prefix}{}", n + 1)),
                        content,
                        coords: [start_x + n, 4],
                    })
                    .collect(),
            }
        }

        use Direction::{East, West};
        use TileContent::{Battle, Curio, Empty, Trap};
        let rooms = BTreeMap::from([
            ("room_1".into(), room(RoomKind::Start, Empty, &[(East, "corridor_A")], 2)),
            (
                "room_2".into(),
                room(RoomKind::Standard, Battle, &[(West, "corridor_A"), (East, "corridor_B")], 6),
            ),
            ("room_3".into(), room(RoomKind::Standard, Curio, &[(West, "corridor_B")], 10)),
        ]);
        let corridors = BTreeMap::from([
            ("corridor_A".into(), corridor("room_1", "room_2", 'A', 3, [Empty, Trap, Empty])),
            ("corridor_B".into(), corridor("room_2", "room_3", 'B', 7, [Empty, Curio, Empty])),
        ]);
        Self {
            start_room_id: "room_1".into(),
            rooms,
            corridors,
        }
    }

    /// Check that every reference resolves and every tile id is unique.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), DungeonError> {
        if !self.rooms.contains_key(&self.start_room_id) {
            return Err(DungeonError::MissingStart(self.start_room_id.clone()));
        }
        let mut seen: BTreeSet<&NodeId> = self.rooms.keys().collect();
        for (corridor_id, corridor) in &self.corridors {
            for end in [&corridor.from, &corridor.to] {
                if !self.rooms.contains_key(end) {
                    return Err(DungeonError::UnknownRoom {
                        corridor: corridor_id.clone(),
                        room: end.clone(),
                    });
                }
            }
            if corridor.sections.is_empty() {
                return Err(DungeonError::EmptyCorridor(corridor_id.clone()));
            }
            for section in &corridor.sections {
                if !seen.insert(&section.id) {
                    return Err(DungeonError::DuplicateNode(section.id.clone()));
                }
            }
        }
        for (room_id, room) in &self.rooms {
            for corridor_id in room.connections.values() {
                let Some(corridor) = self.corridors.get(corridor_id) else {
                    return Err(DungeonError::UnknownCorridor {
                        room: room_id.clone(),
                        corridor: corridor_id.clone(),
                    });
                };
                if &corridor.from != room_id && &corridor.to != room_id {
                    return Err(DungeonError::DetachedConnection {
                        room: room_id.clone(),
                        corridor: corridor_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn tile(&self, id: &NodeId) -> Option<Tile<'_>> {
        if let Some(room) = self.rooms.get(id) {
            return Some(Tile::Room(room));
        }
        self.corridors.values().find_map(|corridor| {
            corridor
                .sections
                .iter()
                .position(|s| &s.id == id)
                .map(|index| Tile::Section {
                    corridor,
                    index,
                    section: &corridor.sections[index],
                })
        })
    }

    /// Every tile id in drawing order: rooms, then corridor sections.
    pub fn tile_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.rooms.keys().chain(
            self.corridors
                .values()
                .flat_map(|corridor| corridor.sections.iter().map(|s| &s.id)),
        )
    }

    /// Tiles reachable in one step.
    ///
    /// From a room: the nearest section of each connected corridor (its first
    /// section when the room is the corridor's `from` end, its last when it is
    /// the `to` end). From a section: its neighbours in the chain, plus the
    /// bounding room at either end.
    #[must_use]
    pub fn neighbors(&self, id: &NodeId) -> Neighbors {
        let mut out = Neighbors::new();
        let mut push = |node: &NodeId| {
            if !out.contains(node) {
                out.push(node.clone());
            }
        };
        match self.tile(id) {
            Some(Tile::Room(room)) => {
                for corridor in room.connections.values().filter_map(|c| self.corridors.get(c)) {
                    let nearest = if &corridor.from == id {
                        corridor.sections.first()
                    } else {
                        corridor.sections.last()
                    };
                    if let Some(section) = nearest {
                        push(&section.id);
                    }
                }
            }
            Some(Tile::Section {
                corridor, index, ..
            }) => {
                match index.checked_sub(1) {
                    Some(prev) => push(&corridor.sections[prev].id),
                    None => push(&corridor.from),
                }
                match corridor.sections.get(index + 1) {
                    Some(next) => push(&next.id),
                    None => push(&corridor.to),
                }
            }
            None => {}
        }
        out
    }
}
