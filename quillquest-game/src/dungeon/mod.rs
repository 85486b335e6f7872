//! Dungeon traversal: a room and corridor graph walked under a work/rest gate.

mod graph;
mod run;

pub use graph::{
    Corridor, Direction, DungeonError, DungeonGraph, Neighbors, NodeId, Room, RoomKind, Section,
    Tile, TileContent,
};
pub use run::{DungeonEvent, DungeonPhase, DungeonRun};
