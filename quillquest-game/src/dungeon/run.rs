use log::{debug, info};
use std::collections::BTreeSet;
use std::time::Duration;

use super::graph::{DungeonError, DungeonGraph, NodeId};
use crate::config::DungeonTiming;
use crate::timer::{Scheduler, TimerId, TimerSlot, format_clock};
use crate::view::TileView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DungeonPhase {
    AwaitingChoice,
    InRoomWork,
    InCorridorRest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DungeonEvent {
    Moved { to: NodeId },
    WorkStarted { secs: u32 },
    RestStarted { secs: u32 },
    ChoiceOpened { selectable: Vec<NodeId> },
    /// The rest phase ended and no unvisited neighbour is left.
    Exhausted,
}

/// Walks a [`DungeonGraph`] one tile at a time, each move gated behind a
/// work phase followed by a rest phase.
#[derive(Debug)]
pub struct DungeonRun<S: Scheduler> {
    graph: DungeonGraph,
    timing: DungeonTiming,
    tick_interval: Duration,
    scheduler: S,
    slot: TimerSlot,
    phase: DungeonPhase,
    location: NodeId,
    visited: BTreeSet<NodeId>,
    selectable: BTreeSet<NodeId>,
    remaining: u32,
    events: Vec<DungeonEvent>,
}

impl<S: Scheduler> DungeonRun<S> {
    /// Place the player on the start room and begin its work phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph does not validate.
    pub fn start(
        graph: DungeonGraph,
        timing: DungeonTiming,
        tick_interval: Duration,
        scheduler: S,
    ) -> Result<Self, DungeonError> {
        graph.validate()?;
        let location = graph.start_room_id.clone();
        let mut run = Self {
            graph,
            timing,
            tick_interval,
            scheduler,
            slot: TimerSlot::new(),
            phase: DungeonPhase::AwaitingChoice,
            location: location.clone(),
            visited: BTreeSet::new(),
            selectable: BTreeSet::new(),
            remaining: 0,
            events: Vec::new(),
        };
        run.enter(location);
        Ok(run)
    }

    #[must_use]
    pub const fn phase(&self) -> DungeonPhase {
        self.phase
    }

    #[must_use]
    pub const fn location(&self) -> &NodeId {
        &self.location
    }

    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn remaining_clock(&self) -> String {
        format_clock(i64::from(self.remaining))
    }

    #[must_use]
    pub const fn visited(&self) -> &BTreeSet<NodeId> {
        &self.visited
    }

    #[must_use]
    pub const fn selectable(&self) -> &BTreeSet<NodeId> {
        &self.selectable
    }

    #[must_use]
    pub const fn graph(&self) -> &DungeonGraph {
        &self.graph
    }

    pub fn drain_events(&mut self) -> Vec<DungeonEvent> {
        std::mem::take(&mut self.events)
    }

    /// Move to a highlighted tile. Anything else is ignored.
    pub fn choose(&mut self, id: &NodeId) -> bool {
        if self.phase != DungeonPhase::AwaitingChoice || !self.selectable.contains(id) {
            debug!("ignoring dungeon choice {id}");
            return false;
        }
        self.selectable.clear();
        self.enter(id.clone());
        true
    }

    /// Feed a scheduler firing. Firings from other timers are dropped.
    pub fn on_timer(&mut self, id: TimerId) -> bool {
        if !self.slot.owns(id) {
            return false;
        }
        self.tick();
        true
    }

    /// One second of the current phase.
    pub fn tick(&mut self) {
        if self.phase == DungeonPhase::AwaitingChoice {
            return;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return;
        }
        match self.phase {
            DungeonPhase::InRoomWork => self.begin_rest(),
            DungeonPhase::InCorridorRest => self.open_choice(),
            DungeonPhase::AwaitingChoice => {}
        }
    }

    /// Per-tile flags for drawing the map.
    #[must_use]
    pub fn tiles(&self) -> Vec<TileView> {
        self.graph
            .tile_ids()
            .filter_map(|id| {
                let tile = self.graph.tile(id)?;
                let visited = self.visited.contains(id);
                Some(TileView {
                    id: id.clone(),
                    coords: tile.coords(),
                    visited,
                    selectable: self.selectable.contains(id),
                    player_here: &self.location == id,
                    icon: visited.then_some(tile.content()),
                })
            })
            .collect()
    }

    /// Cancel the phase timer.
    pub fn dispose(&mut self) {
        self.slot.cancel(&mut self.scheduler);
    }

    fn enter(&mut self, id: NodeId) {
        if self.visited.insert(id.clone()) {
            debug!("revealed {id}");
        }
        self.location = id.clone();
        self.events.push(DungeonEvent::Moved { to: id });
        self.phase = DungeonPhase::InRoomWork;
        self.remaining = self.timing.work_secs;
        self.slot.rearm(&mut self.scheduler, self.tick_interval);
        self.events.push(DungeonEvent::WorkStarted {
            secs: self.timing.work_secs,
        });
    }

    fn begin_rest(&mut self) {
        self.phase = DungeonPhase::InCorridorRest;
        self.remaining = self.timing.rest_secs;
        self.slot.rearm(&mut self.scheduler, self.tick_interval);
        self.events.push(DungeonEvent::RestStarted {
            secs: self.timing.rest_secs,
        });
    }

    fn open_choice(&mut self) {
        self.slot.cancel(&mut self.scheduler);
        self.phase = DungeonPhase::AwaitingChoice;
        self.selectable = self
            .graph
            .neighbors(&self.location)
            .into_iter()
            .filter(|id| !self.visited.contains(id))
            .collect();
        if self.selectable.is_empty() {
            info!("dungeon exhausted at {}", self.location);
            self.events.push(DungeonEvent::Exhausted);
        } else {
            self.events.push(DungeonEvent::ChoiceOpened {
                selectable: self.selectable.iter().cloned().collect(),
            });
        }
    }
}

impl<S: Scheduler> Drop for DungeonRun<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualScheduler;

    fn short_timing() -> DungeonTiming {
        DungeonTiming {
            work_secs: 3,
            rest_secs: 2,
        }
    }

    fn finish_phases(run: &mut DungeonRun<ManualScheduler>) {
        for _ in 0..5 {
            run.tick();
        }
    }

    #[test]
    fn starts_working_in_start_room() {
        let scheduler = ManualScheduler::new();
        let run = DungeonRun::start(
            DungeonGraph::default_map(),
            DungeonTiming::default(),
            Duration::from_secs(1),
            scheduler.clone(),
        )
        .unwrap();
        assert_eq!(run.phase(), DungeonPhase::InRoomWork);
        assert_eq!(run.remaining(), 1800);
        assert_eq!(run.location().as_str(), "room_1");
        assert_eq!(scheduler.armed_count(), 1);
    }

    #[test]
    fn work_then_rest_then_choice() {
        let scheduler = ManualScheduler::new();
        let mut run = DungeonRun::start(
            DungeonGraph::default_map(),
            short_timing(),
            Duration::from_secs(1),
            scheduler.clone(),
        )
        .unwrap();
        let work_timer = scheduler.armed()[0];
        for _ in 0..3 {
            assert!(run.on_timer(work_timer));
        }
        assert_eq!(run.phase(), DungeonPhase::InCorridorRest);
        assert!(scheduler.was_disarmed(work_timer));
        assert!(!run.on_timer(work_timer));

        run.tick();
        run.tick();
        assert_eq!(run.phase(), DungeonPhase::AwaitingChoice);
        assert_eq!(scheduler.armed_count(), 0);
        let selectable: Vec<&str> = run.selectable().iter().map(NodeId::as_str).collect();
        assert_eq!(selectable, vec!["A1"]);
    }

    #[test]
    fn invalid_choices_are_silently_rejected() {
        let mut run = DungeonRun::start(
            DungeonGraph::default_map(),
            short_timing(),
            Duration::from_secs(1),
            ManualScheduler::new(),
        )
        .unwrap();
        assert!(!run.choose(&"A1".into()));
        finish_phases(&mut run);
        assert!(!run.choose(&"A2".into()));
        assert!(!run.choose(&"room_1".into()));
        assert!(run.choose(&"A1".into()));
        assert_eq!(run.phase(), DungeonPhase::InRoomWork);

        finish_phases(&mut run);
        let selectable: Vec<&str> = run.selectable().iter().map(NodeId::as_str).collect();
        assert_eq!(selectable, vec!["A2"]);
    }

    #[test]
    fn walking_to_the_end_exhausts_the_map() {
        let mut run = DungeonRun::start(
            DungeonGraph::default_map(),
            short_timing(),
            Duration::from_secs(1),
            ManualScheduler::new(),
        )
        .unwrap();
        finish_phases(&mut run);
        for step in ["A1", "A2", "A3", "room_2", "B1", "B2", "B3", "room_3"] {
            assert!(run.choose(&step.into()), "could not move to {step}");
            finish_phases(&mut run);
        }
        let events = run.drain_events();
        assert_eq!(events.last(), Some(&DungeonEvent::Exhausted));
        assert_eq!(run.visited().len(), 9);
        assert!(run.tiles().iter().all(|t| t.visited && t.icon.is_some()));
    }
}
