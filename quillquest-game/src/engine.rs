//! The essay timer engine.
//!
//! [`EssayTimer`] owns every piece of runtime state and its collaborators: a
//! [`KeyValueStore`] scoped to the signed-in user, a [`Clock`] and a
//! [`Scheduler`]. It has an explicit lifecycle (`create`, `on_timer`/`tick`,
//! `dispose`) and reports everything a host has to show through
//! [`EngineEvent`]s. Dialogs never run inside a transition: the engine queues
//! [`EngineEvent::CycleDecisionRequired`] and waits for
//! [`EssayTimer::resolve_cycle`].

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;

use crate::bestiary::default_roster;
use crate::clock::Clock;
use crate::companion::{Companion, CompanionRoster, DamageOutcome};
use crate::config::TimerConfig;
use crate::constants::TEMPLATE_DEFAULT;
use crate::daily::DailySessionCounter;
use crate::debounce::SaveDebouncer;
use crate::edit::EditSession;
use crate::error::EngineResult;
use crate::events::EngineEvent;
use crate::mission::{
    MissionAdvance, MissionCatalog, MissionRun, RoomSpec, RoomStep, generate_mission,
};
use crate::sequencer::{
    CycleChoice, Phase, StageCompletion, StageEntry, StageRemoval, StageSequencer, TickOutcome,
};
use crate::session::{RuntimeState, SessionStore};
use crate::stage::StageDefinition;
use crate::template::{SavedTemplate, TemplateCatalog};
use crate::timer::{Scheduler, TimerId, TimerSlot, format_clock};
use crate::view::{self, CompanionHud, StageView};
use crate::{Interaction, KeyValueStore};

const CYCLE_QUESTION: &str = "You completed a cycle! Do you want to start again?";

pub struct EssayTimer<S, C, T>
where
    S: KeyValueStore,
    C: Clock,
    T: Scheduler,
{
    store: S,
    clock: C,
    scheduler: T,
    config: TimerConfig,
    sequencer: StageSequencer,
    tick_slot: TimerSlot,
    overlay_slot: TimerSlot,
    debounce: SaveDebouncer,
    daily: DailySessionCounter,
    templates: TemplateCatalog,
    missions: MissionCatalog,
    companions: CompanionRoster,
    mission: Option<MissionRun>,
    session_name: Option<String>,
    template_key: Option<String>,
    notes: String,
    edit: Option<EditSession>,
    events: Vec<EngineEvent>,
}

impl<S, C, T> EssayTimer<S, C, T>
where
    S: KeyValueStore,
    C: Clock,
    T: Scheduler,
{
    /// Build an engine, seeding built-in content and restoring the companion
    /// and today's counter from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the store fails.
    pub fn create(store: S, clock: C, scheduler: T, config: TimerConfig) -> EngineResult<Self> {
        config.validate()?;
        let templates = TemplateCatalog::load_or_seed(&store)?;
        let missions = MissionCatalog::load_or_seed(&store)?;
        let companions = CompanionRoster::restore(&store, default_roster().to_vec())?;
        let daily = DailySessionCounter::load(&store, clock.today())?;

        let template_key = templates
            .get(TEMPLATE_DEFAULT)
            .map(|_| TEMPLATE_DEFAULT.to_string())
            .or_else(|| templates.keys().next().map(str::to_string));
        let stages = template_key
            .as_deref()
            .and_then(|key| templates.get(key))
            .map(|template| template.instantiate())
            .unwrap_or_default();

        let mut engine = Self {
            debounce: SaveDebouncer::new(config.save_quiet_ms),
            store,
            clock,
            scheduler,
            config,
            sequencer: StageSequencer::new(stages),
            tick_slot: TimerSlot::new(),
            overlay_slot: TimerSlot::new(),
            daily,
            templates,
            missions,
            companions,
            mission: None,
            session_name: None,
            template_key,
            notes: String::new(),
            edit: None,
            events: Vec::new(),
        };
        if let Some(companion) = engine.companions.current() {
            let event = EngineEvent::CompanionLoaded {
                name: companion.name.clone(),
                max_hp: companion.max_hp,
            };
            engine.events.push(event);
        }
        info!("engine created with template {:?}", engine.template_key);
        Ok(engine)
    }

    #[must_use]
    pub const fn sequencer(&self) -> &StageSequencer {
        &self.sequencer
    }

    #[must_use]
    pub const fn config(&self) -> &TimerConfig {
        &self.config
    }

    #[must_use]
    pub fn session_name(&self) -> Option<&str> {
        self.session_name.as_deref()
    }

    #[must_use]
    pub fn template_key(&self) -> Option<&str> {
        self.template_key.as_deref()
    }

    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }

    #[must_use]
    pub const fn daily(&self) -> &DailySessionCounter {
        &self.daily
    }

    #[must_use]
    pub const fn companion(&self) -> Option<&Companion> {
        self.companions.current()
    }

    #[must_use]
    pub const fn active_mission(&self) -> Option<&MissionRun> {
        self.mission.as_ref()
    }

    #[must_use]
    pub const fn is_editing(&self) -> bool {
        self.edit.is_some()
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn is_ticking(&self) -> bool {
        self.tick_slot.is_armed()
    }

    #[must_use]
    pub const fn save_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Dispatch a scheduler firing. Returns `false` for stale ids.
    ///
    /// # Errors
    ///
    /// Returns an error if a resulting write fails.
    pub fn on_timer(&mut self, id: TimerId) -> EngineResult<bool> {
        if self.tick_slot.owns(id) {
            self.tick()?;
            Ok(true)
        } else if self.overlay_slot.owns(id) {
            self.refresh_overlay();
            Ok(true)
        } else {
            debug!("dropping stale firing {id}");
            Ok(false)
        }
    }

    /// One second of session time.
    ///
    /// # Errors
    ///
    /// Returns an error if the daily counter cannot be flushed.
    pub fn tick(&mut self) -> EngineResult<()> {
        let outcome = self.sequencer.tick();
        if !outcome.counted() {
            return Ok(());
        }
        if self
            .daily
            .tick(self.clock.today(), self.config.daily_flush_every)
        {
            self.daily.save(&self.store)?;
        }
        if let TickOutcome::Completed { completed, entry } = outcome {
            self.stage_completed(&completed)?;
            self.stage_entered(entry);
        }
        self.request_save();
        Ok(())
    }

    /// Write a debounced save whose quiet window has passed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn poll(&mut self) -> EngineResult<bool> {
        if self.debounce.take_due(self.clock.now_millis()) {
            self.save_now()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Millisecond deadline of the pending save, for hosts that sleep until it.
    #[must_use]
    pub const fn save_deadline(&self) -> Option<i64> {
        self.debounce.deadline()
    }

    /// Show or hide the floating overlay; its refresh timer is independent of
    /// the countdown.
    pub fn set_page_hidden(&mut self, hidden: bool) {
        if hidden {
            self.overlay_slot
                .rearm(&mut self.scheduler, self.config.tick_interval());
            self.refresh_overlay();
        } else {
            self.overlay_slot.cancel(&mut self.scheduler);
        }
    }

    /// Cancel both timers and flush any pending save.
    ///
    /// # Errors
    ///
    /// Returns an error if the final write fails.
    pub fn dispose(&mut self) -> EngineResult<()> {
        self.tick_slot.cancel(&mut self.scheduler);
        self.overlay_slot.cancel(&mut self.scheduler);
        self.flush()
    }

    /// Drain events, forwarding alerts and answering cycle decisions through
    /// the host's dialogs. Returns every event handled.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving a decision fails to persist.
    pub fn pump<I: Interaction + ?Sized>(&mut self, ui: &mut I) -> EngineResult<Vec<EngineEvent>> {
        let mut handled = Vec::new();
        loop {
            let batch = self.drain_events();
            if batch.is_empty() {
                return Ok(handled);
            }
            for event in batch {
                if let Some(message) = event.message() {
                    ui.notify(&message);
                }
                let decide = event == EngineEvent::CycleDecisionRequired;
                handled.push(event);
                if decide {
                    let restart = ui.confirm(CYCLE_QUESTION);
                    self.resolve_cycle(restart)?;
                }
            }
        }
    }

    /// Start the loaded session, or resume it if paused.
    ///
    /// # Errors
    ///
    /// Returns an error if the save request cannot be served.
    pub fn start(&mut self) -> EngineResult<bool> {
        if self.blocked_by_edit() {
            return Ok(false);
        }
        if self.session_name.is_none() {
            self.notice("Please start a new session or load a saved one.");
            return Ok(false);
        }
        if self.sequencer.stages().is_empty() {
            self.notice("The session has no stages.");
            return Ok(false);
        }
        let entry = self.sequencer.start();
        if self.sequencer.wants_ticks() && !self.tick_slot.is_armed() {
            self.tick_slot
                .rearm(&mut self.scheduler, self.config.tick_interval());
        }
        if let Some(entry) = entry {
            self.stage_entered(entry);
        }
        self.request_save();
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns an error if the save request cannot be served.
    pub fn resume(&mut self) -> EngineResult<bool> {
        self.start()
    }

    /// Freeze the countdown, persisting the session and today's counter now.
    ///
    /// # Errors
    ///
    /// Returns an error if either write fails.
    pub fn pause(&mut self) -> EngineResult<bool> {
        if self.blocked_by_edit() || !self.sequencer.pause() {
            return Ok(false);
        }
        self.tick_slot.cancel(&mut self.scheduler);
        self.save_now()?;
        self.daily.save(&self.store)?;
        Ok(true)
    }

    /// Rewind to the first stage. A full reset also clears notes and the
    /// pomodoro count and reloads the active template.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be saved.
    pub fn reset(&mut self, full: bool) -> EngineResult<bool> {
        if self.blocked_by_edit() {
            return Ok(false);
        }
        self.reset_inner(full)?;
        Ok(true)
    }

    fn reset_inner(&mut self, full: bool) -> EngineResult<()> {
        self.tick_slot.cancel(&mut self.scheduler);
        if full {
            self.notes.clear();
            if let Some(template) = self
                .template_key
                .as_deref()
                .and_then(|key| self.templates.get(key))
            {
                self.sequencer.replace_stages(template.instantiate());
            }
        }
        self.sequencer.reset(full);
        debug!("reset (full: {full})");
        if self.session_name.is_some() {
            self.save_now()?;
        }
        Ok(())
    }

    /// Answer a pending cycle-complete decision.
    ///
    /// # Errors
    ///
    /// Returns an error if the save request cannot be served.
    pub fn resolve_cycle(&mut self, restart: bool) -> EngineResult<bool> {
        let Some(entry) = self.sequencer.resolve_cycle(CycleChoice::from(restart)) else {
            return Ok(false);
        };
        if restart {
            info!("cycle restarted");
            self.events.push(EngineEvent::CycleRestarted);
        }
        self.stage_entered(entry);
        if !self.sequencer.wants_ticks() {
            self.tick_slot.cancel(&mut self.scheduler);
        }
        self.request_save();
        Ok(true)
    }

    /// Name a fresh session, register it, and start it from the active
    /// template.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn start_new_session(&mut self, name: &str) -> EngineResult<bool> {
        if self.blocked_by_edit() {
            return Ok(false);
        }
        let name = name.trim();
        if name.is_empty() {
            self.notice("Please enter a name for your session.");
            return Ok(false);
        }
        if SessionStore::<S>::is_reserved(name) {
            warn!("rejected reserved session name `{name}`");
            self.notice(&format!("`{name}` is a reserved name."));
            return Ok(false);
        }
        self.flush()?;
        SessionStore::new(&self.store).register(name)?;
        self.session_name = Some(name.to_string());
        info!("new session `{name}`");
        self.reset_inner(true)?;
        self.start()
    }

    /// Restore a saved session verbatim, resuming its tick if it was running.
    /// Unknown names are a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn load_session(&mut self, name: &str) -> EngineResult<bool> {
        if self.blocked_by_edit() {
            return Ok(false);
        }
        let Some(state) = SessionStore::new(&self.store).load(name)? else {
            debug!("no saved session `{name}`");
            return Ok(false);
        };
        self.flush()?;
        self.tick_slot.cancel(&mut self.scheduler);
        self.session_name = Some(name.to_string());
        self.template_key = state.template_key.clone();
        self.notes.clone_from(&state.notes);
        self.sequencer = state.restore();
        if self.sequencer.wants_ticks() {
            self.tick_slot
                .rearm(&mut self.scheduler, self.config.tick_interval());
        }
        if self.sequencer.phase() == Phase::AwaitingCycleDecision {
            self.events.push(EngineEvent::CycleDecisionRequired);
        }
        info!(
            "loaded session `{name}` at stage {} ({:?})",
            self.sequencer.index(),
            self.sequencer.phase()
        );
        Ok(true)
    }

    /// Detach from the current session without deleting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending save cannot be flushed.
    pub fn close_session(&mut self) -> EngineResult<()> {
        self.flush()?;
        self.session_name = None;
        self.reset_inner(false)
    }

    /// Remove a saved session and its index entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn delete_session(&mut self, name: &str) -> EngineResult<bool> {
        if self.blocked_by_edit() {
            return Ok(false);
        }
        if self.session_name.as_deref() == Some(name) {
            self.debounce.cancel();
            self.session_name = None;
            self.reset_inner(false)?;
        }
        SessionStore::new(&self.store).delete(name)?;
        Ok(true)
    }

    /// Ask for confirmation, then delete.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn delete_session_with<I: Interaction + ?Sized>(
        &mut self,
        ui: &mut I,
        name: &str,
    ) -> EngineResult<bool> {
        let question =
            format!("Are you sure you want to delete \"{name}\"? This cannot be undone.");
        if name.is_empty() || !ui.confirm(&question) {
            return Ok(false);
        }
        self.delete_session(name)
    }

    /// Saved session names with their last save time.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn saved_sessions(&self) -> EngineResult<Vec<(String, Option<DateTime<Utc>>)>> {
        SessionStore::new(&self.store).listing()
    }

    pub fn set_notes(&mut self, notes: &str) {
        notes.clone_into(&mut self.notes);
        self.request_save();
    }

    /// Write the session now, dropping any pending debounced write.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_now(&mut self) -> EngineResult<()> {
        self.debounce.cancel();
        let Some(name) = self.session_name.clone() else {
            return Ok(());
        };
        let state = RuntimeState::capture(
            &self.sequencer,
            self.template_key.as_deref(),
            &self.notes,
            self.clock.now(),
        );
        SessionStore::new(&self.store).save(&name, &state)?;
        self.events.push(EngineEvent::SessionSaved { name });
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn flush(&mut self) -> EngineResult<()> {
        if self.debounce.is_pending() {
            self.save_now()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn template_entries(&self) -> Vec<(String, String)> {
        self.templates.entries()
    }

    /// Adopt a copy of a template's stages and rewind. Unknown keys are a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be saved.
    pub fn select_template(&mut self, key: &str) -> EngineResult<bool> {
        if self.blocked_by_edit() {
            return Ok(false);
        }
        let Some(template) = self.templates.get(key) else {
            return Ok(false);
        };
        self.sequencer.replace_stages(template.instantiate());
        self.template_key = Some(key.to_string());
        self.reset_inner(false)?;
        Ok(true)
    }

    /// Snapshot the stage list and lock the session controls.
    pub fn enter_edit_mode(&mut self) {
        if self.edit.is_none() {
            self.edit = Some(EditSession::begin(&self.sequencer));
        }
    }

    /// Insert a stage before the extra stage. Blank labels abort.
    pub fn add_stage(&mut self, label: Option<&str>, minutes: Option<&str>) -> bool {
        if !self.require_edit() {
            return false;
        }
        let Some(stage) = EditSession::draft_stage(
            label,
            minutes,
            self.clock.now_millis(),
            self.sequencer.stages(),
        ) else {
            return false;
        };
        debug!("adding stage `{}`", stage.id);
        self.sequencer.insert_stage(stage);
        true
    }

    /// Prompt for a label and a duration, then insert.
    pub fn add_stage_with<I: Interaction + ?Sized>(&mut self, ui: &mut I) -> bool {
        if !self.require_edit() {
            return false;
        }
        let Some(label) = ui.prompt_text("Name of the new stage:", "New Stage") else {
            return false;
        };
        if label.trim().is_empty() {
            return false;
        }
        let minutes = ui.prompt_text(&format!("Duration of \"{label}\" in minutes:"), "10");
        self.add_stage(Some(&label), minutes.as_deref())
    }

    pub fn delete_stage(&mut self, id: &str) -> bool {
        if !self.require_edit() {
            return false;
        }
        match self.sequencer.remove_stage(id) {
            StageRemoval::Missing => false,
            StageRemoval::Removed => true,
            StageRemoval::ActiveReplaced(entry) => {
                self.note_cursor_moved();
                self.stage_entered(entry);
                true
            }
            StageRemoval::Emptied => {
                self.note_cursor_moved();
                self.tick_slot.cancel(&mut self.scheduler);
                true
            }
        }
    }

    /// Change a stage's length; a live countdown on it shifts by the delta.
    pub fn set_stage_duration(&mut self, id: &str, minutes: u32) -> bool {
        if !self.require_edit() {
            return false;
        }
        let active = self.sequencer.is_started()
            && self.sequencer.current_stage().is_some_and(|stage| stage.id == id);
        let changed = self.sequencer.set_stage_minutes(id, minutes);
        if changed && active {
            self.note_cursor_moved();
        }
        if changed {
            self.request_save();
        }
        changed
    }

    /// Leave edit mode keeping the edits, optionally storing them as a
    /// template named `template_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be stored.
    pub fn commit_edit(
        &mut self,
        template_name: Option<&str>,
    ) -> EngineResult<Option<SavedTemplate>> {
        if self.edit.take().is_none() {
            return Ok(None);
        }
        self.request_save();
        let Some(name) = template_name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        let saved = self
            .templates
            .save(&self.store, name, self.sequencer.stages())?;
        if saved.replaced {
            warn!("template `{}` overwritten", saved.key);
        }
        self.template_key = Some(saved.key.clone());
        self.events.push(EngineEvent::TemplateSaved {
            key: saved.key.clone(),
            replaced: saved.replaced,
        });
        Ok(Some(saved))
    }

    /// Prompt for a template name and commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be stored.
    pub fn save_template_with<I: Interaction + ?Sized>(
        &mut self,
        ui: &mut I,
    ) -> EngineResult<Option<SavedTemplate>> {
        if self.edit.is_none() {
            return Ok(None);
        }
        let name = ui.prompt_text("Save template as:", "My Custom Template");
        self.commit_edit(name.as_deref())
    }

    /// Leave edit mode restoring the stage list and cursor captured on entry.
    pub fn cancel_edit(&mut self) {
        let Some(edit) = self.edit.take() else {
            return;
        };
        edit.rollback(&mut self.sequencer);
        if !self.sequencer.wants_ticks() {
            self.tick_slot.cancel(&mut self.scheduler);
        } else if !self.tick_slot.is_armed() {
            self.tick_slot
                .rearm(&mut self.scheduler, self.config.tick_interval());
        }
        self.request_save();
    }

    /// Hit the current companion, advancing to the next opponent or mission
    /// room when it falls.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn apply_damage(&mut self, amount: u32) -> EngineResult<DamageOutcome> {
        let outcome = self.companions.apply_damage(&self.store, amount)?;
        match &outcome {
            DamageOutcome::NoCompanion | DamageOutcome::AlreadyDefeated { .. } => {}
            DamageOutcome::Wounded { name, hp, max_hp } => {
                self.events.push(EngineEvent::CompanionDamaged {
                    name: name.clone(),
                    hp: *hp,
                    max_hp: *max_hp,
                });
            }
            DamageOutcome::Defeated { name } => {
                info!("{name} defeated");
                self.events.push(EngineEvent::CompanionDamaged {
                    name: name.clone(),
                    hp: 0,
                    max_hp: self.companions.current().map_or(0, |c| c.max_hp),
                });
                self.events
                    .push(EngineEvent::CompanionDefeated { name: name.clone() });
                self.advance_companion()?;
            }
        }
        Ok(outcome)
    }

    #[must_use]
    pub fn mission_entries(&self) -> Vec<(String, String)> {
        self.missions.entries()
    }

    /// Activate a stored mission and walk to its first monster. `None` or an
    /// empty key clears the active mission; unknown keys are a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if loading an opponent fails to persist.
    pub fn select_mission(&mut self, key: Option<&str>) -> EngineResult<bool> {
        let Some(key) = key.filter(|k| !k.is_empty()) else {
            self.mission = None;
            return Ok(true);
        };
        let Some(mission) = self.missions.get(key).cloned() else {
            return Ok(false);
        };
        info!("mission `{key}` started");
        self.events.push(EngineEvent::MissionStarted {
            key: key.to_string(),
            name: mission.name.clone(),
        });
        let mut run = MissionRun::new(key, mission);
        let advance = run.walk();
        self.mission = Some(run);
        self.apply_mission_advance(advance)?;
        Ok(true)
    }

    /// Generate, store and activate a random mission. A blank name aborts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn create_mission<R: Rng + ?Sized>(
        &mut self,
        name: &str,
        rooms: &str,
        difficulty: Option<&str>,
        rng: &mut R,
    ) -> EngineResult<Option<String>> {
        let Some((key, mission)) =
            generate_mission(name, rooms, difficulty, self.companions.roster(), rng)
        else {
            return Ok(None);
        };
        self.missions.insert(&self.store, &key, mission)?;
        self.select_mission(Some(&key))?;
        Ok(Some(key))
    }

    /// Prompt for name, room count and difficulty, then create.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn create_mission_with<I, R>(
        &mut self,
        ui: &mut I,
        rng: &mut R,
    ) -> EngineResult<Option<String>>
    where
        I: Interaction + ?Sized,
        R: Rng + ?Sized,
    {
        let Some(name) = ui.prompt_text("Mission name:", "New Mission") else {
            return Ok(None);
        };
        let rooms = ui.prompt_text("Number of rooms:", "3").unwrap_or_default();
        let difficulty = ui.prompt_text("Difficulty (Easy/Normal/Hard):", "Easy");
        self.create_mission(&name, &rooms, difficulty.as_deref(), rng)
    }

    #[must_use]
    pub fn stage_views(&self) -> Vec<StageView> {
        StageView::all(&self.sequencer)
    }

    #[must_use]
    pub fn companion_hud(&self) -> CompanionHud {
        CompanionHud::from_companion(self.companions.current())
    }

    #[must_use]
    pub fn page_title(&self) -> String {
        view::page_title(&self.sequencer)
    }

    #[must_use]
    pub fn total_planned(&self) -> String {
        view::total_planned(&self.sequencer)
    }

    #[must_use]
    pub fn daily_display(&self) -> String {
        self.daily.formatted()
    }

    #[must_use]
    pub fn current_clock(&self) -> String {
        format_clock(self.sequencer.time_left())
    }

    #[must_use]
    pub const fn pomodoros(&self) -> u32 {
        self.sequencer.pomodoros()
    }

    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        self.sequencer.stages()
    }

    fn stage_completed(&mut self, completed: &StageCompletion) -> EngineResult<()> {
        if completed.pomodoro {
            self.events.push(EngineEvent::PomodoroCompleted {
                total: self.sequencer.pomodoros(),
            });
        }
        if !self.config.is_rest_label(&completed.label) {
            self.apply_damage(self.config.damage_per_stage)?;
        }
        self.events.push(EngineEvent::StageCompleted {
            index: completed.index,
            label: completed.label.clone(),
        });
        Ok(())
    }

    fn stage_entered(&mut self, entry: StageEntry) {
        let event = match entry {
            StageEntry::Countdown { index, label, .. } => {
                EngineEvent::StageStarted { index, label }
            }
            StageEntry::Extra { .. } => EngineEvent::ExtraTimeEntered,
            StageEntry::CycleDecision => EngineEvent::CycleDecisionRequired,
            StageEntry::Finished => {
                info!("cycle finished");
                self.tick_slot.cancel(&mut self.scheduler);
                EngineEvent::CycleFinished
            }
        };
        self.events.push(event);
    }

    fn advance_companion(&mut self) -> EngineResult<()> {
        if let Some(run) = self.mission.as_mut() {
            let advance = run.advance();
            return self.apply_mission_advance(advance);
        }
        let event = match self.companions.load_next(&self.store)? {
            Some(next) => EngineEvent::CompanionLoaded {
                name: next.name.clone(),
                max_hp: next.max_hp,
            },
            None => EngineEvent::NoMoreOpponents,
        };
        self.events.push(event);
        Ok(())
    }

    fn apply_mission_advance(&mut self, advance: MissionAdvance) -> EngineResult<()> {
        for room in advance.passed {
            self.events.push(match room {
                RoomSpec::Item { item } => EngineEvent::RoomItemFound { item },
                RoomSpec::Empty | RoomSpec::Monster { .. } => EngineEvent::RoomEmpty,
            });
        }
        match advance.step {
            RoomStep::Encounter { monster_index } => {
                let event = match self.companions.load(&self.store, monster_index)? {
                    Some(monster) => EngineEvent::CompanionLoaded {
                        name: monster.name.clone(),
                        max_hp: monster.max_hp,
                    },
                    None => EngineEvent::NoMoreOpponents,
                };
                self.events.push(event);
            }
            RoomStep::Completed => {
                if let Some(run) = self.mission.take() {
                    info!("mission `{}` completed", run.key());
                    self.events.push(EngineEvent::MissionCompleted {
                        name: run.mission().name.clone(),
                    });
                }
                if self.companions.current().is_some_and(Companion::is_defeated) {
                    self.advance_companion()?;
                }
            }
        }
        Ok(())
    }

    fn refresh_overlay(&mut self) {
        if let Some(text) = view::overlay_text(&self.sequencer) {
            self.events.push(EngineEvent::OverlayRefreshed { text });
        }
    }

    fn request_save(&mut self) {
        if self.session_name.is_some() {
            self.debounce.request(self.clock.now_millis());
        }
    }

    fn notice(&mut self, message: &str) {
        self.events.push(EngineEvent::Notice(message.to_string()));
    }

    fn blocked_by_edit(&mut self) -> bool {
        if self.edit.is_some() {
            debug!("control blocked while editing stages");
            self.notice("Finish editing the stages first.");
            return true;
        }
        false
    }

    fn note_cursor_moved(&mut self) {
        if let Some(edit) = self.edit.as_mut() {
            edit.cursor_moved();
        }
    }

    fn require_edit(&mut self) -> bool {
        if self.edit.is_none() {
            self.notice("Enter edit mode to change the stages.");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptedInteraction;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use crate::timer::ManualScheduler;

    type Engine = EssayTimer<MemoryStore, ManualClock, ManualScheduler>;

    fn engine() -> (Engine, MemoryStore, ManualClock, ManualScheduler) {
        let store = MemoryStore::new();
        let clock = ManualClock::default();
        let scheduler = ManualScheduler::new();
        let engine = EssayTimer::create(
            store.clone(),
            clock.clone(),
            scheduler.clone(),
            TimerConfig::default(),
        )
        .unwrap();
        (engine, store, clock, scheduler)
    }

    #[test]
    fn create_seeds_content_and_loads_first_companion() {
        let (mut engine, store, _, _) = engine();
        assert_eq!(engine.template_key(), Some(TEMPLATE_DEFAULT));
        assert_eq!(engine.stages().len(), 7);
        assert!(store.keys().contains(&"templates".to_string()));
        assert!(store.keys().contains(&"missions".to_string()));
        assert!(matches!(
            engine.drain_events().as_slice(),
            [EngineEvent::CompanionLoaded { max_hp: 20, .. }]
        ));
    }

    #[test]
    fn start_requires_a_session() {
        let (mut engine, _, _, scheduler) = engine();
        assert!(!engine.start().unwrap());
        assert_eq!(scheduler.armed_count(), 0);
        assert!(engine.drain_events().iter().any(|e| matches!(e, EngineEvent::Notice(_))));
    }

    #[test]
    fn pause_cancels_tick_and_saves_immediately() {
        let (mut engine, store, _, scheduler) = engine();
        engine.start_new_session("essay").unwrap();
        assert_eq!(scheduler.armed_count(), 1);
        engine.tick().unwrap();
        assert!(engine.pause().unwrap());
        assert_eq!(scheduler.armed_count(), 0);
        assert!(!engine.save_pending());
        let saved = SessionStore::new(&store).load("essay").unwrap().unwrap();
        assert!(saved.is_running && saved.is_paused);
        assert_eq!(saved.time_left_in_stage, 599);
        assert!(store.get("dailySession").unwrap().is_some());
    }

    #[test]
    fn debounced_saves_coalesce() {
        let (mut engine, store, clock, _) = engine();
        engine.start_new_session("essay").unwrap();
        engine.drain_events();
        for _ in 0..3 {
            clock.advance_millis(500);
            engine.set_notes("thesis");
            assert!(!engine.poll().unwrap());
        }
        clock.advance_millis(1_500);
        assert!(engine.poll().unwrap());
        let saves = engine
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::SessionSaved { .. }))
            .count();
        assert_eq!(saves, 1);
        assert_eq!(SessionStore::new(&store).load("essay").unwrap().unwrap().notes, "thesis");
    }

    #[test]
    fn edit_mode_blocks_controls_and_rolls_back() {
        let (mut engine, _, _, _) = engine();
        engine.start_new_session("essay").unwrap();
        engine.enter_edit_mode();
        assert!(!engine.pause().unwrap());
        assert!(engine.add_stage(Some("Research"), Some("20")));
        assert_eq!(engine.stages().len(), 8);
        assert_eq!(engine.stages()[6].label, "Research");
        engine.cancel_edit();
        assert_eq!(engine.stages().len(), 7);
        assert!(!engine.add_stage(Some("Late"), None));
    }

    #[test]
    fn cancelled_edit_restores_cursor_and_countdown() {
        let (mut engine, _, _, scheduler) = engine();
        engine.start_new_session("essay").unwrap();
        for _ in 0..600 {
            engine.tick().unwrap();
        }
        let cursor = |e: &Engine| {
            let seq = e.sequencer();
            (seq.index(), seq.current_stage().unwrap().id.clone(), seq.time_left())
        };
        assert_eq!(cursor(&engine), (1, "outlining".to_string(), 900));

        engine.enter_edit_mode();
        assert!(engine.delete_stage("brainstorming"));
        engine.tick().unwrap();
        engine.cancel_edit();
        assert_eq!(cursor(&engine), (1, "outlining".to_string(), 899));

        engine.enter_edit_mode();
        assert!(engine.delete_stage("brainstorming"));
        assert!(engine.delete_stage("outlining"));
        assert_eq!(engine.sequencer().current_stage().unwrap().id, "writing-intro");
        engine.tick().unwrap();
        engine.cancel_edit();
        assert_eq!(cursor(&engine), (1, "outlining".to_string(), 899));
        assert_eq!(engine.stages().len(), 7);
        assert!(engine.is_ticking());
        assert_eq!(scheduler.armed_count(), 1);
    }

    #[test]
    fn cancelled_resize_of_active_stage_is_undone() {
        let (mut engine, _, _, _) = engine();
        engine.start_new_session("essay").unwrap();
        engine.tick().unwrap();
        engine.enter_edit_mode();
        assert!(engine.set_stage_duration("brainstorming", 2));
        assert_eq!(engine.sequencer().time_left(), 119);
        engine.cancel_edit();
        assert_eq!(engine.sequencer().time_left(), 599);
        assert_eq!(engine.stages()[0].minutes(), 10);
    }

    #[test]
    fn reserved_and_blank_names_are_rejected() {
        let (mut engine, _, _, _) = engine();
        assert!(!engine.start_new_session("  ").unwrap());
        assert!(!engine.start_new_session("templates").unwrap());
        assert!(engine.session_name().is_none());
        assert!(engine.saved_sessions().unwrap().is_empty());
    }

    #[test]
    fn overlay_timer_is_independent() {
        let (mut engine, _, _, scheduler) = engine();
        engine.start_new_session("essay").unwrap();
        engine.drain_events();
        engine.set_page_hidden(true);
        assert_eq!(scheduler.armed_count(), 2);
        let overlay = *scheduler.armed().last().unwrap();
        assert!(engine.on_timer(overlay).unwrap());
        assert_eq!(engine.sequencer().time_left(), 600);
        let texts: Vec<String> = engine
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::OverlayRefreshed { text } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Brainstorming: 10:00", "Brainstorming: 10:00"]);
        engine.set_page_hidden(false);
        assert_eq!(scheduler.armed_count(), 1);
        assert!(!engine.on_timer(overlay).unwrap());
    }

    #[test]
    fn pump_answers_cycle_decision() {
        let (mut engine, _, _, _) = engine();
        engine.start_new_session("essay").unwrap();
        engine.enter_edit_mode();
        let rest = [
            "outlining",
            "writing-intro",
            "writing-body",
            "writing-conclusion",
            "proofreading",
        ];
        for id in rest {
            assert!(engine.delete_stage(id));
        }
        assert!(engine.set_stage_duration("brainstorming", 1));
        engine.commit_edit(None).unwrap();
        for _ in 0..60 {
            engine.tick().unwrap();
        }
        assert_eq!(engine.sequencer().phase(), Phase::AwaitingCycleDecision);

        let mut ui = ScriptedInteraction::new().confirming([false]);
        let handled = engine.pump(&mut ui).unwrap();
        assert!(handled.contains(&EngineEvent::ExtraTimeEntered));
        assert_eq!(engine.sequencer().phase(), Phase::Running);
        engine.tick().unwrap();
        assert_eq!(engine.sequencer().extra_time(), 1);
    }
}
