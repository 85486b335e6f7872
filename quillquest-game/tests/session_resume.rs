use quillquest_game::{
    EngineEvent, EssayTimer, KeyValueStore, ManualClock, ManualScheduler, MemoryStore,
    NamespacedStore, Phase, RuntimeState, ScriptedInteraction, SessionStore, TimerConfig,
};

fn engine(
    store: &MemoryStore,
    clock: &ManualClock,
    scheduler: &ManualScheduler,
) -> EssayTimer<MemoryStore, ManualClock, ManualScheduler> {
    EssayTimer::create(
        store.clone(),
        clock.clone(),
        scheduler.clone(),
        TimerConfig::default(),
    )
    .unwrap()
}

#[test]
fn running_session_resumes_ticking_after_reload() {
    let store = MemoryStore::new();
    let clock = ManualClock::default();
    let mut first = engine(&store, &clock, &ManualScheduler::new());
    first.start_new_session("thesis").unwrap();
    for _ in 0..90 {
        clock.advance_secs(1);
        first.tick().unwrap();
    }
    first.set_notes("Argue for the second reading.");
    first.dispose().unwrap();
    drop(first);

    let saved = SessionStore::new(&store).load("thesis").unwrap().unwrap();
    assert_eq!(saved.time_left_in_stage, 510);
    assert!(saved.is_running && !saved.is_paused);

    let scheduler = ManualScheduler::new();
    let mut second = engine(&store, &clock, &scheduler);
    assert!(second.load_session("thesis").unwrap());
    assert_eq!(second.sequencer().phase(), Phase::Running);
    assert_eq!(scheduler.armed_count(), 1);

    let restored = RuntimeState::capture(
        second.sequencer(),
        second.template_key(),
        second.notes(),
        saved.last_modified,
    );
    assert_eq!(restored, saved);

    let tick = scheduler.armed()[0];
    assert!(second.on_timer(tick).unwrap());
    assert_eq!(second.sequencer().time_left(), 509);
}

#[test]
fn paused_session_reloads_without_ticking() {
    let store = MemoryStore::new();
    let clock = ManualClock::default();
    let mut first = engine(&store, &clock, &ManualScheduler::new());
    first.start_new_session("thesis").unwrap();
    first.tick().unwrap();
    first.pause().unwrap();

    let scheduler = ManualScheduler::new();
    let mut second = engine(&store, &clock, &scheduler);
    assert!(second.load_session("thesis").unwrap());
    assert_eq!(second.sequencer().phase(), Phase::Paused);
    assert_eq!(scheduler.armed_count(), 0);
    second.resume().unwrap();
    assert_eq!(scheduler.armed_count(), 1);
}

#[test]
fn unknown_session_is_a_no_op() {
    let store = MemoryStore::new();
    let clock = ManualClock::default();
    let mut engine = engine(&store, &clock, &ManualScheduler::new());
    engine.start_new_session("thesis").unwrap();
    engine.tick().unwrap();
    assert!(!engine.load_session("missing").unwrap());
    assert_eq!(engine.session_name(), Some("thesis"));
    assert_eq!(engine.sequencer().time_left(), 599);
}

#[test]
fn malformed_session_record_is_not_loaded() {
    let store = MemoryStore::new();
    let clock = ManualClock::default();
    let mut engine = engine(&store, &clock, &ManualScheduler::new());
    engine.start_new_session("thesis").unwrap();
    engine.tick().unwrap();
    engine.start_new_session("other").unwrap();

    let mut record = store.get("thesis").unwrap().unwrap();
    let stages = record["stages"].as_array_mut().unwrap();
    let first = stages[0].clone();
    stages.push(first);
    store.set("thesis", record).unwrap();

    assert!(!engine.load_session("thesis").unwrap());
    assert_eq!(engine.session_name(), Some("other"));
}

#[test]
fn pending_decision_survives_reload() {
    let store = MemoryStore::new();
    let clock = ManualClock::default();
    let mut first = engine(&store, &clock, &ManualScheduler::new());
    first.start_new_session("thesis").unwrap();
    first.enter_edit_mode();
    for id in [
        "outlining",
        "writing-intro",
        "writing-body",
        "writing-conclusion",
        "proofreading",
    ] {
        first.delete_stage(id);
    }
    first.set_stage_duration("brainstorming", 1);
    first.commit_edit(None).unwrap();
    for _ in 0..60 {
        first.tick().unwrap();
    }
    first.save_now().unwrap();

    let mut second = engine(&store, &clock, &ManualScheduler::new());
    second.drain_events();
    second.load_session("thesis").unwrap();
    assert_eq!(second.sequencer().phase(), Phase::AwaitingCycleDecision);
    assert_eq!(second.drain_events(), vec![EngineEvent::CycleDecisionRequired]);
    assert!(second.resolve_cycle(true).unwrap());
    assert_eq!(second.sequencer().time_left(), 60);
}

#[test]
fn delete_asks_first_and_updates_index() {
    let store = MemoryStore::new();
    let clock = ManualClock::default();
    let mut engine = engine(&store, &clock, &ManualScheduler::new());
    engine.start_new_session("alpha").unwrap();
    clock.advance_secs(10);
    engine.start_new_session("beta").unwrap();

    let listing = engine.saved_sessions().unwrap();
    let names: Vec<&str> = listing.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert!(listing.iter().all(|(_, saved)| saved.is_some()));

    let mut ui = ScriptedInteraction::new().confirming([false, true]);
    assert!(!engine.delete_session_with(&mut ui, "alpha").unwrap());
    assert!(store.get("alpha").unwrap().is_some());
    assert!(engine.delete_session_with(&mut ui, "alpha").unwrap());
    assert!(store.get("alpha").unwrap().is_none());
    assert_eq!(SessionStore::new(&store).names().unwrap(), vec!["beta".to_string()]);

    assert!(engine.delete_session("beta").unwrap());
    assert!(engine.session_name().is_none());
    assert!(engine.saved_sessions().unwrap().is_empty());
}

#[test]
fn users_get_separate_namespaces() {
    let backing = MemoryStore::new();
    let config = TimerConfig::default();
    let ana = NamespacedStore::new(backing.clone(), config.namespace_for("ana"));
    let ben = NamespacedStore::new(backing.clone(), config.namespace_for("ben"));

    let mut engine = EssayTimer::create(
        ana,
        ManualClock::default(),
        ManualScheduler::new(),
        config.clone(),
    )
    .unwrap();
    engine.start_new_session("thesis").unwrap();
    engine.save_now().unwrap();

    assert!(SessionStore::new(&ben).load("thesis").unwrap().is_none());
    assert!(backing.get("essayTimer_ana:thesis").unwrap().is_some());
    assert!(backing.get("essayTimer_ben:thesis").unwrap().is_none());
}

#[test]
fn daily_counter_rolls_over_at_midnight() {
    let store = MemoryStore::new();
    let clock = ManualClock::default();
    let mut engine = engine(&store, &clock, &ManualScheduler::new());
    engine.start_new_session("thesis").unwrap();
    clock.advance_secs(86_400 - 10);
    for _ in 0..10 {
        engine.tick().unwrap();
    }
    assert_eq!(engine.daily_display(), "00:00:10");
    clock.advance_secs(10);
    for _ in 0..5 {
        engine.tick().unwrap();
    }
    assert_eq!(engine.daily_display(), "00:00:05");
    let stored = store.get("dailySession").unwrap().unwrap();
    assert_eq!(stored["date"], "1970-01-02");
    assert_eq!(stored["totalSeconds"], 5);
}
