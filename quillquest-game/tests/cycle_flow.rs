use quillquest_game::{
    EngineEvent, EssayTimer, KeyValueStore, ManualClock, ManualScheduler, MemoryStore, Phase,
    ScriptedInteraction, StageDefinition, StageSequencer, TimerConfig,
};

type Engine = EssayTimer<MemoryStore, ManualClock, ManualScheduler>;

fn engine_with(store: &MemoryStore, scheduler: &ManualScheduler) -> Engine {
    EssayTimer::create(
        store.clone(),
        ManualClock::default(),
        scheduler.clone(),
        TimerConfig::default(),
    )
    .unwrap()
}

/// Trim the default template down to a single countdown stage plus extra.
fn writing_only(engine: &mut Engine, minutes: u32) {
    engine.enter_edit_mode();
    for id in [
        "brainstorming",
        "outlining",
        "writing-intro",
        "writing-body",
        "writing-conclusion",
    ] {
        assert!(engine.delete_stage(id));
    }
    assert!(engine.set_stage_duration("proofreading", minutes));
    engine.commit_edit(None).unwrap();
}

#[test]
fn writing_stage_reaches_extra_then_restarts() {
    let mut seq = StageSequencer::new(vec![
        StageDefinition::timed("writing", "Writing", 5),
        StageDefinition::extra("extra", "Extra Time"),
    ]);
    seq.start();
    for _ in 0..299 {
        seq.tick();
    }
    assert_eq!(seq.index(), 0);
    assert_eq!(seq.time_left(), 1);

    seq.tick();
    assert_eq!(seq.index(), 1);
    assert_eq!(seq.extra_time(), 0);
    assert_eq!(seq.phase(), Phase::AwaitingCycleDecision);

    seq.resolve_cycle(true.into()).unwrap();
    assert_eq!(seq.index(), 0);
    assert_eq!(seq.time_left(), 300);
    assert_eq!(seq.phase(), Phase::Running);
}

#[test]
fn extra_time_counts_up_until_restart() {
    let store = MemoryStore::new();
    let scheduler = ManualScheduler::new();
    let mut engine = engine_with(&store, &scheduler);
    engine.start_new_session("thesis").unwrap();
    writing_only(&mut engine, 1);
    engine.drain_events();

    for _ in 0..60 {
        engine.tick().unwrap();
    }
    assert!(engine.drain_events().contains(&EngineEvent::CycleDecisionRequired));
    assert!(engine.resolve_cycle(false).unwrap());
    for _ in 0..500 {
        engine.tick().unwrap();
    }
    assert_eq!(engine.sequencer().extra_time(), 500);
    assert_eq!(engine.current_clock(), "00:00");
    assert_eq!(engine.page_title(), "08:20 - Extra Time");

    engine.pause().unwrap();
    engine.start().unwrap();
    assert_eq!(engine.sequencer().extra_time(), 500);
    assert_eq!(scheduler.armed_count(), 1);
}

#[test]
fn pause_resume_without_ticks_is_idempotent() {
    let store = MemoryStore::new();
    let scheduler = ManualScheduler::new();
    let mut engine = engine_with(&store, &scheduler);
    engine.start_new_session("thesis").unwrap();
    for _ in 0..42 {
        engine.tick().unwrap();
    }
    let before = engine.sequencer().time_left();
    for _ in 0..3 {
        engine.pause().unwrap();
        engine.resume().unwrap();
    }
    assert_eq!(engine.sequencer().time_left(), before);
    assert_eq!(scheduler.armed_count(), 1);
}

#[test]
fn paused_engine_ignores_stale_firings() {
    let store = MemoryStore::new();
    let scheduler = ManualScheduler::new();
    let mut engine = engine_with(&store, &scheduler);
    engine.start_new_session("thesis").unwrap();
    let first = scheduler.armed()[0];
    assert!(engine.on_timer(first).unwrap());
    engine.pause().unwrap();
    engine.resume().unwrap();
    assert!(!engine.on_timer(first).unwrap());
    let second = scheduler.armed()[0];
    assert_ne!(first, second);
    assert!(engine.on_timer(second).unwrap());
    assert_eq!(engine.sequencer().time_left(), 598);
}

#[test]
fn resizing_active_stage_shifts_only_its_countdown() {
    let store = MemoryStore::new();
    let scheduler = ManualScheduler::new();
    let mut engine = engine_with(&store, &scheduler);
    engine.start_new_session("thesis").unwrap();
    for _ in 0..100 {
        engine.tick().unwrap();
    }
    engine.enter_edit_mode();
    assert!(engine.set_stage_duration("brainstorming", 12));
    assert_eq!(engine.sequencer().time_left(), 500 + 120);
    assert!(engine.set_stage_duration("outlining", 1));
    assert_eq!(engine.sequencer().time_left(), 620);
    assert!(engine.set_stage_duration("brainstorming", 1));
    assert_eq!(engine.sequencer().time_left(), 0);
    engine.commit_edit(None).unwrap();
}

#[test]
fn full_reset_clears_notes_and_pomodoros() {
    let store = MemoryStore::new();
    let scheduler = ManualScheduler::new();
    let mut engine = engine_with(&store, &scheduler);
    engine.start_new_session("sprint").unwrap();
    assert!(engine.select_template("pomodoro30").unwrap());
    engine.start().unwrap();
    for _ in 0..1_800 {
        engine.tick().unwrap();
    }
    assert_eq!(engine.pomodoros(), 1);
    assert!(
        engine
            .drain_events()
            .contains(&EngineEvent::PomodoroCompleted { total: 1 })
    );
    engine.set_notes("draft");

    engine.reset(false).unwrap();
    assert_eq!(engine.pomodoros(), 1);
    assert_eq!(engine.notes(), "draft");
    assert_eq!(scheduler.armed_count(), 0);

    engine.reset(true).unwrap();
    assert_eq!(engine.pomodoros(), 0);
    assert_eq!(engine.notes(), "");
    assert_eq!(engine.stages().len(), 9);
    assert_eq!(engine.page_title(), "Quillquest");
    assert!(store.get("sprint").unwrap().is_some());
}

#[test]
fn declining_restart_without_extra_stage_finishes() {
    let store = MemoryStore::new();
    let scheduler = ManualScheduler::new();
    let mut engine = engine_with(&store, &scheduler);
    engine.start_new_session("thesis").unwrap();
    writing_only(&mut engine, 1);
    engine.enter_edit_mode();
    assert!(engine.delete_stage("extra"));
    engine.commit_edit(None).unwrap();

    for _ in 0..60 {
        engine.tick().unwrap();
    }
    let mut ui = ScriptedInteraction::new().confirming([false]);
    let handled = engine.pump(&mut ui).unwrap();
    assert!(handled.contains(&EngineEvent::CycleFinished));
    assert_eq!(engine.sequencer().phase(), Phase::Idle);
    assert_eq!(engine.sequencer().index(), 0);
    assert_eq!(scheduler.armed_count(), 0);
}
