use anyhow::{Context, Result, ensure};
use quillquest_game::{
    DungeonEvent, DungeonGraph, DungeonPhase, DungeonRun, EngineEvent, EssayTimer, ManualClock,
    ManualScheduler, MemoryStore, Phase, RoomSpec, ScriptedInteraction, SessionStore,
    TimerConfig, default_roster, format_clock,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

type Engine = EssayTimer<MemoryStore, ManualClock, ManualScheduler>;

/// Inputs shared by every scenario iteration.
#[derive(Debug, Clone)]
pub struct ScenarioCtx {
    pub seed: u64,
    pub config: TimerConfig,
}

impl ScenarioCtx {
    fn rng(&self) -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(self.seed)
    }
}

pub struct Scenario {
    pub key: &'static str,
    pub description: &'static str,
    run: fn(&ScenarioCtx) -> Result<()>,
}

impl Scenario {
    pub fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        (self.run)(ctx).with_context(|| format!("scenario `{}` (seed {})", self.key, ctx.seed))
    }
}

pub fn catalog() -> Vec<Scenario> {
    vec![
        Scenario {
            key: "smoke",
            description: "Start a session and tick the first stage",
            run: smoke,
        },
        Scenario {
            key: "cycle",
            description: "Reach extra time and restart the cycle",
            run: cycle,
        },
        Scenario {
            key: "pomodoro",
            description: "Run the pomodoro template through a full cycle",
            run: pomodoro,
        },
        Scenario {
            key: "companion",
            description: "Grind through the whole opponent roster",
            run: companion,
        },
        Scenario {
            key: "resume",
            description: "Save mid-stage, reload, and keep ticking",
            run: resume,
        },
        Scenario {
            key: "edit",
            description: "Edit stages, roll back, then save a template",
            run: edit,
        },
        Scenario {
            key: "mission",
            description: "Generate a mission and clear every room",
            run: mission,
        },
        Scenario {
            key: "dungeon",
            description: "Walk the default dungeon until no tile is left",
            run: dungeon,
        },
    ]
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    catalog()
        .iter()
        .map(|scenario| (scenario.key, scenario.description))
        .collect()
}

pub fn get_scenario(key: &str) -> Option<Scenario> {
    catalog().into_iter().find(|scenario| scenario.key == key)
}

fn new_engine(ctx: &ScenarioCtx, store: &MemoryStore) -> Result<Engine> {
    EssayTimer::create(
        store.clone(),
        ManualClock::default(),
        ManualScheduler::new(),
        ctx.config.clone(),
    )
    .context("engine creation failed")
}

fn ticks(engine: &mut Engine, count: u32) -> Result<Vec<EngineEvent>> {
    let mut events = Vec::new();
    for _ in 0..count {
        engine.tick()?;
        events.extend(engine.drain_events());
    }
    Ok(events)
}

/// Give every countdown stage a one-minute length and restart the session.
fn shorten_stages(engine: &mut Engine) -> Result<()> {
    engine.enter_edit_mode();
    let ids: Vec<String> = engine
        .stages()
        .iter()
        .filter(|stage| !stage.is_extra())
        .map(|stage| stage.id.clone())
        .collect();
    for id in ids {
        ensure!(engine.set_stage_duration(&id, 1), "could not resize `{id}`");
    }
    engine.commit_edit(None)?;
    engine.reset(false)?;
    engine.start()?;
    engine.drain_events();
    Ok(())
}

fn smoke(ctx: &ScenarioCtx) -> Result<()> {
    let store = MemoryStore::new();
    let mut engine = new_engine(ctx, &store)?;
    ensure!(engine.page_title() == "Quillquest", "idle title wrong");
    ensure!(engine.start_new_session("smoke")?, "session did not start");
    ensure!(engine.is_ticking(), "tick timer not armed");

    let n = ctx.rng().gen_range(1..60);
    ticks(&mut engine, n)?;
    let expected = format!("{} - Brainstorming", format_clock(600 - i64::from(n)));
    ensure!(
        engine.page_title() == expected,
        "title `{}` != `{expected}`",
        engine.page_title()
    );
    ensure!(engine.total_planned() == "105:00", "total planned wrong");
    engine.dispose()?;
    ensure!(!engine.is_ticking(), "dispose left a timer armed");
    Ok(())
}

fn cycle(ctx: &ScenarioCtx) -> Result<()> {
    let store = MemoryStore::new();
    let mut engine = new_engine(ctx, &store)?;
    engine.start_new_session("cycle")?;
    shorten_stages(&mut engine)?;

    let countdown = engine.stages().iter().filter(|s| !s.is_extra()).count();
    for _ in 0..60 * countdown {
        engine.tick()?;
    }
    ensure!(
        engine.sequencer().phase() == Phase::AwaitingCycleDecision,
        "phase is {:?} after {countdown} stages",
        engine.sequencer().phase()
    );

    // ticks are swallowed while the decision is open
    for _ in 0..5 {
        engine.tick()?;
    }
    ensure!(engine.sequencer().extra_time() == 0, "extra time moved early");

    let mut ui = ScriptedInteraction::new().confirming([false]);
    let handled = engine.pump(&mut ui)?;
    ensure!(
        handled.contains(&EngineEvent::CycleDecisionRequired)
            && handled.contains(&EngineEvent::ExtraTimeEntered),
        "decision not answered: {handled:?}"
    );
    let extra = ctx.rng().gen_range(1..500);
    ticks(&mut engine, extra)?;
    ensure!(
        engine.sequencer().extra_time() == u64::from(extra),
        "extra time {} != {extra}",
        engine.sequencer().extra_time()
    );
    ensure!(!engine.resolve_cycle(true)?, "decision still pending");

    engine.reset(false)?;
    ensure!(engine.sequencer().index() == 0, "reset kept the cursor");
    ensure!(!engine.is_ticking(), "reset left the tick armed");
    Ok(())
}

fn pomodoro(ctx: &ScenarioCtx) -> Result<()> {
    let store = MemoryStore::new();
    let mut engine = new_engine(ctx, &store)?;
    engine.start_new_session("pomodoro")?;
    ensure!(engine.select_template("pomodoro30")?, "pomodoro template missing");
    shorten_stages(&mut engine)?;

    let events = ticks(&mut engine, 60 * 8)?;
    ensure!(engine.pomodoros() == 4, "pomodoros = {}", engine.pomodoros());
    let hits = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::CompanionDamaged { .. }))
        .count();
    ensure!(hits == 4, "expected 4 hits from 4 pomodoros, got {hits}");

    ensure!(
        events.contains(&EngineEvent::CycleDecisionRequired),
        "no cycle decision after the long break"
    );
    engine.resolve_cycle(true)?;
    ensure!(
        engine.drain_events().contains(&EngineEvent::CycleRestarted),
        "cycle was not restarted"
    );
    ensure!(engine.pomodoros() == 4, "restart cleared the pomodoro count");
    engine.reset(true)?;
    ensure!(engine.pomodoros() == 0, "full reset kept pomodoros");
    Ok(())
}

fn companion(ctx: &ScenarioCtx) -> Result<()> {
    let store = MemoryStore::new();
    let mut engine = new_engine(ctx, &store)?;
    engine.drain_events();
    let damage = ctx.config.damage_per_stage.max(1);

    let mut defeated = Vec::new();
    let mut exhausted = false;
    for _ in 0..10_000 {
        if engine.companion().is_none() {
            break;
        }
        let before = engine.companion().map_or(0, |c| c.hp);
        engine.apply_damage(damage)?;
        for event in engine.drain_events() {
            match event {
                EngineEvent::CompanionDefeated { name } => defeated.push(name),
                EngineEvent::NoMoreOpponents => exhausted = true,
                EngineEvent::CompanionDamaged { hp, .. } => {
                    ensure!(hp < before, "hp went from {before} to {hp}");
                }
                _ => {}
            }
        }
    }

    let expected: Vec<String> = default_roster().iter().map(|m| m.name.clone()).collect();
    ensure!(defeated == expected, "defeat order {defeated:?}");
    ensure!(exhausted, "roster end not reported");
    ensure!(
        engine.companion_hud().name == "No monster",
        "HUD still shows an opponent"
    );
    Ok(())
}

fn resume(ctx: &ScenarioCtx) -> Result<()> {
    let store = MemoryStore::new();
    let mut first = new_engine(ctx, &store)?;
    first.start_new_session("resume")?;
    let n = ctx.rng().gen_range(1..600);
    ticks(&mut first, n)?;
    first.set_notes("draft notes");
    first.dispose()?;

    let saved = SessionStore::new(&store)
        .load("resume")?
        .context("session record missing")?;
    ensure!(
        saved.time_left_in_stage == 600 - i64::from(n),
        "saved {} seconds left",
        saved.time_left_in_stage
    );

    let mut second = new_engine(ctx, &store)?;
    ensure!(second.load_session("resume")?, "load failed");
    ensure!(second.is_ticking(), "reload did not resume ticking");
    ensure!(second.notes() == "draft notes", "notes lost");
    second.tick()?;
    ensure!(
        second.sequencer().time_left() == saved.time_left_in_stage - 1,
        "tick after reload did not count"
    );
    ensure!(!second.load_session("nope")?, "missing session loaded");
    Ok(())
}

fn edit(ctx: &ScenarioCtx) -> Result<()> {
    let store = MemoryStore::new();
    let mut engine = new_engine(ctx, &store)?;
    engine.start_new_session("edit")?;
    let original = engine.stages().len();

    engine.enter_edit_mode();
    ensure!(!engine.pause()?, "pause allowed while editing");
    let mut ui = ScriptedInteraction::new().prompting([
        Some("Research".to_string()),
        Some("abc".to_string()),
    ]);
    ensure!(engine.add_stage_with(&mut ui), "stage not added");
    let added = &engine.stages()[original - 1];
    ensure!(
        added.label == "Research" && added.minutes() == 10,
        "added {added:?}"
    );
    engine.cancel_edit();
    ensure!(engine.stages().len() == original, "rollback failed");

    engine.enter_edit_mode();
    engine.add_stage(Some("Citations"), Some("5"));
    let mut ui = ScriptedInteraction::new().prompting([Some("Thesis Plan".to_string())]);
    let saved = engine
        .save_template_with(&mut ui)?
        .context("template not saved")?;
    ensure!(saved.key == "thesis-plan", "template key {}", saved.key);
    ensure!(!engine.is_editing(), "still editing");
    ensure!(
        engine.template_key() == Some("thesis-plan"),
        "template not adopted"
    );

    engine.select_template("default")?;
    ensure!(engine.stages().len() == original, "default template changed");
    engine.select_template("thesis-plan")?;
    ensure!(engine.stages().len() == original + 1, "saved template lost");
    Ok(())
}

fn mission(ctx: &ScenarioCtx) -> Result<()> {
    let store = MemoryStore::new();
    let mut engine = new_engine(ctx, &store)?;
    let mut rng = ctx.rng();
    let rooms = rng.gen_range(1..8_u32);
    let key = engine
        .create_mission("Scripted Raid", &rooms.to_string(), Some("Hard"), &mut rng)?
        .context("mission not created")?;
    let run = engine.active_mission().context("mission not active")?;
    let room_list = run.mission().rooms.clone();
    ensure!(room_list.len() == rooms as usize, "{} rooms", room_list.len());
    ensure!(
        matches!(room_list.last(), Some(RoomSpec::Monster { .. })),
        "mission `{key}` has no boss"
    );

    let mut completed = false;
    for _ in 0..100 {
        if engine.active_mission().is_none() {
            break;
        }
        let hp = engine.companion().map_or(0, |c| c.hp);
        engine.apply_damage(hp.max(1))?;
    }
    for event in engine.drain_events() {
        if let EngineEvent::MissionCompleted { name } = event {
            ensure!(name == "Scripted Raid", "completed `{name}`");
            completed = true;
        }
    }
    ensure!(completed, "mission never completed");
    ensure!(
        engine.companion().is_none_or(|c| c.hp > 0),
        "a beaten companion is still loaded after the mission"
    );
    Ok(())
}

fn dungeon(ctx: &ScenarioCtx) -> Result<()> {
    let scheduler = ManualScheduler::new();
    let mut run = DungeonRun::start(
        DungeonGraph::default_map(),
        ctx.config.dungeon.clone(),
        ctx.config.tick_interval(),
        scheduler.clone(),
    )?;
    let mut rng = ctx.rng();
    let phase_ticks = ctx.config.dungeon.work_secs + ctx.config.dungeon.rest_secs;

    for _ in 0..32 {
        for _ in 0..phase_ticks {
            let Some(&id) = scheduler.armed().first() else {
                break;
            };
            run.on_timer(id);
        }
        ensure!(
            run.phase() == DungeonPhase::AwaitingChoice,
            "phase {:?} after a full work/rest cycle",
            run.phase()
        );
        let options: Vec<_> = run.selectable().iter().cloned().collect();
        let Some(next) = options.choose(&mut rng) else {
            break;
        };
        ensure!(!run.visited().contains(next), "visited tile offered again");
        ensure!(run.choose(next), "could not move to {next}");
    }

    ensure!(
        run.drain_events().last() == Some(&DungeonEvent::Exhausted),
        "walk did not end at a dead end"
    );
    ensure!(run.visited().len() == 9, "visited {} tiles", run.visited().len());
    ensure!(scheduler.armed_count() == 0, "timer left armed");
    Ok(())
}
