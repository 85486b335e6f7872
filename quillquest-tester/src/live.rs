use anyhow::{Context, Result};
use colored::Colorize;
use log::{debug, info};
use quillquest_game::{
    Clock, EngineEvent, EssayTimer, MemoryStore, ScriptedInteraction, SystemClock, TimerConfig,
    TokioScheduler,
};
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;

/// What a live run observed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveSummary {
    pub ticks: u64,
    pub stages_completed: usize,
    pub saves: usize,
    pub overlay_refreshes: usize,
    pub cycles_restarted: usize,
    pub final_title: String,
}

/// Drive one session on real tokio timers until `target_ticks` seconds of
/// session time have been counted. The overlay timer runs for the second half.
pub async fn run_live(
    config: TimerConfig,
    target_ticks: u64,
    verbose: bool,
) -> Result<LiveSummary> {
    let (scheduler, mut rx) = TokioScheduler::channel();
    let clock = SystemClock;
    let mut engine = EssayTimer::create(MemoryStore::new(), clock, scheduler, config)
        .context("engine creation failed")?;
    // every cycle decision is answered with "start again"
    let mut ui = ScriptedInteraction {
        default_confirm: true,
        ..ScriptedInteraction::default()
    };

    engine.start_new_session("live")?;
    engine.enter_edit_mode();
    let ids: Vec<String> = engine.stages().iter().map(|s| s.id.clone()).collect();
    for id in ids {
        engine.set_stage_duration(&id, 1);
    }
    engine.commit_edit(None)?;
    engine.reset(false)?;
    engine.start()?;
    info!("live run started for {target_ticks} ticks");

    let mut summary = LiveSummary::default();
    let mut overlay_on = false;
    while engine.daily().total_seconds < target_ticks {
        let wait = engine.save_deadline().map(|deadline| {
            let ms = deadline.saturating_sub(clock.now_millis()).max(0);
            Duration::from_millis(u64::try_from(ms).unwrap_or(0))
        });
        tokio::select! {
            fired = rx.recv() => {
                let Some(id) = fired else {
                    break;
                };
                if !engine.on_timer(id)? {
                    debug!("stale firing {id}");
                }
            }
            () = sleep(wait.unwrap_or(Duration::ZERO)), if wait.is_some() => {
                engine.poll()?;
            }
        }

        if !overlay_on && engine.daily().total_seconds * 2 >= target_ticks {
            engine.set_page_hidden(true);
            overlay_on = true;
        }
        for event in engine.pump(&mut ui)? {
            tally(&mut summary, &event);
            if verbose {
                println!("   {} {event}", "•".dimmed());
            }
        }
    }

    engine.set_page_hidden(false);
    engine.dispose()?;
    for event in engine.drain_events() {
        tally(&mut summary, &event);
    }
    summary.ticks = engine.daily().total_seconds;
    summary.final_title = engine.page_title();
    Ok(summary)
}

fn tally(summary: &mut LiveSummary, event: &EngineEvent) {
    match event {
        EngineEvent::StageCompleted { .. } => summary.stages_completed += 1,
        EngineEvent::SessionSaved { .. } => summary.saves += 1,
        EngineEvent::OverlayRefreshed { .. } => summary.overlay_refreshes += 1,
        EngineEvent::CycleRestarted => summary.cycles_restarted += 1,
        _ => {}
    }
}
