mod live;
mod reports;
mod runner;
mod scenarios;
mod util;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use runner::{LogicRunner, ScenarioResult};
use scenarios::{get_scenario, list_scenarios};
use util::{load_config, parse_seeds, split_csv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TestMode {
    /// Scripted scenarios on in-memory collaborators (fast, deterministic)
    Logic,
    /// One session on real tokio timers
    Live,
}

#[derive(Debug, Parser)]
#[command(name = "quillquest-tester", version)]
#[command(about = "Scenario runner and live driver for the Quillquest essay timer engine")]
struct Args {
    /// Test mode: logic (scripted) or live (real timers)
    #[arg(long, value_enum, default_value_t = TestMode::Logic)]
    mode: TestMode,

    /// Scenarios to run (comma-separated, or `all`)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 3)]
    iterations: usize,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Engine tuning overrides (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Live mode: tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Live mode: session seconds to run before stopping
    #[arg(long, default_value_t = 150)]
    live_ticks: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval_ms = tick_ms;
        config.validate().context("invalid --tick-ms")?;
    }

    if args.mode == TestMode::Live {
        return run_live_mode(&args, config).await;
    }

    let start_time = Instant::now();
    let scenarios = expand_scenarios(&args.scenarios);
    let seeds = parse_seeds(&args.seeds)?;
    let results = run_logic_scenarios(&args, &scenarios, &seeds, config);

    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }
    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:12} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🪶 Quillquest Automated Tester".bright_cyan().bold());
    println!("{}", "==============================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for (key, _) in list_scenarios() {
            if !scenarios.iter().any(|s| s == key) {
                scenarios.push(key.to_string());
            }
        }
    }
    scenarios
}

fn run_logic_scenarios(
    args: &Args,
    scenarios: &[String],
    seeds: &[u64],
    config: quillquest_game::TimerConfig,
) -> Vec<ScenarioResult> {
    println!("{}", "🧠 Running Logic Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let runner = LogicRunner::new(config, args.verbose);
    let mut results = Vec::new();
    for scenario_name in scenarios {
        match get_scenario(scenario_name) {
            Some(scenario) => {
                results.extend(runner.run_scenario(&scenario, seeds, args.iterations));
            }
            None => eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow()),
        }
    }
    results
}

async fn run_live_mode(args: &Args, config: quillquest_game::TimerConfig) -> Result<()> {
    println!("{}", "⏱️  Running Live Session".bright_blue().bold());
    println!("{}", "-".repeat(30).blue());
    let interval = config.tick_interval();
    let summary = live::run_live(config, args.live_ticks, args.verbose).await?;

    let mut output_target = OutputTarget::new(args.output.clone())?;
    if args.report == "json" {
        writeln!(
            output_target.writer(),
            "{}",
            serde_json::to_string_pretty(&summary)?
        )?;
    } else {
        let out = output_target.writer();
        writeln!(out, "Tick interval: {interval:?}")?;
        writeln!(out, "Ticks counted: {}", summary.ticks)?;
        writeln!(out, "Stages completed: {}", summary.stages_completed)?;
        writeln!(out, "Cycles restarted: {}", summary.cycles_restarted)?;
        writeln!(out, "Session saves: {}", summary.saves)?;
        writeln!(out, "Overlay refreshes: {}", summary.overlay_refreshes)?;
        writeln!(out, "Final title: {}", summary.final_title)?;
    }
    output_target.flush_inner()?;
    Ok(())
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => reports::generate_json_report(output_target.writer(), results)?,
        "markdown" => reports::generate_markdown_report(output_target.writer(), results)?,
        _ => {
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                reports::generate_console_report(
                    output_target.writer(),
                    results,
                    start_time.elapsed(),
                )?;
            }
        }
    }

    if args.report != "json" {
        let duration = start_time.elapsed();
        writeln!(&mut output_target)?;
        writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
    }
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
