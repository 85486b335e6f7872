use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::scenarios::{Scenario, ScenarioCtx};
use quillquest_game::TimerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
}

pub struct LogicRunner {
    config: TimerConfig,
    verbose: bool,
}

impl LogicRunner {
    pub const fn new(config: TimerConfig, verbose: bool) -> Self {
        Self { config, verbose }
    }

    pub fn run_scenario(
        &self,
        scenario: &Scenario,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        seeds
            .iter()
            .map(|&seed| {
                if self.verbose {
                    println!(
                        "🧪 Testing scenario: {} (seed: {seed})",
                        scenario.key.bright_white()
                    );
                }
                self.run_single(scenario, seed, iterations)
            })
            .collect()
    }

    fn run_single(&self, scenario: &Scenario, seed: u64, iterations: usize) -> ScenarioResult {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut durations = Vec::new();

        for i in 0..iterations {
            let ctx = ScenarioCtx {
                seed: seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX)),
                config: self.config.clone(),
            };
            let start = Instant::now();
            match scenario.run(&ctx) {
                Ok(()) => {
                    successes += 1;
                    let duration = start.elapsed();
                    durations.push(duration);
                    if self.verbose {
                        println!("  ✅ Iteration {}/{iterations} passed ({duration:?})", i + 1);
                    }
                }
                Err(err) => {
                    let message = format!("Iteration {} (seed {}): {err:#}", i + 1, ctx.seed);
                    if self.verbose {
                        println!("  ❌ {}", message.clone().red());
                    }
                    failures.push(message);
                }
            }
        }

        let average_duration = if durations.is_empty() {
            Duration::ZERO
        } else {
            durations.iter().sum::<Duration>() / u32::try_from(durations.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.key.to_string(),
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}
