use anyhow::{Context, Result};
use quillquest_game::TimerConfig;
use std::path::Path;

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Parse the `--seeds` list. Every token must be an unsigned integer.
pub fn parse_seeds(raw: &str) -> Result<Vec<u64>> {
    split_csv(raw)
        .iter()
        .map(|token| {
            token
                .parse::<u64>()
                .with_context(|| format!("invalid seed `{token}`"))
        })
        .collect()
}

/// Engine tuning from `--config`, or the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<TimerConfig> {
    let Some(path) = path else {
        return Ok(TimerConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    TimerConfig::from_json(&raw).with_context(|| format!("invalid config in {}", path.display()))
}
