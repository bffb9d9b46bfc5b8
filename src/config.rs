//! Application-level configuration loading, including the prompt deck and
//! the team color palette.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_RELAY_BACK_CONFIG_PATH";
/// Round duration used when the config file does not set one.
const DEFAULT_ROUND_DURATION_SECS: u32 = 150;
/// Short-code length used when the config file does not set one.
const DEFAULT_SHORT_CODE_LEN: usize = 6;
/// Prompt text served when the deck is exhausted.
pub const NO_PROMPT_FALLBACK: &str = "No prompt available for this round";
/// Icon assigned to teams that do not pick one.
pub const DEFAULT_TEAM_ICON: &str = "❓";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    round_duration_secs: u32,
    short_code_len: usize,
    colors: Vec<String>,
    prompts: Vec<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in
    /// defaults for anything missing or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        prompts = config.prompts.len(),
                        colors = config.colors.len(),
                        round_duration_secs = config.round_duration_secs,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Seconds a round's countdown starts from.
    pub fn round_duration_secs(&self) -> u32 {
        self.round_duration_secs
    }

    /// Number of identifier-suffix characters used as the session short code.
    pub fn short_code_len(&self) -> usize {
        self.short_code_len
    }

    /// Number of prompts in the deck.
    pub fn deck_len(&self) -> usize {
        self.prompts.len()
    }

    /// Prompt text for `round` following a session's shuffled `order`, or the
    /// fallback sentinel once the deck is exhausted.
    pub fn prompt_for_round(&self, order: &[usize], round: u32) -> String {
        round
            .checked_sub(1)
            .and_then(|index| order.get(index as usize))
            .and_then(|deck_index| self.prompts.get(*deck_index))
            .cloned()
            .unwrap_or_else(|| NO_PROMPT_FALLBACK.to_string())
    }

    /// Return the first palette color not already in `used`, or a random hex
    /// color once the palette is exhausted so callers always receive a value.
    pub fn first_unused_color(&self, used: &[&str]) -> String {
        self.colors
            .iter()
            .find(|candidate| !used.contains(&candidate.as_str()))
            .cloned()
            .unwrap_or_else(|| format!("#{:06x}", rand::rng().random_range(0..0x100_0000u32)))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            round_duration_secs: DEFAULT_ROUND_DURATION_SECS,
            short_code_len: DEFAULT_SHORT_CODE_LEN,
            colors: default_colors(),
            prompts: default_prompts(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    round_duration_secs: Option<u32>,
    short_code_len: Option<usize>,
    colors: Option<Vec<String>>,
    prompts: Option<Vec<String>>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            round_duration_secs: raw
                .round_duration_secs
                .unwrap_or(defaults.round_duration_secs),
            short_code_len: raw.short_code_len.unwrap_or(defaults.short_code_len),
            colors: raw.colors.filter(|c| !c.is_empty()).unwrap_or(defaults.colors),
            prompts: raw
                .prompts
                .filter(|p| !p.is_empty())
                .unwrap_or(defaults.prompts),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in team color palette shipped with the binary.
fn default_colors() -> Vec<String> {
    [
        "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
        "#bcf60c", "#fabebe", "#008080", "#e6beff",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Built-in prompt deck used when the deployment ships no content file.
fn default_prompts() -> Vec<String> {
    [
        "Name three inventions that changed daily life before 1900, and agree on which mattered most.",
        "Your team is stranded on an island with one book. Decide which book and defend the pick.",
        "List as many capital cities on the equator-side of the world map as you can in one answer.",
        "Pick a decade of the last century and name its most influential piece of music.",
        "Agree on the single most important scientific discovery of the 20th century and say why.",
        "Name a historical figure you would invite to dinner and the first question you would ask.",
        "Decide which everyday object your team could not live without and justify it.",
        "Name three rivers longer than 3000 km and the continents they cross.",
        "Pick an animal that best represents your team strategy tonight and explain the choice.",
        "Agree on the best opening line in literature your team can recall.",
        "Name the planets in order from the sun, then pick the one to visit first.",
        "Decide which invention of the last 30 years will look silliest in 100 years.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
