//! Configuration loading and defaults for the tiller CLI.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

// === Types ===

/// Raw retry configuration loaded from config files.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub enabled: Option<bool>,
    pub max_retries: Option<u32>,
    pub initial_delay: Option<f64>,
    pub max_delay: Option<f64>,
    pub exponential_base: Option<f64>,
}

/// Resolved retry policy with defaults applied.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    pub initial_delay: f64,
    pub max_delay: f64,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_delay: 1.0,
            max_delay: 30.0,
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries, for tests and one-shot probes.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Compute the backoff delay for a retry attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay * self.exponential_base.powi(exponent);
        let delay = delay.min(self.max_delay);
        // Clamp to a sane range to guard against NaN/negative from misconfigured values
        let delay = delay.clamp(0.0, 300.0);
        std::time::Duration::from_secs_f64(delay)
    }
}

/// Resolved CLI configuration, including defaults and environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub require_tool: Option<bool>,
    pub max_steps: Option<u32>,
    pub max_retries: Option<u32>,
    pub temperature: Option<f32>,
    pub retry: Option<RetryConfig>,
}

// === Config Loading ===

impl Config {
    /// Load configuration from disk and merge with environment overrides.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(default_config_path);
        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            _ => Config::default(),
        };

        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Validate that critical config fields are present.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref key) = self.api_key
            && key.trim().is_empty()
        {
            anyhow::bail!("api_key cannot be empty string");
        }
        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            anyhow::bail!("temperature must be between 0.0 and 2.0");
        }
        Ok(())
    }

    /// API key, or an actionable error telling the user where to set it.
    pub fn api_key(&self) -> Result<String> {
        self.api_key.clone().context(
            "No API key configured. Set TILLER_API_KEY, or api_key in the config file.",
        )
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn model(&self) -> String {
        self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// Resolved retry policy with defaults applied.
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let Some(retry) = self.retry.as_ref() else {
            return defaults;
        };
        RetryPolicy {
            enabled: retry.enabled.unwrap_or(defaults.enabled),
            max_retries: retry.max_retries.unwrap_or(defaults.max_retries),
            initial_delay: retry.initial_delay.unwrap_or(defaults.initial_delay),
            max_delay: retry.max_delay.unwrap_or(defaults.max_delay),
            exponential_base: retry
                .exponential_base
                .unwrap_or(defaults.exponential_base),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tiller").join("config.toml"))
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = std::env::var("TILLER_API_KEY")
        && !key.is_empty()
    {
        config.api_key = Some(key);
    }
    if let Ok(url) = std::env::var("TILLER_BASE_URL")
        && !url.is_empty()
    {
        config.base_url = Some(url);
    }
    if let Ok(model) = std::env::var("TILLER_MODEL")
        && !model.is_empty()
    {
        config.model = Some(model);
    }
}
