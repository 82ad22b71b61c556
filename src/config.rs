//! Configuration management
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Builder overrides (CLI flags)
//! 2. Environment variables (ARIA_MAX_RETRIES, etc.)
//! 3. Config file (aria.toml in project root or ~/.config/aria/config.toml)
//! 4. Built-in defaults
//!
//! # Example Config File (aria.toml)
//!
//! ```toml
//! [retry]
//! max_retries = 3
//! base_delay_ms = 500
//!
//! [tools]
//! max_rounds = 10
//!
//! [vibe]
//! redeclare = "reject"
//! ```
//!
//! # Environment Variables
//!
//! - ARIA_CONFIG_PATH
//! - ARIA_MAX_RETRIES
//! - ARIA_RETRY_BASE_DELAY_MS
//! - ARIA_MAX_TOOL_ROUNDS
//! - ARIA_VIBE_REDECLARE ("overwrite" | "reject")

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::RetryPolicy;
use crate::executor::{EnginePolicy, RedeclarePolicy};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub vibe: VibeConfig,
}

/// Provider retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first, for retryable failures only
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay in milliseconds; doubles per retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Tool-calling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Round budget for tool-enabled conversations
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

/// Generated-code configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VibeConfig {
    /// What happens when generated code redeclares an existing function
    #[serde(default = "default_redeclare")]
    pub redeclare: RedeclarePolicy,
}

// Default value functions for serde
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_rounds() -> u32 {
    10
}
fn default_redeclare() -> RedeclarePolicy {
    RedeclarePolicy::Reject
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

impl Default for VibeConfig {
    fn default() -> Self {
        Self {
            redeclare: default_redeclare(),
        }
    }
}

impl Config {
    /// Load configuration with the full priority chain
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        Ok(config)
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// The engine policies this config implies
    pub fn engine_policy(&self) -> EnginePolicy {
        EnginePolicy {
            max_tool_rounds: self.tools.max_rounds,
            vibe_redeclare: self.vibe.redeclare,
        }
    }

    /// The retry policy this config implies
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
        }
    }
}

/// Builder for constructing Config with optional overrides
#[derive(Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_tool_rounds: Option<u32>,
    vibe_redeclare: Option<RedeclarePolicy>,
}

impl ConfigBuilder {
    /// Override the config file path
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn max_retries(mut self, max: Option<u32>) -> Self {
        self.max_retries = max;
        self
    }

    pub fn base_delay_ms(mut self, delay: Option<u64>) -> Self {
        self.base_delay_ms = delay;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: Option<u32>) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn vibe_redeclare(mut self, policy: Option<RedeclarePolicy>) -> Self {
        self.vibe_redeclare = policy;
        self
    }

    /// Build the final config by applying the priority chain
    pub fn build(self) -> Result<Config> {
        // Step 1: Start with defaults
        let mut config = Config::default();

        // Step 2: Try to load from config file
        if let Some(file_config) = self.load_from_file()? {
            config = file_config;
        }

        // Step 3: Overlay environment variables
        apply_env_vars(&mut config)?;

        // Step 4: Apply builder overrides (highest priority)
        if let Some(max) = self.max_retries {
            config.retry.max_retries = max;
        }
        if let Some(delay) = self.base_delay_ms {
            config.retry.base_delay_ms = delay;
        }
        if let Some(rounds) = self.max_tool_rounds {
            config.tools.max_rounds = rounds;
        }
        if let Some(policy) = self.vibe_redeclare {
            config.vibe.redeclare = policy;
        }

        Ok(config)
    }

    /// Try to load config from file (searches default locations if no path
    /// was specified)
    fn load_from_file(&self) -> Result<Option<Config>> {
        let config_path = if let Some(path) = &self.config_path {
            if !path.exists() {
                anyhow::bail!("Config file not found: {:?}", path);
            }
            Some(path.clone())
        } else if let Ok(path_str) = env::var("ARIA_CONFIG_PATH") {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                anyhow::bail!("Config file not found: {:?}", path);
            }
            Some(path)
        } else {
            find_config_file()
        };

        if let Some(path) = config_path {
            let config = Config::from_file(&path)?;
            Ok(Some(config))
        } else {
            Ok(None)
        }
    }
}

/// Search for config file in default locations
fn find_config_file() -> Option<PathBuf> {
    // 1. Project root: ./aria.toml
    let project_config = PathBuf::from("aria.toml");
    if project_config.exists() {
        return Some(project_config);
    }

    // 2. User config: ~/.config/aria/config.toml
    if let Some(home) = env::var_os("HOME") {
        let user_config = PathBuf::from(home)
            .join(".config")
            .join("aria")
            .join("config.toml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    None
}

fn apply_env_vars(config: &mut Config) -> Result<()> {
    if let Ok(val) = env::var("ARIA_MAX_RETRIES") {
        config.retry.max_retries = val
            .parse()
            .context("ARIA_MAX_RETRIES must be an unsigned integer")?;
    }
    if let Ok(val) = env::var("ARIA_RETRY_BASE_DELAY_MS") {
        config.retry.base_delay_ms = val
            .parse()
            .context("ARIA_RETRY_BASE_DELAY_MS must be an unsigned integer")?;
    }
    if let Ok(val) = env::var("ARIA_MAX_TOOL_ROUNDS") {
        config.tools.max_rounds = val
            .parse()
            .context("ARIA_MAX_TOOL_ROUNDS must be an unsigned integer")?;
    }
    if let Ok(val) = env::var("ARIA_VIBE_REDECLARE") {
        config.vibe.redeclare = match val.to_ascii_lowercase().as_str() {
            "overwrite" => RedeclarePolicy::Overwrite,
            "reject" => RedeclarePolicy::Reject,
            other => anyhow::bail!("ARIA_VIBE_REDECLARE must be overwrite or reject, got {other}"),
        };
    }
    Ok(())
}
