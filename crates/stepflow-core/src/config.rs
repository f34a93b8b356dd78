use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StepflowError};

/// Reserved registry name of the fallback capability.
pub const DEFAULT_FALLBACK_TOOL: &str = "__fallback__";

/// Visit cap applied when neither node, run nor config sets one.
pub const DEFAULT_MAX_VISITS_PER_NODE: u32 = 10;

/// Top-level stepflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_visits_per_node")]
    pub max_visits_per_node: u32,
    #[serde(default = "default_fallback_tool_name")]
    pub fallback_tool_name: String,
    #[serde(default)]
    pub fallback: FallbackPolicy,
    #[serde(default)]
    pub dead_end: DeadEndPolicy,
    /// Default execution mode for callers that do not pick one.
    #[serde(default)]
    pub mode: ExecutionMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_visits_per_node: default_max_visits_per_node(),
            fallback_tool_name: default_fallback_tool_name(),
            fallback: FallbackPolicy::default(),
            dead_end: DeadEndPolicy::default(),
            mode: ExecutionMode::default(),
        }
    }
}

fn default_max_visits_per_node() -> u32 {
    DEFAULT_MAX_VISITS_PER_NODE
}

fn default_fallback_tool_name() -> String {
    DEFAULT_FALLBACK_TOOL.to_string()
}

/// What happens when a tool is missing or fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Substitute the fallback capability's output and continue.
    #[default]
    Enabled,
    /// Fail the run on the first tool failure.
    Disabled,
}

/// What happens when no outgoing edge matches and there is no default edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadEndPolicy {
    /// The run completes at that node.
    #[default]
    Complete,
    /// The run fails.
    Fail,
}

/// Whether `start_run` waits for the run to finish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Spawn the run and return its id immediately.
    #[default]
    Background,
    /// Drive the run to a terminal status before returning.
    Sync,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl AppConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StepflowError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text, expanding `${ENV_VAR}` references.
    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| StepflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()
    }

    /// Gateway settings, falling back to defaults when the section is absent.
    pub fn gateway_or_default(&self) -> GatewayConfig {
        self.gateway.clone().unwrap_or_default()
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_visits_per_node == 0 {
            return Err(StepflowError::Config(
                "engine.max_visits_per_node must be a positive integer".into(),
            ));
        }
        if self.fallback_tool_name.trim().is_empty() {
            return Err(StepflowError::Config(
                "engine.fallback_tool_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
