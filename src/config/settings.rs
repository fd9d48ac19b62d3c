//! Runtime settings for the model gateway and the solver, persisted as TOML.
//!
//! Every key is optional:
//!
//! ```toml
//! [llm]
//! base_url = "http://localhost:11434/v1"
//! model = "llama3.2"
//! max_retries = 4
//!
//! [solver]
//! timeout_ms = 2000
//! arguments = ["--opt-strategy=usc,k,0,5", "--opt-usc-shrink=rgs"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Environment variable that overrides `llm.api_key`.
pub const API_KEY_ENV: &str = "LLMASP_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub solver: SolverSettings,
}

/// OpenAI-compatible endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Overall request timeout in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after a failed request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_model() -> String {
    "llama3.2".into()
}
fn default_api_key() -> String {
    "ollama".into()
}
fn default_llm_timeout_secs() -> u64 {
    3600
}
fn default_max_retries() -> u32 {
    4
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: default_api_key(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which embedded scripting language provides the `@min` helper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelperScript {
    #[default]
    Lua,
    Python,
    /// No helper functions; for solver builds without scripting support.
    None,
}

/// Answer-set solver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Solver executable, looked up on `PATH` when not a path.
    #[serde(default = "default_solver_binary")]
    pub binary: String,
    /// Engine flags passed before the program.
    #[serde(default = "default_solver_arguments")]
    pub arguments: Vec<String>,
    /// Solve budget in milliseconds.
    #[serde(default = "default_solver_timeout_ms")]
    pub timeout_ms: u64,
    /// How long a cancelled solver may take to report before it is killed.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
    #[serde(default)]
    pub helper_script: HelperScript,
}

fn default_solver_binary() -> String {
    "clingo".into()
}
fn default_solver_arguments() -> Vec<String> {
    vec![
        "--opt-strategy=usc,k,0,5".into(),
        "--opt-usc-shrink=rgs".into(),
    ]
}
fn default_solver_timeout_ms() -> u64 {
    2000
}
fn default_cancel_grace_ms() -> u64 {
    5000
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            binary: default_solver_binary(),
            arguments: default_solver_arguments(),
            timeout_ms: default_solver_timeout_ms(),
            cancel_grace_ms: default_cancel_grace_ms(),
            helper_script: HelperScript::default(),
        }
    }
}

impl SolverSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

impl Settings {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SettingsRead {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content, path)
    }

    pub fn from_toml(content: &str, path: &Path) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::SettingsParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Apply the `LLMASP_API_KEY` override, if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.llm.api_key = key;
            }
        }
        self
    }
}
