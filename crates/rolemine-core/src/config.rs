use std::{env, path::Path};

use anyhow::{Context, Result};
use config as cfg;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

/// Azure OpenAI connection settings. The endpoint and key come from the
/// environment in deployments; everything else has sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "LlmConfig::default_deployment")]
    pub deployment: String,
    #[serde(default = "LlmConfig::default_api_version")]
    pub api_version: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,
    #[serde(default = "LlmConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "LlmConfig::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "LlmConfig::default_temperature")]
    pub temperature: f32,
    #[serde(default = "LlmConfig::default_max_tokens")]
    pub max_tokens: usize,
}

impl LlmConfig {
    fn default_deployment() -> String {
        "gpt-4o".to_string()
    }

    fn default_api_version() -> String {
        "2024-02-01".to_string()
    }

    fn default_timeout_secs() -> u64 {
        60
    }

    fn default_max_retries() -> u32 {
        3
    }

    fn default_temperature() -> f32 {
        0.3
    }

    fn default_max_tokens() -> usize {
        1000
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            deployment: Self::default_deployment(),
            api_version: Self::default_api_version(),
            api_key: None,
            timeout_secs: Self::default_timeout_secs(),
            max_retries: Self::default_max_retries(),
            temperature: Self::default_temperature(),
            max_tokens: Self::default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Default concurrency cap for batch generation.
    #[serde(default = "GenerationConfig::default_max_concurrent")]
    pub max_concurrent: usize,
    /// Entitlements included in a prompt before truncation kicks in.
    #[serde(default = "GenerationConfig::default_max_prompt_entitlements")]
    pub max_prompt_entitlements: usize,
}

impl GenerationConfig {
    fn default_max_concurrent() -> usize {
        5
    }

    fn default_max_prompt_entitlements() -> usize {
        25
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: Self::default_max_concurrent(),
            max_prompt_entitlements: Self::default_max_prompt_entitlements(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "Settings::default_env")]
    pub env: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Self::default_env(),
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            generation: GenerationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    fn default_env() -> String {
        env::var("APP_ENV")
            .ok()
            .or_else(|| env::var("RUST_ENV").ok())
            .unwrap_or_else(|| "development".to_string())
    }

    /// Load settings from layered sources: `default.toml`, `{env}.toml`,
    /// `local.toml` (all optional), then `ROLEMINE__*` environment
    /// variables, e.g. `ROLEMINE__LLM__API_KEY`.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let env_name = Self::default_env();
        let settings: Settings = cfg::Config::builder()
            .add_source(cfg::File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.toml", env_name))).required(false),
            )
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(cfg::Environment::with_prefix("ROLEMINE").separator("__"))
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.server.host.trim().is_empty(),
            "server.host cannot be empty"
        );
        anyhow::ensure!(self.server.port > 0, "server.port must be > 0");
        anyhow::ensure!(
            self.generation.max_concurrent >= 1,
            "generation.max_concurrent must be >= 1"
        );
        anyhow::ensure!(
            self.generation.max_prompt_entitlements >= 1,
            "generation.max_prompt_entitlements must be >= 1"
        );
        anyhow::ensure!(self.llm.max_retries <= 10, "llm.max_retries must be <= 10");
        Ok(())
    }
}
