//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::retrieval::RankingConfig;

/// Secgraph configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub ranking: RankingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub model: String,
    /// API base URL override; defaults to the OpenAI endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Expansion depth (1 to 3)
    pub depth: u32,
    /// Cap on nodes admitted during expansion
    pub max_nodes: usize,
    /// Maximum seeds resolved from free text
    pub max_seeds: usize,
    /// TTL for cached retrieval results, in seconds
    pub cache_ttl_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o".to_string(),
            base_url: None,
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 30,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            depth: 1,
            max_nodes: 500,
            max_seeds: 10,
            cache_ttl_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("SECGRAPH_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                if key.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix = &key[key.len() - 4..];
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("SECGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("secgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            // Return default config without creating file
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;

        if self.retrieval.depth == 0 || self.retrieval.depth > 3 {
            return Err(anyhow!("retrieval.depth must be between 1 and 3"));
        }
        if self.retrieval.max_nodes == 0 {
            return Err(anyhow!("retrieval.max_nodes must be positive"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // LLM settings
            "llm.model" => Ok(self.llm.model.clone()),
            "llm.base_url" => Ok(self.llm.base_url.clone().unwrap_or_else(|| "(default)".to_string())),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),

            // Retrieval settings
            "retrieval.depth" => Ok(self.retrieval.depth.to_string()),
            "retrieval.max_nodes" => Ok(self.retrieval.max_nodes.to_string()),
            "retrieval.max_seeds" => Ok(self.retrieval.max_seeds.to_string()),
            "retrieval.cache_ttl_secs" => Ok(self.retrieval.cache_ttl_secs.to_string()),

            // Ranking settings
            "ranking.seed_weight" => Ok(self.ranking.seed_weight.to_string()),
            "ranking.hop_decay" => Ok(self.ranking.hop_decay.to_string()),
            "ranking.severity_weight" => Ok(self.ranking.severity_weight.to_string()),
            "ranking.max_nodes" => Ok(self.ranking.max_nodes.to_string()),

            // API key (special handling - show redacted)
            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok(
                    "(not set - use SECGRAPH_API_KEY or OPENAI_API_KEY env var)".to_string(),
                ),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `secgraph config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            // LLM settings
            "llm.model" => {
                self.llm.model = value.to_string();
            }
            "llm.base_url" => {
                self.llm.base_url = Some(value.to_string());
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            // Retrieval settings
            "retrieval.depth" => {
                let depth: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid depth value: {}", value))?;
                if !(1..=3).contains(&depth) {
                    return Err(anyhow!("Depth must be between 1 and 3"));
                }
                self.retrieval.depth = depth;
            }
            "retrieval.max_nodes" => {
                self.retrieval.max_nodes = value
                    .parse()
                    .with_context(|| format!("Invalid max_nodes value: {}", value))?;
            }
            "retrieval.max_seeds" => {
                self.retrieval.max_seeds = value
                    .parse()
                    .with_context(|| format!("Invalid max_seeds value: {}", value))?;
            }
            "retrieval.cache_ttl_secs" => {
                self.retrieval.cache_ttl_secs = value
                    .parse()
                    .with_context(|| format!("Invalid cache_ttl_secs value: {}", value))?;
            }

            // Ranking settings
            "ranking.seed_weight" => {
                self.ranking.seed_weight = value
                    .parse()
                    .with_context(|| format!("Invalid seed_weight value: {}", value))?;
            }
            "ranking.hop_decay" => {
                self.ranking.hop_decay = value
                    .parse()
                    .with_context(|| format!("Invalid hop_decay value: {}", value))?;
            }
            "ranking.severity_weight" => {
                self.ranking.severity_weight = value
                    .parse()
                    .with_context(|| format!("Invalid severity_weight value: {}", value))?;
            }
            "ranking.max_nodes" => {
                self.ranking.max_nodes = value
                    .parse()
                    .with_context(|| format!("Invalid max_nodes value: {}", value))?;
            }

            // API key cannot be set via config
            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the SECGRAPH_API_KEY or OPENAI_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `secgraph config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = vec![
            "llm.model",
            "llm.base_url",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.api_key",
            "retrieval.depth",
            "retrieval.max_nodes",
            "retrieval.max_seeds",
            "retrieval.cache_ttl_secs",
            "ranking.seed_weight",
            "ranking.hop_decay",
            "ranking.severity_weight",
            "ranking.max_nodes",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
