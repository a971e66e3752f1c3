use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RoutetraceError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether the assistant stage of endpoint resolution is available
    pub enabled: bool,

    /// LLM provider (openai speaks any OpenAI-compatible chat completion endpoint)
    pub provider: String,

    /// Model name (e.g., "gpt-4o-mini")
    pub model: String,

    /// API key; falls back to OPENAI_API_KEY when unset
    pub api_key: Option<String>,

    /// Base URL for self-hosted or proxy endpoints
    pub base_url: Option<String>,

    /// Maximum tokens for LLM responses
    pub max_tokens: Option<u32>,

    /// Temperature for LLM responses (0.0 to 1.0)
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Endpoint discovery settings
    pub discovery: DiscoveryConfig,

    /// Call tree expansion limits
    pub call_tree: CallTreeConfig,

    /// Call contract shared by every external collaborator
    pub collaborators: CollaboratorConfig,

    /// LLM integration settings
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Root directory holding the controllers
    pub source_dir: PathBuf,

    /// Glob selecting the files handed to symbol introspection
    pub include_glob: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Lines above a class name searched for controller annotations
    pub class_window_lines: usize,

    /// Files introspected concurrently
    pub concurrency: usize,

    /// Maximum file size to parse (in bytes)
    pub max_file_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTreeConfig {
    /// Deepest level expanded below the handler
    pub max_depth: usize,

    /// Upper bound on nodes in one tree
    pub max_nodes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    /// Timeout applied to each symbol, oracle and assistant call
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                name: "Unnamed Project".to_string(),
                source_dir: PathBuf::from("."),
                include_glob: "**/*.java".to_string(),
            },
            discovery: DiscoveryConfig {
                class_window_lines: 5,
                concurrency: 8,
                max_file_size: 1024 * 1024, // 1MB
            },
            call_tree: CallTreeConfig {
                max_depth: 6,
                max_nodes: 512,
            },
            collaborators: CollaboratorConfig { timeout_secs: 30 },
            llm: LlmConfig {
                enabled: false,
                provider: "openai".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                base_url: None,
                max_tokens: Some(16),
                temperature: Some(0.0),
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| RoutetraceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RoutetraceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Routetrace.toml",
                    "routetrace.toml",
                    ".routetrace.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.discovery.concurrency == 0 {
            return Err(RoutetraceError::Config(
                "discovery.concurrency must be at least 1".to_string(),
            ));
        }
        if self.collaborators.timeout_secs == 0 {
            return Err(RoutetraceError::Config(
                "collaborators.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
