use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

const CONFIG_FILE: &str = ".fix-pipeline.toml";

/// Upper bounds for the `[limits]` section; larger values are clamped.
const MAX_TIMEOUT_SECS: u64 = 3600;
const MAX_READ_ATTEMPTS: u32 = 10;

/// Top-level configuration loaded from .fix-pipeline.toml and the environment.
///
/// All fields are optional in the file; environment variables win over file values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. Without it every change request goes to the in-memory store.
    pub token: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    /// Base URL of the GitHub REST API (overridable for GitHub Enterprise).
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicesConfig {
    /// Diagnostic provider base URL
    pub llm1_url: Option<String>,
    /// Solution generator base URL
    pub llm2_url: Option<String>,
    /// Change-request service base URL
    pub pr_service_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfig {
    pub upstream_timeout_secs: Option<u64>,
    pub vcs_timeout_secs: Option<u64>,
    pub read_retry_attempts: Option<u32>,
}

/// Credentials and target for the real GitHub path. Only exists when all three are set.
#[derive(Debug, Clone)]
pub struct GitHubTarget {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub api_url: String,
}

impl Config {
    /// Load `.env`, then `.fix-pipeline.toml` from the current directory (if present),
    /// then apply environment overrides.
    pub fn load() -> Result<Config, ConfigError> {
        dotenvy::dotenv().ok();
        let path = Path::new(CONFIG_FILE);
        let file = if path.exists() { Some(path) } else { None };
        Self::from_sources(file, |var| std::env::var(var).ok())
    }

    /// Load from a specific file (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Build the configuration from an optional file plus a variable lookup.
    pub fn from_sources<F>(file: Option<&Path>, env: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match file {
            Some(path) => Self::load_from(path)?,
            None => Config::default(),
        };
        let env = |var: &str| env(var).filter(|v| !v.trim().is_empty());

        if let Some(token) = env("GITHUB_TOKEN") {
            config.github.token = Some(token);
        }
        if let Some(owner) = env("TARGET_GITHUB_OWNER").or_else(|| env("GITHUB_OWNER")) {
            config.github.owner = Some(owner);
        }
        if let Some(repo) = env("TARGET_GITHUB_REPO") {
            config.github.repo = Some(repo);
        }
        if let Some(url) = env("GITHUB_API_URL") {
            config.github.api_url = Some(url);
        }
        if let Some(url) = env("LLM1_URL") {
            config.services.llm1_url = Some(url);
        }
        if let Some(url) = env("LLM2_URL") {
            config.services.llm2_url = Some(url);
        }
        if let Some(url) = env("GITHUB_SERVICE_URL") {
            config.services.pr_service_url = Some(url);
        }
        if let Some(host) = env("HOST") {
            config.server.host = Some(host);
        }
        if let Some(port) = env("PORT") {
            config.server.port = Some(parse_var("PORT", &port)?);
        }
        if let Some(secs) = env("UPSTREAM_TIMEOUT_SECS") {
            config.limits.upstream_timeout_secs = Some(parse_var("UPSTREAM_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = env("VCS_TIMEOUT_SECS") {
            config.limits.vcs_timeout_secs = Some(parse_var("VCS_TIMEOUT_SECS", &secs)?);
        }
        if let Some(n) = env("READ_RETRY_ATTEMPTS") {
            config.limits.read_retry_attempts = Some(parse_var("READ_RETRY_ATTEMPTS", &n)?);
        }

        Ok(config)
    }

    /// The real GitHub target, if token, owner and repo are all configured.
    pub fn github_target(&self) -> Option<GitHubTarget> {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        Some(GitHubTarget {
            token: non_empty(&self.github.token)?,
            owner: non_empty(&self.github.owner)?,
            repo: non_empty(&self.github.repo)?,
            api_url: self
                .github
                .api_url
                .clone()
                .unwrap_or_else(|| "https://api.github.com".to_string()),
        })
    }

    pub fn has_github_token(&self) -> bool {
        self.github.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn llm1_url(&self) -> String {
        self.services
            .llm1_url
            .clone()
            .unwrap_or_else(|| "http://localhost:5001".to_string())
    }

    pub fn llm2_url(&self) -> String {
        self.services
            .llm2_url
            .clone()
            .unwrap_or_else(|| "http://localhost:5002".to_string())
    }

    pub fn pr_service_url(&self) -> String {
        self.services
            .pr_service_url
            .clone()
            .unwrap_or_else(|| "http://localhost:3005".to_string())
    }

    pub fn host(&self) -> String {
        self.server.host.clone().unwrap_or_else(|| "0.0.0.0".to_string())
    }

    /// Bind port, falling back to the per-service default.
    pub fn port_or(&self, default: u16) -> u16 {
        self.server.port.unwrap_or(default)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.upstream_timeout_secs.unwrap_or(30).clamp(1, MAX_TIMEOUT_SECS))
    }

    pub fn vcs_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.vcs_timeout_secs.unwrap_or(60).clamp(1, MAX_TIMEOUT_SECS))
    }

    pub fn read_retry_attempts(&self) -> u32 {
        self.limits.read_retry_attempts.unwrap_or(3).clamp(1, MAX_READ_ATTEMPTS)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}
