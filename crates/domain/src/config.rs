//! Configuration tree, loaded from TOML with `#[serde(default)]` on every
//! section (teacher's `sa_domain::config::Config` pattern).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            cors: CorsConfig::default(),
            api_token_env: d_api_token_env(),
        }
    }
}

fn d_host() -> String {
    "127.0.0.1".to_string()
}
fn d_port() -> u16 {
    4173
}
fn d_api_token_env() -> String {
    "MAESTRO_API_TOKEN".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "d_data_path")]
    pub data_path: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            data_path: d_data_path(),
        }
    }
}

fn d_data_path() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Hard ceiling on manifest composition + write during spawn (§5).
    #[serde(default = "d_spawn_ceiling")]
    pub spawn_ceiling_sec: u64,
    /// Default model fallback, used when no priority tier resolves one (§4.3).
    #[serde(default = "d_fallback_model")]
    pub fallback_model: String,
    /// Default agent tool fallback.
    #[serde(default = "d_fallback_agent_tool")]
    pub fallback_agent_tool: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            spawn_ceiling_sec: d_spawn_ceiling(),
            fallback_model: d_fallback_model(),
            fallback_agent_tool: d_fallback_agent_tool(),
        }
    }
}

fn d_spawn_ceiling() -> u64 {
    30
}
fn d_fallback_model() -> String {
    "claude-sonnet".to_string()
}
fn d_fallback_agent_tool() -> String {
    "claude".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// TTL applied uniformly to messages (open question D.2 in SPEC_FULL.md).
    #[serde(default = "d_message_ttl")]
    pub default_ttl_seconds: i64,
    /// Sliding-window rate limit: max messages per sender per window.
    #[serde(default = "d_rate_limit_max")]
    pub rate_limit_max: u32,
    #[serde(default = "d_rate_limit_window")]
    pub rate_limit_window_sec: i64,
    #[serde(default = "d_max_body_len")]
    pub max_body_len: usize,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: d_message_ttl(),
            rate_limit_max: d_rate_limit_max(),
            rate_limit_window_sec: d_rate_limit_window(),
            max_body_len: d_max_body_len(),
        }
    }
}

fn d_message_ttl() -> i64 {
    7 * 24 * 3600
}
fn d_rate_limit_max() -> u32 {
    20
}
fn d_rate_limit_window_sec() -> i64 {
    60
}
fn d_rate_limit_window() -> i64 {
    d_rate_limit_window_sec()
}
fn d_max_body_len() -> usize {
    8_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Commands always included regardless of role/mode (§4.4).
    #[serde(default = "d_core_commands")]
    pub core_commands: Vec<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            core_commands: d_core_commands(),
        }
    }
}

fn d_core_commands() -> Vec<String> {
    vec![
        "identity".to_string(),
        "status".to_string(),
        "help".to_string(),
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| crate::error::Error::Validation(format!("parsing config: {e}")))
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "server.port must be nonzero".to_string(),
            });
        }
        if self.sessions.spawn_ceiling_sec == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "sessions.spawn_ceiling_sec is 0 — spawns will always time out"
                    .to_string(),
            });
        }
        if self.messages.default_ttl_seconds <= 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "messages.default_ttl_seconds should be positive".to_string(),
            });
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_errors() {
        let cfg = Config::default();
        let issues = cfg.validate();
        assert!(!issues.iter().any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn load_missing_file_returns_default() {
        let cfg = Config::load(std::path::Path::new("/nonexistent/maestro.toml")).unwrap();
        assert_eq!(cfg.server.port, d_port());
    }
}
