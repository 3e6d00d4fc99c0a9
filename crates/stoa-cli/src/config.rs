//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$STOA_CONFIG` environment variable
//! 2. `~/.config/stoa/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use stoa_core::{EvaluationConfig, Language};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub gateway: GatewayConfig,
    pub session: SessionConfig,
    pub evaluation: EvaluationConfig,
    pub export: ExportConfig,
}

/// Database storage settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path. Default: platform-specific data dir.
    pub path: Option<String>,
}

/// LLM proxy settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Chat-completion proxy endpoint.
    pub endpoint: String,
    /// Model name forwarded to the proxy.
    pub model: String,
}

/// Learner/session settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub username: String,
    pub language: Language,
    /// Classroom rounds required before the test session opens.
    pub min_classroom_rounds: u32,
}

/// Research-log and survey upload settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub log_endpoint: String,
    pub pretest_endpoint: String,
    pub posttest_endpoint: String,
    /// Seconds the background saver coalesces changes before uploading.
    pub autosave_secs: u64,
}

// --- Defaults ---

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/chat-proxy".into(),
            model: "deepseek-chat".into(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            username: "anonymous".into(),
            language: Language::En,
            min_classroom_rounds: 3,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            log_endpoint: "http://localhost:3000/api/save-log".into(),
            pretest_endpoint: "http://localhost:3000/api/save-pretest".into(),
            posttest_endpoint: "http://localhost:3000/api/save-posttest".into(),
            autosave_secs: 3,
        }
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    let path = config_path();

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    // 1. Environment variable
    if let Ok(p) = std::env::var("STOA_CONFIG") {
        return Some(PathBuf::from(p));
    }

    // 2. ~/.config/stoa/config.toml
    if let Some(home) = dirs_home() {
        let p = home.join(".config").join("stoa").join("config.toml");
        return Some(p);
    }

    None
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

/// Show the active config path (for `stoa config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.min_classroom_rounds, 3);
        assert_eq!(config.evaluation.variance_threshold, 1.0);
        assert_eq!(config.evaluation.max_attempts, 5);
        assert_eq!(config.export.autosave_secs, 3);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[evaluation]
variance_threshold = 2.0
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.evaluation.variance_threshold, 2.0);
        // Other fields should be defaults
        assert_eq!(config.evaluation.max_attempts, 5);
        assert_eq!(config.session.username, "anonymous");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[store]
path = "/tmp/stoa-test.db"

[gateway]
endpoint = "https://edu.example.com/api/chat-proxy"
model = "deepseek-chat"

[session]
username = "s042"
language = "zh"
min_classroom_rounds = 5

[evaluation]
variance_threshold = 1.5
max_attempts = 3

[export]
log_endpoint = "https://edu.example.com/api/save-log"
pretest_endpoint = "https://edu.example.com/api/save-pretest"
posttest_endpoint = "https://edu.example.com/api/save-posttest"
autosave_secs = 10
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.path.as_deref(), Some("/tmp/stoa-test.db"));
        assert_eq!(config.session.username, "s042");
        assert_eq!(config.session.language, Language::Zh);
        assert_eq!(config.evaluation.max_attempts, 3);
        assert_eq!(config.export.autosave_secs, 10);
    }
}
