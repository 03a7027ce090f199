use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::WorkspaceId;

/// Client settings from `<config_dir>/taskdeck/config.toml`. Every field is
/// optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Base for push channels; derived from `api_url` when unset.
    #[serde(default)]
    pub push_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub output: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_prefix: default_api_prefix(),
            push_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            output: None,
        }
    }
}

impl ClientConfig {
    /// `api_url` joined with `api_prefix`, without a trailing slash.
    #[must_use]
    pub fn api_base(&self) -> String {
        let base = self.api_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');
        if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{prefix}")
        }
    }

    /// Push channel base: `push_url` if set, else `api_url` with the
    /// scheme swapped to `ws`/`wss`.
    #[must_use]
    pub fn push_base(&self) -> String {
        if let Some(url) = &self.push_url {
            return url.trim_end_matches('/').to_string();
        }
        let api = self.api_url.trim_end_matches('/');
        if let Some(rest) = api.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = api.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{api}")
        }
    }

    /// Channel URL for one workspace, authenticated by query token.
    #[must_use]
    pub fn push_channel_url(&self, workspace_id: WorkspaceId, token: &str) -> String {
        format!("{}/ws/{workspace_id}?token={token}", self.push_base())
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Config plus the resolved output mode, after env and CLI overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub client: ClientConfig,
    pub resolved_output: String,
    pub state_path: PathBuf,
}

/// Read `path`, or defaults when it does not exist.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load_config_file(path: &Path) -> Result<ClientConfig> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ClientConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// # Errors
///
/// See [`load_config_file`].
pub fn load_client_config() -> Result<ClientConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ClientConfig::default());
    };
    load_config_file(&config_dir.join("taskdeck/config.toml"))
}

/// Where the token and active workspace live. `TASKDECK_STATE` wins.
#[must_use]
pub fn state_path() -> PathBuf {
    if let Some(path) = env::var_os("TASKDECK_STATE") {
        return PathBuf::from(path);
    }
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("taskdeck/state.json")
}

/// Load config and apply overrides: `--api-url`, then `TASKDECK_API_URL`,
/// then the file. Output mode: `--json`, then `FORMAT`, then the file.
///
/// # Errors
///
/// Returns an error when the config file is unreadable or invalid.
pub fn resolve_config(cli_api_url: Option<&str>, cli_json: bool) -> Result<EffectiveConfig> {
    let file = load_client_config()?;
    let client = apply_overrides(
        file,
        cli_api_url,
        env::var("TASKDECK_API_URL").ok().as_deref(),
    );
    let resolved_output = resolve_output(cli_json, client.output.clone(), env::var("FORMAT").ok());

    Ok(EffectiveConfig {
        client,
        resolved_output,
        state_path: state_path(),
    })
}

fn apply_overrides(
    mut config: ClientConfig,
    cli_api_url: Option<&str>,
    env_api_url: Option<&str>,
) -> ClientConfig {
    if let Some(url) = cli_api_url.or(env_api_url).filter(|u| !u.trim().is_empty()) {
        config.api_url = url.trim().to_string();
    }
    config
}

fn resolve_output(cli_json: bool, file_output: Option<String>, env_format: Option<String>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = file_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = load_config_file(&dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.api_base(), "http://localhost:8000/api/v1");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_url = \"https://tasks.example.com/\"\noutput = \"json\"\n")
            .expect("write");

        let cfg = load_config_file(&path).expect("load");
        assert_eq!(cfg.api_base(), "https://tasks.example.com/api/v1");
        assert_eq!(cfg.output.as_deref(), Some("json"));
        assert_eq!(cfg.request_timeout_secs, 10);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "request_timeout_secs = \"soon\"").expect("write");
        let err = load_config_file(&path).expect_err("must fail");
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn push_url_is_derived_from_api_url() {
        let mut cfg = ClientConfig::default();
        assert_eq!(cfg.push_channel_url(7, "abc"), "ws://localhost:8000/ws/7?token=abc");

        cfg.api_url = "https://tasks.example.com".into();
        assert_eq!(cfg.push_base(), "wss://tasks.example.com");

        cfg.push_url = Some("wss://push.example.com/".into());
        assert_eq!(cfg.push_channel_url(9, "t"), "wss://push.example.com/ws/9?token=t");
    }

    #[test]
    fn cli_api_url_beats_env() {
        let cfg = apply_overrides(
            ClientConfig::default(),
            Some("http://cli:1"),
            Some("http://env:2"),
        );
        assert_eq!(cfg.api_url, "http://cli:1");

        let cfg = apply_overrides(ClientConfig::default(), None, Some("http://env:2"));
        assert_eq!(cfg.api_url, "http://env:2");

        let cfg = apply_overrides(ClientConfig::default(), None, Some("  "));
        assert_eq!(cfg.api_url, "http://localhost:8000");
    }

    #[test]
    fn output_precedence() {
        assert_eq!(resolve_output(true, Some("pretty".into()), Some("text".into())), "json");
        assert_eq!(resolve_output(false, Some("json".into()), Some("human".into())), "pretty");
        assert_eq!(resolve_output(false, Some("table".into()), None), "text");
    }
}
