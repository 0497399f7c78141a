use std::env;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Value, json};

/// Default hosted gateway brokering the OAuth client-secret exchange.
pub const DEFAULT_GATEWAY_URL: &str = "https://github-oauth-gateway.herokuapp.com/";

/// Default total-elapsed ceiling (seconds) for the access-token polling loop.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 60;

/// The exact set of recognized configuration options, as exposed by
/// `GET /config`. A unit test asserts this list matches the serde model of
/// [`Config`] so the two can never drift apart.
pub const CONFIG_KEYS: [&str; 5] = [
    "debug",
    "githubAccessToken",
    "projectConfigPath",
    "oauthGatewayUrl",
    "accessTokenPollTimeout",
];

/// Runtime configuration for the assemble server.
///
/// Environment variables are consumed as defaults only; explicit values
/// (CLI flags) always win. Immutable once the server starts — the access
/// token obtained through OAuth lives in the session, not here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Dry-run mode: no fork/push/PR-creation ever touches GitHub.
    pub debug: bool,
    /// Initial GitHub access token; seeds the session at startup.
    pub github_access_token: String,
    /// Explicit path to the project descriptor (file or directory).
    pub project_config_path: String,
    /// Base URL of the OAuth gateway service.
    pub oauth_gateway_url: String,
    /// Polling ceiling, in seconds, for the token exchange.
    pub access_token_poll_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            github_access_token: String::new(),
            project_config_path: String::new(),
            oauth_gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            access_token_poll_timeout: DEFAULT_POLL_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Build a config from environment defaults: `ASSEMBLE_DEBUG` and
    /// `GITHUB_TOKEN` are honored when present.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = env::var("ASSEMBLE_DEBUG") {
            config.debug = truthy(&v);
        }
        if let Ok(token) = env::var("GITHUB_TOKEN") {
            config.github_access_token = token;
        }
        config
    }

    /// Set the project descriptor path, expanding `~` and resolving the
    /// result to an absolute path.
    pub fn set_project_config_path(&mut self, path: &str) {
        if path.is_empty() {
            self.project_config_path = String::new();
        } else {
            self.project_config_path = normalize_path(path).to_string_lossy().into_owned();
        }
    }

    /// Recognized options and their current values, in declaration order.
    /// This is the hand-maintained registry backing `GET /config`.
    pub fn entries(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("debug", json!(self.debug)),
            ("githubAccessToken", json!(self.github_access_token)),
            ("projectConfigPath", json!(self.project_config_path)),
            ("oauthGatewayUrl", json!(self.oauth_gateway_url)),
            (
                "accessTokenPollTimeout",
                json!(self.access_token_poll_timeout),
            ),
        ]
    }

    /// Look up one recognized option by its wire key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries()
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

/// Interpret common affirmative strings as true.
pub fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "t" | "yes" | "y" | "on"
    )
}

/// Expand a leading `~` and anchor relative paths at the current directory.
/// Does not require the path to exist.
pub fn normalize_path(path: &str) -> PathBuf {
    let expanded = if let Some(rest) = path.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        }
    } else if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    };

    if expanded.is_absolute() {
        expanded
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    }
}
