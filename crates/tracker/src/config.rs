use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use buildwatch_core::{ExerciseId, ResultEtaPolicy};
use serde::Deserialize;
type Result<T> = anyhow::Result<T>;

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    pub server_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_result_eta_ms")]
    pub default_result_eta_ms: u64,
    #[serde(default = "default_eta_step_ms")]
    pub eta_step_ms: u64,
    #[serde(default = "default_eta_bucket_size")]
    pub eta_bucket_size: u64,
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub watched_exercises: Vec<ExerciseId>,
}

impl TrackerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("failed to deserialize tracker config")
    }

    /// 指向 `server_url`、其余字段取默认值的配置。
    pub fn for_server(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            auth_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            default_result_eta_ms: default_result_eta_ms(),
            eta_step_ms: default_eta_step_ms(),
            eta_bucket_size: default_eta_bucket_size(),
            event_buffer_size: default_event_buffer_size(),
            listen_addr: default_listen_addr(),
            watched_exercises: Vec::new(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn eta_policy(&self) -> crate::Result<ResultEtaPolicy> {
        Ok(ResultEtaPolicy::new(
            Duration::from_millis(self.default_result_eta_ms),
            Duration::from_millis(self.eta_step_ms),
            self.eta_bucket_size,
        )?)
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_result_eta_ms() -> u64 {
    2 * 60 * 1000
}

fn default_eta_step_ms() -> u64 {
    4000 * 60
}

fn default_eta_bucket_size() -> u64 {
    100
}

fn default_event_buffer_size() -> usize {
    1_000
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}
