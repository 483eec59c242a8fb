//! Audit Configuration
//!
//! Connection descriptors come from a JSON file; run settings come from the CLI.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::audit::reconciler::{DEFAULT_POLL_INTERVAL, DEFAULT_SCOPE_TIMEOUT};

pub const DEFAULT_CONTEXT_PATH: &str = "/cxs";

/// One analytics service instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Base URL, e.g. `http://localhost:8181`
    pub url: String,
    pub username: String,
    pub password: String,
    /// REST root appended to `url`
    #[serde(default = "default_context_path")]
    pub context_path: String,
}

fn default_context_path() -> String {
    DEFAULT_CONTEXT_PATH.to_string()
}

impl HostConfig {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            context_path: default_context_path(),
        }
    }

    /// Service root with no trailing slash
    pub fn api_root(&self) -> String {
        let base = self.url.trim_end_matches('/');
        let ctx = self.context_path.trim_matches('/');
        if ctx.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, ctx)
        }
    }
}

/// Content of the connection file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    pub source: HostConfig,
    pub target: HostConfig,
}

impl ConnectionsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {:?}", path))?;
        Self::from_json(&content).with_context(|| format!("Invalid configuration file {:?}", path))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).context("Failed to parse connections")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, host) in [("source", &self.source), ("target", &self.target)] {
            if host.url.trim().is_empty() {
                bail!("{} url must not be empty", name);
            }
        }
        Ok(())
    }
}

/// How source pages are walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PaginationMode {
    /// Server-side scroll cursor with a validity duration
    Scroll,
    /// Plain limit/offset paging, stopped client-side at the retention window
    Offset,
}

/// Settings for a single audit run
#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub batch_size: u32,
    pub limit_of_days: u32,
    /// Time-unit string understood by the source, e.g. `2h`
    pub scroll_time_validity: String,
    pub pagination: PaginationMode,
    pub create_scopes: bool,
    pub scope_timeout: Duration,
    pub scope_poll_interval: Duration,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            limit_of_days: 60,
            scroll_time_validity: "2h".to_string(),
            pagination: PaginationMode::Scroll,
            create_scopes: false,
            scope_timeout: DEFAULT_SCOPE_TIMEOUT,
            scope_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl AuditSettings {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch size must be greater than zero");
        }
        if self.scroll_time_validity.trim().is_empty() {
            bail!("scroll time validity must not be empty");
        }
        if self.scope_poll_interval.is_zero() {
            bail!("scope poll interval must be greater than zero");
        }
        Ok(())
    }

    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.limit_of_days))
    }
}
