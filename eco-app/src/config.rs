//! EcoSentinel configuration loader.

use anyhow::Result;
use eco_forms::FormConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EcoConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub forms: FormsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_http_max_in_flight")]
    pub http_max_in_flight: usize,
    /// Browser origins allowed to call the API, e.g. a chat widget host.
    /// Empty disables CORS; `"*"` allows any origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
    /// Conversations untouched for this long are dropped from memory.
    #[serde(default = "default_conversation_idle_seconds")]
    pub conversation_idle_seconds: u64,
    #[serde(default = "default_idle_sweep_interval_seconds")]
    pub idle_sweep_interval_seconds: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:5055".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    30
}

fn default_http_max_in_flight() -> usize {
    256
}

fn default_conversation_idle_seconds() -> u64 {
    3600
}

fn default_idle_sweep_interval_seconds() -> u64 {
    60
}

const MAX_CONVERSATION_IDLE_SECONDS: u64 = 30 * 24 * 3600;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_timeout_seconds: default_http_timeout_seconds(),
            http_max_in_flight: default_http_max_in_flight(),
            cors_allowed_origins: Vec::new(),
            conversation_idle_seconds: default_conversation_idle_seconds(),
            idle_sweep_interval_seconds: default_idle_sweep_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!(
                "unsupported storage backend {other:?}; expected one of: sqlite, memory"
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// `~/` is expanded against `$HOME`.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_sqlite_path() -> String {
    default_data_dir()
        .join("reports.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormsConfig {
    #[serde(default = "default_evidence_portal_url")]
    pub evidence_portal_url: String,
    #[serde(default = "default_review_window")]
    pub review_window: String,
}

fn default_evidence_portal_url() -> String {
    FormConfig::default().evidence_portal_url
}

fn default_review_window() -> String {
    FormConfig::default().review_window
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            evidence_portal_url: default_evidence_portal_url(),
            review_window: default_review_window(),
        }
    }
}

impl FormsConfig {
    pub fn to_form_config(&self) -> FormConfig {
        FormConfig {
            evidence_portal_url: self.evidence_portal_url.clone(),
            review_window: self.review_window.clone(),
        }
    }
}

impl EcoConfig {
    /// Loads the config file. A missing file at the default location falls back
    /// to built-in defaults; a missing explicit path is an error.
    pub async fn load(path: Option<PathBuf>) -> Result<(Self, PathBuf)> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(default_config_path);

        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    config_path = %path.display(),
                    "config file not found; using defaults (run `ecosentinel init` to create one)"
                );
                Self::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok((cfg, path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = lookup("ECOSENTINEL_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("ECOSENTINEL_STORAGE_BACKEND") {
            self.storage.backend = v.parse()?;
        }
        if let Some(v) = lookup("ECOSENTINEL_SQLITE_PATH") {
            self.storage.sqlite_path = v;
        }
        if let Some(v) = lookup("ECOSENTINEL_EVIDENCE_PORTAL_URL") {
            self.forms.evidence_portal_url = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let addr = self.bind_addr()?;
        if addr.port() == 0 {
            return Err(anyhow::anyhow!("server.bind_addr port must be > 0"));
        }
        if self.server.http_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("server.http_timeout_seconds must be > 0"));
        }
        if self.server.http_max_in_flight == 0 {
            return Err(anyhow::anyhow!("server.http_max_in_flight must be > 0"));
        }
        if !(1..=MAX_CONVERSATION_IDLE_SECONDS).contains(&self.server.conversation_idle_seconds) {
            return Err(anyhow::anyhow!(
                "server.conversation_idle_seconds must be between 1 and {MAX_CONVERSATION_IDLE_SECONDS}"
            ));
        }
        if self.server.idle_sweep_interval_seconds == 0 {
            return Err(anyhow::anyhow!("server.idle_sweep_interval_seconds must be > 0"));
        }
        for origin in &self.server.cors_allowed_origins {
            if origin != "*" && axum::http::HeaderValue::from_str(origin).is_err() {
                return Err(anyhow::anyhow!(
                    "server.cors_allowed_origins contains invalid origin {origin:?}"
                ));
            }
        }
        if self.storage.backend == StorageBackend::Sqlite
            && self.storage.sqlite_path.trim().is_empty()
        {
            return Err(anyhow::anyhow!(
                "storage.sqlite_path is required when storage.backend = \"sqlite\""
            ));
        }
        if self.forms.evidence_portal_url.trim().is_empty() {
            return Err(anyhow::anyhow!("forms.evidence_portal_url is required"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind_addr
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid server.bind_addr {:?}: {e}", self.server.bind_addr))
    }

    pub fn sqlite_path(&self) -> Result<PathBuf> {
        expand_home(&self.storage.sqlite_path)
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

pub fn default_config_path() -> PathBuf {
    home_dir().join(".ecosentinel").join("config.toml")
}

pub fn default_data_dir() -> PathBuf {
    home_dir().join(".ecosentinel").join("data")
}

fn expand_home(path: &str) -> Result<PathBuf> {
    let trimmed = path.trim();
    let Some(rest) = trimmed.strip_prefix("~/") else {
        return Ok(PathBuf::from(trimmed));
    };
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(Path::new(&home).join(rest))
}
