use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://story.snapchat.com/@";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/131.0.0.0 Safari/537.36";

/// Runtime settings. Every field has a default so a partial TOML file is fine.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Profile endpoint; the handle is appended verbatim.
    pub base_url: String,
    pub user_agent: String,
    /// Upper bound on in-flight media downloads.
    pub concurrency: usize,
    pub request_timeout_secs: u64,
    /// Parent for fresh per-request temp directories. System temp dir when unset.
    pub temp_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: 8,
            request_timeout_secs: 30,
            temp_root: None,
        }
    }
}

impl Config {
    /// Defaults, then the config file (if any), then `STORYFETCH_*` environment overrides.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var_os("STORYFETCH_CONFIG").map(PathBuf::from);
        let path = explicit.clone().or_else(default_config_path);
        let mut cfg = match path {
            Some(p) if p.exists() => Self::from_file(&p)?,
            Some(p) if explicit.is_some() => anyhow::bail!("config file not found: {}", p.display()),
            _ => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    /// Connect and idle-read bound for media; whole-request bound for the profile page.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(text)?;
        Ok(cfg.normalized())
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("STORYFETCH_BASE_URL") { self.base_url = v; }
        if let Ok(v) = std::env::var("STORYFETCH_USER_AGENT") { self.user_agent = v; }
        if let Some(n) = std::env::var("STORYFETCH_CONCURRENCY").ok().and_then(|s| s.parse().ok()) { self.concurrency = n; }
        if let Some(n) = std::env::var("STORYFETCH_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) { self.request_timeout_secs = n; }
        if let Some(p) = std::env::var_os("STORYFETCH_TEMP_ROOT") { self.temp_root = Some(PathBuf::from(p)); }
        *self = std::mem::take(self).normalized();
    }

    fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        self
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "storyfetch").map(|dirs| dirs.config_dir().join("config.toml"))
}
