//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `--config <path>`
//! 2. `$HAYSTACK_CONFIG` environment variable
//! 3. `~/.config/haystack/config.toml`
//! 4. Built-in defaults (everything is optional)
//!
//! `$OLLAMA_HOST`, when set, overrides `server.host`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use haystack_bench::BenchConfig;
use haystack_client::ServerConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    #[serde(flatten)]
    pub bench: BenchConfig,
}

/// Response cache settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache directory. Default: platform-specific cache dir.
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl Config {
    /// Resolved cache directory, `None` when caching is off.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        if !self.cache.enabled {
            return None;
        }
        Some(self.cache.dir.clone().unwrap_or_else(default_cache_dir))
    }

    fn apply_env(&mut self, ollama_host: Option<String>) {
        if let Some(host) = ollama_host.filter(|h| !h.trim().is_empty()) {
            self.server.host = host;
        }
    }
}

fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "haystack", "haystack")
        .map(|dirs| dirs.cache_dir().join("responses"))
        .unwrap_or_else(|| PathBuf::from(".haystack-cache"))
}

/// Load config from disk. Returns defaults if no config file exists.
/// An explicit `path_override` must exist.
pub fn load_config(path_override: Option<&Path>) -> Result<Config> {
    let mut config = match path_override {
        Some(p) => {
            if !p.exists() {
                bail!("config file not found: {}", p.display());
            }
            parse_file(p)?
        }
        None => match config_path() {
            Some(p) if p.exists() => parse_file(&p)?,
            _ => Config::default(),
        },
    };

    config.apply_env(std::env::var("OLLAMA_HOST").ok());
    config.bench.validate().context("invalid configuration")?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<Config> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("HAYSTACK_CONFIG") {
        return Some(PathBuf::from(p));
    }

    std::env::var("HOME").ok().map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("haystack")
            .join("config.toml")
    })
}

/// Show the active config path (for `haystack config`).
pub fn show_config_path(path_override: Option<&Path>) -> String {
    let path = path_override.map(Path::to_path_buf).or_else(config_path);
    match path {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}
