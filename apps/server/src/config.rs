//! Server configuration.
//!
//! Stored as TOML:
//! - Linux/macOS: `~/.config/chunkload/server.toml`
//! - Windows: `%APPDATA%/chunkload/server.toml`
//!
//! A missing file means defaults; it is never created implicitly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::Args;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Name reported in logs (hostname by default).
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Root of staging directories and merged files.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Chunk files copied at the same time during a merge.
    #[serde(default = "default_merge_concurrency")]
    pub merge_concurrency: usize,

    /// Request body limit, which bounds the chunk size clients may use.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "chunkload".into())
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3000
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("fileTarget")
}

fn default_merge_concurrency() -> usize {
    8
}

fn default_max_chunk_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            host: default_host(),
            port: default_port(),
            upload_dir: default_upload_dir(),
            merge_concurrency: default_merge_concurrency(),
            max_chunk_bytes: default_max_chunk_bytes(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults if absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Applies command-line overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(dir) = &args.upload_dir {
            self.upload_dir = dir.clone();
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn default_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("chunkload").join("server.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("chunkload")
            .join("server.toml")
    }
}
