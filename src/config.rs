//! Runtime configuration.
//!
//! Defaults, then the TOML file named by `NUTHATCH_CONFIG`, then the
//! environment (`NUTHATCH_BACKEND`, `XCURSOR_THEME`, `XCURSOR_SIZE`).

use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::protocol::{ShellProtocol, XdgShell};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory backend driven by a scripted session.
    Headless,
    /// Nested compositor window (needs the `winit` feature).
    Winit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    pub theme: String,
    pub size: u32,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            theme: "default".into(),
            size: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub backend: BackendKind,
    /// Used when `RUST_LOG` is not set.
    pub log_filter: String,
    pub seat_name: String,
    pub xdg_shell_version: u32,
    pub cursor: CursorConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Headless,
            log_filter: "info".into(),
            seat_name: "seat-0".into(),
            xdg_shell_version: XdgShell::DEFAULT_VERSION,
            cursor: CursorConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: RuntimeConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Full resolution: file from `NUTHATCH_CONFIG` if set, then environment overrides.
    pub fn from_env() -> Result<Self> {
        let config = match std::env::var("NUTHATCH_CONFIG") {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        let config = config.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `NUTHATCH_BACKEND`, `XCURSOR_THEME` and `XCURSOR_SIZE` from `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(backend) = lookup("NUTHATCH_BACKEND") {
            self.backend = match backend.to_lowercase().as_str() {
                "headless" => BackendKind::Headless,
                "winit" => BackendKind::Winit,
                other => bail!("Unknown backend in NUTHATCH_BACKEND: {}", other),
            };
        }
        if let Some(theme) = lookup("XCURSOR_THEME").filter(|theme| !theme.is_empty()) {
            self.cursor.theme = theme;
        }
        if let Some(size) = lookup("XCURSOR_SIZE") {
            self.cursor.size = size
                .parse()
                .with_context(|| format!("Invalid XCURSOR_SIZE: {}", size))?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=6).contains(&self.xdg_shell_version) {
            bail!(
                "Invalid xdg_shell_version {}: must be between 1 and 6",
                self.xdg_shell_version
            );
        }
        if self.cursor.size == 0 {
            bail!("Invalid cursor size: must be greater than 0");
        }
        if self.seat_name.is_empty() {
            bail!("Seat name must not be empty");
        }
        Ok(())
    }
}
