//! recplay configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RecplayError, RecplayResult};

/// Environment variable overriding `store.root`
pub const ENV_STORE_DIR: &str = "RECPLAY_STORE_DIR";

/// Environment variable overriding `driver.kind`
pub const ENV_DRIVER: &str = "RECPLAY_DRIVER";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecplayConfig {
    /// Session store layout
    pub store: StoreConfig,

    /// Browser driver selection and launch options
    pub driver: DriverConfig,

    /// In-page capture settings
    pub capture: CaptureConfig,
}

/// Flat-file store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory holding sessions/, recordings/, screenshots/ and results/
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("manual-tests"),
        }
    }
}

/// Which browser driver implementation to construct
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Real browser via a Playwright node process
    #[default]
    Playwright,
    /// In-process browser model
    Simulated,
}

impl FromStr for DriverKind {
    type Err = RecplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "playwright" => Ok(DriverKind::Playwright),
            "simulated" | "mock" => Ok(DriverKind::Simulated),
            other => Err(RecplayError::Config(format!("unknown driver kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = RecplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(RecplayError::Config(format!("unknown browser: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Browser driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub kind: DriverKind,

    /// Browser engine
    pub browser: Browser,

    /// Run without a visible window
    pub headless: bool,

    /// Slow down every browser operation by this many milliseconds
    pub slow_mo_ms: u64,

    pub viewport: Viewport,

    /// Record a video of each recording session into recordings/
    pub record_video: bool,

    /// Node.js executable used to host Playwright
    pub node_binary: PathBuf,

    /// Directory containing the `playwright` package (NODE_PATH)
    pub node_path: Option<PathBuf>,

    /// Timeout for a single browser action (click, fill, goto)
    pub action_timeout_ms: u64,

    /// Upper bound on one driver command round-trip
    pub command_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            kind: DriverKind::Playwright,
            browser: Browser::Chromium,
            headless: true,
            slow_mo_ms: 0,
            viewport: Viewport::default(),
            record_video: true,
            node_binary: PathBuf::from("node"),
            node_path: None,
            action_timeout_ms: 30_000,
            command_timeout_ms: 60_000,
        }
    }
}

impl DriverConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Capture instrumentation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Name of the host function exposed to the page
    pub bridge_name: String,

    /// Interval of the in-page URL poll
    pub poll_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            bridge_name: "__recplayBridge".to_string(),
            poll_interval_ms: 1000,
        }
    }
}

impl RecplayConfig {
    /// Load configuration from file, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> RecplayResult<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply `RECPLAY_*` overrides from the process environment
    pub fn with_env_overrides(self) -> RecplayResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> RecplayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_STORE_DIR).filter(|v| !v.is_empty()) {
            self.store.root = PathBuf::from(dir);
        }
        if let Some(kind) = lookup(ENV_DRIVER).filter(|v| !v.is_empty()) {
            self.driver.kind = kind.parse()?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> RecplayResult<()> {
        if self.driver.viewport.width == 0 || self.driver.viewport.height == 0 {
            return Err(RecplayError::Config("viewport must be non-zero".to_string()));
        }
        if self.capture.poll_interval_ms == 0 {
            return Err(RecplayError::Config(
                "capture.poll_interval_ms must be positive".to_string(),
            ));
        }
        if !is_js_identifier(&self.capture.bridge_name) {
            return Err(RecplayError::Config(format!(
                "capture.bridge_name is not a valid identifier: {}",
                self.capture.bridge_name
            )));
        }
        Ok(())
    }
}

fn is_js_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
