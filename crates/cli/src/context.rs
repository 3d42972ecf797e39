//! Resolved configuration shared by all commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::debug;

use recplay_core::config::{Browser, DriverKind, RecplayConfig};
use recplay_core::{launcher_for, DriverLauncher, SessionStore};

/// Overrides given on the command line, applied after file and environment
#[derive(Debug, Default)]
pub struct Overrides {
    pub store: Option<PathBuf>,
    pub driver: Option<DriverKind>,
    pub browser: Option<Browser>,
}

pub struct Context {
    pub config: RecplayConfig,
    pub store: SessionStore,
}

impl Context {
    /// Resolve configuration: file, then `RECPLAY_*` environment, then flags
    pub fn load(config_path: &Path, overrides: Overrides) -> Result<Self> {
        let mut config = RecplayConfig::load(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
            .with_env_overrides()?;

        if let Some(root) = overrides.store {
            config.store.root = root;
        }
        if let Some(kind) = overrides.driver {
            config.driver.kind = kind;
        }
        if let Some(browser) = overrides.browser {
            config.driver.browser = browser;
        }

        debug!(
            "Using store {} with {:?} driver",
            config.store.root.display(),
            config.driver.kind
        );
        let store = SessionStore::new(&config.store.root);
        Ok(Self { config, store })
    }

    pub fn launcher(&self) -> Arc<dyn DriverLauncher> {
        launcher_for(&self.config.driver)
    }
}
