//! Browser driver seam
//!
//! The recording controller and the replay executor talk to a browser only
//! through [`BrowserDriver`]. Drivers are created by a [`DriverLauncher`]
//! chosen from configuration at construction time:
//!
//! - [`PlaywrightLauncher`] drives a real browser through a Playwright node
//!   process speaking line-delimited JSON on stdio.
//! - [`SimulatedLauncher`] drives an in-process page model, used in tests and
//!   where no browser is available.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::capture::StepBuffer;
use crate::config::{DriverConfig, DriverKind, Viewport};
use crate::error::RecplayResult;

pub mod playwright;
pub mod simulated;

pub use playwright::{PlaywrightDriver, PlaywrightLauncher};
pub use simulated::{SimAction, SimElement, SimulatedBrowser, SimulatedDriver, SimulatedLauncher};

/// Options for opening a page
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    pub viewport: Viewport,

    /// Where to save a video of the page once it is closed
    pub video_path: Option<PathBuf>,
}

/// One browser with at most one open page
#[async_trait]
pub trait BrowserDriver: Send {
    /// Open a fresh isolated page
    async fn open_page(&mut self, options: &PageOptions) -> RecplayResult<()>;

    /// Expose `bridge_name` to the page, delivering its payloads into
    /// `buffer`, and run `script` in every new document of the page
    async fn install_capture(
        &mut self,
        script: &str,
        bridge_name: &str,
        buffer: StepBuffer,
    ) -> RecplayResult<()>;

    async fn goto(&mut self, url: &str) -> RecplayResult<()>;

    async fn click(&mut self, selector: &str) -> RecplayResult<()>;

    async fn fill(&mut self, selector: &str, value: &str) -> RecplayResult<()>;

    async fn screenshot(&mut self, path: &Path) -> RecplayResult<()>;

    /// Close the page and the browser. Bridge calls that reached the host
    /// before the close are delivered to the buffer before this returns.
    async fn close(&mut self) -> RecplayResult<()>;
}

/// Factory for drivers
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(&self) -> RecplayResult<Box<dyn BrowserDriver>>;
}

/// Build the launcher selected by `config.kind`
pub fn launcher_for(config: &DriverConfig) -> Arc<dyn DriverLauncher> {
    match config.kind {
        DriverKind::Playwright => Arc::new(PlaywrightLauncher::new(config.clone())),
        DriverKind::Simulated => Arc::new(SimulatedLauncher::new(SimulatedBrowser::default())),
    }
}
