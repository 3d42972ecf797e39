//! In-process browser model
//!
//! [`SimulatedBrowser`] holds a single page made of [`SimElement`]s. Drivers
//! launched from it act on that page, and the `user_*` methods stand in for a
//! person using the page while a capture is installed: they go through the
//! same selector derivation and bridge payloads as the in-page instrumentor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::capture::StepBuffer;
use crate::driver::{BrowserDriver, DriverLauncher, PageOptions};
use crate::error::{RecplayError, RecplayResult};
use crate::instrumentor::derive_selector;
use crate::session::{CapturedAction, Step};

/// Placeholder image written by simulated screenshots
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// An element on the simulated page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimElement {
    pub tag: String,
    pub id: Option<String>,
    pub class: Option<String>,
    pub text: String,
    pub value: String,
}

impl SimElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            class: None,
            text: String::new(),
            value: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Selector the instrumentor would capture for this element
    pub fn selector(&self) -> String {
        derive_selector(self.id.as_deref(), self.class.as_deref(), &self.tag)
    }

    fn is_text_field(&self) -> bool {
        self.tag.eq_ignore_ascii_case("input") || self.tag.eq_ignore_ascii_case("textarea")
    }

    /// Simple selector matching: `#id`, `.class`, or tag name
    fn matches(&self, selector: &str) -> bool {
        if let Some(id) = selector.strip_prefix('#') {
            self.id.as_deref() == Some(id)
        } else if let Some(class) = selector.strip_prefix('.') {
            self.class
                .as_deref()
                .map(|c| c.split_whitespace().any(|token| token == class))
                .unwrap_or(false)
        } else {
            self.tag.eq_ignore_ascii_case(selector)
        }
    }
}

/// Driver calls observed by the simulated browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimAction {
    OpenPage,
    Goto(String),
    Click(String),
    Fill(String, String),
    Screenshot(PathBuf),
    Close,
}

#[derive(Debug, Default)]
struct SimState {
    elements: Vec<SimElement>,
    url: String,
    last_polled_url: String,
    capture: Option<StepBuffer>,
    page_open: bool,
    actions: Vec<SimAction>,
    launches: usize,
    closes: usize,
    unreachable: Vec<String>,
    fail_launch: bool,
    fail_open_page: bool,
    fail_screenshots: bool,
}

/// Shared handle to the simulated page
#[derive(Debug, Clone, Default)]
pub struct SimulatedBrowser {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBrowser {
    pub fn with_elements(elements: Vec<SimElement>) -> Self {
        let browser = Self::default();
        browser.state.lock().elements = elements;
        browser
    }

    pub fn add_element(&self, element: SimElement) {
        self.state.lock().elements.push(element);
    }

    pub fn remove_element(&self, selector: &str) {
        self.state.lock().elements.retain(|e| !e.matches(selector));
    }

    /// Make navigation to `url` fail
    pub fn set_unreachable(&self, url: impl Into<String>) {
        self.state.lock().unreachable.push(url.into());
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.state.lock().fail_launch = fail;
    }

    pub fn set_fail_open_page(&self, fail: bool) {
        self.state.lock().fail_open_page = fail;
    }

    pub fn set_fail_screenshots(&self, fail: bool) {
        self.state.lock().fail_screenshots = fail;
    }

    pub fn actions(&self) -> Vec<SimAction> {
        self.state.lock().actions.clone()
    }

    pub fn clear_actions(&self) {
        self.state.lock().actions.clear();
    }

    pub fn current_url(&self) -> String {
        self.state.lock().url.clone()
    }

    pub fn launches(&self) -> usize {
        self.state.lock().launches
    }

    /// Number of `close` calls made by drivers, with or without an open page
    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    pub fn is_page_open(&self) -> bool {
        self.state.lock().page_open
    }

    /// Value currently held by a text field
    pub fn field_value(&self, selector: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .elements
            .iter()
            .find(|e| e.matches(selector))
            .map(|e| e.value.clone())
    }

    /// A user clicks the first element matching `selector`
    pub fn user_click(&self, selector: &str) -> Option<Step> {
        let (element, buffer) = {
            let state = self.state.lock();
            let element = state.elements.iter().find(|e| e.matches(selector))?.clone();
            (element, state.capture.clone())
        };

        buffer.map(|buffer| {
            buffer.push(CapturedAction::Click {
                selector: element.selector(),
                text: Some(element.text.trim().to_string()),
            })
        })
    }

    /// A user types into the first text field matching `selector`
    pub fn user_type(&self, selector: &str, value: &str) -> Option<Step> {
        let (element, buffer) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let element = state
                .elements
                .iter_mut()
                .find(|e| e.matches(selector) && e.is_text_field())?;
            element.value = value.to_string();
            (element.clone(), state.capture.clone())
        };

        buffer.map(|buffer| {
            buffer.push(CapturedAction::Input {
                selector: element.selector(),
                value: element.value,
            })
        })
    }

    /// A client-side route change; reported at the next [`poll_navigation`](Self::poll_navigation)
    pub fn user_navigate(&self, url: impl Into<String>) {
        self.state.lock().url = url.into();
    }

    /// One tick of the instrumentor's URL poll
    pub fn poll_navigation(&self) -> Option<Step> {
        let (url, buffer) = {
            let mut state = self.state.lock();
            if state.url == state.last_polled_url {
                return None;
            }
            state.last_polled_url = state.url.clone();
            (state.url.clone(), state.capture.clone())
        };

        buffer.map(|buffer| buffer.push(CapturedAction::Navigation { url }))
    }
}

/// Driver acting on a [`SimulatedBrowser`]
#[derive(Debug)]
pub struct SimulatedDriver {
    browser: SimulatedBrowser,
}

impl SimulatedDriver {
    fn with_page<T>(
        &self,
        f: impl FnOnce(&mut SimState) -> RecplayResult<T>,
    ) -> RecplayResult<T> {
        let mut state = self.browser.state.lock();
        if !state.page_open {
            return Err(RecplayError::Browser("no page is open".to_string()));
        }
        f(&mut *state)
    }
}

fn selector_timeout(selector: &str) -> RecplayError {
    RecplayError::Browser(format!(
        "Timeout exceeded waiting for selector \"{}\"",
        selector
    ))
}

#[async_trait]
impl BrowserDriver for SimulatedDriver {
    async fn open_page(&mut self, _options: &PageOptions) -> RecplayResult<()> {
        let mut state = self.browser.state.lock();
        if state.fail_open_page {
            return Err(RecplayError::Browser(
                "Target page, context or browser has been closed".to_string(),
            ));
        }
        state.page_open = true;
        state.actions.push(SimAction::OpenPage);
        Ok(())
    }

    async fn install_capture(
        &mut self,
        _script: &str,
        _bridge_name: &str,
        buffer: StepBuffer,
    ) -> RecplayResult<()> {
        self.with_page(|state| {
            state.capture = Some(buffer);
            Ok(())
        })
    }

    async fn goto(&mut self, url: &str) -> RecplayResult<()> {
        self.with_page(|state| {
            state.actions.push(SimAction::Goto(url.to_string()));
            if state.unreachable.iter().any(|u| u == url) {
                return Err(RecplayError::Browser(format!(
                    "net::ERR_NAME_NOT_RESOLVED at {}",
                    url
                )));
            }
            state.url = url.to_string();
            state.last_polled_url = url.to_string();
            Ok(())
        })
    }

    async fn click(&mut self, selector: &str) -> RecplayResult<()> {
        self.with_page(|state| {
            state.actions.push(SimAction::Click(selector.to_string()));
            if state.elements.iter().any(|e| e.matches(selector)) {
                Ok(())
            } else {
                Err(selector_timeout(selector))
            }
        })
    }

    async fn fill(&mut self, selector: &str, value: &str) -> RecplayResult<()> {
        self.with_page(|state| {
            state
                .actions
                .push(SimAction::Fill(selector.to_string(), value.to_string()));
            let element = state
                .elements
                .iter_mut()
                .find(|e| e.matches(selector))
                .ok_or_else(|| selector_timeout(selector))?;
            if !element.is_text_field() {
                return Err(RecplayError::Browser(format!(
                    "Element {} is not an <input> or <textarea>",
                    selector
                )));
            }
            element.value = value.to_string();
            Ok(())
        })
    }

    async fn screenshot(&mut self, path: &Path) -> RecplayResult<()> {
        self.with_page(|state| {
            state.actions.push(SimAction::Screenshot(path.to_path_buf()));
            if state.fail_screenshots {
                return Err(RecplayError::Browser("screenshot failed".to_string()));
            }
            Ok(())
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, PNG_SIGNATURE).await?;
        Ok(())
    }

    async fn close(&mut self) -> RecplayResult<()> {
        let mut state = self.browser.state.lock();
        state.closes += 1;
        if state.page_open {
            state.page_open = false;
            state.capture = None;
            state.actions.push(SimAction::Close);
            debug!("Simulated page closed");
        }
        Ok(())
    }
}

/// Launches drivers over one shared [`SimulatedBrowser`]
#[derive(Debug, Clone, Default)]
pub struct SimulatedLauncher {
    browser: SimulatedBrowser,
}

impl SimulatedLauncher {
    pub fn new(browser: SimulatedBrowser) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl DriverLauncher for SimulatedLauncher {
    async fn launch(&self) -> RecplayResult<Box<dyn BrowserDriver>> {
        {
            let mut state = self.browser.state.lock();
            if state.fail_launch {
                return Err(RecplayError::Driver("browser failed to launch".to_string()));
            }
            state.launches += 1;
        }
        Ok(Box::new(SimulatedDriver {
            browser: self.browser.clone(),
        }))
    }
}
