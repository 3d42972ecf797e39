//! Replay executor
//!
//! Re-executes the steps of a stored session against a fresh page. A step
//! that fails is recorded and the replay moves on; only launching the
//! browser or opening the page can fail the replay as a whole.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::RecplayConfig;
use crate::driver::{BrowserDriver, DriverLauncher, PageOptions};
use crate::error::{RecplayError, RecplayResult};
use crate::session::{now_millis, ReplayOptions, ReplayResult, ReplayStatus, Step, StepKind, StepResult};
use crate::store::SessionStore;

/// Replays recorded sessions one at a time
pub struct ReplayExecutor {
    launcher: Arc<dyn DriverLauncher>,
    store: SessionStore,
    config: RecplayConfig,
}

impl ReplayExecutor {
    pub fn new(launcher: Arc<dyn DriverLauncher>, store: SessionStore, config: RecplayConfig) -> Self {
        Self {
            launcher,
            store,
            config,
        }
    }

    /// Replay `session_id` and persist the result.
    ///
    /// Returns `Err` only when the session cannot be replayed at all (missing
    /// or still recording) or the result cannot be saved. Browser failures
    /// are reported inside the returned [`ReplayResult`].
    pub async fn replay(&mut self, session_id: &str, options: &ReplayOptions) -> RecplayResult<ReplayResult> {
        let session = self.store.load(session_id).await?;
        if session.is_recording {
            return Err(RecplayError::SessionStillRecording(session.session_id));
        }

        info!(
            "Replaying session {} ({} steps)",
            session.session_id,
            session.steps.len()
        );
        let mut result = ReplayResult::start(&session.session_id);

        let mut driver = match self.open(&session.start_url).await {
            Ok(driver) => driver,
            Err((driver, e)) => {
                warn!("Replay of {} aborted: {}", session.session_id, e);
                let reason = e.to_string();
                let started = now_millis();
                result.steps = session
                    .steps
                    .into_iter()
                    .map(|step| StepResult::failed(step, started, format!("replay aborted: {}", reason)))
                    .collect();
                result.error = Some(reason);
                if let Some(mut driver) = driver {
                    close_quietly(driver.as_mut(), &result.session_id).await;
                }
                return self.finish(result, ReplayStatus::Failed).await;
            }
        };

        for (i, step) in session.steps.into_iter().enumerate() {
            let index = i + 1;
            let execution_time = now_millis();

            let mut step_result = match execute_step(driver.as_mut(), &step).await {
                Ok(()) => {
                    debug!("Step {} passed: {}", index, step.label());
                    StepResult::passed(step, execution_time)
                }
                Err(e) => {
                    debug!("Step {} failed: {} ({})", index, step.label(), e);
                    StepResult::failed(step, execution_time, e.to_string())
                }
            };

            if options.take_screenshots {
                let path = self.screenshot_path(&session.session_id, index, &step_result.step);
                match driver.screenshot(&path).await {
                    Ok(()) => step_result.screenshot_path = Some(path),
                    Err(e) => warn!("Screenshot for step {} failed: {}", index, e),
                }
            }

            result.steps.push(step_result);

            if let Some(delay) = options.step_delay.filter(|d| *d > 0) {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        close_quietly(driver.as_mut(), &result.session_id).await;
        self.finish(result, ReplayStatus::Completed).await
    }

    /// Launch a browser and open a page at the session's start url. On
    /// failure the driver, if one was launched, is handed back for closing.
    async fn open(
        &self,
        start_url: &str,
    ) -> Result<Box<dyn BrowserDriver>, (Option<Box<dyn BrowserDriver>>, RecplayError)> {
        let mut driver = self.launcher.launch().await.map_err(|e| (None, e))?;

        let opened = driver
            .open_page(&PageOptions {
                viewport: self.config.driver.viewport,
                video_path: None,
            })
            .await;
        if let Err(e) = opened {
            return Err((Some(driver), e));
        }

        // A start url that no longer loads is left to the first step
        if let Err(e) = driver.goto(start_url).await {
            warn!("Could not load start url {}: {}", start_url, e);
        }
        Ok(driver)
    }

    fn screenshot_path(&self, session_id: &str, index: usize, step: &Step) -> PathBuf {
        match &step.screenshot {
            Some(name) => self.store.screenshot_path(name),
            None => self
                .store
                .screenshot_path(&format!("{}_replay_step{}.png", session_id, index)),
        }
    }

    async fn finish(&self, mut result: ReplayResult, status: ReplayStatus) -> RecplayResult<ReplayResult> {
        result.finish(status);
        let path = self.store.save_replay_result(&result).await?;
        info!(
            "Replay of {} {}: {} passed, {} failed ({})",
            result.session_id,
            result.status,
            result.passed(),
            result.failed(),
            path.display()
        );
        Ok(result)
    }
}

async fn close_quietly(driver: &mut dyn BrowserDriver, session_id: &str) {
    if let Err(e) = driver.close().await {
        warn!("Failed to close browser after replaying {}: {}", session_id, e);
    }
}

async fn execute_step(driver: &mut dyn BrowserDriver, step: &Step) -> RecplayResult<()> {
    match &step.kind {
        StepKind::Click => driver.click(required(&step.selector, step, "selector")?).await,
        StepKind::Input => {
            let selector = required(&step.selector, step, "selector")?;
            let value = required(&step.value, step, "value")?;
            driver.fill(selector, value).await
        }
        StepKind::Navigation => driver.goto(required(&step.url, step, "url")?).await,
        StepKind::Other(kind) => Err(RecplayError::Browser(format!("Unknown step type: {}", kind))),
    }
}

fn required<'a>(field: &'a Option<String>, step: &Step, name: &str) -> RecplayResult<&'a str> {
    field
        .as_deref()
        .ok_or_else(|| RecplayError::Browser(format!("{} step is missing its {}", step.kind, name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{SimAction, SimElement, SimulatedBrowser, SimulatedLauncher};
    use crate::session::{CapturedAction, Session};
    use tempfile::TempDir;

    fn click(selector: &str) -> CapturedAction {
        CapturedAction::Click {
            selector: selector.to_string(),
            text: None,
        }
    }

    async fn stored_session(store: &SessionStore, id: &str, actions: Vec<CapturedAction>) -> Session {
        let mut session = Session::new(id, "https://example.com", None);
        let steps = actions
            .into_iter()
            .enumerate()
            .map(|(i, a)| a.into_step(id, i + 1, 1_000 + i as i64))
            .collect();
        session.finish(steps);
        store.save(&session).await.unwrap();
        session
    }

    fn executor(browser: &SimulatedBrowser, store: &SessionStore) -> ReplayExecutor {
        ReplayExecutor::new(
            Arc::new(SimulatedLauncher::new(browser.clone())),
            store.clone(),
            RecplayConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_failed_step_does_not_stop_replay() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let browser = SimulatedBrowser::with_elements(vec![
            SimElement::new("button").with_id("a"),
            SimElement::new("button").with_id("b"),
        ]);
        stored_session(&store, "s1", vec![click("#a"), click("#missing"), click("#b")]).await;

        let result = executor(&browser, &store)
            .replay("s1", &ReplayOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, ReplayStatus::Completed);
        let executed: Vec<bool> = result.steps.iter().map(|s| s.executed).collect();
        assert_eq!(executed, vec![true, false, true]);
        assert!(result.steps[1].error.as_deref().unwrap().contains("#missing"));
        assert!(result.duration.is_some());
        assert!(!browser.is_page_open());

        assert_eq!(
            browser.actions(),
            vec![
                SimAction::OpenPage,
                SimAction::Goto("https://example.com".to_string()),
                SimAction::Click("#a".to_string()),
                SimAction::Click("#missing".to_string()),
                SimAction::Click("#b".to_string()),
                SimAction::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_step_delay_follows_every_step() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let browser = SimulatedBrowser::with_elements(vec![SimElement::new("button").with_id("a")]);
        stored_session(&store, "s1", vec![click("#a"), click("#missing"), click("#a")]).await;

        let options = ReplayOptions {
            step_delay: Some(40),
            ..Default::default()
        };
        let started = std::time::Instant::now();
        let result = executor(&browser, &store).replay("s1", &options).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(120));
        assert!(result.duration.unwrap() >= 120);
        for pair in result.steps.windows(2) {
            assert!(pair[1].execution_time - pair[0].execution_time >= 40);
        }
    }

    #[tokio::test]
    async fn test_unknown_step_type_is_a_step_failure() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let mut session = stored_session(&store, "s1", vec![click("#a")]).await;
        let mut odd = session.steps[0].clone();
        odd.kind = StepKind::Other("scroll".to_string());
        session.steps.push(odd);
        session.total_steps = 2;
        store.save(&session).await.unwrap();

        let browser = SimulatedBrowser::with_elements(vec![SimElement::new("div").with_id("a")]);
        let result = executor(&browser, &store)
            .replay("s1", &ReplayOptions::default())
            .await
            .unwrap();

        assert!(result.steps[0].executed);
        assert_eq!(result.steps[1].error.as_deref(), Some("Unknown step type: scroll"));
    }

    #[tokio::test]
    async fn test_input_and_navigation_dispatch() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let browser = SimulatedBrowser::with_elements(vec![SimElement::new("input").with_id("user")]);
        stored_session(
            &store,
            "s1",
            vec![
                CapturedAction::Input {
                    selector: "#user".to_string(),
                    value: "alice".to_string(),
                },
                CapturedAction::Navigation {
                    url: "https://example.com/next".to_string(),
                },
            ],
        )
        .await;

        let result = executor(&browser, &store)
            .replay("s1", &ReplayOptions::default())
            .await
            .unwrap();

        assert_eq!(result.passed(), 2);
        assert_eq!(browser.field_value("#user").as_deref(), Some("alice"));
        assert_eq!(browser.current_url(), "https://example.com/next");
    }

    #[tokio::test]
    async fn test_screenshots_use_step_names() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let browser = SimulatedBrowser::with_elements(vec![SimElement::new("button").with_id("a")]);
        stored_session(&store, "s1", vec![click("#a"), click("#gone")]).await;

        let options = ReplayOptions {
            take_screenshots: true,
            ..Default::default()
        };
        let result = executor(&browser, &store).replay("s1", &options).await.unwrap();

        for (i, step) in result.steps.iter().enumerate() {
            let expected = store.screenshot_path(&format!("s1_step{}_click.png", i + 1));
            assert_eq!(step.screenshot_path.as_ref(), Some(&expected));
            assert!(expected.exists());
        }
    }

    #[tokio::test]
    async fn test_screenshot_failure_keeps_step_result() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let browser = SimulatedBrowser::with_elements(vec![SimElement::new("button").with_id("a")]);
        browser.set_fail_screenshots(true);
        stored_session(&store, "s1", vec![click("#a")]).await;

        let options = ReplayOptions {
            take_screenshots: true,
            ..Default::default()
        };
        let result = executor(&browser, &store).replay("s1", &options).await.unwrap();

        assert!(result.steps[0].executed);
        assert!(result.steps[0].screenshot_path.is_none());
    }

    #[tokio::test]
    async fn test_open_page_failure_fails_replay() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let browser = SimulatedBrowser::default();
        browser.set_fail_open_page(true);
        stored_session(&store, "s1", vec![click("#a"), click("#b")]).await;

        let result = executor(&browser, &store)
            .replay("s1", &ReplayOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, ReplayStatus::Failed);
        assert!(result.error.is_some());
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps.iter().all(|s| !s.executed));
        assert_eq!(store.list_replay_results("s1").await.unwrap().len(), 1);

        assert_eq!(browser.closes(), 1);
        assert!(!browser.is_page_open());
        assert!(!browser
            .actions()
            .iter()
            .any(|a| matches!(a, SimAction::Click(_))));
    }

    #[tokio::test]
    async fn test_launch_failure_fails_replay() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let browser = SimulatedBrowser::default();
        browser.set_fail_launch(true);
        stored_session(&store, "s1", vec![click("#a")]).await;

        let result = executor(&browser, &store)
            .replay("s1", &ReplayOptions::default())
            .await
            .unwrap();
        assert_eq!(result.status, ReplayStatus::Failed);
        assert_eq!(result.failed(), 1);
        assert_eq!(browser.closes(), 0);
    }

    #[tokio::test]
    async fn test_missing_and_recording_sessions() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let browser = SimulatedBrowser::default();
        let mut executor = executor(&browser, &store);

        let err = executor.replay("nope", &ReplayOptions::default()).await.unwrap_err();
        assert!(err.is_not_found());

        store
            .save(&Session::new("live", "https://example.com", None))
            .await
            .unwrap();
        let err = executor.replay("live", &ReplayOptions::default()).await.unwrap_err();
        assert!(matches!(err, RecplayError::SessionStillRecording(_)));
        assert_eq!(browser.launches(), 0);
    }

    #[tokio::test]
    async fn test_page_opened_once() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        let browser = SimulatedBrowser::with_elements(vec![SimElement::new("button").with_id("a")]);
        stored_session(&store, "s1", vec![click("#a"), click("#a"), click("#a")]).await;

        executor(&browser, &store)
            .replay("s1", &ReplayOptions::default())
            .await
            .unwrap();

        let actions = browser.actions();
        assert_eq!(actions.iter().filter(|a| **a == SimAction::OpenPage).count(), 1);
        assert_eq!(browser.launches(), 1);
    }
}
