//! Recording controller
//!
//! Owns one browser at a time while a recording is active. The lifecycle is
//! `idle -> recording -> idle`; a stopped session lives on only in the store.
//! A stopped session whose save failed is held until a later
//! [`RecordingController::stop_recording`] saves it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::capture::StepBuffer;
use crate::config::RecplayConfig;
use crate::driver::{BrowserDriver, DriverLauncher, PageOptions};
use crate::error::{RecplayError, RecplayResult};
use crate::instrumentor::capture_script;
use crate::session::{generate_session_id, validate_session_id, CapturedAction, Session, Step};
use crate::store::SessionStore;

/// Optional parameters for [`RecordingController::start_recording`]
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Caller-chosen id; a time-based id is generated when absent
    pub session_id: Option<String>,

    /// Human label stored with the session
    pub test_name: Option<String>,
}

struct ActiveRecording {
    session: Session,
    driver: Box<dyn BrowserDriver>,
    buffer: StepBuffer,
}

/// Drives a browser while a user performs a manual test and collects the
/// captured steps into a session
pub struct RecordingController {
    launcher: Arc<dyn DriverLauncher>,
    store: SessionStore,
    config: RecplayConfig,
    active: Option<ActiveRecording>,
    unsaved: Option<Session>,
}

impl RecordingController {
    pub fn new(launcher: Arc<dyn DriverLauncher>, store: SessionStore, config: RecplayConfig) -> Self {
        Self {
            launcher,
            store,
            config,
            active: None,
            unsaved: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// The active session including the steps captured so far, or a
    /// stopped session still waiting to be saved
    pub fn current_session(&self) -> Option<Session> {
        match &self.active {
            Some(active) => {
                let mut session = active.session.clone();
                session.steps = active.buffer.snapshot();
                session.total_steps = session.steps.len();
                Some(session)
            }
            None => self.unsaved.clone(),
        }
    }

    /// A stopped session that could not be saved yet
    pub fn unsaved_session(&self) -> Option<&Session> {
        self.unsaved.as_ref()
    }

    /// Open a page at `url` with capture installed and start collecting steps
    pub async fn start_recording(&mut self, url: &str, options: StartOptions) -> RecplayResult<Session> {
        if let Some(active) = &self.active {
            return Err(RecplayError::AlreadyRecording(active.session.session_id.clone()));
        }
        if let Some(unsaved) = &self.unsaved {
            return Err(RecplayError::UnsavedSession(unsaved.session_id.clone()));
        }

        let session_id = options.session_id.unwrap_or_else(generate_session_id);
        validate_session_id(&session_id)?;

        let session = Session::new(session_id.clone(), url, options.test_name);
        let buffer = StepBuffer::new(session_id.clone());

        let mut driver = self.launcher.launch().await?;
        if let Err(e) = self.prepare_page(driver.as_mut(), url, &session_id, buffer.clone()).await {
            if let Err(close_err) = driver.close().await {
                warn!("Failed to close browser after aborted start: {}", close_err);
            }
            return Err(e);
        }

        info!("Recording session {} at {}", session_id, url);
        self.active = Some(ActiveRecording {
            session: session.clone(),
            driver,
            buffer,
        });
        Ok(session)
    }

    async fn prepare_page(
        &self,
        driver: &mut dyn BrowserDriver,
        url: &str,
        session_id: &str,
        buffer: StepBuffer,
    ) -> RecplayResult<()> {
        let video_path = self
            .config
            .driver
            .record_video
            .then(|| self.store.recording_path(session_id));

        driver
            .open_page(&PageOptions {
                viewport: self.config.driver.viewport,
                video_path,
            })
            .await?;

        let script = capture_script(&self.config.capture);
        driver
            .install_capture(&script, &self.config.capture.bridge_name, buffer)
            .await?;

        driver.goto(url).await
    }

    /// Append an action reported from outside the page (e.g. an HTTP client)
    pub fn record_action(&self, session_id: &str, action: CapturedAction) -> RecplayResult<Step> {
        let active = self.active.as_ref().ok_or(RecplayError::NotRecording)?;
        if active.session.session_id != session_id {
            return Err(RecplayError::NotFound {
                kind: "recording".to_string(),
                id: session_id.to_string(),
            });
        }
        Ok(active.buffer.push(action))
    }

    /// Finish the active recording, persist it and release the browser.
    ///
    /// The browser is released even when saving fails; the finished session
    /// is then kept and the next call retries the save.
    pub async fn stop_recording(&mut self) -> RecplayResult<Session> {
        let session = match (self.active.take(), self.unsaved.take()) {
            (Some(active), _) => self.finish_active(active).await,
            (None, Some(unsaved)) => {
                info!("Retrying save of session {}", unsaved.session_id);
                unsaved
            }
            (None, None) => return Err(RecplayError::NotRecording),
        };

        if let Err(e) = self.store.save(&session).await {
            warn!(
                "Session {} stopped but not saved ({} steps kept): {}",
                session.session_id, session.total_steps, e
            );
            self.unsaved = Some(session);
            return Err(e);
        }

        info!(
            "Stopped recording {} ({} steps, {} ms)",
            session.session_id, session.total_steps, session.duration
        );
        debug!("Session {} saved to {}", session.session_id, self.store.root().display());
        Ok(session)
    }

    async fn finish_active(&self, active: ActiveRecording) -> Session {
        let ActiveRecording {
            mut session,
            mut driver,
            buffer,
        } = active;

        // Closing first lets in-flight bridge calls land in the buffer
        if let Err(e) = driver.close().await {
            warn!("Failed to close browser for {}: {}", session.session_id, e);
        }
        drop(driver);

        session.finish(buffer.drain());
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{SimAction, SimElement, SimulatedBrowser, SimulatedLauncher};
    use tempfile::TempDir;

    fn controller(browser: &SimulatedBrowser, root: &std::path::Path) -> RecordingController {
        let mut config = RecplayConfig::default();
        config.driver.record_video = false;
        RecordingController::new(
            Arc::new(SimulatedLauncher::new(browser.clone())),
            SessionStore::new(root),
            config,
        )
    }

    fn login_page() -> SimulatedBrowser {
        SimulatedBrowser::with_elements(vec![
            SimElement::new("button").with_id("login").with_text("Log in"),
            SimElement::new("input").with_id("user"),
        ])
    }

    #[tokio::test]
    async fn test_start_returns_shell() {
        let tmp = TempDir::new().unwrap();
        let browser = login_page();
        let mut recorder = controller(&browser, tmp.path());

        let session = recorder
            .start_recording(
                "https://example.com",
                StartOptions {
                    session_id: Some("s1".to_string()),
                    test_name: Some("Login".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(session.session_id, "s1");
        assert!(session.is_recording);
        assert!(session.steps.is_empty());
        assert!(recorder.is_recording());
        assert_eq!(browser.current_url(), "https://example.com");
    }

    #[tokio::test]
    async fn test_generated_session_id() {
        let tmp = TempDir::new().unwrap();
        let mut recorder = controller(&login_page(), tmp.path());

        let session = recorder
            .start_recording("https://example.com", StartOptions::default())
            .await
            .unwrap();
        assert!(session.session_id.starts_with("session_"));
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let browser = login_page();
        let mut recorder = controller(&browser, tmp.path());

        recorder
            .start_recording("https://example.com", StartOptions::default())
            .await
            .unwrap();
        let err = recorder
            .start_recording("https://example.org", StartOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RecplayError::AlreadyRecording(_)));
        assert_eq!(browser.launches(), 1);
    }

    #[tokio::test]
    async fn test_stop_twice() {
        let tmp = TempDir::new().unwrap();
        let browser = login_page();
        let mut recorder = controller(&browser, tmp.path());

        recorder
            .start_recording(
                "https://example.com",
                StartOptions {
                    session_id: Some("s1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let session = recorder.stop_recording().await.unwrap();
        assert!(!session.is_recording);
        assert!(session.completed_at.is_some());

        let err = recorder.stop_recording().await.unwrap_err();
        assert!(matches!(err, RecplayError::NotRecording));
        assert!(!browser.is_page_open());
    }

    #[tokio::test]
    async fn test_captured_steps_are_persisted_in_order() {
        let tmp = TempDir::new().unwrap();
        let browser = login_page();
        let mut recorder = controller(&browser, tmp.path());

        recorder
            .start_recording(
                "https://example.com",
                StartOptions {
                    session_id: Some("s1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        browser.user_click("#login").unwrap();
        browser.user_type("#user", "a").unwrap();
        browser.user_type("#user", "al").unwrap();
        browser.user_navigate("https://example.com/home");
        browser.poll_navigation().unwrap();
        assert_eq!(recorder.current_session().unwrap().steps.len(), 4);

        let session = recorder.stop_recording().await.unwrap();
        let stored = SessionStore::new(tmp.path()).load("s1").await.unwrap();
        assert_eq!(stored, session);

        let labels: Vec<String> = stored.steps.iter().map(|s| s.label()).collect();
        assert_eq!(
            labels,
            vec![
                "click:#login",
                "input:#user",
                "input:#user",
                "navigation:https://example.com/home"
            ]
        );
        assert_eq!(stored.steps[2].value.as_deref(), Some("al"));
        assert!(stored.steps.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_record_action_checks_session() {
        let tmp = TempDir::new().unwrap();
        let mut recorder = controller(&login_page(), tmp.path());

        let action = CapturedAction::Click {
            selector: "#login".to_string(),
            text: None,
        };
        assert!(matches!(
            recorder.record_action("s1", action.clone()),
            Err(RecplayError::NotRecording)
        ));

        recorder
            .start_recording(
                "https://example.com",
                StartOptions {
                    session_id: Some("s1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(recorder.record_action("other", action.clone()).unwrap_err().is_not_found());
        let step = recorder.record_action("s1", action).unwrap();
        assert_eq!(step.screenshot.as_deref(), Some("s1_step1_click.png"));
    }

    #[tokio::test]
    async fn test_failed_start_releases_browser() {
        let tmp = TempDir::new().unwrap();
        let browser = login_page();
        browser.set_unreachable("https://down.example");
        let mut recorder = controller(&browser, tmp.path());

        let err = recorder
            .start_recording("https://down.example", StartOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecplayError::Browser(_)));
        assert!(!recorder.is_recording());
        assert!(!browser.is_page_open());
        assert_eq!(browser.actions().last(), Some(&SimAction::Close));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_session_for_retry() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store");
        std::fs::write(&root, b"not a directory").unwrap();

        let browser = login_page();
        let mut recorder = controller(&browser, &root);
        recorder
            .start_recording(
                "https://example.com",
                StartOptions {
                    session_id: Some("s1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        browser.user_click("#login").unwrap();
        browser.user_click("#login").unwrap();

        let err = recorder.stop_recording().await.unwrap_err();
        assert!(matches!(err, RecplayError::StorageWrite { .. }));
        assert!(!recorder.is_recording());
        assert!(!browser.is_page_open());
        assert_eq!(recorder.unsaved_session().map(|s| s.total_steps), Some(2));
        assert_eq!(recorder.current_session().unwrap().steps.len(), 2);

        let err = recorder
            .start_recording("https://example.com", StartOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecplayError::UnsavedSession(_)));

        std::fs::remove_file(&root).unwrap();
        let saved = recorder.stop_recording().await.unwrap();
        assert_eq!(saved.total_steps, 2);
        assert!(recorder.unsaved_session().is_none());
        assert_eq!(SessionStore::new(&root).load("s1").await.unwrap(), saved);
        assert!(matches!(
            recorder.stop_recording().await,
            Err(RecplayError::NotRecording)
        ));
        assert_eq!(browser.launches(), 1);
    }

    #[tokio::test]
    async fn test_invalid_session_id_does_not_launch() {
        let tmp = TempDir::new().unwrap();
        let browser = login_page();
        let mut recorder = controller(&browser, tmp.path());

        let err = recorder
            .start_recording(
                "https://example.com",
                StartOptions {
                    session_id: Some("../x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RecplayError::InvalidSessionId(_)));
        assert_eq!(browser.launches(), 0);
    }
}
