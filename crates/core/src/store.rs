//! Flat-file session store
//!
//! Layout under the store root:
//! - `sessions/{id}.json` - session records
//! - `recordings/` - page videos (`{id}.webm`)
//! - `screenshots/` - step screenshots (`{id}_step{n}_{kind}.png`)
//! - `results/` - replay results (`replay_{id}_{millis}.json`)
//!
//! Artifacts are associated with a session purely by the session id appearing
//! in their file name.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{RecplayError, RecplayResult};
use crate::session::{now_millis, validate_session_id, ReplayResult, Session};

const SESSIONS_DIR: &str = "sessions";
const RECORDINGS_DIR: &str = "recordings";
const SCREENSHOTS_DIR: &str = "screenshots";
const RESULTS_DIR: &str = "results";

/// Artifacts removed alongside a session record
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub session_id: String,
    pub removed_artifacts: Vec<PathBuf>,
}

/// JSON file store for sessions, artifacts and replay results
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Open a store rooted at `root`. Directories are created lazily on write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join(SESSIONS_DIR)
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.root.join(RECORDINGS_DIR)
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join(SCREENSHOTS_DIR)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{}.json", session_id))
    }

    /// Path of the video for a session
    pub fn recording_path(&self, session_id: &str) -> PathBuf {
        self.recordings_dir().join(format!("{}.webm", session_id))
    }

    /// Path of a screenshot artifact; only the file-name component of `name` is used
    pub fn screenshot_path(&self, name: &str) -> PathBuf {
        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "_".into());
        self.screenshots_dir().join(file_name)
    }

    /// Write a session record, replacing any previous record with the same id
    pub async fn save(&self, session: &Session) -> RecplayResult<()> {
        validate_session_id(&session.session_id)?;

        let dir = self.sessions_dir();
        fs::create_dir_all(&dir).await.map_err(|e| write_error(&dir, e))?;

        let path = self.session_path(&session.session_id);
        let json = serde_json::to_string_pretty(session)?;
        fs::write(&path, json).await.map_err(|e| write_error(&path, e))?;

        debug!("Saved session {} ({} steps)", session.session_id, session.steps.len());
        Ok(())
    }

    /// Load a session record. An id that cannot name a record is `NotFound`.
    pub async fn load(&self, session_id: &str) -> RecplayResult<Session> {
        ensure_storable(session_id)?;
        read_json(&self.session_path(session_id))
            .await?
            .ok_or_else(|| RecplayError::session_not_found(session_id))
    }

    /// Whether a session record exists
    pub async fn exists(&self, session_id: &str) -> bool {
        validate_session_id(session_id).is_ok()
            && fs::try_exists(self.session_path(session_id)).await.unwrap_or(false)
    }

    /// All stored sessions, newest first. Unreadable records are skipped.
    pub async fn list(&self) -> RecplayResult<Vec<Session>> {
        let dir = self.sessions_dir();
        let mut sessions = Vec::new();

        for path in json_files(&dir).await? {
            match read_json::<Session>(&path).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable session record: {}", e),
            }
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Remove a session record and every artifact whose name contains its id
    pub async fn delete(&self, session_id: &str) -> RecplayResult<DeleteReport> {
        ensure_storable(session_id)?;

        let path = self.session_path(session_id);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RecplayError::session_not_found(session_id));
            }
            Err(e) => return Err(write_error(&path, e)),
        }

        let mut report = DeleteReport {
            session_id: session_id.to_string(),
            removed_artifacts: Vec::new(),
        };

        for dir in [self.recordings_dir(), self.screenshots_dir(), self.results_dir()] {
            remove_matching(&dir, session_id, &mut report.removed_artifacts).await;
        }

        info!(
            "Deleted session {} and {} artifact(s)",
            session_id,
            report.removed_artifacts.len()
        );
        Ok(report)
    }

    /// Persist a replay result without overwriting earlier replays of the same session
    pub async fn save_replay_result(&self, result: &ReplayResult) -> RecplayResult<PathBuf> {
        validate_session_id(&result.session_id)?;

        let dir = self.results_dir();
        fs::create_dir_all(&dir).await.map_err(|e| write_error(&dir, e))?;

        let json = serde_json::to_string_pretty(result)?;
        let stem = format!("replay_{}_{}", result.session_id, now_millis());

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}.json", stem)
            } else {
                format!("{}_{}.json", stem, attempt)
            };
            let path = dir.join(name);

            let file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match file {
                Ok(mut file) => {
                    file.write_all(json.as_bytes())
                        .await
                        .map_err(|e| write_error(&path, e))?;
                    file.flush().await.map_err(|e| write_error(&path, e))?;
                    debug!("Saved replay result to {}", path.display());
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                }
                Err(e) => return Err(write_error(&path, e)),
            }
        }
    }

    /// Stored replay results for one session, newest first
    pub async fn list_replay_results(&self, session_id: &str) -> RecplayResult<Vec<ReplayResult>> {
        validate_session_id(session_id)?;

        let mut results = Vec::new();
        for path in json_files(&self.results_dir()).await? {
            match read_json::<ReplayResult>(&path).await {
                Ok(Some(result)) if result.session_id == session_id => results.push(result),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable replay result: {}", e),
            }
        }

        results.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(results)
    }
}

/// Lookups by an id that could never have been saved find nothing
fn ensure_storable(session_id: &str) -> RecplayResult<()> {
    validate_session_id(session_id).map_err(|_| RecplayError::session_not_found(session_id))
}

fn write_error(path: &Path, e: std::io::Error) -> RecplayError {
    RecplayError::StorageWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn read_error(path: &Path, reason: impl ToString) -> RecplayError {
    RecplayError::StorageRead {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Read and parse a JSON record; `Ok(None)` if the file does not exist
async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> RecplayResult<Option<T>> {
    let data = match fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(read_error(path, e)),
    };
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|e| read_error(path, e))
}

/// `*.json` files directly under `dir`; a missing directory is empty
async fn json_files(dir: &Path) -> RecplayResult<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(read_error(dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| read_error(dir, e))? {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
    Ok(files)
}

/// Best-effort removal of files under `dir` whose name contains `needle`
async fn remove_matching(dir: &Path, needle: &str, removed: &mut Vec<PathBuf>) {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No artifacts to delete in {}: {}", dir.display(), e);
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Error listing {}: {}", dir.display(), e);
                break;
            }
        };

        let matches = entry
            .file_name()
            .to_str()
            .map(|name| name.contains(needle))
            .unwrap_or(false);
        if !matches {
            continue;
        }

        let path = entry.path();
        match fs::remove_file(&path).await {
            Ok(()) => removed.push(path),
            Err(e) => warn!("Failed to delete artifact {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CapturedAction, ReplayStatus};
    use tempfile::TempDir;

    fn sample_session(id: &str) -> Session {
        let mut session = Session::new(id, "https://example.com", Some("Login".to_string()));
        let steps = vec![
            CapturedAction::Click {
                selector: "#login".to_string(),
                text: Some("Log in".to_string()),
            }
            .into_step(id, 1, 1_000),
            CapturedAction::Input {
                selector: "#user".to_string(),
                value: "alice".to_string(),
            }
            .into_step(id, 2, 1_500),
        ];
        session.finish(steps);
        session
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());

        let session = sample_session("s1");
        store.save(&session).await.unwrap();

        let loaded = store.load("s1").await.unwrap();
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());

        let mut session = sample_session("s1");
        store.save(&session).await.unwrap();
        session.test_name = Some("Renamed".to_string());
        store.save(&session).await.unwrap();

        let loaded = store.load("s1").await.unwrap();
        assert_eq!(loaded.test_name.as_deref(), Some("Renamed"));
    }

    #[tokio::test]
    async fn test_load_missing() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());

        let err = store.load("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_load_corrupt_is_read_error() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        std::fs::create_dir_all(store.sessions_dir()).unwrap();
        std::fs::write(store.sessions_dir().join("bad.json"), "{not json").unwrap();

        let err = store.load("bad").await.unwrap_err();
        assert!(matches!(err, RecplayError::StorageRead { .. }));
    }

    #[tokio::test]
    async fn test_list_skips_unreadable() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());

        assert!(store.list().await.unwrap().is_empty());

        store.save(&sample_session("a")).await.unwrap();
        store.save(&sample_session("b")).await.unwrap();
        std::fs::write(store.sessions_dir().join("broken.json"), "[]").unwrap();
        std::fs::write(store.sessions_dir().join("notes.txt"), "ignored").unwrap();

        let sessions = store.list().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].created_at >= sessions[1].created_at);
    }

    #[tokio::test]
    async fn test_delete_cascades_by_session_id() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());

        store.save(&sample_session("sess1")).await.unwrap();
        store.save(&sample_session("sess2")).await.unwrap();

        std::fs::create_dir_all(store.screenshots_dir()).unwrap();
        std::fs::create_dir_all(store.recordings_dir()).unwrap();
        std::fs::write(store.screenshot_path("sess1_step1.png"), b"png").unwrap();
        std::fs::write(store.screenshot_path("sess2_step1.png"), b"png").unwrap();
        std::fs::write(store.recording_path("sess1"), b"webm").unwrap();

        let mut result = ReplayResult::start("sess1");
        result.finish(ReplayStatus::Completed);
        store.save_replay_result(&result).await.unwrap();

        let report = store.delete("sess1").await.unwrap();
        assert_eq!(report.removed_artifacts.len(), 3);

        assert!(store.load("sess1").await.unwrap_err().is_not_found());
        assert!(!store.screenshot_path("sess1_step1.png").exists());
        assert!(!store.recording_path("sess1").exists());
        assert!(store.list_replay_results("sess1").await.unwrap().is_empty());

        assert!(store.load("sess2").await.is_ok());
        assert!(store.screenshot_path("sess2_step1.png").exists());
    }

    #[tokio::test]
    async fn test_delete_without_artifact_dirs() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        store.save(&sample_session("lonely")).await.unwrap();

        let report = store.delete("lonely").await.unwrap();
        assert!(report.removed_artifacts.is_empty());

        let err = store.delete("lonely").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_replay_results_do_not_overwrite() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());

        let mut result = ReplayResult::start("s1");
        result.finish(ReplayStatus::Completed);

        let first = store.save_replay_result(&result).await.unwrap();
        let second = store.save_replay_result(&result).await.unwrap();
        assert_ne!(first, second);

        let stored = store.list_replay_results("s1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(first.file_name().unwrap().to_str().unwrap().contains("s1"));
    }

    #[test]
    fn test_screenshot_path_stays_in_namespace() {
        let store = SessionStore::new("/data");
        assert_eq!(
            store.screenshot_path("../../etc/passwd"),
            PathBuf::from("/data/screenshots/passwd")
        );
        assert_eq!(
            store.screenshot_path("s1_step1_click.png"),
            PathBuf::from("/data/screenshots/s1_step1_click.png")
        );
    }

    #[tokio::test]
    async fn test_path_like_ids_are_never_stored() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());

        let err = store
            .save(&Session::new("../secrets", "https://example.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, RecplayError::InvalidSessionId(_)));

        for id in ["../secrets", "a/b", "a\\b"] {
            assert!(store.load(id).await.unwrap_err().is_not_found(), "load {}", id);
            assert!(store.delete(id).await.unwrap_err().is_not_found(), "delete {}", id);
        }
    }
}
