//! Playwright browser automation
//!
//! A node process runs an embedded driver script that owns the Playwright
//! browser. The host writes one JSON command per line on the process's stdin
//! and reads replies and bridge events, one JSON object per line, from its
//! stdout:
//!
//! ```text
//! host -> driver   {"id":3,"op":"click","selector":"#login"}
//! driver -> host   {"id":3,"ok":true}
//! driver -> host   {"id":4,"ok":false,"error":"Timeout 30000ms exceeded."}
//! driver -> host   {"event":"bridge","payload":{"type":"click","selector":"#a","text":""}}
//! ```
//!
//! A single reader task consumes stdout in order, so bridge events are
//! appended to the capture buffer in the order the page produced them, and
//! every event emitted before a reply is delivered before that reply.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::StepBuffer;
use crate::config::{DriverConfig, Viewport};
use crate::driver::{BrowserDriver, DriverLauncher, PageOptions};
use crate::error::{RecplayError, RecplayResult};

const DRIVER_JS: &str = r#"'use strict';
const readline = require('readline');

let playwright;
try {
  playwright = require('playwright');
} catch (err) {
  process.stdout.write(JSON.stringify({ event: 'fatal', error: 'playwright module not found: ' + err.message }) + '\n');
  process.exit(3);
}

let browser = null;
let context = null;
let page = null;
let actionTimeout = 30000;

function send(message) {
  process.stdout.write(JSON.stringify(message) + '\n');
}

function requirePage() {
  if (!page) throw new Error('no page is open');
}

const handlers = {
  async launch(cmd) {
    const engine = playwright[cmd.browser];
    if (!engine) throw new Error('unknown browser: ' + cmd.browser);
    actionTimeout = cmd.actionTimeout;
    browser = await engine.launch({ headless: cmd.headless, slowMo: cmd.slowMo });
  },
  async open_page(cmd) {
    if (!browser) throw new Error('browser not launched');
    const options = { viewport: cmd.viewport };
    if (cmd.videoDir) options.recordVideo = { dir: cmd.videoDir, size: cmd.viewport };
    context = await browser.newContext(options);
    context.setDefaultTimeout(actionTimeout);
    page = await context.newPage();
  },
  async install_capture(cmd) {
    requirePage();
    await page.exposeFunction(cmd.bridge, (payload) => {
      send({ event: 'bridge', payload: payload });
    });
    await page.addInitScript({ content: cmd.script });
  },
  async goto(cmd) {
    requirePage();
    await page.goto(cmd.url);
  },
  async click(cmd) {
    requirePage();
    await page.click(cmd.selector);
  },
  async fill(cmd) {
    requirePage();
    await page.fill(cmd.selector, cmd.value);
  },
  async screenshot(cmd) {
    requirePage();
    await page.screenshot({ path: cmd.path });
  },
  async close_page(cmd) {
    if (!context) return;
    const video = page ? page.video() : null;
    await context.close();
    context = null;
    page = null;
    if (video && cmd.videoPath) {
      await video.saveAs(cmd.videoPath);
      await video.delete();
    }
  },
  async shutdown() {
    if (context) await context.close();
    if (browser) await browser.close();
    context = null;
    page = null;
    browser = null;
  },
};

async function handle(line) {
  if (!line.trim()) return;
  let cmd;
  try {
    cmd = JSON.parse(line);
  } catch (err) {
    send({ event: 'log', message: 'unparseable command: ' + line });
    return;
  }
  try {
    const handler = handlers[cmd.op];
    if (!handler) throw new Error('unknown op: ' + cmd.op);
    await handler(cmd);
    send({ id: cmd.id, ok: true });
  } catch (err) {
    send({ id: cmd.id, ok: false, error: err && err.message ? err.message : String(err) });
  }
  if (cmd.op === 'shutdown') process.exit(0);
}

const rl = readline.createInterface({ input: process.stdin });
let queue = Promise.resolve();
rl.on('line', (line) => {
  queue = queue.then(() => handle(line));
});
rl.on('close', () => {
  queue
    .then(() => handlers.shutdown())
    .catch(() => {})
    .finally(() => process.exit(0));
});
"#;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<(), String>>>>>;
type CaptureSlot = Arc<Mutex<Option<StepBuffer>>>;

/// Commands understood by the driver script
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverCommand<'a> {
    Launch {
        browser: &'a str,
        headless: bool,
        #[serde(rename = "slowMo")]
        slow_mo: u64,
        #[serde(rename = "actionTimeout")]
        action_timeout: u64,
    },
    OpenPage {
        viewport: Viewport,
        #[serde(rename = "videoDir", skip_serializing_if = "Option::is_none")]
        video_dir: Option<&'a Path>,
    },
    InstallCapture {
        bridge: &'a str,
        script: &'a str,
    },
    Goto {
        url: &'a str,
    },
    Click {
        selector: &'a str,
    },
    Fill {
        selector: &'a str,
        value: &'a str,
    },
    Screenshot {
        path: &'a Path,
    },
    ClosePage {
        #[serde(rename = "videoPath", skip_serializing_if = "Option::is_none")]
        video_path: Option<&'a Path>,
    },
    Shutdown,
}

impl DriverCommand<'_> {
    fn name(&self) -> &'static str {
        match self {
            DriverCommand::Launch { .. } => "launch",
            DriverCommand::OpenPage { .. } => "open_page",
            DriverCommand::InstallCapture { .. } => "install_capture",
            DriverCommand::Goto { .. } => "goto",
            DriverCommand::Click { .. } => "click",
            DriverCommand::Fill { .. } => "fill",
            DriverCommand::Screenshot { .. } => "screenshot",
            DriverCommand::ClosePage { .. } => "close_page",
            DriverCommand::Shutdown => "shutdown",
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a DriverCommand<'a>,
}

/// Lines written by the driver script
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DriverMessage {
    Reply {
        id: u64,
        ok: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Event {
        event: String,
        #[serde(default)]
        payload: serde_json::Value,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Browser driven by a Playwright node process
pub struct PlaywrightDriver {
    config: DriverConfig,
    child: Child,
    stdin: Option<ChildStdin>,
    pending: Pending,
    capture: CaptureSlot,
    reader: JoinHandle<()>,
    next_id: u64,
    video_path: Option<PathBuf>,
    page_open: bool,

    /// Holds the staged driver script for the life of the process
    _script_dir: TempDir,
}

impl PlaywrightDriver {
    /// Spawn the driver process and launch the configured browser
    pub async fn launch(config: DriverConfig) -> RecplayResult<Self> {
        Self::check_playwright_installed(&config).await?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("recplay-driver.js");
        tokio::fs::write(&script_path, DRIVER_JS).await?;

        let mut cmd = Command::new(&config.node_binary);
        cmd.arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_path) = &config.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        let mut child = cmd.spawn().map_err(|e| {
            RecplayError::Driver(format!(
                "failed to spawn {}: {}",
                config.node_binary.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecplayError::Driver("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecplayError::Driver("driver stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("driver stderr: {}", line);
                }
            });
        }

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let capture: CaptureSlot = Arc::new(Mutex::new(None));
        let reader = tokio::spawn(read_messages(stdout, pending.clone(), capture.clone()));

        let mut driver = Self {
            config,
            child,
            stdin: Some(stdin),
            pending,
            capture,
            reader,
            next_id: 1,
            video_path: None,
            page_open: false,
            _script_dir: script_dir,
        };

        let browser = driver.config.browser.as_str();
        let launch = DriverCommand::Launch {
            browser,
            headless: driver.config.headless,
            slow_mo: driver.config.slow_mo_ms,
            action_timeout: driver.config.action_timeout_ms,
        };
        driver.request(&launch).await?;

        info!(
            "Launched {} via Playwright (pid {:?}, headless: {})",
            browser,
            driver.child.id(),
            driver.config.headless
        );
        Ok(driver)
    }

    /// Check that node can resolve the playwright package
    async fn check_playwright_installed(config: &DriverConfig) -> RecplayResult<()> {
        let mut cmd = Command::new(&config.node_binary);
        cmd.args(["-e", "require.resolve('playwright')"])
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(node_path) = &config.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        match cmd.status().await {
            Ok(status) if status.success() => Ok(()),
            _ => Err(RecplayError::PlaywrightNotFound),
        }
    }

    /// Send one command and wait for its reply
    async fn request(&mut self, command: &DriverCommand<'_>) -> RecplayResult<()> {
        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_string(&Request { id, command })?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let stdin = match self.stdin.as_mut() {
            Some(stdin) => stdin,
            None => {
                self.pending.lock().remove(&id);
                return Err(RecplayError::Driver("driver is closed".to_string()));
            }
        };

        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            self.pending.lock().remove(&id);
            return Err(RecplayError::Driver(format!(
                "failed to send {}: {}",
                command.name(),
                e
            )));
        }

        match tokio::time::timeout(self.config.command_timeout(), rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(RecplayError::Browser(message)),
            Ok(Err(_)) => Err(RecplayError::Driver(format!(
                "driver process exited during {}",
                command.name()
            ))),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(RecplayError::Timeout(format!("driver command {}", command.name())))
            }
        }
    }

    /// Wait for the process to exit, escalating to SIGTERM and then SIGKILL
    async fn terminate(&mut self) {
        if tokio::time::timeout(Duration::from_secs(5), self.child.wait())
            .await
            .is_err()
        {
            #[cfg(unix)]
            if let Some(pid) = self.child.id() {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;

                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
            if let Err(e) = self.child.kill().await {
                warn!("Failed to kill driver process: {}", e);
            }
        }
        self.reader.abort();
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn open_page(&mut self, options: &PageOptions) -> RecplayResult<()> {
        self.video_path = options.video_path.clone();
        let video_dir = self.video_path.as_deref().and_then(Path::parent);
        if let Some(dir) = video_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let video_dir = video_dir.map(Path::to_path_buf);
        self.request(&DriverCommand::OpenPage {
            viewport: options.viewport,
            video_dir: video_dir.as_deref(),
        })
        .await?;
        self.page_open = true;
        Ok(())
    }

    async fn install_capture(
        &mut self,
        script: &str,
        bridge_name: &str,
        buffer: StepBuffer,
    ) -> RecplayResult<()> {
        *self.capture.lock() = Some(buffer);
        self.request(&DriverCommand::InstallCapture {
            bridge: bridge_name,
            script,
        })
        .await
    }

    async fn goto(&mut self, url: &str) -> RecplayResult<()> {
        self.request(&DriverCommand::Goto { url }).await
    }

    async fn click(&mut self, selector: &str) -> RecplayResult<()> {
        self.request(&DriverCommand::Click { selector }).await
    }

    async fn fill(&mut self, selector: &str, value: &str) -> RecplayResult<()> {
        self.request(&DriverCommand::Fill { selector, value }).await
    }

    async fn screenshot(&mut self, path: &Path) -> RecplayResult<()> {
        self.request(&DriverCommand::Screenshot { path }).await
    }

    async fn close(&mut self) -> RecplayResult<()> {
        if self.stdin.is_none() {
            return Ok(());
        }

        let mut outcome = Ok(());
        if self.page_open {
            let video_path = self.video_path.clone();
            outcome = self
                .request(&DriverCommand::ClosePage {
                    video_path: video_path.as_deref(),
                })
                .await;
            self.page_open = false;
        }

        if let Err(e) = self.request(&DriverCommand::Shutdown).await {
            debug!("Driver shutdown: {}", e);
        }
        self.stdin = None;
        self.capture.lock().take();
        self.terminate().await;

        debug!("Playwright driver closed");
        outcome
    }
}

impl Drop for PlaywrightDriver {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
        self.reader.abort();
    }
}

/// Consume driver output until the process closes its stdout
async fn read_messages(stdout: ChildStdout, pending: Pending, capture: CaptureSlot) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => dispatch_line(&line, &pending, &capture),
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading driver output: {}", e);
                break;
            }
        }
    }

    // Dropping the senders fails every outstanding request
    pending.lock().clear();
}

fn dispatch_line(line: &str, pending: &Pending, capture: &CaptureSlot) {
    let message: DriverMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(_) => {
            debug!("driver: {}", line);
            return;
        }
    };

    match message {
        DriverMessage::Reply { id, ok, error } => {
            let reply = if ok {
                Ok(())
            } else {
                Err(error.unwrap_or_else(|| "unknown driver error".to_string()))
            };
            match pending.lock().remove(&id) {
                Some(tx) => {
                    let _ = tx.send(reply);
                }
                None => debug!("Reply for unknown request {}", id),
            }
        }
        DriverMessage::Event {
            event,
            payload,
            error,
            message,
        } => match event.as_str() {
            "bridge" => {
                let buffer = capture.lock().clone();
                match buffer {
                    Some(buffer) => {
                        let _ = buffer.push_payload(payload);
                    }
                    None => debug!("Bridge call with no capture installed"),
                }
            }
            "fatal" => error!("Driver failed: {}", error.unwrap_or_default()),
            other => debug!("driver {}: {}", other, message.unwrap_or_default()),
        },
    }
}

/// Launches a [`PlaywrightDriver`] per recording or replay
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    config: DriverConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DriverLauncher for PlaywrightLauncher {
    async fn launch(&self) -> RecplayResult<Box<dyn BrowserDriver>> {
        let driver = PlaywrightDriver::launch(self.config.clone()).await?;
        Ok(Box::new(driver))
    }
}
