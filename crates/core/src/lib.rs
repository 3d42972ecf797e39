//! recplay core
//!
//! Records manual browser tests as ordered steps and replays them:
//! - Instruments a live page so clicks, text input and navigation are
//!   reported to the host as they happen
//! - Persists finished sessions, videos, screenshots and replay results in a
//!   directory store
//! - Re-executes a session step by step, isolating per-step failures
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RecordingController                                        │
//! │    ├── start_recording(url, opts) -> Session                │
//! │    ├── record_action(id, action)  -> Step                   │
//! │    └── stop_recording()           -> Session (persisted)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ReplayExecutor                                             │
//! │    └── replay(id, opts)           -> ReplayResult           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserDriver (playwright | simulated)                     │
//! │    ├── open_page / install_capture / goto                   │
//! │    ├── click / fill / screenshot                            │
//! │    └── close                                                │
//! │         │ bridge events                                     │
//! │         ▼                                                   │
//! │  StepBuffer (single append point, ordered)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SessionStore                                               │
//! │    sessions/{id}.json   recordings/{id}.webm                │
//! │    screenshots/         results/replay_{id}_{ms}.json       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod config;
pub mod driver;
pub mod error;
pub mod instrumentor;
pub mod recorder;
pub mod replay;
pub mod session;
pub mod store;

pub use capture::StepBuffer;
pub use config::{DriverKind, RecplayConfig};
pub use driver::{launcher_for, BrowserDriver, DriverLauncher};
pub use error::{RecplayError, RecplayResult};
pub use recorder::{RecordingController, StartOptions};
pub use replay::ReplayExecutor;
pub use session::{CapturedAction, ReplayOptions, ReplayResult, ReplayStatus, Session, Step, StepKind, StepResult};
pub use store::{DeleteReport, SessionStore};
