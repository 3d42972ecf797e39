//! Replay Commands

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use recplay_core::{ReplayExecutor, ReplayOptions, ReplayResult, ReplayStatus, StepResult};

use crate::commands::session::SessionArgs;
use crate::context::Context;
use crate::output::{
    format_duration, format_millis, print_error, print_item, print_json, print_list, print_success,
    print_warning, OutputFormat, TableDisplay,
};

#[derive(Args)]
pub struct ReplayArgs {
    /// Session ID
    id: String,

    /// Pause between steps, in milliseconds
    #[arg(long)]
    step_delay: Option<u64>,

    /// Capture a screenshot after every step
    #[arg(long)]
    screenshots: bool,

    /// Show the browser window
    #[arg(long)]
    headed: bool,
}

/// Replay result display wrapper for serialization
#[derive(Serialize)]
pub struct ResultDisplay {
    pub session_id: String,
    pub started: String,
    pub status: String,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: i64,
}

impl From<&ReplayResult> for ResultDisplay {
    fn from(result: &ReplayResult) -> Self {
        Self {
            session_id: result.session_id.clone(),
            started: format_millis(result.start_time),
            status: result.status.to_string(),
            passed: result.passed(),
            failed: result.failed(),
            duration_ms: result.duration.unwrap_or_default(),
        }
    }
}

impl TableDisplay for ResultDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Session", "Started", "Status", "Passed", "Failed", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.session_id.clone(),
            self.started.clone(),
            self.status.clone(),
            self.passed.to_string(),
            self.failed.to_string(),
            format_duration(self.duration_ms),
        ]
    }
}

/// Per-step outcome
#[derive(Serialize)]
pub struct StepResultDisplay {
    pub index: usize,
    pub step: String,
    pub ok: bool,
    pub error: String,
    pub screenshot: String,
}

impl From<(usize, &StepResult)> for StepResultDisplay {
    fn from((i, result): (usize, &StepResult)) -> Self {
        Self {
            index: i + 1,
            step: result.step.label(),
            ok: result.executed,
            error: result.error.clone().unwrap_or_default(),
            screenshot: result
                .screenshot_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }
}

impl TableDisplay for StepResultDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["#", "Step", "Result", "Error", "Screenshot"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.index.to_string(),
            self.step.clone(),
            if self.ok { "✅" } else { "❌" }.to_string(),
            self.error.clone(),
            self.screenshot.clone(),
        ]
    }
}

pub async fn execute(args: ReplayArgs, mut ctx: Context, format: OutputFormat) -> Result<()> {
    if args.headed {
        ctx.config.driver.headless = false;
    }

    let options = ReplayOptions {
        step_delay: args.step_delay,
        take_screenshots: args.screenshots,
    };
    let mut executor = ReplayExecutor::new(ctx.launcher(), ctx.store.clone(), ctx.config.clone());
    let result = executor.replay(&args.id, &options).await?;

    if format == OutputFormat::Json {
        print_json(&result);
    } else {
        let steps: Vec<StepResultDisplay> = result.steps.iter().enumerate().map(StepResultDisplay::from).collect();
        print_list(&steps, format);
        print_item(&ResultDisplay::from(&result), format);
    }

    match (result.status, result.failed()) {
        (ReplayStatus::Failed, _) => {
            print_error(&format!(
                "Replay of '{}' failed: {}",
                result.session_id,
                result.error.as_deref().unwrap_or("unknown error")
            ));
            std::process::exit(1);
        }
        (_, 0) => {
            if format.shows_status() {
                print_success(&format!("All {} steps replayed", result.passed()));
            }
        }
        (_, failed) => {
            if format.shows_status() {
                print_warning(&format!("{} of {} steps failed", failed, result.steps.len()));
            }
            std::process::exit(1);
        }
    }
    Ok(())
}

pub async fn results(args: SessionArgs, ctx: Context, format: OutputFormat) -> Result<()> {
    let results = ctx.store.list_replay_results(&args.id).await?;
    if format == OutputFormat::Json {
        print_json(&results);
        return Ok(());
    }

    let displays: Vec<ResultDisplay> = results.iter().map(ResultDisplay::from).collect();
    print_list(&displays, format);
    Ok(())
}
