//! Record Command

use std::time::Duration;

use anyhow::Result;
use clap::Args;

use recplay_core::{RecordingController, StartOptions};

use crate::commands::session::{SessionDisplay, StepDisplay};
use crate::context::Context;
use crate::output::{
    print_info, print_item, print_json, print_list, print_success, print_warning, OutputFormat,
};

#[derive(Args)]
pub struct RecordArgs {
    /// URL to open
    url: String,

    /// Session ID (defaults to session_<millis>)
    #[arg(long)]
    session_id: Option<String>,

    /// Test name stored with the session
    #[arg(short, long)]
    name: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Do not save a video of the recording
    #[arg(long)]
    no_video: bool,

    /// Stop automatically after this many seconds
    #[arg(long)]
    duration: Option<u64>,
}

pub async fn execute(args: RecordArgs, mut ctx: Context, format: OutputFormat) -> Result<()> {
    // A person drives the page while recording
    ctx.config.driver.headless = args.headless;
    if args.no_video {
        ctx.config.driver.record_video = false;
    }

    let mut recorder = RecordingController::new(ctx.launcher(), ctx.store.clone(), ctx.config.clone());
    let session = recorder
        .start_recording(
            &args.url,
            StartOptions {
                session_id: args.session_id,
                test_name: args.name,
            },
        )
        .await?;

    if format.shows_status() {
        print_info(&format!(
            "Recording session '{}' at {}. Press Ctrl-C to stop.",
            session.session_id, args.url
        ));
    }

    let interrupted = match args.duration {
        Some(secs) => tokio::select! {
            r = tokio::signal::ctrl_c() => Some(r),
            _ = tokio::time::sleep(Duration::from_secs(secs)) => None,
        },
        None => Some(tokio::signal::ctrl_c().await),
    };
    if let (Some(Err(e)), true) = (interrupted, format.shows_status()) {
        print_warning(&format!("Could not wait for Ctrl-C ({}), stopping now", e));
    }

    let session = recorder.stop_recording().await?;

    if !format.shows_status() {
        print_json(&session);
        return Ok(());
    }
    print_success(&format!(
        "Session '{}' saved with {} steps",
        session.session_id, session.total_steps
    ));
    print_item(&SessionDisplay::from(&session), format);
    let steps: Vec<StepDisplay> = session.steps.iter().enumerate().map(StepDisplay::from).collect();
    print_list(&steps, format);
    Ok(())
}
