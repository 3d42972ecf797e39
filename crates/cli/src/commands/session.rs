//! Session Commands

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use recplay_core::{Session, Step};

use crate::context::Context;
use crate::output::{
    format_duration, format_millis, print_item, print_json, print_list, print_success, OutputFormat,
    TableDisplay,
};

#[derive(Args)]
pub struct SessionArgs {
    /// Session ID
    pub id: String,
}

/// Session display wrapper for serialization
#[derive(Serialize)]
pub struct SessionDisplay {
    pub id: String,
    pub name: String,
    pub url: String,
    pub steps: usize,
    pub duration_ms: i64,
    pub created_at: String,
    pub recording: bool,
}

impl From<&Session> for SessionDisplay {
    fn from(session: &Session) -> Self {
        Self {
            id: session.session_id.clone(),
            name: session.test_name.clone().unwrap_or_default(),
            url: session.start_url.clone(),
            steps: session.total_steps,
            duration_ms: session.duration,
            created_at: session.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            recording: session.is_recording,
        }
    }
}

impl TableDisplay for SessionDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Name", "URL", "Steps", "Duration", "Created", "State"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.url.clone(),
            self.steps.to_string(),
            format_duration(self.duration_ms),
            self.created_at.clone(),
            if self.recording { "recording" } else { "complete" }.to_string(),
        ]
    }
}

/// One step of a session
#[derive(Serialize)]
pub struct StepDisplay {
    pub index: usize,
    pub kind: String,
    pub target: String,
    pub value: String,
    pub at: String,
}

impl From<(usize, &Step)> for StepDisplay {
    fn from((i, step): (usize, &Step)) -> Self {
        let target = step
            .selector
            .clone()
            .or_else(|| step.url.clone())
            .unwrap_or_default();
        let value = step
            .value
            .clone()
            .or_else(|| step.text.clone())
            .unwrap_or_default();
        Self {
            index: i + 1,
            kind: step.kind.to_string(),
            target,
            value,
            at: format_millis(step.timestamp),
        }
    }
}

impl TableDisplay for StepDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["#", "Type", "Target", "Value", "Time"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.index.to_string(),
            self.kind.clone(),
            self.target.clone(),
            self.value.clone(),
            self.at.clone(),
        ]
    }
}

pub async fn list(ctx: Context, format: OutputFormat) -> Result<()> {
    let sessions = ctx.store.list().await?;
    let displays: Vec<SessionDisplay> = sessions.iter().map(SessionDisplay::from).collect();
    print_list(&displays, format);
    Ok(())
}

pub async fn show(args: SessionArgs, ctx: Context, format: OutputFormat) -> Result<()> {
    let session = ctx.store.load(&args.id).await?;
    if format == OutputFormat::Json {
        print_json(&session);
        return Ok(());
    }

    print_item(&SessionDisplay::from(&session), format);
    let steps: Vec<StepDisplay> = session.steps.iter().enumerate().map(StepDisplay::from).collect();
    print_list(&steps, format);
    Ok(())
}

pub async fn delete(args: SessionArgs, ctx: Context, format: OutputFormat) -> Result<()> {
    let report = ctx.store.delete(&args.id).await?;
    if format == OutputFormat::Json {
        print_json(&report);
        return Ok(());
    }

    print_success(&format!(
        "Session '{}' deleted ({} artifacts removed)",
        report.session_id,
        report.removed_artifacts.len()
    ));
    Ok(())
}
