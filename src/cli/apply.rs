use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use controlsync_scheduler::ScriptedTransport;
use serde::Serialize;
use tokio::fs;
use tracing::info;

use super::context::CliContext;
use super::output::{emit, join_or_none, HumanReadable};
use super::runtime::{build_registry, read_input};
use super::session::{render_outcome, Session, SessionOutcome};

#[derive(Args, Clone, Debug)]
pub struct ApplyArgs {
    /// HTML page the response is applied to
    #[arg(long, value_name = "FILE")]
    pub page: PathBuf,

    /// Response envelope (JSON)
    #[arg(long, value_name = "FILE")]
    pub response: PathBuf,

    /// Write the patched page to this file instead of printing it
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// JSON file seeding the function registry globals
    #[arg(long, value_name = "FILE")]
    pub globals: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct FailureLine {
    command: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct ApplyOutput {
    patched: Vec<String>,
    registered: Vec<String>,
    executed: usize,
    failures: Vec<FailureLine>,
    #[serde(flatten)]
    outcome: SessionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    written_to: Option<PathBuf>,
}

impl HumanReadable for ApplyOutput {
    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Patched:    {}\n", join_or_none(&self.patched)));
        out.push_str(&format!("Registered: {}\n", join_or_none(&self.registered)));
        out.push_str(&format!(
            "Commands:   {} executed, {} failed\n",
            self.executed,
            self.failures.len()
        ));
        for failure in &self.failures {
            out.push_str(&format!("  ! {}: {}\n", failure.command, failure.error));
        }
        if let Some(path) = &self.written_to {
            out.push_str(&format!("Page written to {}\n", path.display()));
        }
        out.push_str(&render_outcome(&self.outcome, self.written_to.is_none()));
        out
    }
}

pub async fn cmd_apply(args: ApplyArgs, ctx: &CliContext) -> Result<()> {
    let html = read_input(&args.page, "page").await?;
    let body = read_input(&args.response, "response").await?;
    let globals = args.globals.as_deref().or(ctx.config().globals.as_deref());
    let registry = build_registry(globals).await?;

    let session = Session::open(
        &html,
        &ctx.config().engine,
        registry,
        Arc::new(ScriptedTransport::new()),
    )?;
    let report = session
        .engine
        .apply_response(&body)
        .context("Failed to apply response")?;
    let outcome = session.finish().await;
    info!(patched = report.patched.len(), executed = report.executed, "response applied");

    if let Some(path) = &args.out {
        fs::write(path, &outcome.html)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let output = ApplyOutput {
        patched: report.patched.iter().map(ToString::to_string).collect(),
        registered: report.registered.iter().map(ToString::to_string).collect(),
        executed: report.executed,
        failures: report
            .failures
            .into_iter()
            .map(|failure| FailureLine {
                command: failure.command,
                error: failure.error,
            })
            .collect(),
        outcome,
        written_to: args.out,
    };
    emit(ctx.output(), &output)
}
