use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use controlsync_codec::CodecValue;
use controlsync_core_types::{CallType, EventId};
use controlsync_engine::UpdateParams;
use controlsync_scheduler::{metrics, HttpTransport};
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use url::Url;

use super::context::CliContext;
use super::output::{emit, HumanReadable};
use super::runtime::{build_registry, read_input};
use super::session::{render_outcome, Session, SessionOutcome};

#[derive(Args, Clone, Debug)]
pub struct SubmitArgs {
    /// HTML page holding the form
    #[arg(long, value_name = "FILE")]
    pub page: PathBuf,

    /// Control raising the update
    #[arg(long, value_name = "ID")]
    pub control: String,

    /// Event identifier sent with the update
    #[arg(long, default_value_t = 0)]
    pub event: u32,

    /// Set a control's value before sending (marks it dirty)
    #[arg(long = "set", value_name = "ID=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,

    /// Mark a control dirty without changing it
    #[arg(long = "dirty", value_name = "ID")]
    pub dirty: Vec<String>,

    /// Action parameter as codec-encoded JSON
    #[arg(long, value_name = "JSON")]
    pub param: Option<String>,

    /// Send as a background update
    #[arg(long)]
    pub background: bool,

    /// Send every control regardless of dirty state
    #[arg(long)]
    pub full: bool,

    /// Endpoint overriding the configured one and the form action
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Base URL relative destinations resolve against
    #[arg(long)]
    pub base: Option<String>,

    /// Write the resulting page to this file
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// JSON file seeding the function registry globals
    #[arg(long, value_name = "FILE")]
    pub globals: Option<PathBuf>,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((id, value)) if !id.trim().is_empty() => {
            Ok((id.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected ID=VALUE, got `{raw}`")),
    }
}

#[derive(Debug, Serialize)]
struct SchedulerCounters {
    enqueued: u64,
    started: u64,
    completed: u64,
    failed: u64,
    timed_out: u64,
}

#[derive(Debug, Serialize)]
struct SubmitOutput {
    control: String,
    call_type: CallType,
    base: String,
    scheduler: SchedulerCounters,
    #[serde(flatten)]
    outcome: SessionOutcome,
}

impl HumanReadable for SubmitOutput {
    fn render(&self) -> String {
        let mut out = format!(
            "Submitted {} update for `{}` via {}\n",
            self.call_type, self.control, self.base
        );
        out.push_str(&format!(
            "Requests:  {} started, {} completed, {} failed ({} timed out)\n",
            self.scheduler.started,
            self.scheduler.completed,
            self.scheduler.failed,
            self.scheduler.timed_out
        ));
        out.push_str(&render_outcome(&self.outcome, false));
        out
    }
}

pub async fn cmd_submit(args: SubmitArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(endpoint) = &args.endpoint {
        config.engine.endpoint = endpoint.clone();
    }
    if args.full {
        config.engine.change_events = false;
    }
    let base = match &args.base {
        Some(base) => Url::parse(base).with_context(|| format!("Invalid base URL: {base}"))?,
        None => config.transport_base()?.context(
            "No base URL: pass --base, set base_url, or configure an absolute endpoint",
        )?,
    };
    let param = match &args.param {
        Some(raw) => {
            let value: Value = serde_json::from_str(raw).context("Invalid --param JSON")?;
            Some(CodecValue::parse(&value).context("Invalid --param value")?)
        }
        None => None,
    };

    let html = read_input(&args.page, "page").await?;
    let globals = args.globals.as_deref().or(config.globals.as_deref());
    let registry = build_registry(globals).await?;
    let transport = Arc::new(HttpTransport::new(base.clone())?);
    let session = Session::open(&html, &config.engine, registry, transport)?;

    for (id, value) in &args.set {
        session
            .page
            .set_user_value(id, Value::String(value.clone()))
            .with_context(|| format!("Cannot set `{id}`"))?;
        session.engine.mark_dirty(id.as_str());
    }
    for id in &args.dirty {
        session.engine.mark_dirty(id.as_str());
    }

    let mut params = UpdateParams::new(args.control.as_str(), EventId(args.event));
    if let Some(param) = param {
        params = params.with_param(param);
    }
    let call_type = if args.background {
        session.engine.request_background_update(params)?;
        CallType::Background
    } else {
        session.engine.request_synchronized_update(params)?;
        CallType::Interactive
    };
    let outcome = session.finish().await;

    if let Some(path) = &args.out {
        fs::write(path, &outcome.html)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let counters = metrics::snapshot();
    let failures: Vec<String> = outcome
        .failed_requests()
        .into_iter()
        .map(str::to_string)
        .collect();
    let output = SubmitOutput {
        control: args.control,
        call_type,
        base: base.to_string(),
        scheduler: SchedulerCounters {
            enqueued: counters.enqueued,
            started: counters.started,
            completed: counters.completed,
            failed: counters.failed,
            timed_out: counters.timed_out,
        },
        outcome,
    };
    emit(ctx.output(), &output)?;
    if !failures.is_empty() {
        bail!("request failed: {}", failures.join("; "));
    }
    Ok(())
}
