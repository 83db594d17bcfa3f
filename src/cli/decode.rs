use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use controlsync_codec::ObjectCodec;
use serde::Serialize;
use serde_json::Value;

use super::context::CliContext;
use super::output::{emit, HumanReadable};
use super::runtime::{build_registry, read_input};

#[derive(Args, Clone, Debug)]
pub struct DecodeArgs {
    /// Codec value as inline JSON, or `@FILE` to read it from a file
    #[arg(value_name = "JSON")]
    pub value: String,

    /// JSON file seeding the function registry globals
    #[arg(long, value_name = "FILE")]
    pub globals: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct NodeFailure {
    path: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct DecodeOutput {
    value: Value,
    errors: Vec<NodeFailure>,
}

impl HumanReadable for DecodeOutput {
    fn render(&self) -> String {
        let mut out = serde_json::to_string_pretty(&self.value).unwrap_or_default();
        out.push('\n');
        for failure in &self.errors {
            out.push_str(&format!("! {}: {}\n", failure.path, failure.error));
        }
        out
    }
}

pub async fn cmd_decode(args: DecodeArgs, ctx: &CliContext) -> Result<()> {
    let raw = match args.value.strip_prefix('@') {
        Some(path) => read_input(Path::new(path), "value file").await?,
        None => args.value.clone(),
    };
    let value: Value = serde_json::from_str(&raw).context("Value is not valid JSON")?;
    let globals = args.globals.as_deref().or(ctx.config().globals.as_deref());
    let registry = build_registry(globals).await?;

    let report = ObjectCodec::new().decode_json(&value, registry.as_ref());
    let output = DecodeOutput {
        value: report.value.to_json(),
        errors: report
            .errors
            .into_iter()
            .map(|node| NodeFailure {
                path: node.path,
                error: node.error.to_string(),
            })
            .collect(),
    };
    emit(ctx.output(), &output)
}
