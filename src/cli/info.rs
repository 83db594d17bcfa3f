use anyhow::Result;
use serde::Serialize;

use super::context::CliContext;
use super::output::{emit, HumanReadable};

#[derive(Debug, Serialize)]
struct InfoOutput {
    version: &'static str,
    build_date: &'static str,
    git_hash: &'static str,
    git_branch: &'static str,
    config_path: String,
    endpoint: String,
    base_url: Option<String>,
    debounce_ms: u64,
    request_timeout_ms: u64,
    change_events: bool,
}

impl HumanReadable for InfoOutput {
    fn render(&self) -> String {
        let endpoint = if self.endpoint.is_empty() {
            "(form action)"
        } else {
            self.endpoint.as_str()
        };
        let mut out = String::from("controlsync System Information\n");
        out.push_str(&format!("  Version:         {}\n", self.version));
        out.push_str(&format!("  Build date:      {}\n", self.build_date));
        out.push_str(&format!("  Git:             {} ({})\n", self.git_hash, self.git_branch));
        out.push_str(&format!("  Config file:     {}\n", self.config_path));
        out.push_str(&format!("  Endpoint:        {endpoint}\n"));
        out.push_str(&format!(
            "  Base URL:        {}\n",
            self.base_url.as_deref().unwrap_or("(none)")
        ));
        out.push_str(&format!("  Debounce:        {} ms\n", self.debounce_ms));
        out.push_str(&format!("  Request timeout: {} ms\n", self.request_timeout_ms));
        out.push_str(&format!("  Change events:   {}\n", self.change_events));
        out
    }
}

pub async fn cmd_info(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let output = InfoOutput {
        version: env!("CARGO_PKG_VERSION"),
        build_date: env!("BUILD_DATE"),
        git_hash: env!("GIT_HASH"),
        git_branch: env!("GIT_BRANCH"),
        config_path: ctx.config_path().display().to_string(),
        endpoint: config.engine.endpoint.clone(),
        base_url: config.base_url.clone(),
        debounce_ms: config.engine.debounce_ms,
        request_timeout_ms: config.engine.request_timeout_ms,
        change_events: config.engine.change_events,
    };
    emit(ctx.output(), &output)
}
