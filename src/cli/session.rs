use std::sync::Arc;

use anyhow::{Context, Result};
use controlsync_engine::{
    EngineConfig, EngineEvent, EngineParts, RecordingWindow, SyncEngine, WindowAction,
};
use controlsync_page::InMemoryPage;
use controlsync_registry::FunctionRegistry;
use controlsync_scheduler::Transport;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;

/// Engine wired to an in-memory page and a recording window.
pub struct Session {
    pub engine: SyncEngine,
    pub page: Arc<InMemoryPage>,
    pub window: Arc<RecordingWindow>,
    events: broadcast::Receiver<EngineEvent>,
}

#[derive(Debug, Serialize)]
pub struct SessionOutcome {
    pub events: Vec<EngineEvent>,
    pub window: Vec<WindowAction>,
    pub html: String,
}

impl SessionOutcome {
    pub fn failed_requests(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                EngineEvent::RequestFailed { error } => Some(error.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Session {
    pub fn open(
        html: &str,
        config: &EngineConfig,
        registry: Arc<FunctionRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let page = Arc::new(InMemoryPage::parse(html).context("Failed to parse page")?);
        let window = Arc::new(RecordingWindow::new());
        let engine = SyncEngine::new(
            EngineParts {
                page: page.clone(),
                window: window.clone(),
                registry,
                transport,
            },
            config.clone(),
        )
        .context("Failed to start engine")?;
        let events = engine.subscribe();
        engine.init();
        Ok(Self {
            engine,
            page,
            window,
            events,
        })
    }

    /// Waits for queued work, then collects what happened.
    pub async fn finish(mut self) -> SessionOutcome {
        self.engine.wait_idle().await;
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "engine events dropped");
                }
                Err(_) => break,
            }
        }
        SessionOutcome {
            events,
            window: self.window.actions(),
            html: self.page.to_html(),
        }
    }
}

pub fn render_outcome(outcome: &SessionOutcome, include_html: bool) -> String {
    let mut out = String::new();
    if !outcome.events.is_empty() {
        out.push_str("Events:\n");
        for event in &outcome.events {
            out.push_str(&format!("  {}\n", serde_json::to_string(event).unwrap_or_default()));
        }
    }
    if !outcome.window.is_empty() {
        out.push_str("Window:\n");
        for action in &outcome.window {
            out.push_str(&format!("  {}\n", serde_json::to_string(action).unwrap_or_default()));
        }
    }
    if include_html {
        out.push_str(&outcome.html);
        out.push('\n');
    }
    out
}
