use controlsync_codec::{BoundFunction, Decoded, ScriptError, ScriptHost};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Script reference from the `js` response field: a URL or `{src, attributes}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptFile {
    Url(String),
    Detailed {
        src: String,
        #[serde(default)]
        attributes: IndexMap<String, String>,
    },
}

impl ScriptFile {
    pub fn src(&self) -> &str {
        match self {
            ScriptFile::Url(src) => src,
            ScriptFile::Detailed { src, .. } => src,
        }
    }
}

/// Browser window surface used by the response processor.
pub trait Window: ScriptHost {
    fn alert(&self, message: &str);
    fn load_script(&self, script: &ScriptFile);
    fn load_stylesheet(&self, href: &str);
    fn navigate(&self, location: &str);
    fn reload(&self);
    fn close(&self);
    /// Surfaces a failed exchange to the user.
    fn show_error(&self, message: &str);
    /// Writes profiling output to the out-of-band pane.
    fn show_profile(&self, html: &str);
    /// Notifies other tabs that server-side data changed.
    fn broadcast_watcher(&self);
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowAction {
    Alert { message: String },
    Script { src: String },
    Stylesheet { href: String },
    Navigate { location: String },
    Reload,
    Close,
    Error { message: String },
    Profile { html: String },
    Watcher,
    Eval { script: String },
    Call { code: String, args: Vec<serde_json::Value> },
}

/// Window that records every action instead of performing it.
///
/// Scripts containing a registered failure marker fail with a script error.
#[derive(Debug, Default)]
pub struct RecordingWindow {
    actions: Mutex<Vec<WindowAction>>,
    failure_markers: Mutex<Vec<String>>,
}

impl RecordingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_scripts_containing(&self, marker: impl Into<String>) {
        self.failure_markers.lock().push(marker.into());
    }

    pub fn actions(&self) -> Vec<WindowAction> {
        self.actions.lock().clone()
    }

    /// Evaluated script texts in execution order.
    pub fn evaluated(&self) -> Vec<String> {
        self.actions
            .lock()
            .iter()
            .filter_map(|action| match action {
                WindowAction::Eval { script } => Some(script.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.actions.lock().clear();
    }

    fn record(&self, action: WindowAction) {
        debug!(?action, "window action");
        self.actions.lock().push(action);
    }

    fn check(&self, text: &str) -> Result<(), ScriptError> {
        match self
            .failure_markers
            .lock()
            .iter()
            .find(|marker| text.contains(marker.as_str()))
        {
            Some(marker) => Err(ScriptError::new(format!("script raised at `{marker}`"))),
            None => Ok(()),
        }
    }
}

impl ScriptHost for RecordingWindow {
    fn eval(&self, script: &str) -> Result<Decoded, ScriptError> {
        self.record(WindowAction::Eval {
            script: script.to_string(),
        });
        self.check(script)?;
        Ok(Decoded::Undefined)
    }

    fn call_function(
        &self,
        function: &BoundFunction,
        _this: &Decoded,
        args: &[Decoded],
    ) -> Result<Decoded, ScriptError> {
        self.record(WindowAction::Call {
            code: function.code.clone(),
            args: args.iter().map(Decoded::to_json).collect(),
        });
        self.check(&function.code)?;
        Ok(Decoded::Undefined)
    }
}

impl Window for RecordingWindow {
    fn alert(&self, message: &str) {
        self.record(WindowAction::Alert {
            message: message.to_string(),
        });
    }

    fn load_script(&self, script: &ScriptFile) {
        self.record(WindowAction::Script {
            src: script.src().to_string(),
        });
    }

    fn load_stylesheet(&self, href: &str) {
        self.record(WindowAction::Stylesheet {
            href: href.to_string(),
        });
    }

    fn navigate(&self, location: &str) {
        self.record(WindowAction::Navigate {
            location: location.to_string(),
        });
    }

    fn reload(&self) {
        self.record(WindowAction::Reload);
    }

    fn close(&self) {
        self.record(WindowAction::Close);
    }

    fn show_error(&self, message: &str) {
        self.record(WindowAction::Error {
            message: message.to_string(),
        });
    }

    fn show_profile(&self, html: &str) {
        self.record(WindowAction::Profile {
            html: html.to_string(),
        });
    }

    fn broadcast_watcher(&self) {
        self.record(WindowAction::Watcher);
    }
}
