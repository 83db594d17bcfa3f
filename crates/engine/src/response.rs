use controlsync_core_types::ControlId;
use controlsync_event_bus::{EventBus, InMemoryBus};
use controlsync_page::Page;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::command::{Command, CommandInterpreter};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::window::{ScriptFile, Window};

/// Hook invoked once for every control that appears on the page.
pub type RegisterHook = std::sync::Arc<dyn Fn(&ControlId) + Send + Sync + 'static>;

/// Server instructions for one control.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ControlPatch {
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
    #[serde(default, alias = "attr")]
    pub attributes: Option<Map<String, Value>>,
    #[serde(default)]
    pub html: Option<String>,
}

/// Decoded server reply. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub controls: IndexMap<String, ControlPatch>,
    #[serde(default)]
    pub js: Vec<ScriptFile>,
    #[serde(default)]
    pub ss: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub alert: Vec<String>,
    /// Kept raw so that one malformed command cannot reject the envelope.
    #[serde(default)]
    pub commands: Vec<Value>,
    #[serde(default, deserialize_with = "truthy")]
    pub winclose: bool,
    #[serde(default)]
    pub loc: Option<String>,
    #[serde(default, rename = "profileHtml")]
    pub profile_html: Option<String>,
    #[serde(default, deserialize_with = "truthy")]
    pub watcher: bool,
}

impl ResponseEnvelope {
    /// Parses a response body. Anything but a JSON object is malformed.
    pub fn parse(body: &str) -> Result<Self, EngineError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|err| EngineError::MalformedResponse(err.to_string()))?;
        if !value.is_object() {
            return Err(EngineError::MalformedResponse("body is not a JSON object".into()));
        }
        ResponseEnvelope::deserialize(&value).map_err(|err| EngineError::MalformedResponse(err.to_string()))
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::String(text) => vec![text],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    })
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommandFailure {
    pub command: String,
    pub error: String,
}

/// What one application of an envelope did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyReport {
    pub patched: Vec<ControlId>,
    pub registered: Vec<ControlId>,
    pub executed: usize,
    /// Final commands handed back for replay after the queue drains.
    pub deferred: Vec<Command>,
    pub failures: Vec<CommandFailure>,
}

/// Applies envelopes in two phases: DOM patches and resource loading first,
/// then commands and window instructions.
pub struct ResponseProcessor<'a> {
    pub page: &'a dyn Page,
    pub window: &'a dyn Window,
    pub config: &'a EngineConfig,
    pub interpreter: CommandInterpreter<'a>,
    pub on_register: Option<RegisterHook>,
    pub bus: Option<&'a InMemoryBus<EngineEvent>>,
}

impl<'a> ResponseProcessor<'a> {
    /// With `defer_finals`, final commands are returned in the report
    /// instead of executed.
    pub fn apply(&self, envelope: &ResponseEnvelope, defer_finals: bool) -> ApplyReport {
        let mut report = ApplyReport::default();
        self.immediate(envelope, &mut report);
        self.deferred(envelope, defer_finals, &mut report);
        debug!(
            patched = report.patched.len(),
            executed = report.executed,
            deferred = report.deferred.len(),
            failures = report.failures.len(),
            "response applied"
        );
        report
    }

    fn immediate(&self, envelope: &ResponseEnvelope, report: &mut ApplyReport) {
        for (id, patch) in &envelope.controls {
            match self.patch_control(id, patch) {
                Ok(true) => report.patched.push(ControlId::new(id.as_str())),
                Ok(false) => debug!(control = %id, "patch target missing; skipped"),
                Err(err) => warn!(control = %id, error = %err, "control patch failed"),
            }
        }
        report.registered = self.register_new_controls();
        for script in &envelope.js {
            self.window.load_script(script);
        }
        for href in &envelope.ss {
            self.window.load_stylesheet(href);
        }
        for message in &envelope.alert {
            self.window.alert(message);
        }
    }

    fn patch_control(&self, id: &str, patch: &ControlPatch) -> Result<bool, EngineError> {
        let exists = self.page.exists(id);
        if exists {
            if let Some(value) = &patch.value {
                self.page.set_value(id, value)?;
            }
            if let Some(attributes) = &patch.attributes {
                self.page.set_attributes(id, attributes)?;
            }
        }
        let Some(html) = &patch.html else {
            return Ok(exists);
        };
        let wrapper = ControlId::new(id).wrapper(&self.config.wrapper_suffix);
        if self.page.exists(&wrapper) {
            self.page.replace_element(&wrapper, html)?;
        } else if exists {
            self.page.relocate_related(id, &self.config.related_attribute)?;
            self.page.replace_element(id, html)?;
        } else {
            self.page.append_to_form(html)?;
        }
        Ok(true)
    }

    /// Marks and announces controls not seen before.
    pub fn register_new_controls(&self) -> Vec<ControlId> {
        let mut registered = Vec::new();
        for id in self.page.control_ids() {
            if self.page.is_registered(id.as_str()) {
                continue;
            }
            self.page.mark_registered(id.as_str());
            if let Some(hook) = &self.on_register {
                hook(&id);
            }
            registered.push(id);
        }
        registered
    }

    fn deferred(&self, envelope: &ResponseEnvelope, defer_finals: bool, report: &mut ApplyReport) {
        for raw in &envelope.commands {
            let command = match Command::from_value(raw) {
                Ok(command) => command,
                Err(err) => {
                    self.fail(raw.to_string(), &err, report);
                    continue;
                }
            };
            if defer_finals && command.is_final() {
                report.deferred.push(command);
                continue;
            }
            self.run(&command, report);
        }
        if envelope.winclose {
            self.window.close();
        }
        match envelope.loc.as_deref() {
            Some("reload") => self.window.reload(),
            Some(location) if !location.is_empty() => self.window.navigate(location),
            _ => {}
        }
        if let Some(html) = &envelope.profile_html {
            self.window.show_profile(html);
        }
        if envelope.watcher {
            self.window.broadcast_watcher();
            self.publish(EngineEvent::Watcher);
        }
    }

    /// Executes one command, containing any failure.
    pub fn run(&self, command: &Command, report: &mut ApplyReport) {
        match self.interpreter.execute(command) {
            Ok(()) => report.executed += 1,
            Err(err) => self.fail(command.to_string(), &err, report),
        }
    }

    fn fail(&self, command: String, err: &EngineError, report: &mut ApplyReport) {
        warn!(%command, error = %err, "command failed");
        self.publish(EngineEvent::CommandFailed {
            command: command.clone(),
            error: err.to_string(),
        });
        report.failures.push(CommandFailure {
            command,
            error: err.to_string(),
        });
    }

    fn publish(&self, event: EngineEvent) {
        if let Some(bus) = self.bus {
            let _ = bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{RecordingWindow, WindowAction};
    use controlsync_page::InMemoryPage;
    use controlsync_registry::FunctionRegistry;
    use serde_json::json;

    #[test]
    fn envelope_accepts_loose_shapes() {
        let envelope = ResponseEnvelope::parse(
            r#"{"alert": "hi", "winclose": 1, "js": ["/a.js", {"src": "/b.js", "attributes": {"defer": "defer"}}],
                "controls": {"x": {"value": null, "attr": {"title": "t"}}}}"#,
        )
        .unwrap();
        assert_eq!(envelope.alert, vec!["hi"]);
        assert!(envelope.winclose);
        assert_eq!(envelope.js[1].src(), "/b.js");
        assert_eq!(envelope.controls["x"].value, Some(Value::Null));
        assert!(envelope.controls["x"].attributes.is_some());
    }

    #[test]
    fn non_object_bodies_are_malformed() {
        assert!(ResponseEnvelope::parse("[1,2]").is_err());
        assert!(ResponseEnvelope::parse("<html>").is_err());
        assert!(ResponseEnvelope::parse("{}").is_ok());
    }

    #[test]
    fn phases_apply_in_order_and_failures_are_isolated() {
        let page = InMemoryPage::parse(r#"<form id="f"><input id="a" value="0"></form>"#).unwrap();
        let window = RecordingWindow::new();
        window.fail_scripts_containing("explode");
        let registry = FunctionRegistry::new();
        let config = EngineConfig::default();
        let processor = ResponseProcessor {
            page: &page,
            window: &window,
            config: &config,
            interpreter: CommandInterpreter::new(&page, &window, &registry),
            on_register: None,
            bus: None,
        };
        let envelope = ResponseEnvelope::parse(
            &json!({
                "loc": "/next",
                "commands": [{"script": "explode()"}, {"bogus": true}, {"script": "after()"}, {"script": "late()", "final": true}],
                "controls": {"a": {"value": "5"}},
                "ss": ["/s.css"],
                "watcher": true
            })
            .to_string(),
        )
        .unwrap();

        let report = processor.apply(&envelope, true);

        assert_eq!(page.value_of("a").as_deref(), Some("5"));
        assert_eq!(report.patched, vec![ControlId::new("a")]);
        assert_eq!(report.registered, vec![ControlId::new("a")]);
        assert_eq!(report.executed, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.deferred.len(), 1);
        assert_eq!(
            window.actions(),
            vec![
                WindowAction::Stylesheet { href: "/s.css".into() },
                WindowAction::Eval { script: "explode()".into() },
                WindowAction::Eval { script: "after()".into() },
                WindowAction::Navigate { location: "/next".into() },
                WindowAction::Watcher,
            ]
        );
    }
}
