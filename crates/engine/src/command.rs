use std::fmt;

use controlsync_codec::{CodecValue, Decoded, ObjectCodec};
use controlsync_page::{Page, PageError};
use controlsync_registry::{FunctionRegistry, RegistryError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::EngineError;
use crate::window::Window;

/// One deferred instruction from a response's `commands` list.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Command {
    Script {
        script: String,
        #[serde(default, rename = "final")]
        is_final: bool,
    },
    Selector {
        selector: String,
        func: String,
        #[serde(default)]
        params: Vec<Value>,
        #[serde(default)]
        root: Option<String>,
        #[serde(default, rename = "final")]
        is_final: bool,
    },
    Function {
        func: String,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        params: Vec<Value>,
        #[serde(default, rename = "final")]
        is_final: bool,
    },
}

impl Command {
    pub fn from_value(value: &Value) -> Result<Self, EngineError> {
        Command::deserialize(value).map_err(|_| EngineError::MalformedCommand(value.to_string()))
    }

    pub fn is_final(&self) -> bool {
        match self {
            Command::Script { is_final, .. }
            | Command::Selector { is_final, .. }
            | Command::Function { is_final, .. } => *is_final,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Script { script, .. } => {
                let head: String = script.chars().take(40).collect();
                write!(f, "script `{head}`")
            }
            Command::Selector { selector, func, .. } => write!(f, "{func} on `{selector}`"),
            Command::Function {
                func, id, context, ..
            } => match (id, context) {
                (Some(id), _) => write!(f, "{func} on #{id}"),
                (None, Some(context)) => write!(f, "{context}.{func}"),
                (None, None) => f.write_str(func),
            },
        }
    }
}

/// Executes single commands against the page, window and registry.
pub struct CommandInterpreter<'a> {
    page: &'a dyn Page,
    window: &'a dyn Window,
    registry: &'a FunctionRegistry,
    codec: ObjectCodec,
}

impl<'a> CommandInterpreter<'a> {
    pub fn new(page: &'a dyn Page, window: &'a dyn Window, registry: &'a FunctionRegistry) -> Self {
        Self {
            page,
            window,
            registry,
            codec: ObjectCodec::new(),
        }
    }

    pub fn execute(&self, command: &Command) -> Result<(), EngineError> {
        trace!(%command, "executing command");
        match command {
            Command::Script { script, .. } => {
                self.window.eval(script)?;
                Ok(())
            }
            Command::Selector {
                selector,
                func,
                params,
                root,
                ..
            } => {
                let args = self.decode_params(params, command)?;
                for element in self.page.select(selector, root.as_deref())? {
                    match self.page.invoke(element, func, &args) {
                        Ok(_) => {}
                        Err(PageError::UnknownMethod(method)) => {
                            trace!(%method, "method not supported by element; skipped");
                        }
                        Err(err) => warn!(%command, error = %err, "element invocation failed"),
                    }
                }
                Ok(())
            }
            Command::Function {
                func,
                id,
                context,
                params,
                ..
            } => {
                let args = self.decode_params(params, command)?;
                if let Some(id) = id {
                    let element = self
                        .page
                        .element_by_id(id)
                        .ok_or_else(|| EngineError::ElementNotFound(id.clone()))?;
                    self.page.invoke(element, func, &args)?;
                    return Ok(());
                }
                self.call_function(func, context.as_deref(), &args)
            }
        }
    }

    fn call_function(&self, func: &str, context: Option<&str>, args: &[Decoded]) -> Result<(), EngineError> {
        match self.registry.invoke(func, context, args) {
            Ok(_) => Ok(()),
            Err(RegistryError::UnknownFunction { path }) => {
                // Globals may hold closures shipped earlier by the server.
                let closure = self
                    .registry
                    .global(&path)
                    .and_then(|value| CodecValue::parse(&value).ok());
                let Some(CodecValue::Closure { code, params }) = closure else {
                    return Err(RegistryError::UnknownFunction { path }.into());
                };
                let this = context
                    .and_then(|context| self.registry.global(context))
                    .map(|value| Decoded::from_json(&value))
                    .unwrap_or_default();
                let function = controlsync_codec::BoundFunction::new(code, params);
                self.window.call_function(&function, &this, args)?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Decodes parameters depth-first. Failed nodes are passed as undefined
    /// and logged; malformed parameters abort the command.
    fn decode_params(&self, params: &[Value], command: &Command) -> Result<Vec<Decoded>, EngineError> {
        let parsed = params
            .iter()
            .map(|param| self.codec.parse(param))
            .collect::<Result<Vec<_>, _>>()?;
        let (values, errors) = self.codec.decode_params(&parsed, self.registry);
        for error in errors {
            warn!(%command, path = %error.path, error = %error.error, "parameter decoded as undefined");
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{RecordingWindow, WindowAction};
    use controlsync_page::InMemoryPage;
    use serde_json::json;

    fn fixture() -> (InMemoryPage, RecordingWindow, FunctionRegistry) {
        let page = InMemoryPage::parse(
            r#"<form id="f"><div id="list"><p id="p1" class="row"></p><p id="p2" class="row"></p></div><input id="q"></form>"#,
        )
        .unwrap();
        let registry = FunctionRegistry::with_globals(json!({
            "ui": {"theme": "dark", "onDone": {"objType": "closure", "code": "done()", "params": []}}
        }));
        (page, RecordingWindow::new(), registry)
    }

    #[test]
    fn parses_each_wire_shape() {
        let script = Command::from_value(&json!({"script": "go()", "final": true})).unwrap();
        assert!(script.is_final());
        let selector =
            Command::from_value(&json!({"selector": ".row", "func": "addClass", "params": ["x"], "root": "list"}))
                .unwrap();
        assert!(matches!(selector, Command::Selector { root: Some(_), .. }));
        let function = Command::from_value(&json!({"func": "focus", "id": "q"})).unwrap();
        assert!(matches!(function, Command::Function { id: Some(_), .. }));
        assert!(Command::from_value(&json!({"params": []})).is_err());
    }

    #[test]
    fn selector_command_decodes_params_per_element() {
        let (page, window, registry) = fixture();
        let interpreter = CommandInterpreter::new(&page, &window, &registry);
        let command = Command::from_value(&json!({
            "selector": ".row",
            "func": "addClass",
            "root": "list",
            "params": [{"objType": "varref", "path": "ui.theme"}]
        }))
        .unwrap();
        interpreter.execute(&command).unwrap();
        assert!(page.has_class("p1", "dark"));
        assert!(page.has_class("p2", "dark"));
    }

    #[test]
    fn unknown_selector_method_is_skipped() {
        let (page, window, registry) = fixture();
        let interpreter = CommandInterpreter::new(&page, &window, &registry);
        let command = Command::from_value(&json!({"selector": ".row", "func": "sparkle"})).unwrap();
        assert!(interpreter.execute(&command).is_ok());
        let missing = Command::from_value(&json!({"selector": ".nothing", "func": "hide"})).unwrap();
        assert!(interpreter.execute(&missing).is_ok());
    }

    #[test]
    fn function_command_targets_element_or_registry() {
        let (page, window, registry) = fixture();
        registry.register("ui.setTheme", |_, args| Ok(args[0].clone()));
        let interpreter = CommandInterpreter::new(&page, &window, &registry);

        interpreter
            .execute(&Command::from_value(&json!({"func": "focus", "id": "q"})).unwrap())
            .unwrap();
        assert_eq!(page.focused().as_deref(), Some("q"));

        interpreter
            .execute(&Command::from_value(&json!({"func": "setTheme", "context": "ui", "params": ["light"]})).unwrap())
            .unwrap();

        let err = interpreter
            .execute(&Command::from_value(&json!({"func": "ghost.run"})).unwrap())
            .unwrap_err();
        assert!(matches!(err, EngineError::Registry(RegistryError::UnknownPath { .. })));
    }

    #[test]
    fn closure_globals_run_through_the_window() {
        let (page, window, registry) = fixture();
        let interpreter = CommandInterpreter::new(&page, &window, &registry);
        interpreter
            .execute(&Command::from_value(&json!({"func": "onDone", "context": "ui", "params": [1]})).unwrap())
            .unwrap();
        assert_eq!(
            window.actions(),
            vec![WindowAction::Call {
                code: "done()".into(),
                args: vec![json!(1)]
            }]
        );
    }
}
