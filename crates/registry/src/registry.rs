use std::sync::Arc;

use controlsync_codec::{CodecError, Decoded, Scope};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::errors::RegistryError;

/// Host function reachable by dotted path. Receives the resolved `this`
/// value (undefined without a context) and the decoded arguments.
pub type NativeFunction =
    Arc<dyn Fn(&Decoded, &[Decoded]) -> Result<Decoded, String> + Send + Sync + 'static>;

/// Global scope for codec evaluation: a JSON tree of values plus functions
/// registered under dotted paths.
pub struct FunctionRegistry {
    functions: DashMap<String, NativeFunction>,
    globals: RwLock<Value>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            functions: DashMap::new(),
            globals: RwLock::new(Value::Object(Map::new())),
        }
    }

    /// Registry seeded with a globals tree. Non-object roots are wrapped as `{}`.
    pub fn with_globals(globals: Value) -> Self {
        let registry = Self::new();
        if globals.is_object() {
            *registry.globals.write() = globals;
        }
        registry
    }

    pub fn register<F>(&self, path: impl Into<String>, function: F)
    where
        F: Fn(&Decoded, &[Decoded]) -> Result<Decoded, String> + Send + Sync + 'static,
    {
        let path = path.into();
        debug!(%path, "function registered");
        self.functions.insert(path, Arc::new(function));
    }

    pub fn unregister(&self, path: &str) -> bool {
        self.functions.remove(path).is_some()
    }

    pub fn has_function(&self, path: &str) -> bool {
        self.functions.contains_key(path)
    }

    pub fn function_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.functions.iter().map(|entry| entry.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Writes a global value, creating intermediate objects along the path.
    pub fn set_global(&self, path: &str, value: Value) {
        let mut globals = self.globals.write();
        let mut cursor = &mut *globals;
        for segment in path.split('.') {
            if !cursor.is_object() {
                *cursor = Value::Object(Map::new());
            }
            let Value::Object(map) = cursor else {
                return;
            };
            cursor = map.entry(segment.to_string()).or_insert(Value::Null);
        }
        *cursor = value;
    }

    pub fn global(&self, path: &str) -> Option<Value> {
        let globals = self.globals.read();
        walk(&globals, path).cloned()
    }

    /// True when the path names a global value or a prefix of registered functions.
    pub fn namespace_exists(&self, path: &str) -> bool {
        if path.is_empty() || self.global(path).is_some() {
            return true;
        }
        let prefix = format!("{path}.");
        self.functions.iter().any(|entry| entry.key().starts_with(&prefix))
    }

    pub fn invoke(
        &self,
        func: &str,
        context: Option<&str>,
        args: &[Decoded],
    ) -> Result<Decoded, RegistryError> {
        let key = match context {
            Some(context) => format!("{context}.{func}"),
            None => func.to_string(),
        };
        let Some(function) = self.functions.get(&key).map(|entry| Arc::clone(entry.value())) else {
            return Err(self.missing(&key));
        };
        let this = context
            .and_then(|context| self.global(context))
            .map(|value| Decoded::from_json(&value))
            .unwrap_or_default();
        trace!(function = %key, args = args.len(), "invoking registered function");
        function(&this, args).map_err(|message| RegistryError::Invocation {
            func: key,
            message,
        })
    }

    fn missing(&self, key: &str) -> RegistryError {
        match key.rsplit_once('.') {
            Some((parent, _)) if !self.namespace_exists(parent) => RegistryError::UnknownPath {
                path: parent.to_string(),
            },
            _ => RegistryError::UnknownFunction {
                path: key.to_string(),
            },
        }
    }
}

impl Scope for FunctionRegistry {
    fn resolve_value(&self, path: &str) -> Option<Decoded> {
        self.global(path).map(|value| Decoded::from_json(&value))
    }

    fn call(
        &self,
        func: &str,
        context: Option<&str>,
        args: Vec<Decoded>,
    ) -> Result<Decoded, CodecError> {
        self.invoke(func, context, &args).map_err(CodecError::from)
    }
}

fn walk<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> FunctionRegistry {
        let registry = FunctionRegistry::with_globals(json!({
            "app": {"config": {"limit": 10}, "tags": ["a", "b"]}
        }));
        registry.register("app.describe", |this, _| {
            let limit = this
                .get("config")
                .and_then(|config| config.get("limit"))
                .map(Decoded::to_text)
                .unwrap_or_default();
            Ok(Decoded::from(format!("limit={limit}")))
        });
        registry.register("ui.greet", |this, args| {
            let who = if this.is_undefined() { "anon this" } else { "bound this" };
            Ok(Decoded::from(format!("hi {} ({who})", args[0].to_text())))
        });
        registry
    }

    #[test]
    fn walks_objects_and_array_indexes() {
        let registry = registry();
        assert_eq!(registry.global("app.config.limit"), Some(json!(10)));
        assert_eq!(registry.global("app.tags.1"), Some(json!("b")));
        assert_eq!(registry.resolve_value("app.missing.deep"), None);
    }

    #[test]
    fn context_call_binds_this() {
        let registry = registry();
        let result = registry.invoke("describe", Some("app"), &[]).unwrap();
        assert_eq!(result, Decoded::from("limit=10"));
    }

    #[test]
    fn namespace_only_context_has_undefined_this() {
        let registry = registry();
        let result = registry.invoke("greet", Some("ui"), &[Decoded::from("bo")]).unwrap();
        assert_eq!(result, Decoded::from("hi bo (anon this)"));
    }

    #[test]
    fn missing_function_in_known_namespace() {
        let err = registry().invoke("nope", Some("app"), &[]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownFunction {
                path: "app.nope".into()
            }
        );
    }

    #[test]
    fn missing_namespace_is_unknown_path() {
        let err = registry().invoke("x.y.run", None, &[]).unwrap_err();
        assert_eq!(err, RegistryError::UnknownPath { path: "x.y".into() });
    }

    #[test]
    fn failures_surface_as_invocation_errors() {
        let registry = FunctionRegistry::new();
        registry.register("boom", |_, _| Err("bad input".to_string()));
        let err = registry.call("boom", None, vec![]).unwrap_err();
        assert_eq!(
            err,
            CodecError::Invocation {
                func: "boom".into(),
                message: "bad input".into()
            }
        );
    }

    #[test]
    fn set_global_creates_intermediate_objects() {
        let registry = FunctionRegistry::new();
        registry.set_global("a.b.c", json!(1));
        assert_eq!(registry.global("a"), Some(json!({"b": {"c": 1}})));
        assert!(registry.namespace_exists("a.b"));
    }
}
