use crate::decoded::{BoundFunction, Decoded};
use crate::errors::{CodecError, ScriptError};

/// Global scope against which variable references and function calls resolve.
pub trait Scope: Send + Sync {
    /// Value at a dotted path, `None` when any segment is absent.
    fn resolve_value(&self, path: &str) -> Option<Decoded>;

    /// Invokes the function at `func`, rooted at `context` when given.
    fn call(&self, func: &str, context: Option<&str>, args: Vec<Decoded>)
        -> Result<Decoded, CodecError>;
}

/// Executes script text and bound closures on behalf of the engine.
pub trait ScriptHost: Send + Sync {
    fn eval(&self, script: &str) -> Result<Decoded, ScriptError>;

    fn call_function(
        &self,
        function: &BoundFunction,
        this: &Decoded,
        args: &[Decoded],
    ) -> Result<Decoded, ScriptError>;
}

/// Scope with nothing in it; every reference is undefined.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn resolve_value(&self, _path: &str) -> Option<Decoded> {
        None
    }

    fn call(
        &self,
        func: &str,
        _context: Option<&str>,
        _args: Vec<Decoded>,
    ) -> Result<Decoded, CodecError> {
        Err(CodecError::UnknownFunction {
            path: func.to_string(),
        })
    }
}
