pub mod builtins;
pub mod errors;
pub mod registry;

pub use errors::RegistryError;
pub use registry::{FunctionRegistry, NativeFunction};
