//! Page abstraction for controlsync plus an in-memory page backed by html5ever.

pub mod api;
mod dom;
pub mod errors;
pub mod memory;
pub mod model;
pub mod selector;

pub use api::Page;
pub use errors::PageError;
pub use memory::InMemoryPage;
pub use model::{ControlKind, ElementHandle, FormControl, MethodCall};
pub use selector::Selector;
