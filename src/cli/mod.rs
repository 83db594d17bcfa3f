pub mod apply;
pub mod commands;
pub mod context;
pub mod decode;
pub mod dispatch;
pub mod env;
pub mod info;
pub mod output;
pub mod runtime;
pub mod session;
pub mod submit;

pub use context::CliContext;
pub use dispatch::dispatch;
pub use env::CliArgs;
pub use runtime::{init_logging, load_config};
