//! Synchronization engine: tracks control changes, builds minimal update
//! requests, serializes them through the request queue and applies the
//! server's responses in two phases.

pub mod builder;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod response;
pub mod window;

pub use builder::{ActionTiming, RequestBuilder, UpdateParams};
pub use command::{Command, CommandInterpreter};
pub use config::EngineConfig;
pub use engine::{EngineParts, SyncEngine};
pub use error::EngineError;
pub use events::EngineEvent;
pub use response::{ApplyReport, CommandFailure, ControlPatch, ResponseEnvelope, ResponseProcessor};
pub use window::{RecordingWindow, ScriptFile, Window, WindowAction};
