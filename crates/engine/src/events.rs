use controlsync_core_types::{CallType, ControlId};
use serde::Serialize;

/// Notifications published on the engine bus.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RequestDispatched {
        control: ControlId,
        call_type: CallType,
        full_resync: bool,
    },
    ResponseApplied {
        patched: usize,
        executed: usize,
        deferred: usize,
    },
    RequestFailed {
        error: String,
    },
    CommandFailed {
        command: String,
        error: String,
    },
    QueueDrained {
        finals: usize,
    },
    Watcher,
}
