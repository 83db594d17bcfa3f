pub mod action_queue;
pub mod error;
pub mod metrics;
pub mod model;
pub mod request_queue;
pub mod transport;

pub use action_queue::ActionQueue;
pub use error::{SchedulerError, TransportError};
pub use model::{
    ActionQueueConfig, OutboundRequest, PendingRequest, QueueConfig, QueueEvent, QueueStatus,
    QueuedAction, RequestDescriptor, TransportReply,
};
pub use request_queue::{DrainHook, RequestQueue};
pub use transport::{HttpTransport, ScriptedTransport, Transport};
