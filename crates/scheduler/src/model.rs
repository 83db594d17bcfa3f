use std::fmt;
use std::time::Duration;

use controlsync_core_types::RequestId;

use crate::error::TransportError;

/// Form-encoded request handed to a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundRequest {
    pub id: RequestId,
    pub destination: String,
    pub fields: Vec<(String, String)>,
}

impl OutboundRequest {
    /// First value submitted under `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(key, _)| key.as_str()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

impl TransportReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub type SuccessCallback = Box<dyn FnOnce(TransportReply) + Send + 'static>;
pub type ErrorCallback = Box<dyn FnOnce(TransportError) + Send + 'static>;

/// What a pending request turns into once the queue is ready for it.
pub struct RequestDescriptor {
    pub destination: String,
    pub fields: Vec<(String, String)>,
    pub on_success: SuccessCallback,
    pub on_error: ErrorCallback,
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("destination", &self.destination)
            .field("fields", &self.fields.len())
            .finish()
    }
}

pub type RequestBuilderFn = Box<dyn FnOnce() -> Option<RequestDescriptor> + Send + 'static>;

/// Deferred request. The builder runs only when the request is dispatched,
/// so it observes every effect of the responses before it.
pub struct PendingRequest {
    pub label: String,
    pub asynchronous: bool,
    pub build: RequestBuilderFn,
}

impl PendingRequest {
    pub fn new<F>(label: impl Into<String>, asynchronous: bool, build: F) -> Self
    where
        F: FnOnce() -> Option<RequestDescriptor> + Send + 'static,
    {
        Self {
            label: label.into(),
            asynchronous,
            build: Box::new(build),
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("label", &self.label)
            .field("asynchronous", &self.asynchronous)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub request_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub queued: usize,
    pub in_flight: bool,
    pub async_in_flight: usize,
}

impl QueueStatus {
    pub fn is_running(&self) -> bool {
        self.in_flight || self.queued > 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueueEvent {
    Dispatched {
        request: RequestId,
        destination: String,
        asynchronous: bool,
    },
    Completed {
        request: RequestId,
        status: u16,
    },
    Failed {
        request: RequestId,
        error: String,
    },
    Drained,
}

/// Callback scheduled through the action queue.
pub struct QueuedAction {
    pub label: String,
    pub is_last: bool,
    pub delay: Duration,
    pub run: Box<dyn FnOnce() + Send + 'static>,
}

impl QueuedAction {
    pub fn new<F>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            label: label.into(),
            is_last: false,
            delay: Duration::ZERO,
            run: Box::new(run),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn last(mut self) -> Self {
        self.is_last = true;
        self
    }
}

impl fmt::Debug for QueuedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedAction")
            .field("label", &self.label)
            .field("is_last", &self.is_last)
            .field("delay", &self.delay)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct ActionQueueConfig {
    /// Debounce window re-armed on every enqueue.
    pub window: Duration,
}

impl Default for ActionQueueConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(10),
        }
    }
}
