use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use controlsync_core_types::{CallType, ControlId};
use controlsync_event_bus::{EventBus, InMemoryBus};
use controlsync_page::Page;
use controlsync_registry::FunctionRegistry;
use controlsync_scheduler::{
    ActionQueue, ActionQueueConfig, PendingRequest, QueueConfig, QueuedAction, RequestDescriptor,
    RequestQueue, Transport, TransportReply,
};
use controlsync_state_center::{ChangeSet, ChangeTracker};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::builder::{RequestBuilder, UpdateParams};
use crate::command::{Command, CommandInterpreter};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::response::{ApplyReport, RegisterHook, ResponseEnvelope, ResponseProcessor};
use crate::window::Window;

/// Host collaborators the engine drives.
pub struct EngineParts {
    pub page: Arc<dyn Page>,
    pub window: Arc<dyn Window>,
    pub registry: Arc<FunctionRegistry>,
    pub transport: Arc<dyn Transport>,
}

struct Shared {
    page: Arc<dyn Page>,
    window: Arc<dyn Window>,
    registry: Arc<FunctionRegistry>,
    config: EngineConfig,
    tracker: ChangeTracker,
    blocked: AtomicBool,
    full_resync: AtomicBool,
    finals: Mutex<Vec<Command>>,
    bus: Arc<InMemoryBus<EngineEvent>>,
    register_hook: RwLock<Option<RegisterHook>>,
    requests: RequestQueue,
    actions: ActionQueue,
}

/// Client-side synchronization engine for one page.
///
/// Cloning is cheap; clones share the same state and queues.
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

impl SyncEngine {
    /// Creates the engine and starts its queue tasks. Must be called inside a
    /// tokio runtime.
    pub fn new(parts: EngineParts, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let requests = RequestQueue::start(
            parts.transport,
            QueueConfig {
                request_timeout: config.request_timeout(),
            },
        );
        let actions = ActionQueue::start(ActionQueueConfig {
            window: config.debounce(),
        });
        let shared = Arc::new(Shared {
            page: parts.page,
            window: parts.window,
            registry: parts.registry,
            bus: InMemoryBus::new(config.event_capacity),
            config,
            tracker: ChangeTracker::new(),
            blocked: AtomicBool::new(false),
            full_resync: AtomicBool::new(false),
            finals: Mutex::new(Vec::new()),
            register_hook: RwLock::new(None),
            requests,
            actions,
        });
        let weak: Weak<Shared> = Arc::downgrade(&shared);
        shared.requests.on_drained(Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.replay_finals();
            }
        }));
        Ok(Self { shared })
    }

    /// Resets state and registers every control already on the page.
    pub fn init(&self) -> Vec<ControlId> {
        self.reset();
        let registered = self.shared.processor().register_new_controls();
        info!(controls = registered.len(), "engine initialised");
        registered
    }

    /// Clears tracked changes, the block flag, pending final commands and
    /// any scheduled full resync.
    pub fn reset(&self) {
        self.shared.tracker.clear();
        self.shared.blocked.store(false, Ordering::SeqCst);
        self.shared.full_resync.store(false, Ordering::SeqCst);
        self.shared.finals.lock().clear();
    }

    pub fn on_register<F>(&self, hook: F)
    where
        F: Fn(&ControlId) + Send + Sync + 'static,
    {
        *self.shared.register_hook.write() = Some(Arc::new(hook));
    }

    pub fn mark_dirty(&self, id: impl Into<ControlId>) {
        self.shared.tracker.mark_dirty(id);
    }

    pub fn stage_value(&self, id: impl Into<ControlId>, key: impl Into<String>, value: Value) {
        self.shared.tracker.stage_value(id, key, value);
    }

    /// Interactive update. Refused while a blocking update is outstanding.
    pub fn request_synchronized_update(&self, params: UpdateParams) -> Result<(), EngineError> {
        if self.shared.blocked.load(Ordering::SeqCst) {
            debug!(control = %params.control_id, "update refused while blocked");
            return Err(EngineError::Blocked);
        }
        if params.block
            && self
                .shared
                .blocked
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Err(EngineError::Blocked);
        }
        let result = self.schedule(params.clone(), CallType::Interactive);
        if result.is_err() && params.block {
            self.shared.blocked.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Program-initiated update. Never refused and never sets the block flag.
    pub fn request_background_update(&self, mut params: UpdateParams) -> Result<(), EngineError> {
        params.block = false;
        self.schedule(params, CallType::Background)
    }

    /// Parses and applies a response body outside the request queue.
    pub fn apply_response(&self, body: &str) -> Result<ApplyReport, EngineError> {
        let envelope = ResponseEnvelope::parse(body)?;
        Ok(self.shared.apply(&envelope))
    }

    /// Resolves once both queues are idle and deferred work has run.
    pub async fn wait_idle(&self) {
        loop {
            self.shared.actions.wait_idle().await;
            self.shared.requests.wait_idle().await;
            let status = self.shared.requests.status();
            if self.shared.actions.outstanding() == 0
                && !status.is_running()
                && status.async_in_flight == 0
            {
                break;
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.bus.subscribe()
    }

    pub fn bus(&self) -> Arc<InMemoryBus<EngineEvent>> {
        Arc::clone(&self.shared.bus)
    }

    pub fn is_blocked(&self) -> bool {
        self.shared.blocked.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.requests.is_running()
    }

    pub fn full_resync_pending(&self) -> bool {
        self.shared.full_resync.load(Ordering::SeqCst)
    }

    pub fn pending_finals(&self) -> usize {
        self.shared.finals.lock().len()
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.shared.tracker
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn page(&self) -> Arc<dyn Page> {
        Arc::clone(&self.shared.page)
    }

    pub fn registry(&self) -> Arc<FunctionRegistry> {
        Arc::clone(&self.shared.registry)
    }

    fn schedule(&self, params: UpdateParams, call_type: CallType) -> Result<(), EngineError> {
        let label = format!("{call_type}:{}", params.control_id);
        let timing = params.timing;
        let builder = Arc::clone(&self.shared);
        let pending = PendingRequest::new(label.clone(), params.asynchronous, move || {
            Some(builder.build_request(params, call_type))
        });
        match timing {
            None => self.shared.requests.enqueue(pending)?,
            Some(timing) => {
                let shared = Arc::clone(&self.shared);
                let mut action = QueuedAction::new(label, move || {
                    if let Err(err) = shared.requests.enqueue(pending) {
                        warn!(error = %err, "queued update could not be submitted");
                    }
                })
                .with_delay(timing.delay);
                action.is_last = timing.is_last;
                self.shared.actions.enqueue(action);
            }
        }
        Ok(())
    }
}

impl Shared {
    fn processor(&self) -> ResponseProcessor<'_> {
        ResponseProcessor {
            page: self.page.as_ref(),
            window: self.window.as_ref(),
            config: &self.config,
            interpreter: CommandInterpreter::new(
                self.page.as_ref(),
                self.window.as_ref(),
                &self.registry,
            ),
            on_register: self.register_hook.read().clone(),
            bus: Some(self.bus.as_ref()),
        }
    }

    fn publish(&self, event: EngineEvent) {
        let _ = self.bus.publish(event);
    }

    /// Runs at dispatch time, so it sees every effect of earlier responses.
    fn build_request(self: &Arc<Self>, params: UpdateParams, call_type: CallType) -> RequestDescriptor {
        let changes = self.tracker.snapshot_and_clear();
        let full_resync =
            self.full_resync.swap(false, Ordering::SeqCst) || !self.config.change_events;
        let fields =
            RequestBuilder::new(self.page.as_ref()).build(&params, call_type, &changes, full_resync);
        let destination = if self.config.endpoint.is_empty() {
            self.page.form_action().unwrap_or_default()
        } else {
            self.config.endpoint.clone()
        };
        self.publish(EngineEvent::RequestDispatched {
            control: params.control_id.clone(),
            call_type,
            full_resync,
        });

        let block = params.block;
        let on_success = Arc::clone(self);
        let on_error = Arc::clone(self);
        let restore = changes.clone();
        RequestDescriptor {
            destination,
            fields,
            on_success: Box::new(move |reply: TransportReply| {
                on_success.handle_reply(reply, changes, block);
            }),
            on_error: Box::new(move |err| {
                on_error.handle_failure(EngineError::Transport(err), restore, block);
            }),
        }
    }

    fn handle_reply(&self, reply: TransportReply, changes: ChangeSet, block: bool) {
        match ResponseEnvelope::parse(&reply.body) {
            Ok(envelope) => {
                self.apply(&envelope);
                if block {
                    self.blocked.store(false, Ordering::SeqCst);
                }
            }
            Err(err) => self.handle_failure(err, changes, block),
        }
    }

    fn handle_failure(&self, err: EngineError, changes: ChangeSet, block: bool) {
        warn!(error = %err, "exchange failed; next request resyncs every control");
        self.window.show_error(&err.to_string());
        self.full_resync.store(true, Ordering::SeqCst);
        self.tracker.restore(changes);
        self.publish(EngineEvent::RequestFailed {
            error: err.to_string(),
        });
        if block {
            self.blocked.store(false, Ordering::SeqCst);
        }
    }

    fn apply(&self, envelope: &ResponseEnvelope) -> ApplyReport {
        let defer_finals = self.requests.is_running();
        let report = self.processor().apply(envelope, defer_finals);
        if !report.deferred.is_empty() {
            self.finals.lock().extend(report.deferred.iter().cloned());
        }
        self.publish(EngineEvent::ResponseApplied {
            patched: report.patched.len(),
            executed: report.executed,
            deferred: report.deferred.len(),
        });
        report
    }

    /// Drain hook: runs deferred final commands, newest first.
    fn replay_finals(&self) {
        let processor = self.processor();
        let mut report = ApplyReport::default();
        let mut replayed = 0;
        loop {
            let next = self.finals.lock().pop();
            let Some(command) = next else {
                break;
            };
            processor.run(&command, &mut report);
            replayed += 1;
        }
        if replayed > 0 {
            debug!(replayed, failures = report.failures.len(), "final commands replayed");
        }
        self.publish(EngineEvent::QueueDrained { finals: replayed });
    }
}
