use std::sync::Arc;
use std::time::Duration;

use controlsync_core_types::RequestId;
use controlsync_event_bus::{EventBus, InMemoryBus};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::error::{SchedulerError, TransportError};
use crate::metrics;
use crate::model::{OutboundRequest, PendingRequest, QueueConfig, QueueEvent, QueueStatus};
use crate::transport::Transport;

pub type DrainHook = Arc<dyn Fn() + Send + Sync + 'static>;

struct QueueInner {
    transport: Arc<dyn Transport>,
    status: Mutex<QueueStatus>,
    drain_hooks: Mutex<Vec<DrainHook>>,
    idle: watch::Sender<bool>,
    async_active: watch::Sender<usize>,
    timeout: Duration,
    bus: Option<Arc<InMemoryBus<QueueEvent>>>,
}

/// FIFO of pending requests with at most one synchronous exchange in flight.
///
/// A worker task owns the receiving end and awaits each exchange, callbacks
/// included, before taking the next entry. Asynchronous requests skip the
/// FIFO and run on their own task.
pub struct RequestQueue {
    inner: Arc<QueueInner>,
    tx: mpsc::UnboundedSender<PendingRequest>,
}

impl RequestQueue {
    /// Starts the worker. Must be called inside a tokio runtime.
    pub fn start(transport: Arc<dyn Transport>, config: QueueConfig) -> Self {
        Self::start_with_bus(transport, config, None)
    }

    pub fn start_with_bus(
        transport: Arc<dyn Transport>,
        config: QueueConfig,
        bus: Option<Arc<InMemoryBus<QueueEvent>>>,
    ) -> Self {
        let (idle, _) = watch::channel(true);
        let (async_active, _) = watch::channel(0usize);
        let inner = Arc::new(QueueInner {
            transport,
            status: Mutex::new(QueueStatus::default()),
            drain_hooks: Mutex::new(Vec::new()),
            idle,
            async_active,
            timeout: config.request_timeout,
            bus,
        });
        let (tx, mut rx) = mpsc::unbounded_channel::<PendingRequest>();
        let worker = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(pending) = rx.recv().await {
                {
                    let mut status = worker.status.lock();
                    status.queued = status.queued.saturating_sub(1);
                    status.in_flight = true;
                }
                worker.exchange(pending).await;
                let drained = {
                    let mut status = worker.status.lock();
                    status.in_flight = false;
                    status.queued == 0
                };
                if drained {
                    worker.drained();
                }
            }
            trace!("request queue worker stopped");
        });
        Self { inner, tx }
    }

    pub fn enqueue(&self, pending: PendingRequest) -> Result<(), SchedulerError> {
        metrics::record_enqueued(&pending.label, pending.asynchronous);
        if pending.asynchronous {
            self.dispatch_async(pending);
            return Ok(());
        }
        {
            let mut status = self.inner.status.lock();
            status.queued += 1;
            self.inner.idle.send_replace(false);
        }
        trace!(label = %pending.label, "request queued");
        self.tx.send(pending).map_err(|err| {
            let mut status = self.inner.status.lock();
            status.queued = status.queued.saturating_sub(1);
            warn!(label = %err.0.label, "request queue is closed");
            SchedulerError::Closed
        })
    }

    fn dispatch_async(&self, pending: PendingRequest) {
        let inner = Arc::clone(&self.inner);
        self.inner.status.lock().async_in_flight += 1;
        self.inner.async_active.send_modify(|count| *count += 1);
        tokio::spawn(async move {
            inner.exchange(pending).await;
            inner.status.lock().async_in_flight -= 1;
            inner.async_active.send_modify(|count| *count -= 1);
        });
    }

    /// A synchronous request is in flight or waiting.
    pub fn is_running(&self) -> bool {
        self.inner.status.lock().is_running()
    }

    pub fn status(&self) -> QueueStatus {
        *self.inner.status.lock()
    }

    /// Registers a hook run by the worker each time the queue drains.
    pub fn on_drained(&self, hook: DrainHook) {
        self.inner.drain_hooks.lock().push(hook);
    }

    /// Resolves once no synchronous request is queued or in flight and the
    /// drain hooks have run.
    pub async fn wait_drained(&self) {
        let mut rx = self.inner.idle.subscribe();
        let _ = rx.wait_for(|idle| *idle).await;
    }

    /// Like [`wait_drained`](Self::wait_drained), also waiting for asynchronous exchanges.
    pub async fn wait_idle(&self) {
        let mut active = self.inner.async_active.subscribe();
        let _ = active.wait_for(|count| *count == 0).await;
        self.wait_drained().await;
    }
}

impl QueueInner {
    async fn exchange(&self, pending: PendingRequest) {
        let label = pending.label;
        let asynchronous = pending.asynchronous;
        let Some(descriptor) = (pending.build)() else {
            debug!(%label, "request builder declined");
            metrics::record_declined(&label);
            return;
        };
        let request = OutboundRequest {
            id: RequestId::new(),
            destination: descriptor.destination,
            fields: descriptor.fields,
        };
        let request_id = request.id.clone();
        metrics::record_started(&label);
        self.publish(QueueEvent::Dispatched {
            request: request_id.clone(),
            destination: request.destination.clone(),
            asynchronous,
        });
        info!(
            target: "scheduler",
            request = %request_id,
            %label,
            asynchronous,
            fields = request.fields.len(),
            "dispatching request"
        );

        let outcome = match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(Ok(reply)) if reply.is_success() => Ok(reply),
            Ok(Ok(reply)) => Err(TransportError::Status {
                status: reply.status,
                body: reply.body,
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(reply) => {
                metrics::record_completed(&label);
                self.publish(QueueEvent::Completed {
                    request: request_id,
                    status: reply.status,
                });
                (descriptor.on_success)(reply);
            }
            Err(err) => {
                metrics::record_failed(&label, &err);
                warn!(target: "scheduler", request = %request_id, %label, error = %err, "request failed");
                self.publish(QueueEvent::Failed {
                    request: request_id,
                    error: err.to_string(),
                });
                (descriptor.on_error)(err);
            }
        }
    }

    fn drained(&self) {
        let hooks = self.drain_hooks.lock().clone();
        trace!(hooks = hooks.len(), "request queue drained");
        metrics::record_drained();
        for hook in hooks {
            hook();
        }
        self.publish(QueueEvent::Drained);
        // Another request may have arrived while the hooks ran.
        let status = self.status.lock();
        if !status.is_running() {
            self.idle.send_replace(true);
        }
    }

    fn publish(&self, event: QueueEvent) {
        if let Some(bus) = &self.bus {
            let _ = bus.publish(event);
        }
    }
}
