use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::trace;

use crate::model::{ActionQueueConfig, QueuedAction};

struct ActionInner {
    pending: Mutex<Vec<QueuedAction>>,
    notify: Notify,
    window: Duration,
    outstanding: watch::Sender<usize>,
}

/// Debouncer that coalesces near-simultaneous callbacks.
///
/// Every enqueue re-arms one timer. When it fires the whole queue drains in
/// enqueue order: zero-delay actions run inline, the rest on their own timer.
pub struct ActionQueue {
    inner: Arc<ActionInner>,
    task: JoinHandle<()>,
}

impl ActionQueue {
    /// Starts the debounce task. Must be called inside a tokio runtime.
    pub fn start(config: ActionQueueConfig) -> Self {
        let (outstanding, _) = watch::channel(0usize);
        let inner = Arc::new(ActionInner {
            pending: Mutex::new(Vec::new()),
            notify: Notify::new(),
            window: config.window,
            outstanding,
        });
        let task = tokio::spawn(run_debouncer(Arc::clone(&inner)));
        Self { inner, task }
    }

    pub fn enqueue(&self, mut action: QueuedAction) {
        {
            let mut pending = self.inner.pending.lock();
            if action.is_last {
                let longest = pending
                    .iter()
                    .map(|queued| queued.delay)
                    .max()
                    .unwrap_or(Duration::ZERO);
                action.delay = longest + Duration::from_millis(1);
            }
            trace!(label = %action.label, delay_ms = action.delay.as_millis() as u64, "action queued");
            pending.push(action);
        }
        self.inner.outstanding.send_modify(|count| *count += 1);
        self.inner.notify.notify_one();
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Actions enqueued but not yet run, delayed ones included.
    pub fn outstanding(&self) -> usize {
        *self.inner.outstanding.borrow()
    }

    /// Resolves once every queued action, delayed ones included, has run.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Drop for ActionQueue {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_debouncer(inner: Arc<ActionInner>) {
    loop {
        inner.notify.notified().await;
        loop {
            tokio::select! {
                _ = inner.notify.notified() => continue,
                _ = sleep(inner.window) => break,
            }
        }
        let batch = std::mem::take(&mut *inner.pending.lock());
        if batch.is_empty() {
            continue;
        }
        trace!(actions = batch.len(), "draining action queue");
        for action in batch {
            if action.delay.is_zero() {
                (action.run)();
                inner.outstanding.send_modify(|count| *count -= 1);
            } else {
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    sleep(action.delay).await;
                    (action.run)();
                    inner.outstanding.send_modify(|count| *count -= 1);
                });
            }
        }
    }
}
