use std::sync::Arc;
use std::time::Duration;

use controlsync_scheduler::{ActionQueue, ActionQueueConfig, QueuedAction};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn push(log: &Log, label: &'static str) -> impl FnOnce() + Send + 'static {
    let log = Arc::clone(log);
    move || log.lock().push(label)
}

#[tokio::test(start_paused = true)]
async fn debounce_window_rearms_on_enqueue() {
    let queue = ActionQueue::start(ActionQueueConfig::default());
    let log: Log = Arc::default();

    queue.enqueue(QueuedAction::new("a", push(&log, "a")));
    tokio::time::sleep(Duration::from_millis(6)).await;
    queue.enqueue(QueuedAction::new("b", push(&log, "b")));
    tokio::time::sleep(Duration::from_millis(6)).await;
    assert!(log.lock().is_empty(), "window was re-armed by the second enqueue");

    tokio::time::sleep(Duration::from_millis(6)).await;
    assert_eq!(*log.lock(), vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn last_action_runs_after_delayed_ones() {
    let queue = ActionQueue::start(ActionQueueConfig::default());
    let log: Log = Arc::default();

    queue.enqueue(QueuedAction::new("slow", push(&log, "slow")).with_delay(Duration::from_millis(50)));
    queue.enqueue(QueuedAction::new("fast", push(&log, "fast")));
    queue.enqueue(QueuedAction::new("last", push(&log, "last")).last());
    queue.wait_idle().await;

    assert_eq!(*log.lock(), vec!["fast", "slow", "last"]);
}

#[tokio::test(start_paused = true)]
async fn zero_delay_actions_keep_enqueue_order() {
    let queue = ActionQueue::start(ActionQueueConfig {
        window: Duration::from_millis(1),
    });
    let log: Log = Arc::default();
    for label in ["1", "2", "3", "4"] {
        queue.enqueue(QueuedAction::new(label, push(&log, label)));
    }
    assert_eq!(queue.pending(), 4);
    queue.wait_idle().await;
    assert_eq!(*log.lock(), vec!["1", "2", "3", "4"]);
}
