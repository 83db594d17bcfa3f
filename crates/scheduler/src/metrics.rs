//! Process-wide request counters.
//!
//! Labels follow `<call type>:<control>`; tallies per call type are keyed by
//! the part before the first `:` (the whole label when there is none).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::TransportError;

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    asynchronous: AtomicU64,
    declined: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
    drains: AtomicU64,
    by_call_type: Mutex<BTreeMap<String, CallTypeCounts>>,
}

/// Exchanges attributed to one call type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CallTypeCounts {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn call_type(label: &str) -> &str {
    label.split_once(':').map_or(label, |(kind, _)| kind)
}

fn tally(label: &str, bump: impl FnOnce(&mut CallTypeCounts)) {
    let mut by_call_type = COUNTERS.by_call_type.lock();
    bump(by_call_type.entry(call_type(label).to_string()).or_default());
}

/// Asynchronous requests bypass the FIFO and are counted separately as well.
pub fn record_enqueued(label: &str, asynchronous: bool) {
    increment(&COUNTERS.enqueued);
    if asynchronous {
        increment(&COUNTERS.asynchronous);
    }
    tally(label, |counts| counts.enqueued += 1);
}

/// Builder returned nothing, so no exchange happened.
pub fn record_declined(_label: &str) {
    increment(&COUNTERS.declined);
}

pub fn record_started(_label: &str) {
    increment(&COUNTERS.started);
}

pub fn record_completed(label: &str) {
    increment(&COUNTERS.completed);
    tally(label, |counts| counts.completed += 1);
}

pub fn record_failed(label: &str, error: &TransportError) {
    increment(&COUNTERS.failed);
    match error {
        TransportError::Timeout(_) => increment(&COUNTERS.timed_out),
        TransportError::Status { .. } => increment(&COUNTERS.rejected),
        _ => {}
    }
    tally(label, |counts| counts.failed += 1);
}

pub fn record_drained() {
    increment(&COUNTERS.drains);
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SchedulerMetricsSnapshot {
    pub enqueued: u64,
    pub asynchronous: u64,
    pub declined: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    /// Failures caused by the request timeout.
    pub timed_out: u64,
    /// Failures caused by a non-success status.
    pub rejected: u64,
    pub drains: u64,
    pub by_call_type: BTreeMap<String, CallTypeCounts>,
}

impl SchedulerMetricsSnapshot {
    pub fn call_type(&self, kind: &str) -> CallTypeCounts {
        self.by_call_type.get(kind).copied().unwrap_or_default()
    }
}

pub fn snapshot() -> SchedulerMetricsSnapshot {
    SchedulerMetricsSnapshot {
        enqueued: COUNTERS.enqueued.load(Ordering::Relaxed),
        asynchronous: COUNTERS.asynchronous.load(Ordering::Relaxed),
        declined: COUNTERS.declined.load(Ordering::Relaxed),
        started: COUNTERS.started.load(Ordering::Relaxed),
        completed: COUNTERS.completed.load(Ordering::Relaxed),
        failed: COUNTERS.failed.load(Ordering::Relaxed),
        timed_out: COUNTERS.timed_out.load(Ordering::Relaxed),
        rejected: COUNTERS.rejected.load(Ordering::Relaxed),
        drains: COUNTERS.drains.load(Ordering::Relaxed),
        by_call_type: COUNTERS.by_call_type.lock().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn call_type_is_the_label_prefix() {
        assert_eq!(call_type("interactive:qty"), "interactive");
        assert_eq!(call_type("background:a:b"), "background");
        assert_eq!(call_type("resync"), "resync");
    }

    // Counters are process-wide, so assertions use a call type no other test emits.
    #[test]
    fn failures_are_classified_and_tallied_per_call_type() {
        let before = snapshot();

        record_enqueued("metrics-test:a", false);
        record_enqueued("metrics-test:b", true);
        record_completed("metrics-test:a");
        record_failed("metrics-test:b", &TransportError::Timeout(Duration::from_millis(5)));
        record_failed(
            "metrics-test:b",
            &TransportError::Status {
                status: 500,
                body: String::new(),
            },
        );
        record_failed("metrics-test:b", &TransportError::Network("reset".into()));

        let after = snapshot();
        assert_eq!(
            after.call_type("metrics-test"),
            CallTypeCounts {
                enqueued: 2,
                completed: 1,
                failed: 3,
            }
        );
        assert!(after.asynchronous > before.asynchronous);
        assert!(after.timed_out > before.timed_out);
        assert!(after.rejected > before.rejected);
        assert!(after.failed >= before.failed + 3);
        assert_eq!(after.call_type("never-used"), CallTypeCounts::default());
    }
}
