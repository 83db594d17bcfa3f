use std::sync::Arc;
use std::time::Duration;

use controlsync_codec::Decoded;
use controlsync_core_types::{ControlId, EventId};
use controlsync_engine::{
    ActionTiming, EngineConfig, EngineError, EngineEvent, EngineParts, RecordingWindow, SyncEngine,
    UpdateParams, WindowAction,
};
use controlsync_page::{InMemoryPage, Page};
use controlsync_registry::FunctionRegistry;
use controlsync_scheduler::{ScriptedTransport, TransportReply};
use parking_lot::Mutex;
use serde_json::{json, Value};

const PAGE: &str = r#"<!DOCTYPE html><html><body>
<form id="main" action="/app/sync">
  <input type="hidden" name="__formstate" value="v1">
  <div id="a_ctl"><input id="a" name="a" value="1"></div>
  <input id="b" name="b" value="2">
  <input id="c" name="c" value="3">
  <input id="flag" name="flag" type="checkbox">
</form>
</body></html>"#;

struct Harness {
    engine: SyncEngine,
    page: Arc<InMemoryPage>,
    window: Arc<RecordingWindow>,
    transport: Arc<ScriptedTransport>,
    registry: Arc<FunctionRegistry>,
}

fn harness_with(config: EngineConfig, latency: Duration) -> Harness {
    let page = Arc::new(InMemoryPage::parse(PAGE).unwrap());
    let window = Arc::new(RecordingWindow::new());
    let transport = Arc::new(ScriptedTransport::new().with_latency(latency));
    let registry = Arc::new(FunctionRegistry::new());
    let engine = SyncEngine::new(
        EngineParts {
            page: page.clone(),
            window: window.clone(),
            registry: registry.clone(),
            transport: transport.clone(),
        },
        config,
    )
    .unwrap();
    engine.init();
    Harness {
        engine,
        page,
        window,
        transport,
        registry,
    }
}

fn harness() -> Harness {
    harness_with(EngineConfig::default(), Duration::ZERO)
}

fn control_fields(fields: &[(String, String)]) -> Vec<&str> {
    fields
        .iter()
        .map(|(key, _)| key.as_str())
        .filter(|key| !key.starts_with("__"))
        .collect()
}

fn sync_blob(fields: &[(String, String)]) -> Value {
    let raw = &fields.iter().find(|(key, _)| key == "__sync").unwrap().1;
    serde_json::from_str(raw).unwrap()
}

#[tokio::test]
async fn two_dirty_controls_make_a_minimal_payload() {
    let h = harness();
    h.page.set_user_value("a", json!("10")).unwrap();
    h.page.set_user_value("c", json!("30")).unwrap();
    h.engine.mark_dirty("a");
    h.engine.mark_dirty("c");

    h.engine
        .request_synchronized_update(UpdateParams::new("c", EventId(7)))
        .unwrap();
    h.engine.wait_idle().await;

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination, "/app/sync");
    assert_eq!(control_fields(&sent[0].fields), vec!["a", "c"]);
    assert_eq!(sent[0].field("a"), Some("10"));
    assert_eq!(sent[0].field("__formid"), Some("main"));
    assert_eq!(sent[0].field("__formstate"), Some("v1"));
    assert_eq!(sync_blob(&sent[0].fields)["eventId"], json!(7));
    assert!(h.engine.tracker().is_empty());
}

#[tokio::test]
async fn after_an_error_the_next_request_resyncs_everything() {
    let h = harness();
    h.transport.push_reply(Ok(TransportReply {
        status: 500,
        body: "oops".into(),
    }));
    h.engine.mark_dirty("b");
    h.engine.stage_value("b", "page", json!(2));

    h.engine
        .request_synchronized_update(UpdateParams::new("b", EventId(1)))
        .unwrap();
    h.engine.wait_idle().await;
    assert!(h.engine.full_resync_pending());
    assert!(matches!(h.window.actions()[0], WindowAction::Error { .. }));

    h.engine
        .request_synchronized_update(UpdateParams::new("b", EventId(1)))
        .unwrap();
    h.engine.wait_idle().await;

    let sent = h.transport.sent();
    assert_eq!(control_fields(&sent[1].fields), vec!["a", "b", "c"]);
    let blob = sync_blob(&sent[1].fields);
    assert_eq!(blob["checkables"], json!({"flag": false}));
    assert_eq!(blob["values"], json!({"b": {"page": 2}}));
    assert!(!h.engine.full_resync_pending());

    h.engine
        .request_synchronized_update(UpdateParams::new("b", EventId(1)))
        .unwrap();
    h.engine.wait_idle().await;
    assert!(control_fields(&h.transport.sent()[2].fields).is_empty());
}

#[tokio::test]
async fn non_object_body_is_treated_as_a_failure() {
    let h = harness();
    h.transport.push_body("<html>login</html>");
    h.engine.mark_dirty("a");
    h.engine
        .request_synchronized_update(UpdateParams::new("a", EventId(1)).blocking())
        .unwrap();
    h.engine.wait_idle().await;

    assert!(h.engine.full_resync_pending());
    assert!(!h.engine.is_blocked());
    assert!(h.engine.tracker().is_dirty(&ControlId::new("a")));
}

#[tokio::test]
async fn final_command_waits_for_the_queued_request() {
    let h = harness_with(EngineConfig::default(), Duration::from_millis(5));
    h.transport.push_body(
        json!({
            "controls": {"a": {"html": "<div id=\"a_ctl\"><input id=\"a\" name=\"a\" value=\"fresh\"></div>"}},
            "commands": [{"final": true, "script": "mark()"}]
        })
        .to_string(),
    );
    h.transport
        .push_body(json!({"commands": [{"script": "second()"}]}).to_string());

    let mut events = h.engine.subscribe();

    h.engine
        .request_synchronized_update(UpdateParams::new("a", EventId(1)))
        .unwrap();
    h.engine
        .request_synchronized_update(UpdateParams::new("b", EventId(2)))
        .unwrap();
    h.engine.wait_idle().await;

    assert_eq!(h.page.value_of("a").as_deref(), Some("fresh"));
    assert_eq!(h.window.evaluated(), vec!["second()", "mark()"]);
    assert_eq!(h.engine.pending_finals(), 0);

    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::QueueDrained { finals } = event {
            drained.push(finals);
        }
    }
    assert_eq!(drained, vec![1]);
}

#[tokio::test]
async fn final_commands_replay_in_reverse_order() {
    let h = harness();
    h.transport.push_body(
        json!({"commands": [
            {"script": "first()", "final": true},
            {"script": "now()"},
            {"script": "second()", "final": true}
        ]})
        .to_string(),
    );
    h.engine
        .request_synchronized_update(UpdateParams::new("a", EventId(1)))
        .unwrap();
    h.engine.wait_idle().await;
    assert_eq!(h.window.evaluated(), vec!["now()", "second()", "first()"]);
}

#[tokio::test]
async fn controls_apply_before_any_command_runs() {
    let h = harness();
    let seen = Arc::new(Mutex::new(None));
    let page = h.page.clone();
    let sink = Arc::clone(&seen);
    h.registry.register("readB", move |_, _| {
        *sink.lock() = page.value_of("b");
        Ok(Decoded::Undefined)
    });
    h.transport.push_body(
        r#"{"commands": [{"func": "readB"}], "controls": {"b": {"value": "patched"}}}"#,
    );

    h.engine
        .request_synchronized_update(UpdateParams::new("b", EventId(1)))
        .unwrap();
    h.engine.wait_idle().await;
    assert_eq!(seen.lock().as_deref(), Some("patched"));
}

#[tokio::test]
async fn failing_commands_do_not_block_siblings_or_finals() {
    let h = harness();
    h.window.fail_scripts_containing("bad");
    h.transport.push_body(
        json!({"commands": [
            {"script": "bad()"},
            {"func": "missing.fn"},
            {"script": "good()"},
            {"script": "bad_final()", "final": true},
            {"script": "good_final()", "final": true}
        ]})
        .to_string(),
    );
    let mut events = h.engine.subscribe();
    h.engine
        .request_synchronized_update(UpdateParams::new("a", EventId(1)))
        .unwrap();
    h.engine.wait_idle().await;

    assert_eq!(
        h.window.evaluated(),
        vec!["bad()", "good()", "good_final()", "bad_final()"]
    );
    let mut failures = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::CommandFailed { .. }) {
            failures += 1;
        }
    }
    assert_eq!(failures, 3);
}

#[tokio::test]
async fn blocking_update_refuses_interactive_but_not_background() {
    let h = harness_with(EngineConfig::default(), Duration::from_millis(10));
    h.engine
        .request_synchronized_update(UpdateParams::new("a", EventId(1)).blocking())
        .unwrap();
    assert!(h.engine.is_blocked());

    let refused = h
        .engine
        .request_synchronized_update(UpdateParams::new("b", EventId(2)));
    assert!(matches!(refused, Err(EngineError::Blocked)));
    h.engine
        .request_background_update(UpdateParams::new("c", EventId(3)).blocking())
        .unwrap();

    h.engine.wait_idle().await;
    assert!(!h.engine.is_blocked());
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sync_blob(&sent[1].fields)["callType"], json!("background"));
}

#[tokio::test]
async fn new_controls_are_registered_once() {
    let h = harness();
    let registered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&registered);
    h.engine.on_register(move |id| sink.lock().push(id.to_string()));

    let body = json!({"controls": {"extra": {"html": "<input id=\"extra\" name=\"extra\">"}}}).to_string();
    h.transport.push_body(body.clone());
    h.transport.push_body(json!({"controls": {"extra": {"value": "x"}}}).to_string());
    h.engine
        .request_synchronized_update(UpdateParams::new("a", EventId(1)))
        .unwrap();
    h.engine
        .request_synchronized_update(UpdateParams::new("a", EventId(1)))
        .unwrap();
    h.engine.wait_idle().await;

    assert_eq!(*registered.lock(), vec!["extra"]);
    assert!(h.page.is_registered("extra"));
    assert_eq!(h.page.value_of("extra").as_deref(), Some("x"));
}

#[tokio::test]
async fn replaced_controls_are_registered_again() {
    let h = harness();
    let registered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&registered);
    h.engine.on_register(move |id| sink.lock().push(id.to_string()));

    h.transport.push_body(
        json!({"controls": {"a": {"html": "<div id=\"a_ctl\"><input id=\"a\" name=\"a\" value=\"fresh\"></div>"}}})
            .to_string(),
    );
    h.engine
        .request_synchronized_update(UpdateParams::new("a", EventId(1)))
        .unwrap();
    h.engine.wait_idle().await;

    assert_eq!(*registered.lock(), vec!["a"]);
    assert!(h.page.is_registered("a"));
    assert!(h.page.is_registered("b"));
    assert_eq!(h.page.value_of("a").as_deref(), Some("fresh"));
}

#[tokio::test]
async fn deferred_phase_runs_window_instructions_in_order() {
    let h = harness();
    h.transport.push_body(
        json!({
            "loc": "reload",
            "winclose": true,
            "profileHtml": "<pre>3ms</pre>",
            "watcher": true,
            "alert": ["saved"],
            "js": ["/extra.js"]
        })
        .to_string(),
    );
    h.engine
        .request_synchronized_update(UpdateParams::new("a", EventId(1)))
        .unwrap();
    h.engine.wait_idle().await;

    assert_eq!(
        h.window.actions(),
        vec![
            WindowAction::Script { src: "/extra.js".into() },
            WindowAction::Alert { message: "saved".into() },
            WindowAction::Close,
            WindowAction::Reload,
            WindowAction::Profile { html: "<pre>3ms</pre>".into() },
            WindowAction::Watcher,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn timed_updates_go_through_the_debouncer() {
    let h = harness();
    h.engine.mark_dirty("a");
    h.engine
        .request_synchronized_update(UpdateParams::new("a", EventId(1)).with_timing(ActionTiming {
            is_last: false,
            delay: Duration::from_millis(30),
        }))
        .unwrap();
    h.engine
        .request_synchronized_update(UpdateParams::new("b", EventId(2)).with_timing(ActionTiming {
            is_last: true,
            delay: Duration::ZERO,
        }))
        .unwrap();
    assert!(h.transport.sent().is_empty());
    h.engine.wait_idle().await;

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sync_blob(&sent[0].fields)["controlId"], json!("a"));
    assert_eq!(sync_blob(&sent[1].fields)["controlId"], json!("b"));
}

#[tokio::test]
async fn unreliable_change_events_always_resync() {
    let config = EngineConfig {
        change_events: false,
        endpoint: "/override".into(),
        ..EngineConfig::default()
    };
    let h = harness_with(config, Duration::ZERO);
    h.engine
        .request_background_update(UpdateParams::new("a", EventId(1)))
        .unwrap();
    h.engine.wait_idle().await;
    let sent = h.transport.sent();
    assert_eq!(sent[0].destination, "/override");
    assert_eq!(control_fields(&sent[0].fields), vec!["a", "b", "c"]);
}
