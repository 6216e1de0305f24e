use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde_json::{json, Value as JsonValue};
use weave::testing::{FakeBrowser, RecordingQueue, Submission, TimerEvent};
use weave::{Browser, Logic, QueueStrategy, Runtime, RuntimeConfig, RuntimeError, TreePatcher};

const HTML: &str = r#"
    <!DOCTYPE html>
    <html>
        <body>
            <div id="app">
                <button id="btn">Go</button>
                <button class="save" id="save"><span id="save-label">Save</span></button>
                <p id="unrelated">text</p>
                <input id="username" value="abc">
            </div>
            <button id="outside">Outside</button>
        </body>
    </html>
"#;

struct Harness {
    browser: Rc<FakeBrowser>,
    queue: Rc<RecordingQueue>,
    runtime: Runtime,
    delivered: Rc<RefCell<Vec<JsonValue>>>,
}

impl Harness {
    fn new() -> Self {
        let browser = Rc::new(FakeBrowser::from_html(HTML));
        let queue = Rc::new(RecordingQueue::new());
        let runtime = Runtime::new(
            RuntimeConfig::new("app").with_debug(true),
            browser.clone(),
            queue.clone(),
            Box::new(TreePatcher),
        )
        .expect("mount element exists");
        Self {
            browser,
            queue,
            runtime,
            delivered: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn init(&mut self, logic: JsonValue) {
        let sink = Rc::clone(&self.delivered);
        self.runtime
            .init_logic(&parse(logic), move |msg: JsonValue| sink.borrow_mut().push(msg))
            .expect("init logic");
    }

    fn delivered(&self) -> Vec<JsonValue> {
        self.delivered.borrow().clone()
    }
}

fn parse(logic: JsonValue) -> Logic {
    serde_json::from_value(logic).expect("valid logic")
}

fn click(id: &str, selector: &str, msg: JsonValue) -> JsonValue {
    json!({
        "id": id,
        "selector": selector,
        "event": {"type": "click", "config": {}},
        "msg": msg,
        "queueStrategy": "fifo"
    })
}

fn ticker(id: &str, msg: &str, duration: u64) -> JsonValue {
    json!({"id": id, "duration": duration, "msg": msg, "queueStrategy": "latest"})
}

#[test]
fn missing_mount_element_fails_construction() {
    let browser = Rc::new(FakeBrowser::from_html(HTML));
    let result = Runtime::new(
        RuntimeConfig::new("nope"),
        browser,
        Rc::new(RecordingQueue::new()),
        Box::new(TreePatcher),
    );
    assert!(matches!(result, Err(RuntimeError::MountNotFound(id)) if id == "nope"));
}

#[test]
fn click_reaches_the_queue_with_suppressed_default() {
    let mut harness = Harness::new();
    harness.init(json!({
        "eventListeners": [{
            "id": "a",
            "selector": "#btn",
            "event": {"type": "click", "config": {"preventDefault": true}},
            "msg": "Clicked",
            "queueStrategy": "drop"
        }],
        "intervals": []
    }));

    let outcome = harness.browser.fire("btn", "click").expect("button exists");
    assert!(outcome.default_prevented);
    assert_eq!(
        harness.queue.submissions(),
        vec![Submission {
            id: "#btn".into(),
            strategy: QueueStrategy::Drop
        }]
    );
    assert_eq!(harness.delivered(), vec![json!("Clicked")]);
}

#[test]
fn one_native_listener_per_event_type() {
    let mut harness = Harness::new();
    harness.init(json!({
        "eventListeners": [
            click("a", "#btn", json!("A")),
            click("b", "#save", json!("B")),
            {"id": "c", "selector": "#username", "event": {"type": "input"}, "msg": "C", "queueStrategy": "latest"}
        ]
    }));

    let document = harness.browser.document();
    assert_eq!(document.listener_count("click"), 1);
    assert_eq!(document.listener_count("input"), 1);
    assert_eq!(harness.runtime.registered_types(), ["click", "input"]);
}

#[test]
fn unmatched_targets_and_unknown_types_are_silent() {
    let mut harness = Harness::new();
    harness.init(json!({"eventListeners": [click("a", "button.save", json!("Save"))]}));

    harness.browser.fire("unrelated", "click");
    harness.browser.fire("btn", "keydown");
    harness.browser.fire("outside", "click");
    assert!(harness.queue.submissions().is_empty());

    harness.browser.fire("save", "click");
    assert_eq!(harness.queue.submissions().len(), 1);
}

#[test]
fn update_replaces_listener_set() {
    let mut harness = Harness::new();
    harness.init(json!({
        "eventListeners": [
            click("shared", "#btn", json!("Old")),
            click("gone", "#save", json!("Gone"))
        ]
    }));

    let changes = harness
        .runtime
        .update_logic(&parse(json!({
            "eventListeners": [
                click("shared", "#btn", json!("New")),
                click("fresh", "#unrelated", json!("Fresh"))
            ]
        })))
        .expect("update");
    assert_eq!(changes.removed, vec!["gone".to_string()]);
    assert_eq!(changes.replaced, vec!["shared".to_string()]);
    assert_eq!(changes.added, vec!["fresh".to_string()]);

    harness.browser.fire("btn", "click");
    harness.browser.fire("save", "click");
    harness.browser.fire("unrelated", "click");
    assert_eq!(harness.delivered(), vec![json!("New"), json!("Fresh")]);
}

#[test]
fn update_before_init_is_rejected() {
    let mut harness = Harness::new();
    let result = harness.runtime.update_logic(&Logic::default());
    assert!(matches!(result, Err(RuntimeError::NotInitialized)));
}

#[test]
fn second_init_is_rejected() {
    let mut harness = Harness::new();
    harness.init(json!({}));
    let result = harness.runtime.init_logic(&Logic::default(), |_: JsonValue| {});
    assert!(matches!(result, Err(RuntimeError::AlreadyInitialized)));
}

#[test]
fn event_types_added_later_have_no_native_listener() {
    let mut harness = Harness::new();
    harness.init(json!({"eventListeners": [click("a", "#btn", json!("A"))]}));
    harness
        .runtime
        .update_logic(&parse(json!({
            "eventListeners": [
                click("a", "#btn", json!("A")),
                {"id": "k", "selector": "#username", "event": {"type": "keydown"}, "msg": "K", "queueStrategy": "fifo"}
            ]
        })))
        .expect("update");

    harness.browser.fire("username", "keydown");
    assert!(harness.queue.submissions().is_empty());
    assert_eq!(harness.runtime.handlers().handlers_for("keydown").len(), 1);
}

#[test]
fn parent_matching_fires_for_descendants() {
    let mut harness = Harness::new();
    harness.init(json!({
        "eventListeners": [{
            "id": "save",
            "selector": "button.save",
            "event": {"type": "click", "config": {"matchParentElements": true}},
            "msg": "Save",
            "queueStrategy": "fifo"
        }]
    }));

    harness.browser.fire("save-label", "click");
    assert_eq!(
        harness.queue.submissions(),
        vec![Submission {
            id: "button.save".into(),
            strategy: QueueStrategy::Fifo
        }]
    );
}

#[test]
fn placeholders_read_the_value_at_dispatch_time() {
    let mut harness = Harness::new();
    harness.init(json!({
        "eventListeners": [click("login", "#btn", json!({"name": "VALUE_FROM_ID:username", "missing": "VALUE_FROM_ID:ghost"}))]
    }));

    harness.browser.set_value("username", "typed later");
    harness.browser.fire("btn", "click");
    assert_eq!(
        harness.delivered(),
        vec![json!({"name": "typed later", "missing": ""})]
    );
}

#[test]
fn intervals_below_minimum_never_start() {
    let mut harness = Harness::new();
    harness.init(json!({
        "intervals": [ticker("fast", "Tick", 50), ticker("ok", "Tick", 100)]
    }));

    let timers = harness.browser.live_timers();
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0].1, Duration::from_millis(100));
    assert_eq!(harness.runtime.intervals().len(), 1);
}

#[test]
fn unchanged_interval_keeps_running() {
    let mut harness = Harness::new();
    harness.init(json!({"intervals": [ticker("x", "Tick", 1000)]}));
    let handle = harness.runtime.intervals()[0].handle;
    harness.browser.clear_timer_log();

    harness
        .runtime
        .update_logic(&parse(json!({"intervals": [ticker("x", "Tick", 1000)]})))
        .expect("update");

    assert!(harness.browser.timer_log().is_empty());
    assert_eq!(harness.runtime.intervals()[0].handle, handle);
}

#[test]
fn changed_duration_restarts_interval() {
    let mut harness = Harness::new();
    harness.init(json!({"intervals": [ticker("x", "Tick", 1000)]}));
    let old = harness.runtime.intervals()[0].handle;
    harness.browser.clear_timer_log();

    harness
        .runtime
        .update_logic(&parse(json!({"intervals": [ticker("x", "Tick", 2000)]})))
        .expect("update");

    let new = harness.runtime.intervals()[0].handle;
    assert_eq!(
        harness.browser.timer_log(),
        vec![
            TimerEvent::Stopped(old),
            TimerEvent::Started(new, Duration::from_millis(2000))
        ]
    );
}

#[test]
fn interval_ticks_are_queued_under_the_interval_key() {
    let mut harness = Harness::new();
    harness.init(json!({"intervals": [ticker("x", "Tick", 1000)]}));

    assert_eq!(harness.browser.tick_all(), 1);
    assert_eq!(
        harness.queue.submissions(),
        vec![Submission {
            id: "xTick1000".into(),
            strategy: QueueStrategy::Latest
        }]
    );
    assert_eq!(harness.delivered(), vec![json!("Tick")]);
}

#[test]
fn shutdown_stops_everything() {
    let mut harness = Harness::new();
    harness.init(json!({
        "eventListeners": [click("a", "#btn", json!("A"))],
        "intervals": [ticker("x", "Tick", 1000), ticker("y", "Poll", 500)]
    }));

    harness.runtime.shutdown();
    assert!(harness.browser.live_timers().is_empty());
    assert!(harness.runtime.intervals().is_empty());

    harness.browser.fire("btn", "click");
    assert!(harness.queue.submissions().is_empty());
}
