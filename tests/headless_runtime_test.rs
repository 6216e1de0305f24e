use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value as JsonValue};
use tokio::time::{sleep, Duration};
use weave::{Browser, HeadlessBrowser, Logic, Runtime, RuntimeConfig, StrategyQueue, TreePatcher};

const SHELL: &str = "<!DOCTYPE html><html><body><div id=\"app\"></div></body></html>";

fn logic(value: JsonValue) -> Logic {
    serde_json::from_value(value).expect("valid logic")
}

#[tokio::test]
async fn intervals_deliver_through_the_strategy_queue() {
    let browser = Rc::new(HeadlessBrowser::new(SHELL));
    let queue = Rc::new(StrategyQueue::new());
    let mut runtime = Runtime::new(
        RuntimeConfig::new("app"),
        browser.clone(),
        queue.clone(),
        Box::new(TreePatcher),
    )
    .expect("runtime");

    let delivered = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&delivered);
    runtime
        .init_logic(
            &logic(json!({
                "intervals": [{"id": "poll", "duration": 100, "msg": "Poll", "queueStrategy": "latest"}]
            })),
            move |msg: JsonValue| sink.borrow_mut().push(msg),
        )
        .expect("init");

    sleep(Duration::from_millis(350)).await;
    let ticks = browser.pump();
    assert!(ticks >= 1, "expected the interval to tick, got {ticks}");

    // Ticks share one id, so the latest strategy collapses them.
    assert_eq!(queue.pending("pollPoll100"), 1);
    assert_eq!(queue.pump(), 1);
    assert_eq!(*delivered.borrow(), vec![json!("Poll")]);

    runtime.shutdown();
    assert!(!browser.has_active_timers());
}

#[tokio::test]
async fn drop_strategy_ignores_repeat_clicks_until_pumped() {
    let browser = Rc::new(HeadlessBrowser::new(SHELL));
    let queue = Rc::new(StrategyQueue::new());
    let mut runtime = Runtime::new(
        RuntimeConfig::new("app"),
        browser.clone(),
        queue.clone(),
        Box::new(TreePatcher),
    )
    .expect("runtime");

    runtime
        .update_dom(r#"<form><input id="name" value="ada"><button id="send">Send</button></form>"#)
        .expect("patch");

    let delivered = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&delivered);
    runtime
        .init_logic(
            &logic(json!({
                "eventListeners": [{
                    "id": "send",
                    "selector": "#send",
                    "event": {"type": "click", "config": {"preventDefault": true}},
                    "msg": {"tag": "Send", "name": "VALUE_FROM_ID:name"},
                    "queueStrategy": "drop"
                }]
            })),
            move |msg: JsonValue| sink.borrow_mut().push(msg),
        )
        .expect("init");

    let send = browser.element_by_id("send").expect("button rendered");
    for _ in 0..3 {
        let outcome = browser.document().dispatch(&send, "click");
        assert!(outcome.default_prevented);
    }
    assert_eq!(queue.pump(), 1);
    assert_eq!(*delivered.borrow(), vec![json!({"tag": "Send", "name": "ada"})]);
}
