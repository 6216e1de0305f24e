use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use kuchiki::{NodeRef, Selectors};
use tracing::warn;

mod document;
mod headless;

pub use document::Document;
pub use headless::HeadlessBrowser;

pub type NativeListener = Rc<dyn Fn(&NativeEvent)>;
pub type TimerCallback = Rc<dyn Fn()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u32);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub default_prevented: bool,
    pub propagation_stopped: bool,
}

/// A DOM event as seen by native listeners.
pub struct NativeEvent {
    event_type: String,
    target: NodeRef,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

impl NativeEvent {
    pub fn new(event_type: &str, target: NodeRef) -> Self {
        Self {
            event_type: event_type.to_string(),
            target,
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn target(&self) -> &NodeRef {
        &self.target
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    pub fn outcome(&self) -> DispatchOutcome {
        DispatchOutcome {
            default_prevented: self.default_prevented(),
            propagation_stopped: self.propagation_stopped(),
        }
    }
}

/// Host environment access used by the runtime. Document queries default to
/// the backing [`Document`]; implementations only differ in how they run
/// timers.
pub trait Browser {
    fn document(&self) -> &Document;

    /// Start a repeating timer. The callback runs on the host thread.
    fn start_interval(&self, period: Duration, callback: TimerCallback) -> TimerHandle;

    fn stop_interval(&self, handle: TimerHandle);

    fn element_by_id(&self, id: &str) -> Option<NodeRef> {
        self.document().element_by_id(id)
    }

    fn active_element(&self) -> Option<NodeRef> {
        self.document().active_element()
    }

    fn add_event_listener(
        &self,
        scope: &NodeRef,
        event_type: &str,
        capture: bool,
        listener: NativeListener,
    ) {
        self.document()
            .add_event_listener(scope, event_type, capture, listener);
    }

    /// Live value of an input-like element, read at call time.
    fn input_value(&self, element: &NodeRef) -> Option<String> {
        element_value(element)
    }

    fn matches(&self, element: &NodeRef, selector: &str) -> bool {
        compile_selector(selector).is_some_and(|selectors| matches_compiled(&selectors, element))
    }

    /// Nearest inclusive ancestor matching `selector`.
    fn closest(&self, element: &NodeRef, selector: &str) -> Option<NodeRef> {
        let selectors = compile_selector(selector)?;
        element
            .inclusive_ancestors()
            .find(|node| matches_compiled(&selectors, node))
    }
}

fn compile_selector(selector: &str) -> Option<Selectors> {
    match Selectors::compile(selector) {
        Ok(selectors) => Some(selectors),
        Err(()) => {
            warn!(target = "browser", %selector, "invalid selector");
            None
        }
    }
}

fn matches_compiled(selectors: &Selectors, node: &NodeRef) -> bool {
    node.clone()
        .into_element_ref()
        .is_some_and(|element| selectors.matches(&element))
}

pub fn element_value(element: &NodeRef) -> Option<String> {
    let data = element.as_element()?;
    let value = data.attributes.borrow().get("value").map(str::to_string);
    value
}

pub fn is_input(element: &NodeRef) -> bool {
    element
        .as_element()
        .is_some_and(|data| &*data.name.local == "input")
}

/// Short `tag#id.class` label for log records.
pub fn describe(node: &NodeRef) -> String {
    let Some(element) = node.as_element() else {
        return "#text".to_string();
    };
    let attributes = element.attributes.borrow();
    let mut label = element.name.local.to_string();
    if let Some(id) = attributes.get("id") {
        label.push('#');
        label.push_str(id);
    }
    if let Some(class) = attributes.get("class") {
        for name in class.split_whitespace() {
            label.push('.');
            label.push_str(name);
        }
    }
    label
}
