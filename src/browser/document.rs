use std::cell::RefCell;

use kuchiki::traits::*;
use kuchiki::{parse_html, NodeRef};

use super::{DispatchOutcome, NativeEvent, NativeListener};

struct ListenerEntry {
    scope: NodeRef,
    event_type: String,
    capture: bool,
    listener: NativeListener,
}

/// In-memory document tree with focus tracking and a native listener
/// registry.
pub struct Document {
    root: NodeRef,
    focused: RefCell<Option<NodeRef>>,
    listeners: RefCell<Vec<ListenerEntry>>,
}

impl Document {
    pub fn from_html(html: &str) -> Self {
        Self {
            root: parse_html().one(html),
            focused: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeRef> {
        self.root.descendants().find(|node| {
            node.as_element()
                .is_some_and(|element| element.attributes.borrow().get("id") == Some(id))
        })
    }

    pub fn active_element(&self) -> Option<NodeRef> {
        self.focused.borrow().clone()
    }

    pub fn focus(&self, element: Option<NodeRef>) {
        *self.focused.borrow_mut() = element;
    }

    pub fn set_value(&self, element: &NodeRef, value: &str) {
        if let Some(data) = element.as_element() {
            data.attributes.borrow_mut().insert("value", value.to_string());
        }
    }

    pub fn to_html(&self) -> String {
        self.root.to_string()
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|entry| entry.event_type == event_type)
            .count()
    }

    pub fn add_event_listener(
        &self,
        scope: &NodeRef,
        event_type: &str,
        capture: bool,
        listener: NativeListener,
    ) {
        self.listeners.borrow_mut().push(ListenerEntry {
            scope: scope.clone(),
            event_type: event_type.to_string(),
            capture,
            listener,
        });
    }

    /// Fire `event_type` at `target`. Capture listeners run from the
    /// outermost scope inwards, then bubble listeners from the target
    /// outwards. Stopping propagation finishes the current scope only.
    pub fn dispatch(&self, target: &NodeRef, event_type: &str) -> DispatchOutcome {
        let event = NativeEvent::new(event_type, target.clone());
        let path: Vec<NodeRef> = target.inclusive_ancestors().collect();

        let capture_order = path.iter().rev().map(|node| (node, true));
        let bubble_order = path.iter().map(|node| (node, false));

        for (node, capture) in capture_order.chain(bubble_order) {
            let listeners: Vec<NativeListener> = self
                .listeners
                .borrow()
                .iter()
                .filter(|entry| {
                    entry.capture == capture
                        && entry.event_type == event_type
                        && &entry.scope == node
                })
                .map(|entry| entry.listener.clone())
                .collect();

            if listeners.is_empty() {
                continue;
            }
            for listener in listeners {
                listener(&event);
            }
            if event.propagation_stopped() {
                break;
            }
        }

        event.outcome()
    }
}
