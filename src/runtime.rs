use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use kuchiki::NodeRef;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::browser::{element_value, is_input, Browser, NativeEvent, NativeListener, TimerCallback};
use crate::config::RuntimeConfig;
use crate::dispatch::dispatch_event;
use crate::error::RuntimeError;
use crate::logic::{IntervalDescriptor, Logic};
use crate::patch::DomPatcher;
use crate::queue::{submit, MessageQueue, Outbound, Update};
use crate::reconcile::{
    build_handlers, event_types, reconcile_intervals, reconcile_listeners, EventHandlers,
    ListenerChanges, RunningInterval,
};

/// Keeps live listeners and timers in step with the logic engine's
/// descriptors and forwards resulting messages through the queue.
pub struct Runtime {
    config: RuntimeConfig,
    root: NodeRef,
    browser: Rc<dyn Browser>,
    queue: Rc<dyn MessageQueue>,
    patcher: Box<dyn DomPatcher>,
    // Swapped wholesale on every update; native listeners read a snapshot.
    handlers: Rc<RefCell<Rc<EventHandlers>>>,
    registered_types: Vec<String>,
    intervals: Vec<RunningInterval>,
    outbound: Option<Outbound>,
}

impl Runtime {
    /// Fails when the mount element named by `config.app_id` does not exist.
    pub fn new(
        config: RuntimeConfig,
        browser: Rc<dyn Browser>,
        queue: Rc<dyn MessageQueue>,
        patcher: Box<dyn DomPatcher>,
    ) -> Result<Self, RuntimeError> {
        let root = browser
            .element_by_id(&config.app_id)
            .ok_or_else(|| RuntimeError::MountNotFound(config.app_id.clone()))?;

        Ok(Self {
            config,
            root,
            browser,
            queue,
            patcher,
            handlers: Rc::new(RefCell::new(Rc::new(EventHandlers::default()))),
            registered_types: Vec::new(),
            intervals: Vec::new(),
            outbound: None,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    pub fn handlers(&self) -> Rc<EventHandlers> {
        Rc::clone(&*self.handlers.borrow())
    }

    pub fn intervals(&self) -> &[RunningInterval] {
        &self.intervals
    }

    /// Event types with a native listener on the mount element.
    pub fn registered_types(&self) -> &[String] {
        &self.registered_types
    }

    /// Apply the first logic snapshot and register one capture-phase listener
    /// per event type on the mount element. Event types that first appear in
    /// later snapshots get no native listener.
    pub fn init_logic(
        &mut self,
        logic: &Logic,
        outbound: impl Fn(JsonValue) + 'static,
    ) -> Result<(), RuntimeError> {
        if self.outbound.is_some() {
            return Err(RuntimeError::AlreadyInitialized);
        }

        let outbound: Outbound = Rc::new(outbound);
        self.outbound = Some(Rc::clone(&outbound));
        *self.handlers.borrow_mut() = Rc::new(build_handlers(&logic.event_listeners));

        for event_type in event_types(&logic.event_listeners) {
            let listener = self.native_listener(Rc::clone(&outbound));
            self.browser
                .add_event_listener(&self.root, &event_type, true, listener);
            self.registered_types.push(event_type);
        }

        self.apply_intervals(&logic.intervals, &outbound);

        info!(
            target = "runtime",
            listeners = logic.event_listeners.len(),
            event_types = self.registered_types.len(),
            intervals = self.intervals.len(),
            "logic initialised"
        );
        Ok(())
    }

    /// Reconcile listeners and intervals against a new snapshot.
    pub fn update_logic(&mut self, logic: &Logic) -> Result<ListenerChanges, RuntimeError> {
        let outbound = self.outbound.clone().ok_or(RuntimeError::NotInitialized)?;

        let current = self.handlers();
        let (next, changes) = reconcile_listeners(&current, &logic.event_listeners);
        for event_type in next.event_types() {
            if !self.registered_types.iter().any(|known| known == event_type) {
                warn!(
                    target = "runtime",
                    %event_type,
                    "event type was not present at init; its handlers will not fire"
                );
            }
        }
        *self.handlers.borrow_mut() = Rc::new(next);

        self.apply_intervals(&logic.intervals, &outbound);
        Ok(changes)
    }

    /// Patch the mount element towards `markup`. Focused inputs whose value
    /// differs from the incoming one, and elements carrying the unmanaged
    /// attribute, are left untouched.
    pub fn update_dom(&self, markup: &str) -> Result<(), RuntimeError> {
        let browser = self.browser.as_ref();
        let unmanaged = self.config.unmanaged_attribute.as_str();
        let should_skip = |existing: &NodeRef, incoming: &NodeRef| {
            is_unmanaged(existing, unmanaged) || is_editing(browser, existing, incoming)
        };
        self.patcher.patch(&self.root, markup, &should_skip)?;
        Ok(())
    }

    /// Stop every running interval and drop all handlers.
    pub fn shutdown(&mut self) {
        for interval in self.intervals.drain(..) {
            self.browser.stop_interval(interval.handle);
        }
        *self.handlers.borrow_mut() = Rc::new(EventHandlers::default());
    }

    fn native_listener(&self, outbound: Outbound) -> NativeListener {
        let handlers = Rc::clone(&self.handlers);
        let browser = Rc::downgrade(&self.browser);
        let queue = Rc::clone(&self.queue);
        let debug_trace = self.config.debug;

        Rc::new(move |event: &NativeEvent| {
            let Some(browser) = browser.upgrade() else {
                return;
            };
            let snapshot = Rc::clone(&*handlers.borrow());
            dispatch_event(browser.as_ref(), &snapshot, event, debug_trace, |update| {
                submit(queue.as_ref(), &outbound, update)
            });
        })
    }

    fn apply_intervals(&mut self, descriptors: &[IntervalDescriptor], outbound: &Outbound) {
        let current = std::mem::take(&mut self.intervals);
        let browser = &self.browser;
        let queue = &self.queue;
        self.intervals = reconcile_intervals(
            current,
            descriptors,
            |descriptor| {
                browser.start_interval(
                    Duration::from_millis(descriptor.duration),
                    interval_callback(queue, outbound, descriptor),
                )
            },
            |handle| browser.stop_interval(handle),
        );
    }
}

fn interval_callback(
    queue: &Rc<dyn MessageQueue>,
    outbound: &Outbound,
    descriptor: &IntervalDescriptor,
) -> TimerCallback {
    let queue = Rc::clone(queue);
    let outbound = Rc::clone(outbound);
    let update = Update {
        id: descriptor.key(),
        strategy: descriptor.queue_strategy,
        msg: descriptor.msg.clone(),
    };
    Rc::new(move || submit(queue.as_ref(), &outbound, update.clone()))
}

fn is_unmanaged(node: &NodeRef, attribute: &str) -> bool {
    node.as_element()
        .is_some_and(|element| element.attributes.borrow().contains(attribute))
}

// Protects in-progress typing from being overwritten by a stale render.
fn is_editing(browser: &dyn Browser, existing: &NodeRef, incoming: &NodeRef) -> bool {
    is_input(existing)
        && browser.active_element().as_ref() == Some(existing)
        && browser.input_value(existing) != element_value(incoming)
}
