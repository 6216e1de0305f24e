//! Deterministic doubles for the browser and queue capabilities.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::browser::{Browser, DispatchOutcome, Document, TimerCallback, TimerHandle};
use crate::logic::QueueStrategy;
use crate::queue::{Action, MessageQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Started(TimerHandle, Duration),
    Stopped(TimerHandle),
}

/// Browser whose timers only fire when told to.
pub struct FakeBrowser {
    document: Document,
    next_id: Cell<u32>,
    timers: RefCell<BTreeMap<TimerHandle, (Duration, TimerCallback)>>,
    log: RefCell<Vec<TimerEvent>>,
}

impl FakeBrowser {
    pub fn from_html(html: &str) -> Self {
        Self {
            document: Document::from_html(html),
            next_id: Cell::new(1),
            timers: RefCell::new(BTreeMap::new()),
            log: RefCell::new(Vec::new()),
        }
    }

    /// Fire `event_type` at the element with `id`.
    pub fn fire(&self, id: &str, event_type: &str) -> Option<DispatchOutcome> {
        let target = self.document.element_by_id(id)?;
        Some(self.document.dispatch(&target, event_type))
    }

    pub fn focus(&self, id: &str) {
        self.document.focus(self.document.element_by_id(id));
    }

    pub fn set_value(&self, id: &str, value: &str) {
        if let Some(element) = self.document.element_by_id(id) {
            self.document.set_value(&element, value);
        }
    }

    /// Run one tick of the timer. Returns false when it is not running.
    pub fn tick(&self, handle: TimerHandle) -> bool {
        let callback = self.timers.borrow().get(&handle).map(|(_, callback)| callback.clone());
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Tick every running timer once, in start order.
    pub fn tick_all(&self) -> usize {
        let handles: Vec<TimerHandle> = self.timers.borrow().keys().copied().collect();
        handles.into_iter().filter(|handle| self.tick(*handle)).count()
    }

    pub fn live_timers(&self) -> Vec<(TimerHandle, Duration)> {
        self.timers
            .borrow()
            .iter()
            .map(|(handle, (period, _))| (*handle, *period))
            .collect()
    }

    pub fn timer_log(&self) -> Vec<TimerEvent> {
        self.log.borrow().clone()
    }

    pub fn clear_timer_log(&self) {
        self.log.borrow_mut().clear();
    }
}

impl Browser for FakeBrowser {
    fn document(&self) -> &Document {
        &self.document
    }

    fn start_interval(&self, period: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle(self.next_id.get());
        self.next_id.set(handle.0 + 1);
        self.timers.borrow_mut().insert(handle, (period, callback));
        self.log.borrow_mut().push(TimerEvent::Started(handle, period));
        handle
    }

    fn stop_interval(&self, handle: TimerHandle) {
        if self.timers.borrow_mut().remove(&handle).is_some() {
            self.log.borrow_mut().push(TimerEvent::Stopped(handle));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: String,
    pub strategy: QueueStrategy,
}

/// Queue that records every submission and runs it immediately.
#[derive(Default)]
pub struct RecordingQueue {
    submissions: RefCell<Vec<Submission>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.borrow().clone()
    }
}

impl MessageQueue for RecordingQueue {
    fn enqueue(&self, id: &str, strategy: QueueStrategy, action: Action) {
        self.submissions.borrow_mut().push(Submission {
            id: id.to_string(),
            strategy,
        });
        action();
    }
}
