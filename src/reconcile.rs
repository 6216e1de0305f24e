//! Diffing of listener and interval descriptors across logic snapshots.
//!
//! Both diffs take the current live state by value and hand back a fresh
//! collection, so callers swap state in one step and event callbacks never
//! observe a half-applied snapshot.

use std::collections::{HashMap, HashSet};

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::browser::TimerHandle;
use crate::logic::{EventConfig, IntervalDescriptor, ListenerDescriptor, QueueStrategy};

/// Shortest interval period that is allowed to run.
pub const MIN_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct EventHandler {
    pub config: EventConfig,
    pub id: String,
    pub selector: String,
    pub msg: JsonValue,
    pub queue_strategy: QueueStrategy,
}

impl From<&ListenerDescriptor> for EventHandler {
    fn from(descriptor: &ListenerDescriptor) -> Self {
        Self {
            config: descriptor.event.config.clone(),
            id: descriptor.id.clone(),
            selector: descriptor.selector.clone(),
            msg: descriptor.msg.clone(),
            queue_strategy: descriptor.queue_strategy,
        }
    }
}

/// Handlers grouped by event type, in registration order within a type.
#[derive(Debug, Clone, Default)]
pub struct EventHandlers {
    by_type: HashMap<String, Vec<EventHandler>>,
}

impl EventHandlers {
    pub fn handlers_for(&self, event_type: &str) -> &[EventHandler] {
        self.by_type
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.by_type
            .values()
            .flatten()
            .any(|handler| handler.id == id)
    }

    /// Remove the handler with `id` from every bucket. Returns whether any
    /// handler was removed.
    fn remove_id(&mut self, id: &str) -> bool {
        let mut removed = false;
        for bucket in self.by_type.values_mut() {
            let before = bucket.len();
            bucket.retain(|handler| handler.id != id);
            removed |= bucket.len() != before;
        }
        self.by_type.retain(|_, bucket| !bucket.is_empty());
        removed
    }

    fn push(&mut self, event_type: &str, handler: EventHandler) {
        self.by_type
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }
}

/// What a listener diff did, by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerChanges {
    pub added: Vec<String>,
    pub replaced: Vec<String>,
    pub removed: Vec<String>,
}

/// Distinct event types in first-appearance order.
pub fn event_types(descriptors: &[ListenerDescriptor]) -> Vec<String> {
    let mut seen = HashSet::new();
    descriptors
        .iter()
        .map(|descriptor| descriptor.event.event_type.clone())
        .filter(|event_type| seen.insert(event_type.clone()))
        .collect()
}

pub fn build_handlers(descriptors: &[ListenerDescriptor]) -> EventHandlers {
    reconcile_listeners(&EventHandlers::default(), descriptors).0
}

/// Apply a full listener snapshot on top of `current`.
///
/// Every id in `descriptors` replaces whatever was bound under that id, in
/// any bucket. Ids that no longer appear are stale and dropped. Within one
/// snapshot the last descriptor for an id wins.
pub fn reconcile_listeners(
    current: &EventHandlers,
    descriptors: &[ListenerDescriptor],
) -> (EventHandlers, ListenerChanges) {
    let mut next = current.clone();
    let mut changes = ListenerChanges::default();

    let mut winners: HashMap<&str, usize> = HashMap::new();
    for (index, descriptor) in descriptors.iter().enumerate() {
        if winners.insert(descriptor.id.as_str(), index).is_some() {
            warn!(target = "reconcile", id = %descriptor.id, "duplicate listener id; last descriptor wins");
        }
    }

    let stale: Vec<String> = current
        .by_type
        .values()
        .flatten()
        .filter(|handler| !winners.contains_key(handler.id.as_str()))
        .map(|handler| handler.id.clone())
        .collect();
    for id in stale {
        if next.remove_id(&id) {
            changes.removed.push(id);
        }
    }

    for (index, descriptor) in descriptors.iter().enumerate() {
        if winners.get(descriptor.id.as_str()) != Some(&index) {
            continue;
        }
        if next.remove_id(&descriptor.id) {
            changes.replaced.push(descriptor.id.clone());
        } else {
            changes.added.push(descriptor.id.clone());
        }
    }

    for (index, descriptor) in descriptors.iter().enumerate() {
        if winners.get(descriptor.id.as_str()) == Some(&index) {
            next.push(&descriptor.event.event_type, EventHandler::from(descriptor));
        }
    }

    debug!(
        target = "reconcile",
        added = changes.added.len(),
        replaced = changes.replaced.len(),
        removed = changes.removed.len(),
        "reconciled listeners"
    );

    (next, changes)
}

/// A live timer and the descriptor that started it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningInterval {
    pub handle: TimerHandle,
    pub descriptor: IntervalDescriptor,
}

impl RunningInterval {
    pub fn key(&self) -> String {
        self.descriptor.key()
    }
}

/// Drop descriptors whose period is too short to schedule.
pub fn valid_intervals(descriptors: &[IntervalDescriptor]) -> Vec<&IntervalDescriptor> {
    descriptors
        .iter()
        .filter(|descriptor| {
            if descriptor.duration < MIN_INTERVAL_MS {
                warn!(
                    target = "reconcile",
                    id = %descriptor.id,
                    duration = descriptor.duration,
                    minimum = MIN_INTERVAL_MS,
                    "interval duration below minimum; ignoring"
                );
                return false;
            }
            true
        })
        .collect()
}

/// Move the running set to match `descriptors`.
///
/// Intervals are identified by [`IntervalDescriptor::key`]: unchanged keys
/// keep their timer (and phase), vanished keys are stopped and new keys are
/// started. Each distinct key gets exactly one timer.
pub fn reconcile_intervals(
    current: Vec<RunningInterval>,
    descriptors: &[IntervalDescriptor],
    mut start: impl FnMut(&IntervalDescriptor) -> TimerHandle,
    mut stop: impl FnMut(TimerHandle),
) -> Vec<RunningInterval> {
    let incoming = valid_intervals(descriptors);
    let incoming_keys: HashSet<String> = incoming.iter().map(|descriptor| descriptor.key()).collect();

    let mut next = Vec::with_capacity(incoming.len());
    let mut running_keys = HashSet::new();
    for interval in current {
        let key = interval.key();
        if incoming_keys.contains(&key) && running_keys.insert(key) {
            next.push(interval);
        } else {
            debug!(target = "reconcile", id = %interval.descriptor.id, "stopping interval");
            stop(interval.handle);
        }
    }

    for descriptor in incoming {
        if !running_keys.insert(descriptor.key()) {
            continue;
        }
        debug!(
            target = "reconcile",
            id = %descriptor.id,
            duration = descriptor.duration,
            "starting interval"
        );
        let handle = start(descriptor);
        next.push(RunningInterval {
            handle,
            descriptor: descriptor.clone(),
        });
    }

    next
}
