use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::logic::QueueStrategy;

pub type Action = Box<dyn FnOnce()>;

/// Receives every message bound for the logic engine.
pub type Outbound = Rc<dyn Fn(JsonValue)>;

/// Unit of work submitted to the queue on behalf of a listener or interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub id: String,
    pub strategy: QueueStrategy,
    pub msg: JsonValue,
}

/// Schedules side-effecting work. Items sharing an `id` follow `strategy`;
/// different ids are independent. Failures inside an action propagate to
/// whoever runs it.
pub trait MessageQueue {
    fn enqueue(&self, id: &str, strategy: QueueStrategy, action: Action);
}

/// Hand an update to the queue, delivering its message through `outbound`
/// once the queue runs it.
pub fn submit(queue: &dyn MessageQueue, outbound: &Outbound, update: Update) {
    let Update { id, strategy, msg } = update;
    let outbound = Rc::clone(outbound);
    queue.enqueue(&id, strategy, Box::new(move || outbound(msg)));
}

#[derive(Default)]
struct Lane {
    pending: VecDeque<Action>,
    running: bool,
}

/// Single-threaded queue driven by the host loop through [`StrategyQueue::pump`].
#[derive(Default)]
pub struct StrategyQueue {
    lanes: RefCell<HashMap<String, Lane>>,
    order: RefCell<VecDeque<String>>,
}

impl StrategyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self, id: &str) -> usize {
        self.lanes
            .borrow()
            .get(id)
            .map(|lane| lane.pending.len())
            .unwrap_or(0)
    }

    pub fn is_idle(&self) -> bool {
        self.order.borrow().is_empty()
    }

    /// Run queued work until every lane is empty, including work submitted
    /// by the actions themselves. Returns the number of actions executed.
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.order.borrow_mut().pop_front();
            let Some(id) = next else {
                break;
            };

            let action = {
                let mut lanes = self.lanes.borrow_mut();
                let Some(lane) = lanes.get_mut(&id) else {
                    continue;
                };
                let Some(action) = lane.pending.pop_front() else {
                    continue;
                };
                lane.running = true;
                action
            };

            let _running = RunningLane { queue: self, id };
            action();
            ran += 1;
        }
        ran
    }
}

// Releases a lane after its action, also when the action unwinds.
struct RunningLane<'a> {
    queue: &'a StrategyQueue,
    id: String,
}

impl Drop for RunningLane<'_> {
    fn drop(&mut self) {
        let mut lanes = self.queue.lanes.borrow_mut();
        if let Some(lane) = lanes.get_mut(&self.id) {
            lane.running = false;
            if lane.pending.is_empty() {
                lanes.remove(&self.id);
            } else {
                self.queue.order.borrow_mut().push_back(self.id.clone());
            }
        }
    }
}

impl MessageQueue for StrategyQueue {
    fn enqueue(&self, id: &str, strategy: QueueStrategy, action: Action) {
        let mut lanes = self.lanes.borrow_mut();
        let lane = lanes.entry(id.to_string()).or_default();
        let idle = lane.pending.is_empty() && !lane.running;

        match strategy {
            QueueStrategy::Fifo => lane.pending.push_back(action),
            QueueStrategy::Latest => {
                if !lane.pending.is_empty() {
                    debug!(target = "queue", %id, superseded = lane.pending.len(), "superseding pending work");
                    lane.pending.clear();
                }
                lane.pending.push_back(action);
            }
            QueueStrategy::Drop => {
                if !idle {
                    debug!(target = "queue", %id, "dropping submission while work is outstanding");
                    return;
                }
                lane.pending.push_back(action);
            }
        }

        // A running lane is re-scheduled by pump once its action returns.
        if idle {
            self.order.borrow_mut().push_back(id.to_string());
        }
    }
}
