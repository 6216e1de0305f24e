use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Poll, Waker};
use std::time::Duration;

use futures_util::future::poll_fn;
use futures_util::task::AtomicWaker;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::{Browser, Document, TimerCallback, TimerHandle};

struct TimerEntry {
    callback: TimerCallback,
    task: JoinHandle<()>,
}

/// Browser capability backed by an in-memory document and tokio timers.
///
/// Timer tasks only signal that a tick is due; callbacks run on the host
/// thread inside [`HeadlessBrowser::pump`].
pub struct HeadlessBrowser {
    document: Document,
    handle: Handle,
    next_id: RefCell<u32>,
    timers: RefCell<HashMap<u32, TimerEntry>>,
    fired_rx: RefCell<UnboundedReceiver<u32>>,
    fired_tx: UnboundedSender<u32>,
    waker: Arc<AtomicWaker>,
}

impl HeadlessBrowser {
    /// Must be called from within a tokio runtime.
    pub fn new(html: &str) -> Self {
        Self::with_handle(html, Handle::current())
    }

    pub fn with_handle(html: &str, handle: Handle) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            document: Document::from_html(html),
            handle,
            next_id: RefCell::new(1),
            timers: RefCell::new(HashMap::new()),
            fired_rx: RefCell::new(rx),
            fired_tx: tx,
            waker: Arc::new(AtomicWaker::new()),
        }
    }

    fn next_id(&self) -> u32 {
        let mut id_ref = self.next_id.borrow_mut();
        let id = *id_ref;
        *id_ref = id.wrapping_add(1).max(1);
        id
    }

    pub fn register_waker(&self, waker: &Waker) {
        self.waker.register(waker);
    }

    /// Resolves once at least one tick is waiting for [`HeadlessBrowser::pump`].
    pub async fn wait_for_ticks(&self) {
        poll_fn(|cx| {
            self.register_waker(cx.waker());
            if self.fired_rx.borrow().is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await
    }

    pub fn has_active_timers(&self) -> bool {
        !self.timers.borrow().is_empty()
    }

    /// Run callbacks for every tick that fired since the last call. Ticks of
    /// timers stopped in the meantime are discarded.
    pub fn pump(&self) -> usize {
        let mut fired = Vec::new();
        {
            let mut rx = self.fired_rx.borrow_mut();
            while let Ok(id) = rx.try_recv() {
                fired.push(id);
            }
        }

        let mut ran = 0;
        for id in fired {
            let callback = {
                let timers = self.timers.borrow();
                timers.get(&id).map(|entry| entry.callback.clone())
            };
            let Some(callback) = callback else {
                continue;
            };
            callback();
            ran += 1;
        }
        ran
    }

    pub fn clear_all(&self) {
        let mut timers = self.timers.borrow_mut();
        for (_, entry) in timers.drain() {
            entry.task.abort();
        }
    }
}

impl Browser for HeadlessBrowser {
    fn document(&self) -> &Document {
        &self.document
    }

    fn start_interval(&self, period: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id();
        let tx = self.fired_tx.clone();
        let waker = Arc::clone(&self.waker);

        let task = self.handle.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // First tick happens immediately, skip it
            loop {
                ticker.tick().await;
                if tx.send(id).is_err() {
                    break;
                }
                waker.wake();
            }
        });

        self.timers
            .borrow_mut()
            .insert(id, TimerEntry { callback, task });
        TimerHandle(id)
    }

    fn stop_interval(&self, handle: TimerHandle) {
        if let Some(entry) = self.timers.borrow_mut().remove(&handle.0) {
            entry.task.abort();
        }
    }
}

impl Drop for HeadlessBrowser {
    fn drop(&mut self) {
        self.clear_all();
    }
}
