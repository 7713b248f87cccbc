// File: redeemfx-core/src/services/scheduler.rs
//
// Deferred actions on simulation time. Only ever driven from the simulation
// tick, so the shared state lives behind `Rc`/`RefCell` rather than a lock.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, error, trace};

type Action = Box<dyn FnOnce()>;

struct Entry {
    seq: u64,
    due: f64,
    name: Option<String>,
    action: Action,
}

#[derive(Default)]
struct Inner {
    now: Cell<f64>,
    next_seq: Cell<u64>,
    entries: RefCell<Vec<Entry>>,
    fast_forwarding: Cell<bool>,
}

/// Single-threaded simulation-time timer queue.
///
/// Clones share the same queue, so effect handlers can hold one and push
/// follow-up work (e.g. "undo this effect in 30 seconds").
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulation seconds elapsed since creation.
    pub fn now(&self) -> f64 {
        self.inner.now.get()
    }

    /// Runs `action` no earlier than `delay` simulation seconds from now.
    pub fn set(&self, delay: f64, action: impl FnOnce() + 'static) {
        self.push(delay, None, Box::new(action));
    }

    /// Like [`Scheduler::set`], but the action can later be superseded with
    /// [`Scheduler::fast_forward`].
    pub fn set_named(&self, name: &str, delay: f64, action: impl FnOnce() + 'static) {
        self.push(delay, Some(name.to_string()), Box::new(action));
    }

    fn push(&self, delay: f64, name: Option<String>, action: Action) {
        let seq = self.inner.next_seq.get();
        self.inner.next_seq.set(seq + 1);
        let due = self.now() + delay.max(0.0);
        trace!("scheduler: +{:.2}s name={:?} (due at {:.2})", delay, name, due);
        self.inner.entries.borrow_mut().push(Entry { seq, due, name, action });
    }

    /// Immediately runs and removes every pending action called `name`.
    /// Returns how many ran.
    pub fn fast_forward(&self, name: &str) -> usize {
        let matched = self.take_where(|e| e.name.as_deref() == Some(name));
        if matched.is_empty() {
            return 0;
        }
        debug!("scheduler: fast-forwarding {} x '{}'", matched.len(), name);

        let was = self.inner.fast_forwarding.replace(true);
        let count = matched.len();
        for entry in matched {
            run_entry(entry);
        }
        self.inner.fast_forwarding.set(was);
        count
    }

    /// True while [`Scheduler::fast_forward`] is running superseded actions.
    pub fn is_fast_forwarding(&self) -> bool {
        self.inner.fast_forwarding.get()
    }

    /// Makes every pending action due on the next tick.
    pub fn fast_forward_all(&self) -> usize {
        let now = self.now();
        let mut entries = self.inner.entries.borrow_mut();
        for e in entries.iter_mut() {
            e.due = e.due.min(now);
        }
        entries.len()
    }

    /// Advances simulation time by `dt` and runs whatever came due, oldest
    /// deadline first. Actions scheduled while this runs wait for a later tick.
    pub fn tick(&self, dt: f64) -> usize {
        let now = self.now() + dt.max(0.0);
        self.inner.now.set(now);

        let mut due = self.take_where(|e| e.due <= now);
        due.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)));
        let count = due.len();
        for entry in due {
            run_entry(entry);
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Drops every pending action without running it.
    pub fn clear(&self) {
        self.inner.entries.borrow_mut().clear();
    }

    fn take_where(&self, pred: impl Fn(&Entry) -> bool) -> Vec<Entry> {
        let mut entries = self.inner.entries.borrow_mut();
        let (taken, kept): (Vec<Entry>, Vec<Entry>) = entries.drain(..).partition(|e| pred(e));
        *entries = kept;
        taken
    }
}

/// The `RefCell` borrow is released before this runs, so actions may
/// schedule more work.
fn run_entry(entry: Entry) {
    let name = entry.name;
    if catch_unwind(AssertUnwindSafe(entry.action)).is_err() {
        error!("scheduler: action {:?} panicked", name);
    }
}
