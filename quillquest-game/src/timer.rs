//! Repeating-timer abstraction shared by the stage engine and the dungeon.
//!
//! A host implements [`Scheduler`] on top of whatever event loop it owns and
//! feeds each firing back into the engine as a [`TimerId`]. Engines never talk
//! to the scheduler directly: they go through a [`TimerSlot`], which owns at
//! most one outstanding timer and always cancels it before arming another.
//! Firings carrying a stale id are dropped, so a late callback from a
//! cancelled timer can never double-decrement a countdown.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Opaque handle for one armed repeating timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Host-side repeating timer backend.
pub trait Scheduler {
    /// Arm a repeating timer firing every `interval`.
    fn arm(&mut self, interval: Duration) -> TimerId;

    /// Cancel a timer. Unknown ids are ignored.
    fn disarm(&mut self, id: TimerId);
}

/// Owner of at most one outstanding timer for a single engine concern.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimerSlot {
    active: Option<TimerId>,
}

impl TimerSlot {
    #[must_use]
    pub const fn new() -> Self {
        Self { active: None }
    }

    /// Cancel whatever this slot holds, then arm a fresh timer.
    pub fn rearm<S: Scheduler + ?Sized>(
        &mut self,
        scheduler: &mut S,
        interval: Duration,
    ) -> TimerId {
        self.cancel(scheduler);
        let id = scheduler.arm(interval);
        self.active = Some(id);
        id
    }

    pub fn cancel<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if let Some(id) = self.active.take() {
            scheduler.disarm(id);
        }
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub const fn active(&self) -> Option<TimerId> {
        self.active
    }

    /// Whether a firing belongs to the timer currently held by this slot.
    #[must_use]
    pub fn owns(&self, id: TimerId) -> bool {
        self.active == Some(id)
    }
}

#[derive(Debug, Default)]
struct ManualTimers {
    next_id: u64,
    armed: BTreeMap<TimerId, Duration>,
    disarmed: Vec<TimerId>,
}

/// Scheduler that never fires on its own; the caller decides when ticks happen.
///
/// Clones share the same timer table so a test can keep a handle after the
/// engine takes ownership of its copy.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    inner: Rc<RefCell<ManualTimers>>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids currently armed, oldest first.
    #[must_use]
    pub fn armed(&self) -> Vec<TimerId> {
        self.inner.borrow().armed.keys().copied().collect()
    }

    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.inner.borrow().armed.len()
    }

    #[must_use]
    pub fn interval_of(&self, id: TimerId) -> Option<Duration> {
        self.inner.borrow().armed.get(&id).copied()
    }

    #[must_use]
    pub fn was_disarmed(&self, id: TimerId) -> bool {
        self.inner.borrow().disarmed.contains(&id)
    }
}

impl Scheduler for ManualScheduler {
    fn arm(&mut self, interval: Duration) -> TimerId {
        let mut timers = self.inner.borrow_mut();
        timers.next_id += 1;
        let id = TimerId(timers.next_id);
        timers.armed.insert(id, interval);
        id
    }

    fn disarm(&mut self, id: TimerId) {
        let mut timers = self.inner.borrow_mut();
        if timers.armed.remove(&id).is_some() {
            timers.disarmed.push(id);
        }
    }
}

#[cfg(feature = "async")]
pub use tokio_backend::TokioScheduler;

#[cfg(feature = "async")]
mod tokio_backend {
    use super::{Scheduler, TimerId};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
    use tokio::task::JoinHandle;
    use tokio::time::{Instant, MissedTickBehavior, interval_at};

    /// Scheduler backed by tokio tasks; firings arrive on the returned channel.
    #[derive(Debug)]
    pub struct TokioScheduler {
        tx: UnboundedSender<TimerId>,
        tasks: HashMap<TimerId, JoinHandle<()>>,
        next_id: u64,
    }

    impl TokioScheduler {
        /// Must be called from inside a tokio runtime.
        #[must_use]
        pub fn channel() -> (Self, UnboundedReceiver<TimerId>) {
            let (tx, rx) = unbounded_channel();
            let scheduler = Self {
                tx,
                tasks: HashMap::new(),
                next_id: 0,
            };
            (scheduler, rx)
        }
    }

    impl Scheduler for TokioScheduler {
        fn arm(&mut self, period: Duration) -> TimerId {
            self.next_id += 1;
            let id = TimerId(self.next_id);
            let tx = self.tx.clone();
            let handle = tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if tx.send(id).is_err() {
                        break;
                    }
                }
            });
            self.tasks.insert(id, handle);
            id
        }

        fn disarm(&mut self, id: TimerId) {
            if let Some(handle) = self.tasks.remove(&id) {
                handle.abort();
            }
        }
    }

    impl Drop for TokioScheduler {
        fn drop(&mut self) {
            for (_, handle) in self.tasks.drain() {
                handle.abort();
            }
        }
    }
}

/// Format seconds as `mm:ss`; minutes come from the absolute value.
#[must_use]
pub fn format_clock(seconds: i64) -> String {
    let abs = seconds.unsigned_abs();
    format!("{:02}:{:02}", abs / 60, abs % 60)
}

/// Format seconds as `hh:mm:ss` for the daily counter.
#[must_use]
pub fn format_hms(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3_600,
        (seconds % 3_600) / 60,
        seconds % 60
    )
}
