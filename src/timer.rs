//! Single-threaded repeating timers driven by the event loop.
//!
//! Nothing here spawns threads: the event loop asks the queue for the next
//! deadline, sleeps until then, and each owner polls its own handle for the
//! ticks that came due. Dropping a [`TimerHandle`] cancels its timer.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

/// Shortest period a timer may have; zero would spin the event loop.
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct TimerId(u64);

struct Entry {
    id: TimerId,
    period: Duration,
    next_due: Instant,
}

/// Deadline queue for repeating timers
#[derive(Default)]
pub struct TimerQueue {
    entries: Vec<Entry>,
    next_id: u64,
    scheduled: u64,
    cancelled: u64,
}

impl TimerQueue {
    fn schedule(&mut self, now: Instant, period: Duration) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.scheduled += 1;
        let period = period.max(MIN_PERIOD);
        self.entries.push(Entry {
            id,
            period,
            next_due: now + period,
        });
        id
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let removed = self.entries.len() != before;
        if removed {
            self.cancelled += 1;
        }
        removed
    }

    /// Number of whole periods elapsed for `id` up to `now`.
    fn fire(&mut self, id: TimerId, now: Instant) -> u32 {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            return 0;
        };
        if now < entry.next_due {
            return 0;
        }
        let late = now.duration_since(entry.next_due).as_nanos();
        let ticks = late / entry.period.as_nanos() + 1;
        let ticks = u32::try_from(ticks).unwrap_or(u32::MAX);
        entry.next_due += entry.period * ticks;
        ticks
    }
}

/// Shared handle to a [`TimerQueue`].
#[derive(Clone, Default)]
pub struct Timers(Rc<RefCell<TimerQueue>>);

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a repeating timer whose first tick is one period after `now`.
    pub fn schedule_repeating(&self, now: Instant, period: Duration) -> TimerHandle {
        let id = self.0.borrow_mut().schedule(now, period);
        tracing::trace!(?id, ?period, "timer scheduled");
        TimerHandle {
            id,
            queue: Rc::downgrade(&self.0),
        }
    }

    /// Timers currently scheduled
    pub fn active(&self) -> usize {
        self.0.borrow().entries.len()
    }

    pub fn scheduled_total(&self) -> u64 {
        self.0.borrow().scheduled
    }

    pub fn cancelled_total(&self) -> u64 {
        self.0.borrow().cancelled
    }

    /// Earliest pending deadline, used to bound the event loop's poll timeout.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.0.borrow().entries.iter().map(|e| e.next_due).min()
    }
}

/// Owner side of a scheduled timer. Cancels the timer when dropped.
pub struct TimerHandle {
    id: TimerId,
    queue: Weak<RefCell<TimerQueue>>,
}

impl TimerHandle {
    /// Ticks that came due since the last poll. Zero once cancelled.
    pub fn poll(&self, now: Instant) -> u32 {
        self.queue
            .upgrade()
            .map_or(0, |queue| queue.borrow_mut().fire(self.id, now))
    }

    pub fn is_active(&self) -> bool {
        self.queue
            .upgrade()
            .is_some_and(|queue| queue.borrow().entries.iter().any(|e| e.id == self.id))
    }

    /// Cancel explicitly; equivalent to dropping the handle.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.upgrade() {
            if queue.borrow_mut().cancel(self.id) {
                tracing::trace!(id = ?self.id, "timer cancelled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_accumulate_per_period() {
        let timers = Timers::new();
        let t0 = Instant::now();
        let handle = timers.schedule_repeating(t0, Duration::from_millis(50));

        assert_eq!(handle.poll(t0 + Duration::from_millis(49)), 0);
        assert_eq!(handle.poll(t0 + Duration::from_millis(50)), 1);
        assert_eq!(handle.poll(t0 + Duration::from_millis(50)), 0);
        assert_eq!(handle.poll(t0 + Duration::from_millis(210)), 3);
        assert_eq!(timers.next_deadline(), Some(t0 + Duration::from_millis(250)));
    }

    #[test]
    fn test_drop_cancels() {
        let timers = Timers::new();
        let handle = timers.schedule_repeating(Instant::now(), Duration::from_millis(10));
        assert_eq!(timers.active(), 1);
        assert!(handle.is_active());

        drop(handle);
        assert_eq!(timers.active(), 0);
        assert_eq!(timers.scheduled_total(), 1);
        assert_eq!(timers.cancelled_total(), 1);
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_handle_outliving_queue_is_inert() {
        let handle = {
            let timers = Timers::new();
            timers.schedule_repeating(Instant::now(), Duration::from_millis(10))
        };
        assert!(!handle.is_active());
        assert_eq!(handle.poll(Instant::now() + Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_zero_period_is_clamped() {
        let timers = Timers::new();
        let t0 = Instant::now();
        let handle = timers.schedule_repeating(t0, Duration::ZERO);
        assert_eq!(handle.poll(t0 + Duration::from_millis(3)), 3);
    }
}
