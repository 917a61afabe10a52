//! Deterministic timer service.
//!
//! Components schedule typed events instead of closures and receive them back
//! from [`Scheduler::advance`], which keeps all mutation on the owner's `&mut
//! self` path. Every scheduled entry is owned by a [`TimerHandle`]; dropping the
//! handle cancels the entry, so a state exit that drops its handle can never
//! leave a stray callback behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Lower bound for repeating intervals, guards against zero-length loops.
const MIN_REPEAT_INTERVAL: f32 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Due {
    At(f32),
    /// Fires on the first `advance` whose poll count exceeds the stored one.
    AfterPoll(u64),
}

#[derive(Debug)]
struct Entry<E> {
    due: Due,
    scheduled_at: f32,
    repeat: Option<f32>,
    event: E,
}

#[derive(Debug)]
struct Inner<E> {
    now: f32,
    polls: u64,
    next_id: u64,
    entries: HashMap<u64, Entry<E>>,
}

trait TimerStore: Send + Sync {
    fn cancel(&self, id: u64);
    fn remaining(&self, id: u64) -> Option<f32>;
    fn reschedule(&self, id: u64, due: f32) -> bool;
}

impl<E: Send> TimerStore for Mutex<Inner<E>> {
    fn cancel(&self, id: u64) {
        if let Ok(mut inner) = self.lock() {
            inner.entries.remove(&id);
        }
    }

    fn remaining(&self, id: u64) -> Option<f32> {
        let inner = self.lock().ok()?;
        let entry = inner.entries.get(&id)?;
        Some(match entry.due {
            Due::At(due) => (due - inner.now).max(0.0),
            Due::AfterPoll(_) => 0.0,
        })
    }

    fn reschedule(&self, id: u64, due: f32) -> bool {
        let Ok(mut inner) = self.lock() else {
            return false;
        };
        match inner.entries.get_mut(&id) {
            Some(entry) => {
                entry.due = Due::At(due);
                true
            }
            None => false,
        }
    }
}

/// Owning handle to a scheduled entry. Cancels the entry when dropped.
pub struct TimerHandle {
    id: u64,
    store: Weak<dyn TimerStore>,
}

impl TimerHandle {
    /// Cancels the entry now. Equivalent to dropping the handle.
    pub fn cancel(self) {
        drop(self);
    }

    /// Seconds until the entry fires, or `None` once it fired or was cancelled.
    ///
    /// Repeating entries always report the time until their next pulse.
    pub fn remaining(&self) -> Option<f32> {
        self.store.upgrade()?.remaining(self.id)
    }

    /// Returns true while the entry is still pending.
    pub fn is_active(&self) -> bool {
        self.remaining().is_some()
    }

    /// Moves a pending entry to an absolute due time without recreating it.
    pub fn reschedule_at(&self, due: f32) -> bool {
        match self.store.upgrade() {
            Some(store) => store.reschedule(self.id, due),
            None => false,
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.cancel(self.id);
        }
    }
}

impl core::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Timer queue producing events of type `E`.
pub struct Scheduler<E> {
    inner: Arc<Mutex<Inner<E>>>,
}

impl<E: Clone + Send + 'static> Scheduler<E> {
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    pub fn starting_at(now: f32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                now,
                polls: 0,
                next_id: 1,
                entries: HashMap::new(),
            })),
        }
    }

    /// Time of the most recent [`Scheduler::advance`].
    pub fn now(&self) -> f32 {
        self.inner.lock().map(|inner| inner.now).unwrap_or_default()
    }

    /// Fires `event` once, `delay` seconds from [`Scheduler::now`].
    pub fn schedule(&self, delay: f32, event: E) -> TimerHandle {
        self.insert(|inner| (Due::At(inner.now + delay.max(0.0)), None), event)
    }

    /// Fires `event` every `interval` seconds until the handle is dropped.
    pub fn schedule_repeating(&self, interval: f32, event: E) -> TimerHandle {
        let interval = interval.max(MIN_REPEAT_INTERVAL);
        self.insert(
            |inner| (Due::At(inner.now + interval), Some(interval)),
            event,
        )
    }

    /// Fires `event` on the next call to [`Scheduler::advance`], regardless of time.
    ///
    /// An entry scheduled while processing the events of one advance never fires
    /// within that same step.
    pub fn schedule_next_tick(&self, event: E) -> TimerHandle {
        self.insert(|inner| (Due::AfterPoll(inner.polls), None), event)
    }

    fn insert(&self, due: impl FnOnce(&Inner<E>) -> (Due, Option<f32>), event: E) -> TimerHandle {
        let id = match self.inner.lock() {
            Ok(mut inner) => {
                let (due, repeat) = due(&*inner);
                let id = inner.next_id;
                inner.next_id += 1;
                let scheduled_at = inner.now;
                inner.entries.insert(
                    id,
                    Entry {
                        due,
                        scheduled_at,
                        repeat,
                        event,
                    },
                );
                id
            }
            Err(_) => {
                tracing::error!(target: "combat::scheduler", "scheduler lock poisoned, timer dropped");
                0
            }
        };
        let store: Weak<Mutex<Inner<E>>> = Arc::downgrade(&self.inner);
        TimerHandle { id, store }
    }

    /// Advances time to `now` and returns every event that became due,
    /// ordered by due time and then by scheduling order.
    pub fn advance(&self, now: f32) -> Vec<E> {
        let Ok(mut inner) = self.inner.lock() else {
            return Vec::new();
        };
        inner.now = inner.now.max(now);
        inner.polls += 1;
        let (now, polls) = (inner.now, inner.polls);

        let mut fired: Vec<(f32, u64, E)> = Vec::new();
        let mut finished = Vec::new();
        for (&id, entry) in inner.entries.iter_mut() {
            match entry.due {
                Due::AfterPoll(scheduled_poll) if scheduled_poll < polls => {
                    fired.push((entry.scheduled_at, id, entry.event.clone()));
                    finished.push(id);
                }
                Due::At(mut due) if due <= now => match entry.repeat {
                    Some(interval) => {
                        while due <= now {
                            fired.push((due, id, entry.event.clone()));
                            due += interval;
                        }
                        entry.due = Due::At(due);
                    }
                    None => {
                        fired.push((due, id, entry.event.clone()));
                        finished.push(id);
                    }
                },
                _ => {}
            }
        }
        for id in finished {
            inner.entries.remove(&id);
        }

        fired.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        fired.into_iter().map(|(_, _, event)| event).collect()
    }

    /// Number of pending entries.
    pub fn pending(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or_default()
    }
}

impl<E: Clone + Send + 'static> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> core::fmt::Debug for Scheduler<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (now, pending) = self
            .inner
            .lock()
            .map(|inner| (inner.now, inner.entries.len()))
            .unwrap_or_default();
        f.debug_struct("Scheduler")
            .field("now", &now)
            .field("pending", &pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_fires_once_when_due() {
        let scheduler = Scheduler::new();
        let _handle = scheduler.schedule(1.0, "cooldown");
        assert!(scheduler.advance(0.5).is_empty());
        assert_eq!(scheduler.advance(1.0), vec!["cooldown"]);
        assert!(scheduler.advance(5.0).is_empty());
    }

    #[test]
    fn dropping_handle_cancels_entry() {
        let scheduler = Scheduler::new();
        let handle = scheduler.schedule(1.0, 7);
        assert_eq!(scheduler.pending(), 1);
        drop(handle);
        assert_eq!(scheduler.pending(), 0);
        assert!(scheduler.advance(2.0).is_empty());
    }

    #[test]
    fn events_fire_in_due_order() {
        let scheduler = Scheduler::new();
        let _a = scheduler.schedule(2.0, 'a');
        let _b = scheduler.schedule(1.0, 'b');
        let _c = scheduler.schedule(1.0, 'c');
        assert_eq!(scheduler.advance(3.0), vec!['b', 'c', 'a']);
    }

    #[test]
    fn repeating_timer_catches_up() {
        let scheduler = Scheduler::new();
        let handle = scheduler.schedule_repeating(1.0, ());
        assert_eq!(scheduler.advance(3.5).len(), 3);
        assert!((handle.remaining().unwrap_or_default() - 0.5).abs() < 1e-6);
        drop(handle);
        assert!(scheduler.advance(10.0).is_empty());
    }

    #[test]
    fn next_tick_entries_skip_the_current_step() {
        let scheduler = Scheduler::new();
        let _first = scheduler.schedule_next_tick(1);
        assert_eq!(scheduler.advance(0.0), vec![1]);
        // Scheduled after the advance above: must wait for the next one.
        let _second = scheduler.schedule_next_tick(2);
        assert_eq!(scheduler.advance(0.0), vec![2]);
        assert!(scheduler.advance(0.0).is_empty());
    }

    #[test]
    fn reschedule_moves_pending_entry() {
        let scheduler = Scheduler::new();
        let handle = scheduler.schedule(1.0, 1);
        assert!(handle.reschedule_at(2.0));
        assert!(scheduler.advance(1.5).is_empty());
        assert_eq!(scheduler.advance(2.0), vec![1]);
        assert!(!handle.is_active());
    }
}
