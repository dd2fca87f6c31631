//! Timer registry.
//!
//! Timers live in a generation-checked slab; their deadlines are mirrored
//! in a binary min-heap ordered by `(deadline, sequence)`. The sequence
//! number is assigned at every (re)arm, so timers sharing a deadline fire
//! in registration order and heap entries left behind by a cancel or a
//! reschedule are recognised as stale and skipped.

use crate::utils::{Key, Slab};

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::time::{Duration, Instant};

/// Identifier of a scheduled timer.
///
/// Ids are never reused while the timer they name is live, so cancelling a
/// stale id is a harmless no-op.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(Key);

impl TimerId {
    /// Returns the id as a script-visible number.
    ///
    /// The value is an integer below 2^53 and therefore exact as an `f64`.
    pub fn as_number(self) -> f64 {
        self.0.to_bits() as f64
    }

    /// Parses a number previously produced by [`as_number`](Self::as_number).
    ///
    /// Returns `None` for NaN, negative, fractional or out-of-range values.
    pub fn from_number(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value >= 9.0e15 {
            return None;
        }

        Key::from_bits(value as u64).map(TimerId)
    }
}

impl fmt::Debug for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimerId({})", self.0.to_bits())
    }
}

/// Callback attached to a timer.
pub(crate) enum TimerCallback {
    Once(Box<dyn FnOnce()>),
    Repeat(Box<dyn FnMut()>),
}

struct TimerSlot {
    /// Absolute deadline of the next firing.
    fire_at: Instant,
    /// Repeat period; zero for one-shot timers.
    period: Duration,
    /// Sequence of the live heap entry for this timer.
    sequence: u64,
    /// `None` while a repeating callback is running.
    callback: Option<TimerCallback>,
}

/// An entry in the deadline heap.
struct TimerEntry {
    deadline: Instant,
    sequence: u64,
    key: Key,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then by sequence.
    ///
    /// Note that the comparison is **reversed** so that a
    /// `BinaryHeap<TimerEntry>` behaves as a min-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// All live timers of a reactor.
pub(crate) struct TimerRegistry {
    slots: Slab<TimerSlot>,
    queue: BinaryHeap<TimerEntry>,
    sequence: u64,
}

impl TimerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: Slab::with_capacity(16),
            queue: BinaryHeap::new(),
            sequence: 0,
        }
    }

    /// Number of live timers.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Registers a timer firing at `fire_at`.
    ///
    /// A zero `period` makes it one-shot.
    pub(crate) fn schedule(
        &mut self,
        fire_at: Instant,
        period: Duration,
        callback: TimerCallback,
    ) -> TimerId {
        let sequence = self.next_sequence();
        let key = self.slots.insert(TimerSlot {
            fire_at,
            period,
            sequence,
            callback: Some(callback),
        });

        self.queue.push(TimerEntry {
            deadline: fire_at,
            sequence,
            key,
        });

        TimerId(key)
    }

    /// Removes a timer.
    ///
    /// Returns its callback, if it is not currently running, so the caller
    /// can drop it outside of any reactor borrow. Unknown ids return `None`.
    pub(crate) fn cancel(&mut self, id: TimerId) -> Option<TimerCallback> {
        self.slots.remove(id.0).and_then(|slot| slot.callback)
    }

    /// Returns `true` if the timer is still registered.
    pub(crate) fn contains(&self, id: TimerId) -> bool {
        self.slots.contains(id.0)
    }

    fn is_current(&self, entry: &TimerEntry) -> bool {
        self.slots
            .get(entry.key)
            .is_some_and(|slot| slot.sequence == entry.sequence)
    }

    /// Returns the earliest live deadline, discarding stale heap entries.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(entry) = self.queue.peek() {
            if self.is_current(entry) {
                return Some(entry.deadline);
            }
            self.queue.pop();
        }

        None
    }

    /// Pops every timer due at `now`, in firing order.
    pub(crate) fn expired(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due = Vec::new();

        while let Some(entry) = self.queue.peek() {
            if entry.deadline > now {
                break;
            }

            if let Some(entry) = self.queue.pop() {
                if self.is_current(&entry) {
                    due.push(TimerId(entry.key));
                }
            }
        }

        due
    }

    /// Takes the callback of a due timer out of the registry.
    ///
    /// One-shot timers are removed entirely. Repeating timers stay
    /// registered without a callback until [`rearm`](Self::rearm) hands it
    /// back. Returns `None` if the timer was cancelled in the meantime.
    pub(crate) fn begin_fire(&mut self, id: TimerId) -> Option<TimerCallback> {
        let repeating = !self.slots.get(id.0)?.period.is_zero();

        if repeating {
            self.slots.get_mut(id.0)?.callback.take()
        } else {
            self.slots.remove(id.0)?.callback
        }
    }

    /// Reschedules a repeating timer after its callback returned.
    ///
    /// The next deadline is `fire_at + period`, which keeps the interval
    /// free of drift. If the loop fell a whole period behind, missed ticks
    /// are coalesced into one firing at `now + period`.
    ///
    /// If the timer was cancelled while its callback ran, the callback is
    /// returned for the caller to drop.
    pub(crate) fn rearm(
        &mut self,
        id: TimerId,
        now: Instant,
        callback: Box<dyn FnMut()>,
    ) -> Option<Box<dyn FnMut()>> {
        let sequence = self.next_sequence();

        let Some(slot) = self.slots.get_mut(id.0) else {
            return Some(callback);
        };

        let mut next = slot.fire_at + slot.period;
        if next <= now {
            next = now + slot.period;
        }

        slot.fire_at = next;
        slot.sequence = sequence;
        slot.callback = Some(TimerCallback::Repeat(callback));

        self.queue.push(TimerEntry {
            deadline: next,
            sequence,
            key: id.0,
        });

        None
    }

    /// Removes every timer and returns their callbacks.
    pub(crate) fn drain(&mut self) -> Vec<TimerCallback> {
        self.queue.clear();
        self.slots
            .drain()
            .into_iter()
            .filter_map(|slot| slot.callback)
            .collect()
    }
}
