//! Bounded blocking hand-off queue.
//!
//! [`Fifo`] decouples the socket threads from the session: the rx thread
//! pushes validated frames, the session pops them and pushes replies onto a
//! second instance that the tx thread drains.
//!
//! Overflow policy is drop-oldest: a non-blocking [`Fifo::push`] into a full
//! queue evicts the head. Producers that must not lose items use
//! [`Fifo::push_or_wait`] instead.
//!
//! Blocking calls end on one of three events:
//!
//! ```text
//! item / room available  -> operation completes
//! shutdown()             -> nothing returned / item not admitted, forever after
//! wakeup_all()           -> epoch bumped, waiter re-checks and keeps waiting
//! ```
//!
//! The epoch lets a waiter tell "something changed, re-check your own
//! deadline" apart from "give up". Callers that own a timer pass a predicate
//! to [`Fifo::pop_or_wait_while`] / [`Fifo::push_or_wait_while`], which is
//! consulted once per epoch change.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    drops: u64,
    epoch: u64,
    shutdown: bool,
}

/// A FIFO with an optional capacity (0 = unbounded), one mutex and two
/// condition variables.
///
/// Single logical consumer; any number of producers.
#[derive(Debug)]
pub struct Fifo<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> Fifo<T> {
    /// Creates a queue holding at most `capacity` items. `0` means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                drops: 0,
                epoch: 0,
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current item count. Pushes still waiting for the lock are not counted.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of items evicted or truncated by the overflow policy.
    pub fn drops(&self) -> u64 {
        self.state.lock().drops
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    fn is_full(&self, state: &State<T>) -> bool {
        self.capacity > 0 && state.items.len() >= self.capacity
    }

    /// Appends `item`, evicting the head if the queue is full.
    ///
    /// Never blocks. Returns the evicted item, if any.
    pub fn push(&self, item: T) -> Option<T> {
        let mut state = self.state.lock();

        let evicted = if self.is_full(&state) {
            state.drops += 1;
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(item);

        drop(state);
        self.not_empty.notify_one();

        evicted
    }

    /// Appends `items` in one critical section.
    ///
    /// With a bounded queue the input is first truncated to `capacity`
    /// items (the tail of the input is dropped), then as many head items
    /// are evicted as needed to fit what is left.
    ///
    /// Returns every item that did not make it into the queue: evicted head
    /// items first, then the truncated input items.
    pub fn push_batch(&self, items: Vec<T>) -> Vec<T> {
        let mut items = items;
        let mut rejected = Vec::new();
        let mut state = self.state.lock();

        if self.capacity > 0 {
            let truncated = if items.len() > self.capacity {
                items.split_off(self.capacity)
            } else {
                Vec::new()
            };

            let overflow = (state.items.len() + items.len()).saturating_sub(self.capacity);
            rejected.extend(state.items.drain(..overflow));
            rejected.extend(truncated);
            state.drops += rejected.len() as u64;
        }

        let admitted = items.len();
        state.items.extend(items);

        drop(state);
        if admitted > 0 {
            self.not_empty.notify_all();
        }

        rejected
    }

    /// Removes the head item without blocking.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.items.pop_front();

        drop(state);
        if item.is_some() {
            self.not_full.notify_one();
        }

        item
    }

    /// Removes the head item, waiting for one if the queue is empty.
    ///
    /// Returns `None` only once the queue is shut down. A `wakeup_all()`
    /// makes the call re-check and go back to waiting.
    pub fn pop_or_wait(&self) -> Option<T> {
        self.pop_or_wait_while(|| true)
    }

    /// Like [`Fifo::pop_or_wait`], but calls `keep_waiting` each time a
    /// `wakeup_all()` is observed while the queue is still empty.
    /// Returning `false` ends the wait with `None`.
    ///
    /// `keep_waiting` runs without the queue lock held.
    pub fn pop_or_wait_while<F>(&self, keep_waiting: F) -> Option<T>
    where
        F: FnMut() -> bool,
    {
        let mut state = self.state.lock();
        if !self.wait_for_items(&mut state, keep_waiting) {
            return None;
        }

        let item = state.items.pop_front();
        drop(state);
        self.not_full.notify_one();

        item
    }

    /// Waits like [`Fifo::pop_or_wait`], then removes up to `max` items.
    ///
    /// An empty result means the queue was shut down (or `max` is 0).
    pub fn pop_or_wait_batch(&self, max: usize) -> Vec<T> {
        let mut state = self.state.lock();
        if !self.wait_for_items(&mut state, || true) {
            return Vec::new();
        }

        let take = max.min(state.items.len());
        let batch: Vec<T> = state.items.drain(..take).collect();
        drop(state);
        if !batch.is_empty() {
            self.not_full.notify_all();
        }

        batch
    }

    /// Removes the head item, waiting at most `timeout` for one.
    ///
    /// Uses the condition variable's own deadline, so no timer thread or
    /// `wakeup_all()` is needed. Returns `None` on timeout or shutdown.
    /// A timeout too large to be represented as an `Instant` waits like
    /// [`Fifo::pop_or_wait`].
    pub fn pop_or_wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();

        loop {
            if state.shutdown {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            let Some(deadline) = deadline else {
                self.not_empty.wait(&mut state);
                continue;
            };
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                let item = if state.shutdown {
                    None
                } else {
                    state.items.pop_front()
                };
                if item.is_some() {
                    drop(state);
                    self.not_full.notify_one();
                }
                return item;
            }
        }
    }

    /// Appends `item`, waiting for room if the queue is full.
    ///
    /// On shutdown the item is not admitted and is handed back in `Err`.
    pub fn push_or_wait(&self, item: T) -> Result<(), T> {
        self.push_or_wait_while(item, || true)
    }

    /// Like [`Fifo::push_or_wait`], but calls `keep_waiting` each time a
    /// `wakeup_all()` is observed while the queue is still full.
    /// Returning `false` gives the item back in `Err`.
    pub fn push_or_wait_while<F>(&self, item: T, mut keep_waiting: F) -> Result<(), T>
    where
        F: FnMut() -> bool,
    {
        let mut state = self.state.lock();
        let mut epoch = state.epoch;

        loop {
            if state.shutdown {
                return Err(item);
            }
            if !self.is_full(&state) {
                break;
            }
            if state.epoch != epoch {
                epoch = state.epoch;
                if !MutexGuard::unlocked(&mut state, &mut keep_waiting) {
                    return Err(item);
                }
                continue;
            }
            self.not_full.wait(&mut state);
        }

        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();

        Ok(())
    }

    /// Terminal. Wakes every waiter; from now on blocking calls return
    /// immediately. Calling it again has no further effect.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Wakes every waiter without shutting down. Each one re-evaluates its
    /// condition against the new epoch.
    pub fn wakeup_all(&self) {
        self.state.lock().epoch += 1;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Blocks until the queue holds at least one item. Returns `false` on
    /// shutdown or when `keep_waiting` declines another round.
    fn wait_for_items<F>(&self, state: &mut MutexGuard<'_, State<T>>, mut keep_waiting: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let mut epoch = state.epoch;

        loop {
            if state.shutdown {
                return false;
            }
            if !state.items.is_empty() {
                return true;
            }
            if state.epoch != epoch {
                epoch = state.epoch;
                if !MutexGuard::unlocked(state, &mut keep_waiting) {
                    return false;
                }
                continue;
            }
            self.not_empty.wait(state);
        }
    }
}
