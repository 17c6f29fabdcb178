#![forbid(unsafe_code)]

//! [`ReplayGate<T>`]: per-subscriber ordering for replaying cells.
//!
//! A cell that replays its current value to a new subscriber registers the
//! subscriber and reads the value under its lock, but delivers outside it. A
//! change published from another thread in between would otherwise reach the
//! subscriber before the replay and be overwritten by it.
//!
//! The gate sits between the cell and one subscriber. Changes offered before
//! the gate [`open`](ReplayGate::open)s are held. Opening queues the replay,
//! then every held change newer than it. After that, changes are queued in
//! version order and anything at or below the last queued version is dropped.
//! One caller at a time drains the queue; a re-entrant or concurrent offer
//! only enqueues.
//!
//! # Invariants
//!
//! 1. The replay is the first value delivered.
//! 2. Delivered versions strictly increase.
//! 3. Delivery never runs under the gate's lock.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct GateState<T> {
    open: bool,
    last: u64,
    held: Vec<(u64, T)>,
    queue: VecDeque<T>,
    draining: bool,
}

/// Orders a replay ahead of the changes that raced it.
pub struct ReplayGate<T> {
    state: Mutex<GateState<T>>,
    deliver: Box<dyn Fn(T) + Send + Sync>,
}

impl<T> ReplayGate<T> {
    /// Closed gate delivering through `deliver`.
    pub fn new(deliver: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(GateState {
                open: false,
                last: 0,
                held: Vec::new(),
                queue: VecDeque::new(),
                draining: false,
            }),
            deliver: Box::new(deliver),
        }
    }

    /// Open at `version`, delivering `replay` first when present. Held
    /// changes newer than `version` follow. Opening twice is a no-op.
    pub fn open(&self, version: u64, replay: Option<T>) {
        {
            let mut state = self.lock();
            if state.open {
                return;
            }
            state.open = true;
            state.last = version;
            if let Some(value) = replay {
                state.queue.push_back(value);
            }
            let held = std::mem::take(&mut state.held);
            for (v, value) in held {
                if v > state.last {
                    state.last = v;
                    state.queue.push_back(value);
                }
            }
            if state.draining || state.queue.is_empty() {
                return;
            }
            state.draining = true;
        }
        self.drain();
    }

    /// A change at `version`.
    pub fn offer(&self, version: u64, value: T) {
        {
            let mut state = self.lock();
            if !state.open {
                state.held.push((version, value));
                return;
            }
            if version <= state.last {
                return;
            }
            state.last = version;
            state.queue.push_back(value);
            if state.draining {
                return;
            }
            state.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        let _reset = DrainReset(self);
        loop {
            let next = {
                let mut state = self.lock();
                match state.queue.pop_front() {
                    Some(value) => value,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            (self.deliver)(next);
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the drain if a delivery panics.
struct DrainReset<'a, T>(&'a ReplayGate<T>);

impl<T> Drop for DrainReset<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.0.lock();
            state.draining = false;
            state.queue.clear();
        }
    }
}

impl<T> std::fmt::Debug for ReplayGate<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ReplayGate")
            .field("open", &state.open)
            .field("last", &state.last)
            .field("queued", &state.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording() -> (ReplayGate<i32>, Arc<Mutex<Vec<i32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        (ReplayGate::new(move |v| s.lock().unwrap().push(v)), seen)
    }

    #[test]
    fn held_changes_follow_the_replay() {
        let (gate, seen) = recording();
        gate.offer(3, 30);
        gate.offer(2, 20);
        assert!(seen.lock().unwrap().is_empty());

        gate.open(1, Some(10));
        assert_eq!(*seen.lock().unwrap(), vec![10, 30]);
    }

    #[test]
    fn changes_older_than_the_replay_are_dropped() {
        let (gate, seen) = recording();
        gate.offer(1, 1);
        gate.open(2, Some(2));
        gate.offer(2, 99);
        gate.offer(3, 3);
        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }

    #[test]
    fn open_without_replay_releases_held_changes() {
        let (gate, seen) = recording();
        gate.offer(1, 7);
        gate.open(0, None);
        gate.open(5, Some(50));
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn reentrant_offer_is_delivered_after_the_current_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let gate: Arc<Mutex<Option<Arc<ReplayGate<i32>>>>> = Arc::new(Mutex::new(None));
        let (s, g) = (Arc::clone(&seen), Arc::clone(&gate));
        let inner = Arc::new(ReplayGate::new(move |v: i32| {
            s.lock().unwrap().push(v);
            if v == 1 {
                let gate = g.lock().unwrap().clone();
                if let Some(gate) = gate {
                    gate.offer(2, 2);
                }
            }
            s.lock().unwrap().push(-v);
        }));
        *gate.lock().unwrap() = Some(Arc::clone(&inner));

        inner.open(1, Some(1));
        assert_eq!(*seen.lock().unwrap(), vec![1, -1, 2, -2]);
        *gate.lock().unwrap() = None;
    }
}
