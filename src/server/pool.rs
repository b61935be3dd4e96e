//! Slot accounting for live connections, plus the response-record free
//! stack.
//!
//! A slot is identified by `(index, generation)`. The generation increments
//! on every release, so a token that survived its slot (a sweeper force-
//! release, a late queue entry) can always be detected instead of touching
//! the slot's next occupant.

use crate::http::response::Response;
use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// The identity a connection carries through the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotToken {
    pub index: usize,
    pub generation: u64,
}

#[derive(Debug)]
struct Slot {
    occupied: bool,
    generation: u64,
    created: Instant,
}

#[derive(Debug)]
struct PoolInner {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

/// Fixed-capacity connection slot table. At most `capacity` slots are
/// occupied at any time; acquisition beyond that fails and the caller
/// answers 503.
#[derive(Debug)]
pub(crate) struct ConnectionPool {
    inner: Mutex<PoolInner>,
}

impl ConnectionPool {
    pub(crate) fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                occupied: false,
                generation: 0,
                created: Instant::now(),
            })
            .collect();
        // Popping from the back hands out low indices first.
        let free = (0..capacity).rev().collect();

        Self {
            inner: Mutex::new(PoolInner { slots, free }),
        }
    }

    /// O(1) allocation; `None` means the table is full.
    pub(crate) fn acquire(&self) -> Option<SlotToken> {
        let mut inner = self.inner.lock();
        let index = inner.free.pop()?;
        let slot = &mut inner.slots[index];
        slot.occupied = true;
        slot.created = Instant::now();
        Some(SlotToken {
            index,
            generation: slot.generation,
        })
    }

    /// True while the token still names the live occupant of its slot.
    pub(crate) fn validate(&self, token: SlotToken) -> bool {
        let inner = self.inner.lock();
        match inner.slots.get(token.index) {
            Some(slot) => slot.occupied && slot.generation == token.generation,
            None => false,
        }
    }

    /// Frees the slot and bumps the generation. A stale token (already
    /// force-released) is ignored and reported as `false`.
    pub(crate) fn release(&self, token: SlotToken) -> bool {
        let mut inner = self.inner.lock();
        let slot = match inner.slots.get_mut(token.index) {
            Some(slot) if slot.occupied && slot.generation == token.generation => slot,
            _ => return false,
        };
        slot.occupied = false;
        slot.generation += 1;
        inner.free.push(token.index);
        true
    }

    /// Force-releases every slot older than `max_age`; outstanding tokens
    /// for those slots become stale. Returns how many were swept.
    pub(crate) fn sweep_older_than(&self, max_age: Duration) -> usize {
        let mut inner = self.inner.lock();
        let mut swept = 0;
        for index in 0..inner.slots.len() {
            let slot = &mut inner.slots[index];
            if slot.occupied && slot.created.elapsed() > max_age {
                slot.occupied = false;
                slot.generation += 1;
                inner.free.push(index);
                swept += 1;
            }
        }
        swept
    }

    pub(crate) fn occupied(&self) -> usize {
        let inner = self.inner.lock();
        inner.slots.iter().filter(|s| s.occupied).count()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.inner.lock().slots.len()
    }
}

/// Bounded recycling stack for response records. Empty stack means a fresh
/// record, not a wait: capacity pressure is handled by the slot table, this
/// is only allocation reuse.
pub(crate) struct ResponsePool {
    free: ArrayQueue<Response>,
}

pub(crate) const RESPONSE_POOL_SIZE: usize = 256;

impl ResponsePool {
    pub(crate) fn new() -> Self {
        Self {
            free: ArrayQueue::new(RESPONSE_POOL_SIZE),
        }
    }

    pub(crate) fn acquire(&self) -> Response {
        self.free.pop().unwrap_or_else(Response::new)
    }

    pub(crate) fn release(&self, mut response: Response) {
        response.reset();
        let _ = self.free.push(response);
    }
}
