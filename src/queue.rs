//! Bounded-parallelism queue with priority bands.
//!
//! [`ConcurrencyQueue`] caps the number of outbound provider calls in
//! flight at once. When at capacity, callers park in one of three
//! priority bands; a released slot always goes to the first waiter in
//! the highest non-empty band (High before Normal before Low, FIFO
//! within a band), so background preloads never starve user-triggered
//! work.
//!
//! Slots are RAII [`Permit`]s. A permit handed to a waiter that gave up
//! (dropped its acquire future) is reclaimed and passed along, so
//! cancelled waiters cannot leak capacity.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::types::Priority;

fn band(priority: Priority) -> usize {
    match priority {
        Priority::High => 0,
        Priority::Normal => 1,
        Priority::Low => 2,
    }
}

struct State {
    active: usize,
    bands: [VecDeque<oneshot::Sender<Permit>>; 3],
}

struct Inner {
    limit: usize,
    state: Mutex<State>,
}

/// Bounds concurrent outbound calls; waiters drain in priority order.
#[derive(Clone)]
pub struct ConcurrencyQueue {
    inner: Arc<Inner>,
}

/// An occupied concurrency slot. Dropping it hands the slot to the
/// next waiter, or frees it when nobody is waiting.
///
/// `inner` is `None` only for a disarmed permit: one that bounced off
/// a cancelled waiter's channel and must not release the slot again.
pub struct Permit {
    inner: Option<Arc<Inner>>,
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("armed", &self.inner.is_some())
            .finish()
    }
}

impl ConcurrencyQueue {
    /// Create a queue allowing `limit` concurrent permits (minimum 1).
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                limit: limit.max(1),
                state: Mutex::new(State {
                    active: 0,
                    bands: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
                }),
            }),
        }
    }

    /// Acquire a slot, waiting in the given priority band if at capacity.
    pub async fn acquire(&self, priority: Priority) -> Permit {
        let rx = {
            let mut state = self.inner.state.lock();
            if state.active < self.inner.limit {
                state.active += 1;
                return Permit {
                    inner: Some(Arc::clone(&self.inner)),
                };
            }
            let (tx, rx) = oneshot::channel();
            state.bands[band(priority)].push_back(tx);
            rx
        };
        match rx.await {
            Ok(permit) => permit,
            // Unreachable while the queue is alive; claim a fresh slot.
            Err(_) => {
                self.inner.state.lock().active += 1;
                Permit {
                    inner: Some(Arc::clone(&self.inner)),
                }
            }
        }
    }

    /// Number of permits currently held.
    pub fn active(&self) -> usize {
        self.inner.state.lock().active
    }

    /// Number of callers parked across all bands.
    pub fn waiting(&self) -> usize {
        self.inner.state.lock().bands.iter().map(VecDeque::len).sum()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return; // disarmed below
        };
        let mut state = inner.state.lock();
        for waiters in state.bands.iter_mut() {
            while let Some(tx) = waiters.pop_front() {
                if tx.is_closed() {
                    continue; // waiter gave up
                }
                let next = Permit {
                    inner: Some(Arc::clone(&inner)),
                };
                match tx.send(next) {
                    Ok(()) => return,
                    // Waiter vanished between the check and the send.
                    // Disarm the bounced permit so dropping it here does
                    // not re-enter the lock, and try the next one.
                    Err(mut unclaimed) => unclaimed.inner = None,
                }
            }
        }
        state.active -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn permits_up_to_limit_without_waiting() {
        let queue = ConcurrencyQueue::new(2);
        let a = queue.acquire(Priority::Normal).await;
        let b = queue.acquire(Priority::Normal).await;
        assert_eq!(queue.active(), 2);
        drop((a, b));
        assert_eq!(queue.active(), 0);
    }

    #[tokio::test]
    async fn released_slot_goes_to_high_priority_first() {
        let queue = ConcurrencyQueue::new(1);
        let held = queue.acquire(Priority::High).await;

        let mut low = task::spawn(queue.acquire(Priority::Low));
        assert_pending!(low.poll());
        let mut normal = task::spawn(queue.acquire(Priority::Normal));
        assert_pending!(normal.poll());
        let mut high = task::spawn(queue.acquire(Priority::High));
        assert_pending!(high.poll());
        assert_eq!(queue.waiting(), 3);

        drop(held);
        let high_permit = assert_ready!(high.poll());
        assert_pending!(normal.poll());

        drop(high_permit);
        let normal_permit = assert_ready!(normal.poll());
        assert_pending!(low.poll());

        drop(normal_permit);
        let _low_permit = assert_ready!(low.poll());
    }

    #[tokio::test]
    async fn fifo_within_a_band() {
        let queue = ConcurrencyQueue::new(1);
        let held = queue.acquire(Priority::Normal).await;

        let mut first = task::spawn(queue.acquire(Priority::Normal));
        assert_pending!(first.poll());
        let mut second = task::spawn(queue.acquire(Priority::Normal));
        assert_pending!(second.poll());

        drop(held);
        let _first_permit = assert_ready!(first.poll());
        assert_pending!(second.poll());
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_the_slot() {
        let queue = ConcurrencyQueue::new(1);
        let held = queue.acquire(Priority::Normal).await;

        let mut quitter = task::spawn(queue.acquire(Priority::Normal));
        assert_pending!(quitter.poll());
        let mut patient = task::spawn(queue.acquire(Priority::Normal));
        assert_pending!(patient.poll());

        drop(quitter); // gives up before the slot frees
        drop(held);
        let patient_permit = assert_ready!(patient.poll());
        assert_eq!(queue.active(), 1);
        drop(patient_permit);
        assert_eq!(queue.active(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiters_leave_no_references_behind() {
        let queue = ConcurrencyQueue::new(1);
        let held = queue.acquire(Priority::Normal).await;

        for _ in 0..4 {
            let mut quitter = task::spawn(queue.acquire(Priority::Normal));
            assert_pending!(quitter.poll());
            drop(quitter);
        }

        drop(held);
        assert_eq!(queue.active(), 0);
        assert_eq!(queue.waiting(), 0);
        // Once every permit is gone, the queue handle holds the only
        // reference to the shared state.
        assert_eq!(Arc::strong_count(&queue.inner), 1);
    }
}
