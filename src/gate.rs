//! Single-flight admission control
//!
//! At most one removal runs at a time. A second request is rejected, never
//! queued; callers that see [`BgRemovalError::Busy`](crate::BgRemovalError::Busy)
//! retry on their own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Atomically checked "free"/"held" flag
#[derive(Debug, Default)]
pub struct RequestGate {
    held: AtomicBool,
}

impl RequestGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition free -> held. Returns `false` without side effects when
    /// the gate is already held.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Transition held -> free. Idempotent.
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Acquire the gate and return a guard that releases it on drop
    #[must_use]
    pub fn lease(self: &Arc<Self>) -> Option<RequestLease> {
        if self.try_acquire() {
            tracing::trace!("request gate acquired");
            Some(RequestLease {
                gate: Arc::clone(self),
            })
        } else {
            None
        }
    }
}

/// Exclusive admission for one operation
///
/// Owned so it can move into a blocking task. Dropping it releases the gate
/// exactly once.
#[derive(Debug)]
pub struct RequestLease {
    gate: Arc<RequestGate>,
}

impl Drop for RequestLease {
    fn drop(&mut self) {
        self.gate.release();
        tracing::trace!("request gate released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_acquire_release_cycle() {
        let gate = RequestGate::new();
        assert!(gate.try_acquire());
        assert!(gate.is_held());
        assert!(!gate.try_acquire());
        assert!(!gate.try_acquire());

        gate.release();
        assert!(!gate.is_held());
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
    }

    #[test]
    fn test_release_is_idempotent() {
        let gate = RequestGate::new();
        gate.release();
        gate.release();
        assert!(!gate.is_held());
        assert!(gate.try_acquire());
        gate.release();
        gate.release();
        assert!(gate.try_acquire());
    }

    #[test]
    fn test_exactly_one_concurrent_acquire_succeeds() {
        const CALLERS: usize = 16;
        let gate = Arc::new(RequestGate::new());
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    gate.try_acquire()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);

        // Still held until someone releases
        assert!(!gate.try_acquire());
        gate.release();

        let second_round: Vec<bool> = (0..4).map(|_| gate.try_acquire()).collect();
        assert_eq!(second_round, vec![true, false, false, false]);
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let gate = Arc::new(RequestGate::new());
        {
            let lease = gate.lease();
            assert!(lease.is_some());
            assert!(gate.lease().is_none());
        }
        assert!(!gate.is_held());
        assert!(gate.lease().is_some());
    }

    #[test]
    fn test_lease_moves_across_threads() {
        let gate = Arc::new(RequestGate::new());
        let lease = gate.lease().unwrap();
        let handle = thread::spawn(move || {
            drop(lease);
        });
        handle.join().unwrap();
        assert!(!gate.is_held());
    }
}
