//! Single-holder lock for interactive workflows
//!
//! At most one workflow prompt (such as reviewing a freshly confirmed
//! proposal) may be open per session. Acquisition never waits: callers that
//! lose the race simply skip their prompt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Holder id meaning "free"
const FREE: u64 = 0;

#[derive(Debug, Clone, Default)]
pub struct WorkflowLock {
    holder: Arc<AtomicU64>,
    generation: Arc<AtomicU64>,
}

impl WorkflowLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock if nobody holds it
    pub fn try_acquire(&self) -> Option<WorkflowLockGuard> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.holder
            .compare_exchange(FREE, generation, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(WorkflowLockGuard {
            holder: Arc::clone(&self.holder),
            generation,
        })
    }

    pub fn is_held(&self) -> bool {
        self.holder.load(Ordering::SeqCst) != FREE
    }

    /// Release regardless of holder, e.g. on unmount or wallet disconnect.
    ///
    /// A guard outstanding from before the release becomes inert.
    pub fn force_release(&self) {
        if self.holder.swap(FREE, Ordering::SeqCst) != FREE {
            log::debug!("Workflow lock force-released");
        }
    }
}

/// Proof of holding the lock; releases on drop
#[derive(Debug)]
pub struct WorkflowLockGuard {
    holder: Arc<AtomicU64>,
    generation: u64,
}

impl WorkflowLockGuard {
    pub fn release(self) {}
}

impl Drop for WorkflowLockGuard {
    fn drop(&mut self) {
        // Only release if this guard is still the holder
        let _ = self.holder.compare_exchange(
            self.generation,
            FREE,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_holder() {
        let lock = WorkflowLock::new();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_held());
        assert!(lock.try_acquire().is_none());

        guard.release();
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_stale_guard_does_not_release_new_holder() {
        let lock = WorkflowLock::new();
        let stale = lock.try_acquire().unwrap();
        lock.force_release();

        let current = lock.try_acquire().unwrap();
        drop(stale);
        assert!(lock.is_held());

        drop(current);
        assert!(!lock.is_held());
    }

    #[test]
    fn test_clones_share_state() {
        let lock = WorkflowLock::new();
        let other = lock.clone();
        let _guard = lock.try_acquire().unwrap();
        assert!(other.try_acquire().is_none());
    }
}
