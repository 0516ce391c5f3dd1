//! Per-thread bookkeeping of throttler callbacks in progress.
//!
//! A throttler runs its callback while holding its own lock. Any attempt from
//! that callback to lock the same throttler again would block forever, so the
//! throttler marks itself as dispatching on the current thread for the duration
//! of the callback and checks the mark before locking.

use std::cell::RefCell;

thread_local! {
    static DISPATCHING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Returns `true` if the throttler identified by `id` is running its callback
/// on the current thread.
pub(crate) fn is_dispatching(id: usize) -> bool {
    DISPATCHING.with(|ids| ids.borrow().contains(&id))
}

/// Marks `id` as dispatching until the guard is dropped, including on unwind.
pub(crate) struct DispatchGuard {
    id: usize,
}

impl DispatchGuard {
    pub(crate) fn enter(id: usize) -> Self {
        DISPATCHING.with(|ids| ids.borrow_mut().push(id));
        DispatchGuard { id }
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|ids| {
            let mut ids = ids.borrow_mut();
            if let Some(pos) = ids.iter().rposition(|&id| id == self.id) {
                ids.remove(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_marks_and_clears() {
        assert!(!is_dispatching(7));
        {
            let _guard = DispatchGuard::enter(7);
            assert!(is_dispatching(7));
            assert!(!is_dispatching(8));
        }
        assert!(!is_dispatching(7));
    }

    #[test]
    fn nested_guards_for_different_ids() {
        let outer = DispatchGuard::enter(1);
        let inner = DispatchGuard::enter(2);
        assert!(is_dispatching(1) && is_dispatching(2));
        drop(inner);
        assert!(is_dispatching(1));
        assert!(!is_dispatching(2));
        drop(outer);
        assert!(!is_dispatching(1));
    }

    #[test]
    fn guard_is_per_thread() {
        let _guard = DispatchGuard::enter(42);
        let seen = std::thread::spawn(|| is_dispatching(42)).join().unwrap();
        assert!(!seen);
    }

    #[test]
    fn guard_clears_on_unwind() {
        let result = std::panic::catch_unwind(|| {
            let _guard = DispatchGuard::enter(9);
            panic!("callback failed");
        });
        assert!(result.is_err());
        assert!(!is_dispatching(9));
    }
}
