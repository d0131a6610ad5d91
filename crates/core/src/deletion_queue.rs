//! Deferred, ordered resource release.
//!
//! A [`DeletionQueue`] collects release actions as resources are created and
//! runs them newest-first when flushed, so an object is always destroyed
//! before anything it was built from.

use tracing::{trace, warn};

/// A release action. Runs at most once.
pub type Deleter = Box<dyn FnOnce()>;

/// LIFO stack of release actions.
///
/// Actions only run on [`flush`](Self::flush). Dropping a queue that still
/// holds actions leaks them and logs a warning.
#[derive(Default)]
pub struct DeletionQueue {
    name: &'static str,
    deleters: Vec<Deleter>,
}

impl DeletionQueue {
    /// Creates an empty queue. `name` only shows up in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            deleters: Vec::new(),
        }
    }

    /// Registers a release action.
    pub fn push(&mut self, deleter: impl FnOnce() + 'static) {
        self.deleters.push(Box::new(deleter));
    }

    /// Runs every pending action in reverse registration order and empties
    /// the queue. Flushing an empty queue does nothing.
    pub fn flush(&mut self) {
        if self.deleters.is_empty() {
            return;
        }
        trace!(queue = self.name, count = self.deleters.len(), "Flushing deletion queue");
        while let Some(deleter) = self.deleters.pop() {
            deleter();
        }
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.deleters.len()
    }

    /// Returns `true` when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.deleters.is_empty()
    }
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("name", &self.name)
            .field("pending", &self.deleters.len())
            .finish()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.deleters.is_empty() {
            warn!(
                queue = self.name,
                pending = self.deleters.len(),
                "Deletion queue dropped without flush; resources leaked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn recording_queue(count: usize) -> (DeletionQueue, Rc<RefCell<Vec<usize>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = DeletionQueue::new("test");
        for i in 0..count {
            let log = Rc::clone(&log);
            queue.push(move || log.borrow_mut().push(i));
        }
        (queue, log)
    }

    #[test]
    fn test_flush_runs_in_reverse_order() {
        let (mut queue, log) = recording_queue(5);
        assert_eq!(queue.len(), 5);

        queue.flush();

        assert_eq!(*log.borrow(), vec![4, 3, 2, 1, 0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_second_flush_runs_nothing() {
        let (mut queue, log) = recording_queue(3);
        queue.flush();
        queue.flush();
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn test_flush_empty_queue_is_noop() {
        let mut queue = DeletionQueue::new("empty");
        queue.flush();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_actions_pushed_after_flush_run_on_next_flush() {
        let (mut queue, log) = recording_queue(2);
        queue.flush();

        let late = Rc::clone(&log);
        queue.push(move || late.borrow_mut().push(99));
        queue.flush();

        assert_eq!(*log.borrow(), vec![1, 0, 99]);
    }

    #[test]
    fn test_drop_does_not_run_actions() {
        let (queue, log) = recording_queue(2);
        drop(queue);
        assert!(log.borrow().is_empty());
    }
}
