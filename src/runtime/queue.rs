//! Thread-safe FIFO queue of ready tasks.

use crate::task::Runnable;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// FIFO queue of tasks that are ready to be polled.
///
/// Wakers may fire from helper threads (a peer thread writing into a pipe,
/// a test harness), so the queue is Mutex-protected even though tasks are
/// only ever polled on the runtime thread.
pub(crate) struct TaskQueue {
    queue: Mutex<VecDeque<Arc<dyn Runnable>>>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueues a task at the back. Tasks run in the order they were made
    /// ready.
    pub(crate) fn push(&self, task: Arc<dyn Runnable>) {
        self.queue.lock().unwrap().push_back(task);
    }

    /// Dequeues the next ready task, or None when idle.
    pub(crate) fn pop(&self) -> Option<Arc<dyn Runnable>> {
        self.queue.lock().unwrap().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}
