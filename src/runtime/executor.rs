//! Drains the ready queue, polling each task once per pass.

use crate::runtime::TaskQueue;

use std::sync::Arc;

pub(crate) struct Executor {
    queue: Arc<TaskQueue>,
}

impl Executor {
    pub(crate) fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue }
    }

    /// Polls ready tasks until the queue is empty.
    ///
    /// A task that wakes itself while being polled lands at the back of the
    /// queue and is picked up in the same pass, so a `run` only returns
    /// when every task is parked on an event, a timer, or a mutex.
    pub(crate) fn run(&self) {
        while let Some(task) = self.queue.pop() {
            task.poll();
        }
    }
}
