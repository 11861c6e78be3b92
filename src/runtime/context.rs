//! Thread-local runtime context: current task queue and current task.
//!
//! Set by the runtime around `block_on` and by the executor around every
//! task poll. `Task::spawn` reads the queue; the mutex registry and the
//! try/catch adapter read the current task's shared state.

use crate::runtime::queue::TaskQueue;
use crate::task::TaskState;

use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// The task queue of the runtime currently executing on this thread.
    pub(crate) static CURRENT_QUEUE: RefCell<Option<Arc<TaskQueue>>> = const { RefCell::new(None) };

    /// Shared state of the task currently being polled on this thread.
    static CURRENT_TASK: RefCell<Option<Arc<TaskState>>> = const { RefCell::new(None) };
}

/// Enters a runtime context for the duration of `function`.
///
/// Called by the runtime at each `block_on`; the previous context is
/// restored on exit so nested runtimes behave.
pub(crate) fn enter_context<F, R>(queue: Arc<TaskQueue>, function: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_QUEUE.with(|current| {
        let previous = current.borrow_mut().replace(queue);

        let result = function();

        *current.borrow_mut() = previous;

        result
    })
}

/// Marks `state` as the currently polled task for the duration of
/// `function`.
pub(crate) fn enter_task<F, R>(state: Arc<TaskState>, function: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_TASK.with(|current| {
        let previous = current.borrow_mut().replace(state);

        let result = function();

        *current.borrow_mut() = previous;

        result
    })
}

/// Shared state of the task being polled right now, if any.
pub(crate) fn current_task() -> Option<Arc<TaskState>> {
    CURRENT_TASK.with(|current| current.borrow().clone())
}
