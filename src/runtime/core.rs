//! The runtime: executes a main future plus all spawned script tasks on
//! one thread.
//!
//! `block_on` drives the main future and, between its polls, drains the
//! ready-task queue, dispatches reactor events, and fires due timers. When
//! everything is parked it waits in the poller, bounded by the earliest
//! timer deadline, so a suspended runtime consumes no CPU.

use crate::builder::RuntimeBuilder;
use crate::reactor::core::{Reactor, clear_current_reactor, set_current_reactor};
use crate::runtime::{Executor, TaskQueue, enter_context, enter_task};
use crate::task::{JoinHandle, Task, TaskId, TaskState};
use crate::timer;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

// Upper bound on one poller wait, so queue pushes from helper threads are
// picked up even with no timer registered.
const MAX_IDLE_WAIT: Duration = Duration::from_millis(100);

/// Wake flag for the main future: waking records a notification the loop
/// checks before deciding to block.
#[derive(Default)]
struct NotifyFlag {
    notified: AtomicBool,
}

impl NotifyFlag {
    fn take(&self) -> bool {
        self.notified.swap(false, Ordering::SeqCst)
    }
}

impl Wake for NotifyFlag {
    fn wake(self: Arc<Self>) {
        self.notified.store(true, Ordering::SeqCst);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notified.store(true, Ordering::SeqCst);
    }
}

/// Single-threaded cooperative runtime.
///
/// Owns the ready queue, the executor draining it, and the epoll reactor.
/// Many script tasks interleave on it; a task runs until it issues a
/// suspending call, and is resumed when its awaited event, deadline, or
/// mutex grant arrives.
pub struct Runtime {
    queue: Arc<TaskQueue>,
    executor: Executor,
    reactor: Reactor,
}

impl Runtime {
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    pub(crate) fn from_parts() -> Self {
        let queue = Arc::new(TaskQueue::new());
        let executor = Executor::new(queue.clone());
        let reactor = Reactor::new();

        Self {
            queue,
            executor,
            reactor,
        }
    }

    /// Spawns a background task before or outside `block_on`.
    ///
    /// The task starts running once `block_on` drives the runtime.
    pub fn spawn<T, F>(&self, fut: F) -> JoinHandle<T>
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        enter_context(self.queue.clone(), || Task::spawn(fut))
    }

    /// Runs the given future to completion, interleaving all spawned tasks.
    ///
    /// Establishes the runtime context for this thread: tasks spawned
    /// within the future can use `Task::spawn` without a runtime
    /// reference, and suspending I/O finds the reactor through it. The
    /// main future runs under [`TaskId::MAIN`].
    pub fn block_on<F: Future>(&mut self, fut: F) -> F::Output {
        set_current_reactor(&mut self.reactor);

        let main_state = TaskState::new(TaskId::MAIN);

        let value = enter_context(self.queue.clone(), || {
            let mut fut = Box::pin(fut);

            let flag = Arc::new(NotifyFlag::default());
            let waker = Waker::from(flag.clone());
            let mut cx = Context::from_waker(&waker);

            loop {
                let polled = enter_task(main_state.clone(), || fut.as_mut().poll(&mut cx));
                if let Poll::Ready(val) = polled {
                    // Give spawned tasks a final pass before returning.
                    self.executor.run();
                    return val;
                }

                // Execute all ready tasks.
                self.executor.run();

                // Deliver I/O wakes promptly, then expire timers.
                self.reactor.poll_events();
                self.reactor.wake_ready();
                timer::fire_due();

                // The main future asked to be re-polled (yield, join wake).
                if flag.take() {
                    continue;
                }

                if !self.queue.is_empty() {
                    continue;
                }

                // Idle: wait for I/O, bounded by the next timer deadline.
                let wait = timer::until_next()
                    .map(|d| d.min(MAX_IDLE_WAIT))
                    .unwrap_or(MAX_IDLE_WAIT);

                if !wait.is_zero() {
                    self.reactor.wait_events(wait);
                    self.reactor.wake_ready();
                }

                timer::fire_due();
            }
        });

        clear_current_reactor();

        value
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
