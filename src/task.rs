//! Script tasks: independently schedulable units of cooperative execution.
//!
//! A [`Task`] wraps a future together with the bookkeeping the scheduler
//! needs to suspend, resume, and tear it down. Tasks are spawned with
//! [`Task::spawn`] from inside a runtime context and handed back as a
//! [`JoinHandle`], which can be awaited for the task's outcome or used to
//! kill the task at its next suspension point.
//!
//! # Lifecycle
//!
//! 1. A future is wrapped in a [`Task`] and enqueued on the runtime's queue
//! 2. The executor polls it with a waker that re-queues it on wake
//! 3. Suspending calls register (waker, event source, deadline) triples and
//!    return `Poll::Pending`
//! 4. When the awaited event fires, the reactor or timer driver wakes the
//!    task and the executor polls it again
//! 5. On completion — or on abort — held mutexes are released and any task
//!    awaiting the [`JoinHandle`] is woken
//!
//! # Termination
//!
//! [`JoinHandle::kill`] (and the try/catch adapter, which terminates its own
//! task) marks the task aborted and re-queues it. The executor then drops
//! the future without polling it, which releases every socket and capture
//! handle the task owns, and the mutex registry releases anything the task
//! held, waking the next FIFO waiter. The handle resolves `Err` with the
//! termination reason.

use crate::error::Failure;
use crate::runtime::{CURRENT_QUEUE, TaskQueue, enter_task, make_waker};
use crate::sync;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a schedulable task.
///
/// The main future driven by `block_on` runs as [`TaskId::MAIN`]; spawned
/// tasks get monotonically increasing ids. Mutex holdership and `holder()`
/// introspection are reported in terms of this identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    /// The identity under which the main `block_on` future runs.
    pub const MAIN: TaskId = TaskId(0);

    pub(crate) fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shared, non-generic per-task state.
///
/// Exposed through a thread-local while the task is being polled so that
/// the mutex registry and the try/catch adapter can address the running
/// task without knowing its output type.
pub(crate) struct TaskState {
    pub(crate) id: TaskId,
    pub(crate) abort_requested: AtomicBool,
    pub(crate) abort_reason: Mutex<Option<Failure>>,
}

impl TaskState {
    pub(crate) fn new(id: TaskId) -> Arc<Self> {
        Arc::new(Self {
            id,
            abort_requested: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
        })
    }

    /// Flags the task for teardown with the given reason. The first reason
    /// recorded wins.
    pub(crate) fn request_abort(&self, reason: Failure) {
        let mut slot = self.abort_reason.lock().unwrap();
        if slot.is_none() {
            *slot = Some(reason);
        }
        self.abort_requested.store(true, Ordering::Release);
    }
}

/// A spawned task wrapping a future with output `T`.
///
/// Constructed via [`Task::spawn`]; not built directly by user code.
pub struct Task<T> {
    pub(crate) state: Arc<TaskState>,
    future: Mutex<Option<Pin<Box<dyn Future<Output = T>>>>>,
    result: Mutex<Option<T>>,
    pub(crate) queue: Arc<TaskQueue>,
    completed: AtomicBool,
    waiters: Mutex<Vec<Waker>>,
}

// The future is only ever polled on the runtime thread, but the containing
// Arc crosses threads (wakers may be woken from helper threads). Every
// field is behind a Mutex or atomic, so sharing the wrapper is sound even
// when the wrapped future itself is not Send.
unsafe impl<T> Send for Task<T> {}
unsafe impl<T> Sync for Task<T> {}

impl<T: 'static> Task<T> {
    pub(crate) fn new<F>(fut: F, queue: Arc<TaskQueue>) -> Arc<Self>
    where
        F: Future<Output = T> + 'static,
    {
        Arc::new(Task {
            state: TaskState::new(TaskId::next()),
            future: Mutex::new(Some(Box::pin(fut))),
            result: Mutex::new(None),
            queue,
            completed: AtomicBool::new(false),
            waiters: Mutex::new(Vec::new()),
        })
    }

    /// Spawns a task on the current runtime context.
    ///
    /// Must be called from within a runtime context (inside the future given
    /// to `block_on`, or inside another spawned task).
    ///
    /// # Panics
    /// Panics if called outside of a runtime context.
    pub fn spawn<F>(future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + 'static,
    {
        CURRENT_QUEUE.with(|current| {
            let queue = current
                .borrow()
                .as_ref()
                .expect("Task::spawn() called outside of a runtime context")
                .clone();

            let task: Arc<Task<T>> = Task::new(future, queue.clone());
            let runnable: Arc<dyn Runnable> = task.clone();

            queue.push(runnable);

            JoinHandle { task }
        })
    }

    /// Polls the task once.
    ///
    /// If an abort was requested, the future is dropped without being
    /// polled: dropping it releases the sockets and capture handles the
    /// task owns, after which held mutexes are abandoned and join waiters
    /// are woken.
    pub(crate) fn poll(self: Arc<Self>) {
        if self.completed.load(Ordering::Acquire) {
            return;
        }

        if self.state.abort_requested.load(Ordering::Acquire) {
            self.future.lock().unwrap().take();
            self.finish();
            return;
        }

        let waker = make_waker(self.clone());
        let mut context = Context::from_waker(&waker);

        let mut future_slot = self.future.lock().unwrap();

        if let Some(mut future) = future_slot.take() {
            let state = self.state.clone();
            let polled = enter_task(state, || future.as_mut().poll(&mut context));

            match polled {
                Poll::Pending => {
                    if self.state.abort_requested.load(Ordering::Acquire) {
                        // Aborted from inside its own poll (try/catch
                        // adapter). Tear down now rather than waiting for
                        // the re-queue.
                        drop(future);
                        drop(future_slot);
                        self.finish();
                    } else {
                        *future_slot = Some(future);
                    }
                }
                Poll::Ready(val) => {
                    *self.result.lock().unwrap() = Some(val);
                    drop(future_slot);
                    self.finish();
                }
            }
        }
    }

    fn finish(&self) {
        sync::mutex::abandon(self.state.id);
        self.completed.store(true, Ordering::Release);

        let mut waiters = self.waiters.lock().unwrap();
        for w in waiters.drain(..) {
            w.wake();
        }
    }
}

/// Trait for objects the executor can poll, erasing the task output type.
pub(crate) trait Runnable: Send + Sync {
    fn poll(self: Arc<Self>);
}

impl<T: 'static> Runnable for Task<T> {
    fn poll(self: Arc<Self>) {
        Task::poll(self);
    }
}

/// Handle to a spawned task.
///
/// Awaiting the handle yields `Ok(value)` when the task ran to completion,
/// or `Err(reason)` when it was terminated — by [`JoinHandle::kill`] or by
/// the try/catch adapter.
pub struct JoinHandle<T> {
    task: Arc<Task<T>>,
}

impl<T: 'static> JoinHandle<T> {
    /// The identity of the spawned task.
    pub fn id(&self) -> TaskId {
        self.task.state.id
    }

    /// Forcibly terminates the task at its next scheduling point.
    ///
    /// The task's future is dropped without further polling: its sockets
    /// and capture handles are released, and any mutex it holds is handed
    /// to the next FIFO waiter. Awaiting the handle afterwards yields
    /// `Err(Failure::Killed)`.
    pub fn kill(&self) {
        self.task.state.request_abort(Failure::Killed);
        let runnable: Arc<dyn Runnable> = self.task.clone();
        self.task.queue.push(runnable);
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, Failure>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.task.completed.load(Ordering::SeqCst) {
            if let Some(val) = self.task.result.lock().unwrap().take() {
                return Poll::Ready(Ok(val));
            }

            let reason = self
                .task
                .state
                .abort_reason
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Failure::Killed);
            return Poll::Ready(Err(reason));
        }

        let mut ws = self.task.waiters.lock().unwrap();
        ws.push(cx.waker().clone());

        Poll::Pending
    }
}

/// Collects multiple [`JoinHandle`]s and awaits them in turn.
pub struct JoinSet<T> {
    handles: Vec<JoinHandle<T>>,
}

impl<T> JoinSet<T> {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, handle: JoinHandle<T>) {
        self.handles.push(handle);
    }

    /// Awaits every handle, draining progressively. Outcomes are discarded;
    /// use the individual handles when the results matter.
    pub async fn await_all(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

impl<T> Default for JoinSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
