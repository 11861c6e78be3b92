//! Try/catch adapter: first failure terminates the calling task.
//!
//! Every fallible operation in this crate returns a [`Status`]. Scripts
//! that want "abort the whole task on first failure" semantics route their
//! calls through an adapter built by [`new_try`]/[`new_try_with`], so call
//! sites read as unchecked sequential code:
//!
//! ```ignore
//! let mut check = new_try_with(move || cleanup_socket());
//! check.check(socket.connect("example.org", 80, "tcp").await).await;
//! check.check(socket.send(b"ping").await).await;
//! ```
//!
//! On `Err`, the adapter runs its cleanup (once), then terminates the
//! calling task, surfacing the failure as the task's termination reason —
//! visible to whoever awaits the task's `JoinHandle`. Other tasks are
//! unaffected.

use crate::error::{Failure, Status};
use crate::runtime::current_task;
use crate::task::TaskId;

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Adapter produced by [`new_try`] / [`new_try_with`].
pub struct TryCatch {
    cleanup: Option<Box<dyn FnOnce()>>,
}

/// Builds an adapter with no cleanup action.
pub fn new_try() -> TryCatch {
    TryCatch { cleanup: None }
}

/// Builds an adapter that runs `cleanup` before terminating the task.
pub fn new_try_with<F>(cleanup: F) -> TryCatch
where
    F: FnOnce() + 'static,
{
    TryCatch {
        cleanup: Some(Box::new(cleanup)),
    }
}

impl TryCatch {
    /// Unwraps `result`, or terminates the calling task.
    ///
    /// `Ok(value)` passes the value through. `Err(why)` invokes the
    /// cleanup action (if any, exactly once across the adapter's
    /// lifetime), then terminates the calling task with `why` as its
    /// termination reason; the `await` never returns in that case.
    ///
    /// # Panics
    /// Panics when a failure is checked outside of a spawned task — the
    /// main `block_on` future has no task to terminate.
    pub async fn check<T>(&mut self, result: Status<T>) -> T {
        match result {
            Ok(value) => value,
            Err(why) => {
                if let Some(cleanup) = self.cleanup.take() {
                    cleanup();
                }
                Terminate {
                    reason: Some(why),
                    _marker: PhantomData,
                }
                .await
            }
        }
    }
}

/// Never-ready future that flags the current task for teardown.
///
/// The wake re-queues the task; the executor then drops its future instead
/// of polling it, releasing owned resources and held mutexes.
struct Terminate<T> {
    reason: Option<Failure>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Future for Terminate<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(reason) = self.reason.take() {
            let state = current_task()
                .expect("new_try failure checked outside of a runtime context");

            if state.id == TaskId::MAIN {
                panic!("new_try cannot terminate the main block_on future: {reason}");
            }

            state.request_abort(reason);
            cx.waker().wake_by_ref();
        }

        Poll::Pending
    }
}
