//! Cooperative reschedule point.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future that yields once, letting every other ready task run before the
/// caller resumes.
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }

        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Suspends the current task until the scheduler has given every other
/// ready task a turn.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}
