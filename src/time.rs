//! Deadline wrapper for suspending operations.
//!
//! Every suspending call in this runtime carries a deadline derived from
//! its socket's or capture handle's configured timeout; [`timeout`] is the
//! combinator they all go through. Expiry resolves the call as
//! `Err(Failure::Timeout)` — the inner future is dropped, cancelling its
//! event registration interest.

use crate::error::Failure;
use crate::timer;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Wraps a future with a deadline `duration` from now.
pub fn timeout<F>(duration: Duration, future: F) -> Timeout<F>
where
    F: Future,
{
    Timeout {
        future,
        deadline: Instant::now() + duration,
        registered: false,
    }
}

/// Like [`timeout`], but with an absolute deadline. Used by multi-step
/// operations that spread one configured timeout over several waits.
pub(crate) fn deadline<F>(deadline: Instant, future: F) -> Timeout<F>
where
    F: Future,
{
    Timeout {
        future,
        deadline,
        registered: false,
    }
}

/// Future returned by [`timeout`]: polls the inner future until it
/// completes or the deadline is reached.
pub struct Timeout<F> {
    future: F,
    deadline: Instant,
    registered: bool,
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, Failure>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(Err(Failure::Timeout));
        }

        let fut = unsafe { self.as_mut().map_unchecked_mut(|s| &mut s.future) };
        if let Poll::Ready(v) = fut.poll(cx) {
            return Poll::Ready(Ok(v));
        }

        if !self.registered {
            timer::register(self.deadline, cx.waker().clone());

            unsafe {
                let this = self.get_unchecked_mut();
                this.registered = true;
            }
        }

        Poll::Pending
    }
}
