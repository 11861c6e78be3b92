//! Readiness futures for non-blocking file descriptors.
//!
//! A suspending I/O call attempts its syscall first; on `EAGAIN` it awaits
//! one of these futures, which probe the descriptor and park the task's
//! waker with the reactor until the descriptor is ready again. Callers
//! construct a fresh future for every wait, so a stale wake simply leads
//! to another probe.

use crate::reactor::core::with_current_reactor;

use libc::{POLLERR, POLLHUP, POLLIN, POLLOUT, pollfd};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

fn probe(file_descriptor: i32, events: i16) -> bool {
    let mut fds = pollfd {
        fd: file_descriptor,
        events,
        revents: 0,
    };

    let n = unsafe { libc::poll(&mut fds, 1, 0) };
    n > 0 && fds.revents & (events | POLLERR | POLLHUP) != 0
}

/// Resolves once the descriptor is readable (or in an error state).
pub(crate) struct ReadReady {
    file_descriptor: i32,
}

impl ReadReady {
    pub(crate) fn new(file_descriptor: i32) -> Self {
        Self { file_descriptor }
    }
}

impl Future for ReadReady {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if probe(self.file_descriptor, POLLIN) {
            return Poll::Ready(());
        }

        with_current_reactor(|r| r.register_read(self.file_descriptor, cx.waker().clone()))
            .expect("I/O readiness awaited outside of a runtime context");

        Poll::Pending
    }
}

/// Resolves once the descriptor is writable (or in an error state).
pub(crate) struct WriteReady {
    file_descriptor: i32,
}

impl WriteReady {
    pub(crate) fn new(file_descriptor: i32) -> Self {
        Self { file_descriptor }
    }
}

impl Future for WriteReady {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if probe(self.file_descriptor, POLLOUT) {
            return Poll::Ready(());
        }

        with_current_reactor(|r| r.register_write(self.file_descriptor, cx.waker().clone()))
            .expect("I/O readiness awaited outside of a runtime context");

        Poll::Pending
    }
}
