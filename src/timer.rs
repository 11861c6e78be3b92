//! Timer driver: deadlines and sleep futures for the runtime.
//!
//! Deadlines are kept in a thread-local list of (deadline, waker) pairs.
//! The runtime loop calls [`fire_due`] each tick to wake tasks whose
//! deadline passed, and [`until_next`] to bound how long it may block in
//! the poller while timers are outstanding. Registering is O(1); firing
//! scans the list, which stays small at the scale of one cooperative
//! runtime per thread.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

thread_local! {
    static TIMERS: RefCell<Timers> = RefCell::new(Timers::new());
}

struct Timers {
    deadlines: Vec<(Instant, Waker)>,
}

impl Timers {
    fn new() -> Self {
        Self {
            deadlines: Vec::new(),
        }
    }

    fn register(&mut self, deadline: Instant, waker: Waker) {
        self.deadlines.push((deadline, waker));
    }

    fn fire_due(&mut self) -> bool {
        let now = Instant::now();
        self.deadlines.retain(|(deadline, waker)| {
            if now >= *deadline {
                waker.wake_by_ref();
                false
            } else {
                true
            }
        });
        !self.deadlines.is_empty()
    }

    fn until_next(&self) -> Option<Duration> {
        let now = Instant::now();
        self.deadlines
            .iter()
            .map(|(deadline, _)| deadline.saturating_duration_since(now))
            .min()
    }
}

/// Registers a waker to be woken once `deadline` has passed.
pub(crate) fn register(deadline: Instant, waker: Waker) {
    TIMERS.with(|timers| timers.borrow_mut().register(deadline, waker));
}

/// Wakes every timer whose deadline has passed. Returns whether any timers
/// remain registered.
pub(crate) fn fire_due() -> bool {
    TIMERS.with(|timers| timers.borrow_mut().fire_due())
}

/// Time remaining until the earliest registered deadline, if any.
pub(crate) fn until_next() -> Option<Duration> {
    TIMERS.with(|timers| timers.borrow().until_next())
}

/// Future that completes once its deadline has passed.
///
/// Registers with the timer driver on first poll and is woken by the
/// runtime loop; re-polls check the clock, so spurious wakes are harmless.
#[derive(Debug)]
pub struct Sleep {
    deadline: Instant,
    registered: bool,
}

impl Sleep {
    pub fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
            registered: false,
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }

        if !self.registered {
            register(self.deadline, cx.waker().clone());
            self.registered = true;
        }

        Poll::Pending
    }
}

/// Suspends the current task for `duration`.
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(duration)
}
