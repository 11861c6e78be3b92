use crate::reactor::event::Event;

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr;
use std::task::Waker;
use std::time::Duration;

thread_local! {
    /// Thread-local pointer to the current Runtime's reactor.
    static CURRENT_REACTOR_PTR: RefCell<*mut Reactor> = const { RefCell::new(ptr::null_mut()) };
}

pub(crate) fn set_current_reactor(r: &mut Reactor) {
    CURRENT_REACTOR_PTR.with(|cell| {
        *cell.borrow_mut() = r as *mut Reactor;
    });
}

pub(crate) fn clear_current_reactor() {
    CURRENT_REACTOR_PTR.with(|cell| {
        *cell.borrow_mut() = ptr::null_mut();
    });
}

pub(crate) fn with_current_reactor<R>(f: impl FnOnce(&mut Reactor) -> R) -> Option<R> {
    CURRENT_REACTOR_PTR.with(|cell| {
        let ptr = *cell.borrow();
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { f(&mut *ptr) })
        }
    })
}

#[derive(Default)]
struct FdWaiters {
    read: Option<Waker>,
    write: Option<Waker>,
}

/// Epoll-backed readiness dispatcher.
///
/// Each registered descriptor carries at most one read waker and one write
/// waker. Fired wakers are collected into a deferred list and released by
/// [`Reactor::wake_ready`] so dispatching never re-enters the registry
/// while it is being walked.
pub(crate) struct Reactor {
    queue: i32,
    events: [Event; 64],
    n_events: i32,
    registry: HashMap<i32, FdWaiters>,
    wakers: Vec<Waker>,
}

impl Reactor {
    pub(crate) fn new() -> Self {
        Self {
            queue: Event::open_queue(),
            events: [Event::EMPTY; 64],
            n_events: 0,
            registry: HashMap::new(),
            wakers: Vec::new(),
        }
    }

    pub(crate) fn register_read(&mut self, file_descriptor: i32, waker: Waker) {
        let waiters = self.registry.entry(file_descriptor).or_default();
        let known = waiters.read.is_some() || waiters.write.is_some();
        waiters.read = Some(waker);
        let mask = Event::mask(true, waiters.write.is_some());

        if known {
            Event::modify(self.queue, file_descriptor, mask);
        } else {
            Event::add(self.queue, file_descriptor, mask);
        }
    }

    pub(crate) fn register_write(&mut self, file_descriptor: i32, waker: Waker) {
        let waiters = self.registry.entry(file_descriptor).or_default();
        let known = waiters.read.is_some() || waiters.write.is_some();
        waiters.write = Some(waker);
        let mask = Event::mask(waiters.read.is_some(), true);

        if known {
            Event::modify(self.queue, file_descriptor, mask);
        } else {
            Event::add(self.queue, file_descriptor, mask);
        }
    }

    /// Drops all interest in a descriptor. Pending waiters are woken so
    /// their operations re-probe (and observe the close).
    pub(crate) fn forget(&mut self, file_descriptor: i32) {
        if let Some(waiters) = self.registry.remove(&file_descriptor) {
            if let Some(w) = waiters.read {
                self.wakers.push(w);
            }
            if let Some(w) = waiters.write {
                self.wakers.push(w);
            }
        }

        Event::delete(self.queue, file_descriptor);
    }

    /// Polls for I/O events without blocking and dispatches them.
    pub(crate) fn poll_events(&mut self) {
        let n_events = Event::wait(self.queue, &mut self.events, 0);
        if n_events <= 0 {
            return;
        }
        self.n_events = n_events;
        self.handle_events();
    }

    /// Blocks for I/O up to `timeout`, then dispatches whatever arrived.
    pub(crate) fn wait_events(&mut self, timeout: Duration) {
        let ms = timeout.as_millis().clamp(0, i32::MAX as u128) as i32;
        let n_events = Event::wait(self.queue, &mut self.events, ms);
        if n_events <= 0 {
            return;
        }
        self.n_events = n_events;
        self.handle_events();
    }

    /// Releases every waker collected during dispatch.
    pub(crate) fn wake_ready(&mut self) {
        for waker in self.wakers.drain(..) {
            waker.wake();
        }
    }

    fn handle_events(&mut self) {
        let count = self.n_events.max(0) as usize;
        self.n_events = 0;

        for i in 0..count {
            let event = self.events[i];
            let file_descriptor = event.fd();

            let waiters = match self.registry.get_mut(&file_descriptor) {
                Some(waiters) => waiters,
                None => continue,
            };

            if event.readable() {
                if let Some(w) = waiters.read.take() {
                    self.wakers.push(w);
                }
            }
            if event.writable() {
                if let Some(w) = waiters.write.take() {
                    self.wakers.push(w);
                }
            }

            let mask = Event::mask(waiters.read.is_some(), waiters.write.is_some());
            if mask == 0 {
                self.registry.remove(&file_descriptor);
                Event::delete(self.queue, file_descriptor);
            } else {
                Event::modify(self.queue, file_descriptor, mask);
            }
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.queue);
        }
    }
}
