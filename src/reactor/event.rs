use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, F_GETFL, F_SETFL, O_NONBLOCK, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
    fcntl,
};

#[derive(Clone, Copy)]
#[repr(transparent)]
pub(crate) struct Event(epoll_event);

impl Event {
    pub(crate) const EMPTY: Self = Self(epoll_event { events: 0, u64: 0 });

    pub(crate) fn fd(&self) -> i32 {
        let ident = self.0.u64;
        ident as i32
    }

    pub(crate) fn readable(&self) -> bool {
        let flags = self.0.events;
        flags & (EPOLLIN as u32 | EPOLLERR as u32 | EPOLLHUP as u32) != 0
    }

    pub(crate) fn writable(&self) -> bool {
        let flags = self.0.events;
        flags & (EPOLLOUT as u32 | EPOLLERR as u32 | EPOLLHUP as u32) != 0
    }

    pub(crate) fn mask(read: bool, write: bool) -> u32 {
        let mut mask = 0u32;
        if read {
            mask |= EPOLLIN as u32;
        }
        if write {
            mask |= EPOLLOUT as u32;
        }
        mask
    }

    pub(crate) fn open_queue() -> i32 {
        unsafe { epoll_create1(EPOLL_CLOEXEC) }
    }

    /// Adds `fd` to the queue, falling back to modify when it is already
    /// registered.
    pub(crate) fn add(queue: i32, fd: i32, mask: u32) {
        let mut event = epoll_event {
            events: mask,
            u64: fd as u64,
        };

        let ret = unsafe { epoll_ctl(queue, EPOLL_CTL_ADD, fd, &mut event) };
        if ret < 0 && errno() == libc::EEXIST {
            unsafe { epoll_ctl(queue, EPOLL_CTL_MOD, fd, &mut event) };
        }
    }

    /// Updates `fd`'s interest mask, falling back to add when the kernel no
    /// longer knows the descriptor.
    pub(crate) fn modify(queue: i32, fd: i32, mask: u32) {
        let mut event = epoll_event {
            events: mask,
            u64: fd as u64,
        };

        let ret = unsafe { epoll_ctl(queue, EPOLL_CTL_MOD, fd, &mut event) };
        if ret < 0 && errno() == libc::ENOENT {
            unsafe { epoll_ctl(queue, EPOLL_CTL_ADD, fd, &mut event) };
        }
    }

    pub(crate) fn delete(queue: i32, fd: i32) {
        let mut event = epoll_event { events: 0, u64: 0 };

        unsafe { epoll_ctl(queue, EPOLL_CTL_DEL, fd, &mut event) };
    }

    /// Waits up to `timeout_ms` for events (0 polls, -1 blocks). Returns
    /// the number of events delivered; interruption by a signal counts as
    /// zero.
    pub(crate) fn wait(queue: i32, events: &mut [Event; 64], timeout_ms: i32) -> i32 {
        let n = unsafe {
            epoll_wait(
                queue,
                events.as_mut_ptr() as *mut epoll_event,
                events.len() as i32,
                timeout_ms,
            )
        };

        if n < 0 { 0 } else { n }
    }

    pub(crate) fn set_nonblocking(file_descriptor: i32) {
        let flags = unsafe { fcntl(file_descriptor, F_GETFL) };

        unsafe {
            fcntl(file_descriptor, F_SETFL, flags | O_NONBLOCK);
        }
    }
}

pub(crate) fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
