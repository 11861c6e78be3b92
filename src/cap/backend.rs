//! Capture sources behind a trait seam.
//!
//! The handle never talks to a device directly; it polls a
//! [`CaptureBackend`] for frames and parks on the backend's descriptor
//! between attempts. Production capture is an `AF_PACKET` raw socket;
//! [`MemoryCapture`] is a scripted frame queue for embedders and tests.

use crate::cap::LinkType;
use crate::error::{Failure, Status};
use crate::reactor::event::{Event, errno};

use libc::{
    AF_PACKET, EAGAIN, ETH_P_ALL, EWOULDBLOCK, PACKET_ADD_MEMBERSHIP, PACKET_MR_PROMISC,
    SOCK_RAW, SOL_PACKET, c_void, packet_mreq, sockaddr, sockaddr_ll,
};
use std::collections::VecDeque;
use std::ffi::CString;
use std::mem;
use std::sync::{Arc, Mutex};

const FRAME_MAX: usize = 65_536;

/// A source of captured link-layer frames.
pub trait CaptureBackend {
    /// One non-blocking read attempt; `Ok(None)` when nothing is queued.
    fn poll_frame(&mut self) -> Status<Option<Vec<u8>>>;

    /// Descriptor to park on between attempts, when the source has one.
    /// Sources without a descriptor are polled on a short timer.
    fn file_descriptor(&self) -> Option<i32>;

    fn link_type(&self) -> LinkType;
}

/// `AF_PACKET` raw-socket capture on a named interface.
pub struct AfPacketCapture {
    fd: i32,
    snaplen: usize,
}

impl AfPacketCapture {
    pub fn open(device: &str, snaplen: usize, promiscuous: bool) -> Status<Self> {
        let name =
            CString::new(device).map_err(|_| Failure::NoInterface(device.to_string()))?;

        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(Failure::NoInterface(device.to_string()));
        }

        let fd = unsafe {
            libc::socket(AF_PACKET, SOCK_RAW, (ETH_P_ALL as u16).to_be() as libc::c_int)
        };
        if fd < 0 {
            return Err(Failure::Error);
        }

        let mut addr: sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = AF_PACKET as libc::c_ushort;
        addr.sll_protocol = (ETH_P_ALL as u16).to_be();
        addr.sll_ifindex = ifindex as i32;

        let ret = unsafe {
            libc::bind(
                fd,
                &addr as *const sockaddr_ll as *const sockaddr,
                mem::size_of::<sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            unsafe { libc::close(fd) };
            return Err(Failure::Error);
        }

        if promiscuous {
            let mut req: packet_mreq = unsafe { mem::zeroed() };
            req.mr_ifindex = ifindex as i32;
            req.mr_type = PACKET_MR_PROMISC as libc::c_ushort;

            let ret = unsafe {
                libc::setsockopt(
                    fd,
                    SOL_PACKET,
                    PACKET_ADD_MEMBERSHIP,
                    &req as *const packet_mreq as *const c_void,
                    mem::size_of::<packet_mreq>() as libc::socklen_t,
                )
            };
            if ret < 0 {
                log::warn!("promiscuous mode refused on {device}");
            }
        }

        Event::set_nonblocking(fd);

        Ok(Self {
            fd,
            snaplen: snaplen.max(1),
        })
    }
}

impl CaptureBackend for AfPacketCapture {
    fn poll_frame(&mut self) -> Status<Option<Vec<u8>>> {
        let mut buf = vec![0u8; FRAME_MAX];
        let n = unsafe { libc::recv(self.fd, buf.as_mut_ptr() as *mut c_void, buf.len(), 0) };

        if n > 0 {
            buf.truncate((n as usize).min(self.snaplen));
            return Ok(Some(buf));
        }
        if n == 0 {
            return Err(Failure::Eof);
        }

        let err = errno();
        if err == EAGAIN || err == EWOULDBLOCK {
            return Ok(None);
        }
        Err(Failure::Error)
    }

    fn file_descriptor(&self) -> Option<i32> {
        Some(self.fd)
    }

    fn link_type(&self) -> LinkType {
        LinkType::Ethernet
    }
}

impl Drop for AfPacketCapture {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Scripted frame queue: frames pushed through the [`MemoryFeeder`] come
/// out of `poll_frame` in order.
pub struct MemoryCapture {
    frames: Arc<Mutex<VecDeque<Vec<u8>>>>,
    snaplen: usize,
    link: LinkType,
}

/// Producer half of a [`MemoryCapture`].
#[derive(Clone)]
pub struct MemoryFeeder {
    frames: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl MemoryFeeder {
    pub fn push(&self, frame: impl Into<Vec<u8>>) {
        self.frames.lock().unwrap().push_back(frame.into());
    }
}

impl MemoryCapture {
    pub fn new(snaplen: usize, link: LinkType) -> (Self, MemoryFeeder) {
        let frames = Arc::new(Mutex::new(VecDeque::new()));
        let feeder = MemoryFeeder {
            frames: frames.clone(),
        };

        (
            Self {
                frames,
                snaplen: snaplen.max(1),
                link,
            },
            feeder,
        )
    }
}

impl CaptureBackend for MemoryCapture {
    fn poll_frame(&mut self) -> Status<Option<Vec<u8>>> {
        let mut frames = self.frames.lock().unwrap();
        Ok(frames.pop_front().map(|mut frame| {
            frame.truncate(self.snaplen);
            frame
        }))
    }

    fn file_descriptor(&self) -> Option<i32> {
        None
    }

    fn link_type(&self) -> LinkType {
        self.link
    }
}
