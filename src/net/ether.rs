//! Synchronous raw-frame sends on a named interface.
//!
//! Unlike the socket and capture surfaces, raw sends never suspend: each
//! call completes (or fails) immediately, raising a descriptive failure
//! when the device or object is not in the required state.

use crate::error::{Failure, Status};

use libc::{AF_PACKET, ETH_P_ALL, SOCK_RAW, c_void, sockaddr, sockaddr_ll};
use std::ffi::CString;
use std::mem;

const ETHER_HEADER_LEN: usize = 14;

/// Raw-frame sender bound to one interface.
pub struct EthernetSender {
    fd: i32,
    ifindex: i32,
    device: String,
}

impl EthernetSender {
    /// Opens a raw send handle on `device`.
    pub fn open(device: &str) -> Status<Self> {
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

        Ok(Self {
            fd,
            ifindex: ifindex as i32,
            device: device.to_string(),
        })
    }

    /// Transmits one complete link-layer frame (destination MAC leading).
    pub fn send(&self, frame: &[u8]) -> Status<()> {
        if self.fd < 0 {
            return Err(Failure::DeviceNotOpen);
        }
        if frame.len() < ETHER_HEADER_LEN {
            return Err(Failure::Error);
        }

        let mut addr: sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = AF_PACKET as libc::c_ushort;
        addr.sll_ifindex = self.ifindex;
        addr.sll_halen = 6;
        addr.sll_addr[..6].copy_from_slice(&frame[..6]);

        let n = unsafe {
            libc::sendto(
                self.fd,
                frame.as_ptr() as *const c_void,
                frame.len(),
                0,
                &addr as *const sockaddr_ll as *const sockaddr,
                mem::size_of::<sockaddr_ll>() as libc::socklen_t,
            )
        };

        if n < 0 {
            log::warn!("raw send on {} failed", self.device);
            return Err(Failure::Error);
        }
        Ok(())
    }

    /// Releases the handle; further operations fail.
    pub fn close(&mut self) -> Status<()> {
        if self.fd < 0 {
            return Err(Failure::DeviceNotOpen);
        }

        unsafe { libc::close(self.fd) };
        self.fd = -1;
        Ok(())
    }
}

impl Drop for EthernetSender {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
        }
    }
}
