//! Name resolution and sockaddr conversion.
//!
//! Resolution goes straight to `getaddrinfo`; its return codes are the
//! documented fixed error strings scripts see from `connect`. Numeric
//! addresses short-circuit the resolver entirely.

use crate::error::{Failure, ResolveError};

use libc::{AF_INET, AF_INET6, sockaddr_in, sockaddr_in6, sockaddr_storage, socklen_t};
use std::ffi::CString;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::ptr;

/// Resolves `host` to candidate addresses for the given socket type.
pub(crate) fn resolve(
    host: &str,
    port: u16,
    socktype: libc::c_int,
) -> Result<Vec<SocketAddr>, Failure> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let node = CString::new(host).map_err(|_| Failure::Resolve(ResolveError::NoName))?;
    let service = CString::new(port.to_string()).expect("port string has no NUL");

    let mut hints: libc::addrinfo = unsafe { mem::zeroed() };
    hints.ai_family = libc::AF_UNSPEC;
    hints.ai_socktype = socktype;

    let mut result: *mut libc::addrinfo = ptr::null_mut();
    let rc = unsafe { libc::getaddrinfo(node.as_ptr(), service.as_ptr(), &hints, &mut result) };
    if rc != 0 {
        return Err(Failure::Resolve(ResolveError::from_code(rc)));
    }

    let mut addrs = Vec::new();
    let mut cursor = result;
    while !cursor.is_null() {
        let info = unsafe { &*cursor };

        // ai_addr is sized per family; only read the matching layout.
        if !info.ai_addr.is_null() {
            match info.ai_family {
                AF_INET => {
                    let sin = unsafe { &*(info.ai_addr as *const sockaddr_in) };
                    let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                    addrs.push(SocketAddr::new(IpAddr::V4(ip), u16::from_be(sin.sin_port)));
                }
                AF_INET6 => {
                    let sin6 = unsafe { &*(info.ai_addr as *const sockaddr_in6) };
                    let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                    addrs.push(SocketAddr::new(IpAddr::V6(ip), u16::from_be(sin6.sin6_port)));
                }
                _ => {}
            }
        }

        cursor = info.ai_next;
    }

    unsafe { libc::freeaddrinfo(result) };

    if addrs.is_empty() {
        return Err(Failure::Resolve(ResolveError::NoData));
    }

    Ok(addrs)
}

pub(crate) fn sockaddr_to_addr(storage: &sockaddr_storage) -> Option<SocketAddr> {
    match storage.ss_family as libc::c_int {
        AF_INET => {
            let sin = unsafe { &*(storage as *const sockaddr_storage as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
            Some(SocketAddr::new(IpAddr::V4(ip), u16::from_be(sin.sin_port)))
        }
        AF_INET6 => {
            let sin6 = unsafe { &*(storage as *const sockaddr_storage as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            Some(SocketAddr::new(IpAddr::V6(ip), u16::from_be(sin6.sin6_port)))
        }
        _ => None,
    }
}

pub(crate) fn addr_to_sockaddr(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin =
                unsafe { &mut *(&mut storage as *mut sockaddr_storage as *mut sockaddr_in) };
            sin.sin_family = AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr = libc::in_addr {
                s_addr: u32::from(*v4.ip()).to_be(),
            };
            mem::size_of::<sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let sin6 =
                unsafe { &mut *(&mut storage as *mut sockaddr_storage as *mut sockaddr_in6) };
            sin6.sin6_family = AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_addr = libc::in6_addr {
                s6_addr: v6.ip().octets(),
            };
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_scope_id = v6.scope_id();
            mem::size_of::<sockaddr_in6>()
        }
    };

    (storage, len as socklen_t)
}
