//! The script-facing socket: blocking-looking calls over the non-blocking
//! reactor.
//!
//! Each suspending operation registers a single (waker, event source,
//! deadline) interest with the runtime and parks the calling task; no call
//! ever polls synchronously, so a slow peer stalls only its own task. The
//! per-socket timeout (default 30 s, floor 10 ms) bounds every suspending
//! call issued after it was set.
//!
//! State machine: unconnected → connecting → connected → closed. No I/O
//! method other than `connect`, `close`, `get_info` and `set_timeout` is
//! valid outside the connected state; `receive_buf` additionally serves
//! matches still sitting in the delimiter buffer.

use crate::builder;
use crate::error::{Failure, Status};
use crate::net::reader::{Delimiter, RecvBuffer};
use crate::net::resolve::{addr_to_sockaddr, resolve, sockaddr_to_addr};
use crate::reactor::core::with_current_reactor;
use crate::reactor::event::{Event, errno};
use crate::reactor::future::{ReadReady, WriteReady};
use crate::time;

#[cfg(feature = "tls")]
use crate::net::tls::TlsSession;

use libc::{
    AF_INET, AF_INET6, EAGAIN, ECONNRESET, EINPROGRESS, EPIPE, EWOULDBLOCK, MSG_NOSIGNAL,
    SO_ERROR, SOCK_DGRAM, SOCK_STREAM, SOL_SOCKET, c_int, c_void, sockaddr, sockaddr_storage,
    socklen_t,
};
use std::mem;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const RECV_CHUNK: usize = 8 * 1024;

/// Transport requested at `connect` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Tls,
}

impl Protocol {
    fn parse(token: &str) -> Status<Self> {
        match token {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "tls" => Ok(Self::Tls),
            other => Err(Failure::UnknownProtocol(other.to_string())),
        }
    }

    fn socktype(self) -> c_int {
        match self {
            Self::Udp => SOCK_DGRAM,
            Self::Tcp | Self::Tls => SOCK_STREAM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unconnected,
    Connecting,
    Connected,
    Closed,
}

/// Endpoint pair of a connected socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketInfo {
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

enum Need {
    Lines(usize),
    Bytes(usize),
}

impl Need {
    fn satisfied(&self, data: &[u8]) -> bool {
        match self {
            Need::Lines(n) => data.iter().filter(|&&b| b == b'\n').count() >= *n,
            Need::Bytes(n) => data.len() >= *n,
        }
    }
}

/// One logical connection owned by one script task.
pub struct Socket {
    fd: i32,
    state: State,
    protocol: Option<Protocol>,
    timeout: Duration,
    datagram_partial: bool,
    buffer: RecvBuffer,
    endpoints: Option<SocketInfo>,
    #[cfg(feature = "tls")]
    tls: Option<TlsSession>,
}

impl Socket {
    /// Creates a socket detached from any network resource.
    pub fn new() -> Self {
        Self {
            fd: -1,
            state: State::Unconnected,
            protocol: None,
            timeout: builder::initial_timeout(),
            datagram_partial: true,
            buffer: RecvBuffer::default(),
            endpoints: None,
            #[cfg(feature = "tls")]
            tls: None,
        }
    }

    /// Sets the timeout (milliseconds) for subsequent suspending calls on
    /// this socket. Values below the 10 ms floor are clamped up.
    pub fn set_timeout(&mut self, ms: u64) {
        self.timeout = Duration::from_millis(ms).max(builder::TIMEOUT_FLOOR);
    }

    /// Whether `receive_lines`/`receive_bytes` on a datagram socket may
    /// succeed with partial data at the deadline, as they do for streams.
    /// Defaults to true.
    pub fn set_datagram_partial(&mut self, allowed: bool) {
        self.datagram_partial = allowed;
    }

    /// Resolves `host`, opens the transport, and — for `"tls"` —
    /// negotiates TLS, suspending the calling task until the connection is
    /// established or fails.
    pub async fn connect(&mut self, host: &str, port: u16, protocol: &str) -> Status<()> {
        match self.state {
            State::Unconnected => {}
            State::Closed => return Err(Failure::Closed),
            _ => return Err(Failure::Error),
        }
        self.buffer.clear();

        let proto = Protocol::parse(protocol)?;

        #[cfg(not(feature = "tls"))]
        if proto == Protocol::Tls {
            return Err(Failure::TlsUnavailable);
        }

        let deadline = Instant::now() + self.timeout;
        let addrs = resolve(host, port, proto.socktype())?;

        let mut last = Failure::Error;
        for addr in addrs {
            match self.connect_one(addr, proto, deadline).await {
                Ok(()) => {
                    #[cfg(feature = "tls")]
                    if proto == Protocol::Tls {
                        let handshake = match TlsSession::new(host) {
                            Ok(mut session) => session
                                .handshake(self.fd, deadline)
                                .await
                                .map(|()| session),
                            Err(why) => Err(why),
                        };

                        match handshake {
                            Ok(session) => self.tls = Some(session),
                            Err(why) => {
                                self.release_fd();
                                self.state = State::Unconnected;
                                return Err(why);
                            }
                        }
                    }

                    self.protocol = Some(proto);
                    self.endpoints = self.lookup_endpoints();
                    self.state = State::Connected;
                    log::debug!("socket fd {} connected to {addr} ({protocol})", self.fd);
                    return Ok(());
                }
                // The configured deadline covers the whole connect, not
                // one candidate address.
                Err(Failure::Timeout) => {
                    self.release_fd();
                    self.state = State::Unconnected;
                    return Err(Failure::Timeout);
                }
                Err(why) => {
                    self.release_fd();
                    last = why;
                }
            }
        }

        self.state = State::Unconnected;
        Err(last)
    }

    async fn connect_one(
        &mut self,
        addr: SocketAddr,
        proto: Protocol,
        deadline: Instant,
    ) -> Status<()> {
        let family = match addr {
            SocketAddr::V4(_) => AF_INET,
            SocketAddr::V6(_) => AF_INET6,
        };

        let fd = unsafe { libc::socket(family, proto.socktype(), 0) };
        if fd < 0 {
            return Err(Failure::Error);
        }
        Event::set_nonblocking(fd);

        self.fd = fd;
        self.state = State::Connecting;

        let (storage, len) = addr_to_sockaddr(&addr);
        let ret = unsafe { libc::connect(fd, &storage as *const _ as *const sockaddr, len) };
        if ret == 0 {
            return Ok(());
        }

        let err = errno();
        if err != EINPROGRESS && err != EWOULDBLOCK {
            return Err(Failure::Error);
        }

        time::deadline(deadline, WriteReady::new(fd)).await?;

        let mut so_error: c_int = 0;
        let mut optlen = mem::size_of::<c_int>() as socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                fd,
                SOL_SOCKET,
                SO_ERROR,
                &mut so_error as *mut _ as *mut c_void,
                &mut optlen,
            )
        };

        if ret == 0 && so_error == 0 {
            Ok(())
        } else {
            Err(Failure::Error)
        }
    }

    /// Enqueues `data` and suspends until it is fully flushed, the socket
    /// times out, or the transport fails.
    pub async fn send(&mut self, data: &[u8]) -> Status<()> {
        self.require_connected()?;
        self.buffer.clear();

        let deadline = Instant::now() + self.timeout;
        let fd = self.fd;

        #[cfg(feature = "tls")]
        if let Some(session) = self.tls.as_mut() {
            return session.send(fd, data, deadline).await;
        }

        send_all(fd, data, deadline).await
    }

    /// Returns whatever bytes are available, suspending until at least one
    /// byte arrives or the timeout elapses.
    pub async fn receive(&mut self) -> Status<Vec<u8>> {
        self.require_connected()?;
        self.buffer.clear();

        let deadline = Instant::now() + self.timeout;
        let mut out = self.recv_some(deadline).await?;

        // Pick up anything else that is already queued, without waiting.
        #[cfg(feature = "tls")]
        if self.tls.is_some() {
            return Ok(out);
        }

        loop {
            match try_recv(self.fd) {
                Ok(Some(bytes)) => out.extend_from_slice(&bytes),
                _ => return Ok(out),
            }
        }
    }

    /// Suspends until `n` newline-delimited lines have arrived or the
    /// timeout elapses; returns everything received, which may exceed `n`
    /// lines. Any byte received before the deadline counts as success —
    /// only a timeout with nothing received fails.
    pub async fn receive_lines(&mut self, n: usize) -> Status<Vec<u8>> {
        self.receive_until(Need::Lines(n)).await
    }

    /// Byte-count variant of [`Self::receive_lines`].
    pub async fn receive_bytes(&mut self, n: usize) -> Status<Vec<u8>> {
        self.receive_until(Need::Bytes(n)).await
    }

    async fn receive_until(&mut self, need: Need) -> Status<Vec<u8>> {
        self.require_connected()?;
        self.buffer.clear();

        let deadline = Instant::now() + self.timeout;
        let mut out: Vec<u8> = Vec::new();

        loop {
            if need.satisfied(&out) {
                return Ok(out);
            }

            match self.recv_some(deadline).await {
                Ok(bytes) => out.extend_from_slice(&bytes),
                Err(Failure::Timeout) if !out.is_empty() && self.partial_counts() => {
                    return Ok(out);
                }
                Err(Failure::Eof) if !out.is_empty() => return Ok(out),
                Err(why) => return Err(why),
            }
        }
    }

    fn partial_counts(&self) -> bool {
        self.protocol != Some(Protocol::Udp) || self.datagram_partial
    }

    /// The general buffered read: appends arriving bytes to the delimiter
    /// buffer and re-evaluates `delimiter` until it matches or the timeout
    /// elapses. On a match, returns the bytes up to (optionally including)
    /// the delimiter; the remainder stays buffered for the next call.
    pub async fn receive_buf(
        &mut self,
        mut delimiter: Delimiter,
        keep_delimiter: bool,
    ) -> Status<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(record) = self.buffer.take_match(&mut delimiter, keep_delimiter)? {
                return Ok(record);
            }

            // Leftovers did not contain a match; now the transport must be
            // usable.
            self.require_connected()?;

            let bytes = self.recv_some(deadline).await?;
            self.buffer.push(&bytes);
        }
    }

    /// Closes the socket. Closing an already-closed socket is a reported
    /// failure, not a no-op.
    pub fn close(&mut self) -> Status<()> {
        if self.state == State::Closed {
            return Err(Failure::DoubleClose);
        }

        self.buffer.clear();
        self.endpoints = None;
        #[cfg(feature = "tls")]
        {
            self.tls = None;
        }

        self.release_fd();
        self.state = State::Closed;
        Ok(())
    }

    /// Endpoint pair of a connected socket.
    pub fn get_info(&self) -> Status<SocketInfo> {
        if self.state != State::Connected {
            return Err(Failure::Closed);
        }
        self.endpoints.ok_or(Failure::Error)
    }

    fn require_connected(&self) -> Status<()> {
        if self.state == State::Connected {
            Ok(())
        } else {
            Err(Failure::Closed)
        }
    }

    /// Waits for at least one byte, honoring `deadline`.
    async fn recv_some(&mut self, deadline: Instant) -> Status<Vec<u8>> {
        let fd = self.fd;

        #[cfg(feature = "tls")]
        if let Some(session) = self.tls.as_mut() {
            return session.recv(fd, deadline).await;
        }

        loop {
            match try_recv(fd)? {
                Some(bytes) => return Ok(bytes),
                None => {
                    time::deadline(deadline, ReadReady::new(fd)).await?;
                }
            }
        }
    }

    fn lookup_endpoints(&self) -> Option<SocketInfo> {
        let mut local: sockaddr_storage = unsafe { mem::zeroed() };
        let mut remote: sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

        let ret = unsafe {
            libc::getsockname(self.fd, &mut local as *mut _ as *mut sockaddr, &mut len)
        };
        if ret != 0 {
            return None;
        }

        let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;
        let ret = unsafe {
            libc::getpeername(self.fd, &mut remote as *mut _ as *mut sockaddr, &mut len)
        };
        if ret != 0 {
            return None;
        }

        Some(SocketInfo {
            local: sockaddr_to_addr(&local)?,
            remote: sockaddr_to_addr(&remote)?,
        })
    }

    fn release_fd(&mut self) {
        if self.fd >= 0 {
            with_current_reactor(|r| r.forget(self.fd));
            unsafe { libc::close(self.fd) };
            self.fd = -1;
        }
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        // Last-resort reclamation; scripts are expected to close.
        if self.fd >= 0 && self.state == State::Connected {
            log::debug!("reclaiming unclosed socket fd {}", self.fd);
        }
        self.release_fd();
    }
}

/// One non-blocking read attempt. `Ok(None)` means the call would block.
fn try_recv(fd: i32) -> Status<Option<Vec<u8>>> {
    let mut buf = [0u8; RECV_CHUNK];
    let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut c_void, buf.len(), 0) };

    if n > 0 {
        return Ok(Some(buf[..n as usize].to_vec()));
    }
    if n == 0 {
        return Err(Failure::Eof);
    }

    let err = errno();
    if err == EAGAIN || err == EWOULDBLOCK {
        return Ok(None);
    }
    if err == ECONNRESET {
        return Err(Failure::Eof);
    }
    Err(Failure::Error)
}

async fn send_all(fd: i32, mut data: &[u8], deadline: Instant) -> Status<()> {
    while !data.is_empty() {
        let n = unsafe {
            libc::send(
                fd,
                data.as_ptr() as *const c_void,
                data.len(),
                MSG_NOSIGNAL,
            )
        };

        if n > 0 {
            data = &data[n as usize..];
            continue;
        }

        let err = errno();
        if err == EAGAIN || err == EWOULDBLOCK {
            time::deadline(deadline, WriteReady::new(fd)).await?;
            continue;
        }
        if err == EPIPE || err == ECONNRESET {
            return Err(Failure::Eof);
        }
        return Err(Failure::Error);
    }

    Ok(())
}
