//! TLS session driven sans-io over a non-blocking descriptor.
//!
//! rustls does the protocol work; this module only moves ciphertext
//! between the connection object and the descriptor, parking the task on
//! reactor readiness whenever the descriptor would block. Certificate
//! trust comes from the bundled Mozilla roots.

use crate::error::{Failure, Status};
use crate::reactor::event::errno;
use crate::reactor::future::{ReadReady, WriteReady};
use crate::time;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Instant;

const TLS_CHUNK: usize = 8 * 1024;

pub(crate) struct TlsSession {
    conn: ClientConnection,
}

impl TlsSession {
    pub(crate) fn new(host: &str) -> Status<Self> {
        let root_store = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| Failure::TlsHandshake(e.to_string()))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| Failure::TlsHandshake(format!("invalid server name: {host}")))?;

        let conn = ClientConnection::new(Arc::new(config), server_name)
            .map_err(|e| Failure::TlsHandshake(e.to_string()))?;

        Ok(Self { conn })
    }

    /// Drives the handshake to completion within `deadline`.
    pub(crate) async fn handshake(&mut self, fd: i32, deadline: Instant) -> Status<()> {
        while self.conn.is_handshaking() {
            if self.conn.wants_write() {
                self.flush_tls(fd, deadline).await?;
                continue;
            }

            if self.conn.wants_read() {
                self.pump_tls(fd, deadline, true).await?;
            }
        }

        // Any tail records queued by the final handshake step.
        self.flush_tls(fd, deadline).await
    }

    /// Encrypts `data` and flushes it to the wire.
    pub(crate) async fn send(&mut self, fd: i32, data: &[u8], deadline: Instant) -> Status<()> {
        self.conn
            .writer()
            .write_all(data)
            .map_err(|_| Failure::Error)?;

        self.flush_tls(fd, deadline).await
    }

    /// Returns at least one byte of plaintext, pulling ciphertext from the
    /// wire as needed.
    pub(crate) async fn recv(&mut self, fd: i32, deadline: Instant) -> Status<Vec<u8>> {
        loop {
            let mut chunk = [0u8; TLS_CHUNK];
            match self.conn.reader().read(&mut chunk) {
                Ok(0) => return Err(Failure::Eof),
                Ok(n) => {
                    let mut out = chunk[..n].to_vec();
                    // Drain the rest of the decrypted backlog.
                    loop {
                        match self.conn.reader().read(&mut chunk) {
                            Ok(0) => break,
                            Ok(n) => out.extend_from_slice(&chunk[..n]),
                            Err(_) => break,
                        }
                    }
                    return Ok(out);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.pump_tls(fd, deadline, false).await?;
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(Failure::Eof);
                }
                Err(_) => return Err(Failure::Error),
            }
        }
    }

    /// Writes queued TLS records until the connection has nothing more to
    /// send.
    async fn flush_tls(&mut self, fd: i32, deadline: Instant) -> Status<()> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut FdIo { fd }) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    time::deadline(deadline, WriteReady::new(fd)).await?;
                }
                Err(_) => return Err(Failure::Error),
            }
        }
        Ok(())
    }

    /// Reads one burst of TLS records from the wire and processes them.
    async fn pump_tls(&mut self, fd: i32, deadline: Instant, handshaking: bool) -> Status<()> {
        loop {
            match self.conn.read_tls(&mut FdIo { fd }) {
                Ok(0) => {
                    return Err(if handshaking {
                        Failure::TlsHandshake(String::from("peer closed during handshake"))
                    } else {
                        Failure::Eof
                    });
                }
                Ok(_) => {
                    self.conn.process_new_packets().map_err(|e| {
                        if handshaking {
                            Failure::TlsHandshake(e.to_string())
                        } else {
                            Failure::Error
                        }
                    })?;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    time::deadline(deadline, ReadReady::new(fd)).await?;
                }
                Err(_) => return Err(Failure::Error),
            }
        }
    }
}

/// Minimal blocking-trait adapter over the raw descriptor; `EAGAIN`
/// surfaces as `WouldBlock` for the caller to park on.
struct FdIo {
    fd: i32,
}

impl Read for FdIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }

        let err = errno();
        if err == libc::EAGAIN || err == libc::EWOULDBLOCK {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        Err(io::Error::last_os_error())
    }
}

impl Write for FdIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }

        let err = errno();
        if err == libc::EAGAIN || err == libc::EWOULDBLOCK {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        Err(io::Error::last_os_error())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
