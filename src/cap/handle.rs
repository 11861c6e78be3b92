//! The capture handle: hash-registered interest over one capture stream.
//!
//! The hash indirection decouples "what to filter" (the caller's function
//! over packet bytes) from "how to match" (set membership): the hash is
//! computed once per frame and compared against the registered set, so
//! many interests share one stream without re-running arbitrary predicates
//! per packet per consumer. The empty-string hash is a wildcard matching
//! every frame that passes the filter.

use crate::builder;
use crate::cap::LinkType;
use crate::cap::backend::{AfPacketCapture, CaptureBackend};
use crate::cap::filter::Filter;
use crate::error::{Failure, Status};
use crate::reactor::future::ReadReady;
use crate::time;
use crate::timer;

use std::collections::HashSet;
use std::time::{Duration, Instant};

// Poll cadence for backends with no descriptor to park on.
const POLL_SLICE: Duration = Duration::from_millis(10);

/// A matched frame as handed to the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    /// Bytes actually captured (post-snaplen).
    pub capture_len: usize,
    /// Link-layer header.
    pub link_header: Vec<u8>,
    /// Network layer and up.
    pub payload: Vec<u8>,
}

/// An open capture session with an associated hash-based interest set.
pub struct Capture {
    backend: Option<Box<dyn CaptureBackend>>,
    hash_fn: Box<dyn FnMut(&[u8]) -> String>,
    filter: Filter,
    interest: HashSet<String>,
    timeout: Duration,
}

impl std::fmt::Debug for Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capture")
            .field("backend", &self.backend.as_ref().map(|_| "..."))
            .field("filter", &self.filter)
            .field("interest", &self.interest)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Capture {
    /// Opens a capture handle on `device`.
    ///
    /// No packets are delivered until at least one hash is registered.
    pub fn open<H>(
        device: &str,
        snaplen: usize,
        promiscuous: bool,
        hash_fn: H,
        filter_expr: &str,
    ) -> Status<Self>
    where
        H: FnMut(&[u8]) -> String + 'static,
    {
        let backend = AfPacketCapture::open(device, snaplen, promiscuous)?;
        Self::with_backend(Box::new(backend), hash_fn, filter_expr)
    }

    /// Opens a handle over a caller-supplied backend. This is the seam
    /// embedders use to feed scripted frames through the same dispatch.
    pub fn with_backend<H>(
        backend: Box<dyn CaptureBackend>,
        hash_fn: H,
        filter_expr: &str,
    ) -> Status<Self>
    where
        H: FnMut(&[u8]) -> String + 'static,
    {
        let filter = Filter::parse(filter_expr)?;

        Ok(Self {
            backend: Some(backend),
            hash_fn: Box::new(hash_fn),
            filter,
            interest: HashSet::new(),
            timeout: builder::initial_timeout(),
        })
    }

    /// Adds `hash` to the interest set. The empty string is the match-all
    /// wildcard.
    pub fn register(&mut self, hash: &str) {
        self.interest.insert(hash.to_string());
    }

    /// Sets the timeout (milliseconds) for subsequent receives; clamped to
    /// the 10 ms floor.
    pub fn set_timeout(&mut self, ms: u64) {
        self.timeout = Duration::from_millis(ms).max(builder::TIMEOUT_FLOOR);
    }

    /// Suspends until a frame passes the filter and its hash is
    /// registered, then returns it split at the link header. Times out
    /// like a socket receive when nothing matches.
    pub async fn receive(&mut self) -> Status<CapturedPacket> {
        let deadline = Instant::now() + self.timeout;

        loop {
            // Drain everything already queued before parking.
            loop {
                let backend = self.backend.as_mut().ok_or(Failure::CaptureNotOpen)?;
                let link = backend.link_type();

                let frame = match backend.poll_frame()? {
                    Some(frame) => frame,
                    None => break,
                };

                if !self.filter.matches(&frame, link) {
                    continue;
                }
                if self.interest.is_empty() {
                    continue;
                }

                let hash = (self.hash_fn)(&frame);
                if self.interest.contains("") || self.interest.contains(&hash) {
                    return Ok(split_frame(frame, link));
                }
            }

            let backend = self.backend.as_ref().ok_or(Failure::CaptureNotOpen)?;
            match backend.file_descriptor() {
                Some(fd) => {
                    time::deadline(deadline, ReadReady::new(fd)).await?;
                }
                None => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Failure::Timeout);
                    }
                    let nap = POLL_SLICE.min(deadline - now);
                    timer::sleep(nap).await;
                }
            }
        }
    }

    /// Releases the capture resource. A second close is a reported
    /// failure, matching socket close.
    pub fn close(&mut self) -> Status<()> {
        match self.backend.take() {
            Some(_) => Ok(()),
            None => Err(Failure::CaptureNotOpen),
        }
    }
}

fn split_frame(frame: Vec<u8>, link: LinkType) -> CapturedPacket {
    let header_len = link.header_len().min(frame.len());

    CapturedPacket {
        capture_len: frame.len(),
        link_header: frame[..header_len].to_vec(),
        payload: frame[header_len..].to_vec(),
    }
}
