//! Fluent builder for Runtime construction.

use crate::runtime::Runtime;

use std::cell::Cell;
use std::time::Duration;

/// Default timeout for sockets and capture handles, per the blocking-call
/// contract.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Timeouts are clamped to this floor everywhere they can be configured.
pub(crate) const TIMEOUT_FLOOR: Duration = Duration::from_millis(10);

thread_local! {
    static SOCKET_TIMEOUT: Cell<Duration> = const { Cell::new(DEFAULT_TIMEOUT) };
}

/// The timeout newly created sockets and capture handles start with on
/// this thread.
pub(crate) fn initial_timeout() -> Duration {
    SOCKET_TIMEOUT.with(|cell| cell.get())
}

/// Builder for [`Runtime`] instances.
///
/// # Example
/// ```ignore
/// let rt = RuntimeBuilder::new().default_timeout_ms(5_000).build();
/// ```
pub struct RuntimeBuilder {
    default_timeout: Duration,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the timeout newly created sockets and capture handles start
    /// with. Values below the 10 ms floor are clamped up.
    pub fn default_timeout_ms(mut self, ms: u64) -> Self {
        self.default_timeout = Duration::from_millis(ms).max(TIMEOUT_FLOOR);
        self
    }

    /// Builds a configured [`Runtime`].
    pub fn build(self) -> Runtime {
        SOCKET_TIMEOUT.with(|cell| cell.set(self.default_timeout));
        Runtime::from_parts()
    }
}
