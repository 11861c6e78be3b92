//! Script-facing networking: blocking-style sockets over the non-blocking
//! reactor.
//!
//! - [`socket`]: the socket object (tcp/udp/tls, per-socket timeout)
//! - [`reader`]: delimiter buffer backing `receive_buf`
//! - [`resolve`]: name resolution and sockaddr conversion
//! - [`ether`]: synchronous raw-frame sends
//! - `tls`: rustls session driven over the non-blocking descriptor

pub mod ether;
pub mod reader;
pub(crate) mod resolve;
pub mod socket;

#[cfg(feature = "tls")]
pub(crate) mod tls;

pub use ether::EthernetSender;
pub use reader::{Delimiter, Span};
pub use socket::{Protocol, Socket, SocketInfo};
