//! Cooperative I/O runtime for embedded script tasks.
//!
//! Many independently scheduled script tasks perform network and raw-packet
//! I/O concurrently while each task's code reads as simple sequential,
//! blocking-style calls. A suspending call registers a (task, event,
//! deadline) interest with the single-threaded scheduler and parks the
//! task; the scheduler resumes exactly that task when data arrives, its
//! timeout fires, its mutex frees, or the peer closes.
//!
//! # Architecture
//!
//! - **Runtime**: executes a main future and all spawned tasks via `block_on`
//! - **Reactor**: epoll-backed readiness notification and waker dispatch
//! - **Timer driver**: deadlines behind every suspending call
//! - **Socket**: tcp/udp/tls connections with per-socket timeouts and a
//!   delimiter buffer for framed reads
//! - **Capture**: raw packet capture with hash-registered interest dispatch
//! - **Mutex registry**: FIFO mutual exclusion keyed by object identity
//! - **Try/catch adapter**: first failure runs a cleanup and terminates the
//!   calling task, leaving its siblings running

mod builder;
pub mod cap;
pub mod catch;
mod error;
pub mod host;
pub mod net;
mod reactor;
mod runtime;
pub mod sync;
mod task;
mod time;
mod timer;

pub use builder::RuntimeBuilder;
pub use cap::{Capture, CapturedPacket, LinkType};
pub use catch::{TryCatch, new_try, new_try_with};
pub use error::{Failure, ResolveError, Status};
pub use host::{DefaultHost, HostEnv, LogStream};
pub use net::{Delimiter, EthernetSender, Socket, SocketInfo, Span};
pub use runtime::Runtime;
pub use runtime::yield_now::yield_now;
pub use sync::{ScriptMutex, mutex};
pub use task::{JoinHandle, JoinSet, Task, TaskId};
pub use time::{Timeout, timeout};
pub use timer::{Sleep, sleep};
