//! Concurrency primitives shared between script tasks.

pub mod mutex;

pub use mutex::{ScriptMutex, mutex};
