//! Worker context shared by the dispatch facade and the registry runtimes.
//!
//! Every dispatched call runs on a worker task rather than on the caller's
//! stack. Tasks land on the caller's tokio runtime when one is active, and on
//! a lazily built global runtime otherwise, so plain threads can issue calls
//! and receive callbacks too.

mod class;
mod clock;
mod panic;
mod spawn;

pub use class::TaskClass;
pub use clock::CallClock;
pub use panic::join_error_panic_message;
pub use spawn::{runtime_handle, spawn, spawn_blocking};
