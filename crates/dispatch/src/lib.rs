//! Asynchronous dispatch facade over a registry runtime.
//!
//! [`Dispatcher`] forwards named, positional-argument calls to whatever
//! [`RegistryRuntime`](trustfacts_runtime::RegistryRuntime) it was built
//! with, and hands each outcome back exactly once from a worker task:
//!
//! * [`Dispatcher::invoke`] returns a [`PendingCall`] future.
//! * [`Dispatcher::invoke_with_callback`] calls a closure instead.
//! * [`Dispatcher::call`] goes through a typed [`RemoteFn`] descriptor.
//!
//! [`MetricsClient`] wraps the metrics controller's functions on top of that,
//! and [`Bootstrap`] runs the usual bring-up sequence.

mod bootstrap;
mod call;
mod error;
mod facade;
pub mod metrics;
mod registry;
mod state;

pub use bootstrap::{Booted, Bootstrap};
pub use call::{CallId, CallOptions, PendingCall};
pub use error::{DispatchError, ErrorKind, Result, StateError};
pub use facade::{DispatchConfig, Dispatcher};
pub use metrics::{DataRequest, MetricsClient, ProjectInfo, Tokens};
pub use registry::{Args, FunctionTable, RemoteFn, TypedCall};
pub use state::FacadeState;
pub use tokio_util::sync::CancellationToken;
