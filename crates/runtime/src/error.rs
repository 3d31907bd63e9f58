//! Errors reported by registry runtimes.

use std::path::PathBuf;

use thiserror::Error;
use trustfacts_rpc::{FaultKind, RemoteFault};

use crate::value::MarshalError;

/// Result type for runtime operations.
pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;

/// Failures of a registry runtime operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
	/// No source for the module exists on any search path.
	#[error("module '{module}' not found on the search path")]
	ModuleNotFound {
		module: String,
		/// Search path at the time of the lookup.
		searched: Vec<PathBuf>,
	},

	/// The module source exists but could not be loaded.
	#[error("module '{module}' failed to load: {reason}")]
	ModuleLoad { module: String, reason: String },

	/// The loaded module does not export the function.
	#[error("function '{function}' is not exported by the loaded module")]
	FunctionNotFound { function: String },

	/// The callee rejected the arity or types of its arguments.
	#[error("function '{function}' rejected its arguments: {reason}")]
	ArgumentMismatch { function: String, reason: String },

	/// The callee raised while executing.
	#[error("function '{function}' failed: {message}")]
	Execution {
		function: String,
		message: String,
		/// Remote stack trace, when the runtime captured one.
		traceback: Option<String>,
	},

	/// An argument or result cannot cross the boundary.
	#[error("marshal error: {0}")]
	Marshal(#[from] MarshalError),

	/// The runtime session is gone; nothing will be answered any more.
	#[error("registry runtime unavailable: {0}")]
	Unavailable(String),

	/// The runtime answered with something this side does not understand.
	#[error("registry runtime protocol violation: {0}")]
	Protocol(String),

	/// Operation issued out of lifecycle order.
	#[error("{0}")]
	Lifecycle(&'static str),

	/// The host process could not be launched.
	#[error("failed to spawn '{program}': {reason}")]
	Spawn { program: String, reason: String },
}

impl RuntimeError {
	/// True when the session is gone for good.
	pub const fn is_unavailable(&self) -> bool {
		matches!(self, Self::Unavailable(_) | Self::Spawn { .. })
	}

	/// Maps a host fault to an error, given what the request was about.
	pub(crate) fn from_fault(fault: RemoteFault, subject: &str, searched: impl FnOnce() -> Vec<PathBuf>) -> Self {
		let RemoteFault { kind, message, traceback } = fault;
		match kind {
			FaultKind::ModuleNotFound => Self::ModuleNotFound {
				module: subject.to_owned(),
				searched: searched(),
			},
			FaultKind::ModuleLoad => Self::ModuleLoad {
				module: subject.to_owned(),
				reason: message,
			},
			FaultKind::FunctionNotFound => Self::FunctionNotFound { function: subject.to_owned() },
			FaultKind::ArgumentMismatch => Self::ArgumentMismatch {
				function: subject.to_owned(),
				reason: message,
			},
			FaultKind::Execution => Self::Execution {
				function: subject.to_owned(),
				message,
				traceback,
			},
			FaultKind::Marshal => Self::Marshal(MarshalError::Remote(message)),
			FaultKind::Protocol | FaultKind::Unknown => Self::Protocol(message),
		}
	}
}
