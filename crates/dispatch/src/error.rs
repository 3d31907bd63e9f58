//! Errors delivered by the dispatch facade.

use std::time::Duration;

use thiserror::Error;
use trustfacts_runtime::RuntimeError;

/// Result type for dispatch operations and call outcomes.
pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

/// Operation issued in a facade state that does not allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
	#[error("dispatcher not started")]
	NotStarted,
	#[error("dispatcher already started")]
	AlreadyStarted,
	#[error("no module loaded")]
	ModuleNotLoaded,
	#[error("a module is already loaded")]
	ModuleAlreadyLoaded,
}

/// Failure of a lifecycle operation or of one call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
	#[error(transparent)]
	Runtime(#[from] RuntimeError),
	#[error("call timed out after {0:?}")]
	Timeout(Duration),
	#[error("call cancelled")]
	Cancelled,
	#[error(transparent)]
	State(#[from] StateError),
	/// A typed function descriptor does not match its registration or the
	/// loaded module.
	#[error("signature error: {0}")]
	Signature(String),
}

/// Flat classification of [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	ModuleNotFound,
	ModuleLoad,
	FunctionNotFound,
	ArgumentMismatch,
	Execution,
	Marshal,
	RuntimeUnavailable,
	Timeout,
	Cancelled,
	State,
	Signature,
}

impl ErrorKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::ModuleNotFound => "module_not_found",
			Self::ModuleLoad => "module_load",
			Self::FunctionNotFound => "function_not_found",
			Self::ArgumentMismatch => "argument_mismatch",
			Self::Execution => "execution",
			Self::Marshal => "marshal",
			Self::RuntimeUnavailable => "runtime_unavailable",
			Self::Timeout => "timeout",
			Self::Cancelled => "cancelled",
			Self::State => "state",
			Self::Signature => "signature",
		}
	}
}

impl DispatchError {
	pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
		Self::Runtime(RuntimeError::Unavailable(reason.into()))
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Runtime(err) => match err {
				RuntimeError::ModuleNotFound { .. } => ErrorKind::ModuleNotFound,
				RuntimeError::ModuleLoad { .. } => ErrorKind::ModuleLoad,
				RuntimeError::FunctionNotFound { .. } => ErrorKind::FunctionNotFound,
				RuntimeError::ArgumentMismatch { .. } => ErrorKind::ArgumentMismatch,
				RuntimeError::Execution { .. } => ErrorKind::Execution,
				// A reply this side cannot decode is a representation failure.
				RuntimeError::Marshal(_) | RuntimeError::Protocol(_) => ErrorKind::Marshal,
				RuntimeError::Unavailable(_) | RuntimeError::Spawn { .. } => ErrorKind::RuntimeUnavailable,
				RuntimeError::Lifecycle(_) => ErrorKind::State,
			},
			Self::Timeout(_) => ErrorKind::Timeout,
			Self::Cancelled => ErrorKind::Cancelled,
			Self::State(_) => ErrorKind::State,
			Self::Signature(_) => ErrorKind::Signature,
		}
	}

	/// Remote traceback, for execution errors that carry one.
	pub fn traceback(&self) -> Option<&str> {
		match self {
			Self::Runtime(RuntimeError::Execution { traceback, .. }) => traceback.as_deref(),
			_ => None,
		}
	}
}
