//! Handles for calls in flight.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use trustfacts_runtime::Value;

use crate::{DispatchError, Result};

/// Identifier of one invocation, unique per dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub(crate) u64);

impl CallId {
	pub const fn raw(self) -> u64 {
		self.0
	}
}

impl fmt::Display for CallId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "call#{}", self.0)
	}
}

/// Per-call knobs.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
	/// Overrides the dispatcher's default timeout.
	pub timeout: Option<Duration>,
	/// External cancellation; a fresh token is used when absent.
	pub cancel: Option<CancellationToken>,
}

impl CallOptions {
	#[must_use]
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	#[must_use]
	pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
		self.cancel = Some(cancel);
		self
	}
}

/// Future resolving to the outcome of one invocation.
///
/// Dropping it does not cancel the call; the result is discarded. Use
/// [`PendingCall::cancel`] to abandon the call.
#[must_use = "dropping a PendingCall discards the result"]
pub struct PendingCall {
	id: CallId,
	rx: oneshot::Receiver<Result<Value>>,
	cancel: CancellationToken,
}

impl fmt::Debug for PendingCall {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PendingCall")
			.field("id", &self.id)
			.field("cancelled", &self.cancel.is_cancelled())
			.finish_non_exhaustive()
	}
}

impl PendingCall {
	pub(crate) fn new(id: CallId, rx: oneshot::Receiver<Result<Value>>, cancel: CancellationToken) -> Self {
		Self { id, rx, cancel }
	}

	/// A call that failed before it was dispatched.
	pub(crate) fn failed(id: CallId, err: DispatchError) -> Self {
		let (tx, rx) = oneshot::channel();
		let _ = tx.send(Err(err));
		Self::new(id, rx, CancellationToken::new())
	}

	pub fn id(&self) -> CallId {
		self.id
	}

	/// Requests cancellation. The call resolves with
	/// [`DispatchError::Cancelled`] unless it already completed.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub fn cancel_token(&self) -> CancellationToken {
		self.cancel.clone()
	}
}

impl Future for PendingCall {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx)
			.poll(cx)
			.map(|received| received.unwrap_or_else(|_| Err(DispatchError::unavailable("call worker dropped without a result"))))
	}
}
