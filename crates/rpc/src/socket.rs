//! Handle for issuing requests into a running [`MainLoop`](crate::MainLoop).

use std::fmt;

use tokio::sync::{mpsc, oneshot};

use crate::protocol::Protocol;
use crate::{Error, Result};

/// One request travelling from a socket to the pump.
pub(crate) struct Outgoing<P: Protocol> {
	pub(crate) request: P::Request,
	pub(crate) reply: oneshot::Sender<P::Response>,
}

/// Cloneable handle to a main loop.
///
/// The loop stops once every socket is dropped and no request is in flight.
pub struct PeerSocket<P: Protocol> {
	pub(crate) tx: mpsc::UnboundedSender<Outgoing<P>>,
}

impl<P: Protocol> Clone for PeerSocket<P> {
	fn clone(&self) -> Self {
		Self { tx: self.tx.clone() }
	}
}

impl<P: Protocol> fmt::Debug for PeerSocket<P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PeerSocket").field("closed", &self.tx.is_closed()).finish()
	}
}

impl<P: Protocol> PeerSocket<P> {
	/// Sends a request and waits for the correlated response.
	///
	/// # Errors
	///
	/// [`Error::ServiceStopped`] when the loop is gone or ended before answering.
	pub async fn request(&self, request: P::Request) -> Result<P::Response> {
		let (reply, rx) = oneshot::channel();
		self.tx.send(Outgoing { request, reply }).map_err(|_| Error::ServiceStopped)?;
		rx.await.map_err(|_| Error::ServiceStopped)
	}

	/// Returns true once the main loop has stopped.
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}
