//! Request/response pump driving one peer connection.

use std::collections::HashMap;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use crate::protocol::Protocol;
use crate::socket::{Outgoing, PeerSocket};

/// Why a main loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
	/// Every [`PeerSocket`] was dropped.
	SocketsDropped,
	/// The peer closed its output stream.
	PeerClosed,
}

/// Pump writing requests and routing responses back to their callers.
///
/// Requests from all sockets are serialized onto the output stream in arrival
/// order; responses are matched by id and may arrive in any order. When the
/// loop ends, every request still waiting is failed with
/// [`Error::ServiceStopped`](crate::Error::ServiceStopped).
pub struct MainLoop<P: Protocol> {
	protocol: P,
	rx: mpsc::UnboundedReceiver<Outgoing<P>>,
	id_gen: P::IdGen,
	outgoing: HashMap<P::Id, oneshot::Sender<P::Response>>,
}

impl<P: Protocol> std::fmt::Debug for MainLoop<P> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MainLoop").field("pending", &self.outgoing.len()).finish_non_exhaustive()
	}
}

impl<P: Protocol> MainLoop<P> {
	/// Creates a loop and the first socket feeding it.
	#[must_use]
	pub fn new(protocol: P) -> (Self, PeerSocket<P>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let this = Self {
			protocol,
			rx,
			id_gen: P::IdGen::default(),
			outgoing: HashMap::new(),
		};
		(this, PeerSocket { tx })
	}

	/// Shortcut to [`MainLoop::run`] wrapping `input` in a [`BufReader`].
	#[allow(clippy::missing_errors_doc, reason = "errors documented in Self::run")]
	pub async fn run_buffered(self, input: impl AsyncRead + Unpin + Send, output: impl AsyncWrite + Unpin + Send) -> Result<Exit, P::LoopError> {
		self.run(BufReader::new(input), output).await
	}

	/// Drives the connection until the peer or every socket goes away.
	///
	/// # Errors
	///
	/// Whatever the protocol reports for I/O, decode or framing failures.
	pub async fn run(mut self, mut input: impl AsyncBufRead + Unpin + Send, mut output: impl AsyncWrite + Unpin + Send) -> Result<Exit, P::LoopError> {
		let ret = loop {
			tokio::select! {
				biased;

				event = self.rx.recv() => match event {
					Some(Outgoing { mut request, reply }) => {
						if reply.is_closed() {
							continue;
						}
						let id = P::next_id(&mut self.id_gen);
						P::set_request_id(&mut request, id.clone());
						if let Err(err) = self.protocol.write_request(&mut output, &request).await {
							break Err(err);
						}
						if self.outgoing.insert(id.clone(), reply).is_some() {
							tracing::warn!(id = ?id, "rpc.request.id_reused");
						}
					}
					None => break Ok(Exit::SocketsDropped),
				},

				resp = self.protocol.read_response(&mut input) => match resp {
					Ok(Some(resp)) => {
						let id = P::response_id(&resp);
						match self.outgoing.remove(&id) {
							Some(reply) => {
								// The caller may have stopped waiting.
								let _: Result<_, _> = reply.send(resp);
							}
							None => tracing::warn!(id = ?id, "rpc.response.unknown_id"),
						}
					}
					Ok(None) => break Ok(Exit::PeerClosed),
					Err(err) => break Err(err),
				},
			}
		};

		if !self.outgoing.is_empty() {
			tracing::debug!(pending = self.outgoing.len(), "rpc.mainloop.abandon_pending");
		}
		if matches!(ret, Ok(Exit::SocketsDropped)) {
			output.shutdown().await?;
		}
		ret
	}
}
