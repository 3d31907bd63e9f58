//! Protocol abstraction for wire formats and request correlation.

use std::fmt;
use std::hash::Hash;

use tokio::io::{AsyncBufRead, AsyncWrite};

/// Simple counter-based ID generator for protocols.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterIdGen(pub u64);

impl CounterIdGen {
	/// Creates a new counter starting at 0.
	#[must_use]
	pub const fn new() -> Self {
		Self(0)
	}

	/// Generates the next unique ID and increments the counter.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> u64 {
		let id = self.0;
		self.0 += 1;
		id
	}
}

/// Binding between the generic pump and a concrete request/response format.
///
/// The pump only ever writes requests and reads responses; the peer never
/// initiates traffic.
pub trait Protocol: Send + 'static {
	/// Identifier type correlating a response with its request.
	type Id: Eq + Hash + Clone + fmt::Debug + Send + 'static;

	/// Outbound request type.
	type Request: Send + 'static;

	/// Inbound response type.
	type Response: Send + 'static;

	/// Error type for IO/codec/protocol violations in the loop.
	type LoopError: From<std::io::Error> + Send + 'static;

	/// State for generating unique request IDs.
	type IdGen: Default + Send + 'static;

	/// Generate the next unique request ID.
	fn next_id(id_gen: &mut Self::IdGen) -> Self::Id;

	/// Stamp an ID onto an outbound request.
	fn set_request_id(req: &mut Self::Request, id: Self::Id);

	/// Get the ID from a response.
	fn response_id(resp: &Self::Response) -> Self::Id;

	/// Read one complete response, or `None` at a clean end of stream.
	///
	/// Must be cancel safe: the pump polls it inside `select!`, so partially
	/// read input has to survive into the next call.
	fn read_response(
		&mut self,
		input: &mut (impl AsyncBufRead + Unpin + Send),
	) -> impl std::future::Future<Output = std::result::Result<Option<Self::Response>, Self::LoopError>> + Send;

	/// Write one request to the output stream and flush it.
	fn write_request(
		&mut self,
		output: &mut (impl AsyncWrite + Unpin + Send),
		req: &Self::Request,
	) -> impl std::future::Future<Output = std::result::Result<(), Self::LoopError>> + Send;
}
