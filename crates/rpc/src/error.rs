//! Transport errors.

use std::io;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible transport errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The main loop stopped; no more requests can be served.
	#[error("service stopped")]
	ServiceStopped,
	/// The peer sent a line that is not a valid message.
	#[error("deserialization failed: {0}")]
	Decode(#[from] serde_json::Error),
	/// The peer violated the protocol.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// Input/output errors from the underlying channels.
	#[error("{0}")]
	Io(#[from] io::Error),
	/// The underlying channel reached EOF.
	#[error("the underlying channel reached EOF")]
	Eof,
}
