//! Newline-delimited JSON protocol spoken with interpreter hosts.
//!
//! Every message is one JSON object on one line. The host only answers; it
//! never initiates requests. Responses may arrive in any order and are matched
//! by `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::{CounterIdGen, Protocol};
use crate::{Error, Result};

/// Upper bound for one inbound line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Operation requested from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
	/// Append a directory to the host's module search path.
	AppendPath {
		/// Directory to append.
		path: String,
	},
	/// Import a module and make it the active function source.
	LoadModule {
		/// Module name, resolved against the search path.
		module: String,
	},
	/// Call a function of the active module with positional arguments.
	Call {
		/// Exported function name.
		function: String,
		/// Positional arguments.
		args: Vec<JsonValue>,
	},
	/// Ask the host to exit.
	Shutdown,
}

/// A request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRequest {
	/// Correlation id, assigned by the pump.
	pub id: u64,
	/// The requested operation.
	#[serde(flatten)]
	pub op: HostOp,
}

impl HostRequest {
	/// Wraps an operation; the id is assigned when the request is sent.
	pub fn new(op: HostOp) -> Self {
		Self { id: 0, op }
	}
}

/// Failure classification reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
	/// No source for the module exists on the search path.
	ModuleNotFound,
	/// The module source exists but failed to import.
	ModuleLoad,
	/// The active module does not export the function.
	FunctionNotFound,
	/// The callee rejected the arguments.
	ArgumentMismatch,
	/// The callee raised during execution.
	Execution,
	/// A value could not be represented on the wire.
	Marshal,
	/// The host could not make sense of the request.
	Protocol,
	/// A kind this side does not know about.
	#[serde(other)]
	Unknown,
}

/// Error payload of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFault {
	/// Failure classification.
	pub kind: FaultKind,
	/// Human-readable message.
	pub message: String,
	/// Formatted remote stack trace, when the host has one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub traceback: Option<String>,
}

impl RemoteFault {
	/// Creates a fault without a traceback.
	pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
			traceback: None,
		}
	}
}

/// A response line.
///
/// `error` takes precedence; a response carrying neither field is a
/// successful `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResponse {
	/// Id of the request being answered.
	pub id: u64,
	/// Successful result.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ok: Option<JsonValue>,
	/// Failure payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<RemoteFault>,
}

impl HostResponse {
	/// Builds a successful response.
	pub fn ok(id: u64, value: JsonValue) -> Self {
		Self {
			id,
			ok: Some(value),
			error: None,
		}
	}

	/// Builds a failed response.
	pub fn err(id: u64, fault: RemoteFault) -> Self {
		Self { id, ok: None, error: Some(fault) }
	}

	/// Splits the response into its outcome.
	pub fn into_result(self) -> std::result::Result<JsonValue, RemoteFault> {
		match self.error {
			Some(fault) => Err(fault),
			None => Ok(self.ok.unwrap_or(JsonValue::Null)),
		}
	}
}

/// Returns the first integer literal in `json` that does not fit in an `i64`.
///
/// `serde_json` silently reads such literals as floats, so results are
/// checked against the raw text before they are trusted. Literals inside
/// strings are ignored.
pub fn wide_integer(json: &[u8]) -> Option<String> {
	let mut i = 0;
	let mut in_string = false;
	while i < json.len() {
		let byte = json[i];
		if in_string {
			match byte {
				b'\\' => i += 1,
				b'"' => in_string = false,
				_ => {}
			}
			i += 1;
			continue;
		}
		match byte {
			b'"' => {
				in_string = true;
				i += 1;
			}
			b'-' | b'0'..=b'9' => {
				let start = i;
				while i < json.len() && matches!(json[i], b'-' | b'+' | b'.' | b'e' | b'E' | b'0'..=b'9') {
					i += 1;
				}
				let token = &json[start..i];
				let integral = token.iter().any(u8::is_ascii_digit) && !token.iter().any(|c| matches!(c, b'.' | b'e' | b'E'));
				if integral
					&& let Ok(text) = std::str::from_utf8(token)
					&& text.parse::<i64>().is_err()
				{
					return Some(text.to_owned());
				}
			}
			_ => i += 1,
		}
	}
	None
}

/// [`Protocol`] implementation for the JSON-lines host format.
#[derive(Debug)]
pub struct HostProtocol {
	buf: Vec<u8>,
	max_line: usize,
}

impl Default for HostProtocol {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_LINE_BYTES)
	}
}

impl HostProtocol {
	/// Creates a codec rejecting lines longer than `max_line` bytes.
	pub fn new(max_line: usize) -> Self {
		Self { buf: Vec::new(), max_line }
	}
}

impl Protocol for HostProtocol {
	type Id = u64;
	type Request = HostRequest;
	type Response = HostResponse;
	type LoopError = Error;
	type IdGen = CounterIdGen;

	fn next_id(id_gen: &mut Self::IdGen) -> Self::Id {
		id_gen.next()
	}

	fn set_request_id(req: &mut Self::Request, id: Self::Id) {
		req.id = id;
	}

	fn response_id(resp: &Self::Response) -> Self::Id {
		resp.id
	}

	async fn read_response(&mut self, input: &mut (impl AsyncBufRead + Unpin + Send)) -> Result<Option<HostResponse>> {
		loop {
			// `read_until` appends to `self.buf`, so a cancelled read resumes where it stopped.
			let read = input.read_until(b'\n', &mut self.buf).await?;
			if self.buf.len() > self.max_line {
				return Err(Error::Protocol(format!("message exceeds {} byte limit", self.max_line)));
			}
			if read == 0 {
				if self.buf.iter().all(u8::is_ascii_whitespace) {
					return Ok(None);
				}
				return Err(Error::Protocol("stream ended inside a message".into()));
			}
			if self.buf.last() != Some(&b'\n') {
				continue;
			}

			let line = std::mem::take(&mut self.buf);
			let trimmed = line.trim_ascii();
			if trimmed.is_empty() {
				continue;
			}
			if trimmed.first() != Some(&b'{') {
				tracing::warn!(line = %String::from_utf8_lossy(trimmed), "rpc.host.stray_output");
				continue;
			}
			let response: HostResponse = serde_json::from_slice(trimmed)?;
			if response.ok.is_some()
				&& let Some(literal) = wide_integer(trimmed)
			{
				tracing::warn!(id = response.id, literal = %literal, "rpc.host.wide_integer");
				let fault = RemoteFault::new(FaultKind::Marshal, format!("integer {literal} is outside the 64-bit signed range"));
				return Ok(Some(HostResponse::err(response.id, fault)));
			}
			return Ok(Some(response));
		}
	}

	async fn write_request(&mut self, output: &mut (impl AsyncWrite + Unpin + Send), req: &HostRequest) -> Result<()> {
		let mut line = serde_json::to_vec(req)?;
		line.push(b'\n');
		output.write_all(&line).await?;
		output.flush().await?;
		Ok(())
	}
}
