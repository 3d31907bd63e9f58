//! Out-of-process registry runtime speaking the JSON-lines host protocol.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, warn};
use trustfacts_rpc::mainloop::Exit;
use trustfacts_rpc::{HostOp, HostProtocol, HostRequest, MainLoop, PeerSocket, RemoteFault};
use trustfacts_worker::TaskClass;

use crate::value::{MarshalBudget, Value};
use crate::{ModuleInfo, RegistryRuntime, Result, RuntimeError};

/// Interpreter-side half of the host protocol, run with `python -c`.
pub const HOST_SHIM: &str = include_str!("../assets/host_shim.py");

/// How long `shutdown` waits for the host to acknowledge before killing it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Command line used to launch an interpreter host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
	pub program: String,
	pub args: Vec<String>,
	pub env: BTreeMap<String, String>,
	pub working_dir: Option<PathBuf>,
	/// Append `-c <HOST_SHIM>` to the arguments.
	pub shim: bool,
}

impl HostCommand {
	/// `python3 -u -c <HOST_SHIM>`.
	pub fn python() -> Self {
		Self {
			program: "python3".into(),
			args: vec!["-u".into()],
			env: BTreeMap::new(),
			working_dir: None,
			shim: true,
		}
	}

	/// Full argument vector passed to the program.
	pub fn argv(&self) -> Vec<&str> {
		let mut argv: Vec<&str> = self.args.iter().map(String::as_str).collect();
		if self.shim {
			argv.extend(["-c", HOST_SHIM]);
		}
		argv
	}
}

impl Default for HostCommand {
	fn default() -> Self {
		Self::python()
	}
}

enum Launch {
	Command(HostCommand),
	Streams(Mutex<Option<(BoxedReader, BoxedWriter)>>),
}

enum Session {
	Idle,
	Running(PeerSocket<HostProtocol>),
	Stopped,
}

/// Registry runtime hosted by a child interpreter (or any peer on a pair of
/// streams).
///
/// Every operation is one request on the host protocol. Once the connection
/// ends, for whatever reason, all outstanding and later operations fail with
/// [`RuntimeError::Unavailable`].
pub struct ProcessRuntime {
	label: String,
	launch: Launch,
	budget: MarshalBudget,
	session: RwLock<Session>,
	child: Mutex<Option<Child>>,
	search_paths: RwLock<Vec<PathBuf>>,
	down_reason: Arc<Mutex<Option<String>>>,
}

impl fmt::Debug for ProcessRuntime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let session = match &*self.session.read() {
			Session::Idle => "idle",
			Session::Running(_) => "running",
			Session::Stopped => "stopped",
		};
		f.debug_struct("ProcessRuntime")
			.field("label", &self.label)
			.field("session", &session)
			.finish_non_exhaustive()
	}
}

impl ProcessRuntime {
	/// Runtime that spawns `command` on [`start`](RegistryRuntime::start).
	pub fn new(command: HostCommand) -> Self {
		let label = command.program.clone();
		Self::with_launch(label, Launch::Command(command))
	}

	/// Runtime attached to an already running peer.
	pub fn from_streams(label: impl Into<String>, reader: impl AsyncRead + Send + Unpin + 'static, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
		let streams: (BoxedReader, BoxedWriter) = (Box::new(reader), Box::new(writer));
		Self::with_launch(label.into(), Launch::Streams(Mutex::new(Some(streams))))
	}

	fn with_launch(label: String, launch: Launch) -> Self {
		Self {
			label,
			launch,
			budget: MarshalBudget::default(),
			session: RwLock::new(Session::Idle),
			child: Mutex::new(None),
			search_paths: RwLock::new(Vec::new()),
			down_reason: Arc::new(Mutex::new(None)),
		}
	}

	#[must_use]
	pub fn with_budget(mut self, budget: MarshalBudget) -> Self {
		self.budget = budget;
		self
	}

	fn spawn_host(&self, command: &HostCommand) -> Result<(BoxedReader, BoxedWriter)> {
		let spawn_err = |reason: String| RuntimeError::Spawn {
			program: command.program.clone(),
			reason,
		};

		let mut cmd = Command::new(&command.program);
		cmd.args(command.argv())
			.envs(&command.env)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		if let Some(dir) = &command.working_dir {
			cmd.current_dir(dir);
		}

		#[cfg(unix)]
		cmd.process_group(0);

		let mut child = cmd.spawn().map_err(|e| spawn_err(e.to_string()))?;
		let stdin = child.stdin.take().ok_or_else(|| spawn_err("stdin not captured".into()))?;
		let stdout = child.stdout.take().ok_or_else(|| spawn_err("stdout not captured".into()))?;
		let stderr = child.stderr.take().ok_or_else(|| spawn_err("stderr not captured".into()))?;

		let label = self.label.clone();
		trustfacts_worker::spawn(TaskClass::Transport, async move {
			let mut lines = BufReader::new(stderr).lines();
			while let Ok(Some(line)) = lines.next_line().await {
				warn!(runtime = %label, stderr = %line, "runtime.host.stderr");
			}
		});

		debug!(runtime = %self.label, pid = ?child.id(), "runtime.host.spawned");
		*self.child.lock() = Some(child);
		Ok((Box::new(stdout), Box::new(stdin)))
	}

	fn socket(&self) -> Result<PeerSocket<HostProtocol>> {
		match &*self.session.read() {
			Session::Running(socket) => Ok(socket.clone()),
			Session::Idle => Err(RuntimeError::Lifecycle("host runtime not started")),
			Session::Stopped => Err(RuntimeError::Unavailable("host runtime shut down".into())),
		}
	}

	fn unavailable(&self) -> RuntimeError {
		let reason = self.down_reason.lock().clone().unwrap_or_else(|| "host connection closed".into());
		RuntimeError::Unavailable(reason)
	}

	async fn request(&self, op: HostOp) -> Result<std::result::Result<JsonValue, RemoteFault>> {
		let socket = self.socket()?;
		match socket.request(HostRequest::new(op)).await {
			Ok(response) => Ok(response.into_result()),
			Err(_) => Err(self.unavailable()),
		}
	}
}

#[async_trait]
impl RegistryRuntime for ProcessRuntime {
	fn name(&self) -> &str {
		&self.label
	}

	async fn start(&self) -> Result<()> {
		match &*self.session.read() {
			Session::Idle => {}
			Session::Running(_) => return Err(RuntimeError::Lifecycle("host runtime already started")),
			Session::Stopped => return Err(RuntimeError::Unavailable("host runtime shut down".into())),
		}

		let (reader, writer) = match &self.launch {
			Launch::Command(command) => self.spawn_host(command)?,
			Launch::Streams(streams) => streams.lock().take().ok_or(RuntimeError::Lifecycle("host streams already consumed"))?,
		};

		let (main_loop, socket) = MainLoop::new(HostProtocol::default());
		let label = self.label.clone();
		let down_reason = Arc::clone(&self.down_reason);
		trustfacts_worker::spawn(TaskClass::Transport, async move {
			let reason = match main_loop.run_buffered(reader, writer).await {
				Ok(Exit::SocketsDropped) => "host runtime shut down".to_owned(),
				Ok(Exit::PeerClosed) => {
					warn!(runtime = %label, "runtime.host.closed");
					"host closed the connection".to_owned()
				}
				Err(err) => {
					error!(runtime = %label, error = %err, "runtime.host.failed");
					format!("host connection failed: {err}")
				}
			};
			*down_reason.lock() = Some(reason);
		});

		*self.session.write() = Session::Running(socket);
		debug!(runtime = %self.label, "runtime.host.started");
		Ok(())
	}

	async fn append_path(&self, path: &Path) -> Result<()> {
		let shown = path.to_string_lossy().into_owned();
		match self.request(HostOp::AppendPath { path: shown.clone() }).await? {
			Ok(_) => {
				self.search_paths.write().push(path.to_path_buf());
				Ok(())
			}
			Err(fault) => Err(RuntimeError::from_fault(fault, &shown, Vec::new)),
		}
	}

	async fn load_module(&self, module: &str) -> Result<ModuleInfo> {
		let json = self
			.request(HostOp::LoadModule { module: module.to_owned() })
			.await?
			.map_err(|fault| RuntimeError::from_fault(fault, module, || self.search_paths.read().clone()))?;
		serde_json::from_value(json).map_err(|e| RuntimeError::Protocol(format!("malformed load_module reply: {e}")))
	}

	async fn call(&self, function: &str, args: Vec<Value>) -> Result<Value> {
		self.budget.check_all(&args)?;
		let args = args.iter().map(Value::to_json).collect::<std::result::Result<Vec<_>, _>>()?;
		let json = self
			.request(HostOp::Call {
				function: function.to_owned(),
				args,
			})
			.await?
			.map_err(|fault| RuntimeError::from_fault(fault, function, Vec::new))?;
		let value = Value::from_json(json)?;
		self.budget.check(&value)?;
		Ok(value)
	}

	async fn shutdown(&self) {
		let previous = std::mem::replace(&mut *self.session.write(), Session::Stopped);
		if let Session::Running(socket) = previous {
			let ack = tokio::time::timeout(SHUTDOWN_GRACE, socket.request(HostRequest::new(HostOp::Shutdown))).await;
			if ack.is_err() {
				warn!(runtime = %self.label, "runtime.host.shutdown_timeout");
			}
		}
		if let Some(mut child) = self.child.lock().take()
			&& let Err(err) = child.start_kill()
		{
			debug!(runtime = %self.label, error = %err, "runtime.host.kill_failed");
		}
		debug!(runtime = %self.label, "runtime.host.stopped");
	}
}

#[cfg(test)]
mod tests;
