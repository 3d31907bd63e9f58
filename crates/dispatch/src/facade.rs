//! The dispatch facade.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{Mutex as AsyncMutex, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trustfacts_runtime::{FromValue, ModuleInfo, RegistryRuntime, RuntimeError, Value};
use trustfacts_worker::{CallClock, TaskClass};

use crate::call::{CallId, CallOptions, PendingCall};
use crate::registry::{Args, RemoteFn, TypedCall};
use crate::{DispatchError, FacadeState, Result, StateError};

/// Facade-wide call settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchConfig {
	/// Applied to calls that do not set their own timeout. `None` waits forever.
	pub default_timeout: Option<Duration>,
}

/// Forwards named calls to a registry runtime and delivers results
/// asynchronously.
///
/// Lifecycle operations (`start`, `append_search_path`, `load_module`,
/// `shutdown`) are async and serialized among themselves. Invocations never
/// block: each call runs on a worker task and its outcome is delivered exactly
/// once, either through a [`PendingCall`] or to a callback.
///
/// Cloning is cheap; clones share the same session.
pub struct Dispatcher<R: RegistryRuntime + ?Sized = dyn RegistryRuntime> {
	inner: Arc<Inner<R>>,
}

impl<R: RegistryRuntime + ?Sized> Clone for Dispatcher<R> {
	fn clone(&self) -> Self {
		Self { inner: Arc::clone(&self.inner) }
	}
}

impl<R: RegistryRuntime + ?Sized> fmt::Debug for Dispatcher<R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dispatcher")
			.field("runtime", &self.inner.runtime.name())
			.field("state", &self.state())
			.field("search_paths", &*self.inner.search_paths.read())
			.finish_non_exhaustive()
	}
}

struct Inner<R: RegistryRuntime + ?Sized> {
	config: DispatchConfig,
	state: watch::Sender<FacadeState>,
	search_paths: RwLock<Vec<PathBuf>>,
	module: RwLock<Option<Arc<ModuleInfo>>>,
	down_reason: RwLock<Option<String>>,
	lifecycle: AsyncMutex<()>,
	/// Fired on shutdown or runtime death; fails every call in flight.
	shutdown: CancellationToken,
	clock: CallClock,
	runtime: Arc<R>,
}

impl<R: RegistryRuntime + ?Sized> Dispatcher<R> {
	pub fn new(runtime: Arc<R>) -> Self {
		Self::with_config(runtime, DispatchConfig::default())
	}

	pub fn with_config(runtime: Arc<R>, config: DispatchConfig) -> Self {
		Self {
			inner: Arc::new(Inner {
				config,
				state: watch::Sender::new(FacadeState::Uninitialized),
				search_paths: RwLock::new(Vec::new()),
				module: RwLock::new(None),
				down_reason: RwLock::new(None),
				lifecycle: AsyncMutex::new(()),
				shutdown: CancellationToken::new(),
				clock: CallClock::new(),
				runtime,
			}),
		}
	}

	pub fn runtime(&self) -> &Arc<R> {
		&self.inner.runtime
	}

	pub fn config(&self) -> DispatchConfig {
		self.inner.config
	}

	pub fn state(&self) -> FacadeState {
		self.inner.current()
	}

	/// Subscribes to state changes.
	pub fn subscribe(&self) -> watch::Receiver<FacadeState> {
		self.inner.state.subscribe()
	}

	/// Paths appended so far, in search order.
	pub fn search_paths(&self) -> Vec<PathBuf> {
		self.inner.search_paths.read().clone()
	}

	/// The active module, once loaded.
	pub fn module(&self) -> Option<Arc<ModuleInfo>> {
		self.inner.module.read().clone()
	}

	/// Acquires the runtime session.
	///
	/// # Errors
	///
	/// [`StateError::AlreadyStarted`] on a second call; the runtime's own
	/// error when it fails to start, leaving the facade uninitialized.
	pub async fn start(&self) -> Result<()> {
		let _guard = self.inner.lifecycle.lock().await;
		match self.state() {
			FacadeState::Uninitialized => {}
			FacadeState::Started | FacadeState::ModuleLoaded => return Err(StateError::AlreadyStarted.into()),
			FacadeState::Unavailable | FacadeState::Stopped => return Err(self.inner.terminal_error()),
		}
		let outcome = tokio::select! {
			biased;
			() = self.inner.shutdown.cancelled() => return Err(self.inner.terminal_error()),
			outcome = self.inner.runtime.start() => outcome,
		};
		if let Err(err) = outcome {
			warn!(runtime = self.inner.runtime.name(), error = %err, "dispatch.start_failed");
			return Err(err.into());
		}
		self.inner.set_state(FacadeState::Started);
		info!(runtime = self.inner.runtime.name(), "dispatch.started");
		Ok(())
	}

	/// Appends a directory to module resolution. Existence is not checked and
	/// duplicates are kept.
	pub async fn append_search_path(&self, path: impl AsRef<Path>) -> Result<()> {
		let path = path.as_ref();
		let _guard = self.inner.lifecycle.lock().await;
		match self.state() {
			FacadeState::Started | FacadeState::ModuleLoaded => {}
			FacadeState::Uninitialized => return Err(StateError::NotStarted.into()),
			FacadeState::Unavailable | FacadeState::Stopped => return Err(self.inner.terminal_error()),
		}
		self.inner.lifecycle_step(self.inner.runtime.append_path(path)).await?;
		self.inner.search_paths.write().push(path.to_path_buf());
		debug!(path = %path.display(), "dispatch.path_appended");
		Ok(())
	}

	/// Loads `name` as the active module.
	///
	/// # Errors
	///
	/// `ModuleNotFound` or `ModuleLoad` from the runtime, leaving the facade
	/// started; [`StateError::ModuleAlreadyLoaded`] once a module is active.
	pub async fn load_module(&self, name: &str) -> Result<Arc<ModuleInfo>> {
		let _guard = self.inner.lifecycle.lock().await;
		match self.state() {
			FacadeState::Started => {}
			FacadeState::Uninitialized => return Err(StateError::NotStarted.into()),
			FacadeState::ModuleLoaded => return Err(StateError::ModuleAlreadyLoaded.into()),
			FacadeState::Unavailable | FacadeState::Stopped => return Err(self.inner.terminal_error()),
		}
		let info = Arc::new(self.inner.lifecycle_step(self.inner.runtime.load_module(name)).await?);
		*self.inner.module.write() = Some(Arc::clone(&info));
		self.inner.set_state(FacadeState::ModuleLoaded);
		info!(
			module = %info.name,
			origin = ?info.origin,
			exports = info.exports.as_ref().map(|e| e.len()),
			"dispatch.module_loaded"
		);
		Ok(info)
	}

	/// Stops the facade. Calls in flight and lifecycle operations still
	/// waiting on the runtime fail with `RuntimeUnavailable`, then the runtime
	/// is torn down.
	pub async fn shutdown(&self) {
		let mut previous = FacadeState::Stopped;
		self.inner.state.send_if_modified(|state| {
			previous = *state;
			if state.is_terminal() {
				return false;
			}
			*state = FacadeState::Stopped;
			true
		});
		if previous == FacadeState::Stopped {
			return;
		}
		// Fired before taking the lifecycle lock so a hung start or load lets go of it.
		self.inner.shutdown.cancel();
		let _guard = self.inner.lifecycle.lock().await;
		self.inner.module.write().take();
		self.inner.runtime.shutdown().await;
		info!(previous = %previous, "dispatch.stopped");
	}

	/// Issues a call and returns a future for its outcome.
	pub fn invoke(&self, function: impl Into<String>, args: Vec<Value>) -> PendingCall {
		self.invoke_with(function, args, CallOptions::default())
	}

	/// [`Self::invoke`] with a timeout or an external cancellation token.
	pub fn invoke_with(&self, function: impl Into<String>, args: Vec<Value>, options: CallOptions) -> PendingCall {
		let (tx, rx) = oneshot::channel();
		let (id, cancel) = self.dispatch(function.into(), args, options, move |outcome| {
			let _ = tx.send(outcome);
		});
		PendingCall::new(id, rx, cancel)
	}

	/// Issues a call and hands its outcome to `callback`.
	///
	/// The callback runs exactly once, on a worker thread, never on the
	/// invoking stack.
	pub fn invoke_with_callback<F>(&self, function: impl Into<String>, args: Vec<Value>, callback: F) -> CallId
	where
		F: FnOnce(Result<Value>) + Send + 'static,
	{
		let (id, _) = self.dispatch(function.into(), args, CallOptions::default(), move |outcome| {
			trustfacts_worker::spawn_blocking(TaskClass::Delivery, move || callback(outcome));
		});
		id
	}

	/// Calls a typed remote function.
	pub fn call<A: Args, O: FromValue>(&self, function: &RemoteFn<A, O>, args: A) -> TypedCall<O> {
		self.call_with(function, args, CallOptions::default())
	}

	pub fn call_with<A: Args, O: FromValue>(&self, function: &RemoteFn<A, O>, args: A, options: CallOptions) -> TypedCall<O> {
		let pending = match args.into_values() {
			Ok(values) => self.invoke_with(function.name(), values, options),
			Err(err) => PendingCall::failed(CallId(self.inner.clock.next()), RuntimeError::from(err).into()),
		};
		TypedCall::new(pending)
	}

	fn dispatch<D>(&self, function: String, args: Vec<Value>, options: CallOptions, deliver: D) -> (CallId, CancellationToken)
	where
		D: FnOnce(Result<Value>) + Send + 'static,
	{
		let id = CallId(self.inner.clock.next());
		let cancel = options.cancel.unwrap_or_default();
		let timeout = options.timeout.or(self.inner.config.default_timeout);
		// The state gate is evaluated at issue time.
		let ready = self.inner.ready_module();

		let inner = Arc::clone(&self.inner);
		let token = cancel.clone();
		trustfacts_worker::spawn(TaskClass::Call, async move {
			let outcome = match ready {
				Ok(module) => inner.run_call(id, &module, &function, args, timeout, &token).await,
				Err(err) => Err(err),
			};
			if let Err(err) = &outcome {
				debug!(call_id = id.raw(), function = %function, kind = err.kind().as_str(), error = %err, "dispatch.call_failed");
			}
			deliver(outcome);
		});
		(id, cancel)
	}
}

impl<R: RegistryRuntime + ?Sized> Inner<R> {
	fn current(&self) -> FacadeState {
		*self.state.borrow()
	}

	/// Moves to `next` unless a terminal state was reached meanwhile.
	fn set_state(&self, next: FacadeState) {
		self.state.send_if_modified(|state| {
			if state.is_terminal() || *state == next {
				return false;
			}
			*state = next;
			true
		});
	}

	fn terminal_error(&self) -> DispatchError {
		match self.current() {
			FacadeState::Stopped => DispatchError::unavailable("dispatcher shut down"),
			_ => {
				let reason = self.down_reason.read().clone();
				DispatchError::unavailable(reason.unwrap_or_else(|| "registry runtime unavailable".into()))
			}
		}
	}

	fn ready_module(&self) -> Result<Arc<ModuleInfo>> {
		match self.current() {
			FacadeState::ModuleLoaded => self.module.read().clone().ok_or(StateError::ModuleNotLoaded.into()),
			FacadeState::Uninitialized => Err(StateError::NotStarted.into()),
			FacadeState::Started => Err(StateError::ModuleNotLoaded.into()),
			FacadeState::Unavailable | FacadeState::Stopped => Err(self.terminal_error()),
		}
	}

	/// Runs a lifecycle step on the runtime, abandoning it on shutdown.
	async fn lifecycle_step<T>(&self, step: impl Future<Output = trustfacts_runtime::Result<T>>) -> Result<T> {
		tokio::select! {
			biased;
			() = self.shutdown.cancelled() => Err(self.terminal_error()),
			outcome = step => self.check(outcome),
		}
	}

	/// Converts a runtime outcome, taking the facade down when the runtime is
	/// gone.
	fn check<T>(&self, outcome: trustfacts_runtime::Result<T>) -> Result<T> {
		outcome.map_err(|err| {
			if err.is_unavailable() {
				self.mark_unavailable(&err);
			}
			err.into()
		})
	}

	fn mark_unavailable(&self, cause: &RuntimeError) {
		if self.current().is_terminal() {
			return;
		}
		let reason = match cause {
			RuntimeError::Unavailable(reason) => reason.clone(),
			other => other.to_string(),
		};
		self.down_reason.write().get_or_insert_with(|| reason.clone());
		let changed = self.state.send_if_modified(|state| {
			if state.is_terminal() {
				return false;
			}
			*state = FacadeState::Unavailable;
			true
		});
		if !changed {
			return;
		}
		warn!(runtime = self.runtime.name(), reason = %reason, "dispatch.runtime_unavailable");
		self.shutdown.cancel();
		let runtime = Arc::clone(&self.runtime);
		trustfacts_worker::spawn(TaskClass::Transport, async move { runtime.shutdown().await });
	}

	async fn run_call(&self, id: CallId, module: &ModuleInfo, function: &str, args: Vec<Value>, timeout: Option<Duration>, cancel: &CancellationToken) -> Result<Value> {
		if let Some(exports) = &module.exports {
			let arity = exports.get(function).ok_or_else(|| RuntimeError::FunctionNotFound {
				function: function.to_owned(),
			})?;
			if !arity.accepts(args.len()) {
				return Err(RuntimeError::ArgumentMismatch {
					function: function.to_owned(),
					reason: format!("expected {arity} arguments, got {}", args.len()),
				}
				.into());
			}
		}

		debug!(call_id = id.raw(), function, args = args.len(), timeout = ?timeout, "dispatch.call");
		let call = async {
			let fut = self.runtime.call(function, args);
			match timeout {
				Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| DispatchError::Timeout(limit))?.map_err(DispatchError::from),
				None => fut.await.map_err(DispatchError::from),
			}
		};
		let outcome = tokio::select! {
			biased;
			() = cancel.cancelled() => Err(DispatchError::Cancelled),
			() = self.shutdown.cancelled() => Err(self.terminal_error()),
			out = call => out,
		};

		if let Err(DispatchError::Runtime(err)) = &outcome
			&& err.is_unavailable()
		{
			self.mark_unavailable(err);
		}
		outcome
	}
}
