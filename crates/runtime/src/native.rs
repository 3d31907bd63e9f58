//! In-process registry runtime backed by Rust handlers.
//!
//! A module is a TOML manifest found on the search path. Dotted module names
//! map to subdirectories, so `metrics.github` resolves to
//! `<path>/metrics/github.toml`. The manifest binds each exported function to a
//! handler registered in a [`HandlerTable`]:
//!
//! ```toml
//! description = "registry metrics"
//!
//! [functions.lib_get_release_count]
//! handler = "release_count"
//! params = 2
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use trustfacts_worker::{TaskClass, join_error_panic_message};

use crate::value::{MarshalBudget, MarshalError, Value};
use crate::{Arity, ModuleInfo, RegistryRuntime, Result, RuntimeError};

/// Hard limit on manifest size.
const MAX_MANIFEST_BYTES: u64 = 256 * 1024;

/// Failure reported by a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
	#[error("{0}")]
	Failed(String),
	/// The arguments have the right count but not the right shape.
	#[error("{0}")]
	BadArgument(String),
}

impl From<MarshalError> for HandlerError {
	fn from(err: MarshalError) -> Self {
		Self::BadArgument(err.to_string())
	}
}

type Handler = Arc<dyn Fn(Vec<Value>) -> std::result::Result<Value, HandlerError> + Send + Sync>;

/// Handlers manifests may bind to, by id.
#[derive(Clone, Default)]
pub struct HandlerTable {
	handlers: HashMap<String, Handler>,
}

impl fmt::Debug for HandlerTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut ids: Vec<_> = self.handlers.keys().collect();
		ids.sort();
		f.debug_struct("HandlerTable").field("handlers", &ids).finish()
	}
}

impl HandlerTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a handler, replacing any previous one with the same id.
	pub fn insert<F>(&mut self, id: impl Into<String>, handler: F)
	where
		F: Fn(Vec<Value>) -> std::result::Result<Value, HandlerError> + Send + Sync + 'static,
	{
		self.handlers.insert(id.into(), Arc::new(handler));
	}

	#[must_use]
	pub fn with<F>(mut self, id: impl Into<String>, handler: F) -> Self
	where
		F: Fn(Vec<Value>) -> std::result::Result<Value, HandlerError> + Send + Sync + 'static,
	{
		self.insert(id, handler);
		self
	}

	pub fn contains(&self, id: &str) -> bool {
		self.handlers.contains_key(id)
	}

	pub fn len(&self) -> usize {
		self.handlers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.handlers.is_empty()
	}

	fn get(&self, id: &str) -> Option<Handler> {
		self.handlers.get(id).cloned()
	}
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
	#[serde(default)]
	#[allow(dead_code, reason = "documentation field, accepted but unused")]
	description: Option<String>,
	#[serde(default)]
	functions: BTreeMap<String, FunctionDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FunctionDecl {
	handler: String,
	#[serde(default)]
	params: usize,
	#[serde(default)]
	optional: usize,
	#[serde(default)]
	variadic: bool,
}

impl FunctionDecl {
	fn arity(&self) -> Arity {
		if self.variadic {
			Arity::variadic(self.params)
		} else {
			Arity::range(self.params, self.params + self.optional)
		}
	}
}

struct Bound {
	arity: Arity,
	handler: Handler,
}

struct LoadedModule {
	info: ModuleInfo,
	functions: HashMap<String, Bound>,
}

#[derive(Default)]
struct State {
	started: bool,
	stopped: bool,
	search_paths: Vec<PathBuf>,
	module: Option<Arc<LoadedModule>>,
}

/// Registry runtime resolving TOML manifests and running Rust handlers.
pub struct NativeRuntime {
	handlers: HandlerTable,
	budget: MarshalBudget,
	state: RwLock<State>,
}

impl fmt::Debug for NativeRuntime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.read();
		f.debug_struct("NativeRuntime")
			.field("handlers", &self.handlers)
			.field("search_paths", &state.search_paths)
			.field("module", &state.module.as_ref().map(|m| m.info.name.as_str()))
			.finish_non_exhaustive()
	}
}

impl NativeRuntime {
	pub fn new(handlers: HandlerTable) -> Self {
		Self::with_budget(handlers, MarshalBudget::default())
	}

	pub fn with_budget(handlers: HandlerTable, budget: MarshalBudget) -> Self {
		Self {
			handlers,
			budget,
			state: RwLock::new(State::default()),
		}
	}

	pub fn search_paths(&self) -> Vec<PathBuf> {
		self.state.read().search_paths.clone()
	}

	fn ensure_live(&self) -> Result<()> {
		let state = self.state.read();
		if state.stopped {
			return Err(RuntimeError::Unavailable("native runtime shut down".into()));
		}
		if !state.started {
			return Err(RuntimeError::Lifecycle("native runtime not started"));
		}
		Ok(())
	}
}

#[async_trait]
impl RegistryRuntime for NativeRuntime {
	fn name(&self) -> &str {
		"native"
	}

	async fn start(&self) -> Result<()> {
		let mut state = self.state.write();
		if state.stopped {
			return Err(RuntimeError::Unavailable("native runtime shut down".into()));
		}
		if state.started {
			return Err(RuntimeError::Lifecycle("native runtime already started"));
		}
		state.started = true;
		Ok(())
	}

	async fn append_path(&self, path: &Path) -> Result<()> {
		self.ensure_live()?;
		self.state.write().search_paths.push(path.to_path_buf());
		Ok(())
	}

	async fn load_module(&self, module: &str) -> Result<ModuleInfo> {
		self.ensure_live()?;
		let paths = self.search_paths();
		let handlers = self.handlers.clone();
		let name = module.to_owned();
		let loaded = trustfacts_worker::spawn_blocking(TaskClass::Blocking, move || load_manifest(&name, &paths, &handlers))
			.await
			.map_err(|err| RuntimeError::ModuleLoad {
				module: module.to_owned(),
				reason: join_error_panic_message(err).unwrap_or_else(|| "loader task cancelled".into()),
			})??;

		let info = loaded.info.clone();
		tracing::debug!(module = %info.name, origin = ?info.origin, exports = loaded.functions.len(), "runtime.native.loaded");
		self.state.write().module = Some(Arc::new(loaded));
		Ok(info)
	}

	async fn call(&self, function: &str, args: Vec<Value>) -> Result<Value> {
		self.ensure_live()?;
		let module = self.state.read().module.clone().ok_or(RuntimeError::Lifecycle("no module loaded"))?;
		let bound = module.functions.get(function).ok_or_else(|| RuntimeError::FunctionNotFound {
			function: function.to_owned(),
		})?;
		if !bound.arity.accepts(args.len()) {
			return Err(RuntimeError::ArgumentMismatch {
				function: function.to_owned(),
				reason: format!("expected {} arguments, got {}", bound.arity, args.len()),
			});
		}
		self.budget.check_all(&args)?;

		let handler = Arc::clone(&bound.handler);
		let outcome = trustfacts_worker::spawn_blocking(TaskClass::Blocking, move || handler(args))
			.await
			.map_err(|err| RuntimeError::Execution {
				function: function.to_owned(),
				message: join_error_panic_message(err).map_or_else(|| "handler cancelled".into(), |msg| format!("handler panicked: {msg}")),
				traceback: None,
			})?;

		let value = outcome.map_err(|err| match err {
			HandlerError::Failed(message) => RuntimeError::Execution {
				function: function.to_owned(),
				message,
				traceback: None,
			},
			HandlerError::BadArgument(reason) => RuntimeError::ArgumentMismatch {
				function: function.to_owned(),
				reason,
			},
		})?;
		self.budget.check(&value)?;
		Ok(value)
	}

	async fn shutdown(&self) {
		let mut state = self.state.write();
		state.stopped = true;
		state.module = None;
	}
}

fn module_file(module: &str) -> Option<PathBuf> {
	let mut rel = PathBuf::new();
	for segment in module.split('.') {
		if segment.is_empty() || segment.contains(['/', '\\']) || segment == ".." {
			return None;
		}
		rel.push(segment);
	}
	rel.set_extension("toml");
	Some(rel)
}

fn load_manifest(module: &str, paths: &[PathBuf], handlers: &HandlerTable) -> Result<LoadedModule> {
	let not_found = || RuntimeError::ModuleNotFound {
		module: module.to_owned(),
		searched: paths.to_vec(),
	};
	let rel = module_file(module).ok_or_else(not_found)?;
	let origin = paths.iter().map(|dir| dir.join(&rel)).find(|candidate| candidate.is_file()).ok_or_else(not_found)?;

	let load_err = |reason: String| RuntimeError::ModuleLoad {
		module: module.to_owned(),
		reason,
	};
	let metadata = std::fs::metadata(&origin).map_err(|e| load_err(format!("failed to read {}: {e}", origin.display())))?;
	if metadata.len() > MAX_MANIFEST_BYTES {
		return Err(load_err(format!("manifest exceeds {MAX_MANIFEST_BYTES} byte limit")));
	}
	let source = std::fs::read_to_string(&origin).map_err(|e| load_err(format!("failed to read {}: {e}", origin.display())))?;
	let manifest: Manifest = toml::from_str(&source).map_err(|e| load_err(format!("{}: {e}", origin.display())))?;

	let mut functions = HashMap::with_capacity(manifest.functions.len());
	let mut exports = BTreeMap::new();
	for (name, decl) in manifest.functions {
		let handler = handlers
			.get(&decl.handler)
			.ok_or_else(|| load_err(format!("function '{name}' binds unknown handler '{}'", decl.handler)))?;
		let arity = decl.arity();
		exports.insert(name.clone(), arity);
		functions.insert(name, Bound { arity, handler });
	}

	Ok(LoadedModule {
		info: ModuleInfo {
			name: module.to_owned(),
			origin: Some(origin),
			exports: Some(exports),
		},
		functions,
	})
}

#[cfg(test)]
mod tests;
