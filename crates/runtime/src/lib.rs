//! Registry runtime boundary for the dispatch facade.
//!
//! A registry runtime hosts the functions callers reach by name. The facade
//! only ever talks to it through [`RegistryRuntime`]:
//!
//! * [`ProcessRuntime`] drives an interpreter host (Python by default) over the
//!   JSON-lines protocol from `trustfacts-rpc`.
//! * [`NativeRuntime`] resolves TOML module manifests on the search path and
//!   binds their exports to Rust handlers.
//!
//! Arguments and results cross the boundary as [`Value`]s, bounded by a
//! [`MarshalBudget`].

mod error;
pub mod install;
mod module;
pub mod native;
pub mod process;
mod value;

use std::path::Path;

use async_trait::async_trait;

pub use error::{Result, RuntimeError};
pub use install::{DependencyInstall, InstallReport};
pub use module::{Arity, ModuleInfo};
pub use native::{HandlerError, HandlerTable, NativeRuntime};
pub use process::{HOST_SHIM, HostCommand, ProcessRuntime};
pub use value::{FromValue, IntoValue, Json, MarshalBudget, MarshalError, Value};

/// Operations the dispatch facade consumes from a registry runtime.
///
/// Implementations must tolerate concurrent `call`s once a module is loaded.
/// Lifecycle methods are only ever issued one at a time by the facade.
#[async_trait]
pub trait RegistryRuntime: Send + Sync + 'static {
	/// Short label used in logs.
	fn name(&self) -> &str;

	/// Acquires the runtime session.
	async fn start(&self) -> Result<()>;

	/// Appends a directory to module resolution. Existence is not checked.
	async fn append_path(&self, path: &Path) -> Result<()>;

	/// Resolves `module` against the search path and makes it active.
	async fn load_module(&self, module: &str) -> Result<ModuleInfo>;

	/// Calls an export of the active module with positional arguments.
	async fn call(&self, function: &str, args: Vec<Value>) -> Result<Value>;

	/// Tears the session down. Later operations fail with
	/// [`RuntimeError::Unavailable`].
	async fn shutdown(&self);
}
