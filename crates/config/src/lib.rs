//! Configuration for trustfacts.
//!
//! Settings live in a single TOML file, `trustfacts.toml`, with four optional
//! sections:
//!
//! ```toml
//! [host]
//! program = "python3"
//! args = ["-u"]
//! env = { PYTHONDONTWRITEBYTECODE = "1" }
//! working_dir = "/srv/metrics"
//!
//! [bootstrap]
//! install = true
//! install_command = ["pip", "install", "-r", "requirements.txt"]
//! search_paths = ["env/Lib/site-packages", "./"]
//! module = "controller"
//!
//! [dispatch]
//! call_timeout_ms = 0
//!
//! [marshal]
//! max_depth = 32
//! max_nodes = 50000
//! max_string_len = 1048576
//! ```
//!
//! Every field has a default, so an empty file (or no file at all) describes
//! the stock setup: a `python3` host loading `controller` after a pip install.

mod error;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use error::{ConfigError, Result};
use serde::Deserialize;
use tracing::debug;
use trustfacts_dispatch::{Bootstrap, DispatchConfig};
use trustfacts_runtime::{DependencyInstall, HostCommand, MarshalBudget};

/// File looked up in the working directory when no path is given.
pub const FILE_NAME: &str = "trustfacts.toml";

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	pub host: HostSection,
	pub bootstrap: BootstrapSection,
	pub dispatch: DispatchSection,
	pub marshal: MarshalSection,
}

/// How the interpreter host is launched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostSection {
	pub program: String,
	/// Arguments before the bundled shim.
	pub args: Vec<String>,
	pub env: BTreeMap<String, String>,
	pub working_dir: Option<PathBuf>,
	/// Append `-c <shim>`. Turn off for a program that speaks the host
	/// protocol itself.
	pub shim: bool,
}

impl Default for HostSection {
	fn default() -> Self {
		let command = HostCommand::python();
		Self {
			program: command.program,
			args: command.args,
			env: command.env,
			working_dir: command.working_dir,
			shim: command.shim,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapSection {
	pub install: bool,
	pub install_command: Vec<String>,
	pub search_paths: Vec<PathBuf>,
	pub module: String,
}

impl Default for BootstrapSection {
	fn default() -> Self {
		let bootstrap = Bootstrap::default();
		let install = bootstrap.install.unwrap_or_default();
		Self {
			install: true,
			install_command: std::iter::once(install.program).chain(install.args).collect(),
			search_paths: bootstrap.search_paths,
			module: bootstrap.module,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
	/// Default per-call timeout; 0 disables it.
	pub call_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarshalSection {
	pub max_depth: usize,
	pub max_nodes: usize,
	pub max_string_len: usize,
}

impl Default for MarshalSection {
	fn default() -> Self {
		let budget = MarshalBudget::default();
		Self {
			max_depth: budget.max_depth,
			max_nodes: budget.max_nodes,
			max_string_len: budget.max_string_len,
		}
	}
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
	pub module: Option<String>,
	/// Appended after the configured search paths.
	pub search_paths: Vec<PathBuf>,
	pub call_timeout_ms: Option<u64>,
	pub no_install: bool,
}

impl Config {
	/// Resolves the configuration relative to the current directory.
	///
	/// An explicit path must exist. Without one, `./trustfacts.toml` is used
	/// when present, and the built-in defaults otherwise.
	///
	/// # Errors
	///
	/// Returns an error if the file is missing (explicit path only),
	/// unreadable, malformed or fails validation.
	pub fn load(explicit: Option<&Path>) -> Result<Self> {
		Self::load_in(Path::new("."), explicit)
	}

	/// [`Config::load`] with `dir` standing in for the current directory.
	///
	/// # Errors
	///
	/// Same as [`Config::load`].
	pub fn load_in(dir: &Path, explicit: Option<&Path>) -> Result<Self> {
		match explicit {
			Some(path) if !path.is_file() => Err(ConfigError::Missing { path: path.to_path_buf() }),
			Some(path) => Self::load_from(path),
			None => {
				let path = dir.join(FILE_NAME);
				if path.is_file() {
					Self::load_from(&path)
				} else {
					debug!(dir = %dir.display(), "config.defaults");
					Ok(Self::default())
				}
			}
		}
	}

	/// Reads and validates one file.
	///
	/// # Errors
	///
	/// Returns an error if the file cannot be read, parsed or validated.
	pub fn load_from(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let config = Self::parse(&text, path)?;
		debug!(path = %path.display(), module = %config.bootstrap.module, "config.loaded");
		Ok(config)
	}

	/// Parses and validates TOML text; `path` is only used in errors.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
	pub fn parse(text: &str, path: &Path) -> Result<Self> {
		let config: Self = toml::from_str(text).map_err(|error| ConfigError::Parse {
			path: path.to_path_buf(),
			error,
		})?;
		config.validate()?;
		Ok(config)
	}

	/// # Errors
	///
	/// Returns [`ConfigError::Invalid`] naming the first unusable field.
	pub fn validate(&self) -> Result<()> {
		let invalid = |field, reason: &str| Err(ConfigError::Invalid { field, reason: reason.into() });
		if self.host.program.trim().is_empty() {
			return invalid("host.program", "must not be empty");
		}
		if self.bootstrap.install && self.bootstrap.install_command.is_empty() {
			return invalid("bootstrap.install_command", "must not be empty while install is enabled");
		}
		if self.bootstrap.module.trim().is_empty() {
			return invalid("bootstrap.module", "must not be empty");
		}
		let marshal = &self.marshal;
		if marshal.max_depth == 0 || marshal.max_nodes == 0 || marshal.max_string_len == 0 {
			return invalid("marshal", "limits must be positive");
		}
		Ok(())
	}

	/// Applies command-line overrides.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Invalid`] if the result no longer validates.
	pub fn apply(&mut self, overrides: Overrides) -> Result<()> {
		if let Some(module) = overrides.module {
			self.bootstrap.module = module;
		}
		self.bootstrap.search_paths.extend(overrides.search_paths);
		if let Some(ms) = overrides.call_timeout_ms {
			self.dispatch.call_timeout_ms = ms;
		}
		if overrides.no_install {
			self.bootstrap.install = false;
		}
		self.validate()
	}

	pub fn host_command(&self) -> HostCommand {
		HostCommand {
			program: self.host.program.clone(),
			args: self.host.args.clone(),
			env: self.host.env.clone(),
			working_dir: self.host.working_dir.clone(),
			shim: self.host.shim,
		}
	}

	/// The install step, run in the host's working directory.
	pub fn install(&self) -> Option<DependencyInstall> {
		if !self.bootstrap.install {
			return None;
		}
		DependencyInstall::from_argv(&self.bootstrap.install_command).map(|install| DependencyInstall {
			working_dir: self.host.working_dir.clone(),
			..install
		})
	}

	pub fn bootstrap(&self) -> Bootstrap {
		Bootstrap {
			install: self.install(),
			search_paths: self.bootstrap.search_paths.clone(),
			module: self.bootstrap.module.clone(),
		}
	}

	pub fn dispatch_config(&self) -> DispatchConfig {
		let ms = self.dispatch.call_timeout_ms;
		DispatchConfig {
			default_timeout: (ms > 0).then(|| Duration::from_millis(ms)),
		}
	}

	pub fn marshal_budget(&self) -> MarshalBudget {
		MarshalBudget {
			max_depth: self.marshal.max_depth,
			max_nodes: self.marshal.max_nodes,
			max_string_len: self.marshal.max_string_len,
		}
	}
}

#[cfg(test)]
mod tests;
