//! Bring-up sequence: install dependencies, start, extend the search path and
//! load the controller module.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use trustfacts_runtime::{DependencyInstall, InstallReport, ModuleInfo, RegistryRuntime};

use crate::{Dispatcher, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
	/// Run before starting; failures are reported, not fatal.
	pub install: Option<DependencyInstall>,
	pub search_paths: Vec<PathBuf>,
	pub module: String,
}

impl Default for Bootstrap {
	fn default() -> Self {
		Self {
			install: Some(DependencyInstall::default()),
			search_paths: vec![PathBuf::from("env/Lib/site-packages"), PathBuf::from("./")],
			module: "controller".into(),
		}
	}
}

/// Outcome of a successful [`Bootstrap::run`].
#[derive(Debug, Clone)]
pub struct Booted {
	pub install: Option<InstallReport>,
	pub module: Arc<ModuleInfo>,
}

impl Bootstrap {
	/// Runs the sequence against a fresh dispatcher.
	///
	/// # Errors
	///
	/// The first failing lifecycle operation. The install step never fails
	/// the sequence.
	pub async fn run<R: RegistryRuntime + ?Sized>(&self, dispatcher: &Dispatcher<R>) -> Result<Booted> {
		let install = match &self.install {
			Some(step) => Some(step.run().await),
			None => None,
		};
		dispatcher.start().await?;
		for path in &self.search_paths {
			dispatcher.append_search_path(path).await?;
		}
		let module = dispatcher.load_module(&self.module).await?;
		info!(module = %module.name, paths = self.search_paths.len(), "dispatch.bootstrapped");
		Ok(Booted { install, module })
	}
}
