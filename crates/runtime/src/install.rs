//! Best-effort dependency installation run before a host runtime starts.
//!
//! The outcome is reported and logged, never enforced: a failed install does
//! not stop the caller from starting the runtime.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{info, warn};
use trustfacts_worker::TaskClass;

/// External command installing the host's dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInstall {
	pub program: String,
	pub args: Vec<String>,
	pub working_dir: Option<PathBuf>,
}

impl Default for DependencyInstall {
	/// `pip install -r requirements.txt`.
	fn default() -> Self {
		Self {
			program: "pip".into(),
			args: ["install", "-r", "requirements.txt"].map(String::from).to_vec(),
			working_dir: None,
		}
	}
}

/// What happened when the install command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
	/// Command line as run, for display.
	pub command: String,
	/// Exit code, when the process ran to completion.
	pub status: Option<i32>,
	pub succeeded: bool,
	/// Launch failure, when the command could not be run at all.
	pub error: Option<String>,
}

impl DependencyInstall {
	/// Builds an install step from a full argv; `None` for an empty one.
	pub fn from_argv(argv: &[String]) -> Option<Self> {
		let (program, args) = argv.split_first()?;
		Some(Self {
			program: program.clone(),
			args: args.to_vec(),
			working_dir: None,
		})
	}

	pub fn command_line(&self) -> String {
		std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str)).collect::<Vec<_>>().join(" ")
	}

	/// Runs the command to completion on the current thread.
	pub fn run_blocking(&self) -> InstallReport {
		let command = self.command_line();
		info!(command = %command, "runtime.install.start");

		let mut cmd = Command::new(&self.program);
		cmd.args(&self.args).stdin(Stdio::null());
		if let Some(dir) = &self.working_dir {
			cmd.current_dir(dir);
		}

		match cmd.status() {
			Ok(status) => {
				let succeeded = status.success();
				if succeeded {
					info!(command = %command, "runtime.install.done");
				} else {
					warn!(command = %command, status = ?status.code(), "runtime.install.failed");
				}
				InstallReport {
					command,
					status: status.code(),
					succeeded,
					error: None,
				}
			}
			Err(err) => {
				warn!(command = %command, error = %err, "runtime.install.launch_failed");
				InstallReport {
					command,
					status: None,
					succeeded: false,
					error: Some(err.to_string()),
				}
			}
		}
	}

	/// Runs the command on the blocking pool.
	pub async fn run(&self) -> InstallReport {
		let this = self.clone();
		let command = self.command_line();
		trustfacts_worker::spawn_blocking(TaskClass::Blocking, move || this.run_blocking())
			.await
			.unwrap_or_else(|err| InstallReport {
				command,
				status: None,
				succeeded: false,
				error: Some(trustfacts_worker::join_error_panic_message(err).unwrap_or_else(|| "install task cancelled".into())),
			})
	}
}
