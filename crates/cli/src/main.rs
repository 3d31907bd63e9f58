//! trustfacts command-line front end.
//!
//! Bootstraps the metrics controller in an interpreter host, runs one
//! command against it and shuts the host down again.

mod app;
mod cli;
#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::Parser;
use cli::Cli;
use trustfacts_config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	setup_tracing(cli.verbose);

	let mut config = Config::load(cli.config.as_deref())?;
	config.apply(cli.overrides())?;

	app::run(cli.command, &config).await
}

/// Directives used for `--verbose` when `RUST_LOG` is unset. The binary's
/// own target is its crate name.
const VERBOSE_FILTER: &str = concat!(
	module_path!(),
	"=debug,trustfacts_config=debug,trustfacts_dispatch=debug,trustfacts_runtime=debug,trustfacts_rpc=debug,info"
);

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new(VERBOSE_FILTER)
			} else {
				EnvFilter::new("warn")
			}
		})
	};

	if let Some(log_dir) = std::env::var("TRUSTFACTS_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("trustfacts.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false).with_target(true);

			tracing_subscriber::registry().with(filter()).with(file_layer).init();

			tracing::info!(path = ?log_path, "tracing initialized");
			return;
		}
	}

	// stdout carries command output
	tracing_subscriber::fmt().with_env_filter(filter()).with_writer(std::io::stderr).init();
}
