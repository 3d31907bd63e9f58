use std::path::PathBuf;

use clap::{Parser, Subcommand};
use trustfacts_config::Overrides;
use trustfacts_runtime::{MarshalError, Value};

#[derive(Parser, Debug)]
#[command(name = "trustfacts")]
#[command(about = "Call the project metrics controller from the command line")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Config file (defaults to ./trustfacts.toml when present)
	#[arg(short, long, value_name = "PATH", global = true)]
	pub config: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long, global = true)]
	pub verbose: bool,

	/// Module to load instead of the configured one
	#[arg(long, value_name = "MODULE", global = true)]
	pub module: Option<String>,

	/// Extra search path, appended after the configured ones
	#[arg(long = "path", value_name = "DIR", global = true)]
	pub paths: Vec<PathBuf>,

	/// Default call timeout in milliseconds (0 waits forever)
	#[arg(long, value_name = "MS", global = true)]
	pub timeout_ms: Option<u64>,

	/// Skip the dependency install step
	#[arg(long, global = true)]
	pub no_install: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
	/// Call an exported function and print its result as JSON
	Call {
		function: String,
		/// Arguments, each parsed as JSON or taken as a plain string
		#[arg(allow_hyphen_values = true)]
		args: Vec<String>,
	},
	/// Send a data request document to get_data
	Data {
		/// Request file, or - for stdin
		file: PathBuf,
	},
	/// Update the API tokens, or print them when no token is given
	Tokens {
		#[arg(long, value_name = "TOKEN")]
		github: Option<String>,
		#[arg(long, value_name = "TOKEN")]
		libraries: Option<String>,
	},
	/// List the functions the loaded module exports
	Exports,
	/// Run only the dependency install step
	Install,
}

impl Cli {
	pub fn overrides(&self) -> Overrides {
		Overrides {
			module: self.module.clone(),
			search_paths: self.paths.clone(),
			call_timeout_ms: self.timeout_ms,
			no_install: self.no_install,
		}
	}
}

/// Reads a call argument: JSON when it parses, the raw text otherwise.
///
/// # Errors
///
/// An integer literal outside the 64-bit signed range, which would otherwise
/// reach the callee as a rounded float.
pub fn parse_arg(raw: &str) -> Result<Value, MarshalError> {
	match Value::parse_json(raw) {
		Ok(value) => Ok(value),
		Err(err @ MarshalError::IntegerOutOfRange(_)) => Err(err),
		Err(_) => Ok(Value::Str(raw.to_owned())),
	}
}
