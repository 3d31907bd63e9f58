//! Error types for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// An explicitly requested file does not exist.
	#[error("config file not found: {}", path.display())]
	Missing {
		path: PathBuf,
	},

	/// Error reading a configuration file.
	#[error("I/O error reading {}: {error}", path.display())]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The file is not valid TOML or does not match the schema.
	#[error("failed to parse {}: {error}", path.display())]
	Parse {
		path: PathBuf,
		error: toml::de::Error,
	},

	/// A value parsed but cannot be used.
	#[error("invalid value for {field}: {reason}")]
	Invalid {
		field: &'static str,
		reason: String,
	},
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
