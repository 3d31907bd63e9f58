use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Positional parameter count accepted by an exported function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arity {
	pub required: usize,
	/// `None` for variadic functions.
	#[serde(default)]
	pub max: Option<usize>,
}

impl Arity {
	pub const fn exact(n: usize) -> Self {
		Self { required: n, max: Some(n) }
	}

	pub const fn range(required: usize, max: usize) -> Self {
		Self { required, max: Some(max) }
	}

	pub const fn variadic(required: usize) -> Self {
		Self { required, max: None }
	}

	pub fn accepts(&self, count: usize) -> bool {
		count >= self.required && self.max.is_none_or(|max| count <= max)
	}
}

impl fmt::Display for Arity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.max {
			Some(max) if max == self.required => write!(f, "{max}"),
			Some(max) => write!(f, "{}..={max}", self.required),
			None => write!(f, "{}..", self.required),
		}
	}
}

/// Description of the active module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
	pub name: String,
	/// Source the module was loaded from, when the runtime knows it.
	#[serde(default)]
	pub origin: Option<PathBuf>,
	/// Exported functions, or `None` when the runtime cannot enumerate them.
	#[serde(default)]
	pub exports: Option<BTreeMap<String, Arity>>,
}

impl ModuleInfo {
	/// Looks up one export. `None` means unknown, not absent, when
	/// [`Self::exports`] is `None`.
	pub fn export(&self, function: &str) -> Option<Arity> {
		self.exports.as_ref()?.get(function).copied()
	}

	/// Returns false only when the module is known not to export `function`.
	pub fn may_export(&self, function: &str) -> bool {
		self.exports.as_ref().is_none_or(|exports| exports.contains_key(function))
	}
}
