use std::fmt;

/// Lifecycle state of a [`Dispatcher`](crate::Dispatcher).
///
/// `Uninitialized → Started → ModuleLoaded`. `Unavailable` (the runtime died)
/// and `Stopped` (explicit shutdown) are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FacadeState {
	#[default]
	Uninitialized,
	Started,
	ModuleLoaded,
	Unavailable,
	Stopped,
}

impl FacadeState {
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Unavailable | Self::Stopped)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Uninitialized => "uninitialized",
			Self::Started => "started",
			Self::ModuleLoaded => "module_loaded",
			Self::Unavailable => "unavailable",
			Self::Stopped => "stopped",
		}
	}
}

impl fmt::Display for FacadeState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
