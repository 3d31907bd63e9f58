use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source for dispatched calls.
///
/// Clones share the same counter. The first id handed out is 1.
#[derive(Debug, Default, Clone)]
pub struct CallClock {
	next: Arc<AtomicU64>,
}

impl CallClock {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next id.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}
