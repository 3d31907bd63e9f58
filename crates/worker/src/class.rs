/// Execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Drives one remote call from issue to completion.
	Call,
	/// Hands a finished call's result to a caller-supplied callback.
	Delivery,
	/// Owns a transport to an out-of-process runtime (message pump, stderr relay).
	Transport,
	/// Blocking work: native handlers and bootstrap commands.
	Blocking,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Call => "call",
			Self::Delivery => "delivery",
			Self::Transport => "transport",
			Self::Blocking => "blocking",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn class_labels_are_distinct() {
		let labels = [TaskClass::Call, TaskClass::Delivery, TaskClass::Transport, TaskClass::Blocking].map(TaskClass::as_str);
		let mut sorted = labels.to_vec();
		sorted.sort_unstable();
		sorted.dedup();
		assert_eq!(sorted.len(), labels.len());
	}
}
