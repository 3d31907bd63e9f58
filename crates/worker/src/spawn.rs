use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

use crate::TaskClass;

/// Returns the active tokio runtime handle, or the global fallback runtime.
pub fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("trustfacts-worker")
			.build()
			.expect("failed to build trustfacts-worker global tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns an async task tagged with its worker class.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	runtime_handle().spawn(fut)
}

/// Spawns blocking work tagged with its worker class.
pub fn spawn_blocking<F, R>(class: TaskClass, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn_blocking");
	runtime_handle().spawn_blocking(f)
}

#[cfg(test)]
mod tests {
	use std::sync::mpsc;
	use std::time::Duration;

	use super::*;

	#[test]
	fn spawn_without_ambient_runtime_uses_fallback() {
		let (tx, rx) = mpsc::channel();
		let _handle = spawn(TaskClass::Delivery, async move {
			let _ = tx.send(std::thread::current().name().map(str::to_owned));
		});
		let name = rx.recv_timeout(Duration::from_secs(5)).expect("task ran");
		assert_eq!(name.as_deref(), Some("trustfacts-worker"));
	}

	#[tokio::test]
	async fn spawn_blocking_returns_value() {
		let value = spawn_blocking(TaskClass::Blocking, || 6 * 7).await.expect("joined");
		assert_eq!(value, 42);
	}
}
