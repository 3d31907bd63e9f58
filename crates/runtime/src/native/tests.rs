use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::*;
use crate::FromValue;

const METRICS: &str = r#"
description = "registry metrics"

[functions.lib_get_release_count]
handler = "release_count"
params = 2

[functions.echo]
handler = "echo"
variadic = true

[functions.boom]
handler = "boom"

[functions.picky]
handler = "picky"
params = 1
"#;

fn handlers() -> HandlerTable {
	HandlerTable::new()
		.with("release_count", |_| Ok(Value::Int(42)))
		.with("echo", |args| Ok(Value::List(args)))
		.with("boom", |_| Err(HandlerError::Failed("registry returned 503".into())))
		.with("picky", |args| {
			let n = i64::from_value(args.into_iter().next().unwrap_or_default())?;
			Ok(Value::Int(n * 2))
		})
		.with("panics", |_| panic!("handler blew up"))
}

fn module_dir(files: &[(&str, &str)]) -> TempDir {
	let dir = tempfile::tempdir().unwrap();
	for (name, body) in files {
		let path = dir.path().join(name);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).unwrap();
		}
		fs::write(path, body).unwrap();
	}
	dir
}

async fn loaded(dir: &TempDir) -> NativeRuntime {
	let rt = NativeRuntime::new(handlers());
	rt.start().await.unwrap();
	rt.append_path(dir.path()).await.unwrap();
	rt.load_module("metrics").await.unwrap();
	rt
}

#[tokio::test]
async fn load_reports_exports_and_origin() {
	let dir = module_dir(&[("metrics.toml", METRICS)]);
	let rt = NativeRuntime::new(handlers());
	rt.start().await.unwrap();
	rt.append_path(dir.path()).await.unwrap();
	let info = rt.load_module("metrics").await.unwrap();

	assert_eq!(info.name, "metrics");
	assert_eq!(info.origin.as_deref(), Some(dir.path().join("metrics.toml").as_path()));
	assert_eq!(info.export("lib_get_release_count"), Some(Arity::exact(2)));
	assert_eq!(info.export("echo"), Some(Arity::variadic(0)));
	assert_eq!(info.export("boom"), Some(Arity::exact(0)));
}

#[tokio::test]
async fn call_runs_bound_handler() {
	let dir = module_dir(&[("metrics.toml", METRICS)]);
	let rt = loaded(&dir).await;
	let out = rt.call("lib_get_release_count", vec!["NPM".into(), "react".into()]).await.unwrap();
	assert_eq!(out, Value::Int(42));
}

#[tokio::test]
async fn dotted_module_maps_to_subdirectory() {
	let dir = module_dir(&[("metrics/github.toml", METRICS)]);
	let rt = NativeRuntime::new(handlers());
	rt.start().await.unwrap();
	rt.append_path(dir.path()).await.unwrap();
	let info = rt.load_module("metrics.github").await.unwrap();
	assert_eq!(info.origin, Some(dir.path().join("metrics").join("github.toml")));
}

#[tokio::test]
async fn earlier_search_path_wins() {
	let first = module_dir(&[("metrics.toml", "[functions.a]\nhandler = \"echo\"\n")]);
	let second = module_dir(&[("metrics.toml", METRICS)]);
	let rt = NativeRuntime::new(handlers());
	rt.start().await.unwrap();
	rt.append_path(first.path()).await.unwrap();
	rt.append_path(second.path()).await.unwrap();
	let info = rt.load_module("metrics").await.unwrap();
	assert_eq!(info.exports.map(|e| e.into_keys().collect::<Vec<_>>()), Some(vec!["a".to_owned()]));
}

#[tokio::test]
async fn missing_module_lists_search_path() {
	let dir = module_dir(&[]);
	let rt = NativeRuntime::new(handlers());
	rt.start().await.unwrap();
	rt.append_path(dir.path()).await.unwrap();
	let err = rt.load_module("controller").await.unwrap_err();
	assert_eq!(
		err,
		RuntimeError::ModuleNotFound {
			module: "controller".into(),
			searched: vec![dir.path().to_path_buf()],
		}
	);
}

#[tokio::test]
async fn path_traversal_is_not_found() {
	let dir = module_dir(&[("metrics.toml", METRICS)]);
	let rt = NativeRuntime::new(handlers());
	rt.start().await.unwrap();
	rt.append_path(dir.path()).await.unwrap();
	assert!(matches!(rt.load_module("..metrics").await, Err(RuntimeError::ModuleNotFound { .. })));
	assert!(matches!(rt.load_module("").await, Err(RuntimeError::ModuleNotFound { .. })));
}

#[tokio::test]
async fn broken_manifest_is_load_error() {
	let dir = module_dir(&[
		("syntax.toml", "[functions.a\n"),
		("unknown_handler.toml", "[functions.a]\nhandler = \"nope\"\n"),
		("unknown_field.toml", "[functions.a]\nhandler = \"echo\"\nretries = 3\n"),
	]);
	let rt = NativeRuntime::new(handlers());
	rt.start().await.unwrap();
	rt.append_path(dir.path()).await.unwrap();
	for module in ["syntax", "unknown_handler", "unknown_field"] {
		let err = rt.load_module(module).await.unwrap_err();
		assert!(matches!(err, RuntimeError::ModuleLoad { .. }), "{module}: {err:?}");
	}
}

#[tokio::test]
async fn unknown_function() {
	let dir = module_dir(&[("metrics.toml", METRICS)]);
	let rt = loaded(&dir).await;
	let err = rt.call("get_nothing", vec![]).await.unwrap_err();
	assert_eq!(err, RuntimeError::FunctionNotFound { function: "get_nothing".into() });
}

#[tokio::test]
async fn wrong_arity_and_bad_argument() {
	let dir = module_dir(&[("metrics.toml", METRICS)]);
	let rt = loaded(&dir).await;
	let err = rt.call("lib_get_release_count", vec!["NPM".into()]).await.unwrap_err();
	assert!(matches!(err, RuntimeError::ArgumentMismatch { ref reason, .. } if reason == "expected 2 arguments, got 1"));

	let err = rt.call("picky", vec!["seven".into()]).await.unwrap_err();
	assert!(matches!(err, RuntimeError::ArgumentMismatch { .. }));
	assert_eq!(rt.call("picky", vec![Value::Int(7)]).await.unwrap(), Value::Int(14));
}

#[tokio::test]
async fn handler_failure_and_panic_are_execution_errors() {
	let dir = module_dir(&[("metrics.toml", "[functions.boom]\nhandler = \"boom\"\n\n[functions.panics]\nhandler = \"panics\"\n")]);
	let rt = loaded(&dir).await;

	let err = rt.call("boom", vec![]).await.unwrap_err();
	assert!(matches!(err, RuntimeError::Execution { ref message, .. } if message == "registry returned 503"));

	let err = rt.call("panics", vec![]).await.unwrap_err();
	assert!(matches!(err, RuntimeError::Execution { ref message, .. } if message.contains("handler blew up")));

	// The runtime keeps serving after a handler panic.
	assert_eq!(rt.call("boom", vec![]).await.unwrap_err().to_string(), "function 'boom' failed: registry returned 503");
}

#[tokio::test]
async fn argument_budget_is_enforced() {
	let dir = module_dir(&[("metrics.toml", METRICS)]);
	let budget = MarshalBudget {
		max_string_len: 4,
		..MarshalBudget::default()
	};
	let rt = NativeRuntime::with_budget(handlers(), budget);
	rt.start().await.unwrap();
	rt.append_path(dir.path()).await.unwrap();
	rt.load_module("metrics").await.unwrap();
	let err = rt.call("echo", vec!["too long".into()]).await.unwrap_err();
	assert_eq!(err, RuntimeError::Marshal(MarshalError::StringTooLong { len: 8, limit: 4 }));
}

#[tokio::test]
async fn lifecycle_is_enforced() {
	let rt = NativeRuntime::new(handlers());
	assert!(matches!(rt.append_path(Path::new("/tmp")).await, Err(RuntimeError::Lifecycle(_))));
	rt.start().await.unwrap();
	assert!(matches!(rt.start().await, Err(RuntimeError::Lifecycle(_))));
	assert!(matches!(rt.call("echo", vec![]).await, Err(RuntimeError::Lifecycle(_))));

	rt.shutdown().await;
	let err = rt.load_module("metrics").await.unwrap_err();
	assert!(err.is_unavailable());
}
