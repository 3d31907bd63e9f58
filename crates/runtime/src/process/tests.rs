use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use trustfacts_rpc::{FaultKind, HostResponse};

use super::*;
use crate::{Arity, MarshalError};

type SharedWriter = Arc<AsyncMutex<WriteHalf<DuplexStream>>>;

async fn reply(writer: &SharedWriter, response: HostResponse) {
	let mut line = serde_json::to_vec(&response).unwrap();
	line.push(b'\n');
	let mut writer = writer.lock().await;
	writer.write_all(&line).await.unwrap();
	writer.flush().await.unwrap();
}

/// Minimal stand-in for the interpreter shim.
async fn fake_host(stream: DuplexStream) {
	let (read, write) = tokio::io::split(stream);
	let writer: SharedWriter = Arc::new(AsyncMutex::new(write));
	let mut lines = BufReader::new(read).lines();
	// Noise a chatty interpreter might print before answering.
	reply_raw(&writer, "warming up\n").await;

	while let Ok(Some(line)) = lines.next_line().await {
		let request: HostRequest = serde_json::from_str(&line).unwrap();
		let id = request.id;
		match request.op {
			HostOp::AppendPath { .. } => reply(&writer, HostResponse::ok(id, JsonValue::Null)).await,
			HostOp::LoadModule { module } if module == "metrics" => {
				let info = json!({
					"name": "metrics",
					"origin": "/srv/mods/metrics.py",
					"exports": {
						"lib_get_release_count": {"required": 2, "max": 2},
						"slow": {"required": 0, "max": 0},
					},
				});
				reply(&writer, HostResponse::ok(id, info)).await;
			}
			HostOp::LoadModule { module } => {
				reply(&writer, HostResponse::err(id, RemoteFault::new(FaultKind::ModuleNotFound, format!("no module named {module:?}")))).await;
			}
			HostOp::Call { function, args } => match function.as_str() {
				"lib_get_release_count" => reply(&writer, HostResponse::ok(id, json!(42))).await,
				"echo" => reply(&writer, HostResponse::ok(id, JsonValue::Array(args))).await,
				"fail" => {
					let fault = RemoteFault {
						kind: FaultKind::Execution,
						message: "KeyError: 'stars'".into(),
						traceback: Some("Traceback (most recent call last):\n  ...".into()),
					};
					reply(&writer, HostResponse::err(id, fault)).await;
				}
				"slow" => {
					let writer = Arc::clone(&writer);
					tokio::spawn(async move {
						tokio::time::sleep(Duration::from_millis(50)).await;
						reply(&writer, HostResponse::ok(id, json!("slow"))).await;
					});
				}
				"big" => reply_raw(&writer, &format!("{{\"id\": {id}, \"ok\": 1180591620717411303424}}\n")).await,
				"hang" => {}
				"die" => return,
				_ => reply(&writer, HostResponse::err(id, RemoteFault::new(FaultKind::FunctionNotFound, function.clone()))).await,
			},
			HostOp::Shutdown => {
				reply(&writer, HostResponse::ok(id, JsonValue::Null)).await;
				return;
			}
		}
	}
}

async fn reply_raw(writer: &SharedWriter, raw: &str) {
	writer.lock().await.write_all(raw.as_bytes()).await.unwrap();
}

async fn connected() -> ProcessRuntime {
	let (ours, theirs) = tokio::io::duplex(64 * 1024);
	tokio::spawn(fake_host(theirs));
	let (read, write) = tokio::io::split(ours);
	let rt = ProcessRuntime::from_streams("fake", read, write);
	rt.start().await.unwrap();
	rt
}

async fn loaded() -> ProcessRuntime {
	let rt = connected().await;
	rt.append_path(Path::new("./mods")).await.unwrap();
	rt.load_module("metrics").await.unwrap();
	rt
}

#[tokio::test]
async fn load_and_call() {
	let rt = connected().await;
	rt.append_path(Path::new("./mods")).await.unwrap();
	let info = rt.load_module("metrics").await.unwrap();
	assert_eq!(info.name, "metrics");
	assert_eq!(info.origin, Some(PathBuf::from("/srv/mods/metrics.py")));
	assert_eq!(info.export("lib_get_release_count"), Some(Arity::exact(2)));

	let out = rt.call("lib_get_release_count", vec!["npm".into(), "left-pad".into()]).await.unwrap();
	assert_eq!(out, Value::Int(42));
}

#[tokio::test]
async fn arguments_cross_as_json() {
	let rt = loaded().await;
	let args = vec![Value::Null, Value::Float(1.5), Value::from(vec!["a", "b"])];
	let out = rt.call("echo", args.clone()).await.unwrap();
	assert_eq!(out, Value::List(args));
}

#[tokio::test]
async fn missing_module_reports_search_path() {
	let rt = connected().await;
	rt.append_path(Path::new("./mods")).await.unwrap();
	rt.append_path(Path::new("./mods")).await.unwrap();
	let err = rt.load_module("controller").await.unwrap_err();
	assert_eq!(
		err,
		RuntimeError::ModuleNotFound {
			module: "controller".into(),
			searched: vec![PathBuf::from("./mods"), PathBuf::from("./mods")],
		}
	);
}

#[tokio::test]
async fn remote_failures_keep_their_kind() {
	let rt = loaded().await;
	let err = rt.call("fail", vec![]).await.unwrap_err();
	let RuntimeError::Execution { function, message, traceback } = err else {
		panic!("expected execution error, got {err:?}");
	};
	assert_eq!(function, "fail");
	assert_eq!(message, "KeyError: 'stars'");
	assert!(traceback.is_some_and(|tb| tb.starts_with("Traceback")));

	let err = rt.call("nonexistent_fn", vec![]).await.unwrap_err();
	assert_eq!(err, RuntimeError::FunctionNotFound { function: "nonexistent_fn".into() });
}

#[tokio::test]
async fn integer_wider_than_i64_is_a_marshal_error() {
	let rt = loaded().await;
	let err = rt.call("big", vec![]).await.unwrap_err();
	let RuntimeError::Marshal(MarshalError::Remote(message)) = err else {
		panic!("expected marshal error, got {err:?}");
	};
	assert!(message.contains("1180591620717411303424"), "{message}");
	assert_eq!(rt.call("lib_get_release_count", vec!["npm".into(), "x".into()]).await.unwrap(), Value::Int(42));
}

#[tokio::test]
async fn concurrent_calls_complete_out_of_order() {
	let rt = Arc::new(loaded().await);
	let slow = tokio::spawn({
		let rt = Arc::clone(&rt);
		async move { rt.call("slow", vec![]).await }
	});
	tokio::time::sleep(Duration::from_millis(5)).await;
	let fast = rt.call("lib_get_release_count", vec!["npm".into(), "x".into()]).await.unwrap();
	assert_eq!(fast, Value::Int(42));
	assert_eq!(slow.await.unwrap().unwrap(), Value::from("slow"));
}

#[tokio::test]
async fn host_death_fails_pending_and_later_calls() {
	let rt = Arc::new(loaded().await);
	let hung = tokio::spawn({
		let rt = Arc::clone(&rt);
		async move { rt.call("hang", vec![]).await }
	});
	tokio::time::sleep(Duration::from_millis(5)).await;
	let err = rt.call("die", vec![]).await.unwrap_err();
	assert!(err.is_unavailable(), "{err:?}");
	assert!(hung.await.unwrap().unwrap_err().is_unavailable());
	assert!(rt.call("lib_get_release_count", vec![]).await.unwrap_err().is_unavailable());
}

#[tokio::test]
async fn oversized_arguments_never_leave_the_process() {
	let (ours, theirs) = tokio::io::duplex(64 * 1024);
	tokio::spawn(fake_host(theirs));
	let (read, write) = tokio::io::split(ours);
	let budget = MarshalBudget {
		max_depth: 2,
		..MarshalBudget::default()
	};
	let rt = ProcessRuntime::from_streams("fake", read, write).with_budget(budget);
	rt.start().await.unwrap();
	rt.load_module("metrics").await.unwrap();

	let nested = Value::List(vec![Value::List(vec![Value::Int(1)])]);
	let err = rt.call("echo", vec![nested]).await.unwrap_err();
	assert_eq!(err, RuntimeError::Marshal(MarshalError::TooDeep { limit: 2 }));
	let err = rt.call("echo", vec![Value::Float(f64::NAN)]).await.unwrap_err();
	assert_eq!(err, RuntimeError::Marshal(MarshalError::NonFiniteFloat));
}

#[tokio::test]
async fn shutdown_is_terminal() {
	let rt = loaded().await;
	rt.shutdown().await;
	assert!(rt.call("lib_get_release_count", vec![]).await.unwrap_err().is_unavailable());
	assert!(rt.start().await.unwrap_err().is_unavailable());
}

#[tokio::test]
async fn lifecycle_order() {
	let (ours, _theirs) = tokio::io::duplex(1024);
	let (read, write) = tokio::io::split(ours);
	let rt = ProcessRuntime::from_streams("fake", read, write);
	assert!(matches!(rt.load_module("metrics").await, Err(RuntimeError::Lifecycle(_))));
	rt.start().await.unwrap();
	assert!(matches!(rt.start().await, Err(RuntimeError::Lifecycle(_))));
}

#[tokio::test]
async fn missing_program_is_spawn_error() {
	let rt = ProcessRuntime::new(HostCommand {
		program: "trustfacts-no-such-interpreter".into(),
		args: vec![],
		env: BTreeMap::new(),
		working_dir: None,
		shim: false,
	});
	let err = rt.start().await.unwrap_err();
	assert!(matches!(err, RuntimeError::Spawn { ref program, .. } if program == "trustfacts-no-such-interpreter"));
	assert!(err.is_unavailable());
}

#[test]
fn python_command_embeds_shim() {
	let cmd = HostCommand::python();
	let argv = cmd.argv();
	assert_eq!(&argv[..2], ["-u", "-c"]);
	assert_eq!(argv[2], HOST_SHIM);
	assert!(HOST_SHIM.contains("\"load_module\""));
}
