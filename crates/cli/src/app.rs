use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use trustfacts_config::Config;
use trustfacts_dispatch::{DataRequest, DispatchError, Dispatcher, MetricsClient};
use trustfacts_runtime::{ModuleInfo, ProcessRuntime, Value};

use crate::cli::{Command, parse_arg};

/// Runs one command against a freshly bootstrapped host.
pub async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
	if command == Command::Install {
		return install(config).await;
	}

	let runtime = Arc::new(ProcessRuntime::new(config.host_command()).with_budget(config.marshal_budget()));
	let dispatcher = Dispatcher::with_config(runtime, config.dispatch_config());

	let outcome = match config.bootstrap().run(&dispatcher).await {
		Ok(booted) => {
			if let Some(report) = booted.install.filter(|report| !report.succeeded) {
				warn!(command = %report.command, "dependency install failed, continuing");
			}
			execute(command, &dispatcher, &booted.module).await
		}
		Err(err) => Err(describe(err).context("bootstrap failed")),
	};

	dispatcher.shutdown().await;
	outcome
}

async fn install(config: &Config) -> anyhow::Result<()> {
	let Some(step) = config.install() else {
		bail!("dependency install is disabled");
	};
	let report = step.run().await;
	if let Some(error) = report.error {
		bail!("could not run '{}': {error}", report.command);
	}
	if !report.succeeded {
		bail!("'{}' exited with status {:?}", report.command, report.status);
	}
	info!(command = %report.command, "install finished");
	Ok(())
}

async fn execute(command: Command, dispatcher: &Dispatcher<ProcessRuntime>, module: &ModuleInfo) -> anyhow::Result<()> {
	let client = MetricsClient::new(dispatcher.clone());
	match command {
		Command::Call { function, args } => {
			let args = args.iter().map(|raw| parse_arg(raw)).collect::<Result<Vec<_>, _>>()?;
			let value = dispatcher.invoke(function, args).await.map_err(describe)?;
			print_value(&value)
		}
		Command::Data { file } => {
			let request = read_request(&file).await?;
			let value = client.get_data(request).await.map_err(describe)?;
			print_value(&value)
		}
		Command::Tokens { github, libraries } => match (github, libraries) {
			(Some(github), Some(libraries)) => client.update_tokens(github, libraries).await.map_err(describe),
			(Some(github), None) => client.update_token_gh(github).await.map_err(describe),
			(None, Some(libraries)) => client.update_token_lib(libraries).await.map_err(describe),
			(None, None) => {
				let tokens = client.get_tokens().await.map_err(describe)?.0;
				println!("{}", serde_json::to_string_pretty(&tokens)?);
				Ok(())
			}
		},
		Command::Exports => {
			print_exports(module);
			Ok(())
		}
		Command::Install => unreachable!("handled before bootstrap"),
	}
}

async fn read_request(file: &Path) -> anyhow::Result<DataRequest> {
	let text = if file == Path::new("-") {
		let mut text = String::new();
		tokio::io::stdin().read_to_string(&mut text).await.context("reading request from stdin")?;
		text
	} else {
		tokio::fs::read_to_string(file)
			.await
			.with_context(|| format!("reading {}", file.display()))?
	};
	serde_json::from_str(&text).context("request is not a valid data request document")
}

fn print_value(value: &Value) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(&value.to_json()?)?);
	Ok(())
}

fn print_exports(module: &ModuleInfo) {
	match &module.origin {
		Some(origin) => println!("{} ({})", module.name, origin.display()),
		None => println!("{}", module.name),
	}
	let Some(exports) = &module.exports else {
		println!("  (exports not reported)");
		return;
	};
	for (name, arity) in exports {
		println!("  {name}/{arity}");
	}
}

/// Keeps the error kind and any remote traceback in the report.
fn describe(err: DispatchError) -> anyhow::Error {
	let kind = err.kind().as_str();
	match err.traceback() {
		Some(traceback) => anyhow!("{kind}: {err}\n{}", traceback.trim_end()),
		None => anyhow!("{kind}: {err}"),
	}
}
