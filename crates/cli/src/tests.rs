use std::path::PathBuf;

use clap::Parser;
use pretty_assertions::assert_eq;
use trustfacts_config::Overrides;
use trustfacts_runtime::{MarshalError, Value};

use crate::cli::{Cli, Command, parse_arg};

#[test]
fn call_collects_function_and_args() {
	let cli = Cli::try_parse_from(["trustfacts", "call", "lib_get_release_count", "npm", "left-pad"]).unwrap();
	assert_eq!(
		cli.command,
		Command::Call {
			function: "lib_get_release_count".into(),
			args: vec!["npm".into(), "left-pad".into()],
		}
	);
}

#[test]
fn negative_numbers_are_arguments_not_flags() {
	let cli = Cli::try_parse_from(["trustfacts", "call", "offset", "-3"]).unwrap();
	let Command::Call { args, .. } = cli.command else {
		panic!("expected call");
	};
	assert_eq!(args, ["-3"]);
}

#[test]
fn global_flags_become_overrides() {
	let cli = Cli::try_parse_from([
		"trustfacts",
		"exports",
		"--module",
		"metrics",
		"--path",
		"./mods",
		"--path",
		"./vendor",
		"--timeout-ms",
		"500",
		"--no-install",
	])
	.unwrap();
	assert_eq!(cli.command, Command::Exports);
	assert_eq!(
		cli.overrides(),
		Overrides {
			module: Some("metrics".into()),
			search_paths: vec![PathBuf::from("./mods"), PathBuf::from("./vendor")],
			call_timeout_ms: Some(500),
			no_install: true,
		}
	);
}

#[test]
fn tokens_flags_are_optional() {
	let cli = Cli::try_parse_from(["trustfacts", "tokens", "--github", "ghp_x"]).unwrap();
	assert_eq!(
		cli.command,
		Command::Tokens {
			github: Some("ghp_x".into()),
			libraries: None,
		}
	);
	let cli = Cli::try_parse_from(["trustfacts", "tokens"]).unwrap();
	assert_eq!(cli.command, Command::Tokens { github: None, libraries: None });
}

#[test]
fn subcommand_is_required() {
	assert!(Cli::try_parse_from(["trustfacts"]).is_err());
	assert!(Cli::try_parse_from(["trustfacts", "data"]).is_err());
}

#[test]
fn args_parse_as_json_then_fall_back_to_text() {
	assert_eq!(parse_arg("42"), Ok(Value::Int(42)));
	assert_eq!(parse_arg("\"42\""), Ok(Value::Str("42".into())));
	assert_eq!(parse_arg("[1, null]"), Ok(Value::List(vec![Value::Int(1), Value::Null])));
	assert_eq!(parse_arg("left-pad"), Ok(Value::Str("left-pad".into())));
	assert_eq!(parse_arg("{unclosed"), Ok(Value::Str("{unclosed".into())));
	assert_eq!(parse_arg("sha-118059162071741130342"), Ok(Value::Str("sha-118059162071741130342".into())));
}

#[test]
fn wide_integer_arg_is_rejected_not_rounded() {
	assert_eq!(parse_arg("1180591620717411303424"), Err(MarshalError::IntegerOutOfRange("1180591620717411303424".into())));
	assert_eq!(parse_arg("-1180591620717411303424"), Err(MarshalError::IntegerOutOfRange("-1180591620717411303424".into())));
}

#[test]
fn command_definition_is_consistent() {
	use clap::CommandFactory;
	Cli::command().debug_assert();
}

#[test]
fn verbose_filter_covers_every_crate() {
	let target = module_path!().split("::").next().unwrap();
	assert!(crate::VERBOSE_FILTER.starts_with(&format!("{target}=debug,")), "{}", crate::VERBOSE_FILTER);
	for krate in ["trustfacts_config", "trustfacts_dispatch", "trustfacts_runtime", "trustfacts_rpc"] {
		assert!(crate::VERBOSE_FILTER.contains(&format!("{krate}=debug")), "{krate}");
	}
	tracing_subscriber::EnvFilter::try_new(crate::VERBOSE_FILTER).unwrap();
}
