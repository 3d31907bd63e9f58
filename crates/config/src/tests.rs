use std::fs;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn empty_file_is_the_stock_setup() {
	let config = Config::parse("", Path::new("trustfacts.toml")).unwrap();
	assert_eq!(config, Config::default());
	assert_eq!(config.host_command(), HostCommand::python());
	assert_eq!(config.bootstrap(), Bootstrap::default());
	assert_eq!(config.dispatch_config().default_timeout, None);
	assert_eq!(config.marshal_budget(), MarshalBudget::default());
}

#[test]
fn unset_working_dir_inherits_the_current_directory() {
	let config = Config::default();
	assert_eq!(config.host.working_dir, None);
	assert_eq!(config.host_command().working_dir, None);
	assert_eq!(config.install().and_then(|install| install.working_dir), None);
}

#[test]
fn sections_override_defaults() {
	let text = r#"
[host]
program = "/opt/venv/bin/python"
env = { PYTHONDONTWRITEBYTECODE = "1" }
working_dir = "/srv/metrics"

[bootstrap]
install_command = ["uv", "pip", "sync", "requirements.txt"]
search_paths = ["./mods"]
module = "metrics"

[dispatch]
call_timeout_ms = 2500

[marshal]
max_depth = 8
"#;
	let config = Config::parse(text, Path::new("trustfacts.toml")).unwrap();

	let host = config.host_command();
	assert_eq!(host.program, "/opt/venv/bin/python");
	assert_eq!(host.args, ["-u"]);
	assert_eq!(host.env.get("PYTHONDONTWRITEBYTECODE").map(String::as_str), Some("1"));
	assert!(host.shim);

	let bootstrap = config.bootstrap();
	let install = bootstrap.install.unwrap();
	assert_eq!(install.command_line(), "uv pip sync requirements.txt");
	assert_eq!(install.working_dir, Some(PathBuf::from("/srv/metrics")));
	assert_eq!(bootstrap.search_paths, [PathBuf::from("./mods")]);
	assert_eq!(bootstrap.module, "metrics");

	assert_eq!(config.dispatch_config().default_timeout, Some(Duration::from_millis(2500)));
	assert_eq!(config.marshal_budget().max_depth, 8);
	assert_eq!(config.marshal_budget().max_nodes, 50_000);
}

#[test]
fn unknown_keys_are_rejected() {
	let err = Config::parse("[host]\nprogramme = \"python\"\n", Path::new("bad.toml")).unwrap_err();
	assert!(matches!(err, ConfigError::Parse { .. }), "{err}");
	assert!(err.to_string().contains("bad.toml"), "{err}");
}

#[test]
fn validation_names_the_field() {
	let err = Config::parse("[bootstrap]\nmodule = \"\"\n", Path::new("trustfacts.toml")).unwrap_err();
	assert!(matches!(err, ConfigError::Invalid { field: "bootstrap.module", .. }), "{err}");

	let err = Config::parse("[bootstrap]\ninstall_command = []\n", Path::new("trustfacts.toml")).unwrap_err();
	assert!(matches!(err, ConfigError::Invalid { field: "bootstrap.install_command", .. }), "{err}");

	Config::parse("[bootstrap]\ninstall = false\ninstall_command = []\n", Path::new("trustfacts.toml")).unwrap();

	let err = Config::parse("[marshal]\nmax_nodes = 0\n", Path::new("trustfacts.toml")).unwrap_err();
	assert!(matches!(err, ConfigError::Invalid { field: "marshal", .. }), "{err}");
}

#[test]
fn overrides_take_precedence_and_paths_append() {
	let mut config = Config::default();
	config
		.apply(Overrides {
			module: Some("metrics".into()),
			search_paths: vec![PathBuf::from("./mods")],
			call_timeout_ms: Some(100),
			no_install: true,
		})
		.unwrap();

	let bootstrap = config.bootstrap();
	assert_eq!(bootstrap.module, "metrics");
	assert_eq!(bootstrap.install, None);
	assert_eq!(
		bootstrap.search_paths,
		[PathBuf::from("env/Lib/site-packages"), PathBuf::from("./"), PathBuf::from("./mods")]
	);
	assert_eq!(config.dispatch_config().default_timeout, Some(Duration::from_millis(100)));

	let err = config
		.apply(Overrides {
			module: Some(String::new()),
			..Overrides::default()
		})
		.unwrap_err();
	assert!(matches!(err, ConfigError::Invalid { .. }));
}

#[test]
fn load_in_prefers_explicit_then_local_file() {
	let dir = tempfile::tempdir().unwrap();

	assert_eq!(Config::load_in(dir.path(), None).unwrap(), Config::default());

	fs::write(dir.path().join(FILE_NAME), "[bootstrap]\nmodule = \"local\"\n").unwrap();
	assert_eq!(Config::load_in(dir.path(), None).unwrap().bootstrap.module, "local");

	let explicit = dir.path().join("other.toml");
	fs::write(&explicit, "[bootstrap]\nmodule = \"explicit\"\n").unwrap();
	assert_eq!(Config::load_in(dir.path(), Some(&explicit)).unwrap().bootstrap.module, "explicit");
}

#[test]
fn missing_explicit_file_is_an_error() {
	let dir = tempfile::tempdir().unwrap();
	fs::write(dir.path().join(FILE_NAME), "").unwrap();

	let missing = dir.path().join("absent.toml");
	let err = Config::load_in(dir.path(), Some(&missing)).unwrap_err();
	assert!(matches!(err, ConfigError::Missing { path } if path == missing));
}
