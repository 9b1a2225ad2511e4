//! Config file resolution and loading
//!
//! Uses serial_test since the resolver reads process environment.

use lavastream_common::config::{load_config, resolve_config_path, ConfigOrigin, CONFIG_ENV_VAR};
use lavastream_common::params::GlobalParams;
use lavastream_common::settings::ResamplingQuality;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[test]
#[serial]
fn test_cli_argument_wins_over_environment() {
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");
    let (path, origin) = resolve_config_path(Some(Path::new("/from/cli.toml"))).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(path, Path::new("/from/cli.toml"));
    assert_eq!(origin, ConfigOrigin::CommandLine);
}

#[test]
#[serial]
fn test_environment_used_without_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");
    let (path, origin) = resolve_config_path(None).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(path, Path::new("/from/env.toml"));
    assert_eq!(origin, ConfigOrigin::Environment);
}

#[test]
#[serial]
fn test_load_config_applies_values() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[player]\nresampling_quality = \"medium\"\nvolume = 42").unwrap();

    let params = GlobalParams::default();
    let loaded = load_config(Some(file.path()), &params).unwrap();

    assert_eq!(loaded.as_deref(), Some(file.path()));
    assert_eq!(params.resampling_quality(), ResamplingQuality::Medium);
    assert_eq!(params.volume(), 42);
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let params = GlobalParams::default();
    assert!(load_config(Some(&missing), &params).is_err());
}
