// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate loading agent configuration files from disk.
// Author: Lukas Bower

use std::io::Write;

use stats_agent::config::{AgentConfig, ConfigError};
use tempfile::NamedTempFile;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(text.as_bytes()).expect("write temp config");
    file
}

#[test]
fn loads_probe_profile_from_file() {
    let file = write_config(
        r#"
tick_ms = 100
duration_ticks = 600
sample_period_ticks = 5
flush_period_ticks = 100
probe_enabled = true
probe_interval_ticks = 30
probe_timeout_ms = 1000
debug_output = true
"#,
    );
    let config = AgentConfig::load(file.path()).unwrap();
    assert_eq!(config.duration_secs(), 60);
    assert!(config.probe_enabled);
    assert!(config.debug_output);
    assert!(config.print_help);
    assert_eq!(config.probe_payload_len, 4);
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = AgentConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn invalid_file_is_rejected_before_use() {
    let file = write_config("sample_period_ticks = 4\nflush_period_ticks = 10\n");
    let err = AgentConfig::load(file.path()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "flush period 10 is not a multiple of sample period 4"
    );

    let file = write_config("duration_ticks = \"long\"\n");
    assert!(matches!(
        AgentConfig::load(file.path()),
        Err(ConfigError::Parse(_))
    ));
}
