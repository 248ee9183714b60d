// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Runtime configuration for measurement sessions and probing.
// Author: Lukas Bower

//! Agent configuration loaded from TOML.
//!
//! All periods are expressed in session ticks; `tick_ms` converts ticks to
//! wall-clock time. Settings that used to be build-time switches on the device
//! (probing, verbose output, debug timings) are plain fields here.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::noise::NOISE_CAPACITY;

/// Errors produced while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The TOML document did not match the configuration schema.
    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A period or duration was zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    /// The noise flush period is not a whole number of sample periods.
    #[error("flush period {flush} is not a multiple of sample period {sample}")]
    FlushNotMultiple {
        /// Configured flush period in ticks.
        flush: u64,
        /// Configured sample period in ticks.
        sample: u64,
    },
    /// The session would be announced as `AD 0`.
    #[error("session of {millis} ms is shorter than one second")]
    DurationTooShort {
        /// `duration_ticks * tick_ms`.
        millis: u64,
    },
    /// More samples would be buffered between flushes than the buffer holds.
    #[error("{required} noise samples per flush exceed buffer capacity {capacity}")]
    NoiseBufferTooSmall {
        /// Samples taken between two flushes.
        required: u64,
        /// Buffer capacity.
        capacity: usize,
    },
}

/// Session, sampling and probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Length of one session tick in milliseconds.
    pub tick_ms: u64,
    /// Session length in ticks; the session stops itself at this tick.
    pub duration_ticks: u64,
    /// Ticks between background-noise samples.
    pub sample_period_ticks: u64,
    /// Ticks between background-noise reports.
    pub flush_period_ticks: u64,
    /// Ticks between packet statistics reports.
    pub stats_period_ticks: u64,
    /// Probe the first neighbour periodically while a session runs.
    pub probe_enabled: bool,
    /// Ticks between automatic neighbour probes.
    pub probe_interval_ticks: u64,
    /// Time a probe may stay unanswered before it times out.
    pub probe_timeout_ms: u64,
    /// Echo payload size in bytes.
    pub probe_payload_len: u16,
    /// Emit the device id and report legend after the start acknowledgement.
    pub print_help: bool,
    /// Log per-probe details at info level.
    pub debug_output: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            duration_ticks: 36_000,
            sample_period_ticks: 1,
            flush_period_ticks: 100,
            stats_period_ticks: 100,
            probe_enabled: false,
            probe_interval_ticks: 30,
            probe_timeout_ms: 1_000,
            probe_payload_len: 4,
            print_help: true,
            debug_output: false,
        }
    }
}

impl AgentConfig {
    /// Debug profile: slower sampling and verbose probe logging.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            sample_period_ticks: 5,
            flush_period_ticks: 100,
            debug_output: true,
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the invariants the session controller relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("tick_ms", self.tick_ms),
            ("duration_ticks", self.duration_ticks),
            ("sample_period_ticks", self.sample_period_ticks),
            ("flush_period_ticks", self.flush_period_ticks),
            ("stats_period_ticks", self.stats_period_ticks),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(*name));
        }
        let millis = self.duration_ticks.saturating_mul(self.tick_ms);
        if millis < 1_000 {
            return Err(ConfigError::DurationTooShort { millis });
        }
        if self.probe_enabled {
            if self.probe_interval_ticks == 0 {
                return Err(ConfigError::Zero("probe_interval_ticks"));
            }
            if self.probe_timeout_ms == 0 {
                return Err(ConfigError::Zero("probe_timeout_ms"));
            }
        }
        if self.flush_period_ticks % self.sample_period_ticks != 0 {
            return Err(ConfigError::FlushNotMultiple {
                flush: self.flush_period_ticks,
                sample: self.sample_period_ticks,
            });
        }
        let required = self.flush_period_ticks / self.sample_period_ticks;
        if required > NOISE_CAPACITY as u64 {
            return Err(ConfigError::NoiseBufferTooSmall {
                required,
                capacity: NOISE_CAPACITY,
            });
        }
        Ok(())
    }

    /// Session length in whole seconds, as announced in the `AD` line.
    ///
    /// Sub-second remainders are truncated.
    #[must_use]
    pub fn duration_secs(&self) -> u64 {
        self.duration_ticks.saturating_mul(self.tick_ms) / 1_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AgentConfig::default().validate().unwrap();
        AgentConfig::debug().validate().unwrap();
        assert_eq!(AgentConfig::default().duration_secs(), 3_600);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config = AgentConfig::from_toml_str(
            "tick_ms = 1000\nduration_ticks = 3\nsample_period_ticks = 1\nflush_period_ticks = 3\n",
        )
        .unwrap();
        assert_eq!(config.duration_secs(), 3);
        assert_eq!(config.stats_period_ticks, 100);
        assert!(!config.probe_enabled);
    }

    #[test]
    fn rejects_zero_periods() {
        let err = AgentConfig::from_toml_str("stats_period_ticks = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Zero("stats_period_ticks")));
    }

    #[test]
    fn probe_settings_checked_only_when_enabled() {
        let config = AgentConfig {
            probe_interval_ticks: 0,
            ..AgentConfig::default()
        };
        config.validate().unwrap();
        let config = AgentConfig {
            probe_enabled: true,
            ..config
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("probe_interval_ticks"))
        ));
    }

    #[test]
    fn sub_second_session_is_rejected() {
        let err = AgentConfig::from_toml_str("tick_ms = 100\nduration_ticks = 9").unwrap_err();
        assert!(matches!(err, ConfigError::DurationTooShort { millis: 900 }));
        assert_eq!(err.to_string(), "session of 900 ms is shorter than one second");

        let config = AgentConfig::from_toml_str("tick_ms = 100\nduration_ticks = 15").unwrap();
        assert_eq!(config.duration_secs(), 1);
    }

    #[test]
    fn flush_must_be_multiple_of_sample() {
        let err = AgentConfig::from_toml_str("sample_period_ticks = 3\nflush_period_ticks = 10")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::FlushNotMultiple {
                flush: 10,
                sample: 3
            }
        ));
    }

    #[test]
    fn flush_ratio_bounded_by_buffer() {
        let err = AgentConfig::from_toml_str("sample_period_ticks = 1\nflush_period_ticks = 1000")
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoiseBufferTooSmall { required: 1000, .. }));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AgentConfig::from_toml_str("tick = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
