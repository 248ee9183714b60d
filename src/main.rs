// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the host-mode stats agent simulation.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the host-mode stats agent simulation.

use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::LevelFilter;

use stats_agent::config::AgentConfig;
use stats_agent::host::{self, SimOptions};

/// Stats agent command-line arguments.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Radio statistics agent simulation", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from the debug timing profile instead of the defaults.
    #[arg(long, default_value_t = false, conflicts_with = "config")]
    debug_profile: bool,

    /// Override the session length in ticks.
    #[arg(long)]
    duration_ticks: Option<u64>,

    /// Override the tick period in milliseconds.
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Probe the first neighbour periodically while a session runs.
    #[arg(long, default_value_t = false)]
    probe: bool,

    /// Neighbour table entries of the simulated network.
    #[arg(long = "neighbor", value_name = "ADDR")]
    neighbors: Vec<Ipv6Addr>,

    /// Probability that a simulated echo exchange is lost.
    #[arg(long, default_value_t = 0.1)]
    loss: f64,

    /// Seed for the simulated collaborators.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Enable debug logging.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None if cli.debug_profile => AgentConfig::debug(),
        None => AgentConfig::default(),
    };
    if let Some(ticks) = cli.duration_ticks {
        config.duration_ticks = ticks;
    }
    if let Some(tick_ms) = cli.tick_ms {
        config.tick_ms = tick_ms;
    }
    if cli.probe {
        config.probe_enabled = true;
    }
    config.validate().context("invalid configuration overrides")?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;

    let mut options = SimOptions {
        seed: cli.seed,
        loss: cli.loss,
        poll_interval: Duration::from_millis(config.tick_ms.clamp(1, 10)),
        ..SimOptions::default()
    };
    if !cli.neighbors.is_empty() {
        options.neighbors = cli.neighbors;
    }
    host::run(config, options)?;
    Ok(())
}
