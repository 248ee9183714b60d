// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Library surface of the radio statistics agent.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![deny(deprecated)]
#![warn(missing_docs)]

//! Device-resident measurement and control agent for a constrained radio node.
//!
//! A supervising controller drives the agent over a line-oriented serial
//! link. The agent runs bounded measurement sessions (background-noise
//! sampling and packet statistics), can promote the node to DAG root, and
//! probes a single neighbour at a time with echo requests. Radio, routing and
//! echo transport are external collaborators reached through the traits in
//! [`platform`].

pub mod agent;
pub mod command;
pub mod config;
pub mod event;
pub mod noise;
pub mod packets;
pub mod platform;
pub mod probe;
pub mod report;
pub mod serial;
pub mod session;
pub mod test_support;
pub mod topology;

#[cfg(feature = "host")]
pub mod host;

pub use agent::StatsAgent;
pub use command::{parse_line, Command};
pub use config::{AgentConfig, ConfigError};
pub use event::{AgentEvent, EventPump, PeriodicTimer, TimerSource};
pub use platform::{EchoTransport, Node, RadioStats, Routing};
pub use report::{Report, ReportSink};
pub use session::{SessionController, SessionPhase, StopReason};
