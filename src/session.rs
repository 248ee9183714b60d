// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Measurement session lifecycle and per-tick orchestration.
// Author: Lukas Bower

//! Session controller.
//!
//! A session is `Idle` until the controller starts it, then `Running` until
//! a stop command arrives or the elapsed tick counter reaches the configured
//! duration. `Stopping` is held only while the stop path emits its final
//! reports. Every tick runs, in order: elapsed counter, neighbour probe,
//! noise sampler, packet reporter, duration check.

use core::fmt;
use core::net::Ipv6Addr;

use crate::config::AgentConfig;
use crate::event::Periodic;
use crate::noise::NoiseSampler;
use crate::packets::PacketReporter;
use crate::platform::{EchoTransport, Node, RadioStats, Routing};
use crate::probe::{ProbeCoordinator, ProbeError, ProbeId};
use crate::report::{Report, ReportSink, HELP_FOOTER, HELP_LINES, PROBE_HELP_LINES};
use crate::topology::{self, PromoteOutcome};

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session running.
    Idle,
    /// Periodic activities are active.
    Running,
    /// Final reports are being emitted.
    Stopping,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The controller sent `=`.
    Command,
    /// The elapsed counter reached the configured duration.
    DurationElapsed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => f.write_str("stop command"),
            Self::DurationElapsed => f.write_str("duration elapsed"),
        }
    }
}

/// Owner of the session state, periodic activities and probe slot.
#[derive(Debug, Clone)]
pub struct SessionController {
    config: AgentConfig,
    phase: SessionPhase,
    elapsed: u64,
    is_root: bool,
    sessions: u64,
    noise: NoiseSampler,
    packets: PacketReporter,
    probe_at: Periodic,
    probes: ProbeCoordinator,
}

impl SessionController {
    /// Build an idle controller from a validated configuration.
    pub fn new(config: AgentConfig) -> Self {
        let noise = NoiseSampler::new(config.sample_period_ticks, config.flush_period_ticks);
        let packets = PacketReporter::new(config.stats_period_ticks);
        let probe_at = Periodic::new(if config.probe_enabled {
            config.probe_interval_ticks
        } else {
            0
        });
        let probes = ProbeCoordinator::new(config.probe_timeout_ms, config.probe_payload_len)
            .with_verbose(config.debug_output);
        Self {
            config,
            phase: SessionPhase::Idle,
            elapsed: 0,
            is_root: false,
            sessions: 0,
            noise,
            packets,
            probe_at,
            probes,
        }
    }

    /// Start a session. Returns `false` if one is already running.
    pub fn start<R, N, E>(&mut self, node: &mut Node<R, N, E>, out: &mut dyn ReportSink) -> bool
    where
        R: RadioStats,
        N: Routing,
        E: EchoTransport,
    {
        if self.phase != SessionPhase::Idle {
            log::debug!("[session] start ignored, session already {:?}", self.phase);
            return false;
        }
        self.phase = SessionPhase::Running;
        self.elapsed = 0;
        self.sessions = self.sessions.saturating_add(1);

        out.emit(&Report::SessionStarted);
        out.emit(&Report::Duration {
            seconds: self.config.duration_secs(),
        });

        node.radio.reset();
        self.noise.clear();
        self.packets.reset();
        self.probe_at.reset();
        self.probes.reset_counters();

        if self.config.print_help {
            out.emit(&Report::DeviceId(node.radio.device_id()));
            for &line in HELP_LINES {
                out.emit(&Report::Legend(line));
            }
            if self.config.probe_enabled {
                for &line in PROBE_HELP_LINES {
                    out.emit(&Report::Legend(line));
                }
            }
            out.emit(&Report::Legend(HELP_FOOTER));
        }

        log::info!(
            "[session] session {} started for {} ticks of {} ms",
            self.sessions,
            self.config.duration_ticks,
            self.config.tick_ms
        );
        true
    }

    /// Stop the running session. Returns `false` if no session was running.
    pub fn stop<R, N, E>(
        &mut self,
        reason: StopReason,
        node: &mut Node<R, N, E>,
        out: &mut dyn ReportSink,
    ) -> bool
    where
        R: RadioStats,
        N: Routing,
        E: EchoTransport,
    {
        if self.phase != SessionPhase::Running {
            log::debug!("[session] stop ignored, session {:?}", self.phase);
            return false;
        }
        self.phase = SessionPhase::Stopping;

        let driver = node.radio.driver_stats();
        out.emit(&Report::Driver(&driver));
        let counters = self.probes.counters();
        out.emit(&Report::ProbeSummary {
            replies: counters.replies,
            timeouts: counters.timeouts,
        });
        self.probes.cancel();
        out.emit(&Report::SessionStopped);

        node.radio.reset();
        self.noise.clear();
        self.packets.reset();
        self.probe_at.reset();

        if topology::leave_if_root(&mut node.network) {
            log::info!("[session] root role released at session end");
        }
        self.is_root = false;

        self.phase = SessionPhase::Idle;
        log::info!(
            "[session] session {} stopped after {} ticks ({reason})",
            self.sessions,
            self.elapsed
        );
        true
    }

    /// Advance a running session by one tick.
    ///
    /// Returns the stop reason when this tick ended the session.
    pub fn tick<R, N, E>(
        &mut self,
        now_ms: u64,
        node: &mut Node<R, N, E>,
        out: &mut dyn ReportSink,
    ) -> Option<StopReason>
    where
        R: RadioStats,
        N: Routing,
        E: EchoTransport,
    {
        if self.phase != SessionPhase::Running {
            log::trace!("[session] tick at {now_ms} ms ignored while {:?}", self.phase);
            return None;
        }
        self.elapsed = self.elapsed.saturating_add(1);
        let tick = self.elapsed;

        if !self.is_root && self.probe_at.fire(tick) {
            self.probe_neighbor(now_ms, node);
        }
        self.noise.on_tick(tick, &mut node.radio, out);
        self.packets.on_tick(tick, &mut node.radio, out);

        if tick >= self.config.duration_ticks {
            self.stop(StopReason::DurationElapsed, node, out);
            return Some(StopReason::DurationElapsed);
        }
        None
    }

    fn probe_neighbor<R, N, E>(&mut self, now_ms: u64, node: &mut Node<R, N, E>)
    where
        R: RadioStats,
        N: Routing,
        E: EchoTransport,
    {
        let Some(target) = node.network.first_neighbor() else {
            log::debug!("[session] neighbour probe skipped, neighbour table empty");
            return;
        };
        if let Err(err) = self.probes.start_probe(target, now_ms, &mut node.echo) {
            log::debug!("[session] neighbour probe skipped: {err}");
        }
    }

    /// Promote the node to DAG root and record the role the routing stack reports.
    pub fn promote<R, N, E>(
        &mut self,
        node: &mut Node<R, N, E>,
        out: &mut dyn ReportSink,
    ) -> PromoteOutcome
    where
        R: RadioStats,
        N: Routing,
        E: EchoTransport,
    {
        let outcome = topology::promote_to_root(&mut node.network, out);
        self.is_root = node.network.is_root();
        outcome
    }

    /// Start a manual probe against `target`.
    pub fn request_probe<R, N, E>(
        &mut self,
        target: Ipv6Addr,
        now_ms: u64,
        node: &mut Node<R, N, E>,
    ) -> Result<ProbeId, ProbeError>
    where
        R: RadioStats,
        N: Routing,
        E: EchoTransport,
    {
        self.probes.start_probe(target, now_ms, &mut node.echo)
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Returns `true` while the session is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    /// Ticks elapsed in the current or last session.
    #[must_use]
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Returns `true` while the node holds the root role.
    ///
    /// Set from the routing stack on promotion and cleared when a session stops.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Sessions started since construction.
    #[must_use]
    pub fn sessions(&self) -> u64 {
        self.sessions
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Noise sampler state.
    #[must_use]
    pub fn noise(&self) -> &NoiseSampler {
        &self.noise
    }

    /// Probe coordinator.
    #[must_use]
    pub fn probes(&self) -> &ProbeCoordinator {
        &self.probes
    }

    /// Probe coordinator, mutably.
    pub fn probes_mut(&mut self) -> &mut ProbeCoordinator {
        &mut self.probes
    }
}
