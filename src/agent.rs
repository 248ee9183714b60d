// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Event dispatch from controller commands, ticks and echo traffic.
// Author: Lukas Bower

//! Top-level agent state and event dispatch.

use crate::command::{parse_line, Command};
use crate::config::AgentConfig;
use crate::event::AgentEvent;
use crate::platform::{EchoTransport, Node, RadioStats, Routing};
use crate::report::ReportSink;
use crate::session::{SessionController, StopReason};

/// Agent owning the session controller and the node's collaborators.
pub struct StatsAgent<R, N, E> {
    session: SessionController,
    node: Node<R, N, E>,
    ignored_commands: u64,
}

impl<R, N, E> StatsAgent<R, N, E>
where
    R: RadioStats,
    N: Routing,
    E: EchoTransport,
{
    /// Create an idle agent.
    pub fn new(config: AgentConfig, node: Node<R, N, E>) -> Self {
        Self {
            session: SessionController::new(config),
            node,
            ignored_commands: 0,
        }
    }

    /// Handle one event to completion.
    pub fn handle(&mut self, now_ms: u64, event: AgentEvent, out: &mut dyn ReportSink) {
        match event {
            AgentEvent::TimerExpired(tick) => {
                self.session.tick(tick.now_ms, &mut self.node, out);
            }
            AgentEvent::LineReceived(line) => {
                let command = parse_line(&line);
                log::debug!("[agent] line {:?} -> {}", line.as_str(), command.name());
                self.execute(command, now_ms, out);
            }
            AgentEvent::ReplyReceived(reply) => {
                if self.session.probes_mut().on_reply(&reply) {
                    self.session.probes_mut().resolve(out);
                }
            }
            AgentEvent::ProbeTimeout(id) => {
                if self.session.probes_mut().on_timeout(id, now_ms) {
                    self.session.probes_mut().resolve(out);
                }
            }
        }
    }

    /// Execute a decoded command.
    pub fn execute(&mut self, command: Command, now_ms: u64, out: &mut dyn ReportSink) {
        match command {
            Command::StartSession => {
                self.session.start(&mut self.node, out);
            }
            Command::StopSession => {
                self.session.stop(StopReason::Command, &mut self.node, out);
            }
            Command::PromoteToRoot => {
                self.session.promote(&mut self.node, out);
            }
            Command::Probe(target) => {
                if let Err(err) = self.session.request_probe(target, now_ms, &mut self.node) {
                    log::info!("[agent] probe to {target} not started: {err}");
                }
            }
            Command::Unrecognized => {
                self.ignored_commands = self.ignored_commands.saturating_add(1);
                log::debug!("[agent] unrecognized command ignored");
            }
        }
    }

    /// Next echo reply or probe deadline due at `now_ms`.
    ///
    /// Replies are drained before the deadline so a reply that arrived in the
    /// same cycle as the deadline still wins.
    pub fn next_network_event(&mut self, now_ms: u64) -> Option<AgentEvent> {
        if let Some(reply) = self.node.echo.poll_reply() {
            return Some(AgentEvent::ReplyReceived(reply));
        }
        self.session
            .probes()
            .expired(now_ms)
            .map(AgentEvent::ProbeTimeout)
    }

    /// Returns `true` while a probe awaits its outcome.
    #[must_use]
    pub fn probe_in_flight(&self) -> bool {
        self.session.probes().is_pending()
    }

    /// Session controller.
    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Node collaborators.
    pub fn node(&self) -> &Node<R, N, E> {
        &self.node
    }

    /// Node collaborators, mutably.
    pub fn node_mut(&mut self) -> &mut Node<R, N, E> {
        &mut self.node
    }

    /// Lines that did not decode to a command.
    #[must_use]
    pub fn ignored_commands(&self) -> u64 {
        self.ignored_commands
    }
}
