// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Single-slot echo probe with reply/timeout race resolution.
// Author: Lukas Bower

//! Probe (ping) coordinator.
//!
//! At most one probe is in flight. A probe leaves `Pending` exactly once:
//! either a matching reply moves it to `Replied` or its deadline moves it to
//! `TimedOut`. Whichever signal arrives second finds the slot already
//! resolved (or holding a newer probe with a different [`ProbeId`]) and is
//! dropped without touching the counters.

use core::fmt;
use core::net::Ipv6Addr;

use thiserror::Error;

use crate::platform::{EchoError, EchoReply, EchoTransport};
use crate::report::{Report, ReportSink};

/// Identifier assigned to every probe the coordinator starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeId(u32);

impl ProbeId {
    /// Raw identifier value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Waiting for a reply or the deadline.
    Pending,
    /// A reply arrived before the deadline.
    Replied {
        /// Uptime when the reply arrived.
        replied_ms: u64,
        /// Hop limit remaining on the reply.
        ttl: u8,
        /// Echo payload length.
        payload_len: u16,
    },
    /// The deadline passed without a reply.
    TimedOut,
}

/// A probe occupying the coordinator's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Identifier of this probe.
    pub id: ProbeId,
    /// Address the echo request was sent to.
    pub target: Ipv6Addr,
    /// Uptime when the request was issued.
    pub issued_ms: u64,
    /// Uptime after which the probe times out.
    pub deadline_ms: u64,
    /// Current outcome.
    pub outcome: ProbeOutcome,
}

/// Reply and timeout totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeCounters {
    /// Probes answered before their deadline.
    pub replies: u32,
    /// Probes whose deadline expired.
    pub timeouts: u32,
}

/// Result reported once a probe leaves the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResolution {
    /// Reported as `PR`.
    Replied {
        /// Running reply count including this probe.
        count: u32,
        /// Resolved probe.
        probe: Probe,
    },
    /// Reported as `PT`.
    TimedOut {
        /// Running timeout count including this probe.
        count: u32,
        /// Resolved probe.
        probe: Probe,
    },
}

/// Reasons a probe could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Another probe is still pending.
    #[error("probe {0} still pending")]
    Busy(ProbeId),
    /// The echo transport refused the request.
    #[error("echo request to {target} failed: {source}")]
    Transport {
        /// Requested target.
        target: Ipv6Addr,
        /// Transport failure.
        #[source]
        source: EchoError,
    },
}

/// Owner of the single probe slot and the probe counters.
#[derive(Debug, Clone)]
pub struct ProbeCoordinator {
    slot: Option<Probe>,
    next_id: u32,
    timeout_ms: u64,
    payload_len: u16,
    counters: ProbeCounters,
    verbose: bool,
}

impl ProbeCoordinator {
    /// Create a coordinator whose probes time out after `timeout_ms`.
    pub fn new(timeout_ms: u64, payload_len: u16) -> Self {
        Self {
            slot: None,
            next_id: 1,
            timeout_ms,
            payload_len,
            counters: ProbeCounters::default(),
            verbose: false,
        }
    }

    /// Log probe details at info level instead of trace.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Issue an echo request to `target` and arm the deadline.
    pub fn start_probe<E>(
        &mut self,
        target: Ipv6Addr,
        now_ms: u64,
        echo: &mut E,
    ) -> Result<ProbeId, ProbeError>
    where
        E: EchoTransport + ?Sized,
    {
        if let Some(pending) = self.slot {
            log::debug!(
                "[probe] {} to {} still pending, rejecting probe to {}",
                pending.id,
                pending.target,
                target
            );
            return Err(ProbeError::Busy(pending.id));
        }
        echo.send_echo_request(target, self.payload_len)
            .map_err(|source| {
                log::warn!("[probe] echo request to {target} failed: {source}");
                ProbeError::Transport { target, source }
            })?;

        let id = ProbeId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let probe = Probe {
            id,
            target,
            issued_ms: now_ms,
            deadline_ms: now_ms.saturating_add(self.timeout_ms),
            outcome: ProbeOutcome::Pending,
        };
        self.slot = Some(probe);
        self.detail(format_args!(
            "[probe] {id} -> {target} issued at {now_ms} ms, deadline {} ms",
            probe.deadline_ms
        ));
        Ok(id)
    }

    /// Record a reply. Returns `true` if it resolved the pending probe.
    pub fn on_reply(&mut self, reply: &EchoReply) -> bool {
        let Some(probe) = self.slot.as_mut() else {
            log::debug!("[probe] reply from {} with no probe in flight", reply.source);
            return false;
        };
        if probe.outcome != ProbeOutcome::Pending {
            log::debug!("[probe] late reply from {} for {}", reply.source, probe.id);
            return false;
        }
        if reply.source != probe.target {
            log::debug!(
                "[probe] reply from {} does not match target {}",
                reply.source,
                probe.target
            );
            return false;
        }
        probe.outcome = ProbeOutcome::Replied {
            replied_ms: reply.timestamp_ms,
            ttl: reply.ttl,
            payload_len: reply.payload_len,
        };
        true
    }

    /// Expire probe `id` at `now_ms`. Returns `true` if it resolved the pending probe.
    pub fn on_timeout(&mut self, id: ProbeId, now_ms: u64) -> bool {
        match self.slot.as_mut() {
            Some(probe)
                if probe.id == id
                    && probe.outcome == ProbeOutcome::Pending
                    && now_ms >= probe.deadline_ms =>
            {
                probe.outcome = ProbeOutcome::TimedOut;
                true
            }
            _ => {
                log::trace!("[probe] stale timeout for {id} ignored");
                false
            }
        }
    }

    /// Pending probe whose deadline has passed at `now_ms`.
    #[must_use]
    pub fn expired(&self, now_ms: u64) -> Option<ProbeId> {
        self.slot
            .filter(|probe| probe.outcome == ProbeOutcome::Pending && now_ms >= probe.deadline_ms)
            .map(|probe| probe.id)
    }

    /// Report and clear a probe that has left `Pending`.
    pub fn resolve(&mut self, out: &mut dyn ReportSink) -> Option<ProbeResolution> {
        let probe = self.slot?;
        let resolution = match probe.outcome {
            ProbeOutcome::Pending => return None,
            ProbeOutcome::Replied {
                replied_ms,
                ttl,
                payload_len,
            } => {
                self.counters.replies = self.counters.replies.saturating_add(1);
                let count = self.counters.replies;
                out.emit(&Report::ProbeReply {
                    count,
                    issued_ms: probe.issued_ms,
                    replied_ms,
                });
                self.detail(format_args!(
                    "[probe] {} reply from {}, len {payload_len}, ttl {ttl}, delay {} ms",
                    probe.id,
                    probe.target,
                    replied_ms.saturating_sub(probe.issued_ms)
                ));
                ProbeResolution::Replied { count, probe }
            }
            ProbeOutcome::TimedOut => {
                self.counters.timeouts = self.counters.timeouts.saturating_add(1);
                let count = self.counters.timeouts;
                out.emit(&Report::ProbeTimeout {
                    count,
                    issued_ms: probe.issued_ms,
                });
                self.detail(format_args!("[probe] {} to {} timed out", probe.id, probe.target));
                ProbeResolution::TimedOut { count, probe }
            }
        };
        self.slot = None;
        Some(resolution)
    }

    /// Drop the probe in the slot without counting it.
    pub fn cancel(&mut self) -> Option<Probe> {
        let probe = self.slot.take()?;
        log::info!("[probe] cancelled {} to {}", probe.id, probe.target);
        Some(probe)
    }

    /// Probe currently occupying the slot.
    #[must_use]
    pub fn current(&self) -> Option<&Probe> {
        self.slot.as_ref()
    }

    /// Returns `true` while a probe awaits its reply or deadline.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot
            .is_some_and(|probe| probe.outcome == ProbeOutcome::Pending)
    }

    /// Reply and timeout totals.
    #[must_use]
    pub fn counters(&self) -> ProbeCounters {
        self.counters
    }

    /// Zero the reply and timeout totals.
    pub fn reset_counters(&mut self) {
        self.counters = ProbeCounters::default();
    }

    fn detail(&self, args: fmt::Arguments<'_>) {
        if self.verbose {
            log::info!("{args}");
        } else {
            log::trace!("{args}");
        }
    }
}
