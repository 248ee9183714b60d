// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Cooperative event pump coordinating serial, timer and echo events.
// Author: Lukas Bower

//! Cooperative event pump.
//!
//! Everything the agent reacts to is an [`AgentEvent`]. Each polling cycle
//! of [`EventPump::poll`] drains, in order:
//!
//! 1. complete serial lines (commands),
//! 2. at most one session timer tick,
//! 3. echo replies and probe deadlines.
//!
//! Every event is handled to completion before the next one is taken, so
//! session state, the probe slot and the counters never see interleaved
//! updates and need no locking.

use heapless::String as HeaplessString;

use crate::agent::StatsAgent;
use crate::platform::{EchoReply, EchoTransport, RadioStats, Routing};
use crate::probe::ProbeId;
use crate::serial::{SerialDriver, SerialPort, DEFAULT_LINE_CAPACITY};

/// Upper bound on echo replies and deadlines handled in one cycle.
const MAX_NETWORK_EVENTS_PER_POLL: usize = 16;

/// Tick emitted by a [`TimerSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickEvent {
    /// Sequential tick number since the timer was started, from 1.
    pub tick: u64,
    /// Nominal time of the tick in milliseconds.
    pub now_ms: u64,
}

/// Session tick source.
pub trait TimerSource {
    /// Arm the timer so the first tick falls one period after `now_ms`.
    fn start(&mut self, now_ms: u64);

    /// Disarm the timer.
    fn stop(&mut self);

    /// Returns `true` while the timer is armed.
    fn is_armed(&self) -> bool;

    /// Return the next due tick, if any.
    fn poll(&mut self, now_ms: u64) -> Option<TickEvent>;
}

/// Fixed-period timer driven by the caller's clock.
///
/// Ticks carry their nominal due time, and a late poll yields one overdue
/// tick per call until the timer has caught up.
#[derive(Debug, Clone)]
pub struct PeriodicTimer {
    period_ms: u64,
    next_due_ms: Option<u64>,
    tick: u64,
}

impl PeriodicTimer {
    /// Create a disarmed timer with the given period.
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            next_due_ms: None,
            tick: 0,
        }
    }
}

impl TimerSource for PeriodicTimer {
    fn start(&mut self, now_ms: u64) {
        self.tick = 0;
        self.next_due_ms = Some(now_ms.saturating_add(self.period_ms));
    }

    fn stop(&mut self) {
        self.next_due_ms = None;
    }

    fn is_armed(&self) -> bool {
        self.next_due_ms.is_some()
    }

    fn poll(&mut self, now_ms: u64) -> Option<TickEvent> {
        let due = self.next_due_ms?;
        if now_ms < due {
            return None;
        }
        self.tick = self.tick.saturating_add(1);
        self.next_due_ms = Some(due.saturating_add(self.period_ms));
        Some(TickEvent {
            tick: self.tick,
            now_ms: due,
        })
    }
}

/// Tick-based schedule for a periodic activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Periodic {
    period: u64,
    last_fired: Option<u64>,
}

impl Periodic {
    /// Schedule firing every `period` ticks.
    pub const fn new(period: u64) -> Self {
        Self {
            period,
            last_fired: None,
        }
    }

    /// Returns `true` if `tick` is a boundary that has not fired yet, and marks it fired.
    pub fn fire(&mut self, tick: u64) -> bool {
        if self.period == 0 || tick == 0 || tick % self.period != 0 {
            return false;
        }
        if self.last_fired == Some(tick) {
            return false;
        }
        self.last_fired = Some(tick);
        true
    }

    /// Forget the last boundary.
    pub fn reset(&mut self) {
        self.last_fired = None;
    }

    /// Period in ticks.
    #[must_use]
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Last tick that fired.
    #[must_use]
    pub fn last_fired(&self) -> Option<u64> {
        self.last_fired
    }
}

/// Input consumed by [`StatsAgent::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// The session timer fired.
    TimerExpired(TickEvent),
    /// A complete command line arrived from the controller.
    LineReceived(HeaplessString<DEFAULT_LINE_CAPACITY>),
    /// The echo transport delivered a reply.
    ReplyReceived(EchoReply),
    /// The deadline of the given probe passed.
    ProbeTimeout(ProbeId),
}

/// Counters kept by the pump.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpMetrics {
    /// Command lines received.
    pub lines: u64,
    /// Session ticks delivered.
    pub timer_ticks: u64,
    /// Echo replies and probe deadlines delivered.
    pub network_events: u64,
}

/// Event pump binding the serial port, session timer and agent.
pub struct EventPump<D, T, R, N, E>
where
    D: SerialDriver,
    T: TimerSource,
    R: RadioStats,
    N: Routing,
    E: EchoTransport,
{
    serial: SerialPort<D>,
    timer: T,
    agent: StatsAgent<R, N, E>,
    metrics: PumpMetrics,
    now_ms: u64,
    armed_session: u64,
}

impl<D, T, R, N, E> EventPump<D, T, R, N, E>
where
    D: SerialDriver,
    T: TimerSource,
    R: RadioStats,
    N: Routing,
    E: EchoTransport,
{
    /// Create a pump over the supplied subsystems.
    pub fn new(serial: SerialPort<D>, timer: T, agent: StatsAgent<R, N, E>) -> Self {
        log::debug!("[pump] init serial, timer, agent");
        Self {
            serial,
            timer,
            agent,
            metrics: PumpMetrics::default(),
            now_ms: 0,
            armed_session: 0,
        }
    }

    /// Execute one cooperative polling cycle at `now_ms`.
    pub fn poll(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        self.serial.poll_io();

        while let Some(line) = self.serial.next_line() {
            self.metrics.lines = self.metrics.lines.saturating_add(1);
            self.dispatch(AgentEvent::LineReceived(line));
        }
        self.sync_timer();

        if let Some(tick) = self.timer.poll(now_ms) {
            self.metrics.timer_ticks = self.metrics.timer_ticks.saturating_add(1);
            self.dispatch(AgentEvent::TimerExpired(tick));
            self.sync_timer();
        }

        for _ in 0..MAX_NETWORK_EVENTS_PER_POLL {
            let Some(event) = self.agent.next_network_event(now_ms) else {
                break;
            };
            self.metrics.network_events = self.metrics.network_events.saturating_add(1);
            self.dispatch(event);
        }

        self.serial.poll_io();
    }

    fn dispatch(&mut self, event: AgentEvent) {
        self.agent.handle(self.now_ms, event, &mut self.serial);
    }

    fn sync_timer(&mut self) {
        let running = self.agent.session().is_running();
        let session = self.agent.session().sessions();
        // A stop and start in one batch leaves the timer armed on the old schedule.
        if running && (!self.timer.is_armed() || self.armed_session != session) {
            self.timer.start(self.now_ms);
            self.armed_session = session;
            log::debug!("[pump] session timer armed at {} ms", self.now_ms);
        } else if !running && self.timer.is_armed() {
            self.timer.stop();
            log::debug!("[pump] session timer disarmed at {} ms", self.now_ms);
        }
    }

    /// Pump counters.
    #[must_use]
    pub fn metrics(&self) -> PumpMetrics {
        self.metrics
    }

    /// Returns `true` once the controller link is closed and no session runs.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.serial.is_closed() && !self.agent.session().is_running() && !self.agent.probe_in_flight()
    }

    /// Access the agent.
    pub fn agent(&self) -> &StatsAgent<R, N, E> {
        &self.agent
    }

    /// Access the agent mutably.
    pub fn agent_mut(&mut self) -> &mut StatsAgent<R, N, E> {
        &mut self.agent
    }

    /// Access the serial port mutably.
    pub fn serial_mut(&mut self) -> &mut SerialPort<D> {
        &mut self.serial
    }
}
