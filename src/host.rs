// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Host-mode simulation wiring the agent to stdio and simulated collaborators.
// Author: Lukas Bower
#![allow(clippy::module_name_repetitions)]

//! Host-mode simulation.
//!
//! Commands are read from stdin and report lines written to stdout, so the
//! agent can be driven by hand or by a controller script. The radio, routing
//! stack and echo transport are simulated from a seeded RNG; none of them
//! model a real protocol.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::Ipv6Addr;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result as AnyhowResult};
use embedded_io::ErrorType;
use nb::Error as NbError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::agent::StatsAgent;
use crate::config::AgentConfig;
use crate::event::{EventPump, PeriodicTimer, PumpMetrics};
use crate::platform::{
    DriverStats, EchoError, EchoReply, EchoTransport, Ipv6Prefix, Node, NoiseReading, PacketKind,
    PacketRecord, PacketStats, RadioStats, Routing, RxRecord, TxRecord,
};
use crate::serial::{SerialDriver, SerialError, SerialPort};

/// Result alias used throughout the host-mode simulation.
pub type Result<T> = AnyhowResult<T>;

/// Channels visited by the simulated radio, in hopping order.
pub const HOPPING_SEQUENCE: [u8; 4] = [11, 15, 20, 26];

/// Knobs for the simulated collaborators.
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// RNG seed shared by the simulated radio and echo transport.
    pub seed: u64,
    /// Probability that an echo request or its reply is lost.
    pub loss: f64,
    /// Upper bound of the simulated round-trip time in milliseconds.
    pub max_rtt_ms: u64,
    /// Neighbour table of the simulated routing stack.
    pub neighbors: Vec<Ipv6Addr>,
    /// Sleep between polling cycles.
    pub poll_interval: Duration,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            seed: 1,
            loss: 0.1,
            max_rtt_ms: 1_200,
            neighbors: vec![Ipv6Addr::new(0xfe80, 0, 0, 0, 0x0212, 0x4b00, 0x0006, 0x0001)],
            poll_interval: Duration::from_millis(5),
        }
    }
}

impl SimOptions {
    /// Reject knobs the simulation cannot honour.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.loss.is_finite() && (0.0..=1.0).contains(&self.loss),
            "loss probability {} is outside 0.0..=1.0",
            self.loss
        );
        Ok(())
    }
}

/// Monotonic millisecond clock anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    origin: Instant,
}

impl HostClock {
    /// Start a clock at zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Milliseconds since the clock started.
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Serial driver reading stdin on a helper thread and writing stdout.
pub struct StdioSerial {
    input: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    disconnected: bool,
    stdout: io::Stdout,
}

impl StdioSerial {
    /// Spawn the stdin reader thread.
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                let mut stdin = io::stdin();
                let mut buf = [0u8; 256];
                loop {
                    match stdin.read(&mut buf) {
                        Ok(0) => break,
                        Ok(len) => {
                            if tx.send(buf[..len].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => {
                            log::warn!("[host] stdin read failed: {err}");
                            break;
                        }
                    }
                }
            })
            .context("failed to spawn stdin reader thread")?;
        Ok(Self {
            input: rx,
            pending: VecDeque::new(),
            disconnected: false,
            stdout: io::stdout(),
        })
    }
}

impl ErrorType for StdioSerial {
    type Error = SerialError;
}

impl SerialDriver for StdioSerial {
    fn read_byte(&mut self) -> nb::Result<u8, Self::Error> {
        if self.pending.is_empty() && !self.disconnected {
            match self.input.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.disconnected = true,
            }
        }
        match self.pending.pop_front() {
            Some(byte) => Ok(byte),
            None if self.disconnected => Err(NbError::Other(SerialError::Disconnected)),
            None => Err(NbError::WouldBlock),
        }
    }

    fn write_byte(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
        let mut handle = self.stdout.lock();
        handle
            .write_all(&[byte])
            .and_then(|()| if byte == b'\n' { handle.flush() } else { Ok(()) })
            .map_err(|_| NbError::Other(SerialError::DeviceFault))
    }
}

/// Radio producing random noise readings and synthetic traffic.
pub struct SimRadio {
    clock: HostClock,
    rng: StdRng,
    hop: usize,
    driver: DriverStats,
    device_id: u64,
}

impl SimRadio {
    /// Create a radio seeded with `seed`.
    pub fn new(clock: HostClock, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let device_id = 0x0012_4b00_0000_0000 | u64::from(rng.gen::<u32>());
        Self {
            clock,
            rng,
            hop: 0,
            driver: DriverStats::default(),
            device_id,
        }
    }

    fn next_channel(&mut self) -> u8 {
        let channel = HOPPING_SEQUENCE[self.hop % HOPPING_SEQUENCE.len()];
        self.hop = self.hop.wrapping_add(1);
        channel
    }

    fn synth_tx(&mut self, now_ms: u64) -> PacketRecord {
        let broadcast = self.rng.gen_bool(0.5);
        let kind = if broadcast {
            PacketKind::Beacon
        } else {
            PacketKind::Data
        };
        self.driver.tx_attempts += 1;
        if self.rng.gen_bool(0.9) {
            self.driver.tx_ok += 1;
        } else if broadcast {
            self.driver.tx_collisions += 1;
        } else {
            self.driver.tx_no_ack += 1;
        }
        PacketRecord::Tx(TxRecord {
            timestamp_ms: now_ms.saturating_sub(self.rng.gen_range(0..1_000)),
            kind,
            dest: if broadcast { 0xffff } else { self.rng.gen() },
            channel: self.next_channel(),
            len: self.rng.gen_range(20..=127),
            seq: self.rng.gen(),
            power: 3,
            broadcast,
        })
    }

    fn synth_rx(&mut self, now_ms: u64) -> PacketRecord {
        let kind = match self.rng.gen_range(0..3) {
            0 => PacketKind::Beacon,
            1 => PacketKind::Ack,
            _ => PacketKind::Data,
        };
        self.driver.rx_detected += 1;
        self.driver.rx_ok += 1;
        PacketRecord::Rx(RxRecord {
            timestamp_ms: now_ms.saturating_sub(self.rng.gen_range(0..1_000)),
            kind,
            source: self.rng.gen(),
            channel: self.next_channel(),
            len: self.rng.gen_range(5..=127),
            seq: self.rng.gen(),
            rssi: self.rng.gen_range(-95..=-40),
            lqi: self.rng.gen_range(100..=255),
        })
    }
}

impl RadioStats for SimRadio {
    fn reset(&mut self) {
        self.driver = DriverStats::default();
        self.hop = 0;
    }

    fn snapshot_and_clear(&mut self) -> PacketStats {
        let now_ms = self.clock.now_ms();
        let mut records = Vec::new();
        for _ in 0..self.rng.gen_range(0..=3) {
            records.push(self.synth_tx(now_ms));
        }
        for _ in 0..self.rng.gen_range(0..=3) {
            records.push(self.synth_rx(now_ms));
        }
        let crc_errors = self.rng.gen_range(0..=1);
        self.driver.rx_detected += crc_errors;
        self.driver.rx_crc_errors += crc_errors;
        PacketStats { records }
    }

    fn current_noise_reading(&mut self) -> NoiseReading {
        NoiseReading {
            timestamp_ms: self.clock.now_ms(),
            channel: self.next_channel(),
            rssi: self.rng.gen_range(-100..=-85),
        }
    }

    fn driver_stats(&self) -> DriverStats {
        self.driver
    }

    fn device_id(&self) -> u64 {
        self.device_id
    }
}

/// Routing stack with a fixed neighbour table.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    root: bool,
    prefix: Option<Ipv6Prefix>,
    neighbors: Vec<Ipv6Addr>,
}

impl SimNetwork {
    /// Create a non-root network with the given neighbours.
    pub fn new(neighbors: Vec<Ipv6Addr>) -> Self {
        Self {
            root: false,
            prefix: None,
            neighbors,
        }
    }
}

impl Routing for SimNetwork {
    fn is_root(&self) -> bool {
        self.root
    }

    fn set_prefix(&mut self, prefix: Ipv6Prefix) {
        self.prefix = Some(prefix);
    }

    fn start_root(&mut self) {
        self.root = true;
        match self.prefix {
            Some(prefix) => log::info!("[host] simulated root announcing {prefix}"),
            None => log::info!("[host] simulated root without prefix"),
        }
    }

    fn leave_network(&mut self) {
        self.root = false;
        self.prefix = None;
        log::info!("[host] simulated node left the network");
    }

    fn default_prefix(&self) -> Ipv6Prefix {
        Ipv6Prefix {
            addr: Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 0),
            len: 64,
        }
    }

    fn first_neighbor(&self) -> Option<Ipv6Addr> {
        self.neighbors.first().copied()
    }
}

/// Echo transport answering with random delay and loss.
pub struct SimEcho {
    clock: HostClock,
    rng: StdRng,
    loss: f64,
    max_rtt_ms: u64,
    in_flight: VecDeque<(u64, EchoReply)>,
}

impl SimEcho {
    /// Create a transport seeded with `seed`.
    pub fn new(clock: HostClock, seed: u64, loss: f64, max_rtt_ms: u64) -> Self {
        Self {
            clock,
            rng: StdRng::seed_from_u64(seed),
            // NaN would panic inside `gen_bool`.
            loss: if loss.is_nan() {
                0.0
            } else {
                loss.clamp(0.0, 1.0)
            },
            max_rtt_ms: max_rtt_ms.max(1),
            in_flight: VecDeque::new(),
        }
    }
}

impl EchoTransport for SimEcho {
    fn send_echo_request(
        &mut self,
        target: Ipv6Addr,
        payload_len: u16,
    ) -> core::result::Result<(), EchoError> {
        if target.is_unspecified() {
            return Err(EchoError::NoRoute(target));
        }
        if self.rng.gen_bool(self.loss) {
            log::debug!("[host] echo request to {target} lost");
            return Ok(());
        }
        let due = self.clock.now_ms() + self.rng.gen_range(1..=self.max_rtt_ms);
        let reply = EchoReply {
            source: target,
            ttl: 64,
            payload_len,
            timestamp_ms: due,
        };
        let at = self.in_flight.partition_point(|(when, _)| *when <= due);
        self.in_flight.insert(at, (due, reply));
        Ok(())
    }

    fn poll_reply(&mut self) -> Option<EchoReply> {
        let due = self.in_flight.front().map(|(due, _)| *due)?;
        if due > self.clock.now_ms() {
            return None;
        }
        self.in_flight.pop_front().map(|(_, reply)| reply)
    }
}

/// Pump type assembled by [`run`].
pub type HostPump = EventPump<StdioSerial, PeriodicTimer, SimRadio, SimNetwork, SimEcho>;

/// Build the simulated node and pump.
pub fn build(config: AgentConfig, options: &SimOptions, clock: HostClock) -> Result<HostPump> {
    config.validate().context("invalid agent configuration")?;
    options.validate().context("invalid simulation options")?;
    let node = Node::new(
        SimRadio::new(clock, options.seed),
        SimNetwork::new(options.neighbors.clone()),
        SimEcho::new(
            clock,
            options.seed.wrapping_add(1),
            options.loss,
            options.max_rtt_ms,
        ),
    );
    let timer = PeriodicTimer::new(config.tick_ms);
    let agent = StatsAgent::new(config, node);
    let serial = SerialPort::new(StdioSerial::spawn()?);
    Ok(EventPump::new(serial, timer, agent))
}

/// Run the agent until stdin closes and no session or probe remains active.
pub fn run(config: AgentConfig, options: SimOptions) -> Result<PumpMetrics> {
    let clock = HostClock::new();
    let mut pump = build(config, &options, clock)?;
    log::info!(
        "[host] agent online, {} neighbour(s), loss {:.2}",
        options.neighbors.len(),
        options.loss
    );
    loop {
        pump.poll(clock.now_ms());
        if pump.is_finished() {
            break;
        }
        thread::sleep(options.poll_interval);
    }
    let metrics = pump.metrics();
    log::info!(
        "[host] shutdown after {} lines, {} ticks, {} network events",
        metrics.lines,
        metrics.timer_ticks,
        metrics.network_events
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_hops_through_sequence() {
        let mut radio = SimRadio::new(HostClock::new(), 7);
        let channels: Vec<u8> = (0..5)
            .map(|_| radio.current_noise_reading().channel)
            .collect();
        assert_eq!(channels, vec![11, 15, 20, 26, 11]);
        radio.reset();
        assert_eq!(radio.current_noise_reading().channel, 11);
    }

    #[test]
    fn radio_driver_counters_follow_traffic() {
        let mut radio = SimRadio::new(HostClock::new(), 3);
        let mut tx = 0u32;
        for _ in 0..20 {
            tx += radio.snapshot_and_clear().tx_count() as u32;
        }
        assert_eq!(radio.driver_stats().tx_attempts, tx);
        radio.reset();
        assert_eq!(radio.driver_stats(), DriverStats::default());
    }

    #[test]
    fn lossless_echo_answers_within_rtt() {
        let clock = HostClock::new();
        let mut echo = SimEcho::new(clock, 9, 0.0, 1);
        let target = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);
        echo.send_echo_request(target, 4).unwrap();
        thread::sleep(Duration::from_millis(5));
        let reply = echo.poll_reply().unwrap();
        assert_eq!(reply.source, target);
        assert!(echo.poll_reply().is_none());
        assert!(matches!(
            echo.send_echo_request(Ipv6Addr::UNSPECIFIED, 4),
            Err(EchoError::NoRoute(_))
        ));
    }

    #[test]
    fn options_reject_loss_outside_unit_range() {
        for loss in [f64::NAN, f64::INFINITY, -0.1, 1.5] {
            let options = SimOptions {
                loss,
                ..SimOptions::default()
            };
            let err = options.validate().unwrap_err();
            assert!(err.to_string().contains("outside 0.0..=1.0"));
        }
        assert!(SimOptions::default().validate().is_ok());
    }

    #[test]
    fn echo_with_nan_loss_sends_without_panicking() {
        let mut echo = SimEcho::new(HostClock::new(), 5, f64::NAN, 1);
        let target = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 3);
        echo.send_echo_request(target, 4).unwrap();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(echo.poll_reply().map(|reply| reply.source), Some(target));
    }

    #[test]
    fn network_promotes_and_leaves() {
        let mut network = SimNetwork::new(Vec::new());
        assert!(network.first_neighbor().is_none());
        let prefix = network.default_prefix();
        network.set_prefix(prefix);
        network.start_root();
        assert!(network.is_root());
        network.leave_network();
        assert!(!network.is_root());
    }
}
