// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Bounded serial line framing between the controller link and the agent.
// Author: Lukas Bower

//! Serial line discipline for the controller link.
//!
//! Bytes are pumped between a non-blocking [`SerialDriver`] and heapless
//! staging queues. Incoming bytes are assembled into ASCII lines for the
//! command parser; outgoing report lines are queued with a `\n` terminator.
//! Nothing here allocates, so the same port runs on the device and in host
//! simulations.

use core::fmt;
use core::sync::atomic::Ordering;

use embedded_io::{Error as EmbeddedError, ErrorKind, ErrorType};
use heapless::{spsc::Queue, String as HeaplessString};
use nb::Error as NbError;
use portable_atomic::AtomicU32;

use crate::report::ReportSink;

/// Capacity of the RX staging queue used by [`SerialPort`].
pub const DEFAULT_RX_CAPACITY: usize = 256;

/// Capacity of the TX staging queue used by [`SerialPort`].
pub const DEFAULT_TX_CAPACITY: usize = 1024;

/// Maximum number of characters retained in one command line.
pub const DEFAULT_LINE_CAPACITY: usize = 96;

/// Error type surfaced by serial drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// The device reported an unrecoverable failure.
    DeviceFault,
    /// The peer closed the link.
    Disconnected,
}

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceFault => write!(f, "serial device fault"),
            Self::Disconnected => write!(f, "serial link disconnected"),
        }
    }
}

impl core::error::Error for SerialError {}

impl EmbeddedError for SerialError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceFault => ErrorKind::Other,
            Self::Disconnected => ErrorKind::NotConnected,
        }
    }
}

/// Non-blocking byte device underneath the serial port.
pub trait SerialDriver: ErrorType {
    /// Attempt to read a single byte from the device.
    fn read_byte(&mut self) -> nb::Result<u8, Self::Error>;

    /// Attempt to write a single byte to the device.
    fn write_byte(&mut self, byte: u8) -> nb::Result<(), Self::Error>;
}

/// Counters reported by the serial port.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SerialTelemetry {
    /// Bytes dropped because the RX queue was full.
    pub rx_backpressure: u32,
    /// Times the TX queue was full when a byte was queued.
    pub tx_backpressure: u32,
    /// Control or non-ASCII bytes discarded from input.
    pub dropped_bytes: u32,
    /// Input lines discarded for exceeding the line capacity.
    pub overlong_lines: u32,
    /// Driver read errors observed.
    pub driver_errors: u32,
}

/// Serial port with bounded RX/TX queues and ASCII line assembly.
pub struct SerialPort<
    D,
    const RX: usize = DEFAULT_RX_CAPACITY,
    const TX: usize = DEFAULT_TX_CAPACITY,
    const LINE: usize = DEFAULT_LINE_CAPACITY,
> where
    D: SerialDriver,
{
    driver: D,
    rx: Queue<u8, RX>,
    tx: Queue<u8, TX>,
    line: HeaplessString<LINE>,
    pending_tx: Option<u8>,
    discarding: bool,
    suppress_lf: bool,
    closed: bool,
    telemetry: SerialCounters,
}

impl<D, const RX: usize, const TX: usize, const LINE: usize> SerialPort<D, RX, TX, LINE>
where
    D: SerialDriver,
{
    /// Construct a serial port backed by the supplied driver.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            rx: Queue::new(),
            tx: Queue::new(),
            line: HeaplessString::new(),
            pending_tx: None,
            discarding: false,
            suppress_lf: false,
            closed: false,
            telemetry: SerialCounters::default(),
        }
    }

    /// Snapshot of the port counters.
    #[must_use]
    pub fn telemetry(&self) -> SerialTelemetry {
        self.telemetry.snapshot()
    }

    /// Returns `true` once the driver reported the link as closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Queue bytes for transmission, flushing to the driver when the queue fills.
    pub fn enqueue_tx(&mut self, data: &[u8]) {
        for &byte in data {
            let mut attempts = 0usize;
            while self.tx.enqueue(byte).is_err() {
                SerialCounters::bump(&self.telemetry.tx_backpressure);
                self.flush_tx();
                attempts = attempts.saturating_add(1);
                if attempts > TX {
                    break;
                }
            }
        }
    }

    /// Move bytes between the driver and the staging queues.
    pub fn poll_io(&mut self) {
        loop {
            match self.driver.read_byte() {
                Ok(byte) => {
                    if self.rx.enqueue(byte).is_err() {
                        SerialCounters::bump(&self.telemetry.rx_backpressure);
                    }
                }
                Err(NbError::WouldBlock) => break,
                Err(NbError::Other(err)) => {
                    if err.kind() == ErrorKind::NotConnected {
                        if !self.closed {
                            log::info!("[serial] controller link closed");
                        }
                        self.closed = true;
                    } else {
                        SerialCounters::bump(&self.telemetry.driver_errors);
                        log::warn!("[serial] read failed: {:?}", err.kind());
                    }
                    break;
                }
            }
        }

        self.flush_tx();
    }

    fn flush_tx(&mut self) {
        if let Some(byte) = self.pending_tx.take() {
            if !self.write_or_stash(byte) {
                return;
            }
        }
        while let Some(byte) = self.tx.dequeue() {
            if !self.write_or_stash(byte) {
                return;
            }
        }
    }

    fn write_or_stash(&mut self, byte: u8) -> bool {
        match self.driver.write_byte(byte) {
            Ok(()) => true,
            Err(NbError::WouldBlock) => {
                self.pending_tx = Some(byte);
                false
            }
            Err(NbError::Other(_)) => {
                SerialCounters::bump(&self.telemetry.driver_errors);
                false
            }
        }
    }

    /// Retrieve the next complete, non-empty input line.
    ///
    /// `\r`, `\n` and `\r\n` all terminate a line. Lines longer than `LINE`
    /// are discarded in full rather than truncated.
    pub fn next_line(&mut self) -> Option<HeaplessString<LINE>> {
        while let Some(byte) = self.rx.dequeue() {
            if self.suppress_lf && byte == b'\n' {
                self.suppress_lf = false;
                continue;
            }
            self.suppress_lf = byte == b'\r';
            match byte {
                b'\r' | b'\n' => {
                    if core::mem::take(&mut self.discarding) {
                        self.line.clear();
                        continue;
                    }
                    if self.line.is_empty() {
                        continue;
                    }
                    return Some(core::mem::take(&mut self.line));
                }
                byte if !byte.is_ascii() || byte.is_ascii_control() => {
                    SerialCounters::bump(&self.telemetry.dropped_bytes);
                }
                byte => {
                    if self.discarding {
                        continue;
                    }
                    if self.line.push(byte as char).is_err() {
                        SerialCounters::bump(&self.telemetry.overlong_lines);
                        log::warn!("[serial] discarding line longer than {} bytes", LINE);
                        self.line.clear();
                        self.discarding = true;
                    }
                }
            }
        }
        None
    }

    /// Access the driver mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

impl<D, const RX: usize, const TX: usize, const LINE: usize> ReportSink
    for SerialPort<D, RX, TX, LINE>
where
    D: SerialDriver,
{
    fn emit_line(&mut self, line: &str) {
        self.enqueue_tx(line.as_bytes());
        self.enqueue_tx(b"\n");
    }
}

#[derive(Debug, Default)]
struct SerialCounters {
    rx_backpressure: AtomicU32,
    tx_backpressure: AtomicU32,
    dropped_bytes: AtomicU32,
    overlong_lines: AtomicU32,
    driver_errors: AtomicU32,
}

impl SerialCounters {
    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SerialTelemetry {
        SerialTelemetry {
            rx_backpressure: self.rx_backpressure.load(Ordering::Relaxed),
            tx_backpressure: self.tx_backpressure.load(Ordering::Relaxed),
            dropped_bytes: self.dropped_bytes.load(Ordering::Relaxed),
            overlong_lines: self.overlong_lines.load(Ordering::Relaxed),
            driver_errors: self.driver_errors.load(Ordering::Relaxed),
        }
    }
}

/// In-memory serial driver used by tests.
pub mod test_support {
    use super::*;

    /// Loopback driver backed by heapless queues.
    pub struct LoopbackSerial<const CAP: usize = 1024> {
        rx: Queue<u8, CAP>,
        tx: Queue<u8, CAP>,
        closed: bool,
    }

    impl<const CAP: usize> Default for LoopbackSerial<CAP> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<const CAP: usize> LoopbackSerial<CAP> {
        /// Create an empty loopback driver.
        pub fn new() -> Self {
            Self {
                rx: Queue::new(),
                tx: Queue::new(),
                closed: false,
            }
        }

        /// Inject bytes that the port reads on its next poll.
        pub fn push_rx(&mut self, data: &[u8]) {
            for &byte in data {
                let _ = self.rx.enqueue(byte);
            }
        }

        /// Report the link as closed once queued input is drained.
        pub fn close(&mut self) {
            self.closed = true;
        }

        /// Drain bytes written by the port.
        pub fn drain_tx(&mut self) -> Vec<u8> {
            let mut out = Vec::new();
            while let Some(byte) = self.tx.dequeue() {
                out.push(byte);
            }
            out
        }

        /// Drain written bytes split into lines.
        pub fn drain_lines(&mut self) -> Vec<String> {
            String::from_utf8_lossy(&self.drain_tx())
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    impl<const CAP: usize> ErrorType for LoopbackSerial<CAP> {
        type Error = SerialError;
    }

    impl<const CAP: usize> SerialDriver for LoopbackSerial<CAP> {
        fn read_byte(&mut self) -> nb::Result<u8, Self::Error> {
            match self.rx.dequeue() {
                Some(byte) => Ok(byte),
                None if self.closed => Err(NbError::Other(SerialError::Disconnected)),
                None => Err(NbError::WouldBlock),
            }
        }

        fn write_byte(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
            self.tx.enqueue(byte).map_err(|_| NbError::WouldBlock)
        }
    }
}
