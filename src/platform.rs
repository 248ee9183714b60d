// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Collaborator traits and value types consumed by the stats agent.
// Author: Lukas Bower

//! Narrow interfaces to the radio driver, routing stack and echo transport.
//!
//! The agent never reaches into driver or routing internals. It only asks
//! these collaborators for already-accumulated data (noise readings, packet
//! records, driver counters) and requests topology or echo operations. Host
//! simulations and tests provide their own implementations.

use core::fmt;
use core::net::Ipv6Addr;

use thiserror::Error;

/// Single background-noise measurement reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseReading {
    /// Uptime in milliseconds when the reading was taken.
    pub timestamp_ms: u64,
    /// IEEE 802.15.4 channel the radio was tuned to.
    pub channel: u8,
    /// Received signal strength in dBm.
    pub rssi: i8,
}

/// MAC frame type recorded by the driver statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Enhanced beacon.
    Beacon,
    /// Data frame.
    Data,
    /// Acknowledgement frame.
    Ack,
    /// MAC command frame.
    Command,
    /// Frame type the driver could not classify.
    Unknown,
}

impl PacketKind {
    /// Short label used in report lines.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Beacon => "EB",
            Self::Data => "D",
            Self::Ack => "A",
            Self::Command => "C",
            Self::Unknown => "?",
        }
    }
}

/// Transmitted frame captured by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRecord {
    /// Uptime in milliseconds when the frame left the radio.
    pub timestamp_ms: u64,
    /// Frame type.
    pub kind: PacketKind,
    /// Short destination address.
    pub dest: u16,
    /// Channel used for the transmission.
    pub channel: u8,
    /// Frame length in bytes.
    pub len: u8,
    /// MAC sequence number.
    pub seq: u8,
    /// Transmit power in dBm.
    pub power: i8,
    /// `true` for broadcast frames, `false` for unicast.
    pub broadcast: bool,
}

/// Received frame captured by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxRecord {
    /// Uptime in milliseconds when the frame was received.
    pub timestamp_ms: u64,
    /// Frame type.
    pub kind: PacketKind,
    /// Short source address.
    pub source: u16,
    /// Channel the frame arrived on.
    pub channel: u8,
    /// Frame length in bytes.
    pub len: u8,
    /// MAC sequence number.
    pub seq: u8,
    /// Received signal strength in dBm.
    pub rssi: i8,
    /// Link quality indicator.
    pub lqi: u8,
}

/// A single packet statistics entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketRecord {
    /// Outbound frame.
    Tx(TxRecord),
    /// Inbound frame.
    Rx(RxRecord),
}

/// Packet records accumulated by the driver since the last snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketStats {
    /// Records in the order the driver captured them.
    pub records: Vec<PacketRecord>,
}

impl PacketStats {
    /// Number of transmitted frames in the snapshot.
    #[must_use]
    pub fn tx_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| matches!(record, PacketRecord::Tx(_)))
            .count()
    }

    /// Number of received frames in the snapshot.
    #[must_use]
    pub fn rx_count(&self) -> usize {
        self.records.len() - self.tx_count()
    }

    /// Returns `true` when no traffic was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Lifetime counters kept by the radio driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Transmissions attempted.
    pub tx_attempts: u32,
    /// Transmissions acknowledged or sent without error.
    pub tx_ok: u32,
    /// Transmissions aborted by CCA or collision.
    pub tx_collisions: u32,
    /// Unicast transmissions that never received an ACK.
    pub tx_no_ack: u32,
    /// Frames detected by the receiver.
    pub rx_detected: u32,
    /// Frames delivered upwards.
    pub rx_ok: u32,
    /// Frames dropped on CRC failure.
    pub rx_crc_errors: u32,
}

/// IPv6 prefix used when starting root operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Prefix {
    /// Prefix address bits.
    pub addr: Ipv6Addr,
    /// Prefix length in bits.
    pub len: u8,
}

impl fmt::Display for Ipv6Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

/// Echo reply delivered by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    /// Address the reply came from.
    pub source: Ipv6Addr,
    /// Hop limit remaining on the reply.
    pub ttl: u8,
    /// Echo payload length in bytes.
    pub payload_len: u16,
    /// Uptime in milliseconds when the reply was received.
    pub timestamp_ms: u64,
}

/// Errors surfaced by an echo transport when sending a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EchoError {
    /// The routing layer has no next hop for the target.
    #[error("no route to {0}")]
    NoRoute(Ipv6Addr),
    /// The transport could not allocate an outbound buffer.
    #[error("echo transport out of buffers")]
    NoBuffer,
}

/// Radio driver statistics collaborator.
pub trait RadioStats {
    /// Clear every counter and record held by the driver.
    fn reset(&mut self);

    /// Return accumulated packet records and clear them.
    fn snapshot_and_clear(&mut self) -> PacketStats;

    /// Take a background-noise reading on the current channel.
    fn current_noise_reading(&mut self) -> NoiseReading;

    /// Return lifetime driver counters.
    fn driver_stats(&self) -> DriverStats;

    /// 64-bit hardware address of the radio.
    fn device_id(&self) -> u64;
}

/// Routing/topology collaborator.
pub trait Routing {
    /// Returns `true` when the node is the root of its DAG.
    fn is_root(&self) -> bool;

    /// Configure the prefix announced once root operation starts.
    fn set_prefix(&mut self, prefix: Ipv6Prefix);

    /// Start operating as the DAG root.
    fn start_root(&mut self);

    /// Leave the current network and drop any root role.
    fn leave_network(&mut self);

    /// Platform default prefix.
    fn default_prefix(&self) -> Ipv6Prefix;

    /// First entry of the neighbour table, if any.
    fn first_neighbor(&self) -> Option<Ipv6Addr>;
}

/// Echo (ping) transport collaborator.
///
/// Replies arrive asynchronously in the underlying stack; the agent drains
/// them through [`EchoTransport::poll_reply`] so every reply is handled at an
/// explicit point in the event loop.
pub trait EchoTransport {
    /// Send an echo request with `payload_len` bytes of payload.
    fn send_echo_request(&mut self, target: Ipv6Addr, payload_len: u16) -> Result<(), EchoError>;

    /// Take the next reply delivered since the previous call.
    fn poll_reply(&mut self) -> Option<EchoReply>;
}

/// Collaborators a node exposes to the agent.
///
/// Fields are public so callers can borrow each collaborator independently.
#[derive(Debug, Default)]
pub struct Node<R, N, E> {
    /// Radio driver statistics.
    pub radio: R,
    /// Routing stack.
    pub network: N,
    /// Echo transport.
    pub echo: E,
}

impl<R, N, E> Node<R, N, E>
where
    R: RadioStats,
    N: Routing,
    E: EchoTransport,
{
    /// Bundle the supplied collaborators.
    pub fn new(radio: R, network: N, echo: E) -> Self {
        Self {
            radio,
            network,
            echo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(seq: u8) -> PacketRecord {
        PacketRecord::Tx(TxRecord {
            timestamp_ms: 10,
            kind: PacketKind::Data,
            dest: 0xffff,
            channel: 26,
            len: 40,
            seq,
            power: 3,
            broadcast: true,
        })
    }

    fn rx(seq: u8) -> PacketRecord {
        PacketRecord::Rx(RxRecord {
            timestamp_ms: 12,
            kind: PacketKind::Ack,
            source: 0x0102,
            channel: 26,
            len: 5,
            seq,
            rssi: -71,
            lqi: 255,
        })
    }

    #[test]
    fn packet_stats_counts_direction() {
        let stats = PacketStats {
            records: vec![tx(1), rx(1), tx(2)],
        };
        assert_eq!(stats.tx_count(), 2);
        assert_eq!(stats.rx_count(), 1);
        assert!(!stats.is_empty());
        assert!(PacketStats::default().is_empty());
    }

    #[test]
    fn prefix_renders_cidr() {
        let prefix = Ipv6Prefix {
            addr: "fd00::".parse().unwrap(),
            len: 64,
        };
        assert_eq!(prefix.to_string(), "fd00::/64");
    }
}
