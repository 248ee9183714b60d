// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Deterministic collaborators for unit and integration tests.
// Author: Lukas Bower

//! Deterministic radio, routing and echo collaborators.
//!
//! The mocks record every call so tests can assert on the exact sequence of
//! collaborator operations the agent performed.

use std::collections::VecDeque;
use std::net::Ipv6Addr;

use crate::platform::{
    DriverStats, EchoError, EchoReply, EchoTransport, Ipv6Prefix, Node, NoiseReading,
    PacketRecord, PacketStats, RadioStats, Routing,
};

/// Hardware address reported by [`MockRadio`].
pub const MOCK_DEVICE_ID: u64 = 0x0012_4b00_0006_1234;

/// Node assembled from the mock collaborators.
pub type MockNode = Node<MockRadio, MockNetwork, MockEcho>;

/// Build a [`MockNode`] with empty collaborators.
pub fn test_node() -> MockNode {
    Node::new(MockRadio::new(), MockNetwork::new(), MockEcho::new())
}

/// Radio whose readings and packet records are scripted by the test.
#[derive(Debug, Default)]
pub struct MockRadio {
    packets: Vec<PacketRecord>,
    driver: DriverStats,
    noise_reads: u32,
    resets: u32,
}

impl MockRadio {
    /// Create an idle radio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet record for the next snapshot.
    pub fn record_packet(&mut self, record: PacketRecord) {
        self.packets.push(record);
    }

    /// Replace the driver counters.
    pub fn set_driver_stats(&mut self, stats: DriverStats) {
        self.driver = stats;
    }

    /// Noise readings taken so far.
    pub fn noise_reads(&self) -> u32 {
        self.noise_reads
    }

    /// Calls to [`RadioStats::reset`].
    pub fn resets(&self) -> u32 {
        self.resets
    }
}

impl RadioStats for MockRadio {
    fn reset(&mut self) {
        self.resets += 1;
        self.packets.clear();
        self.driver = DriverStats::default();
    }

    fn snapshot_and_clear(&mut self) -> PacketStats {
        PacketStats {
            records: std::mem::take(&mut self.packets),
        }
    }

    fn current_noise_reading(&mut self) -> NoiseReading {
        self.noise_reads += 1;
        NoiseReading {
            timestamp_ms: u64::from(self.noise_reads) * 100,
            channel: 26,
            rssi: -90,
        }
    }

    fn driver_stats(&self) -> DriverStats {
        self.driver
    }

    fn device_id(&self) -> u64 {
        MOCK_DEVICE_ID
    }
}

/// Routing operation recorded by [`MockNetwork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkCall {
    /// `set_prefix`
    SetPrefix(Ipv6Prefix),
    /// `start_root`
    StartRoot,
    /// `leave_network`
    LeaveNetwork,
}

/// Routing stack that records calls and tracks the root role.
#[derive(Debug, Default)]
pub struct MockNetwork {
    calls: Vec<NetworkCall>,
    neighbors: Vec<Ipv6Addr>,
    root: bool,
}

impl MockNetwork {
    /// Create a non-root network with an empty neighbour table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a neighbour table entry.
    pub fn add_neighbor(&mut self, addr: Ipv6Addr) {
        self.neighbors.push(addr);
    }

    /// Force the root role without recording a call.
    pub fn set_root(&mut self, root: bool) {
        self.root = root;
    }

    /// Operations performed so far.
    pub fn calls(&self) -> &[NetworkCall] {
        &self.calls
    }

    /// Forget recorded operations.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl Routing for MockNetwork {
    fn is_root(&self) -> bool {
        self.root
    }

    fn set_prefix(&mut self, prefix: Ipv6Prefix) {
        self.calls.push(NetworkCall::SetPrefix(prefix));
    }

    fn start_root(&mut self) {
        self.calls.push(NetworkCall::StartRoot);
        self.root = true;
    }

    fn leave_network(&mut self) {
        self.calls.push(NetworkCall::LeaveNetwork);
        self.root = false;
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

/// Echo transport whose replies are queued by the test.
#[derive(Debug, Default)]
pub struct MockEcho {
    sent: Vec<(Ipv6Addr, u16)>,
    replies: VecDeque<EchoReply>,
    fail_next: Option<EchoError>,
}

impl MockEcho {
    /// Create a transport with no queued replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests sent so far as `(target, payload_len)`.
    pub fn sent(&self) -> &[(Ipv6Addr, u16)] {
        &self.sent
    }

    /// Make the next request fail with `err`.
    pub fn fail_next(&mut self, err: EchoError) {
        self.fail_next = Some(err);
    }

    /// Deliver `reply` on the next poll.
    pub fn queue_reply(&mut self, reply: EchoReply) {
        self.replies.push_back(reply);
    }
}

impl EchoTransport for MockEcho {
    fn send_echo_request(&mut self, target: Ipv6Addr, payload_len: u16) -> Result<(), EchoError> {
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        self.sent.push((target, payload_len));
        Ok(())
    }

    fn poll_reply(&mut self) -> Option<EchoReply> {
        self.replies.pop_front()
    }
}
