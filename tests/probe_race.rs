// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate probe reply/timeout resolution through the event pump.
// Author: Lukas Bower

use std::net::Ipv6Addr;

use stats_agent::config::AgentConfig;
use stats_agent::event::{EventPump, PeriodicTimer};
use stats_agent::platform::EchoReply;
use stats_agent::report::{parse_report, ParsedReport};
use stats_agent::serial::test_support::LoopbackSerial;
use stats_agent::serial::SerialPort;
use stats_agent::test_support::{test_node, MockEcho, MockNetwork, MockRadio};
use stats_agent::StatsAgent;

type Pump = EventPump<LoopbackSerial, PeriodicTimer, MockRadio, MockNetwork, MockEcho>;

fn neighbor() -> Ipv6Addr {
    "fe80::212:4b00:6:1".parse().unwrap()
}

fn probing_pump() -> Pump {
    let config = AgentConfig {
        tick_ms: 1_000,
        duration_ticks: 100,
        sample_period_ticks: 1,
        flush_period_ticks: 50,
        stats_period_ticks: 50,
        probe_enabled: true,
        probe_interval_ticks: 3,
        probe_timeout_ms: 1_000,
        print_help: false,
        ..AgentConfig::default()
    };
    let mut node = test_node();
    node.network.add_neighbor(neighbor());
    let timer = PeriodicTimer::new(config.tick_ms);
    let agent = StatsAgent::new(config, node);
    EventPump::new(SerialPort::new(LoopbackSerial::new()), timer, agent)
}

fn send(pump: &mut Pump, now_ms: u64, line: &str) {
    pump.serial_mut().driver_mut().push_rx(line.as_bytes());
    pump.serial_mut().driver_mut().push_rx(b"\n");
    pump.poll(now_ms);
}

fn reply(pump: &mut Pump, source: Ipv6Addr, at_ms: u64) {
    pump.agent_mut().node_mut().echo.queue_reply(EchoReply {
        source,
        ttl: 64,
        payload_len: 4,
        timestamp_ms: at_ms,
    });
}

fn probe_reports(pump: &mut Pump) -> Vec<ParsedReport> {
    pump.serial_mut()
        .driver_mut()
        .drain_lines()
        .iter()
        .filter_map(|line| parse_report(line))
        .filter(|report| {
            matches!(
                report,
                ParsedReport::ProbeReply { .. }
                    | ParsedReport::ProbeTimeout { .. }
                    | ParsedReport::ProbeSummary { .. }
            )
        })
        .collect()
}

fn run_ticks(pump: &mut Pump, ticks: std::ops::RangeInclusive<u64>) {
    for tick in ticks {
        pump.poll(tick * 1_000);
    }
}

#[test]
fn reply_before_deadline_is_reported_once() {
    let mut pump = probing_pump();
    send(&mut pump, 0, ">");
    run_ticks(&mut pump, 1..=3);
    assert_eq!(pump.agent().node().echo.sent(), &[(neighbor(), 4)]);

    reply(&mut pump, neighbor(), 3_040);
    pump.poll(3_040);
    pump.poll(4_000);
    pump.poll(4_500);
    assert_eq!(
        probe_reports(&mut pump),
        vec![ParsedReport::ProbeReply {
            count: 1,
            issued_ms: 3_000,
            replied_ms: 3_040,
        }]
    );
}

#[test]
fn deadline_without_reply_times_out_and_late_reply_is_dropped() {
    let mut pump = probing_pump();
    send(&mut pump, 0, ">");
    run_ticks(&mut pump, 1..=3);
    pump.poll(3_999);
    assert!(probe_reports(&mut pump).is_empty());

    pump.poll(4_000);
    reply(&mut pump, neighbor(), 4_010);
    pump.poll(4_010);
    assert_eq!(
        probe_reports(&mut pump),
        vec![ParsedReport::ProbeTimeout {
            count: 1,
            issued_ms: 3_000,
        }]
    );
}

#[test]
fn reply_drained_in_deadline_cycle_wins() {
    let mut pump = probing_pump();
    send(&mut pump, 0, ">");
    run_ticks(&mut pump, 1..=3);
    reply(&mut pump, neighbor(), 4_000);
    pump.poll(4_000);
    assert_eq!(
        probe_reports(&mut pump),
        vec![ParsedReport::ProbeReply {
            count: 1,
            issued_ms: 3_000,
            replied_ms: 4_000,
        }]
    );
}

#[test]
fn counters_accumulate_and_are_summarised_at_stop() {
    let mut pump = probing_pump();
    send(&mut pump, 0, ">");
    run_ticks(&mut pump, 1..=3);
    reply(&mut pump, neighbor(), 3_020);
    run_ticks(&mut pump, 4..=7);
    send(&mut pump, 7_500, "=");
    assert_eq!(
        probe_reports(&mut pump),
        vec![
            ParsedReport::ProbeReply {
                count: 1,
                issued_ms: 3_000,
                replied_ms: 3_020,
            },
            ParsedReport::ProbeTimeout {
                count: 1,
                issued_ms: 6_000,
            },
            ParsedReport::ProbeSummary {
                replies: 1,
                timeouts: 1,
            },
        ]
    );
}

#[test]
fn stop_cancels_pending_probe_without_counting() {
    let mut pump = probing_pump();
    send(&mut pump, 0, ">");
    run_ticks(&mut pump, 1..=3);
    assert!(pump.agent().probe_in_flight());
    send(&mut pump, 3_500, "=");
    assert!(!pump.agent().probe_in_flight());
    reply(&mut pump, neighbor(), 3_600);
    pump.poll(3_600);
    pump.poll(5_000);
    assert_eq!(
        probe_reports(&mut pump),
        vec![ParsedReport::ProbeSummary {
            replies: 0,
            timeouts: 0,
        }]
    );
}

#[test]
fn counters_reset_on_new_session() {
    let mut pump = probing_pump();
    send(&mut pump, 0, ">");
    run_ticks(&mut pump, 1..=4);
    send(&mut pump, 4_500, "=");
    let _ = probe_reports(&mut pump);

    send(&mut pump, 5_000, ">");
    run_ticks(&mut pump, 6..=9);
    assert_eq!(
        probe_reports(&mut pump),
        vec![ParsedReport::ProbeTimeout {
            count: 1,
            issued_ms: 8_000,
        }]
    );
}

#[test]
fn manual_probe_is_rejected_while_one_is_pending() {
    let mut pump = probing_pump();
    send(&mut pump, 100, "! fe80::9");
    send(&mut pump, 200, "! fe80::10");
    assert_eq!(pump.agent().node().echo.sent().len(), 1);

    let foreign: Ipv6Addr = "fe80::10".parse().unwrap();
    reply(&mut pump, foreign, 250);
    pump.poll(250);
    assert!(pump.agent().probe_in_flight());

    pump.poll(1_100);
    assert_eq!(
        probe_reports(&mut pump),
        vec![ParsedReport::ProbeTimeout {
            count: 1,
            issued_ms: 100,
        }]
    );
}
