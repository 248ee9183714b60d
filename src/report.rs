// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Report line grammar emitted to the supervising controller.
// Author: Lukas Bower

//! Report lines written to the supervising controller over the serial link.
//!
//! Every line the agent produces is rendered from a [`Report`] so the wire
//! grammar lives in one place. [`parse_report`] understands the session and
//! probe lines and is used by controller-side tooling and tests.

use core::fmt;

use crate::platform::{DriverStats, NoiseReading, PacketRecord};

/// Legend emitted after the start acknowledgement when help output is enabled.
pub const HELP_LINES: &[&str] = &[
    "----------------------------------------------------------------------------",
    "       DESCRIPTION",
    "----------------------------------------------------------------------------",
    "BGN [time-stamp (channel)RSSI] [time-stamp (channel)RSSI] [ ...",
    "Tx/Rx tx-count/rx-count",
    "Tx [time-stamp] packet-type dest-addr (chn len sqn | pow) BC or UC",
    "Rx [time-stamp] packet-type sour-addr (chn len sqn | rssi lqi)",
];

/// Additional legend lines shown when neighbour probing is enabled.
pub const PROBE_HELP_LINES: &[&str] = &[
    "Devices ping their first neighbour. R = reply received, T = timeout",
    "PR x [start time -> reply time]",
    "PT x [start time]",
];

/// Closing legend line.
pub const HELP_FOOTER: &str =
    "At the end of the session driver totals (DS) and probe totals (PS) are reported.";

/// Informational line emitted when root promotion is a no-op.
pub const ALREADY_ROOT: &str = "Node is already a DAG root";

/// A single line emitted to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report<'a> {
    /// Session start acknowledgement.
    SessionStarted,
    /// Configured session duration in seconds.
    Duration {
        /// Duration in whole seconds.
        seconds: u64,
    },
    /// Session stop acknowledgement.
    SessionStopped,
    /// Buffered background-noise readings.
    Noise(&'a [NoiseReading]),
    /// Packet statistics header.
    PacketSummary {
        /// Transmitted frames in the snapshot.
        tx: usize,
        /// Received frames in the snapshot.
        rx: usize,
    },
    /// A single packet record.
    Packet(&'a PacketRecord),
    /// Probe answered before its deadline.
    ProbeReply {
        /// Running reply count.
        count: u32,
        /// Uptime when the request was issued.
        issued_ms: u64,
        /// Uptime when the reply arrived.
        replied_ms: u64,
    },
    /// Probe deadline expired.
    ProbeTimeout {
        /// Running timeout count.
        count: u32,
        /// Uptime when the request was issued.
        issued_ms: u64,
    },
    /// Final driver counters.
    Driver(&'a DriverStats),
    /// Probe totals reported when a session stops.
    ProbeSummary {
        /// Replies received during the session.
        replies: u32,
        /// Timeouts observed during the session.
        timeouts: u32,
    },
    /// Root promotion was requested on a node that already is root.
    AlreadyRoot,
    /// Radio hardware address.
    DeviceId(u64),
    /// Free-form legend text.
    Legend(&'static str),
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionStarted => f.write_str("> "),
            Self::Duration { seconds } => write!(f, "AD {seconds}"),
            Self::SessionStopped => f.write_str("= "),
            Self::Noise(readings) => {
                f.write_str("BGN")?;
                for reading in readings.iter() {
                    write!(
                        f,
                        " [{} ({}){}]",
                        reading.timestamp_ms, reading.channel, reading.rssi
                    )?;
                }
                Ok(())
            }
            Self::PacketSummary { tx, rx } => write!(f, "Tx/Rx {tx}/{rx}"),
            Self::Packet(PacketRecord::Tx(tx)) => write!(
                f,
                "Tx [{}] {} {:04x} ({} {} {} | {}) {}",
                tx.timestamp_ms,
                tx.kind.label(),
                tx.dest,
                tx.channel,
                tx.len,
                tx.seq,
                tx.power,
                if tx.broadcast { "BC" } else { "UC" },
            ),
            Self::Packet(PacketRecord::Rx(rx)) => write!(
                f,
                "Rx [{}] {} {:04x} ({} {} {} | {} {})",
                rx.timestamp_ms,
                rx.kind.label(),
                rx.source,
                rx.channel,
                rx.len,
                rx.seq,
                rx.rssi,
                rx.lqi,
            ),
            Self::ProbeReply {
                count,
                issued_ms,
                replied_ms,
            } => write!(f, "PR {count} [{issued_ms} -> {replied_ms}]"),
            Self::ProbeTimeout { count, issued_ms } => write!(f, "PT {count} [{issued_ms}]"),
            Self::Driver(stats) => write!(
                f,
                "DS tx={} ok={} col={} noack={} rx={} rxok={} crc={}",
                stats.tx_attempts,
                stats.tx_ok,
                stats.tx_collisions,
                stats.tx_no_ack,
                stats.rx_detected,
                stats.rx_ok,
                stats.rx_crc_errors,
            ),
            Self::ProbeSummary { replies, timeouts } => write!(f, "PS {replies} {timeouts}"),
            Self::AlreadyRoot => f.write_str(ALREADY_ROOT),
            Self::DeviceId(id) => write!(f, "Device ID: {id:016X}"),
            Self::Legend(text) => f.write_str(text),
        }
    }
}

/// Destination for rendered report lines.
pub trait ReportSink {
    /// Write one line without its terminator.
    fn emit_line(&mut self, line: &str);

    /// Render and write a report.
    fn emit(&mut self, report: &Report<'_>) {
        self.emit_line(&report.to_string());
    }
}

impl ReportSink for Vec<String> {
    fn emit_line(&mut self, line: &str) {
        self.push(line.to_owned());
    }
}

/// Report lines recognised by [`parse_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedReport {
    /// `> `
    SessionStarted,
    /// `AD <seconds>`
    Duration(u64),
    /// `= `
    SessionStopped,
    /// `BGN ...` with the number of readings carried.
    Noise(usize),
    /// `Tx/Rx <tx>/<rx>`
    PacketSummary {
        /// Transmitted frames.
        tx: usize,
        /// Received frames.
        rx: usize,
    },
    /// `PR <n> [<issued> -> <replied>]`
    ProbeReply {
        /// Running reply count.
        count: u32,
        /// Issue time.
        issued_ms: u64,
        /// Reply time.
        replied_ms: u64,
    },
    /// `PT <n> [<issued>]`
    ProbeTimeout {
        /// Running timeout count.
        count: u32,
        /// Issue time.
        issued_ms: u64,
    },
    /// `PS <replies> <timeouts>`
    ProbeSummary {
        /// Replies received.
        replies: u32,
        /// Timeouts observed.
        timeouts: u32,
    },
}

/// Parse a session or probe report line.
///
/// Packet record lines, driver totals and legend text return `None`.
pub fn parse_report(line: &str) -> Option<ParsedReport> {
    let line = line.trim_end();
    match line {
        ">" => return Some(ParsedReport::SessionStarted),
        "=" => return Some(ParsedReport::SessionStopped),
        _ => {}
    }
    let (tag, rest) = line.split_once(' ').unwrap_or((line, ""));
    match tag {
        "AD" => rest.trim().parse().ok().map(ParsedReport::Duration),
        "BGN" => Some(ParsedReport::Noise(rest.matches('[').count())),
        "Tx/Rx" => {
            let (tx, rx) = rest.trim().split_once('/')?;
            Some(ParsedReport::PacketSummary {
                tx: tx.parse().ok()?,
                rx: rx.parse().ok()?,
            })
        }
        "PR" => {
            let (count, body) = rest.split_once(' ')?;
            let body = body.trim().strip_prefix('[')?.strip_suffix(']')?;
            let (issued, replied) = body.split_once("->")?;
            Some(ParsedReport::ProbeReply {
                count: count.parse().ok()?,
                issued_ms: issued.trim().parse().ok()?,
                replied_ms: replied.trim().parse().ok()?,
            })
        }
        "PT" => {
            let (count, body) = rest.split_once(' ')?;
            let issued = body.trim().strip_prefix('[')?.strip_suffix(']')?;
            Some(ParsedReport::ProbeTimeout {
                count: count.parse().ok()?,
                issued_ms: issued.trim().parse().ok()?,
            })
        }
        "PS" => {
            let (replies, timeouts) = rest.trim().split_once(' ')?;
            Some(ParsedReport::ProbeSummary {
                replies: replies.parse().ok()?,
                timeouts: timeouts.trim().parse().ok()?,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PacketKind, RxRecord, TxRecord};

    #[test]
    fn session_lines_keep_trailing_space() {
        assert_eq!(Report::SessionStarted.to_string(), "> ");
        assert_eq!(Report::SessionStopped.to_string(), "= ");
        assert_eq!(Report::Duration { seconds: 3600 }.to_string(), "AD 3600");
    }

    #[test]
    fn noise_line_lists_every_reading() {
        let readings = [
            NoiseReading {
                timestamp_ms: 100,
                channel: 26,
                rssi: -91,
            },
            NoiseReading {
                timestamp_ms: 200,
                channel: 11,
                rssi: -88,
            },
        ];
        assert_eq!(
            Report::Noise(&readings).to_string(),
            "BGN [100 (26)-91] [200 (11)-88]"
        );
        assert_eq!(Report::Noise(&[]).to_string(), "BGN");
    }

    #[test]
    fn packet_lines_follow_legend() {
        let tx = PacketRecord::Tx(TxRecord {
            timestamp_ms: 5,
            kind: PacketKind::Beacon,
            dest: 0xffff,
            channel: 15,
            len: 32,
            seq: 7,
            power: 3,
            broadcast: true,
        });
        let rx = PacketRecord::Rx(RxRecord {
            timestamp_ms: 9,
            kind: PacketKind::Data,
            source: 0x1a2b,
            channel: 20,
            len: 64,
            seq: 8,
            rssi: -70,
            lqi: 200,
        });
        assert_eq!(
            Report::Packet(&tx).to_string(),
            "Tx [5] EB ffff (15 32 7 | 3) BC"
        );
        assert_eq!(
            Report::Packet(&rx).to_string(),
            "Rx [9] D 1a2b (20 64 8 | -70 200)"
        );
    }

    #[test]
    fn probe_lines_parse_back() {
        let reply = Report::ProbeReply {
            count: 2,
            issued_ms: 3000,
            replied_ms: 3042,
        }
        .to_string();
        assert_eq!(reply, "PR 2 [3000 -> 3042]");
        assert_eq!(
            parse_report(&reply),
            Some(ParsedReport::ProbeReply {
                count: 2,
                issued_ms: 3000,
                replied_ms: 3042,
            })
        );
        assert_eq!(
            parse_report("PT 1 [6000]"),
            Some(ParsedReport::ProbeTimeout {
                count: 1,
                issued_ms: 6000,
            })
        );
    }

    #[test]
    fn parse_ignores_unknown_lines() {
        assert_eq!(parse_report("> "), Some(ParsedReport::SessionStarted));
        assert_eq!(parse_report("AD 12"), Some(ParsedReport::Duration(12)));
        assert_eq!(parse_report("BGN"), Some(ParsedReport::Noise(0)));
        assert_eq!(
            parse_report("Tx/Rx 3/4"),
            Some(ParsedReport::PacketSummary { tx: 3, rx: 4 })
        );
        assert_eq!(parse_report(ALREADY_ROOT), None);
        assert_eq!(parse_report("PR x [1 -> 2]"), None);
    }
}
