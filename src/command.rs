// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Single-byte command grammar used by the supervising controller.
// Author: Lukas Bower

//! Command parser for controller lines.
//!
//! Only the first character of a line selects the command. Anything the
//! parser does not recognise maps to [`Command::Unrecognized`]; the agent
//! drops those silently so a noisy or duplicated serial link never produces
//! errors on the device.

use core::net::Ipv6Addr;

/// Byte that starts a measurement session.
pub const START_BYTE: u8 = b'>';
/// Byte that promotes the node to DAG root.
pub const ROOT_BYTE: u8 = b'*';
/// Byte that stops the running session.
pub const STOP_BYTE: u8 = b'=';
/// Byte that starts a manual probe, followed by an IPv6 address.
pub const PROBE_BYTE: u8 = b'!';

/// Command decoded from one controller line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `>`: start a session.
    StartSession,
    /// `*`: promote the node to DAG root.
    PromoteToRoot,
    /// `=`: stop the running session.
    StopSession,
    /// `! <addr>`: probe `addr` once.
    Probe(Ipv6Addr),
    /// Any other line.
    Unrecognized,
}

impl Command {
    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartSession => "start",
            Self::PromoteToRoot => "root",
            Self::StopSession => "stop",
            Self::Probe(_) => "probe",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// Decode a controller line.
pub fn parse_line(line: &str) -> Command {
    let Some(&first) = line.as_bytes().first() else {
        return Command::Unrecognized;
    };
    match first {
        START_BYTE => Command::StartSession,
        ROOT_BYTE => Command::PromoteToRoot,
        STOP_BYTE => Command::StopSession,
        PROBE_BYTE => line[1..]
            .trim()
            .parse()
            .map(Command::Probe)
            .unwrap_or(Command::Unrecognized),
        _ => Command::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_byte_selects_command() {
        assert_eq!(parse_line(">"), Command::StartSession);
        assert_eq!(parse_line("> start please"), Command::StartSession);
        assert_eq!(parse_line("*"), Command::PromoteToRoot);
        assert_eq!(parse_line("=End"), Command::StopSession);
    }

    #[test]
    fn unknown_and_empty_lines_are_unrecognized() {
        assert_eq!(parse_line(""), Command::Unrecognized);
        assert_eq!(parse_line("reboot"), Command::Unrecognized);
        assert_eq!(parse_line(" >"), Command::Unrecognized);
    }

    #[test]
    fn probe_requires_an_address() {
        assert_eq!(
            parse_line("! fe80::212:4b00:6:1234"),
            Command::Probe("fe80::212:4b00:6:1234".parse().unwrap())
        );
        assert_eq!(parse_line("!"), Command::Unrecognized);
        assert_eq!(parse_line("! not-an-address"), Command::Unrecognized);
    }
}
