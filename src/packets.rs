// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Periodic read-and-clear packet statistics reporting.
// Author: Lukas Bower

//! Packet statistics reporter.

use crate::event::Periodic;
use crate::platform::RadioStats;
use crate::report::{Report, ReportSink};

/// Reporter state owned by the session controller.
#[derive(Debug, Clone)]
pub struct PacketReporter {
    schedule: Periodic,
    reports: u64,
}

impl PacketReporter {
    /// Create a reporter that fires every `period` ticks.
    pub fn new(period: u64) -> Self {
        Self {
            schedule: Periodic::new(period),
            reports: 0,
        }
    }

    /// Report if `tick` is on a period boundary. Returns `true` when a report was emitted.
    pub fn on_tick<R>(&mut self, tick: u64, radio: &mut R, out: &mut dyn ReportSink) -> bool
    where
        R: RadioStats + ?Sized,
    {
        if !self.schedule.fire(tick) {
            return false;
        }
        self.report(radio, out);
        true
    }

    /// Take a snapshot from the driver, clearing it, and emit it.
    ///
    /// The summary line is always written so an idle link still reports `Tx/Rx 0/0`.
    pub fn report<R>(&mut self, radio: &mut R, out: &mut dyn ReportSink)
    where
        R: RadioStats + ?Sized,
    {
        let stats = radio.snapshot_and_clear();
        self.reports = self.reports.saturating_add(1);
        log::debug!(
            "[packets] report #{} tx={} rx={}",
            self.reports,
            stats.tx_count(),
            stats.rx_count()
        );
        out.emit(&Report::PacketSummary {
            tx: stats.tx_count(),
            rx: stats.rx_count(),
        });
        for record in &stats.records {
            out.emit(&Report::Packet(record));
        }
    }

    /// Forget the last boundary so a new session starts from scratch.
    pub fn reset(&mut self) {
        self.schedule.reset();
    }

    /// Reports emitted since the process started.
    #[must_use]
    pub fn reports(&self) -> u64 {
        self.reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PacketKind, PacketRecord, RxRecord};
    use crate::test_support::MockRadio;

    fn rx(seq: u8) -> PacketRecord {
        PacketRecord::Rx(RxRecord {
            timestamp_ms: 40,
            kind: PacketKind::Data,
            source: 0x0007,
            channel: 26,
            len: 20,
            seq,
            rssi: -60,
            lqi: 180,
        })
    }

    #[test]
    fn report_reads_and_clears() {
        let mut radio = MockRadio::new();
        radio.record_packet(rx(1));
        radio.record_packet(rx(2));
        let mut out = Vec::<String>::new();
        let mut reporter = PacketReporter::new(10);
        reporter.report(&mut radio, &mut out);
        assert_eq!(out[0], "Tx/Rx 0/2");
        assert_eq!(out.len(), 3);

        out.clear();
        reporter.report(&mut radio, &mut out);
        assert_eq!(out, vec!["Tx/Rx 0/0".to_owned()]);
    }

    #[test]
    fn fires_only_on_boundary() {
        let mut radio = MockRadio::new();
        let mut out = Vec::<String>::new();
        let mut reporter = PacketReporter::new(5);
        let fired: Vec<u64> = (1..=12)
            .filter(|tick| reporter.on_tick(*tick, &mut radio, &mut out))
            .collect();
        assert_eq!(fired, vec![5, 10]);
        assert_eq!(reporter.reports(), 2);
    }
}
