// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Periodic background-noise sampling and flushing.
// Author: Lukas Bower

//! Background-noise sampler.
//!
//! Readings are appended to a fixed-capacity buffer on every sample boundary
//! and reported as a single `BGN` line on every flush boundary. A flush always
//! emits a line, even when nothing was sampled, so the controller sees a
//! steady heartbeat.

use heapless::Vec as HeaplessVec;

use crate::event::Periodic;
use crate::platform::{NoiseReading, RadioStats};
use crate::report::{Report, ReportSink};

/// Maximum readings held between two flushes.
pub const NOISE_CAPACITY: usize = 128;

/// Sampler state owned by the session controller.
#[derive(Debug, Clone)]
pub struct NoiseSampler {
    sample_at: Periodic,
    flush_at: Periodic,
    buffer: HeaplessVec<NoiseReading, NOISE_CAPACITY>,
    rejected: u32,
}

impl NoiseSampler {
    /// Create a sampler with the given sample and flush periods in ticks.
    pub fn new(sample_period: u64, flush_period: u64) -> Self {
        Self {
            sample_at: Periodic::new(sample_period),
            flush_at: Periodic::new(flush_period),
            buffer: HeaplessVec::new(),
            rejected: 0,
        }
    }

    /// Advance the sampler to `tick`: sample first, then flush if due.
    pub fn on_tick<R>(&mut self, tick: u64, radio: &mut R, out: &mut dyn ReportSink)
    where
        R: RadioStats + ?Sized,
    {
        if self.sample_at.fire(tick) {
            let reading = radio.current_noise_reading();
            self.record(reading);
        }
        if self.flush_at.fire(tick) {
            self.flush(out);
        }
    }

    /// Append a reading; returns `false` when the buffer is full.
    pub fn record(&mut self, reading: NoiseReading) -> bool {
        if self.buffer.push(reading).is_err() {
            self.rejected = self.rejected.saturating_add(1);
            log::warn!(
                "[noise] buffer full ({} readings), sample at {} ms rejected",
                NOISE_CAPACITY,
                reading.timestamp_ms
            );
            return false;
        }
        true
    }

    /// Emit buffered readings as one `BGN` line and clear the buffer.
    pub fn flush(&mut self, out: &mut dyn ReportSink) {
        log::trace!("[noise] flushing {} readings", self.buffer.len());
        out.emit(&Report::Noise(self.buffer.as_slice()));
        self.buffer.clear();
    }

    /// Drop buffered readings and forget the last boundaries.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.sample_at.reset();
        self.flush_at.reset();
    }

    /// Readings waiting for the next flush.
    #[must_use]
    pub fn buffered(&self) -> &[NoiseReading] {
        self.buffer.as_slice()
    }

    /// Readings rejected because the buffer was full.
    #[must_use]
    pub fn rejected(&self) -> u32 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRadio;

    #[test]
    fn samples_then_flushes_on_shared_boundary() {
        let mut radio = MockRadio::new();
        let mut out = Vec::<String>::new();
        let mut sampler = NoiseSampler::new(1, 3);
        for tick in 1..=3 {
            sampler.on_tick(tick, &mut radio, &mut out);
        }
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].matches('[').count(), 3);
        assert!(sampler.buffered().is_empty());
    }

    #[test]
    fn empty_flush_still_reports() {
        let mut out = Vec::<String>::new();
        let mut sampler = NoiseSampler::new(5, 10);
        sampler.flush(&mut out);
        sampler.flush(&mut out);
        assert_eq!(out, vec!["BGN".to_owned(), "BGN".to_owned()]);
    }

    #[test]
    fn fires_once_per_tick() {
        let mut radio = MockRadio::new();
        let mut out = Vec::<String>::new();
        let mut sampler = NoiseSampler::new(2, 4);
        sampler.on_tick(2, &mut radio, &mut out);
        sampler.on_tick(2, &mut radio, &mut out);
        assert_eq!(sampler.buffered().len(), 1);
        assert_eq!(radio.noise_reads(), 1);
    }

    #[test]
    fn full_buffer_rejects_new_readings() {
        let mut sampler = NoiseSampler::new(1, 1);
        let reading = NoiseReading {
            timestamp_ms: 1,
            channel: 26,
            rssi: -90,
        };
        for _ in 0..NOISE_CAPACITY {
            assert!(sampler.record(reading));
        }
        assert!(!sampler.record(reading));
        assert_eq!(sampler.rejected(), 1);
        assert_eq!(sampler.buffered().len(), NOISE_CAPACITY);
    }
}
