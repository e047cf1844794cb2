//! Acquisition controller lifecycle and the buffer-averaging plumbing the
//! concrete controllers share.
//!
//! A controller is attached to one acquisition: the driver calls
//! `pre_start_capture` before arming (where the controller checks its own
//! cached geometry against the driver's), `handle_buffer` once per filled
//! DMA buffer, and `post_acquire` to produce the processed result.

use crate::ats::BoardInfo;
use crate::ats9462::{AcqSettings, BoardSettings};
use crate::dsp;
use crate::error::DriverError;
use log::warn;
use ndarray::Array1;

pub trait AcquisitionController {
    type Output;

    /// Runs before the board is armed. Controllers validate their cached
    /// settings against the driver's here and size their accumulators.
    fn pre_start_capture(
        &mut self,
        board: &BoardSettings,
        acq: &AcqSettings,
        info: &BoardInfo,
    ) -> Result<(), DriverError>;

    /// Runs after capture has started, before the first buffer arrives.
    fn pre_acquire(&mut self) {}

    /// One filled DMA buffer, channel-blocked. The slice is reused by the
    /// board after this call returns.
    fn handle_buffer(&mut self, samples: &[u16]);

    /// Runs once all buffers are in; produces the measurement result.
    fn post_acquire(&mut self) -> Result<Self::Output, DriverError>;
}

/// Sums incoming buffers into one flat f64 accumulator; dividing by the
/// record count afterwards turns the sum into the buffer average.
#[derive(Debug)]
pub struct BufferAccumulator {
    sum: Array1<f64>,
    buffers_seen: usize,
}

impl BufferAccumulator {
    pub fn new(len: usize) -> Self {
        Self {
            sum: Array1::zeros(len),
            buffers_seen: 0,
        }
    }

    pub fn add(&mut self, samples: &[u16]) {
        debug_assert_eq!(samples.len(), self.sum.len());
        for (acc, &s) in self.sum.iter_mut().zip(samples) {
            *acc += s as f64;
        }
        self.buffers_seen += 1;
    }

    pub fn buffers_seen(&self) -> usize {
        self.buffers_seen
    }

    pub fn sum(&self) -> &Array1<f64> {
        &self.sum
    }
}

/// Geometry a controller captures at `pre_start_capture` and uses to take
/// the flat accumulator apart again.
#[derive(Clone, Copy, Debug)]
pub struct CaptureLayout {
    pub samples_per_record: usize,
    pub records_per_buffer: usize,
    pub buffers_per_acquisition: usize,
    pub channels: usize,
    pub bits_per_sample: u8,
}

impl CaptureLayout {
    pub fn new(acq: &AcqSettings, info: &BoardInfo) -> Self {
        Self {
            samples_per_record: acq.samples_per_record,
            records_per_buffer: acq.records_per_buffer,
            buffers_per_acquisition: acq.buffers_per_acquisition,
            channels: acq.channel_selection.count(),
            bits_per_sample: info.bits_per_sample,
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.samples_per_record * self.records_per_buffer * self.channels
    }

    pub fn records_per_acquisition(&self) -> usize {
        self.records_per_buffer * self.buffers_per_acquisition
    }

    /// Average all records of one channel block of the accumulated buffer
    /// into a single record. `channel_block` indexes the active channels
    /// in buffer order (A before B when both are captured).
    pub fn average_channel_records(
        &self,
        sum: &Array1<f64>,
        channel_block: usize,
    ) -> Array1<f64> {
        let spr = self.samples_per_record;
        let mut rec = Array1::<f64>::zeros(spr);
        for record in 0..self.records_per_buffer {
            let base = channel_block * self.records_per_buffer * spr + record * spr;
            for n in 0..spr {
                rec[n] += sum[base + n];
            }
        }
        rec / self.records_per_acquisition() as f64
    }
}

/// Convert an averaged record of ADC codes to volts for the board's bit
/// depth. Unknown depths fall back to mean-centred raw samples with a
/// warning, matching the drivers' permissive behavior on unfamiliar
/// hardware.
pub fn record_to_volts(rec: &Array1<f64>, input_range: f64, bits_per_sample: u8) -> Array1<f64> {
    match bits_per_sample {
        12 => dsp::sample_to_volt_u12(rec, input_range),
        16 => dsp::sample_to_volt_u16(rec, input_range),
        other => {
            warn!(
                "no volts conversion for {other} bits per sample, returning centered raw samples"
            );
            dsp::mean_centered(rec)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ats9462::ChannelSelection;

    fn layout() -> CaptureLayout {
        CaptureLayout {
            samples_per_record: 4,
            records_per_buffer: 2,
            buffers_per_acquisition: 3,
            channels: 2,
            bits_per_sample: 16,
        }
    }

    #[test]
    fn accumulator_sums_buffers() {
        let mut acc = BufferAccumulator::new(4);
        acc.add(&[1, 2, 3, 4]);
        acc.add(&[10, 20, 30, 40]);
        assert_eq!(acc.buffers_seen(), 2);
        assert_eq!(acc.sum()[3], 44.0);
    }

    #[test]
    fn channel_blocks_average_independently() {
        let layout = layout();
        // One buffer: channel A records [1 1 1 1], [3 3 3 3];
        // channel B records [5 5 5 5], [7 7 7 7].
        let mut acc = BufferAccumulator::new(layout.buffer_len());
        let buffer: Vec<u16> = [1u16, 3, 5, 7]
            .iter()
            .flat_map(|&v| std::iter::repeat(v).take(4))
            .collect();
        // Three identical buffers, as if averaging over the acquisition.
        for _ in 0..3 {
            acc.add(&buffer);
        }

        let rec_a = layout.average_channel_records(acc.sum(), 0);
        let rec_b = layout.average_channel_records(acc.sum(), 1);
        // Sum over 3 buffers x 2 records, divided by 6 records total.
        assert!((rec_a[0] - 2.0).abs() < 1e-12);
        assert!((rec_b[0] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn layout_tracks_channel_selection() {
        let acq = AcqSettings {
            channel_selection: ChannelSelection::A,
            ..Default::default()
        };
        let info = crate::ats::BoardInfo {
            model: "ATS9462".into(),
            serial: 0,
            bits_per_sample: 16,
            max_samples_per_record: 1 << 20,
        };
        let layout = CaptureLayout::new(&acq, &info);
        assert_eq!(layout.channels, 1);
        assert_eq!(layout.buffer_len(), 1024 * 10);
    }
}
