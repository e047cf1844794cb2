//! Record-averaging controller: averages over buffers and records and
//! returns the volt waveform of each captured channel. A point reduction
//! collapses the channel A/B records into a single I/Q sample for
//! homodyne detection chains where A carries I and B carries Q.

use crate::ats::BoardInfo;
use crate::ats9462::{AcqSettings, BoardSettings, ChannelSelection};
use crate::controller::{
    record_to_volts, AcquisitionController, BufferAccumulator, CaptureLayout,
};
use crate::error::DriverError;
use ndarray::Array1;

/// Buffer- and record-averaged volt waveforms.
#[derive(Clone, Debug)]
pub struct VoltRecords {
    pub channel_a: Option<Array1<f64>>,
    pub channel_b: Option<Array1<f64>>,
}

/// One demodulated point: I from channel A, Q from channel B.
#[derive(Clone, Copy, Debug)]
pub struct IqPoint {
    pub i: f64,
    pub q: f64,
    pub magnitude: f64,
    pub phase_deg: f64,
}

impl VoltRecords {
    /// Average each channel over the integration window and reduce to a
    /// single I/Q sample. Needs both channels captured.
    pub fn iq_point(&self) -> Result<IqPoint, DriverError> {
        let (a, b) = match (&self.channel_a, &self.channel_b) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(DriverError::SettingsMismatch {
                    what: "channel selection",
                    driver: "single channel captured".to_string(),
                    controller: "I/Q point needs channels A and B".to_string(),
                })
            }
        };
        let i = a.mean().unwrap_or(0.0);
        let q = b.mean().unwrap_or(0.0);
        Ok(IqPoint {
            i,
            q,
            magnitude: i.hypot(q),
            phase_deg: q.atan2(i).to_degrees(),
        })
    }
}

pub struct AverageController {
    samples_per_record: usize,
    selection: ChannelSelection,
    input_ranges: [f64; 2],
    layout: Option<CaptureLayout>,
    acc: Option<BufferAccumulator>,
}

impl AverageController {
    /// `samples_per_record` is cached here and cross-checked against the
    /// driver before capture, so a stale acquisition setup fails loudly.
    pub fn new(samples_per_record: usize) -> Self {
        Self {
            samples_per_record,
            selection: ChannelSelection::Ab,
            input_ranges: [0.0; 2],
            layout: None,
            acc: None,
        }
    }
}

impl AcquisitionController for AverageController {
    type Output = VoltRecords;

    fn pre_start_capture(
        &mut self,
        board: &BoardSettings,
        acq: &AcqSettings,
        info: &BoardInfo,
    ) -> Result<(), DriverError> {
        if acq.samples_per_record != self.samples_per_record {
            return Err(DriverError::SettingsMismatch {
                what: "samples per record",
                driver: acq.samples_per_record.to_string(),
                controller: self.samples_per_record.to_string(),
            });
        }
        self.selection = acq.channel_selection;
        self.input_ranges = [board.channels[0].range, board.channels[1].range];
        let layout = CaptureLayout::new(acq, info);
        self.acc = Some(BufferAccumulator::new(layout.buffer_len()));
        self.layout = Some(layout);
        Ok(())
    }

    fn handle_buffer(&mut self, samples: &[u16]) {
        if let Some(acc) = self.acc.as_mut() {
            acc.add(samples);
        }
    }

    fn post_acquire(&mut self) -> Result<VoltRecords, DriverError> {
        let layout = self.layout.take().ok_or(DriverError::TraceNotReady(
            "post_acquire without pre_start_capture",
        ))?;
        let acc = self.acc.take().expect("accumulator follows layout");

        let mut block = 0;
        let channel_a = if self.selection.includes_a() {
            let rec = layout.average_channel_records(acc.sum(), block);
            block += 1;
            Some(record_to_volts(
                &rec,
                self.input_ranges[0],
                layout.bits_per_sample,
            ))
        } else {
            None
        };
        let channel_b = if self.selection.includes_b() {
            let rec = layout.average_channel_records(acc.sum(), block);
            Some(record_to_volts(
                &rec,
                self.input_ranges[1],
                layout.bits_per_sample,
            ))
        } else {
            None
        };

        Ok(VoltRecords {
            channel_a,
            channel_b,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ats9462::{AcqSettings, Ats9462, BoardSettings};
    use crate::sim::{SimBoard, SimChannel, SimSettings};

    fn dc_sim(a_offset: f64, b_offset: f64) -> SimBoard {
        SimBoard::new(SimSettings {
            channel_a: SimChannel {
                frequency: 0.0,
                amplitude: 0.0,
                offset: a_offset,
                phase_deg: 0.0,
            },
            channel_b: SimChannel {
                frequency: 0.0,
                amplitude: 0.0,
                offset: b_offset,
                phase_deg: 0.0,
            },
            noise: 0.0,
        })
    }

    #[test]
    fn stale_record_length_is_rejected() {
        let mut dig = Ats9462::open(dc_sim(0.0, 0.0)).unwrap();
        dig.configure(BoardSettings::default()).unwrap();
        dig.set_acquisition(AcqSettings {
            samples_per_record: 512,
            ..Default::default()
        })
        .unwrap();
        let mut controller = AverageController::new(1024);
        assert!(matches!(
            dig.acquire(&mut controller),
            Err(DriverError::SettingsMismatch { .. })
        ));
    }

    #[test]
    fn averaged_records_recover_dc_levels() {
        let mut dig = Ats9462::open(dc_sim(0.3, -0.4)).unwrap();
        dig.configure(BoardSettings::default()).unwrap();
        dig.set_acquisition(AcqSettings {
            samples_per_record: 256,
            records_per_buffer: 4,
            buffers_per_acquisition: 3,
            allocated_buffers: 3,
            ..Default::default()
        })
        .unwrap();

        let mut controller = AverageController::new(256);
        let records = dig.acquire(&mut controller).unwrap();
        let a = records.channel_a.as_ref().unwrap();
        let b = records.channel_b.as_ref().unwrap();
        assert!((a.mean().unwrap() - 0.3).abs() < 1e-3);
        assert!((b.mean().unwrap() + 0.4).abs() < 1e-3);

        let point = records.iq_point().unwrap();
        assert!((point.magnitude - 0.5).abs() < 1e-3);
        assert!((point.phase_deg - (-53.13)).abs() < 0.1);
    }

    #[test]
    fn iq_point_needs_both_channels() {
        let records = VoltRecords {
            channel_a: Some(Array1::zeros(8)),
            channel_b: None,
        };
        assert!(records.iq_point().is_err());
    }
}
