//! Software demodulation controller.
//!
//! Averages records of channel A over the whole acquisition, converts to
//! volts, multiplies with cos/sin reference waves at each demodulation
//! frequency, low-pass filters out the double-frequency component and
//! returns magnitude and phase limited to the integration window.

use crate::ats::BoardInfo;
use crate::ats9462::{AcqSettings, BoardSettings, SAMPLES_DIVISOR};
use crate::controller::{
    record_to_volts, AcquisitionController, BufferAccumulator, CaptureLayout,
};
use crate::dsp;
use crate::error::DriverError;
use crate::parameter::check_float_range;
use log::warn;
use ndarray::{s, Array2};
use serde::Deserialize;
use std::f64::consts::TAU;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Window,
    LeastSquares,
}

/// Low-pass filter used to strip the double-frequency mixing product.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct FilterSettings {
    pub kind: FilterKind,
    pub numtaps: usize,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            kind: FilterKind::Window,
            numtaps: 101,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DemodSettings {
    /// Demodulation frequencies, each 1 MHz..=500 MHz.
    pub freqs: Vec<f64>,
    /// Integration time in seconds (0..=0.1).
    pub int_time: f64,
    /// Integration delay in seconds (0..=0.1). Defaults to the filter
    /// settling time, (numtaps - 1) / sample_rate.
    pub int_delay: Option<f64>,
    pub filter: FilterSettings,
    /// Channel B processing is not implemented; requesting it fails at
    /// post-processing like the hardware drivers always have.
    pub process_channel_b: bool,
}

/// Demodulated output, one row per demodulation frequency.
#[derive(Clone, Debug)]
pub struct DemodOutput {
    pub magnitude: Array2<f64>,
    pub phase_deg: Array2<f64>,
    pub frequencies: Vec<f64>,
}

pub struct DemodController {
    freqs: Vec<f64>,
    int_time: f64,
    int_delay: f64,
    filter: FilterSettings,
    process_channel_b: bool,
    sample_rate: f64,
    samples_per_record: usize,
    cos: Array2<f64>,
    sin: Array2<f64>,
    input_range: f64,
    layout: Option<CaptureLayout>,
    acc: Option<BufferAccumulator>,
}

impl DemodController {
    /// Minimum integration delay for the filter to settle.
    pub fn default_int_delay(numtaps: usize, sample_rate: f64) -> f64 {
        (numtaps - 1) as f64 / sample_rate
    }

    /// Longest integration time the configured record length allows.
    pub fn max_int_time(
        samples_per_record: usize,
        sample_rate: f64,
        int_delay: f64,
    ) -> Result<f64, DriverError> {
        if samples_per_record == 0 {
            return Err(DriverError::OutOfRange {
                param: "samples_per_record",
                value: "0".to_string(),
                expected: "choose int_time first so the record length can be derived".to_string(),
            });
        }
        Ok(samples_per_record as f64 / sample_rate - int_delay)
    }

    pub fn new(settings: DemodSettings, sample_rate: f64) -> Result<Self, DriverError> {
        if settings.freqs.is_empty() {
            return Err(DriverError::OutOfRange {
                param: "demod_freq",
                value: "(none)".to_string(),
                expected: "at least one demodulation frequency".to_string(),
            });
        }
        for &freq in &settings.freqs {
            check_float_range("demod_freq", freq, 1e6, 500e6)?;
        }
        check_float_range("int_time", settings.int_time, 0.0, 0.1)?;
        let int_delay = settings
            .int_delay
            .unwrap_or_else(|| Self::default_int_delay(settings.filter.numtaps, sample_rate));
        check_float_range("int_delay", int_delay, 0.0, 0.1)?;

        let max_freq = settings.freqs.iter().cloned().fold(f64::MIN, f64::max);
        let oscillations = settings.int_time * max_freq;
        let oversampling = sample_rate / (2.0 * max_freq);
        if oscillations < 10.0 {
            warn!(
                "{oscillations} oscillations measured for largest demod freq, recommend at \
                 least 10: decrease sampling rate, take more samples or increase demodulation freq"
            );
        } else if oversampling < 1.0 {
            warn!(
                "oversampling rate is {oversampling}, recommend > 1: increase sampling rate \
                 or decrease demodulation frequency"
            );
        }
        let settle = Self::default_int_delay(settings.filter.numtaps, sample_rate);
        if int_delay < settle {
            warn!("delay is less than recommended for filter choice (expect delay >= {settle})");
        }

        let samples_needed = ((settings.int_time + int_delay) * sample_rate).ceil() as usize;
        let samples_per_record = dsp::roundup(samples_needed, SAMPLES_DIVISOR);

        let n_freqs = settings.freqs.len();
        let cos = Array2::from_shape_fn((n_freqs, samples_per_record), |(i, n)| {
            (TAU * settings.freqs[i] * n as f64 / sample_rate).cos()
        });
        let sin = Array2::from_shape_fn((n_freqs, samples_per_record), |(i, n)| {
            (TAU * settings.freqs[i] * n as f64 / sample_rate).sin()
        });

        Ok(Self {
            freqs: settings.freqs,
            int_time: settings.int_time,
            int_delay,
            filter: settings.filter,
            process_channel_b: settings.process_channel_b,
            sample_rate,
            samples_per_record,
            cos,
            sin,
            input_range: 0.0,
            layout: None,
            acc: None,
        })
    }

    /// Record length the acquisition settings must be programmed with.
    pub fn required_samples_per_record(&self) -> usize {
        self.samples_per_record
    }

    pub fn int_delay(&self) -> f64 {
        self.int_delay
    }

    fn max_freq(&self) -> f64 {
        self.freqs.iter().cloned().fold(f64::MIN, f64::max)
    }
}

impl AcquisitionController for DemodController {
    type Output = DemodOutput;

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
        if board.sample_rate != self.sample_rate {
            return Err(DriverError::SettingsMismatch {
                what: "sample rate",
                driver: board.sample_rate.to_string(),
                controller: self.sample_rate.to_string(),
            });
        }
        if !acq.channel_selection.includes_a() {
            return Err(DriverError::SettingsMismatch {
                what: "channel selection",
                driver: format!("{:?}", acq.channel_selection),
                controller: "channel A required".to_string(),
            });
        }
        let layout = CaptureLayout::new(acq, info);
        self.input_range = board.channels[0].range;
        self.acc = Some(BufferAccumulator::new(layout.buffer_len()));
        self.layout = Some(layout);
        Ok(())
    }

    fn handle_buffer(&mut self, samples: &[u16]) {
        if let Some(acc) = self.acc.as_mut() {
            acc.add(samples);
        }
    }

    fn post_acquire(&mut self) -> Result<DemodOutput, DriverError> {
        if self.process_channel_b {
            return Err(DriverError::NotImplemented("channel B demodulation"));
        }
        let layout = self.layout.take().ok_or(DriverError::TraceNotReady(
            "post_acquire without pre_start_capture",
        ))?;
        let acc = self.acc.take().expect("accumulator follows layout");

        let rec = layout.average_channel_records(acc.sum(), 0);
        let volts = record_to_volts(&rec, self.input_range, layout.bits_per_sample);

        // One row per demodulation frequency, mixed with the references.
        let n_freqs = self.freqs.len();
        let volt_mat =
            Array2::from_shape_fn((n_freqs, self.samples_per_record), |(_, n)| volts[n]);
        let re_mat = &volt_mat * &self.cos;
        let im_mat = &volt_mat * &self.sin;

        let cutoff = self.max_freq() / 20.0;
        let (re_filtered, im_filtered) = match self.filter.kind {
            FilterKind::Window => (
                dsp::filter_win(&re_mat, cutoff, self.sample_rate, self.filter.numtaps),
                dsp::filter_win(&im_mat, cutoff, self.sample_rate, self.filter.numtaps),
            ),
            FilterKind::LeastSquares => (
                dsp::filter_ls(&re_mat, cutoff, self.sample_rate, self.filter.numtaps)?,
                dsp::filter_ls(&im_mat, cutoff, self.sample_rate, self.filter.numtaps)?,
            ),
        };

        let beginning = (self.int_delay * self.sample_rate) as usize;
        let end = (beginning + (self.int_time * self.sample_rate) as usize)
            .min(self.samples_per_record);
        let re_limited = re_filtered.slice(s![.., beginning..end]).to_owned();
        let im_limited = im_filtered.slice(s![.., beginning..end]).to_owned();

        let (magnitude, phase_deg) = dsp::mag_phase_deg(&re_limited, &im_limited);
        Ok(DemodOutput {
            magnitude,
            phase_deg,
            frequencies: self.freqs.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ats9462::{AcqSettings, Ats9462, BoardSettings, ChannelSelection};
    use crate::sim::{SimBoard, SimChannel, SimSettings};

    fn demod_settings() -> DemodSettings {
        DemodSettings {
            freqs: vec![1e6],
            int_time: 1e-4,
            int_delay: None,
            filter: FilterSettings::default(),
            process_channel_b: false,
        }
    }

    #[test]
    fn rejects_out_of_band_frequencies() {
        let settings = DemodSettings {
            freqs: vec![1e3],
            ..demod_settings()
        };
        assert!(DemodController::new(settings, 1e7).is_err());
    }

    #[test]
    fn max_int_time_requires_record_length() {
        assert!(DemodController::max_int_time(0, 1e7, 0.0).is_err());
        let t = DemodController::max_int_time(1120, 1e7, 1e-5).unwrap();
        assert!((t - (1120.0 / 1e7 - 1e-5)).abs() < 1e-12);
    }

    #[test]
    fn geometry_mismatch_is_rejected() {
        let mut controller = DemodController::new(demod_settings(), 1e7).unwrap();
        let board = BoardSettings {
            sample_rate: 1e7,
            ..Default::default()
        };
        let acq = AcqSettings {
            samples_per_record: 512, // controller derived a different length
            ..Default::default()
        };
        let info = crate::ats::BoardInfo {
            model: "ATS9462".into(),
            serial: 0,
            bits_per_sample: 16,
            max_samples_per_record: 1 << 20,
        };
        assert!(controller.pre_start_capture(&board, &acq, &info).is_err());
    }

    #[test]
    fn channel_b_processing_not_implemented() {
        let settings = DemodSettings {
            process_channel_b: true,
            ..demod_settings()
        };
        let mut controller = DemodController::new(settings, 1e7).unwrap();
        assert!(matches!(
            controller.post_acquire(),
            Err(DriverError::NotImplemented(_))
        ));
    }

    #[test]
    fn demodulates_simulated_tone() {
        let sample_rate = 1e7;
        let amplitude = 0.5;
        let board = SimBoard::new(SimSettings {
            channel_a: SimChannel {
                frequency: 1e6,
                amplitude,
                offset: 0.0,
                phase_deg: 0.0,
            },
            ..Default::default()
        });

        let mut dig = Ats9462::open(board).unwrap();
        dig.configure(BoardSettings {
            sample_rate,
            ..Default::default()
        })
        .unwrap();

        let mut controller = DemodController::new(demod_settings(), sample_rate).unwrap();
        dig.set_acquisition(AcqSettings {
            samples_per_record: controller.required_samples_per_record(),
            records_per_buffer: 2,
            buffers_per_acquisition: 4,
            allocated_buffers: 2,
            channel_selection: ChannelSelection::Ab,
            ..Default::default()
        })
        .unwrap();

        let out = dig.acquire(&mut controller).unwrap();
        assert_eq!(out.magnitude.nrows(), 1);

        // Mixing a sine with a cosine/sine pair leaves I ~ 0 and
        // Q ~ A/2, so the magnitude settles at half the tone amplitude
        // and the phase at 90 degrees.
        let n = out.magnitude.ncols();
        let mag_mean: f64 = out.magnitude.row(0).iter().sum::<f64>() / n as f64;
        assert!(
            (mag_mean - amplitude / 2.0).abs() < 0.02,
            "magnitude {mag_mean}"
        );
        let phase_mean: f64 = out.phase_deg.row(0).iter().sum::<f64>() / n as f64;
        assert!((phase_mean - 90.0).abs() < 2.0, "phase {phase_mean}");
    }
}
