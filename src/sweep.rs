//! Raster-sweep controller for fast 2-D charge-stability style maps.
//!
//! An external generator ramps the fast (x) axis once per record and the
//! slow (y) axis once per buffer, so the capture geometry doubles as the
//! image geometry: samples per record = x points, records per buffer =
//! y points. Buffers are averaged, each record row becomes one y line.

use crate::ats::BoardInfo;
use crate::ats9462::{AcqSettings, BoardSettings, ChannelSelection, SAMPLES_DIVISOR};
use crate::controller::{
    record_to_volts, AcquisitionController, BufferAccumulator, CaptureLayout,
};
use crate::error::DriverError;
use crate::parameter::{check_float_range, check_int_range, check_multiple_of};
use ndarray::{Array1, Array2};

/// Sweep geometry: generator voltages and grid size.
#[derive(Clone, Copy, Debug)]
pub struct SweepAxes {
    pub x_start: f64,
    pub x_end: f64,
    pub x_npts: usize,
    pub y_start: f64,
    pub y_end: f64,
    pub y_npts: usize,
}

impl SweepAxes {
    pub fn validate(&self) -> Result<(), DriverError> {
        for (param, value) in [
            ("x_start", self.x_start),
            ("x_end", self.x_end),
            ("y_start", self.y_start),
            ("y_end", self.y_end),
        ] {
            check_float_range(param, value, -10.0, 10.0)?;
        }
        // The fast axis doubles as the record length, so it inherits the
        // board's record-length granularity.
        check_multiple_of("x_npts", self.x_npts, SAMPLES_DIVISOR, SAMPLES_DIVISOR)?;
        check_int_range("x_npts", self.x_npts as i64, 1, 10_000)?;
        check_int_range("y_npts", self.y_npts as i64, 1, 10_000)?;
        Ok(())
    }
}

/// One 2-D frame per channel plus the generator voltage axes.
#[derive(Clone, Debug)]
pub struct SweepFrame {
    pub channel_a: Array2<f64>,
    pub channel_b: Array2<f64>,
    pub x: Array1<f64>,
    pub y: Array1<f64>,
}

pub struct SweepController {
    axes: SweepAxes,
    input_ranges: [f64; 2],
    layout: Option<CaptureLayout>,
    acc: Option<BufferAccumulator>,
}

impl SweepController {
    pub fn new(axes: SweepAxes) -> Result<Self, DriverError> {
        axes.validate()?;
        Ok(Self {
            axes,
            input_ranges: [0.0; 2],
            layout: None,
            acc: None,
        })
    }

    pub fn axes(&self) -> &SweepAxes {
        &self.axes
    }
}

impl AcquisitionController for SweepController {
    type Output = SweepFrame;

    fn pre_start_capture(
        &mut self,
        board: &BoardSettings,
        acq: &AcqSettings,
        info: &BoardInfo,
    ) -> Result<(), DriverError> {
        if acq.samples_per_record != self.axes.x_npts {
            return Err(DriverError::SettingsMismatch {
                what: "samples per record",
                driver: acq.samples_per_record.to_string(),
                controller: format!("{} x points", self.axes.x_npts),
            });
        }
        if acq.records_per_buffer != self.axes.y_npts {
            return Err(DriverError::SettingsMismatch {
                what: "records per buffer",
                driver: acq.records_per_buffer.to_string(),
                controller: format!("{} y points", self.axes.y_npts),
            });
        }
        if acq.channel_selection != ChannelSelection::Ab {
            return Err(DriverError::SettingsMismatch {
                what: "channel selection",
                driver: format!("{:?}", acq.channel_selection),
                controller: "sweep frames need channels A and B".to_string(),
            });
        }
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

    fn post_acquire(&mut self) -> Result<SweepFrame, DriverError> {
        let layout = self.layout.take().ok_or(DriverError::TraceNotReady(
            "post_acquire without pre_start_capture",
        ))?;
        let acc = self.acc.take().expect("accumulator follows layout");

        let spr = layout.samples_per_record;
        let rpb = layout.records_per_buffer;
        // Every y row appears once per buffer, so buffer count is the
        // averaging divisor here, not the total record count.
        let buffers = layout.buffers_per_acquisition as f64;

        let frame_for = |channel_block: usize, input_range: f64| -> Array2<f64> {
            let mut frame = Array2::<f64>::zeros((rpb, spr));
            for row in 0..rpb {
                let base = channel_block * rpb * spr + row * spr;
                let rec = Array1::from_shape_fn(spr, |n| acc.sum()[base + n] / buffers);
                frame
                    .row_mut(row)
                    .assign(&record_to_volts(&rec, input_range, layout.bits_per_sample));
            }
            frame
        };

        let channel_a = frame_for(0, self.input_ranges[0]);
        let channel_b = frame_for(1, self.input_ranges[1]);

        Ok(SweepFrame {
            channel_a,
            channel_b,
            x: Array1::linspace(self.axes.x_start, self.axes.x_end, self.axes.x_npts),
            y: Array1::linspace(self.axes.y_start, self.axes.y_end, self.axes.y_npts),
        })
    }
}
