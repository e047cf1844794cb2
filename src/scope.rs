//! LeCroy oscilloscope driver.
//!
//! Mixes plain SCPI-style commands with the vendor's VBS scripting macros
//! (`VBS? 'Return=...'`) for everything the remote command set does not
//! expose. Waveforms are transferred as 16-bit binary blocks; a malformed
//! read drains the stale message queue and retries once, which is how the
//! instrument recovers after an interrupted transfer.
//!
//! Tested against HDO4054A (USB/ETH) and WR44XI-A (ETH, LXI/VXII mode).

use crate::error::DriverError;
use crate::parameter::{check_float_range, check_int_range};
use crate::transport::Transport;
use ndarray::Array1;
use std::fmt;
use std::time::Duration;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TriggerMode {
    Auto,
    Normal,
    Single,
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Auto => "AUTO",
            Self::Normal => "NORMAL",
            Self::Single => "SINGLE",
        };
        f.write_str(text)
    }
}

impl std::str::FromStr for TriggerMode {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, DriverError> {
        match s.trim() {
            "AUTO" => Ok(Self::Auto),
            "NORMAL" => Ok(Self::Normal),
            "SINGLE" => Ok(Self::Single),
            other => Err(DriverError::Parse {
                what: "trigger mode",
                text: other.to_string(),
            }),
        }
    }
}

/// Time axis for a prepared trace.
#[derive(Clone, Debug)]
pub struct TraceSetpoints {
    pub time: Array1<f64>,
    pub points: usize,
}

pub struct Scope<T: Transport> {
    transport: T,
    trace_ready: bool,
}

fn parse_f64(what: &'static str, text: &str) -> Result<f64, DriverError> {
    text.trim().parse().map_err(|_| DriverError::Parse {
        what,
        text: text.to_string(),
    })
}

fn check_channel(channel: usize) -> Result<(), DriverError> {
    check_int_range("channel", channel as i64, 1, 4)
}

impl<T: Transport> Scope<T> {
    /// Connect and switch the instrument to headerless 16-bit binary
    /// waveform transfers.
    pub fn new(transport: T) -> Result<Self, DriverError> {
        let mut scope = Self {
            transport,
            trace_ready: false,
        };
        scope.transport.write_line("COMM_HEADER OFF")?;
        scope.transport.write_line("COMM_FORMAT OFF,WORD,BIN")?;
        Ok(scope)
    }

    pub fn idn(&mut self) -> Result<String, DriverError> {
        self.transport.query("*IDN?")
    }

    fn vbs_query(&mut self, expr: &str) -> Result<String, DriverError> {
        self.transport.query(&format!("VBS? 'Return={expr}'"))
    }

    fn vbs(&mut self, stmt: &str) -> Result<(), DriverError> {
        self.transport.write_line(&format!("VBS '{stmt}'"))
    }

    /// VBS float query with the same drain-and-retry rule as binary
    /// transfers; a garbled reply usually means a stale queue.
    fn vbs_query_f64(&mut self, what: &'static str, expr: &str) -> Result<f64, DriverError> {
        let text = self.vbs_query(expr)?;
        match parse_f64(what, &text) {
            Ok(v) => Ok(v),
            Err(_) => {
                self.transport.drain();
                let text = self.vbs_query(expr)?;
                parse_f64(what, &text)
            }
        }
    }

    pub fn trigger_mode(&mut self) -> Result<TriggerMode, DriverError> {
        self.transport.query("TRMD?")?.parse()
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), DriverError> {
        self.transport.write_line(&format!("TRMD {mode}"))
    }

    pub fn time_scale(&mut self) -> Result<f64, DriverError> {
        self.vbs_query_f64("time scale", "app.Acquisition.Horizontal.HorScale")
    }

    pub fn set_time_scale(&mut self, seconds_per_div: f64) -> Result<(), DriverError> {
        self.vbs(&format!(
            "app.Acquisition.Horizontal.HorScale={seconds_per_div}"
        ))
    }

    pub fn time_offset(&mut self) -> Result<f64, DriverError> {
        self.vbs_query_f64("time offset", "app.Acquisition.Horizontal.HorOffset")
    }

    pub fn set_time_offset(&mut self, seconds: f64) -> Result<(), DriverError> {
        self.vbs(&format!("app.Acquisition.Horizontal.HorOffset={seconds}"))
    }

    pub fn memory_size(&mut self) -> Result<f64, DriverError> {
        let text = self.transport.query("MSIZ?")?;
        parse_f64("memory size", &text)
    }

    pub fn set_memory_size(&mut self, samples: usize) -> Result<(), DriverError> {
        self.transport.write_line(&format!("MSIZ {samples}"))
    }

    pub fn force_trigger(&mut self) -> Result<(), DriverError> {
        self.transport.write_line("ARM")
    }

    pub fn clear_sweeps(&mut self) -> Result<(), DriverError> {
        self.transport.write_line("CLSW")
    }

    /// Block until the current acquisition finishes.
    pub fn wait_acq(&mut self) -> Result<(), DriverError> {
        self.transport.write_line("WAIT")
    }

    pub fn opc_wait(&mut self) -> Result<(), DriverError> {
        self.transport.write_line("*WAI")
    }

    pub fn volts_div(&mut self, channel: usize) -> Result<f64, DriverError> {
        check_channel(channel)?;
        let text = self.transport.query(&format!("C{channel}: Volt_DIV?"))?;
        parse_f64("volts per division", &text)
    }

    pub fn set_volts_div(&mut self, channel: usize, volts: f64) -> Result<(), DriverError> {
        check_channel(channel)?;
        self.transport
            .write_line(&format!("C{channel}: Volt_DIV {volts}"))
    }

    pub fn average(&mut self, channel: usize) -> Result<usize, DriverError> {
        check_channel(channel)?;
        let text = self.vbs_query(&format!("app.Acquisition.C{channel}.AverageSweeps"))?;
        text.trim().parse().map_err(|_| DriverError::Parse {
            what: "average sweeps",
            text,
        })
    }

    pub fn set_average(&mut self, channel: usize, sweeps: usize) -> Result<(), DriverError> {
        check_channel(channel)?;
        self.vbs(&format!("app.Acquisition.C{channel}.AverageSweeps={sweeps}"))
    }

    /// Build the time axis for the next trace and mark the scope ready.
    /// The instrument reports two points beyond the memory size setting.
    pub fn prepare_trace(&mut self, channel: usize) -> Result<TraceSetpoints, DriverError> {
        check_channel(channel)?;
        let xstart = self.vbs_query_f64(
            "horizontal offset",
            &format!("app.Acquisition.Channels(\"C{channel}\").Out.Result.HorizontalOffset"),
        )?;
        let xinc = self.vbs_query_f64(
            "horizontal step",
            &format!("app.Acquisition.Channels(\"C{channel}\").Out.Result.HorizontalPerStep"),
        )?;
        let points = self.memory_size()? as usize + 2;
        let time = Array1::linspace(xstart, points as f64 * xinc + xstart, points);
        self.trace_ready = true;
        Ok(TraceSetpoints { time, points })
    }

    fn read_waveform(&mut self, channel: usize) -> Result<Vec<i16>, DriverError> {
        let cmd = format!("C{channel}:WAVEFORM? DAT1");
        match self.transport.query_binary(&cmd) {
            Ok(words) => Ok(words),
            Err(DriverError::BadBlock(_)) => {
                // Stale replies corrupt the block header; flush and retry
                // once before giving up.
                self.transport.drain();
                self.transport.query_binary(&cmd)
            }
            Err(e) => Err(e),
        }
    }

    /// Acquire `averages` single sweeps and return the scaled waveform.
    pub fn trace(&mut self, channel: usize, averages: usize) -> Result<Array1<f64>, DriverError> {
        check_channel(channel)?;
        if !self.trace_ready {
            return Err(DriverError::TraceNotReady(
                "run prepare_trace to prepare the scope for giving a trace",
            ));
        }
        self.clear_sweeps()?;
        for _ in 0..averages {
            self.transport.write_line("TRMD SINGLE")?;
            self.wait_acq()?;
        }
        let wave = self.read_waveform(channel)?;
        self.set_trigger_mode(TriggerMode::Auto)?;

        let yoff = self.vbs_query_f64(
            "vertical offset",
            &format!("app.Acquisition.Channels(\"C{channel}\").Out.Result.VerticalOffset"),
        )?;
        let ymult = self.vbs_query_f64(
            "vertical step",
            &format!("app.Acquisition.Channels(\"C{channel}\").Out.Result.VerticalPerStep"),
        )?;
        Ok(Array1::from_iter(
            wave.iter().map(|&code| code as f64 * ymult + yoff),
        ))
    }
}

/// Generator program for the sweep source driving a reflectometry ramp.
/// The output is ramped down before the real amplitude is applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AwgProgram {
    pub function: &'static str,
    pub phase_deg: f64,
    pub frequency: f64,
    pub offset: f64,
    pub amplitude: f64,
    pub pre_amplitude: f64,
}

/// Reflectometry measurement riding on two scope channels wired to an
/// I/Q mixer: I on channel 1, Q on channel 3.
pub struct Reflectometry {
    frequency: Option<f64>,
    start: Option<f64>,
    end: Option<f64>,
    average: usize,
    pub i_dc: f64,
    pub q_dc: f64,
    i_ch: usize,
    q_ch: usize,
    points: Option<usize>,
    sweep_v: Option<Array1<f64>>,
}

/// I/Q trace with derived magnitude and phase over the sweep voltage.
#[derive(Clone, Debug)]
pub struct RfTrace {
    pub i: Array1<f64>,
    pub q: Array1<f64>,
    pub magnitude: Array1<f64>,
    pub phase_deg: Array1<f64>,
    pub sweep_v: Array1<f64>,
}

impl Default for Reflectometry {
    fn default() -> Self {
        Self {
            frequency: None,
            start: None,
            end: None,
            average: 1,
            i_dc: 0.0,
            q_dc: 0.0,
            i_ch: 1,
            q_ch: 3,
            points: None,
            sweep_v: None,
        }
    }
}

impl Reflectometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep gate frequency in Hz.
    pub fn set_frequency(&mut self, hz: f64) -> Result<(), DriverError> {
        check_float_range("frequency", hz, 10e-3, 10e6)?;
        self.frequency = Some(hz);
        Ok(())
    }

    pub fn set_start(&mut self, volts: f64) -> Result<(), DriverError> {
        check_float_range("start", volts, -10.0, 10.0)?;
        self.start = Some(volts);
        Ok(())
    }

    pub fn set_end(&mut self, volts: f64) -> Result<(), DriverError> {
        check_float_range("end", volts, -10.0, 10.0)?;
        self.end = Some(volts);
        Ok(())
    }

    pub fn set_average(&mut self, sweeps: usize) -> Result<(), DriverError> {
        check_int_range("average", sweeps as i64, 1, 100_000)?;
        self.average = sweeps;
        Ok(())
    }

    /// Sweep axis and point count: only the rising half of the triangle
    /// ramp is kept, so the usable points span half a sweep period.
    pub fn sweep_points<T: Transport>(
        &self,
        scope: &mut Scope<T>,
    ) -> Result<(Array1<f64>, usize), DriverError> {
        let frequency = self.frequency.ok_or(DriverError::TraceNotReady(
            "please enter rf frequency and averages",
        ))?;
        let start = self.start.ok_or(DriverError::TraceNotReady(
            "please enter rf sweep start and end voltage",
        ))?;
        let end = self.end.ok_or(DriverError::TraceNotReady(
            "please enter rf sweep start and end voltage",
        ))?;
        let xinc = scope.vbs_query_f64(
            "horizontal step",
            &format!(
                "app.Acquisition.Channels(\"C{}\").Out.Result.HorizontalPerStep",
                self.i_ch
            ),
        )?;
        let cut_rf = (1.0 / (2.0 * frequency) / xinc) as usize;
        Ok((Array1::linspace(start, end, cut_rf), cut_rf))
    }

    pub fn prepare_trace<T: Transport>(
        &mut self,
        scope: &mut Scope<T>,
    ) -> Result<(), DriverError> {
        let (sweep_v, points) = self.sweep_points(scope)?;
        self.sweep_v = Some(sweep_v);
        self.points = Some(points);
        scope.trace_ready = true;
        Ok(())
    }

    pub fn trace<T: Transport>(&mut self, scope: &mut Scope<T>) -> Result<RfTrace, DriverError> {
        if !scope.trace_ready {
            return Err(DriverError::TraceNotReady(
                "run prepare_trace to prepare the scope for giving a trace",
            ));
        }
        let points = self.points.ok_or(DriverError::TraceNotReady(
            "run prepare_trace on the reflectometry channel first",
        ))?;
        let sweep_v = self.sweep_v.clone().ok_or(DriverError::TraceNotReady(
            "run prepare_trace on the reflectometry channel first",
        ))?;

        // Long averages need a proportionally longer transfer timeout.
        let timeout = Duration::from_secs_f64(5.0 + 5.0 * self.average as f64 / 50.0);
        scope.transport.set_timeout(timeout)?;
        scope.set_average(self.i_ch, self.average)?;
        scope.set_average(self.q_ch, self.average)?;
        scope.clear_sweeps()?;
        for _ in 0..self.average {
            scope.transport.write_line("TRMD SINGLE")?;
            scope.wait_acq()?;
        }

        let i_raw = scope.read_waveform(self.i_ch)?;
        scope.opc_wait()?;
        let q_raw = scope.read_waveform(self.q_ch)?;
        scope.set_trigger_mode(TriggerMode::Auto)?;

        let i_off = scope.vbs_query_f64(
            "vertical offset",
            &format!(
                "app.Acquisition.Channels(\"C{}\").Out.Result.VerticalOffset",
                self.i_ch
            ),
        )?;
        let i_mult = scope.vbs_query_f64(
            "vertical step",
            &format!(
                "app.Acquisition.Channels(\"C{}\").Out.Result.VerticalPerStep",
                self.i_ch
            ),
        )?;
        let q_off = scope.vbs_query_f64(
            "vertical offset",
            &format!(
                "app.Acquisition.Channels(\"C{}\").Out.Result.VerticalOffset",
                self.q_ch
            ),
        )?;
        let q_mult = scope.vbs_query_f64(
            "vertical step",
            &format!(
                "app.Acquisition.Channels(\"C{}\").Out.Result.VerticalPerStep",
                self.q_ch
            ),
        )?;

        let n = points.min(i_raw.len()).min(q_raw.len());
        let i = Array1::from_iter(i_raw[..n].iter().map(|&c| c as f64 * i_mult - i_off));
        let q = Array1::from_iter(q_raw[..n].iter().map(|&c| c as f64 * q_mult - q_off));

        let magnitude = Array1::from_shape_fn(n, |k| i[k].hypot(q[k]));
        let phase_deg =
            Array1::from_shape_fn(n, |k| (self.q_dc + q[k]).atan2(self.i_dc + i[k]).to_degrees());

        Ok(RfTrace {
            i,
            q,
            magnitude,
            phase_deg,
            sweep_v: sweep_v.slice(ndarray::s![..n]).to_owned(),
        })
    }

    /// Ramp program for the generator sweeping the gate. A 50 ohm output
    /// into a high-impedance device doubles the voltage at the device, so
    /// low-impedance loads halve amplitude and offset.
    pub fn awg_program(&self, load_ohms: f64) -> Result<AwgProgram, DriverError> {
        let frequency = self.frequency.ok_or(DriverError::TraceNotReady(
            "please enter rf frequency and averages",
        ))?;
        let start = self.start.ok_or(DriverError::TraceNotReady(
            "please enter rf sweep start and end voltage",
        ))?;
        let end = self.end.ok_or(DriverError::TraceNotReady(
            "please enter rf sweep start and end voltage",
        ))?;
        let mut amplitude = end - start;
        let mut offset = start + amplitude / 2.0;
        if load_ohms < 51.0 {
            offset /= 2.0;
            amplitude /= 2.0;
        }
        Ok(AwgProgram {
            function: "TRI",
            phase_deg: -90.0,
            frequency,
            offset,
            amplitude,
            pre_amplitude: 0.01,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn setup_mock() -> MockTransport {
        MockTransport::new()
            .expect_write("COMM_HEADER OFF")
            .expect_write("COMM_FORMAT OFF,WORD,BIN")
    }

    #[test]
    fn setup_switches_to_binary_word_format() {
        let scope = Scope::new(setup_mock()).unwrap();
        scope.transport.finish();
    }

    #[test]
    fn volts_div_uses_channel_dialect() {
        let mock = setup_mock().expect_query("C2: Volt_DIV?", "0.05");
        let mut scope = Scope::new(mock).unwrap();
        assert_eq!(scope.volts_div(2).unwrap(), 0.05);
        scope.transport.finish();
    }

    #[test]
    fn trace_without_prepare_is_rejected() {
        let mut scope = Scope::new(setup_mock()).unwrap();
        assert!(matches!(
            scope.trace(1, 1),
            Err(DriverError::TraceNotReady(_))
        ));
    }

    #[test]
    fn trace_scales_and_retries_after_bad_block() {
        let mock = setup_mock()
            // prepare
            .expect_query(
                "VBS? 'Return=app.Acquisition.Channels(\"C1\").Out.Result.HorizontalOffset'",
                "0.0",
            )
            .expect_query(
                "VBS? 'Return=app.Acquisition.Channels(\"C1\").Out.Result.HorizontalPerStep'",
                "1e-6",
            )
            .expect_query("MSIZ?", "100")
            // trace
            .expect_write("CLSW")
            .expect_write("TRMD SINGLE")
            .expect_write("WAIT")
            .expect_bad_binary("C1:WAVEFORM? DAT1")
            .expect_binary("C1:WAVEFORM? DAT1", vec![100, -100])
            .expect_write("TRMD AUTO")
            .expect_query(
                "VBS? 'Return=app.Acquisition.Channels(\"C1\").Out.Result.VerticalOffset'",
                "0.5",
            )
            .expect_query(
                "VBS? 'Return=app.Acquisition.Channels(\"C1\").Out.Result.VerticalPerStep'",
                "0.01",
            );
        let mut scope = Scope::new(mock).unwrap();
        let setpoints = scope.prepare_trace(1).unwrap();
        assert_eq!(setpoints.points, 102);

        let trace = scope.trace(1, 1).unwrap();
        assert_eq!(scope.transport.drains, 1);
        assert!((trace[0] - 1.5).abs() < 1e-12);
        assert!((trace[1] + 0.5).abs() < 1e-12);
        scope.transport.finish();
    }

    #[test]
    fn reflectometry_requires_sweep_settings() {
        let mut scope = Scope::new(setup_mock()).unwrap();
        let refl = Reflectometry::new();
        assert!(matches!(
            refl.sweep_points(&mut scope),
            Err(DriverError::TraceNotReady(_))
        ));
    }

    #[test]
    fn awg_program_halves_into_low_impedance_load() {
        let mut refl = Reflectometry::new();
        refl.set_frequency(83.0).unwrap();
        refl.set_start(-1.0).unwrap();
        refl.set_end(1.0).unwrap();

        let high_z = refl.awg_program(1e6).unwrap();
        assert_eq!(high_z.amplitude, 2.0);
        assert_eq!(high_z.offset, 0.0);
        assert_eq!(high_z.function, "TRI");

        let matched = refl.awg_program(50.0).unwrap();
        assert_eq!(matched.amplitude, 1.0);
    }
}
