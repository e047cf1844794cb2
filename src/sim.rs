//! Software stand-in for the vendor board.
//!
//! Synthesizes triggered two-channel records so the acquisition pipeline,
//! controllers and binary can run without a digitizer installed. The
//! simulation honors the posted-buffer FIFO discipline of the vendor API:
//! buffers are filled oldest-first and must be reposted after processing.

use crate::ats::{AtsResult, AtsReturn, BoardHandle, BoardInfo, CHANNEL_A, CHANNEL_B};
use crate::ats9462::{CHANNEL_RANGE, SAMPLE_RATE};
use rand::Rng;
use std::collections::VecDeque;
use std::f64::consts::TAU;

/// Signal synthesized on one input channel: a tone plus a DC offset.
#[derive(Clone, Copy, Debug)]
pub struct SimChannel {
    pub frequency: f64,
    pub amplitude: f64,
    pub offset: f64,
    pub phase_deg: f64,
}

impl Default for SimChannel {
    fn default() -> Self {
        Self {
            frequency: 1e6,
            amplitude: 0.5,
            offset: 0.0,
            phase_deg: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SimSettings {
    pub channel_a: SimChannel,
    pub channel_b: SimChannel,
    /// Peak uniform noise in volts added to every sample.
    pub noise: f64,
}

#[derive(Clone, Copy)]
struct Geometry {
    channel_mask: u32,
    samples_per_record: usize,
    records_per_buffer: usize,
    records_per_acquisition: usize,
}

impl Geometry {
    fn channels(&self) -> usize {
        (self.channel_mask & (CHANNEL_A | CHANNEL_B)).count_ones() as usize
    }

    fn buffer_len(&self) -> usize {
        self.samples_per_record * self.records_per_buffer * self.channels()
    }
}

/// Simulated ATS9462: 16-bit codes, mid-scale zero, full-scale set by the
/// configured input range of each channel.
pub struct SimBoard {
    settings: SimSettings,
    sample_rate: f64,
    ranges: [f64; 2],
    geometry: Option<Geometry>,
    capturing: bool,
    // FIFO of posted buffers, tracked by (address, length) so reuse
    // discipline can be checked without holding the borrow.
    posted: VecDeque<(usize, usize)>,
    buffers_delivered: usize,
}

impl SimBoard {
    pub fn new(settings: SimSettings) -> Self {
        Self {
            settings,
            sample_rate: 500e3,
            ranges: [2.0, 2.0],
            geometry: None,
            capturing: false,
            posted: VecDeque::new(),
            buffers_delivered: 0,
        }
    }

    fn fill(&mut self, buffer: &mut [u16]) {
        let geo = self.geometry.expect("fill without geometry");
        let spr = geo.samples_per_record;
        let rpb = geo.records_per_buffer;
        let mut rng = rand::rng();

        let mut active: Vec<(SimChannel, f64)> = Vec::new();
        if geo.channel_mask & CHANNEL_A != 0 {
            active.push((self.settings.channel_a, self.ranges[0]));
        }
        if geo.channel_mask & CHANNEL_B != 0 {
            active.push((self.settings.channel_b, self.ranges[1]));
        }

        // Channel-blocked layout: all records of the first active channel,
        // then all records of the next.
        for (ch_idx, (ch, range)) in active.iter().enumerate() {
            let phase = ch.phase_deg.to_radians();
            for record in 0..rpb {
                let base = ch_idx * rpb * spr + record * spr;
                for n in 0..spr {
                    let t = n as f64 / self.sample_rate;
                    let mut v = ch.amplitude * (TAU * ch.frequency * t + phase).sin() + ch.offset;
                    if self.settings.noise > 0.0 {
                        v += rng.random_range(-self.settings.noise..=self.settings.noise);
                    }
                    let code = (v / range) * 32767.5 + 32767.5;
                    buffer[base + n] = code.round().clamp(0.0, 65535.0) as u16;
                }
            }
        }
    }
}

impl BoardHandle for SimBoard {
    fn board_info(&self) -> AtsResult<BoardInfo> {
        Ok(BoardInfo {
            model: "ATS9462".to_string(),
            serial: 970_031,
            bits_per_sample: 16,
            max_samples_per_record: 256 << 20,
        })
    }

    fn set_capture_clock(
        &mut self,
        _source: u32,
        rate: u32,
        _edge: u32,
        _decimation: u32,
    ) -> AtsResult<()> {
        match SAMPLE_RATE.value_for(rate) {
            Some(rate_hz) => {
                self.sample_rate = rate_hz;
                Ok(())
            }
            None => Err(AtsReturn::ApiFailed),
        }
    }

    fn input_control(
        &mut self,
        channel: u32,
        _coupling: u32,
        range: u32,
        _impedance: u32,
    ) -> AtsResult<()> {
        let idx = match channel {
            CHANNEL_A => 0,
            CHANNEL_B => 1,
            _ => return Err(AtsReturn::ApiFailed),
        };
        match CHANNEL_RANGE.value_for(range) {
            Some(volts) => {
                self.ranges[idx] = volts;
                Ok(())
            }
            None => Err(AtsReturn::ApiFailed),
        }
    }

    fn set_bw_limit(&mut self, _channel: u32, _enable: u32) -> AtsResult<()> {
        Ok(())
    }

    fn set_trigger_operation(
        &mut self,
        _operation: u32,
        _engine1: u32,
        _source1: u32,
        _slope1: u32,
        _level1: u32,
        _engine2: u32,
        _source2: u32,
        _slope2: u32,
        _level2: u32,
    ) -> AtsResult<()> {
        Ok(())
    }

    fn set_external_trigger(&mut self, _coupling: u32, _range: u32) -> AtsResult<()> {
        Ok(())
    }

    fn set_trigger_delay(&mut self, _cycles: u32) -> AtsResult<()> {
        Ok(())
    }

    fn set_trigger_timeout(&mut self, _ticks: u32) -> AtsResult<()> {
        Ok(())
    }

    fn configure_aux_io(&mut self, _mode: u32, _parameter: u32) -> AtsResult<()> {
        Ok(())
    }

    fn before_async_read(
        &mut self,
        channel_mask: u32,
        _transfer_offset: i64,
        samples_per_record: u32,
        records_per_buffer: u32,
        records_per_acquisition: u32,
        _flags: u32,
    ) -> AtsResult<()> {
        let geometry = Geometry {
            channel_mask,
            samples_per_record: samples_per_record as usize,
            records_per_buffer: records_per_buffer as usize,
            records_per_acquisition: records_per_acquisition as usize,
        };
        if geometry.channels() == 0 || geometry.records_per_buffer == 0 {
            return Err(AtsReturn::ApiFailed);
        }
        self.geometry = Some(geometry);
        self.posted.clear();
        self.buffers_delivered = 0;
        self.capturing = false;
        Ok(())
    }

    fn post_async_buffer(&mut self, buffer: &mut [u16]) -> AtsResult<()> {
        let geo = self.geometry.ok_or(AtsReturn::ApiNotInitialized)?;
        if buffer.len() != geo.buffer_len() {
            return Err(AtsReturn::ApiInvalidBuffer);
        }
        self.posted.push_back((buffer.as_ptr() as usize, buffer.len()));
        Ok(())
    }

    fn start_capture(&mut self) -> AtsResult<()> {
        if self.geometry.is_none() {
            return Err(AtsReturn::ApiNotInitialized);
        }
        self.capturing = true;
        Ok(())
    }

    fn wait_async_buffer_complete(&mut self, buffer: &mut [u16], _timeout_ms: u32) -> AtsResult<()> {
        if !self.capturing {
            return Err(AtsReturn::ApiNotInitialized);
        }
        let geo = self.geometry.ok_or(AtsReturn::ApiNotInitialized)?;
        let total_buffers = geo.records_per_acquisition / geo.records_per_buffer;
        if self.buffers_delivered >= total_buffers {
            return Err(AtsReturn::ApiWaitTimeout);
        }
        let (addr, _len) = *self.posted.front().ok_or(AtsReturn::ApiBufferNotReady)?;
        if addr != buffer.as_ptr() as usize {
            // Caller must wait on the oldest posted buffer, like the DLL.
            return Err(AtsReturn::ApiInvalidBuffer);
        }
        self.posted.pop_front();
        self.fill(buffer);
        self.buffers_delivered += 1;
        Ok(())
    }

    fn abort_async_read(&mut self) -> AtsResult<()> {
        self.capturing = false;
        self.posted.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dc_board(offset: f64) -> SimBoard {
        SimBoard::new(SimSettings {
            channel_a: SimChannel {
                frequency: 0.0,
                amplitude: 0.0,
                offset,
                phase_deg: 0.0,
            },
            ..Default::default()
        })
    }

    #[test]
    fn capture_requires_arm() {
        let mut board = SimBoard::new(SimSettings::default());
        assert_eq!(board.start_capture(), Err(AtsReturn::ApiNotInitialized));
    }

    #[test]
    fn buffers_fill_in_posted_order() {
        let mut board = dc_board(1.0);
        board.before_async_read(CHANNEL_A, 0, 256, 1, 2, 0).unwrap();
        let mut first = vec![0u16; 256];
        let mut second = vec![0u16; 256];
        board.post_async_buffer(&mut first).unwrap();
        board.post_async_buffer(&mut second).unwrap();
        board.start_capture().unwrap();

        // Waiting on the second buffer first violates FIFO order.
        assert_eq!(
            board.wait_async_buffer_complete(&mut second, 100),
            Err(AtsReturn::ApiInvalidBuffer)
        );
        board.wait_async_buffer_complete(&mut first, 100).unwrap();

        // 1 V DC on a 2 V range sits half way up the positive half-scale.
        let expected = (0.5 * 32767.5 + 32767.5_f64).round() as u16;
        assert!(first.iter().all(|&s| s == expected));
    }

    #[test]
    fn wrong_buffer_size_rejected() {
        let mut board = dc_board(0.0);
        board.before_async_read(CHANNEL_A, 0, 256, 2, 2, 0).unwrap();
        let mut short = vec![0u16; 256];
        assert_eq!(
            board.post_async_buffer(&mut short),
            Err(AtsReturn::ApiInvalidBuffer)
        );
    }
}
