//! Driver for the ATS9462 digitizer board.
//!
//! Symbolic settings translate to vendor byte codes through fixed tables;
//! `configure` pushes them through the [`BoardHandle`], and `acquire` runs
//! the buffered capture loop, handing each filled DMA buffer to an
//! [`AcquisitionController`] before reposting it for reuse.

use crate::ats::{BoardHandle, BoardInfo, CHANNEL_A, CHANNEL_B};
use crate::controller::AcquisitionController;
use crate::error::DriverError;
use crate::parameter::{check_int_range, check_multiple_of, ByteMap};
use log::debug;
use serde::Deserialize;

/// Samples per record must be a multiple of this. The manual says 32;
/// divisors below 128 gave incorrect data in testing, so callers rounding
/// up from a duration should prefer generous record lengths.
pub const SAMPLES_DIVISOR: usize = 32;
pub const MIN_SAMPLES_PER_RECORD: usize = 256;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSource {
    Internal,
    SlowExternal,
    FastExternal,
    External10MhzRef,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockEdge {
    Rising,
    Falling,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coupling {
    Ac,
    Dc,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOperation {
    J,
    K,
    JOrK,
    JAndK,
    JXorK,
    JAndNotK,
    NotJAndK,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    ChannelA,
    ChannelB,
    External,
    Disable,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSlope {
    Positive,
    Negative,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalTriggerRange {
    Etr5v,
    Etr1v,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxIoMode {
    OutTrigger,
    InTriggerEnable,
    InAuxiliary,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxIoParam {
    None,
    SlopePositive,
    SlopeNegative,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcqMode {
    /// No-pretrigger multi-record capture.
    Npt,
    /// Triggered streaming.
    Ts,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelection {
    A,
    B,
    Ab,
}

impl ChannelSelection {
    pub fn mask(self) -> u32 {
        match self {
            Self::A => CHANNEL_A,
            Self::B => CHANNEL_B,
            Self::Ab => CHANNEL_A | CHANNEL_B,
        }
    }

    pub fn count(self) -> usize {
        match self {
            Self::A | Self::B => 1,
            Self::Ab => 2,
        }
    }

    pub fn includes_a(self) -> bool {
        matches!(self, Self::A | Self::Ab)
    }

    pub fn includes_b(self) -> bool {
        matches!(self, Self::B | Self::Ab)
    }
}

pub const CLOCK_SOURCE: ByteMap<ClockSource> = ByteMap::new(
    "clock_source",
    &[
        (1, ClockSource::Internal),
        (4, ClockSource::SlowExternal),
        (2, ClockSource::FastExternal),
        (7, ClockSource::External10MhzRef),
    ],
);

/// Sample rate codes in S/s.
pub const SAMPLE_RATE: ByteMap<f64> = ByteMap::new(
    "sample_rate",
    &[
        (0x1, 1_000.0),
        (0x2, 2_000.0),
        (0x4, 5_000.0),
        (0x8, 10_000.0),
        (0xA, 20_000.0),
        (0xC, 50_000.0),
        (0xE, 100_000.0),
        (0x10, 200_000.0),
        (0x12, 500_000.0),
        (0x14, 1_000_000.0),
        (0x18, 2_000_000.0),
        (0x1A, 5_000_000.0),
        (0x1C, 10_000_000.0),
        (0x1E, 20_000_000.0),
        (0x22, 50_000_000.0),
        (0x24, 100_000_000.0),
        (0x25, 125_000_000.0),
        (0x26, 160_000_000.0),
        (0x27, 180_000_000.0),
    ],
);

pub const CLOCK_EDGE: ByteMap<ClockEdge> = ByteMap::new(
    "clock_edge",
    &[(0, ClockEdge::Rising), (1, ClockEdge::Falling)],
);

pub const COUPLING: ByteMap<Coupling> =
    ByteMap::new("coupling", &[(1, Coupling::Ac), (2, Coupling::Dc)]);

/// Input range codes in volts.
pub const CHANNEL_RANGE: ByteMap<f64> = ByteMap::new(
    "channel_range",
    &[
        (0x6, 0.2),
        (0x7, 0.4),
        (0x9, 0.8),
        (0xB, 2.0),
        (0xC, 4.0),
        (0xE, 8.0),
        (0x12, 16.0),
    ],
);

/// Input impedance codes in ohms.
pub const IMPEDANCE: ByteMap<f64> = ByteMap::new("impedance", &[(1, 1_000_000.0), (2, 50.0)]);

pub const TRIGGER_OPERATION: ByteMap<TriggerOperation> = ByteMap::new(
    "trigger_operation",
    &[
        (0, TriggerOperation::J),
        (1, TriggerOperation::K),
        (2, TriggerOperation::JOrK),
        (3, TriggerOperation::JAndK),
        (4, TriggerOperation::JXorK),
        (5, TriggerOperation::JAndNotK),
        (6, TriggerOperation::NotJAndK),
    ],
);

pub const TRIGGER_SOURCE: ByteMap<TriggerSource> = ByteMap::new(
    "trigger_source",
    &[
        (0, TriggerSource::ChannelA),
        (1, TriggerSource::ChannelB),
        (2, TriggerSource::External),
        (3, TriggerSource::Disable),
    ],
);

pub const TRIGGER_SLOPE: ByteMap<TriggerSlope> = ByteMap::new(
    "trigger_slope",
    &[(1, TriggerSlope::Positive), (2, TriggerSlope::Negative)],
);

pub const EXTERNAL_TRIGGER_RANGE: ByteMap<ExternalTriggerRange> = ByteMap::new(
    "external_trigger_range",
    &[
        (0, ExternalTriggerRange::Etr5v),
        (1, ExternalTriggerRange::Etr1v),
    ],
);

pub const AUX_IO_MODE: ByteMap<AuxIoMode> = ByteMap::new(
    "aux_io_mode",
    &[
        (0, AuxIoMode::OutTrigger),
        (1, AuxIoMode::InTriggerEnable),
        (13, AuxIoMode::InAuxiliary),
    ],
);

pub const AUX_IO_PARAM: ByteMap<AuxIoParam> = ByteMap::new(
    "aux_io_param",
    &[
        (0, AuxIoParam::None),
        (1, AuxIoParam::SlopePositive),
        (2, AuxIoParam::SlopeNegative),
    ],
);

pub const ACQ_MODE: ByteMap<AcqMode> =
    ByteMap::new("mode", &[(0x200, AcqMode::Npt), (0x400, AcqMode::Ts)]);

// ADMA flag bits.
const ADMA_EXTERNAL_STARTCAPTURE: u32 = 0x1;
const ADMA_ENABLE_RECORD_HEADERS: u32 = 0x8;
const ADMA_ALLOC_BUFFERS: u32 = 0x20;
const ADMA_FIFO_ONLY_STREAMING: u32 = 0x800;
const ADMA_INTERLEAVE_SAMPLES: u32 = 0x1000;
const ADMA_GET_PROCESSED_DATA: u32 = 0x2000;

/// Optional ADMA behaviors; everything defaults off except the external
/// start-capture gate.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct AdmaFlags {
    pub external_startcapture: bool,
    pub enable_record_headers: bool,
    pub alloc_buffers: bool,
    pub fifo_only_streaming: bool,
    pub interleave_samples: bool,
    pub get_processed_data: bool,
}

impl Default for AdmaFlags {
    fn default() -> Self {
        Self {
            external_startcapture: true,
            enable_record_headers: false,
            alloc_buffers: false,
            fifo_only_streaming: false,
            interleave_samples: false,
            get_processed_data: false,
        }
    }
}

impl AdmaFlags {
    pub fn bits(&self, mode: AcqMode) -> u32 {
        let mut bits = ACQ_MODE.code_for(mode).expect("mode always mapped");
        if self.external_startcapture {
            bits |= ADMA_EXTERNAL_STARTCAPTURE;
        }
        if self.enable_record_headers {
            bits |= ADMA_ENABLE_RECORD_HEADERS;
        }
        if self.alloc_buffers {
            bits |= ADMA_ALLOC_BUFFERS;
        }
        if self.fifo_only_streaming {
            bits |= ADMA_FIFO_ONLY_STREAMING;
        }
        if self.interleave_samples {
            bits |= ADMA_INTERLEAVE_SAMPLES;
        }
        if self.get_processed_data {
            bits |= ADMA_GET_PROCESSED_DATA;
        }
        bits
    }
}

/// Input settings of one channel.
#[derive(Clone, Copy, Debug)]
pub struct ChannelSettings {
    pub coupling: Coupling,
    pub range: f64,
    pub impedance: f64,
    pub bw_limit: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            coupling: Coupling::Dc,
            range: 2.0,
            impedance: 50.0,
            bw_limit: false,
        }
    }
}

/// One trigger engine (J or K).
#[derive(Clone, Copy, Debug)]
pub struct TriggerEngineSettings {
    pub source: TriggerSource,
    pub slope: TriggerSlope,
    /// 0..=255; 128 sits at 0 V.
    pub level: u32,
}

impl Default for TriggerEngineSettings {
    fn default() -> Self {
        Self {
            source: TriggerSource::External,
            slope: TriggerSlope::Positive,
            level: 140,
        }
    }
}

/// Full board configuration pushed by [`Ats9462::configure`].
#[derive(Clone, Debug)]
pub struct BoardSettings {
    pub clock_source: ClockSource,
    pub sample_rate: f64,
    pub clock_edge: ClockEdge,
    pub decimation: u32,
    pub channels: [ChannelSettings; 2],
    pub trigger_operation: TriggerOperation,
    pub engines: [TriggerEngineSettings; 2],
    pub external_trigger_coupling: Coupling,
    pub external_trigger_range: ExternalTriggerRange,
    /// Sample clock cycles.
    pub trigger_delay: u32,
    /// 10 us units; 0 waits forever. Leave at 0 once real trigger settings
    /// are dialed in, otherwise the board auto-triggers on expiry.
    pub timeout_ticks: u32,
    pub aux_io_mode: AuxIoMode,
    pub aux_io_param: AuxIoParam,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            clock_source: ClockSource::Internal,
            sample_rate: 500e3,
            clock_edge: ClockEdge::Rising,
            decimation: 1,
            channels: [ChannelSettings::default(); 2],
            trigger_operation: TriggerOperation::J,
            engines: [TriggerEngineSettings::default(); 2],
            external_trigger_coupling: Coupling::Dc,
            external_trigger_range: ExternalTriggerRange::Etr5v,
            trigger_delay: 0,
            timeout_ticks: 0,
            aux_io_mode: AuxIoMode::OutTrigger,
            aux_io_param: AuxIoParam::None,
        }
    }
}

/// Capture geometry and buffer bookkeeping for one acquisition.
#[derive(Clone, Copy, Debug)]
pub struct AcqSettings {
    pub mode: AcqMode,
    pub samples_per_record: usize,
    pub records_per_buffer: usize,
    pub buffers_per_acquisition: usize,
    pub channel_selection: ChannelSelection,
    pub transfer_offset: usize,
    pub allocated_buffers: usize,
    pub buffer_timeout_ms: u32,
    pub flags: AdmaFlags,
}

impl Default for AcqSettings {
    fn default() -> Self {
        Self {
            mode: AcqMode::Npt,
            samples_per_record: 1024,
            records_per_buffer: 10,
            buffers_per_acquisition: 10,
            channel_selection: ChannelSelection::Ab,
            transfer_offset: 0,
            allocated_buffers: 4,
            buffer_timeout_ms: 1000,
            flags: AdmaFlags::default(),
        }
    }
}

/// The board driver. Owns the vendor handle and the cached settings that
/// controllers check themselves against before capture.
#[derive(Debug)]
pub struct Ats9462<B: BoardHandle> {
    board: B,
    info: BoardInfo,
    settings: BoardSettings,
    acq: AcqSettings,
}

impl<B: BoardHandle> Ats9462<B> {
    /// Wrap a board handle, verifying the connected board really is an
    /// ATS9462 before any settings are trusted.
    pub fn open(board: B) -> Result<Self, DriverError> {
        let info = board.board_info()?;
        if info.model != "ATS9462" {
            return Err(DriverError::ModelMismatch {
                expected: "ATS9462",
                found: info.model,
            });
        }
        Ok(Self {
            board,
            info,
            settings: BoardSettings::default(),
            acq: AcqSettings::default(),
        })
    }

    pub fn info(&self) -> &BoardInfo {
        &self.info
    }

    pub fn settings(&self) -> &BoardSettings {
        &self.settings
    }

    pub fn acq(&self) -> &AcqSettings {
        &self.acq
    }

    /// Effective sample rate in S/s.
    pub fn sample_rate(&self) -> f64 {
        self.settings.sample_rate
    }

    /// Configured input range of a channel (0 = A, 1 = B), in volts.
    pub fn channel_range(&self, channel: usize) -> f64 {
        self.settings.channels[channel].range
    }

    /// Validate and push the full board configuration.
    pub fn configure(&mut self, settings: BoardSettings) -> Result<(), DriverError> {
        check_int_range("decimation", settings.decimation as i64, 0, 100_000)?;
        for engine in &settings.engines {
            check_int_range("trigger_level", engine.level as i64, 0, 255)?;
        }

        self.board.set_capture_clock(
            CLOCK_SOURCE.code_for(settings.clock_source)?,
            SAMPLE_RATE.code_for(settings.sample_rate)?,
            CLOCK_EDGE.code_for(settings.clock_edge)?,
            settings.decimation,
        )?;

        for (idx, channel) in settings.channels.iter().enumerate() {
            let channel_code = if idx == 0 { CHANNEL_A } else { CHANNEL_B };
            self.board.input_control(
                channel_code,
                COUPLING.code_for(channel.coupling)?,
                CHANNEL_RANGE.code_for(channel.range)?,
                IMPEDANCE.code_for(channel.impedance)?,
            )?;
            self.board
                .set_bw_limit(channel_code, channel.bw_limit as u32)?;
        }

        self.board.set_trigger_operation(
            TRIGGER_OPERATION.code_for(settings.trigger_operation)?,
            0, // TRIG_ENGINE_J
            TRIGGER_SOURCE.code_for(settings.engines[0].source)?,
            TRIGGER_SLOPE.code_for(settings.engines[0].slope)?,
            settings.engines[0].level,
            1, // TRIG_ENGINE_K
            TRIGGER_SOURCE.code_for(settings.engines[1].source)?,
            TRIGGER_SLOPE.code_for(settings.engines[1].slope)?,
            settings.engines[1].level,
        )?;
        self.board.set_external_trigger(
            COUPLING.code_for(settings.external_trigger_coupling)?,
            EXTERNAL_TRIGGER_RANGE.code_for(settings.external_trigger_range)?,
        )?;
        self.board.set_trigger_delay(settings.trigger_delay)?;
        self.board.set_trigger_timeout(settings.timeout_ticks)?;
        self.board.configure_aux_io(
            AUX_IO_MODE.code_for(settings.aux_io_mode)?,
            AUX_IO_PARAM.code_for(settings.aux_io_param)?,
        )?;

        debug!(
            "board configured: {:?} clock at {} S/s, trigger {:?}",
            settings.clock_source, settings.sample_rate, settings.trigger_operation
        );
        self.settings = settings;
        Ok(())
    }

    /// Validate and cache the capture geometry for the next acquisition.
    pub fn set_acquisition(&mut self, acq: AcqSettings) -> Result<(), DriverError> {
        check_multiple_of(
            "samples_per_record",
            acq.samples_per_record,
            SAMPLES_DIVISOR,
            MIN_SAMPLES_PER_RECORD,
        )?;
        if acq.samples_per_record > self.info.max_samples_per_record {
            return Err(DriverError::OutOfRange {
                param: "samples_per_record",
                value: acq.samples_per_record.to_string(),
                expected: format!("at most {}", self.info.max_samples_per_record),
            });
        }
        if acq.records_per_buffer == 0 || acq.buffers_per_acquisition == 0 {
            return Err(DriverError::OutOfRange {
                param: "records_per_buffer/buffers_per_acquisition",
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }
        if acq.allocated_buffers == 0 || acq.allocated_buffers > acq.buffers_per_acquisition {
            return Err(DriverError::OutOfRange {
                param: "allocated_buffers",
                value: acq.allocated_buffers.to_string(),
                expected: format!("1..={}", acq.buffers_per_acquisition),
            });
        }
        self.acq = acq;
        Ok(())
    }

    /// Run one buffered acquisition: allocate DMA buffers, start capture,
    /// feed every filled buffer to the controller and return its processed
    /// output. The board is disarmed on every exit path.
    pub fn acquire<C: AcquisitionController>(
        &mut self,
        controller: &mut C,
    ) -> Result<C::Output, DriverError> {
        controller.pre_start_capture(&self.settings, &self.acq, &self.info)?;

        let spr = self.acq.samples_per_record;
        let rpb = self.acq.records_per_buffer;
        let bpa = self.acq.buffers_per_acquisition;
        let channels = self.acq.channel_selection.count();
        let samples_per_buffer = spr * rpb * channels;
        let records_per_acquisition = rpb * bpa;

        self.board.before_async_read(
            self.acq.channel_selection.mask(),
            self.acq.transfer_offset as i64,
            spr as u32,
            rpb as u32,
            records_per_acquisition as u32,
            self.acq.flags.bits(self.acq.mode),
        )?;

        let mut buffers: Vec<Vec<u16>> = (0..self.acq.allocated_buffers)
            .map(|_| vec![0u16; samples_per_buffer])
            .collect();
        for buffer in &mut buffers {
            self.board.post_async_buffer(buffer)?;
        }

        self.board.start_capture()?;
        controller.pre_acquire();

        let mut capture_err = None;
        for i in 0..bpa {
            let idx = i % self.acq.allocated_buffers;
            if let Err(code) = self
                .board
                .wait_async_buffer_complete(&mut buffers[idx], self.acq.buffer_timeout_ms)
            {
                capture_err = Some(DriverError::Acquisition { buffer: i, code });
                break;
            }
            controller.handle_buffer(&buffers[idx]);
            // The vendor reuses buffers; repost unless this one is done.
            if i + self.acq.allocated_buffers < bpa {
                if let Err(code) = self.board.post_async_buffer(&mut buffers[idx]) {
                    capture_err = Some(DriverError::Ats(code));
                    break;
                }
            }
        }

        self.board.abort_async_read()?;
        if let Some(err) = capture_err {
            return Err(err);
        }
        controller.post_acquire()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ats::{AtsResult, AtsReturn};
    use crate::sim::{SimBoard, SimSettings};

    #[derive(Debug)]
    struct WrongBoard;

    impl BoardHandle for WrongBoard {
        fn board_info(&self) -> AtsResult<BoardInfo> {
            Ok(BoardInfo {
                model: "ATS9870".to_string(),
                serial: 0,
                bits_per_sample: 8,
                max_samples_per_record: 1 << 20,
            })
        }
        fn set_capture_clock(&mut self, _: u32, _: u32, _: u32, _: u32) -> AtsResult<()> {
            Ok(())
        }
        fn input_control(&mut self, _: u32, _: u32, _: u32, _: u32) -> AtsResult<()> {
            Ok(())
        }
        fn set_bw_limit(&mut self, _: u32, _: u32) -> AtsResult<()> {
            Ok(())
        }
        #[allow(clippy::too_many_arguments)]
        fn set_trigger_operation(
            &mut self,
            _: u32,
            _: u32,
            _: u32,
            _: u32,
            _: u32,
            _: u32,
            _: u32,
            _: u32,
            _: u32,
        ) -> AtsResult<()> {
            Ok(())
        }
        fn set_external_trigger(&mut self, _: u32, _: u32) -> AtsResult<()> {
            Ok(())
        }
        fn set_trigger_delay(&mut self, _: u32) -> AtsResult<()> {
            Ok(())
        }
        fn set_trigger_timeout(&mut self, _: u32) -> AtsResult<()> {
            Ok(())
        }
        fn configure_aux_io(&mut self, _: u32, _: u32) -> AtsResult<()> {
            Ok(())
        }
        fn before_async_read(
            &mut self,
            _: u32,
            _: i64,
            _: u32,
            _: u32,
            _: u32,
            _: u32,
        ) -> AtsResult<()> {
            Ok(())
        }
        fn post_async_buffer(&mut self, _: &mut [u16]) -> AtsResult<()> {
            Ok(())
        }
        fn start_capture(&mut self) -> AtsResult<()> {
            Ok(())
        }
        fn wait_async_buffer_complete(&mut self, _: &mut [u16], _: u32) -> AtsResult<()> {
            Err(AtsReturn::ApiWaitTimeout)
        }
        fn abort_async_read(&mut self) -> AtsResult<()> {
            Ok(())
        }
    }

    /// Counts buffers without any processing.
    struct CountingController {
        buffers: usize,
        samples: usize,
    }

    impl AcquisitionController for CountingController {
        type Output = usize;

        fn pre_start_capture(
            &mut self,
            _board: &BoardSettings,
            _acq: &AcqSettings,
            _info: &BoardInfo,
        ) -> Result<(), DriverError> {
            Ok(())
        }

        fn handle_buffer(&mut self, samples: &[u16]) {
            self.buffers += 1;
            self.samples += samples.len();
        }

        fn post_acquire(&mut self) -> Result<usize, DriverError> {
            Ok(self.buffers)
        }
    }

    #[test]
    fn open_rejects_wrong_board_kind() {
        let err = Ats9462::open(WrongBoard).unwrap_err();
        assert!(err.to_string().contains("ATS9870"));
    }

    #[test]
    fn byte_tables_match_vendor_codes() {
        assert_eq!(SAMPLE_RATE.code_for(500e3).unwrap(), 0x12);
        assert_eq!(CHANNEL_RANGE.code_for(2.0).unwrap(), 0xB);
        assert_eq!(IMPEDANCE.code_for(50.0).unwrap(), 2);
        assert_eq!(
            TRIGGER_OPERATION.code_for(TriggerOperation::NotJAndK).unwrap(),
            6
        );
        assert_eq!(AUX_IO_MODE.code_for(AuxIoMode::InAuxiliary).unwrap(), 13);
        assert_eq!(ACQ_MODE.code_for(AcqMode::Ts).unwrap(), 0x400);
    }

    #[test]
    fn adma_flags_compose() {
        let flags = AdmaFlags {
            fifo_only_streaming: true,
            ..Default::default()
        };
        assert_eq!(flags.bits(AcqMode::Npt), 0x200 | 0x1 | 0x800);
    }

    #[test]
    fn unsupported_sample_rate_is_an_error() {
        let board = SimBoard::new(SimSettings::default());
        let mut dig = Ats9462::open(board).unwrap();
        let settings = BoardSettings {
            sample_rate: 123_456.0,
            ..Default::default()
        };
        assert!(dig.configure(settings).is_err());
    }

    #[test]
    fn acquisition_geometry_is_validated() {
        let board = SimBoard::new(SimSettings::default());
        let mut dig = Ats9462::open(board).unwrap();
        let bad = AcqSettings {
            samples_per_record: 100,
            ..Default::default()
        };
        assert!(dig.set_acquisition(bad).is_err());
        let bad = AcqSettings {
            allocated_buffers: 20,
            buffers_per_acquisition: 4,
            ..Default::default()
        };
        assert!(dig.set_acquisition(bad).is_err());
    }

    #[test]
    fn acquire_feeds_every_buffer_once() {
        let board = SimBoard::new(SimSettings::default());
        let mut dig = Ats9462::open(board).unwrap();
        dig.configure(BoardSettings::default()).unwrap();
        dig.set_acquisition(AcqSettings {
            samples_per_record: 256,
            records_per_buffer: 2,
            buffers_per_acquisition: 6,
            allocated_buffers: 2,
            channel_selection: ChannelSelection::Ab,
            ..Default::default()
        })
        .unwrap();

        let mut controller = CountingController {
            buffers: 0,
            samples: 0,
        };
        let buffers = dig.acquire(&mut controller).unwrap();
        assert_eq!(buffers, 6);
        assert_eq!(controller.samples, 6 * 256 * 2 * 2);
    }
}
