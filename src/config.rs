//! Run configuration, layered from a TOML file, environment and defaults.
//!
//! The config mirrors the driver settings one to one so a run file can be
//! translated straight into [`BoardSettings`]/[`AcqSettings`] and the
//! controller settings without further bookkeeping.

use crate::ats9462::{
    AcqMode, AcqSettings, AdmaFlags, AuxIoMode, AuxIoParam, BoardSettings, ChannelSelection,
    ChannelSettings, ClockEdge, ClockSource, Coupling, ExternalTriggerRange,
    TriggerEngineSettings, TriggerOperation, TriggerSlope, TriggerSource,
};
use crate::demod::{DemodSettings, FilterKind, FilterSettings};
use crate::sim::{SimChannel, SimSettings};
use crate::sweep::SweepAxes;
use confique::Config;

#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub run: RunConf,
    #[config(nested)]
    pub board: BoardConf,
    #[config(nested)]
    pub acquisition: AcqConf,
    #[config(nested)]
    pub demod: DemodConf,
    #[config(nested)]
    pub sweep: SweepConf,
    #[config(nested)]
    pub sim: SimConf,
    #[config(nested)]
    pub instruments: InstrumentConf,
}

#[derive(Config, Debug, Clone)]
pub struct RunConf {
    #[config(default = "./data")]
    pub output_dir: String,
    #[config(default = 0)]
    pub campaign_num: usize,
}

#[derive(Config, Debug, Clone)]
pub struct BoardConf {
    #[config(default = "internal")]
    pub clock_source: ClockSource,
    #[config(default = 500000.0)]
    pub sample_rate: f64,
    #[config(default = "rising")]
    pub clock_edge: ClockEdge,
    #[config(default = 1)]
    pub decimation: u32,
    #[config(nested)]
    pub channel_a: ChannelConf,
    #[config(nested)]
    pub channel_b: ChannelConf,
    #[config(nested)]
    pub trigger: TriggerConf,
    #[config(default = "out_trigger")]
    pub aux_io_mode: AuxIoMode,
    #[config(default = "none")]
    pub aux_io_param: AuxIoParam,
}

#[derive(Config, Debug, Clone)]
pub struct ChannelConf {
    #[config(default = "dc")]
    pub coupling: Coupling,
    #[config(default = 2.0)]
    pub range: f64,
    #[config(default = 50.0)]
    pub impedance: f64,
    #[config(default = false)]
    pub bw_limit: bool,
}

#[derive(Config, Debug, Clone)]
pub struct TriggerConf {
    #[config(default = "j")]
    pub operation: TriggerOperation,
    #[config(default = "external")]
    pub source1: TriggerSource,
    #[config(default = "positive")]
    pub slope1: TriggerSlope,
    /// 128 sits at 0 V.
    #[config(default = 140)]
    pub level1: u32,
    #[config(default = "disable")]
    pub source2: TriggerSource,
    #[config(default = "positive")]
    pub slope2: TriggerSlope,
    #[config(default = 128)]
    pub level2: u32,
    #[config(default = "dc")]
    pub external_coupling: Coupling,
    #[config(default = "etr5v")]
    pub external_range: ExternalTriggerRange,
    /// Sample clock cycles.
    #[config(default = 0)]
    pub delay: u32,
    /// 10 us units; 0 waits forever.
    #[config(default = 0)]
    pub timeout_ticks: u32,
}

#[derive(Config, Debug, Clone)]
pub struct AcqConf {
    #[config(default = "npt")]
    pub mode: AcqMode,
    #[config(default = 1024)]
    pub samples_per_record: usize,
    #[config(default = 10)]
    pub records_per_buffer: usize,
    #[config(default = 10)]
    pub buffers_per_acquisition: usize,
    #[config(default = "ab")]
    pub channel_selection: ChannelSelection,
    #[config(default = 0)]
    pub transfer_offset: usize,
    #[config(default = 4)]
    pub allocated_buffers: usize,
    #[config(default = 1000)]
    pub buffer_timeout_ms: u32,
}

#[derive(Config, Debug, Clone)]
pub struct DemodConf {
    #[config(default = [1000000.0])]
    pub freqs: Vec<f64>,
    #[config(default = 0.0001)]
    pub int_time: f64,
    pub int_delay: Option<f64>,
    #[config(default = 101)]
    pub numtaps: usize,
    #[config(default = "window")]
    pub filter: FilterKind,
    #[config(default = false)]
    pub process_channel_b: bool,
}

#[derive(Config, Debug, Clone)]
pub struct SweepConf {
    #[config(default = 0.0)]
    pub x_start: f64,
    #[config(default = 1.0)]
    pub x_end: f64,
    #[config(default = 256)]
    pub x_npts: usize,
    #[config(default = 0.0)]
    pub y_start: f64,
    #[config(default = 1.0)]
    pub y_end: f64,
    #[config(default = 10)]
    pub y_npts: usize,
}

#[derive(Config, Debug, Clone)]
pub struct SimConf {
    #[config(nested)]
    pub channel_a: SimChannelConf,
    #[config(nested)]
    pub channel_b: SimChannelConf,
    #[config(default = 0.0)]
    pub noise: f64,
}

#[derive(Config, Debug, Clone)]
pub struct SimChannelConf {
    #[config(default = 1000000.0)]
    pub frequency: f64,
    #[config(default = 0.5)]
    pub amplitude: f64,
    #[config(default = 0.0)]
    pub offset: f64,
    #[config(default = 0.0)]
    pub phase_deg: f64,
}

#[derive(Config, Debug, Clone)]
pub struct InstrumentConf {
    /// LXI address of the oscilloscope, host:port.
    pub scope_addr: Option<String>,
    /// Serial port of the signal generator.
    pub siggen_port: Option<String>,
    #[config(default = 9600)]
    pub siggen_baud: u32,
}

impl BoardConf {
    pub fn board_settings(&self) -> BoardSettings {
        BoardSettings {
            clock_source: self.clock_source,
            sample_rate: self.sample_rate,
            clock_edge: self.clock_edge,
            decimation: self.decimation,
            channels: [self.channel_a.settings(), self.channel_b.settings()],
            trigger_operation: self.trigger.operation,
            engines: [
                TriggerEngineSettings {
                    source: self.trigger.source1,
                    slope: self.trigger.slope1,
                    level: self.trigger.level1,
                },
                TriggerEngineSettings {
                    source: self.trigger.source2,
                    slope: self.trigger.slope2,
                    level: self.trigger.level2,
                },
            ],
            external_trigger_coupling: self.trigger.external_coupling,
            external_trigger_range: self.trigger.external_range,
            trigger_delay: self.trigger.delay,
            timeout_ticks: self.trigger.timeout_ticks,
            aux_io_mode: self.aux_io_mode,
            aux_io_param: self.aux_io_param,
        }
    }
}

impl ChannelConf {
    fn settings(&self) -> ChannelSettings {
        ChannelSettings {
            coupling: self.coupling,
            range: self.range,
            impedance: self.impedance,
            bw_limit: self.bw_limit,
        }
    }
}

impl AcqConf {
    pub fn acq_settings(&self) -> AcqSettings {
        AcqSettings {
            mode: self.mode,
            samples_per_record: self.samples_per_record,
            records_per_buffer: self.records_per_buffer,
            buffers_per_acquisition: self.buffers_per_acquisition,
            channel_selection: self.channel_selection,
            transfer_offset: self.transfer_offset,
            allocated_buffers: self.allocated_buffers,
            buffer_timeout_ms: self.buffer_timeout_ms,
            flags: AdmaFlags::default(),
        }
    }
}

impl DemodConf {
    pub fn demod_settings(&self) -> DemodSettings {
        DemodSettings {
            freqs: self.freqs.clone(),
            int_time: self.int_time,
            int_delay: self.int_delay,
            filter: FilterSettings {
                kind: self.filter,
                numtaps: self.numtaps,
            },
            process_channel_b: self.process_channel_b,
        }
    }
}

impl SweepConf {
    pub fn axes(&self) -> SweepAxes {
        SweepAxes {
            x_start: self.x_start,
            x_end: self.x_end,
            x_npts: self.x_npts,
            y_start: self.y_start,
            y_end: self.y_end,
            y_npts: self.y_npts,
        }
    }
}

impl SimConf {
    pub fn sim_settings(&self) -> SimSettings {
        SimSettings {
            channel_a: self.channel_a.channel(),
            channel_b: self.channel_b.channel(),
            noise: self.noise,
        }
    }
}

impl SimChannelConf {
    fn channel(&self) -> SimChannel {
        SimChannel {
            frequency: self.frequency,
            amplitude: self.amplitude,
            offset: self.offset,
            phase_deg: self.phase_deg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(toml_text: &str) -> Conf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "rfdaq_conf_test_{}_{}.toml",
            std::process::id(),
            toml_text.len()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(toml_text.as_bytes()).unwrap();
        let conf = Conf::builder().file(&path).load().unwrap();
        std::fs::remove_file(&path).ok();
        conf
    }

    #[test]
    fn defaults_cover_everything() {
        let conf = load("");
        assert_eq!(conf.board.sample_rate, 500e3);
        assert_eq!(conf.acquisition.samples_per_record, 1024);
        assert_eq!(conf.demod.numtaps, 101);
        assert_eq!(conf.instruments.siggen_baud, 9600);
        assert!(conf.instruments.scope_addr.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let conf = load(
            r#"
            [board]
            sample_rate = 10000000.0
            clock_source = "external10_mhz_ref"

            [board.channel_a]
            range = 0.4
            coupling = "ac"

            [board.trigger]
            source1 = "channel_a"
            level1 = 150

            [acquisition]
            channel_selection = "a"
            samples_per_record = 4096

            [demod]
            freqs = [1000000.0, 2000000.0]
            filter = "window"
            "#,
        );
        assert_eq!(conf.board.sample_rate, 1e7);
        assert_eq!(conf.board.clock_source, ClockSource::External10MhzRef);
        let settings = conf.board.board_settings();
        assert_eq!(settings.channels[0].range, 0.4);
        assert_eq!(settings.channels[0].coupling, Coupling::Ac);
        assert_eq!(settings.engines[0].source, TriggerSource::ChannelA);
        assert_eq!(settings.engines[0].level, 150);
        assert_eq!(
            conf.acquisition.acq_settings().channel_selection,
            ChannelSelection::A
        );
        assert_eq!(conf.demod.demod_settings().freqs.len(), 2);
    }
}
