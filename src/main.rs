use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use confique::Config;
use crossbeam_channel::unbounded;
use log::{info, LevelFilter};
use rfdaq::config::Conf;
use rfdaq::tui::{ProgressController, RunEvent, Status};
use rfdaq::writer::{next_run_file, RunWriter};
use rfdaq::{
    AcquisitionController, Ats9462, AverageController, BoardHandle, DemodController, DriverError,
    SweepController,
};
use std::path::{Path, PathBuf};
use std::thread;

#[derive(Parser)]
#[command(name = "rfdaq", about = "Digitizer acquisition for RF reflectometry setups")]
struct Cli {
    /// Run configuration file.
    #[arg(short, long, default_value = "rfdaq.toml")]
    config: PathBuf,
    /// Skip the status display and log progress instead.
    #[arg(long)]
    headless: bool,
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Software-demodulated magnitude and phase samples.
    Demod,
    /// Buffer- and record-averaged volt records per channel.
    Records,
    /// 2-D raster sweep frames.
    Sweep,
}

fn init_logging() -> Result<()> {
    use simplelog::{ColorChoice, CombinedLogger, TermLogger, TerminalMode, WriteLogger};

    let format = time::format_description::parse("[year][month][day]_[hour][minute][second]")?;
    let stamp = time::OffsetDateTime::now_utc().format(&format)?;
    let log_name = format!("rfdaq_{stamp}.log");
    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            simplelog::Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(
            LevelFilter::Debug,
            simplelog::Config::default(),
            std::fs::File::create(&log_name)
                .with_context(|| format!("creating log file {log_name}"))?,
        ),
    ])?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let conf = Conf::builder()
        .env()
        .file(&cli.config)
        .load()
        .context("loading configuration")?;

    #[cfg(not(feature = "ats-dll"))]
    let board = rfdaq::SimBoard::new(conf.sim.sim_settings());
    #[cfg(feature = "ats-dll")]
    let board = rfdaq::ats::dll::DllBoard::open(1, 1).map_err(DriverError::from)?;

    let mut dig = Ats9462::open(board)?;
    dig.configure(conf.board.board_settings())?;
    info!(
        "board {} (serial {}, {} bit)",
        dig.info().model,
        dig.info().serial,
        dig.info().bits_per_sample
    );

    match cli.mode {
        Mode::Demod => {
            let controller =
                DemodController::new(conf.demod.demod_settings(), dig.sample_rate())?;
            let mut acq = conf.acquisition.acq_settings();
            acq.samples_per_record = controller.required_samples_per_record();
            dig.set_acquisition(acq)?;
            let sample_rate = dig.sample_rate();
            run_acquisition(dig, controller, &conf, cli.headless, move |writer, out| {
                writer.write_demod(out, sample_rate)
            })
        }
        Mode::Records => {
            let acq = conf.acquisition.acq_settings();
            dig.set_acquisition(acq)?;
            let controller = AverageController::new(acq.samples_per_record);
            let sample_rate = dig.sample_rate();
            run_acquisition(dig, controller, &conf, cli.headless, move |writer, out| {
                if let Ok(point) = out.iq_point() {
                    info!(
                        "I/Q point: I = {:.6} V, Q = {:.6} V, mag = {:.6} V, phase = {:.2} deg",
                        point.i, point.q, point.magnitude, point.phase_deg
                    );
                }
                writer.write_records(out, sample_rate)
            })
        }
        Mode::Sweep => {
            let axes = conf.sweep.axes();
            let mut acq = conf.acquisition.acq_settings();
            acq.samples_per_record = axes.x_npts;
            acq.records_per_buffer = axes.y_npts;
            acq.channel_selection = rfdaq::ats9462::ChannelSelection::Ab;
            dig.set_acquisition(acq)?;
            let controller = SweepController::new(axes)?;
            run_acquisition(dig, controller, &conf, cli.headless, |writer, out| {
                writer.write_sweep(out)
            })
        }
    }
}

fn run_number(run_file: &Path) -> usize {
    run_file
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("run"))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Drive one acquisition on a worker thread, show progress, then write
/// the result to the next run file.
fn run_acquisition<B, C, W>(
    mut dig: Ats9462<B>,
    controller: C,
    conf: &Conf,
    headless: bool,
    write: W,
) -> Result<()>
where
    B: BoardHandle + Send + 'static,
    C: AcquisitionController + Send + 'static,
    C::Output: Send + 'static,
    W: Fn(&RunWriter, &C::Output) -> Result<()>,
{
    let run_file = next_run_file(&conf.run.output_dir, conf.run.campaign_num)?;
    let run_num = run_number(&run_file);
    let buffers_total = dig.acq().buffers_per_acquisition;

    let (tx, rx) = unbounded();
    let worker = thread::spawn(move || -> Result<C::Output, DriverError> {
        let mut controller = ProgressController::new(controller, tx.clone());
        let result = dig.acquire(&mut controller);
        let _ = tx.send(RunEvent::Finished);
        result
    });

    if headless {
        for event in rx.iter() {
            match event {
                RunEvent::Buffer { .. } => {}
                RunEvent::Finished => break,
            }
        }
    } else {
        let mut terminal = ratatui::init();
        let mut status = Status::new(conf.run.campaign_num, run_num, buffers_total);
        let exit = status.run(&mut terminal, rx);
        ratatui::restore();
        // A quit only stops the display; the capture cannot be cancelled
        // and is joined below either way.
        exit?;
    }

    let output = worker.join().expect("acquisition thread panic")?;

    let writer = RunWriter::create(&run_file)?;
    write(&writer, &output)?;
    info!("run written to {}", run_file.display());
    Ok(())
}
