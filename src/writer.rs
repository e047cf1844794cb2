//! HDF5 output for acquisition results.
//!
//! One file per run under `<output_dir>/camp<N>/run<M>.h5`; the next run
//! number is discovered by scanning the campaign directory. Each result
//! kind goes into its own group with the axes and geometry it needs to be
//! replotted later.

use crate::demod::DemodOutput;
use crate::sweep::SweepFrame;
use crate::vna::VoltRecords;
use anyhow::{anyhow, Context, Result};
use hdf5::File;
use std::path::{Path, PathBuf};

pub struct RunWriter {
    file: File,
}

impl RunWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("creating run file {}", path.display()))?;
        Ok(Self { file })
    }

    /// Demodulated magnitude/phase, one row per demodulation frequency.
    pub fn write_demod(&self, out: &DemodOutput, sample_rate: f64) -> Result<()> {
        let group = self.file.create_group("demod")?;
        group
            .new_dataset_builder()
            .with_data(&out.magnitude)
            .create("magnitude")?;
        group
            .new_dataset_builder()
            .with_data(&out.phase_deg)
            .create("phase_deg")?;
        group
            .new_dataset_builder()
            .with_data(out.frequencies.as_slice())
            .create("frequencies")?;
        group
            .new_attr::<f64>()
            .create("sample_rate")?
            .write_scalar(&sample_rate)?;
        Ok(())
    }

    /// Buffer- and record-averaged volt waveforms per channel.
    pub fn write_records(&self, records: &VoltRecords, sample_rate: f64) -> Result<()> {
        let group = self.file.create_group("records")?;
        if let Some(a) = &records.channel_a {
            group.new_dataset_builder().with_data(a).create("channel_a")?;
        }
        if let Some(b) = &records.channel_b {
            group.new_dataset_builder().with_data(b).create("channel_b")?;
        }
        group
            .new_attr::<f64>()
            .create("sample_rate")?
            .write_scalar(&sample_rate)?;
        Ok(())
    }

    /// 2-D sweep frames with their generator voltage axes.
    pub fn write_sweep(&self, frame: &SweepFrame) -> Result<()> {
        let group = self.file.create_group("sweep")?;
        group
            .new_dataset_builder()
            .with_data(&frame.channel_a)
            .create("channel_a")?;
        group
            .new_dataset_builder()
            .with_data(&frame.channel_b)
            .create("channel_b")?;
        group.new_dataset_builder().with_data(&frame.x).create("x")?;
        group.new_dataset_builder().with_data(&frame.y).create("y")?;
        Ok(())
    }
}

/// Next free run file in the campaign directory, creating the directory
/// on first use.
pub fn next_run_file(output_dir: &str, campaign_num: usize) -> Result<PathBuf> {
    let camp_dir = PathBuf::from(format!("{output_dir}/camp{campaign_num}"));
    if !camp_dir.exists() {
        std::fs::create_dir_all(&camp_dir)
            .with_context(|| format!("creating campaign directory {}", camp_dir.display()))?;
    }

    let max_run = std::fs::read_dir(&camp_dir)
        .map_err(|e| anyhow!("reading campaign directory: {e}"))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("run").map(str::to_string))
                .and_then(|rest| rest.strip_suffix(".h5").map(str::to_string))
                .and_then(|num| num.parse::<usize>().ok())
        })
        .max();

    let run_num = max_run.map_or(0, |n| n + 1);
    Ok(camp_dir.join(format!("run{run_num}.h5")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rfdaq_writer_{}_{tag}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn run_numbers_increment() {
        let dir = temp_dir("runs");
        let root = dir.to_str().unwrap();

        let first = next_run_file(root, 3).unwrap();
        assert!(first.ends_with("camp3/run0.h5"));
        std::fs::write(&first, b"").unwrap();
        std::fs::write(first.with_file_name("run7.h5"), b"").unwrap();

        let next = next_run_file(root, 3).unwrap();
        assert!(next.ends_with("camp3/run8.h5"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn demod_round_trips_through_hdf5() {
        let dir = temp_dir("demod");
        let path = dir.join("run0.h5");
        let out = DemodOutput {
            magnitude: Array2::from_elem((1, 16), 0.25),
            phase_deg: Array2::from_elem((1, 16), 90.0),
            frequencies: vec![1e6],
        };

        let writer = RunWriter::create(&path).unwrap();
        writer.write_demod(&out, 1e7).unwrap();
        drop(writer);

        let file = File::open(&path).unwrap();
        let group = file.group("demod").unwrap();
        let magnitude = group.dataset("magnitude").unwrap().read_2d::<f64>().unwrap();
        assert_eq!(magnitude.dim(), (1, 16));
        assert_eq!(magnitude[[0, 3]], 0.25);
        let rate: f64 = group.attr("sample_rate").unwrap().read_scalar().unwrap();
        assert_eq!(rate, 1e7);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn sweep_frames_store_axes() {
        let dir = temp_dir("sweep");
        let path = dir.join("run0.h5");
        let frame = SweepFrame {
            channel_a: Array2::zeros((4, 32)),
            channel_b: Array2::zeros((4, 32)),
            x: Array1::linspace(-1.0, 1.0, 32),
            y: Array1::linspace(0.0, 0.5, 4),
        };

        let writer = RunWriter::create(&path).unwrap();
        writer.write_sweep(&frame).unwrap();
        drop(writer);

        let file = File::open(&path).unwrap();
        let x = file
            .group("sweep")
            .unwrap()
            .dataset("x")
            .unwrap()
            .read_1d::<f64>()
            .unwrap();
        assert_eq!(x.len(), 32);
        assert_eq!(x[0], -1.0);
        std::fs::remove_dir_all(&dir).ok();
    }
}
