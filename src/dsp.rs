//! Post-processing math for the acquisition controllers: FIR low-pass
//! filtering for software demodulation, ADC code to volts conversion and
//! magnitude/phase extraction from I/Q pairs.

use crate::error::DriverError;
use ndarray::{Array1, Array2, Axis};

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

/// Windowed-sinc low-pass FIR coefficients (Hamming window), `cutoff`
/// given as a fraction of the Nyquist rate. Coefficients are scaled so
/// the DC gain is unity.
pub fn firwin(numtaps: usize, cutoff: f64) -> Vec<f64> {
    debug_assert!(numtaps >= 1 && cutoff > 0.0 && cutoff < 1.0);
    let alpha = (numtaps - 1) as f64 / 2.0;
    let mut taps: Vec<f64> = (0..numtaps)
        .map(|n| {
            let window = if numtaps == 1 {
                1.0
            } else {
                0.54 - 0.46 * (std::f64::consts::TAU * n as f64 / (numtaps - 1) as f64).cos()
            };
            cutoff * sinc(cutoff * (n as f64 - alpha)) * window
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    for tap in &mut taps {
        *tap /= sum;
    }
    taps
}

/// Direct-form FIR filter with zero initial state, the causal
/// `y[n] = sum_k b[k] x[n-k]` convolution.
pub fn lfilter(taps: &[f64], x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; x.len()];
    for (n, out) in y.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (k, &b) in taps.iter().enumerate().take(n + 1) {
            acc += b * x[n - k];
        }
        *out = acc;
    }
    y
}

/// Low-pass filter each row of `rec` with an FIR window filter.
pub fn filter_win(
    rec: &Array2<f64>,
    cutoff_hz: f64,
    sample_rate: f64,
    numtaps: usize,
) -> Array2<f64> {
    let nyq_rate = sample_rate / 2.0;
    let taps = firwin(numtaps, cutoff_hz / nyq_rate);
    let mut out = rec.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let filtered = lfilter(&taps, row.as_slice().expect("row not contiguous"));
        for (dst, src) in row.iter_mut().zip(filtered) {
            *dst = src;
        }
    }
    out
}

/// Least-squares FIR variant of [`filter_win`].
pub fn filter_ls(
    _rec: &Array2<f64>,
    _cutoff_hz: f64,
    _sample_rate: f64,
    _numtaps: usize,
) -> Result<Array2<f64>, DriverError> {
    Err(DriverError::NotImplemented("least-squares filter"))
}

const fn code_zero(bits: u8) -> f64 {
    ((1u32 << (bits - 1)) as f64) - 0.5
}

/// Volts conversion for 12-bit samples stored left-justified in 16-bit
/// words: right-shift by 4, then map around the mid-scale code.
pub fn sample_to_volt_u12(rec: &Array1<f64>, input_range_volts: f64) -> Array1<f64> {
    let zero = code_zero(12);
    rec.mapv(|s| {
        let shifted = ((s as u16) >> 4) as f64;
        input_range_volts * (shifted - zero) / zero
    })
}

/// Volts conversion for full 16-bit samples.
pub fn sample_to_volt_u16(rec: &Array1<f64>, input_range_volts: f64) -> Array1<f64> {
    let zero = code_zero(16);
    rec.mapv(|s| input_range_volts * (s - zero) / zero)
}

/// Fallback when no volts conversion exists for the board's bit depth:
/// raw samples centered on zero.
pub fn mean_centered(rec: &Array1<f64>) -> Array1<f64> {
    let mean = rec.mean().unwrap_or(0.0);
    rec.mapv(|s| s - mean)
}

/// Round `num` up to the nearest multiple of `to_nearest`.
pub fn roundup(num: usize, to_nearest: usize) -> usize {
    let remainder = num % to_nearest;
    if remainder == 0 {
        num
    } else {
        num + to_nearest - remainder
    }
}

/// Elementwise magnitude and phase (degrees) of `re + i*im`.
pub fn mag_phase_deg(re: &Array2<f64>, im: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    let magnitude = ndarray::Zip::from(re).and(im).map_collect(|&r, &i| r.hypot(i));
    let phase = ndarray::Zip::from(re)
        .and(im)
        .map_collect(|&r, &i| i.atan2(r).to_degrees());
    (magnitude, phase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::f64::consts::TAU;

    #[test]
    fn firwin_has_unity_dc_gain() {
        let taps = firwin(101, 0.1);
        let sum: f64 = taps.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lfilter_passes_dc_after_settling() {
        let taps = firwin(51, 0.2);
        let x = vec![1.0; 200];
        let y = lfilter(&taps, &x);
        assert!((y[199] - 1.0).abs() < 1e-9);
        // Ramp-up region is attenuated while the filter fills.
        assert!(y[0] < 0.1);
    }

    #[test]
    fn filter_win_suppresses_out_of_band_tone() {
        let sample_rate = 1e6;
        let n = 2048;
        let tone: Vec<f64> = (0..n)
            .map(|i| (TAU * 4e5 * i as f64 / sample_rate).sin())
            .collect();
        let rec = Array2::from_shape_vec((1, n), tone).unwrap();
        let out = filter_win(&rec, 1e4, sample_rate, 101);
        let rms = (out.row(0).iter().skip(200).map(|v| v * v).sum::<f64>()
            / (n - 200) as f64)
            .sqrt();
        assert!(rms < 1e-2, "residual rms {rms}");
    }

    #[test]
    fn volts_conversion_u16_full_scale() {
        let rec = Array1::from(vec![65535.0, 32767.5, 0.0]);
        let volts = sample_to_volt_u16(&rec, 2.0);
        assert!((volts[0] - 2.0).abs() < 1e-9);
        assert!(volts[1].abs() < 1e-9);
        assert!((volts[2] + 2.0 - 2.0 / 32767.5).abs() < 1e-4);
    }

    #[test]
    fn volts_conversion_u12_shifts_first() {
        let rec = Array1::from(vec![32768.0]);
        let volts = sample_to_volt_u12(&rec, 1.0);
        // 32768 >> 4 = 2048, half a code above mid-scale.
        assert!((volts[0] - 0.5 / 2047.5).abs() < 1e-9);
    }

    #[test]
    fn roundup_to_divisor() {
        assert_eq!(roundup(600, 32), 608);
        assert_eq!(roundup(608, 32), 608);
        assert_eq!(roundup(1, 32), 32);
    }

    #[test]
    fn least_squares_filter_not_implemented() {
        let rec = Array2::zeros((1, 8));
        assert!(filter_ls(&rec, 1e3, 1e6, 11).is_err());
    }
}
