//! Stanford Research SR570 current preamplifier.
//!
//! The SR570 has no readback interface, so this driver only mirrors the
//! front-panel state and converts voltages measured downstream (lock-in,
//! scope) back into input current. The gain vernier is deliberately not
//! modeled; only the discrete sensitivity values are well defined.

use crate::error::DriverError;
use crate::parameter::check_float_range;
use serde::Deserialize;

/// Filter cutoff settings share one fixed table; `Dc` only makes sense
/// for the high-pass corner.
#[derive(Clone, Copy, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cutoff {
    Dc,
    Hz(f64),
}

/// The discrete cutoff frequencies the instrument offers, in Hz.
pub const CUTOFF_FREQUENCIES: &[f64] = &[
    0.03, 0.1, 0.3, 1.0, 3.0, 10.0, 30.0, 100.0, 300.0, 1e3, 3e3, 10e3, 30e3, 100e3, 300e3, 1e6,
];

impl Cutoff {
    fn validate(self) -> Result<(), DriverError> {
        match self {
            Self::Dc => Ok(()),
            Self::Hz(f) if CUTOFF_FREQUENCIES.contains(&f) => Ok(()),
            Self::Hz(f) => Err(DriverError::OutOfRange {
                param: "cutoff",
                value: f.to_string(),
                expected: format!("DC or one of {CUTOFF_FREQUENCIES:?}"),
            }),
        }
    }

    fn corner_hz(self) -> f64 {
        match self {
            Self::Dc => 0.0,
            Self::Hz(f) => f,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasVoltage {
    Pos,
    Neg,
    Off,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GainMode {
    LowNoise,
    HighBandwidth,
    LowDrift,
}

/// Fixed identity, since the instrument cannot be queried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub vendor: &'static str,
    pub model: &'static str,
    pub serial: Option<String>,
    pub firmware: Option<String>,
}

pub struct Sr570 {
    cutoff_lo: Cutoff,
    cutoff_hi: Cutoff,
    invert: bool,
    sensitivity: f64,
    input_offset: f64,
    bias_voltage: BiasVoltage,
    gain_mode: GainMode,
}

impl Default for Sr570 {
    fn default() -> Self {
        Self {
            cutoff_lo: Cutoff::Dc,
            cutoff_hi: Cutoff::Hz(1e6),
            invert: false,
            sensitivity: 100e-9,
            input_offset: 1e-12,
            bias_voltage: BiasVoltage::Off,
            gain_mode: GainMode::LowNoise,
        }
    }
}

impl Sr570 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Identity {
        Identity {
            vendor: "Stanford Research Systems",
            model: "SR570",
            serial: None,
            firmware: None,
        }
    }

    /// High-pass corner (`cutoff_lo`) and low-pass corner (`cutoff_hi`)
    /// are set together because the instrument refuses hi <= lo.
    pub fn set_cutoffs(&mut self, lo: Cutoff, hi: Cutoff) -> Result<(), DriverError> {
        lo.validate()?;
        hi.validate()?;
        if hi.corner_hz() <= lo.corner_hz() {
            return Err(DriverError::OutOfRange {
                param: "cutoff_hi",
                value: format!("{hi:?}"),
                expected: format!("above cutoff_lo ({lo:?})"),
            });
        }
        self.cutoff_lo = lo;
        self.cutoff_hi = hi;
        Ok(())
    }

    pub fn cutoffs(&self) -> (Cutoff, Cutoff) {
        (self.cutoff_lo, self.cutoff_hi)
    }

    pub fn set_invert(&mut self, invert: bool) {
        self.invert = invert;
    }

    pub fn invert(&self) -> bool {
        self.invert
    }

    /// Sensitivity in A/V.
    pub fn set_sensitivity(&mut self, amps_per_volt: f64) -> Result<(), DriverError> {
        check_float_range("sensitivity", amps_per_volt, 1e-12, 500e-3)?;
        self.sensitivity = amps_per_volt;
        Ok(())
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    /// Input offset current in A.
    pub fn set_input_offset(&mut self, amps: f64) -> Result<(), DriverError> {
        check_float_range("input_offset", amps, -500e-3, 500e-3)?;
        self.input_offset = amps;
        Ok(())
    }

    pub fn input_offset(&self) -> f64 {
        self.input_offset
    }

    pub fn set_bias_voltage(&mut self, bias: BiasVoltage) {
        self.bias_voltage = bias;
    }

    pub fn bias_voltage(&self) -> BiasVoltage {
        self.bias_voltage
    }

    pub fn set_gain_mode(&mut self, mode: GainMode) {
        self.gain_mode = mode;
    }

    pub fn gain_mode(&self) -> GainMode {
        self.gain_mode
    }

    /// Input current inferred from a voltage measured at the amplifier
    /// output, negated when the output is inverted.
    pub fn amplified_current(&self, measured_volts: f64) -> f64 {
        let current = measured_volts * self.sensitivity;
        if self.invert {
            -current
        } else {
            current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_front_panel() {
        let amp = Sr570::new();
        assert_eq!(amp.cutoffs(), (Cutoff::Dc, Cutoff::Hz(1e6)));
        assert_eq!(amp.sensitivity(), 100e-9);
        assert_eq!(amp.identity().model, "SR570");
    }

    #[test]
    fn cutoff_ordering_is_enforced() {
        let mut amp = Sr570::new();
        assert!(amp.set_cutoffs(Cutoff::Hz(1e3), Cutoff::Hz(10e3)).is_ok());
        assert!(amp.set_cutoffs(Cutoff::Hz(10e3), Cutoff::Hz(1e3)).is_err());
        assert!(amp.set_cutoffs(Cutoff::Hz(42.0), Cutoff::Hz(1e6)).is_err());
    }

    #[test]
    fn current_conversion_tracks_sensitivity_and_invert() {
        let mut amp = Sr570::new();
        amp.set_sensitivity(1e-6).unwrap();
        assert_eq!(amp.amplified_current(2.0), 2e-6);
        amp.set_invert(true);
        assert_eq!(amp.amplified_current(2.0), -2e-6);
    }

    #[test]
    fn sensitivity_outside_vernier_free_range_rejected() {
        let mut amp = Sr570::new();
        assert!(amp.set_sensitivity(1.0).is_err());
        assert!(amp.set_sensitivity(1e-13).is_err());
    }
}
