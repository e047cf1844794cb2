//! Register-style parameter plumbing shared by the instrument drivers.
//!
//! Board settings are symbolic values that translate to vendor byte codes
//! through fixed tables; numeric settings carry simple validators. Tables
//! are static so drivers can declare them as consts next to the driver.

use crate::error::DriverError;

/// Ordered (code, value) table mapping a symbolic setting to the byte
/// code the vendor call expects.
pub struct ByteMap<T: 'static> {
    name: &'static str,
    entries: &'static [(u32, T)],
}

impl<T: Copy + PartialEq + std::fmt::Debug> ByteMap<T> {
    pub const fn new(name: &'static str, entries: &'static [(u32, T)]) -> Self {
        Self { name, entries }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Byte code for a value; a miss names the parameter and lists the
    /// allowed values instead of panicking.
    pub fn code_for(&self, value: T) -> Result<u32, DriverError> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(code, _)| *code)
            .ok_or_else(|| DriverError::UnknownValue {
                param: self.name,
                value: format!("{value:?}"),
                allowed: self.allowed(),
            })
    }

    pub fn value_for(&self, code: u32) -> Option<T> {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| *v)
    }

    pub fn values(&self) -> impl Iterator<Item = T> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }

    fn allowed(&self) -> String {
        let mut out = String::new();
        for (i, (_, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("{v:?}"));
        }
        out
    }
}

/// Closed integer range check.
pub fn check_int_range(
    param: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<(), DriverError> {
    if value < min || value > max {
        return Err(DriverError::OutOfRange {
            param,
            value: value.to_string(),
            expected: format!("{min}..={max}"),
        });
    }
    Ok(())
}

/// Closed float range check.
pub fn check_float_range(
    param: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), DriverError> {
    if !value.is_finite() || value < min || value > max {
        return Err(DriverError::OutOfRange {
            param,
            value: value.to_string(),
            expected: format!("{min}..={max}"),
        });
    }
    Ok(())
}

/// Value must be a multiple of `divisor` and at least `min`.
pub fn check_multiple_of(
    param: &'static str,
    value: usize,
    divisor: usize,
    min: usize,
) -> Result<(), DriverError> {
    if value < min || value % divisor != 0 {
        return Err(DriverError::OutOfRange {
            param,
            value: value.to_string(),
            expected: format!("multiple of {divisor}, at least {min}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUPLING: ByteMap<&str> = ByteMap::new("coupling", &[(1, "AC"), (2, "DC")]);

    #[test]
    fn byte_map_lookups() {
        assert_eq!(COUPLING.code_for("DC").unwrap(), 2);
        assert_eq!(COUPLING.value_for(1), Some("AC"));
        assert_eq!(COUPLING.value_for(9), None);
    }

    #[test]
    fn byte_map_miss_names_parameter() {
        let err = COUPLING.code_for("GND").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("coupling"), "{text}");
        assert!(text.contains("AC"), "{text}");
    }

    #[test]
    fn range_checks() {
        assert!(check_int_range("level", 140, 0, 255).is_ok());
        assert!(check_int_range("level", 300, 0, 255).is_err());
        assert!(check_multiple_of("samples_per_record", 1024, 32, 256).is_ok());
        assert!(check_multiple_of("samples_per_record", 100, 32, 256).is_err());
        assert!(check_float_range("int_time", f64::NAN, 0.0, 0.1).is_err());
    }
}
