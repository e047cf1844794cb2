//! Rohde & Schwarz HM8135 signal generator driver.
//!
//! Serial or USB, `\r` terminated. Replies arrive wrapped in XON/XOFF
//! flow-control bytes that have to be stripped before parsing.

use crate::error::DriverError;
use crate::parameter::check_float_range;
use crate::transport::Transport;
use log::info;
use std::fmt;

/// Phase reference selection.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PhaseReference {
    Internal,
    External,
}

impl fmt::Display for PhaseReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Internal => "INT",
            Self::External => "EXT",
        })
    }
}

pub struct Hm8135<T: Transport> {
    transport: T,
}

/// Strip XON/XOFF framing (raw control bytes and the escaped form some
/// transports hand back) plus surrounding whitespace.
fn scrub(reply: &str) -> String {
    reply
        .replace("\\x11", "")
        .replace("\\x13", "")
        .replace(['\x11', '\x13'], "")
        .trim()
        .to_string()
}

fn parse_f64(what: &'static str, reply: &str) -> Result<f64, DriverError> {
    let text = scrub(reply);
    text.parse().map_err(|_| DriverError::Parse {
        what,
        text: reply.to_string(),
    })
}

fn parse_int(what: &'static str, reply: &str) -> Result<i64, DriverError> {
    let text = scrub(reply);
    text.parse().map_err(|_| DriverError::Parse {
        what,
        text: reply.to_string(),
    })
}

impl<T: Transport> Hm8135<T> {
    pub fn new(transport: T) -> Result<Self, DriverError> {
        let mut sg = Self { transport };
        let idn = sg.transport.query("*IDN?")?;
        info!("connected to signal generator: {}", scrub(&idn));
        Ok(sg)
    }

    /// Output frequency in Hz.
    pub fn frequency(&mut self) -> Result<f64, DriverError> {
        let reply = self.transport.query(":FREQ?")?;
        parse_f64("frequency", &reply)
    }

    pub fn set_frequency(&mut self, hz: f64) -> Result<(), DriverError> {
        check_float_range("frequency", hz, 1e6, 3e9)?;
        self.transport.write_line(&format!(":FREQ {hz}"))
    }

    /// Output power in dBm.
    pub fn power(&mut self) -> Result<f64, DriverError> {
        let reply = self.transport.query("SOUR:POW?")?;
        parse_f64("power", &reply)
    }

    pub fn set_power(&mut self, dbm: f64) -> Result<(), DriverError> {
        check_float_range("power", dbm, -120.0, 7.0)?;
        self.transport.write_line(&format!("SOUR:POW {dbm:.2}"))
    }

    /// Carrier phase in degrees.
    pub fn phase(&mut self) -> Result<f64, DriverError> {
        let reply = self.transport.query(":PHAS?")?;
        parse_f64("phase", &reply)
    }

    pub fn set_phase_reference(&mut self, reference: PhaseReference) -> Result<(), DriverError> {
        self.transport.write_line(&format!(":PHAS {reference}"))
    }

    /// RF output state.
    pub fn output(&mut self) -> Result<bool, DriverError> {
        let reply = self.transport.query(":OUTP?")?;
        Ok(parse_int("output state", &reply)? != 0)
    }

    pub fn set_output(&mut self, on: bool) -> Result<(), DriverError> {
        self.transport
            .write_line(if on { ":OUTP 1" } else { ":OUTP 0" })
    }

    pub fn reset(&mut self) -> Result<(), DriverError> {
        self.transport.write_line("*RST")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn connected(mock: MockTransport) -> Hm8135<MockTransport> {
        Hm8135::new(mock).unwrap()
    }

    #[test]
    fn replies_are_scrubbed_of_flow_control_bytes() {
        let mock = MockTransport::new()
            .expect_query("*IDN?", "HAMEG,HM8135,0,1.0")
            .expect_query(":FREQ?", "\x131000000.00\x11");
        let mut sg = connected(mock);
        assert_eq!(sg.frequency().unwrap(), 1e6);
    }

    #[test]
    fn set_frequency_validates_band() {
        let mock = MockTransport::new().expect_query("*IDN?", "HAMEG,HM8135,0,1.0");
        let mut sg = connected(mock);
        assert!(sg.set_frequency(100.0).is_err());
        assert!(sg.set_frequency(4e9).is_err());
    }

    #[test]
    fn power_is_formatted_with_two_decimals() {
        let mock = MockTransport::new()
            .expect_query("*IDN?", "HAMEG,HM8135,0,1.0")
            .expect_write("SOUR:POW -10.50");
        let mut sg = connected(mock);
        sg.set_power(-10.5).unwrap();
    }

    #[test]
    fn output_maps_to_numeric_state() {
        let mock = MockTransport::new()
            .expect_query("*IDN?", "HAMEG,HM8135,0,1.0")
            .expect_write(":OUTP 1")
            .expect_query(":OUTP?", "\x131\x11");
        let mut sg = connected(mock);
        sg.set_output(true).unwrap();
        assert!(sg.output().unwrap());
    }
}
