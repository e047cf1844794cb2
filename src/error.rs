use crate::ats::AtsReturn;
use std::fmt;

/// Errors raised by the instrument drivers and acquisition controllers.
///
/// Vendor return codes are wrapped rather than flattened so callers can
/// still match on the raw board status when talking to real hardware.
#[derive(Debug)]
pub enum DriverError {
    /// A symbolic setting has no entry in the byte-code table.
    UnknownValue {
        param: &'static str,
        value: String,
        allowed: String,
    },
    /// A numeric setting failed validation.
    OutOfRange {
        param: &'static str,
        value: String,
        expected: String,
    },
    /// The controller's cached geometry does not match the driver's.
    SettingsMismatch {
        what: &'static str,
        driver: String,
        controller: String,
    },
    /// The connected board reports a different model than this driver.
    ModelMismatch { expected: &'static str, found: String },
    /// A trace was requested before the prepare step ran.
    TraceNotReady(&'static str),
    /// A code path the drivers deliberately do not support yet.
    NotImplemented(&'static str),
    /// A binary waveform block could not be decoded.
    BadBlock(String),
    /// A textual instrument reply could not be parsed.
    Parse { what: &'static str, text: String },
    /// The vendor wait call timed out or failed while filling a buffer.
    Acquisition { buffer: usize, code: AtsReturn },
    /// Raw vendor return code from a configuration call.
    Ats(AtsReturn),
    /// Transport-level failure.
    Io(std::io::Error),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownValue {
                param,
                value,
                allowed,
            } => write!(f, "{param}: value {value} not supported (allowed: {allowed})"),
            Self::OutOfRange {
                param,
                value,
                expected,
            } => write!(f, "{param}: value {value} out of range (expected {expected})"),
            Self::SettingsMismatch {
                what,
                driver,
                controller,
            } => write!(
                f,
                "{what} mismatch: driver has {driver}, controller has {controller}; \
                 update the acquisition settings before capturing"
            ),
            Self::ModelMismatch { expected, found } => {
                write!(f, "board kind is not '{expected}', found '{found}' instead")
            }
            Self::TraceNotReady(msg) => write!(f, "trace not ready: {msg}"),
            Self::NotImplemented(what) => write!(f, "{what} is not implemented"),
            Self::BadBlock(msg) => write!(f, "malformed binary block: {msg}"),
            Self::Parse { what, text } => write!(f, "could not parse {what} from '{text}'"),
            Self::Acquisition { buffer, code } => {
                write!(f, "waiting for buffer {buffer} failed: {code}")
            }
            Self::Ats(code) => write!(f, "board call failed: {code}"),
            Self::Io(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Ats(code) | Self::Acquisition { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<AtsReturn> for DriverError {
    fn from(code: AtsReturn) -> Self {
        Self::Ats(code)
    }
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
