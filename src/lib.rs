//! Laboratory instrument drivers for RF reflectometry measurements.
//!
//! The core is the ATS9462 digitizer driver and its buffered acquisition
//! pipeline: DMA buffers are posted to the vendor library (or the
//! simulated board), filled buffers stream through an acquisition
//! controller, and the controller's post-processing (averaging, software
//! demodulation, sweep reshaping) produces the measurement result.
//! Around that sit SCPI/VBS drivers for the supporting instruments: a
//! LeCroy oscilloscope, an HM8135 signal generator and an SR570 current
//! preamplifier.

pub mod ats;
pub mod ats9462;
pub mod config;
pub mod controller;
pub mod demod;
pub mod dsp;
pub mod error;
pub mod parameter;
pub mod preamp;
pub mod scope;
pub mod siggen;
pub mod sim;
pub mod sweep;
pub mod transport;
pub mod tui;
pub mod vna;
pub mod writer;

pub use ats::{AtsReturn, BoardHandle, BoardInfo};
pub use ats9462::{AcqSettings, Ats9462, BoardSettings};
pub use config::Conf;
pub use controller::AcquisitionController;
pub use demod::{DemodController, DemodOutput, DemodSettings};
pub use error::DriverError;
pub use preamp::Sr570;
pub use scope::{Reflectometry, Scope};
pub use siggen::Hm8135;
pub use sim::{SimBoard, SimSettings};
pub use sweep::{SweepController, SweepFrame};
pub use transport::{SerialTransport, TcpTransport, Transport};
pub use vna::{AverageController, IqPoint, VoltRecords};
