//! Vendor API boundary for the ATS digitizer family.
//!
//! The acquisition pipeline talks to the board through the [`BoardHandle`]
//! trait: configuration calls mirror the vendor entry points one to one,
//! and the capture loop hands DMA buffers to the board and blocks until
//! the oldest posted buffer has been filled. The real library is linked
//! behind the `ats-dll` feature; everything else in the crate runs against
//! [`crate::sim::SimBoard`].
//!
//! Buffer layout contract: buffers are channel-blocked, all records of
//! channel A back to back followed by all records of channel B. The
//! controllers in this crate rely on that ordering.

use std::fmt;

/// Return codes of the vendor API. Success is 512; everything else is a
/// failure mode surfaced to the caller.
#[repr(u32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AtsReturn {
    ApiSuccess = 512,
    ApiFailed = 513,
    ApiAccessDenied = 514,
    ApiDmaChannelUnavailable = 515,
    ApiDmaInProgress = 518,
    ApiNotInitialized = 532,
    ApiInvalidHandle = 535,
    ApiBufferNotReady = 541,
    ApiInvalidBuffer = 542,
    ApiUnsupportedFunction = 561,
    ApiWaitTimeout = 579,
    ApiBufferOverflow = 582,
    ApiTransferComplete = 589,
    Unknown = 0,
}

impl From<u32> for AtsReturn {
    fn from(value: u32) -> Self {
        match value {
            512 => Self::ApiSuccess,
            513 => Self::ApiFailed,
            514 => Self::ApiAccessDenied,
            515 => Self::ApiDmaChannelUnavailable,
            518 => Self::ApiDmaInProgress,
            532 => Self::ApiNotInitialized,
            535 => Self::ApiInvalidHandle,
            541 => Self::ApiBufferNotReady,
            542 => Self::ApiInvalidBuffer,
            561 => Self::ApiUnsupportedFunction,
            579 => Self::ApiWaitTimeout,
            582 => Self::ApiBufferOverflow,
            589 => Self::ApiTransferComplete,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for AtsReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, *self as u32)
    }
}

impl std::error::Error for AtsReturn {}

pub type AtsResult<T> = Result<T, AtsReturn>;

/// Channel identifiers as the vendor API encodes them.
pub const CHANNEL_A: u32 = 1;
pub const CHANNEL_B: u32 = 2;

/// Static board identity reported by the vendor library.
#[derive(Clone, Debug, PartialEq)]
pub struct BoardInfo {
    pub model: String,
    pub serial: u32,
    pub bits_per_sample: u8,
    pub max_samples_per_record: usize,
}

/// The vendor operations the acquisition pipeline needs.
///
/// Methods map one to one onto vendor entry points, taking the raw byte
/// codes produced by the driver's parameter tables. Implementations:
/// the linked library (`ats-dll` feature) and the simulated board.
pub trait BoardHandle {
    fn board_info(&self) -> AtsResult<BoardInfo>;

    fn set_capture_clock(&mut self, source: u32, rate: u32, edge: u32, decimation: u32)
        -> AtsResult<()>;

    fn input_control(&mut self, channel: u32, coupling: u32, range: u32, impedance: u32)
        -> AtsResult<()>;

    fn set_bw_limit(&mut self, channel: u32, enable: u32) -> AtsResult<()>;

    #[allow(clippy::too_many_arguments)]
    fn set_trigger_operation(
        &mut self,
        operation: u32,
        engine1: u32,
        source1: u32,
        slope1: u32,
        level1: u32,
        engine2: u32,
        source2: u32,
        slope2: u32,
        level2: u32,
    ) -> AtsResult<()>;

    fn set_external_trigger(&mut self, coupling: u32, range: u32) -> AtsResult<()>;

    fn set_trigger_delay(&mut self, cycles: u32) -> AtsResult<()>;

    /// Ticks are in 10 us units; 0 waits forever for a hardware trigger.
    fn set_trigger_timeout(&mut self, ticks: u32) -> AtsResult<()>;

    fn configure_aux_io(&mut self, mode: u32, parameter: u32) -> AtsResult<()>;

    fn before_async_read(
        &mut self,
        channel_mask: u32,
        transfer_offset: i64,
        samples_per_record: u32,
        records_per_buffer: u32,
        records_per_acquisition: u32,
        flags: u32,
    ) -> AtsResult<()>;

    /// Hand a DMA buffer to the board. Posted buffers are filled in FIFO
    /// order; after processing, the same buffer must be posted again.
    fn post_async_buffer(&mut self, buffer: &mut [u16]) -> AtsResult<()>;

    fn start_capture(&mut self) -> AtsResult<()>;

    /// Block until the oldest posted buffer is full. The vendor fills the
    /// buffer in place; the slice must be the one posted first.
    fn wait_async_buffer_complete(&mut self, buffer: &mut [u16], timeout_ms: u32) -> AtsResult<()>;

    fn abort_async_read(&mut self) -> AtsResult<()>;
}

/// Bindings to the installed vendor library. Declared by hand because the
/// SDK header is not redistributable; signatures follow the ATS-SDK manual.
#[cfg(feature = "ats-dll")]
pub mod dll {
    use super::{AtsResult, AtsReturn, BoardHandle, BoardInfo};
    use libc::c_void;

    #[link(name = "ATSApi")]
    extern "C" {
        fn AlazarNumOfSystems() -> u32;
        fn AlazarGetBoardBySystemID(system_id: u32, board_id: u32) -> *mut c_void;
        fn AlazarGetBoardKind(handle: *mut c_void) -> u32;
        fn AlazarGetChannelInfo(
            handle: *mut c_void,
            max_samples: *mut u32,
            bits_per_sample: *mut u8,
        ) -> u32;
        fn AlazarSetCaptureClock(
            handle: *mut c_void,
            source: u32,
            rate: u32,
            edge: u32,
            decimation: u32,
        ) -> u32;
        fn AlazarInputControl(
            handle: *mut c_void,
            channel: u8,
            coupling: u32,
            range: u32,
            impedance: u32,
        ) -> u32;
        fn AlazarSetBWLimit(handle: *mut c_void, channel: u32, enable: u32) -> u32;
        fn AlazarSetTriggerOperation(
            handle: *mut c_void,
            operation: u32,
            engine1: u32,
            source1: u32,
            slope1: u32,
            level1: u32,
            engine2: u32,
            source2: u32,
            slope2: u32,
            level2: u32,
        ) -> u32;
        fn AlazarSetExternalTrigger(handle: *mut c_void, coupling: u32, range: u32) -> u32;
        fn AlazarSetTriggerDelay(handle: *mut c_void, delay: u32) -> u32;
        fn AlazarSetTriggerTimeOut(handle: *mut c_void, ticks: u32) -> u32;
        fn AlazarConfigureAuxIO(handle: *mut c_void, mode: u32, parameter: u32) -> u32;
        fn AlazarBeforeAsyncRead(
            handle: *mut c_void,
            channel_mask: u32,
            transfer_offset: i64,
            samples_per_record: u32,
            records_per_buffer: u32,
            records_per_acquisition: u32,
            flags: u32,
        ) -> u32;
        fn AlazarPostAsyncBuffer(handle: *mut c_void, buffer: *mut c_void, bytes: u32) -> u32;
        fn AlazarStartCapture(handle: *mut c_void) -> u32;
        fn AlazarWaitAsyncBufferComplete(
            handle: *mut c_void,
            buffer: *mut c_void,
            timeout_ms: u32,
        ) -> u32;
        fn AlazarAbortAsyncRead(handle: *mut c_void) -> u32;
    }

    fn check(code: u32) -> AtsResult<()> {
        match AtsReturn::from(code) {
            AtsReturn::ApiSuccess => Ok(()),
            other => Err(other),
        }
    }

    /// A board opened through the installed vendor library.
    pub struct DllBoard {
        handle: *mut c_void,
        model: String,
    }

    // The vendor handle is an opaque token owned exclusively by this
    // wrapper; the library serializes access internally.
    unsafe impl Send for DllBoard {}

    impl DllBoard {
        pub fn open(system_id: u32, board_id: u32) -> AtsResult<Self> {
            if unsafe { AlazarNumOfSystems() } == 0 {
                return Err(AtsReturn::ApiNotInitialized);
            }
            let handle = unsafe { AlazarGetBoardBySystemID(system_id, board_id) };
            if handle.is_null() {
                return Err(AtsReturn::ApiInvalidHandle);
            }
            let kind = unsafe { AlazarGetBoardKind(handle) };
            Ok(Self {
                handle,
                model: board_kind_name(kind).to_string(),
            })
        }
    }

    // Board kind codes from the SDK manual; only the families these
    // drivers were used with are spelled out.
    fn board_kind_name(kind: u32) -> &'static str {
        match kind {
            20 => "ATS9462",
            24 => "ATS9360",
            25 => "ATS9626",
            _ => "UNKNOWN",
        }
    }

    impl BoardHandle for DllBoard {
        fn board_info(&self) -> AtsResult<BoardInfo> {
            let mut max_samples = 0u32;
            let mut bits = 0u8;
            check(unsafe { AlazarGetChannelInfo(self.handle, &mut max_samples, &mut bits) })?;
            Ok(BoardInfo {
                model: self.model.clone(),
                serial: 0,
                bits_per_sample: bits,
                max_samples_per_record: max_samples as usize,
            })
        }

        fn set_capture_clock(
            &mut self,
            source: u32,
            rate: u32,
            edge: u32,
            decimation: u32,
        ) -> AtsResult<()> {
            check(unsafe { AlazarSetCaptureClock(self.handle, source, rate, edge, decimation) })
        }

        fn input_control(
            &mut self,
            channel: u32,
            coupling: u32,
            range: u32,
            impedance: u32,
        ) -> AtsResult<()> {
            check(unsafe {
                AlazarInputControl(self.handle, channel as u8, coupling, range, impedance)
            })
        }

        fn set_bw_limit(&mut self, channel: u32, enable: u32) -> AtsResult<()> {
            check(unsafe { AlazarSetBWLimit(self.handle, channel, enable) })
        }

        fn set_trigger_operation(
            &mut self,
            operation: u32,
            engine1: u32,
            source1: u32,
            slope1: u32,
            level1: u32,
            engine2: u32,
            source2: u32,
            slope2: u32,
            level2: u32,
        ) -> AtsResult<()> {
            check(unsafe {
                AlazarSetTriggerOperation(
                    self.handle,
                    operation,
                    engine1,
                    source1,
                    slope1,
                    level1,
                    engine2,
                    source2,
                    slope2,
                    level2,
                )
            })
        }

        fn set_external_trigger(&mut self, coupling: u32, range: u32) -> AtsResult<()> {
            check(unsafe { AlazarSetExternalTrigger(self.handle, coupling, range) })
        }

        fn set_trigger_delay(&mut self, cycles: u32) -> AtsResult<()> {
            check(unsafe { AlazarSetTriggerDelay(self.handle, cycles) })
        }

        fn set_trigger_timeout(&mut self, ticks: u32) -> AtsResult<()> {
            check(unsafe { AlazarSetTriggerTimeOut(self.handle, ticks) })
        }

        fn configure_aux_io(&mut self, mode: u32, parameter: u32) -> AtsResult<()> {
            check(unsafe { AlazarConfigureAuxIO(self.handle, mode, parameter) })
        }

        fn before_async_read(
            &mut self,
            channel_mask: u32,
            transfer_offset: i64,
            samples_per_record: u32,
            records_per_buffer: u32,
            records_per_acquisition: u32,
            flags: u32,
        ) -> AtsResult<()> {
            check(unsafe {
                AlazarBeforeAsyncRead(
                    self.handle,
                    channel_mask,
                    transfer_offset,
                    samples_per_record,
                    records_per_buffer,
                    records_per_acquisition,
                    flags,
                )
            })
        }

        fn post_async_buffer(&mut self, buffer: &mut [u16]) -> AtsResult<()> {
            let bytes = (buffer.len() * std::mem::size_of::<u16>()) as u32;
            check(unsafe {
                AlazarPostAsyncBuffer(self.handle, buffer.as_mut_ptr() as *mut c_void, bytes)
            })
        }

        fn start_capture(&mut self) -> AtsResult<()> {
            check(unsafe { AlazarStartCapture(self.handle) })
        }

        fn wait_async_buffer_complete(
            &mut self,
            buffer: &mut [u16],
            timeout_ms: u32,
        ) -> AtsResult<()> {
            check(unsafe {
                AlazarWaitAsyncBufferComplete(
                    self.handle,
                    buffer.as_mut_ptr() as *mut c_void,
                    timeout_ms,
                )
            })
        }

        fn abort_async_read(&mut self) -> AtsResult<()> {
            check(unsafe { AlazarAbortAsyncRead(self.handle) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_codes_round_trip() {
        assert_eq!(AtsReturn::from(512), AtsReturn::ApiSuccess);
        assert_eq!(AtsReturn::from(579), AtsReturn::ApiWaitTimeout);
        assert_eq!(AtsReturn::from(9999), AtsReturn::Unknown);
    }
}
