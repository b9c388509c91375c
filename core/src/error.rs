//! Error kinds produced by the core, each with a fixed handling policy.

use thiserror::Error;

/// Every fallible outcome the core can produce. The Supervisor treats
/// [`CoreError::StackOverflow`], [`CoreError::AllocFailure`],
/// [`CoreError::AssertFailed`] and [`CoreError::WatchdogTrip`] as fatal: each
/// one must be followed by de-asserting the solenoid master before any trap
/// or reset path runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("unrecognized command")]
    BadCommand,
    #[error("hardware index out of range or wrong kind for this operation")]
    InvalidHwIndex,
    #[error("no free output slot")]
    NoSpace,
    #[error("transient I2C failure")]
    I2cTransient,
    #[error("I2C channel degraded after repeated failures")]
    I2cPersistent,
    #[error("USB TX queue overflowed, bytes dropped")]
    UsbTxOverflow,
    #[error("stack overflow")]
    StackOverflow,
    #[error("allocation failure")]
    AllocFailure,
    #[error("assertion failed")]
    AssertFailed,
    #[error("watchdog trip")]
    WatchdogTrip,
}

impl CoreError {
    /// True for the fault-latching kinds that must de-assert the solenoid
    /// master before any trap/reset path runs.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            CoreError::StackOverflow
                | CoreError::AllocFailure
                | CoreError::AssertFailed
                | CoreError::WatchdogTrip
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
