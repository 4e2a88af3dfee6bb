//! Kernel status codes
//!
//! `Status` is what object operations return to their kernel or user-space
//! caller. Routing entry points never surface it directly; they fold it
//! into the SM result vocabulary in `smc_defs`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Status {
    /// Nothing to do right now; retry later with the same arguments.
    #[error("operation should be retried")]
    ShouldWait,
    /// Operation invoked out of sequence.
    #[error("object is in the wrong state")]
    BadState,
    #[error("invalid arguments")]
    InvalidArgs,
    /// A blocking wait was released by cancellation.
    #[error("wait canceled")]
    Canceled,
    #[error("out of memory")]
    NoMemory,
    #[error("internal error")]
    Internal,
    #[error("object already exists")]
    AlreadyExists,
    #[error("not supported")]
    NotSupported,
    /// The handle lacks a right required by the operation.
    #[error("access denied")]
    AccessDenied,
}

impl Status {
    /// Raw kernel status value, as seen across the syscall boundary.
    pub const fn into_raw(self) -> i32 {
        match self {
            Status::Internal => -1,
            Status::NotSupported => -2,
            Status::NoMemory => -4,
            Status::InvalidArgs => -10,
            Status::BadState => -20,
            Status::ShouldWait => -22,
            Status::Canceled => -23,
            Status::AlreadyExists => -26,
            Status::AccessDenied => -30,
        }
    }

    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(Status::Internal),
            -2 => Some(Status::NotSupported),
            -4 => Some(Status::NoMemory),
            -10 => Some(Status::InvalidArgs),
            -20 => Some(Status::BadState),
            -22 => Some(Status::ShouldWait),
            -23 => Some(Status::Canceled),
            -26 => Some(Status::AlreadyExists),
            -30 => Some(Status::AccessDenied),
            _ => None,
        }
    }
}

/// Convert an operation result into the raw value returned by a syscall
/// (0 on success).
pub fn status_to_raw(result: Result<(), Status>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(status) => status.into_raw(),
    }
}
