//! SMC call numbers, entities and secure-monitor result codes
//!
//! Call-number layout (wire compatible with the secure monitor):
//!
//! ```text
//!  31   30   29..24   23..16     15..0
//! [FC][S64][ entity ][ (zero) ][ function ]
//! ```

use thiserror::Error;

pub const SMC_NUM_ENTITIES: usize = 64;
pub const SMC_NUM_ARGS: usize = 4;
pub const SMC_NUM_PARAMS: usize = SMC_NUM_ARGS - 1;

const FASTCALL_BIT: u32 = 0x8000_0000;
const SMC64_BIT: u32 = 0x4000_0000;
const ENTITY_MASK: u32 = 0x3F00_0000;
const ENTITY_SHIFT: u32 = 24;
const FUNCTION_MASK: u32 = 0x0000_FFFF;

// ── Entities ─────────────────────────────────────────────────────────
pub const SMC_ENTITY_ARCH: u32 = 0;
pub const SMC_ENTITY_CPU: u32 = 1;
pub const SMC_ENTITY_SIP: u32 = 2;
pub const SMC_ENTITY_OEM: u32 = 3;
pub const SMC_ENTITY_STD: u32 = 4;
pub const SMC_ENTITY_RESERVED: u32 = 5;
pub const SMC_ENTITY_TRUSTED_APP: u32 = 48;
pub const SMC_ENTITY_TRUSTED_OS: u32 = 50;
/// Secure -> non-secure logging
pub const SMC_ENTITY_LOGGING: u32 = 51;
/// Trusted OS calls internal to the secure monitor
pub const SMC_ENTITY_SECURE_MONITOR: u32 = 60;
/// Reserved for the shared-memory self-test
pub const SMC_ENTITY_TEST: u32 = 61;

#[inline]
pub const fn is_fastcall(smc_nr: u32) -> bool {
    smc_nr & FASTCALL_BIT != 0
}

#[inline]
pub const fn is_smc64(smc_nr: u32) -> bool {
    smc_nr & SMC64_BIT != 0
}

#[inline]
pub const fn entity(smc_nr: u32) -> u32 {
    (smc_nr & ENTITY_MASK) >> ENTITY_SHIFT
}

#[inline]
pub const fn function(smc_nr: u32) -> u32 {
    smc_nr & FUNCTION_MASK
}

/// Compose a call number. Out-of-range fields are truncated to their width.
pub const fn smc_nr(entity: u32, function: u32, fastcall: bool, smc64: bool) -> u32 {
    ((fastcall as u32) << 31)
        | ((smc64 as u32) << 30)
        | ((entity & 0x3F) << ENTITY_SHIFT)
        | (function & FUNCTION_MASK)
}

pub const fn fastcall_nr(entity: u32, function: u32) -> u32 {
    smc_nr(entity, function, true, false)
}

pub const fn stdcall_nr(entity: u32, function: u32) -> u32 {
    smc_nr(entity, function, false, false)
}

pub const fn fastcall64_nr(entity: u32, function: u32) -> u32 {
    smc_nr(entity, function, true, true)
}

pub const fn stdcall64_nr(entity: u32, function: u32) -> u32 {
    smc_nr(entity, function, false, true)
}

// ── Self-test calls ──────────────────────────────────────────────────
pub const SMC_SC_WRITE_SHM: u32 = stdcall_nr(SMC_ENTITY_TEST, 0);
pub const SMC_SC_VERIFY_SHM: u32 = stdcall_nr(SMC_ENTITY_TEST, 1);

// ── Secure monitor standard calls ────────────────────────────────────
pub const SMC_SC_RESTART_LAST: u32 = stdcall_nr(SMC_ENTITY_SECURE_MONITOR, 0);
pub const SMC_SC_LOCKED_NOP: u32 = stdcall_nr(SMC_ENTITY_SECURE_MONITOR, 1);
/// Re-enter the trusted OS after it returned `SM_ERR_FIQ_INTERRUPTED`.
pub const SMC_SC_RESTART_FIQ: u32 = stdcall_nr(SMC_ENTITY_SECURE_MONITOR, 2);
/// Enter the trusted OS to run pending work. Returns `SM_ERR_NOP_INTERRUPTED`
/// (repeat the call) or `SM_ERR_NOP_DONE`.
pub const SMC_SC_NOP: u32 = stdcall_nr(SMC_ENTITY_SECURE_MONITOR, 3);
/// Return from secure OS to non-secure OS with the return value in r1.
pub const SMC_SC_NS_RETURN: u32 = stdcall_nr(SMC_ENTITY_SECURE_MONITOR, 0);

// ── Secure monitor fast calls ────────────────────────────────────────
pub const SMC_FC_RESERVED: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 0);
pub const SMC_FC_FIQ_EXIT: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 1);
pub const SMC_FC_REQUEST_FIQ: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 2);
pub const SMC_FC_GET_NEXT_IRQ: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 3);
pub const SMC_FC_FIQ_ENTER: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 4);
pub const SMC_FC64_SET_FIQ_HANDLER: u32 = fastcall64_nr(SMC_ENTITY_SECURE_MONITOR, 5);
pub const SMC_FC64_GET_FIQ_REGS: u32 = fastcall64_nr(SMC_ENTITY_SECURE_MONITOR, 6);
pub const SMC_FC_CPU_SUSPEND: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 7);
pub const SMC_FC_CPU_RESUME: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 8);
pub const SMC_FC_AARCH_SWITCH: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 9);
pub const SMC_FC_GET_VERSION_STR: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 10);
pub const SMC_FC_API_VERSION: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 11);
pub const SMC_FC_FIQ_RESUME: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 12);
pub const SMC_FC_GET_STATIC_SHM_CONFIG: u32 = fastcall_nr(SMC_ENTITY_SECURE_MONITOR, 13);

pub const TRUSTY_API_VERSION_RESTART_FIQ: u32 = 1;
pub const TRUSTY_API_VERSION_SMP: u32 = 2;
pub const TRUSTY_API_VERSION_SMP_NOP: u32 = 3;
pub const TRUSTY_API_VERSION_CURRENT: u32 = 3;

/// `SMC_FC_GET_STATIC_SHM_CONFIG` selectors (passed in param 0)
pub const TRUSTY_SHM_PA: u64 = 1;
pub const TRUSTY_SHM_SIZE: u64 = 2;
pub const TRUSTY_SHM_USE_CACHE: u64 = 3;

// ── Trusted OS calls ─────────────────────────────────────────────────
pub const SMC_SC_VIRTIO_GET_DESCR: u32 = stdcall_nr(SMC_ENTITY_TRUSTED_OS, 20);
pub const SMC_SC_VIRTIO_START: u32 = stdcall_nr(SMC_ENTITY_TRUSTED_OS, 21);
pub const SMC_SC_VIRTIO_STOP: u32 = stdcall_nr(SMC_ENTITY_TRUSTED_OS, 22);
pub const SMC_SC_VDEV_RESET: u32 = stdcall_nr(SMC_ENTITY_TRUSTED_OS, 23);
pub const SMC_SC_VDEV_KICK_VQ: u32 = stdcall_nr(SMC_ENTITY_TRUSTED_OS, 24);
pub const SMC_NC_VDEV_KICK_VQ: u32 = stdcall_nr(SMC_ENTITY_TRUSTED_OS, 25);
pub const SMC_SC_CREATE_QL_TIPC_DEV: u32 = stdcall_nr(SMC_ENTITY_TRUSTED_OS, 30);
pub const SMC_SC_SHUTDOWN_QL_TIPC_DEV: u32 = stdcall_nr(SMC_ENTITY_TRUSTED_OS, 31);
pub const SMC_SC_HANDLE_QL_TIPC_DEV_CMD: u32 = stdcall_nr(SMC_ENTITY_TRUSTED_OS, 32);

// ── Result codes ─────────────────────────────────────────────────────
pub const SM_OK: i64 = 0;
/// Unknown SMC (ARM DEN 0028A)
pub const SM_ERR_UNDEFINED_SMC: i64 = -1;
pub const SM_ERR_INVALID_PARAMETERS: i64 = -2;
/// Got interrupted. Call back with restart SMC
pub const SM_ERR_INTERRUPTED: i64 = -3;
/// Got a restart SMC when we didn't expect it
pub const SM_ERR_UNEXPECTED_RESTART: i64 = -4;
/// Temporarily busy. Call back with original args
pub const SM_ERR_BUSY: i64 = -5;
/// Got a trusted_service SMC when a restart SMC is required
pub const SM_ERR_INTERLEAVED_SMC: i64 = -6;
pub const SM_ERR_INTERNAL_FAILURE: i64 = -7;
pub const SM_ERR_NOT_SUPPORTED: i64 = -8;
pub const SM_ERR_NOT_ALLOWED: i64 = -9;
pub const SM_ERR_END_OF_INPUT: i64 = -10;
/// Secure OS crashed
pub const SM_ERR_PANIC: i64 = -11;
/// Got interrupted by FIQ. Call back with SMC_SC_RESTART_FIQ on same CPU
pub const SM_ERR_FIQ_INTERRUPTED: i64 = -12;
/// SMC call waiting for another CPU
pub const SM_ERR_CPU_IDLE: i64 = -13;
/// Got interrupted. Call back with new SMC_SC_NOP
pub const SM_ERR_NOP_INTERRUPTED: i64 = -14;
/// CPU idle after SMC_SC_NOP (not an error)
pub const SM_ERR_NOP_DONE: i64 = -15;

/// Negative secure-monitor result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SmError {
    #[error("undefined SMC")]
    UndefinedSmc,
    #[error("invalid parameters")]
    InvalidParameters,
    #[error("interrupted, restart required")]
    Interrupted,
    #[error("unexpected restart")]
    UnexpectedRestart,
    #[error("busy, retry with original arguments")]
    Busy,
    #[error("interleaved SMC")]
    InterleavedSmc,
    #[error("internal failure")]
    InternalFailure,
    #[error("not supported")]
    NotSupported,
    #[error("not allowed")]
    NotAllowed,
    #[error("end of input")]
    EndOfInput,
    #[error("secure OS panic")]
    Panic,
    #[error("interrupted by FIQ")]
    FiqInterrupted,
    #[error("CPU idle")]
    CpuIdle,
    #[error("NOP interrupted")]
    NopInterrupted,
    #[error("NOP done")]
    NopDone,
}

impl SmError {
    pub const fn code(self) -> i64 {
        match self {
            SmError::UndefinedSmc => SM_ERR_UNDEFINED_SMC,
            SmError::InvalidParameters => SM_ERR_INVALID_PARAMETERS,
            SmError::Interrupted => SM_ERR_INTERRUPTED,
            SmError::UnexpectedRestart => SM_ERR_UNEXPECTED_RESTART,
            SmError::Busy => SM_ERR_BUSY,
            SmError::InterleavedSmc => SM_ERR_INTERLEAVED_SMC,
            SmError::InternalFailure => SM_ERR_INTERNAL_FAILURE,
            SmError::NotSupported => SM_ERR_NOT_SUPPORTED,
            SmError::NotAllowed => SM_ERR_NOT_ALLOWED,
            SmError::EndOfInput => SM_ERR_END_OF_INPUT,
            SmError::Panic => SM_ERR_PANIC,
            SmError::FiqInterrupted => SM_ERR_FIQ_INTERRUPTED,
            SmError::CpuIdle => SM_ERR_CPU_IDLE,
            SmError::NopInterrupted => SM_ERR_NOP_INTERRUPTED,
            SmError::NopDone => SM_ERR_NOP_DONE,
        }
    }

    /// Decode a result value. Non-negative values are not errors.
    ///
    /// The undefined-call code is also accepted in its 32-bit form
    /// (`0xFFFF_FFFF`), which is how firmware reports it in `w0`.
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            SM_ERR_UNDEFINED_SMC | 0xFFFF_FFFF => Some(SmError::UndefinedSmc),
            SM_ERR_INVALID_PARAMETERS => Some(SmError::InvalidParameters),
            SM_ERR_INTERRUPTED => Some(SmError::Interrupted),
            SM_ERR_UNEXPECTED_RESTART => Some(SmError::UnexpectedRestart),
            SM_ERR_BUSY => Some(SmError::Busy),
            SM_ERR_INTERLEAVED_SMC => Some(SmError::InterleavedSmc),
            SM_ERR_INTERNAL_FAILURE => Some(SmError::InternalFailure),
            SM_ERR_NOT_SUPPORTED => Some(SmError::NotSupported),
            SM_ERR_NOT_ALLOWED => Some(SmError::NotAllowed),
            SM_ERR_END_OF_INPUT => Some(SmError::EndOfInput),
            SM_ERR_PANIC => Some(SmError::Panic),
            SM_ERR_FIQ_INTERRUPTED => Some(SmError::FiqInterrupted),
            SM_ERR_CPU_IDLE => Some(SmError::CpuIdle),
            SM_ERR_NOP_INTERRUPTED => Some(SmError::NopInterrupted),
            SM_ERR_NOP_DONE => Some(SmError::NopDone),
            _ => None,
        }
    }

    /// Whether the caller is expected to issue another call: the same call
    /// for `Busy`, a restart call for the interrupted variants.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            SmError::Busy
                | SmError::Interrupted
                | SmError::FiqInterrupted
                | SmError::NopInterrupted
        )
    }

    /// `NopDone` reports an idle CPU, not a failure.
    pub const fn is_error(self) -> bool {
        !matches!(self, SmError::NopDone)
    }
}

/// Arguments of one trapped SMC: the call number and three parameter words.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmcArgs {
    pub smc_nr: u32,
    pub params: [u64; SMC_NUM_PARAMS],
}

impl SmcArgs {
    pub const fn new(smc_nr: u32, params: [u64; SMC_NUM_PARAMS]) -> Self {
        Self { smc_nr, params }
    }

    /// Capture from trap registers x0..x3. The call number lives in w0.
    pub const fn from_regs(regs: &[u64; SMC_NUM_ARGS]) -> Self {
        Self {
            smc_nr: regs[0] as u32,
            params: [regs[1], regs[2], regs[3]],
        }
    }

    pub const fn entity(&self) -> u32 {
        entity(self.smc_nr)
    }

    pub const fn function(&self) -> u32 {
        function(self.smc_nr)
    }

    pub const fn is_fastcall(&self) -> bool {
        is_fastcall(self.smc_nr)
    }

    pub const fn is_smc64(&self) -> bool {
        is_smc64(self.smc_nr)
    }
}
