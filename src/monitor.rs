//! Secure monitor conduit
//!
//! Source of the shared-memory geometry the SMC object is created over.
//! On hardware the trusted OS reports it through
//! `SMC_FC_GET_STATIC_SHM_CONFIG`; boards without that call use a static
//! window from the board config or the DTB.

use crate::error::Status;
use crate::shm::ShmInfo;
use crate::smc_defs::{SmError, TRUSTY_SHM_PA, TRUSTY_SHM_SIZE, TRUSTY_SHM_USE_CACHE};

pub trait SecureMonitor: Send + Sync {
    /// Query the non-secure shared-memory window.
    fn shm_config(&self) -> Result<ShmInfo, Status>;
}

/// Result of an SMC to EL3 (x0-x3).
#[derive(Debug, Clone, Copy)]
pub struct SmcResult {
    pub x0: u64,
    pub x1: u64,
    pub x2: u64,
    pub x3: u64,
}

/// Issue an SMC to EL3 with x0-x3 as arguments and return x0-x3.
///
/// The caller must ensure the arguments are valid for the target SMC
/// function; unknown calls on some firmware fault instead of returning
/// `SM_ERR_UNDEFINED_SMC`.
#[cfg(target_arch = "aarch64")]
#[inline(never)]
pub fn call_smc(x0: u64, x1: u64, x2: u64, x3: u64) -> SmcResult {
    let r0: u64;
    let r1: u64;
    let r2: u64;
    let r3: u64;
    unsafe {
        core::arch::asm!(
            "smc #0",
            inout("x0") x0 => r0,
            inout("x1") x1 => r1,
            inout("x2") x2 => r2,
            inout("x3") x3 => r3,
            // x4-x17 may be clobbered by the SMC call per SMCCC
            lateout("x4") _,
            lateout("x5") _,
            lateout("x6") _,
            lateout("x7") _,
            lateout("x8") _,
            lateout("x9") _,
            lateout("x10") _,
            lateout("x11") _,
            lateout("x12") _,
            lateout("x13") _,
            lateout("x14") _,
            lateout("x15") _,
            lateout("x16") _,
            lateout("x17") _,
            options(nomem, nostack),
        );
    }
    SmcResult {
        x0: r0,
        x1: r1,
        x2: r2,
        x3: r3,
    }
}

/// Split a `SMC_FC_GET_STATIC_SHM_CONFIG` return value into data or error.
///
/// An error is either a sign-extended 64-bit `SM_ERR_*` or, with the upper
/// word clear, a 32-bit one in w0. The 32-bit form is ambiguous for
/// `TRUSTY_SHM_SIZE` (`0xFFFF_FFF9` is a representable size), so for that
/// selector only the 64-bit form counts. A monitor without the call fails
/// the `TRUSTY_SHM_PA` query first, where no error code is a page-aligned
/// address.
pub fn decode_query(selector: u64, x0: u64) -> Result<u64, SmError> {
    let wide = x0 as i64;
    if wide < 0 {
        if let Some(err) = SmError::from_code(wide) {
            return Err(err);
        }
    }
    if selector != TRUSTY_SHM_SIZE && x0 >> 32 == 0 {
        if let Some(err) = SmError::from_code(x0 as u32 as i32 as i64) {
            return Err(err);
        }
    }
    Ok(x0)
}

/// Queries the trusted OS through real fast calls.
pub struct SmcConduit;

impl SmcConduit {
    #[cfg(target_arch = "aarch64")]
    fn query(selector: u64) -> Result<u64, Status> {
        use crate::smc_defs::SMC_FC_GET_STATIC_SHM_CONFIG;

        let res = call_smc(SMC_FC_GET_STATIC_SHM_CONFIG as u64, selector, 0, 0);
        decode_query(selector, res.x0).map_err(|err| {
            log::error!("smc: shm config query {} failed: {}", selector, err);
            Status::Internal
        })
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn query(_selector: u64) -> Result<u64, Status> {
        Err(Status::NotSupported)
    }
}

impl SecureMonitor for SmcConduit {
    fn shm_config(&self) -> Result<ShmInfo, Status> {
        Ok(ShmInfo {
            base_phys: Self::query(TRUSTY_SHM_PA)?,
            size: Self::query(TRUSTY_SHM_SIZE)?,
            use_cache: Self::query(TRUSTY_SHM_USE_CACHE)? != 0,
        })
    }
}

/// Fixed window, from the board config or the DTB.
pub struct StaticShmConfig(pub ShmInfo);

impl StaticShmConfig {
    /// QEMU TrustZone board layout.
    pub const fn board_default() -> Self {
        Self(ShmInfo {
            base_phys: crate::platform::NS_SHM_BASE,
            size: crate::platform::NS_SHM_SIZE,
            use_cache: crate::platform::NS_SHM_USE_CACHE,
        })
    }

    /// Window from the host DTB if it describes one, board default otherwise.
    pub fn from_platform() -> Self {
        match crate::dtb::platform_info().ns_shm {
            Some(info) => Self(info),
            None => Self::board_default(),
        }
    }
}

impl SecureMonitor for StaticShmConfig {
    fn shm_config(&self) -> Result<ShmInfo, Status> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_query_errors() {
        // Sign-extended 64-bit error for any selector
        assert_eq!(
            decode_query(TRUSTY_SHM_SIZE, (-1i64) as u64),
            Err(SmError::UndefinedSmc)
        );
        // 32-bit error in w0 with the upper word clear
        assert_eq!(
            decode_query(TRUSTY_SHM_PA, 0xFFFF_FFFF),
            Err(SmError::UndefinedSmc)
        );
        assert_eq!(
            decode_query(TRUSTY_SHM_USE_CACHE, 0xFFFF_FFF9),
            Err(SmError::InternalFailure)
        );
    }

    #[test]
    fn test_decode_query_values() {
        assert_eq!(decode_query(TRUSTY_SHM_PA, 0x4200_0000), Ok(0x4200_0000));
        assert_eq!(decode_query(TRUSTY_SHM_PA, 0x1_FFFF_F000), Ok(0x1_FFFF_F000));
        assert_eq!(decode_query(TRUSTY_SHM_USE_CACHE, 1), Ok(1));
        // A size whose low word looks like an error code is still a size
        assert_eq!(decode_query(TRUSTY_SHM_SIZE, 0xFFFF_FFF9), Ok(0xFFFF_FFF9));
        assert_eq!(decode_query(TRUSTY_SHM_SIZE, 0xFFFF_FFFF), Ok(0xFFFF_FFFF));
        assert_eq!(decode_query(TRUSTY_SHM_SIZE, 0x50_0000), Ok(0x50_0000));
    }
}
