//! Shared-memory self-test entity
//!
//! `SMC_SC_WRITE_SHM` fills the window with `(i & 0xff) ^ 0xaa`. The trusted
//! OS checks that pattern and writes `i & 0xff` back, which
//! `SMC_SC_VERIFY_SHM` then checks. Either call reports
//! `SM_ERR_INTERNAL_FAILURE` on a mapping failure or a mismatch.

use log::error;

use crate::shm::{ShmInfo, ShmMapper, ShmMapping};
use crate::smc_defs::{
    SmcArgs, SM_ERR_INTERNAL_FAILURE, SM_ERR_UNDEFINED_SMC, SM_OK, SMC_SC_VERIFY_SHM,
    SMC_SC_WRITE_SHM,
};

const WRITE_XOR: u8 = 0xaa;

/// First byte that did not hold the expected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShmMismatch {
    pub offset: usize,
    pub found: u8,
    pub expected: u8,
}

#[inline]
pub const fn write_pattern(offset: usize) -> u8 {
    (offset & 0xff) as u8 ^ WRITE_XOR
}

#[inline]
pub const fn verify_pattern(offset: usize) -> u8 {
    (offset & 0xff) as u8
}

fn map_shm<'a>(mapper: &'a dyn ShmMapper, info: &ShmInfo) -> Option<ShmMapping<'a>> {
    let len = usize::try_from(info.size).ok()?;
    match ShmMapping::new(mapper, info.base_phys, len, info.use_cache) {
        Ok(mapping) => Some(mapping),
        Err(status) => {
            error!("smc: failed to map shm into kernel address space: {}", status);
            None
        }
    }
}

pub fn fill(mapping: &ShmMapping<'_>) {
    let mut offset = 0;
    while mapping.write_u8(offset, write_pattern(offset)).is_ok() {
        offset += 1;
    }
}

pub fn check(mapping: &ShmMapping<'_>) -> Result<(), ShmMismatch> {
    let mut offset = 0;
    while let Ok(found) = mapping.read_u8(offset) {
        let expected = verify_pattern(offset);
        if found != expected {
            return Err(ShmMismatch { offset, found, expected });
        }
        offset += 1;
    }
    Ok(())
}

fn write_shm(mapper: &dyn ShmMapper, info: &ShmInfo) -> i64 {
    let Some(mapping) = map_shm(mapper, info) else {
        return SM_ERR_INTERNAL_FAILURE;
    };
    fill(&mapping);
    SM_OK
}

fn verify_shm(mapper: &dyn ShmMapper, info: &ShmInfo) -> i64 {
    let Some(mapping) = map_shm(mapper, info) else {
        return SM_ERR_INTERNAL_FAILURE;
    };
    match check(&mapping) {
        Ok(()) => SM_OK,
        Err(m) => {
            error!(
                "smc: shm[{}] {:#04x}, expected {:#04x}",
                m.offset, m.found, m.expected
            );
            SM_ERR_INTERNAL_FAILURE
        }
    }
}

/// Handle a call addressed to `SMC_ENTITY_TEST`. Assumes nobody else
/// touches the window while it runs.
pub fn invoke(args: &SmcArgs, mapper: &dyn ShmMapper, info: &ShmInfo) -> i64 {
    match args.smc_nr {
        SMC_SC_WRITE_SHM => write_shm(mapper, info),
        SMC_SC_VERIFY_SHM => verify_shm(mapper, info),
        _ => SM_ERR_UNDEFINED_SMC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_are_inverse() {
        for i in 0..512usize {
            assert_eq!(write_pattern(i) ^ WRITE_XOR, verify_pattern(i));
        }
        assert_eq!(write_pattern(0), 0xaa);
        assert_eq!(verify_pattern(0x1ff), 0xff);
    }
}
