//! Shared-memory self-test entity, driven through the registry the way
//! firmware would.

mod common;

use smc_dispatch::self_test::{self, verify_pattern, write_pattern, ShmMismatch};
use smc_dispatch::shm::ShmMapping;
use smc_dispatch::smc_defs::{
    stdcall_nr, SMC_ENTITY_TEST, SMC_SC_VERIFY_SHM, SMC_SC_WRITE_SHM, SM_ERR_INTERNAL_FAILURE,
    SM_ERR_UNDEFINED_SMC, SM_OK,
};
use smc_dispatch::{RegistryConfig, SmcRegistry};

use common::{args, registry_with, HeapShm, SHM_BASE, SHM_SIZE};

fn self_test_registry() -> (SmcRegistry, HeapShm) {
    let shm = HeapShm::new(SHM_BASE, SHM_SIZE as usize);
    let reg = registry_with(RegistryConfig::new(1).with_self_test(true), &shm, false);
    (reg, shm)
}

/// What the trusted OS does between the two calls.
fn secure_side_transform(shm: &HeapShm) {
    for i in 0..shm.len() {
        assert_eq!(shm.read(i), write_pattern(i), "byte {i} after write");
        shm.write(i, shm.read(i) ^ 0xaa);
    }
}

#[test]
fn test_write_then_verify() {
    let (reg, shm) = self_test_registry();
    let (_smc, _vmo) = reg.create(0).unwrap();

    assert_eq!(reg.route(&args(SMC_SC_WRITE_SHM, 0, 0, 0)), SM_OK);
    assert_eq!(shm.read(0), 0xaa);
    assert_eq!(shm.read(0x155), 0xff);

    secure_side_transform(&shm);
    assert_eq!(reg.route(&args(SMC_SC_VERIFY_SHM, 0, 0, 0)), SM_OK);

    // Every mapping was torn down again
    assert_eq!(shm.maps(), 2);
    assert_eq!(shm.unmaps(), 2);
    assert!(!shm.last_cached());
}

#[test]
fn test_verify_detects_single_corrupt_byte() {
    let (reg, shm) = self_test_registry();
    let (_smc, _vmo) = reg.create(0).unwrap();

    assert_eq!(reg.route(&args(SMC_SC_WRITE_SHM, 0, 0, 0)), SM_OK);
    secure_side_transform(&shm);
    shm.write(0x1234, verify_pattern(0x1234) ^ 1);
    assert_eq!(reg.route(&args(SMC_SC_VERIFY_SHM, 0, 0, 0)), SM_ERR_INTERNAL_FAILURE);
}

#[test]
fn test_verify_without_transform_fails() {
    let (reg, _shm) = self_test_registry();
    let (_smc, _vmo) = reg.create(0).unwrap();

    assert_eq!(reg.route(&args(SMC_SC_WRITE_SHM, 0, 0, 0)), SM_OK);
    assert_eq!(reg.route(&args(SMC_SC_VERIFY_SHM, 0, 0, 0)), SM_ERR_INTERNAL_FAILURE);
}

#[test]
fn test_mapping_failure() {
    let (reg, shm) = self_test_registry();
    let (_smc, _vmo) = reg.create(0).unwrap();

    shm.fail_maps(true);
    assert_eq!(reg.route(&args(SMC_SC_WRITE_SHM, 0, 0, 0)), SM_ERR_INTERNAL_FAILURE);
    assert_eq!(reg.route(&args(SMC_SC_VERIFY_SHM, 0, 0, 0)), SM_ERR_INTERNAL_FAILURE);
    assert_eq!(shm.maps(), 0);
}

#[test]
fn test_unknown_test_function() {
    let (reg, _shm) = self_test_registry();
    let (_smc, _vmo) = reg.create(0).unwrap();
    let nr = stdcall_nr(SMC_ENTITY_TEST, 7);
    assert_eq!(reg.route(&args(nr, 0, 0, 0)), SM_ERR_UNDEFINED_SMC);
}

#[test]
fn test_cached_window_is_mapped_cached() {
    let shm = HeapShm::new(SHM_BASE, SHM_SIZE as usize);
    let reg = registry_with(RegistryConfig::new(1).with_self_test(true), &shm, true);
    let (_smc, _vmo) = reg.create(0).unwrap();

    assert_eq!(reg.route(&args(SMC_SC_WRITE_SHM, 0, 0, 0)), SM_OK);
    assert!(shm.last_cached());
}

#[test]
fn test_check_reports_first_mismatch() {
    let shm = HeapShm::new(SHM_BASE, 0x300);
    let mapping = ShmMapping::new(&shm, SHM_BASE, shm.len(), false).unwrap();

    self_test::fill(&mapping);
    assert_eq!(
        self_test::check(&mapping),
        Err(ShmMismatch { offset: 0, found: 0xaa, expected: 0 })
    );

    for i in 0..shm.len() {
        shm.write(i, verify_pattern(i));
    }
    assert_eq!(self_test::check(&mapping), Ok(()));

    shm.write(0x2ff, 0);
    shm.write(0x180, 0);
    assert_eq!(
        self_test::check(&mapping),
        Err(ShmMismatch { offset: 0x180, found: 0, expected: 0x80 })
    );
}
