//! Shared fixtures for the integration tests.
//!
//! `HeapShm` stands in for the non-secure shared-memory window: a leaked
//! heap buffer that "physical" addresses starting at `phys_base` map onto.
//! Clones share the buffer and the counters, so a test can keep one copy
//! and hand another to the registry.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use smc_dispatch::monitor::SecureMonitor;
use smc_dispatch::shm::{ShmInfo, ShmMapper};
use smc_dispatch::{RegistryConfig, SmcArgs, SmcRegistry, Status};

pub const SHM_BASE: u64 = 0x4200_0000;
pub const SHM_SIZE: u64 = 0x2000;

#[derive(Clone)]
pub struct HeapShm {
    phys_base: u64,
    va: usize,
    len: usize,
    maps: Arc<AtomicUsize>,
    unmaps: Arc<AtomicUsize>,
    last_cached: Arc<AtomicBool>,
    fail: Arc<AtomicBool>,
}

impl HeapShm {
    pub fn new(phys_base: u64, len: usize) -> Self {
        let buf: &'static mut [u8] = Box::leak(vec![0u8; len].into_boxed_slice());
        Self {
            phys_base,
            va: buf.as_mut_ptr() as usize,
            len,
            maps: Arc::new(AtomicUsize::new(0)),
            unmaps: Arc::new(AtomicUsize::new(0)),
            last_cached: Arc::new(AtomicBool::new(false)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn info(&self, use_cache: bool) -> ShmInfo {
        ShmInfo {
            base_phys: self.phys_base,
            size: self.len as u64,
            use_cache,
        }
    }

    pub fn read(&self, offset: usize) -> u8 {
        assert!(offset < self.len);
        unsafe { std::ptr::read_volatile((self.va + offset) as *const u8) }
    }

    pub fn write(&self, offset: usize, value: u8) {
        assert!(offset < self.len);
        unsafe { std::ptr::write_volatile((self.va + offset) as *mut u8, value) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn maps(&self) -> usize {
        self.maps.load(Ordering::SeqCst)
    }

    pub fn unmaps(&self) -> usize {
        self.unmaps.load(Ordering::SeqCst)
    }

    pub fn last_cached(&self) -> bool {
        self.last_cached.load(Ordering::SeqCst)
    }

    pub fn fail_maps(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ShmMapper for HeapShm {
    fn map(&self, base_phys: u64, size: usize, cached: bool) -> Result<usize, Status> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Status::NoMemory);
        }
        let offset = base_phys
            .checked_sub(self.phys_base)
            .ok_or(Status::InvalidArgs)? as usize;
        if offset + size > self.len {
            return Err(Status::InvalidArgs);
        }
        self.maps.fetch_add(1, Ordering::SeqCst);
        self.last_cached.store(cached, Ordering::SeqCst);
        Ok(self.va + offset)
    }

    fn unmap(&self, _va: usize, _size: usize) {
        self.unmaps.fetch_add(1, Ordering::SeqCst);
    }
}

/// Secure monitor that always reports the same answer.
pub struct FixedMonitor(pub Result<ShmInfo, Status>);

impl SecureMonitor for FixedMonitor {
    fn shm_config(&self) -> Result<ShmInfo, Status> {
        self.0
    }
}

pub fn registry_with(config: RegistryConfig, shm: &HeapShm, use_cache: bool) -> SmcRegistry {
    SmcRegistry::new(
        config,
        Box::new(FixedMonitor(Ok(shm.info(use_cache)))),
        Box::new(shm.clone()),
    )
}

/// Registry over a fresh `SHM_SIZE` window with `cpus` CPUs.
pub fn registry(cpus: usize) -> (SmcRegistry, HeapShm) {
    let shm = HeapShm::new(SHM_BASE, SHM_SIZE as usize);
    let reg = registry_with(RegistryConfig::new(cpus), &shm, false);
    (reg, shm)
}

pub fn args(smc_nr: u32, a: u64, b: u64, c: u64) -> SmcArgs {
    SmcArgs::new(smc_nr, [a, b, c])
}

/// Spin until `cond` holds. Panics after a generous bound so a broken
/// rendezvous fails the test instead of hanging it.
pub fn spin_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..50_000_000u64 {
        if cond() {
            return;
        }
        std::thread::yield_now();
    }
    panic!("condition never became true");
}
