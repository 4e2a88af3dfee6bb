//! Non-secure shared memory
//!
//! The shared-memory window is negotiated with the trusted OS once, when the
//! SMC object is created. User space sees it as a physically backed VMO;
//! the kernel maps it on demand through a `ShmMapper` (the self-test does).

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::error::Status;
use crate::platform::PAGE_SIZE;
use crate::sync::SpinLock;

/// Geometry of the shared-memory window as reported by the secure monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShmInfo {
    pub base_phys: u64,
    /// Size in bytes as reported, before page rounding.
    pub size: u64,
    pub use_cache: bool,
}

/// Round up to the platform page size. `None` on overflow.
pub const fn round_up_page(size: u64) -> Option<u64> {
    match size.checked_add(PAGE_SIZE - 1) {
        Some(s) => Some(s & !(PAGE_SIZE - 1)),
        None => None,
    }
}

pub const fn is_page_aligned(value: u64) -> bool {
    value & (PAGE_SIZE - 1) == 0
}

// ── Mapping ──────────────────────────────────────────────────────────

/// Maps physical ranges into the kernel address space.
pub trait ShmMapper: Send + Sync {
    /// Map `size` bytes at `base_phys` read/write, non-secure. Returns the
    /// virtual address of the first byte.
    fn map(&self, base_phys: u64, size: usize, cached: bool) -> Result<usize, Status>;

    fn unmap(&self, va: usize, size: usize);
}

/// Kernel linear map: `va = pa + offset`. Offset 0 is an identity map.
pub struct LinearMapper {
    phys_to_virt: usize,
}

impl LinearMapper {
    pub const fn new(phys_to_virt: usize) -> Self {
        Self { phys_to_virt }
    }
}

impl ShmMapper for LinearMapper {
    fn map(&self, base_phys: u64, size: usize, _cached: bool) -> Result<usize, Status> {
        let base = usize::try_from(base_phys).map_err(|_| Status::InvalidArgs)?;
        let va = base
            .checked_add(self.phys_to_virt)
            .ok_or(Status::InvalidArgs)?;
        va.checked_add(size).ok_or(Status::InvalidArgs)?;
        Ok(va)
    }

    fn unmap(&self, _va: usize, _size: usize) {}
}

/// A live kernel mapping; unmapped on drop.
pub struct ShmMapping<'a> {
    mapper: &'a dyn ShmMapper,
    va: usize,
    len: usize,
    pin: Option<&'a AtomicUsize>,
}

impl<'a> ShmMapping<'a> {
    /// Map a raw physical window.
    pub fn new(
        mapper: &'a dyn ShmMapper,
        base_phys: u64,
        len: usize,
        cached: bool,
    ) -> Result<Self, Status> {
        let va = mapper.map(base_phys, len, cached)?;
        Ok(Self { mapper, va, len, pin: None })
    }

    pub fn va(&self) -> usize {
        self.va
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The other world may touch this memory at any time, so every access
    /// is volatile. Offsets past the end are `InvalidArgs`.
    pub fn write_u8(&self, offset: usize, value: u8) -> Result<(), Status> {
        if offset >= self.len {
            return Err(Status::InvalidArgs);
        }
        unsafe { core::ptr::write_volatile((self.va + offset) as *mut u8, value) };
        Ok(())
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, Status> {
        if offset >= self.len {
            return Err(Status::InvalidArgs);
        }
        Ok(unsafe { core::ptr::read_volatile((self.va + offset) as *const u8) })
    }
}

impl Drop for ShmMapping<'_> {
    fn drop(&mut self) {
        self.mapper.unmap(self.va, self.len);
        if let Some(pin) = self.pin {
            pin.fetch_sub(1, Ordering::Release);
        }
    }
}

// ── Physical VMO ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Uncached,
    Cached,
}

static NEXT_VMO_KOID: AtomicU64 = AtomicU64::new(1);

/// A memory object over a fixed physical range.
pub struct PhysicalVmo {
    koid: u64,
    base_phys: u64,
    size: u64,
    cache_policy: SpinLock<CachePolicy>,
    mappings: AtomicUsize,
}

impl PhysicalVmo {
    /// Both `base_phys` and `size` must be page aligned and the range must
    /// not wrap.
    pub fn create(base_phys: u64, size: u64) -> Result<Arc<Self>, Status> {
        if size == 0 || !is_page_aligned(base_phys) || !is_page_aligned(size) {
            return Err(Status::InvalidArgs);
        }
        base_phys.checked_add(size).ok_or(Status::InvalidArgs)?;

        Ok(Arc::new(Self {
            koid: NEXT_VMO_KOID.fetch_add(1, Ordering::Relaxed),
            base_phys,
            size,
            cache_policy: SpinLock::new(CachePolicy::Uncached),
            mappings: AtomicUsize::new(0),
        }))
    }

    pub fn koid(&self) -> u64 {
        self.koid
    }

    pub fn base_phys(&self) -> u64 {
        self.base_phys
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn cache_policy(&self) -> CachePolicy {
        *self.cache_policy.lock()
    }

    /// Change the mapping cache policy. Refused with `BadState` while any
    /// mapping is live.
    pub fn set_cache_policy(&self, policy: CachePolicy) -> Result<(), Status> {
        let mut current = self.cache_policy.lock();
        if self.mappings.load(Ordering::Acquire) != 0 {
            return Err(Status::BadState);
        }
        *current = policy;
        Ok(())
    }

    /// Map `[offset, offset + len)` of the object through `mapper`.
    pub fn map<'a>(
        &'a self,
        mapper: &'a dyn ShmMapper,
        offset: u64,
        len: usize,
    ) -> Result<ShmMapping<'a>, Status> {
        let end = offset
            .checked_add(len as u64)
            .ok_or(Status::InvalidArgs)?;
        if len == 0 || end > self.size {
            return Err(Status::InvalidArgs);
        }
        // Hold the policy lock so set_cache_policy cannot race the pin.
        let policy = self.cache_policy.lock();
        let va = mapper.map(self.base_phys + offset, len, *policy == CachePolicy::Cached)?;
        self.mappings.fetch_add(1, Ordering::AcqRel);
        drop(policy);
        Ok(ShmMapping {
            mapper,
            va,
            len,
            pin: Some(&self.mappings),
        })
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.load(Ordering::Acquire)
    }
}
