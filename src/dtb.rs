//! Host DTB (Device Tree Blob) runtime parsing
//!
//! Discovers what the SMC registry needs from the platform: the CPU count
//! that sizes the NOP channel, the PL011 used for logging, and the
//! non-secure shared-memory window when the board describes one with a
//! `trusty,ns-shm` node:
//!
//! ```text
//! trusty-shm@42000000 {
//!     compatible = "trusty,ns-shm";
//!     reg = <0x0 0x42000000 0x0 0x500000>;
//!     cacheable;
//! };
//! ```
//!
//! The `fdt` crate does zero-copy parsing, so this works before the heap is up.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::platform::{DEFAULT_NUM_CPUS, MAX_CPUS, UART_BASE};
use crate::shm::ShmInfo;

const FDT_MAGIC: u32 = 0xD00D_FEED;

/// Runtime-discovered platform information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformInfo {
    /// UART (PL011) base address
    pub uart_base: u64,
    /// Number of CPUs discovered from /cpus
    pub num_cpus: usize,
    /// Non-secure shared-memory window, if the DTB has one
    pub ns_shm: Option<ShmInfo>,
}

impl PlatformInfo {
    /// Board defaults from `platform.rs`.
    pub const DEFAULT: Self = Self {
        uart_base: UART_BASE as u64,
        num_cpus: DEFAULT_NUM_CPUS,
        ns_shm: None,
    };
}

impl Default for PlatformInfo {
    fn default() -> Self {
        Self::DEFAULT
    }
}

struct PlatformInfoCell {
    inner: UnsafeCell<PlatformInfo>,
    initialized: AtomicBool,
}

// Safety: Written once during single-threaded boot, read-only after.
unsafe impl Sync for PlatformInfoCell {}

static PLATFORM_INFO: PlatformInfoCell = PlatformInfoCell {
    inner: UnsafeCell::new(PlatformInfo::DEFAULT),
    initialized: AtomicBool::new(false),
};

/// Initialize platform info from the DTB at `dtb_addr`. Called once during
/// boot, before any other CPU is up.
///
/// If the address is implausible or parsing fails the board defaults stay.
pub fn init(dtb_addr: usize) {
    if let Some(info) = parse_at(dtb_addr) {
        unsafe { *PLATFORM_INFO.inner.get() = info };
        PLATFORM_INFO.initialized.store(true, Ordering::Release);
    }
}

/// Returns true if a DTB was successfully parsed.
pub fn is_initialized() -> bool {
    PLATFORM_INFO.initialized.load(Ordering::Acquire)
}

/// Always available; board defaults if no DTB was parsed.
pub fn platform_info() -> &'static PlatformInfo {
    unsafe { &*PLATFORM_INFO.inner.get() }
}

fn validate_dtb_address(addr: usize) -> bool {
    if addr == 0 {
        return false;
    }
    // QEMU virt RAM range
    if !(0x4000_0000..0x8000_0000).contains(&addr) {
        return false;
    }
    let magic = unsafe { core::ptr::read_volatile(addr as *const u32) };
    u32::from_be(magic) == FDT_MAGIC
}

fn parse_at(dtb_addr: usize) -> Option<PlatformInfo> {
    if !validate_dtb_address(dtb_addr) {
        return None;
    }
    let fdt = unsafe { fdt::Fdt::from_ptr(dtb_addr as *const u8).ok()? };
    Some(extract(&fdt))
}

/// Parse a DTB held in memory. Returns `None` if it is not a valid blob.
pub fn parse(bytes: &[u8]) -> Option<PlatformInfo> {
    let fdt = fdt::Fdt::new(bytes).ok()?;
    Some(extract(&fdt))
}

fn extract(fdt: &fdt::Fdt<'_>) -> PlatformInfo {
    let mut info = PlatformInfo::DEFAULT;

    if let Some(uart) = fdt.find_compatible(&["arm,pl011"]) {
        if let Some(reg) = uart.reg().and_then(|mut regs| regs.next()) {
            info.uart_base = reg.starting_address as u64;
        }
    }

    let cpu_count = fdt.cpus().count();
    if cpu_count > 0 {
        info.num_cpus = cpu_count.min(MAX_CPUS);
    }

    if let Some(shm) = fdt.find_compatible(&["trusty,ns-shm"]) {
        if let Some(reg) = shm.reg().and_then(|mut regs| regs.next()) {
            info.ns_shm = Some(ShmInfo {
                base_phys: reg.starting_address as u64,
                size: reg.size.unwrap_or(0) as u64,
                use_cache: shm.property("cacheable").is_some(),
            });
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse(&[0u8; 64]), None);
        assert_eq!(parse(&[]), None);
    }

    #[test]
    fn test_defaults_without_dtb() {
        assert!(!is_initialized());
        let info = platform_info();
        assert_eq!(info.num_cpus, DEFAULT_NUM_CPUS);
        assert_eq!(info.uart_base, UART_BASE as u64);
        assert!(info.ns_shm.is_none());
    }

    #[test]
    fn test_init_ignores_null_address() {
        init(0);
        assert!(!is_initialized());
    }
}
