//! Platform/Board Constants (QEMU virt machine with TrustZone)
//!
//! Defaults used until (or unless) the host DTB overrides them.

// ── Memory ───────────────────────────────────────────────────────────
pub const PAGE_SIZE_SHIFT: u32 = 12;
pub const PAGE_SIZE: u64 = 1 << PAGE_SIZE_SHIFT;

// ── UART (PL011) ─────────────────────────────────────────────────────
pub const UART_BASE: usize = 0x0900_0000;

// ── CPUs ─────────────────────────────────────────────────────────────
pub const DEFAULT_NUM_CPUS: usize = 4;
/// Upper bound accepted from the DTB; MPIDR Aff0 is 8 bits.
pub const MAX_CPUS: usize = 256;

// ── Non-secure shared memory ─────────────────────────────────────────
// Chosen so it does not overlap the initial load location of the kernel,
// DTB and initrd.
pub const NS_SHM_BASE: u64 = 0x4000_0000 + 0x200_0000;
pub const NS_SHM_SIZE: u64 = 0x50_0000;
pub const NS_SHM_USE_CACHE: bool = true;
