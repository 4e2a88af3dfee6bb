/// Read current physical CPU ID from MPIDR_EL1.Aff0
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn current_cpu_id() -> usize {
    let mpidr: u64;
    unsafe { core::arch::asm!("mrs {}, MPIDR_EL1", out(reg) mpidr) };
    (mpidr & 0xFF) as usize
}

/// Non-ARM builds (host tests) run everything as CPU 0.
#[cfg(not(target_arch = "aarch64"))]
#[inline(always)]
pub fn current_cpu_id() -> usize {
    0
}
