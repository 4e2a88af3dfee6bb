//! SMC dispatch core for a trusted-OS kernel.
//!
//! Secure monitor calls trapped by firmware are handed to a user-space SMC
//! service through a single kernel object and its result is handed back.
//! NOP calls are posted to per-CPU worker threads through a side channel.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod dispatcher;
pub mod dtb;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod monitor;
pub mod nop;
pub mod percpu;
pub mod platform;
pub mod registry;
pub mod self_test;
pub mod service;
pub mod shm;
pub mod smc_defs;
pub mod sync;
pub mod uart;

pub use dispatcher::{SmcDispatcher, SmcState};
pub use error::Status;
pub use handle::{Rights, SmcHandle, VmoHandle};
pub use nop::NopRequestChannel;
pub use registry::{EntityRoute, RegistryConfig, SmcRegistry};
pub use shm::ShmInfo;
pub use smc_defs::SmcArgs;

/// Early platform bring-up: discover the board from the DTB passed in x0,
/// then route `log` output to its UART.
pub fn init(dtb_addr: usize, level: log::LevelFilter) {
    dtb::init(dtb_addr);
    if uart::init_logger(level).is_ok() {
        let info = dtb::platform_info();
        log::info!(
            "smc: platform {} cpus, uart at {:#x}{}",
            info.num_cpus,
            info.uart_base,
            if dtb::is_initialized() { "" } else { " (defaults)" }
        );
    }
}
