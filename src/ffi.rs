//! Firmware-facing entry points
//!
//! The secure-monitor library calls these with a pointer to the captured
//! arguments. The registry is installed once during boot and lives for the
//! rest of the system's lifetime.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::error::Status;
use crate::registry::SmcRegistry;
use crate::smc_defs::{SmcArgs, SM_ERR_INVALID_PARAMETERS, SM_ERR_UNDEFINED_SMC};

static REGISTRY: AtomicPtr<SmcRegistry> = AtomicPtr::new(ptr::null_mut());

/// Install the registry the entry points route through. Only the first
/// install wins.
pub fn install(registry: &'static SmcRegistry) -> Result<(), Status> {
    REGISTRY
        .compare_exchange(
            ptr::null_mut(),
            registry as *const SmcRegistry as *mut SmcRegistry,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .map(|_| ())
        .map_err(|_| Status::AlreadyExists)
}

pub fn installed() -> Option<&'static SmcRegistry> {
    let registry = REGISTRY.load(Ordering::Acquire);
    // Safety: only ever set from a &'static in install().
    unsafe { registry.as_ref() }
}

/// Resolve the raw pointers of an entry point call.
fn resolve(args: *const SmcArgs) -> Result<(&'static SmcRegistry, SmcArgs), i64> {
    // Safety: the caller passes either null or a pointer to a live,
    // initialized SmcArgs for the duration of the call.
    let args = unsafe { args.as_ref() }.ok_or(SM_ERR_INVALID_PARAMETERS)?;
    let registry = installed().ok_or(SM_ERR_UNDEFINED_SMC)?;
    Ok((registry, *args))
}

/// Route a trapped SMC to the SMC service and return its result.
///
/// # Safety
///
/// `args` must be null or point to a valid `SmcArgs`.
#[no_mangle]
pub unsafe extern "C" fn notify_smc_service(args: *const SmcArgs) -> i64 {
    match resolve(args) {
        Ok((registry, args)) => registry.route(&args),
        Err(code) => code,
    }
}

/// Post a NOP request for the calling CPU.
///
/// # Safety
///
/// `args` must be null or point to a valid `SmcArgs`.
#[no_mangle]
pub unsafe extern "C" fn notify_nop_thread(args: *const SmcArgs) -> i64 {
    match resolve(args) {
        Ok((registry, args)) => registry.route_nop(&args),
        Err(code) => code,
    }
}
