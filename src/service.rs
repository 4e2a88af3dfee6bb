//! SMC service loop, the user-space side of the rendezvous.
//!
//! A service thread waits for a trapped SMC, claims it, runs it through an
//! `SmcHandler` and deposits the result, which releases the trap context.
//! NOP workers run one per CPU and forward each NOP request until the
//! channel is canceled at teardown.

use crate::error::Status;
use crate::handle::SmcHandle;
use crate::smc_defs::SmcArgs;

/// Processes one SMC on behalf of the trusted OS.
pub trait SmcHandler {
    /// Return the value handed back to the secure monitor.
    fn handle_smc(&mut self, args: &SmcArgs) -> i64;
}

impl<F: FnMut(&SmcArgs) -> i64> SmcHandler for F {
    fn handle_smc(&mut self, args: &SmcArgs) -> i64 {
        self(args)
    }
}

/// Serve exactly one SMC. Blocks until one is queued.
///
/// With several service threads, a thread that loses the claim race goes
/// back to waiting instead of failing.
pub fn serve_one<H: SmcHandler + ?Sized>(
    handle: &SmcHandle,
    handler: &mut H,
) -> Result<SmcArgs, Status> {
    let args = loop {
        handle.wait_for_request()?;
        match handle.claim_request() {
            Ok(args) => break args,
            Err(Status::ShouldWait) => continue,
            Err(status) => return Err(status),
        }
    };

    let result = handler.handle_smc(&args);
    handle.deposit_result(result)?;
    Ok(args)
}

/// Serve SMCs until `serve_one` fails, returning that failure.
pub fn run_service_loop<H: SmcHandler + ?Sized>(handle: &SmcHandle, handler: &mut H) -> Status {
    loop {
        if let Err(status) = serve_one(handle, handler) {
            return status;
        }
    }
}

/// Forward NOP requests for `cpu` to `on_nop` until the channel is torn
/// down. Returns the status that ended the loop (`Canceled` on a normal
/// teardown).
pub fn run_nop_worker<F: FnMut(&SmcArgs)>(handle: &SmcHandle, cpu: usize, mut on_nop: F) -> Status {
    loop {
        match handle.read_nop_request(cpu) {
            Ok(args) => on_nop(&args),
            Err(status) => {
                log::debug!("smc: nop worker for cpu {} exiting: {}", cpu, status);
                return status;
            }
        }
    }
}
