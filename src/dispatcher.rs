//! SMC dispatcher: the request/result rendezvous object
//!
//! A trapped SMC is handed to the user-space SMC service through this
//! object and the trap context is parked until the service answers:
//!
//! ```text
//!   trap path                 dispatcher state            SMC service
//!   ─────────                 ────────────────            ───────────
//!   submit(args)      Idle ──────────────▶ Readable
//!                                 Readable ──────────────▶ claim_request()
//!                                          Signaled   ◀──  (processing)
//!                                 Signaled ──────────────▶ deposit_result(r)
//!   await_result() ◀───────── Resuming
//!   returns r         Resuming ──────────▶ Idle
//! ```
//!
//! Only one call can be between `submit` and the return of `await_result`
//! at any time. Every edge is a check-and-transition under `state`, so
//! concurrent service threads cannot claim the same request twice or
//! deposit twice for one call.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};

use crate::error::Status;
use crate::nop::NopRequestChannel;
use crate::shm::ShmInfo;
use crate::smc_defs::{SmcArgs, SM_ERR_INTERNAL_FAILURE};
use crate::sync::{Event, SpinLock};

/// Observable signal: a request is waiting to be claimed.
pub const SMC_SIGNAL_READABLE: u32 = 1 << 0;
/// Observable signal: a request was claimed and its result is pending.
pub const SMC_SIGNAL_SIGNALED: u32 = 1 << 1;

/// Position of the dispatcher in the rendezvous cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmcState {
    /// No call in flight; `submit` will be accepted.
    Idle,
    /// A request is queued, not yet claimed by the service.
    Readable,
    /// The service holds the request; the result is pending.
    Signaled,
    /// The result is deposited but the trap context has not resumed yet.
    Resuming,
}

struct SmcChannel {
    pending_args: Option<SmcArgs>,
    pending_result: i64,
    accepting_next_call: bool,
    signals: u32,
}

static NEXT_KOID: AtomicU64 = AtomicU64::new(1);

pub struct SmcDispatcher {
    koid: u64,
    options: u32,
    state: SpinLock<SmcChannel>,
    result_ready: Event,
    request_ready: Event,
    nop: NopRequestChannel,
    shm_info: ShmInfo,
}

impl SmcDispatcher {
    /// Build a dispatcher. Registration as the system's single instance is
    /// the registry's job; see `SmcRegistry::create`.
    pub(crate) fn new(
        options: u32,
        shm_info: ShmInfo,
        nop: NopRequestChannel,
    ) -> Arc<Self> {
        let disp = Arc::new(Self {
            koid: NEXT_KOID.fetch_add(1, Ordering::Relaxed),
            options,
            state: SpinLock::new(SmcChannel {
                pending_args: None,
                pending_result: SM_ERR_INTERNAL_FAILURE,
                accepting_next_call: true,
                signals: 0,
            }),
            result_ready: Event::new(),
            request_ready: Event::new(),
            nop,
            shm_info,
        });
        info!("smc: create smc object, koid={}", disp.koid);
        disp
    }

    pub fn koid(&self) -> u64 {
        self.koid
    }

    pub fn options(&self) -> u32 {
        self.options
    }

    pub fn shm_info(&self) -> ShmInfo {
        self.shm_info
    }

    pub fn nop_channel(&self) -> &NopRequestChannel {
        &self.nop
    }

    pub fn signals(&self) -> u32 {
        self.state.lock().signals
    }

    pub fn state(&self) -> SmcState {
        let chan = self.state.lock();
        if chan.signals & SMC_SIGNAL_READABLE != 0 {
            SmcState::Readable
        } else if chan.signals & SMC_SIGNAL_SIGNALED != 0 {
            SmcState::Signaled
        } else if chan.accepting_next_call {
            SmcState::Idle
        } else {
            SmcState::Resuming
        }
    }

    // ── Trap path ────────────────────────────────────────────────────

    /// Queue `args` for the SMC service.
    ///
    /// Never blocks: if another call is in flight this returns
    /// `ShouldWait` and the trap layer reports busy to the firmware.
    /// Every `Ok` must be followed by exactly one `await_result`.
    pub fn submit(&self, args: SmcArgs) -> Result<(), Status> {
        {
            let mut chan = self.state.lock();
            if !chan.accepting_next_call {
                return Err(Status::ShouldWait);
            }
            chan.pending_args = Some(args);
            chan.signals |= SMC_SIGNAL_READABLE;
            chan.accepting_next_call = false;
        }
        self.request_ready.signal();
        debug!("smc: koid={} queued {:#x}", self.koid, args.smc_nr);
        Ok(())
    }

    /// Park until the service deposits a result for the submitted call,
    /// then reopen the dispatcher for the next call.
    ///
    /// There is no timeout and no cancellation: a call that the service
    /// never answers keeps this context parked.
    pub fn await_result(&self) -> i64 {
        let waited = self.result_ready.wait();

        let mut chan = self.state.lock();
        debug_assert!(!chan.accepting_next_call);
        chan.accepting_next_call = true;
        let result = core::mem::replace(&mut chan.pending_result, SM_ERR_INTERNAL_FAILURE);
        match waited {
            Ok(()) => result,
            Err(_) => SM_ERR_INTERNAL_FAILURE,
        }
    }

    // ── Service path ─────────────────────────────────────────────────

    /// Take the queued request. `ShouldWait` if there is none.
    pub fn claim_request(&self) -> Result<SmcArgs, Status> {
        let mut chan = self.state.lock();
        if chan.signals & SMC_SIGNAL_READABLE == 0 {
            return Err(Status::ShouldWait);
        }
        let args = chan.pending_args.take().ok_or(Status::Internal)?;
        chan.signals = (chan.signals & !SMC_SIGNAL_READABLE) | SMC_SIGNAL_SIGNALED;
        debug!("smc: koid={} claimed {:#x}", self.koid, args.smc_nr);
        Ok(args)
    }

    /// Answer the claimed request and release the parked trap context.
    /// `BadState` unless a claim preceded it.
    pub fn deposit_result(&self, result: i64) -> Result<(), Status> {
        let mut chan = self.state.lock();
        if chan.signals & SMC_SIGNAL_SIGNALED == 0 {
            return Err(Status::BadState);
        }
        chan.pending_result = result;
        chan.signals &= !SMC_SIGNAL_SIGNALED;
        // Signal under the lock: await_result cannot observe the event
        // before the result is in place.
        self.result_ready.signal();
        debug!("smc: koid={} result {}", self.koid, result);
        Ok(())
    }

    /// Block until a request has been queued. One wake per submission;
    /// with several service threads only one of them wins the claim.
    pub fn wait_for_request(&self) -> Result<(), Status> {
        self.request_ready.wait()
    }
}

impl Drop for SmcDispatcher {
    fn drop(&mut self) {
        info!("smc: free smc object, koid={}", self.koid);
    }
}
