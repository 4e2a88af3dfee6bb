//! Per-CPU NOP request channel
//!
//! The secure monitor asks the normal world to re-enter the trusted OS on a
//! given CPU (`SMC_SC_NOP`) when that CPU has pending secure work. Each CPU
//! gets its own slot and its own event, so a wake for one CPU never
//! contends with, or is blocked by, the main SMC request slot or another
//! CPU's wake.
//!
//! The slots have their own lock rather than sharing the dispatcher's, so
//! NOP copy-in/out never waits on the main request path.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::error::Status;
use crate::smc_defs::SmcArgs;
use crate::sync::{Event, SpinLock};

pub struct NopRequestChannel {
    /// Latest request per CPU. Overwritten by each post.
    slots: SpinLock<Vec<SmcArgs>>,
    events: Vec<Event>,
    canceled: AtomicBool,
}

impl NopRequestChannel {
    /// One slot per CPU in the running topology.
    pub fn new(cpu_count: usize) -> Result<Self, Status> {
        if cpu_count == 0 {
            return Err(Status::InvalidArgs);
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(cpu_count)
            .map_err(|_| Status::NoMemory)?;
        slots.resize(cpu_count, SmcArgs::default());

        let mut events = Vec::new();
        events
            .try_reserve_exact(cpu_count)
            .map_err(|_| Status::NoMemory)?;
        events.extend((0..cpu_count).map(|_| Event::new()));

        Ok(Self {
            slots: SpinLock::new(slots),
            events,
            canceled: AtomicBool::new(false),
        })
    }

    pub fn cpu_count(&self) -> usize {
        self.events.len()
    }

    fn event(&self, cpu: usize) -> Result<&Event, Status> {
        self.events.get(cpu).ok_or(Status::InvalidArgs)
    }

    /// Store a NOP request for `cpu` and wake its reader.
    ///
    /// The copy happens under the lock; the wake happens after it is
    /// released so the woken reader never spins on it.
    pub fn post(&self, cpu: usize, args: &SmcArgs) -> Result<(), Status> {
        let event = self.event(cpu)?;
        if self.is_canceled() {
            return Err(Status::Canceled);
        }

        {
            let mut slots = self.slots.lock();
            slots[cpu] = *args;
        }
        event.signal();
        debug!("nop: posted {:#x} for cpu {}", args.smc_nr, cpu);
        Ok(())
    }

    /// Block until a NOP request is posted for `cpu` and return it.
    ///
    /// Returns `Canceled` once `cancel_all` has run, whether the caller was
    /// already parked or arrives afterwards.
    pub fn take(&self, cpu: usize) -> Result<SmcArgs, Status> {
        let event = self.event(cpu)?;
        if self.is_canceled() {
            return Err(Status::Canceled);
        }

        event.wait()?;
        if self.is_canceled() {
            return Err(Status::Canceled);
        }

        let args = self.slots.lock()[cpu];
        debug!("nop: cpu {} took {:#x}", cpu, args.smc_nr);
        Ok(args)
    }

    /// Release every reader parked in `take` with `Canceled`.
    pub fn cancel_all(&self) {
        self.canceled.store(true, Ordering::Release);
        for event in self.events.iter() {
            event.signal_etc(Err(Status::Canceled));
        }
        debug!("nop: canceled readers on {} cpus", self.events.len());
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}
