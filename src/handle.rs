//! Rights-scoped handles handed to the SMC service
//!
//! The trap path talks to `SmcDispatcher` directly. User space only ever
//! holds an `SmcHandle`/`VmoHandle`, and every operation checks the right
//! it needs before touching the object.

use alloc::sync::Arc;

use bitflags::bitflags;

use crate::dispatcher::SmcDispatcher;
use crate::error::Status;
use crate::shm::{PhysicalVmo, ShmInfo, ShmMapper, ShmMapping};
use crate::smc_defs::SmcArgs;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rights: u32 {
        const DUPLICATE = 1 << 0;
        const TRANSFER = 1 << 1;
        const READ = 1 << 2;
        const WRITE = 1 << 3;
        const MAP = 1 << 5;
        const WAIT = 1 << 14;
        const INSPECT = 1 << 15;
    }
}

pub const DEFAULT_SMC_RIGHTS: Rights = Rights::DUPLICATE
    .union(Rights::TRANSFER)
    .union(Rights::WAIT)
    .union(Rights::INSPECT)
    .union(Rights::READ)
    .union(Rights::WRITE);

pub const DEFAULT_SHM_VMO_RIGHTS: Rights = Rights::READ
    .union(Rights::WRITE)
    .union(Rights::MAP)
    .union(Rights::DUPLICATE)
    .union(Rights::TRANSFER);

fn check(held: Rights, needed: Rights) -> Result<(), Status> {
    if held.contains(needed) {
        Ok(())
    } else {
        Err(Status::AccessDenied)
    }
}

// ── SMC object handle ────────────────────────────────────────────────

/// User-space handle to the SMC object. Dropping the last handle (and the
/// last in-flight route) destroys the dispatcher.
pub struct SmcHandle {
    dispatcher: Arc<SmcDispatcher>,
    rights: Rights,
}

impl SmcHandle {
    pub(crate) fn new(dispatcher: Arc<SmcDispatcher>, rights: Rights) -> Self {
        Self { dispatcher, rights }
    }

    pub fn rights(&self) -> Rights {
        self.rights
    }

    pub fn koid(&self) -> u64 {
        self.dispatcher.koid()
    }

    pub fn dispatcher(&self) -> &Arc<SmcDispatcher> {
        &self.dispatcher
    }

    /// New handle to the same object with a subset of this handle's rights.
    pub fn duplicate(&self, rights: Rights) -> Result<SmcHandle, Status> {
        check(self.rights, Rights::DUPLICATE)?;
        if !self.rights.contains(rights) {
            return Err(Status::InvalidArgs);
        }
        Ok(SmcHandle::new(self.dispatcher.clone(), rights))
    }

    pub fn claim_request(&self) -> Result<SmcArgs, Status> {
        check(self.rights, Rights::READ)?;
        self.dispatcher.claim_request()
    }

    pub fn wait_for_request(&self) -> Result<(), Status> {
        check(self.rights, Rights::WAIT)?;
        self.dispatcher.wait_for_request()
    }

    pub fn deposit_result(&self, result: i64) -> Result<(), Status> {
        check(self.rights, Rights::WRITE)?;
        self.dispatcher.deposit_result(result)
    }

    pub fn shared_memory_descriptor(&self) -> Result<ShmInfo, Status> {
        check(self.rights, Rights::INSPECT)?;
        Ok(self.dispatcher.shm_info())
    }

    pub fn read_nop_request(&self, cpu: usize) -> Result<SmcArgs, Status> {
        check(self.rights, Rights::READ)?;
        self.dispatcher.nop_channel().take(cpu)
    }

    pub fn cancel_read_nop_request(&self) -> Result<(), Status> {
        check(self.rights, Rights::WRITE)?;
        self.dispatcher.nop_channel().cancel_all();
        Ok(())
    }
}

// ── Shared-memory VMO handle ─────────────────────────────────────────

pub struct VmoHandle {
    vmo: Arc<PhysicalVmo>,
    rights: Rights,
}

impl VmoHandle {
    pub(crate) fn new(vmo: Arc<PhysicalVmo>, rights: Rights) -> Self {
        Self { vmo, rights }
    }

    pub fn rights(&self) -> Rights {
        self.rights
    }

    pub fn vmo(&self) -> &Arc<PhysicalVmo> {
        &self.vmo
    }

    pub fn duplicate(&self, rights: Rights) -> Result<VmoHandle, Status> {
        check(self.rights, Rights::DUPLICATE)?;
        if !self.rights.contains(rights) {
            return Err(Status::InvalidArgs);
        }
        Ok(VmoHandle::new(self.vmo.clone(), rights))
    }

    /// Map part of the window; requires `MAP` plus `READ` and `WRITE`.
    pub fn map<'a>(
        &'a self,
        mapper: &'a dyn ShmMapper,
        offset: u64,
        len: usize,
    ) -> Result<ShmMapping<'a>, Status> {
        check(self.rights, Rights::MAP | Rights::READ | Rights::WRITE)?;
        self.vmo.map(mapper, offset, len)
    }
}
