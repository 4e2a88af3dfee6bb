//! SMC registry: creation of the single SMC object and firmware routing
//!
//! The registry owns the platform collaborators (secure monitor conduit,
//! kernel mapper, CPU topology) and a weak reference to the one live
//! dispatcher. Dropping the last strong reference to the dispatcher is what
//! destroys it; the registry only ever observes that through the weak
//! reference, so a new object can be created afterwards.

use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};

use log::{debug, info, warn};

use crate::dispatcher::SmcDispatcher;
use crate::error::Status;
use crate::handle::{SmcHandle, VmoHandle, DEFAULT_SHM_VMO_RIGHTS, DEFAULT_SMC_RIGHTS};
use crate::monitor::SecureMonitor;
use crate::nop::NopRequestChannel;
use crate::shm::{round_up_page, CachePolicy, PhysicalVmo, ShmMapper};
use crate::smc_defs::{
    SmcArgs, SMC_ENTITY_TEST, SMC_NUM_ENTITIES, SM_ERR_BUSY, SM_ERR_UNDEFINED_SMC, SM_OK,
};
use crate::sync::SpinLock;

/// Where calls for one entity go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRoute {
    /// Hand to the user-space SMC service through the dispatcher.
    Service,
    /// Built-in shared-memory self-test.
    SelfTest,
    /// Reject with `SM_ERR_UNDEFINED_SMC`.
    Undefined,
}

/// Registry configuration, fixed at construction.
#[derive(Clone)]
pub struct RegistryConfig {
    /// CPUs in the running topology; sizes the NOP channel.
    pub cpu_count: usize,
    /// Route `SMC_ENTITY_TEST` to the self-test.
    pub self_test: bool,
    /// Resolves the CPU a NOP request arrived on.
    pub current_cpu: fn() -> usize,
    routes: [EntityRoute; SMC_NUM_ENTITIES],
}

impl RegistryConfig {
    pub fn new(cpu_count: usize) -> Self {
        Self {
            cpu_count,
            self_test: cfg!(feature = "smc_test"),
            current_cpu: crate::percpu::current_cpu_id,
            routes: [EntityRoute::Service; SMC_NUM_ENTITIES],
        }
    }

    /// Topology taken from the host DTB (or the board defaults).
    pub fn from_platform() -> Self {
        Self::new(crate::dtb::platform_info().num_cpus)
    }

    pub fn with_self_test(mut self, enabled: bool) -> Self {
        self.self_test = enabled;
        self
    }

    pub fn with_current_cpu(mut self, current_cpu: fn() -> usize) -> Self {
        self.current_cpu = current_cpu;
        self
    }

    /// Override the route of one entity. Out-of-range entities are ignored.
    pub fn with_route(mut self, entity: u32, route: EntityRoute) -> Self {
        if let Some(slot) = self.routes.get_mut(entity as usize) {
            *slot = route;
        }
        self
    }

    fn resolved_routes(&self) -> [EntityRoute; SMC_NUM_ENTITIES] {
        let mut routes = self.routes;
        let test = &mut routes[SMC_ENTITY_TEST as usize];
        if self.self_test {
            if *test == EntityRoute::Service {
                *test = EntityRoute::SelfTest;
            }
        } else if *test == EntityRoute::SelfTest {
            *test = EntityRoute::Service;
        }
        routes
    }
}

pub struct SmcRegistry {
    /// Allocation lock + pointer to the live object.
    live: SpinLock<Weak<SmcDispatcher>>,
    monitor: Box<dyn SecureMonitor>,
    mapper: Box<dyn ShmMapper>,
    cpu_count: usize,
    current_cpu: fn() -> usize,
    routes: [EntityRoute; SMC_NUM_ENTITIES],
}

impl SmcRegistry {
    pub fn new(
        config: RegistryConfig,
        monitor: Box<dyn SecureMonitor>,
        mapper: Box<dyn ShmMapper>,
    ) -> Self {
        Self {
            live: SpinLock::new(Weak::new()),
            monitor,
            mapper,
            cpu_count: config.cpu_count,
            current_cpu: config.current_cpu,
            routes: config.resolved_routes(),
        }
    }

    pub fn route_for(&self, entity: u32) -> EntityRoute {
        self.routes
            .get(entity as usize)
            .copied()
            .unwrap_or(EntityRoute::Undefined)
    }

    pub fn live(&self) -> Option<Arc<SmcDispatcher>> {
        self.live.lock().upgrade()
    }

    pub fn is_live(&self) -> bool {
        self.live().is_some()
    }

    /// Create the system's SMC object over the negotiated shared-memory
    /// window. Fails with `AlreadyExists` while another one is alive.
    pub fn create(&self, options: u32) -> Result<(SmcHandle, VmoHandle), Status> {
        let mut live = self.live.lock();
        if live.upgrade().is_some() {
            warn!("smc: smc kernel object already exists");
            return Err(Status::AlreadyExists);
        }

        let info = self.monitor.shm_config()?;
        if info.size == 0 {
            return Err(Status::Internal);
        }
        let shm_size = round_up_page(info.size).ok_or(Status::InvalidArgs)?;

        let vmo = PhysicalVmo::create(info.base_phys, shm_size)?;
        if info.use_cache {
            vmo.set_cache_policy(CachePolicy::Cached)?;
        }

        let nop = NopRequestChannel::new(self.cpu_count)?;
        let disp = SmcDispatcher::new(options, info, nop);
        *live = Arc::downgrade(&disp);

        info!(
            "smc: shm at {:#x}, {:#x} bytes ({})",
            info.base_phys,
            shm_size,
            if info.use_cache { "cached" } else { "uncached" }
        );

        Ok((
            SmcHandle::new(disp, DEFAULT_SMC_RIGHTS),
            VmoHandle::new(vmo, DEFAULT_SHM_VMO_RIGHTS),
        ))
    }

    /// Firmware entry for a trapped SMC. Blocks until the SMC service has
    /// answered, unless the call is refused up front.
    pub fn route(&self, args: &SmcArgs) -> i64 {
        let Some(disp) = self.live() else {
            return SM_ERR_UNDEFINED_SMC;
        };

        match self.route_for(args.entity()) {
            EntityRoute::Undefined => SM_ERR_UNDEFINED_SMC,
            EntityRoute::SelfTest => {
                crate::self_test::invoke(args, self.mapper.as_ref(), &disp.shm_info())
            }
            EntityRoute::Service => {
                if disp.submit(*args).is_err() {
                    debug!("smc: busy, rejecting {:#x}", args.smc_nr);
                    return SM_ERR_BUSY;
                }
                disp.await_result()
            }
        }
    }

    /// Firmware entry for a NOP request on the calling CPU.
    pub fn route_nop(&self, args: &SmcArgs) -> i64 {
        self.route_nop_on((self.current_cpu)(), args)
    }

    /// NOP request for an explicit CPU. Post failures are logged and
    /// swallowed: the trap path has nothing useful to retry.
    pub fn route_nop_on(&self, cpu: usize, args: &SmcArgs) -> i64 {
        let Some(disp) = self.live() else {
            return SM_ERR_UNDEFINED_SMC;
        };

        if let Err(status) = disp.nop_channel().post(cpu, args) {
            warn!("smc: failed to send nop request to cpu {}: {}", cpu, status);
        }
        SM_OK
    }
}
