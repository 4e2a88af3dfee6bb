//! Synchronization primitives
//!
//! `SpinLock` is a FIFO ticket lock. `Event` is an auto-resetting signal
//! carrying a wait status: each `wait()` consumes exactly one pending
//! signal, and signals raised while nobody waits coalesce into one.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::Status;

pub struct SpinLock<T> {
    next_ticket: AtomicU32,
    now_serving: AtomicU32,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for SpinLock<T> {}
unsafe impl<T: Send> Send for SpinLock<T> {}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    ticket: u32,
}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            next_ticket: AtomicU32::new(0),
            now_serving: AtomicU32::new(0),
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        while self.now_serving.load(Ordering::Acquire) != ticket {
            core::hint::spin_loop(); // WFE on ARM64
        }
        SpinLockGuard { lock: self, ticket }
    }
}

impl<T> core::ops::Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> core::ops::DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock
            .now_serving
            .store(self.ticket.wrapping_add(1), Ordering::Release);
        // SEV wakes any cores parked in WFE waiting on this lock or an Event.
        #[cfg(target_arch = "aarch64")]
        unsafe { core::arch::asm!("sev", options(nostack, nomem)) };
    }
}

// ── Event ────────────────────────────────────────────────────────────

struct EventState {
    signaled: bool,
    result: Result<(), Status>,
}

/// Auto-resetting event.
///
/// `pending` mirrors `signaled` so waiters can spin on a plain atomic load
/// instead of hammering the ticket lock.
pub struct Event {
    state: SpinLock<EventState>,
    pending: AtomicBool,
}

impl Event {
    pub const fn new() -> Self {
        Self {
            state: SpinLock::new(EventState {
                signaled: false,
                result: Ok(()),
            }),
            pending: AtomicBool::new(false),
        }
    }

    /// Signal with a successful wait status.
    pub fn signal(&self) {
        self.signal_etc(Ok(()));
    }

    /// Signal with an explicit wait status. The most recent status wins if
    /// the event is signaled again before a waiter consumes it.
    pub fn signal_etc(&self, result: Result<(), Status>) {
        let mut state = self.state.lock();
        state.signaled = true;
        state.result = result;
        self.pending.store(true, Ordering::Release);
    }

    /// Block until signaled, consume the signal and return its status.
    ///
    /// There is no deadline: the caller stays parked until some other
    /// context signals the event.
    pub fn wait(&self) -> Result<(), Status> {
        loop {
            if let Some(result) = self.try_wait() {
                return result;
            }
            core::hint::spin_loop();
        }
    }

    /// Consume a pending signal without blocking.
    pub fn try_wait(&self) -> Option<Result<(), Status>> {
        if !self.pending.load(Ordering::Acquire) {
            return None;
        }
        let mut state = self.state.lock();
        if !state.signaled {
            // Another waiter consumed it between the load and the lock.
            return None;
        }
        state.signaled = false;
        self.pending.store(false, Ordering::Relaxed);
        let result = state.result;
        state.result = Ok(());
        Some(result)
    }

    pub fn is_signaled(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}
