//! SMC service loop and NOP workers.

mod common;

use std::sync::mpsc;
use std::thread;

use smc_dispatch::service::{run_nop_worker, run_service_loop, serve_one, SmcHandler};
use smc_dispatch::smc_defs::{SmcArgs, SMC_SC_NOP, SMC_SC_VDEV_KICK_VQ, SMC_SC_VIRTIO_START};
use smc_dispatch::{Rights, Status};

use common::{args, registry};

/// Counts calls and answers with the first parameter negated.
#[derive(Default)]
struct Negate {
    calls: usize,
}

impl SmcHandler for Negate {
    fn handle_smc(&mut self, args: &SmcArgs) -> i64 {
        self.calls += 1;
        -(args.params[0] as i64)
    }
}

#[test]
fn test_serve_one_round_trip() {
    let (reg, _shm) = registry(1);
    let (smc, _vmo) = reg.create(0).unwrap();

    thread::scope(|s| {
        let trap = s.spawn(|| reg.route(&args(SMC_SC_VIRTIO_START, 5, 0, 0)));

        let mut handler = Negate::default();
        let served = serve_one(&smc, &mut handler).unwrap();
        assert_eq!(served.smc_nr, SMC_SC_VIRTIO_START);
        assert_eq!(handler.calls, 1);
        assert_eq!(trap.join().unwrap(), -5);
    });
}

#[test]
fn test_closure_handler() {
    let (reg, _shm) = registry(1);
    let (smc, _vmo) = reg.create(0).unwrap();

    thread::scope(|s| {
        let trap = s.spawn(|| reg.route(&args(SMC_SC_VDEV_KICK_VQ, 1, 2, 3)));
        let mut sum = |a: &SmcArgs| a.params.iter().sum::<u64>() as i64;
        serve_one(&smc, &mut sum).unwrap();
        assert_eq!(trap.join().unwrap(), 6);
    });
}

#[test]
fn test_two_service_threads_share_the_load() {
    const CALLS: usize = 64;

    let (reg, _shm) = registry(1);
    let (smc, _vmo) = reg.create(0).unwrap();
    let second = smc.duplicate(smc.rights()).unwrap();

    thread::scope(|s| {
        let workers = [&smc, &second].map(|h| {
            s.spawn(move || {
                let mut handler = Negate::default();
                for _ in 0..CALLS / 2 {
                    serve_one(h, &mut handler).unwrap();
                }
                handler.calls
            })
        });

        for i in 0..CALLS as u64 {
            assert_eq!(reg.route(&args(SMC_SC_NOP, i, 0, 0)), -(i as i64));
        }

        let total: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(total, CALLS);
    });
}

#[test]
fn test_service_loop_stops_on_error() {
    let (reg, _shm) = registry(1);
    let (smc, _vmo) = reg.create(0).unwrap();
    let no_wait = smc.duplicate(Rights::READ | Rights::WRITE).unwrap();

    let mut handler = Negate::default();
    assert_eq!(run_service_loop(&no_wait, &mut handler), Status::AccessDenied);
    assert_eq!(handler.calls, 0);
}

#[test]
fn test_nop_worker_forwards_until_canceled() {
    let (reg, _shm) = registry(2);
    let (smc, _vmo) = reg.create(0).unwrap();
    let (tx, rx) = mpsc::channel();

    thread::scope(|s| {
        let worker = s.spawn(|| {
            let tx = tx;
            run_nop_worker(&smc, 1, |a| tx.send(*a).unwrap())
        });

        for i in 0..3u64 {
            let req = args(SMC_SC_NOP, i, 0, 0);
            reg.route_nop_on(1, &req);
            assert_eq!(rx.recv().unwrap(), req);
        }

        smc.cancel_read_nop_request().unwrap();
        assert_eq!(worker.join().unwrap(), Status::Canceled);
    });
}

#[test]
fn test_nop_worker_bad_cpu() {
    let (reg, _shm) = registry(2);
    let (smc, _vmo) = reg.create(0).unwrap();
    assert_eq!(run_nop_worker(&smc, 9, |_| unreachable!()), Status::InvalidArgs);
}
