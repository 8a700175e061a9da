//! The single cooperative suspension point the scan engine's
//! multiplexing contract relies on, and the [`cycle`] entry point built on
//! top of it.
//!
//! Grounded on `ebyst/tap_controller.py::TapController.cycle`: multiple
//! logical tasks share one physical scan by racing to observe the scan
//! counter unchanged across a single yield. No async runtime
//! dependency is pulled in for this — the yield point is a hand-rolled
//! single-poll future, matching the fact that no executor crate
//! (`tokio`, `async-std`) appears anywhere in this corpus's leaf
//! libraries.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::device::Chain;
use crate::tap::TapController;
use crate::transport::Transport;

/// A future that is `Pending` exactly once, then `Ready`; `.await`ing it
/// yields control back to the scheduler for one turn and resumes on the
/// next poll.
pub struct YieldOnce {
    yielded: bool,
}

impl YieldOnce {
    /// A fresh, unyielded instance.
    pub fn new() -> Self {
        YieldOnce { yielded: false }
    }
}

impl Default for YieldOnce {
    fn default() -> Self {
        YieldOnce::new()
    }
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Perform one cooperative `EXTEST` cycle shared by every task calling
/// this function against the same `tap`/`chain` pair.
///
/// The contract (spec.md §4.3): a task reads the scan counter, yields
/// once, then checks whether the counter is still what it read. If so, no
/// other task performed a scan while this one was suspended, so this task
/// performs it. Otherwise another task already scanned during the yield,
/// and this task returns having observed the same freshly-captured
/// values. When [`TapController::no_parallel`] is set, the yield is
/// skipped entirely and every call scans immediately.
pub async fn cycle<T: Transport>(tap: &RefCell<TapController<T>>, chain: &RefCell<Chain>) {
    if tap.borrow().no_parallel() {
        tap.borrow_mut().extest(&mut chain.borrow_mut());
        return;
    }
    let before = tap.borrow().scan_count();
    YieldOnce::new().await;
    if tap.borrow().scan_count() == before {
        tap.borrow_mut().extest(&mut chain.borrow_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::cell::{Cell, Function, StdLogicBit};
    use crate::device::Device;
    use crate::test_support::SimTransport;
    use std::collections::HashMap;
    use std::task::{RawWaker, RawWakerVTable, Waker};

    fn noop_raw_waker() -> RawWaker {
        fn clone(_: *const ()) -> RawWaker {
            noop_raw_waker()
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    fn noop_waker() -> Waker {
        unsafe { Waker::from_raw(noop_raw_waker()) }
    }

    fn single_cell_device() -> Device {
        let cells = vec![Cell::new(0, "BC_1".into(), None, Function::Internal, StdLogicBit::DontCare, None, None)];
        Device::from_parts(1, None, HashMap::new(), cells, None).unwrap()
    }

    #[test]
    fn yield_once_is_pending_then_ready() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = Box::pin(YieldOnce::new());
        assert_eq!(fut.as_mut().poll(&mut cx), Poll::Pending);
        assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(()));
    }

    #[test]
    fn two_tasks_sharing_one_cycle_collapse_into_one_scan_per_round() {
        let tap = RefCell::new(TapController::new(SimTransport::new()));
        let chain = RefCell::new({
            let mut c = Chain::new();
            c.add_device(single_cell_device());
            c
        });

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut task_a = Box::pin(async {
            for _ in 0..50 {
                cycle(&tap, &chain).await;
            }
        });
        let mut task_b = Box::pin(async {
            for _ in 0..50 {
                cycle(&tap, &chain).await;
            }
        });

        let (mut a_done, mut b_done) = (false, false);
        while !(a_done && b_done) {
            if !a_done && task_a.as_mut().poll(&mut cx).is_ready() {
                a_done = true;
            }
            if !b_done && task_b.as_mut().poll(&mut cx).is_ready() {
                b_done = true;
            }
        }

        assert_eq!(tap.borrow().scan_count(), 50);
    }

    #[test]
    fn no_parallel_mode_scans_on_every_call_without_yielding() {
        let mut controller = TapController::new(SimTransport::new());
        controller.set_no_parallel(true);
        let tap = RefCell::new(controller);
        let chain = RefCell::new({
            let mut c = Chain::new();
            c.add_device(single_cell_device());
            c
        });
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = Box::pin(cycle(&tap, &chain));
        assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(()));
        assert_eq!(tap.borrow().scan_count(), 1);
    }
}
