//! The per-slot wait event (§3 "Event surface", §5 suspension points).
//!
//! The reference crate suspends by awaiting a `Future` registered with an
//! executor `Waker` (`linux-syscall/src/file/poll.rs`'s `PollFuture`). This
//! crate's concurrency model is the synchronous one described in §5: a
//! single `netMutex`, suspension as release-wait-reacquire against a
//! per-socket event, not an async task. `WaitEvent` is therefore a small
//! signaled-flags register plus a caller-supplied "block the calling task"
//! hook (`Waiter`), rather than a `Future`. The embedding scheduler
//! provides the `Waiter`; this crate never assumes one exists beyond the
//! trait below, matching how the reference crate treats its executor as
//! external to `linux-object` itself.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::transport::PollEvents;

/// A task-blocking primitive the embedding scheduler must supply. The
/// no-op `SpinWaiter` below is provided for single-threaded/bare-metal
/// embeddings where "blocking" means "poll the transport again".
pub trait Waiter: Send + Sync {
    /// Park the calling task until `notify` is called on this event or
    /// `timeout_ms` elapses (`None` ⇒ forever). Returns `true` if woken by
    /// `notify`, `false` on timeout.
    fn park(&self, event: &WaitEvent, timeout_ms: Option<u32>) -> bool;
}

/// Busy-polls `core::hint::spin_loop` between checks. Correct but wastes
/// CPU; adequate for tests and bare single-core targets with no real
/// scheduler, matching the "cooperative single task" framing when there is
/// in fact only one task.
pub struct SpinWaiter;

impl Waiter for SpinWaiter {
    fn park(&self, event: &WaitEvent, timeout_ms: Option<u32>) -> bool {
        let mut spins: u64 = 0;
        let budget = timeout_ms.map(|ms| ms as u64 * 1000);
        loop {
            if event.signaled.load(Ordering::Acquire) != 0 {
                return true;
            }
            if let Some(budget) = budget {
                if spins >= budget {
                    return false;
                }
            }
            core::hint::spin_loop();
            spins += 1;
        }
    }
}

/// Created once per socket-table slot at table init, never destroyed
/// (invariant 3). `close` clears `signaled`/`subscribed` but leaves the
/// event object itself alive so descriptor reincarnations reuse it.
pub struct WaitEvent {
    signaled: AtomicU8,
    subscribed: AtomicU8,
}

impl WaitEvent {
    pub const fn new() -> Self {
        WaitEvent {
            signaled: AtomicU8::new(0),
            subscribed: AtomicU8::new(0),
        }
    }

    pub fn subscribe(&self, mask: PollEvents) {
        self.subscribed.fetch_or(mask.bits(), Ordering::AcqRel);
    }

    pub fn unsubscribe(&self, mask: PollEvents) {
        self.subscribed.fetch_and(!mask.bits(), Ordering::AcqRel);
    }

    pub fn subscribed_mask(&self) -> PollEvents {
        PollEvents::from_bits_truncate(self.subscribed.load(Ordering::Acquire))
    }

    /// Signal readiness bits; only bits the event is currently subscribed
    /// to "stick" (matches §4.7 step 3's "subscribe to a mask" semantics —
    /// signaling an unsubscribed bit is a no-op so stale signals from a
    /// previous `select` call can't leak into the next one).
    pub fn signal(&self, bits: PollEvents) {
        let relevant = bits.bits() & self.subscribed.load(Ordering::Acquire);
        if relevant != 0 {
            self.signaled.fetch_or(relevant, Ordering::AcqRel);
        }
    }

    /// Force-signal regardless of subscription, used when a socket is
    /// closed while a caller is suspended on it (property 12, §8): the
    /// waiter must observe CLOSED even if it never explicitly subscribed.
    pub fn signal_closed(&self) {
        self.signaled.fetch_or(PollEvents::CLOSED.bits(), Ordering::AcqRel);
    }

    pub fn take_signaled(&self) -> PollEvents {
        PollEvents::from_bits_truncate(self.signaled.swap(0, Ordering::AcqRel))
    }

    pub fn peek_signaled(&self) -> PollEvents {
        PollEvents::from_bits_truncate(self.signaled.load(Ordering::Acquire))
    }

    pub fn reset(&self) {
        self.signaled.store(0, Ordering::Release);
        self.subscribed.store(0, Ordering::Release);
    }
}
