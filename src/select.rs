//! Event multiplexor (C7): `select(read_set, write_set, except_set, timeout)`.
//!
//! The reference crate's `select`/`poll` (`linux-syscall/src/file/poll.rs`)
//! register an async `Future` with the executor and resume on wake. This
//! crate has no executor (§5); `select` instead subscribes the relevant
//! sockets' `WaitEvent`s to an interest mask and parks the calling task via
//! a caller-supplied `Waiter`, exactly the six-step algorithm §4.7
//! describes.

use alloc::vec::Vec;

use crate::error::{NetError, NetResult};
use crate::event::Waiter;
use crate::table::SocketTable;
use crate::transport::PollEvents;

/// A fixed-capacity descriptor set, analogous to `fd_set`.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSet {
    descriptors: Vec<usize>,
}

impl DescriptorSet {
    pub fn new() -> Self {
        DescriptorSet { descriptors: Vec::new() }
    }

    pub fn insert(&mut self, fd: usize) {
        if !self.descriptors.contains(&fd) {
            self.descriptors.push(fd);
        }
    }

    pub fn contains(&self, fd: usize) -> bool {
        self.descriptors.contains(&fd)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.descriptors.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    fn retain(&mut self, keep: impl Fn(usize) -> bool) {
        self.descriptors.retain(|fd| keep(*fd));
    }
}

/// `null` ⇒ infinite, `Some(0)` ⇒ poll once, matching §4.7 step 4.
pub type Timeout = Option<u32>;

/// Steps 1-6 of §4.7's algorithm. `waiter` supplies the actual blocking
/// primitive; `table` is the already-locked socket table (callers hold
/// `NET_MUTEX` across this whole call, per §5).
pub fn select(
    table: &SocketTable,
    read_set: &mut DescriptorSet,
    write_set: &mut DescriptorSet,
    except_set: &mut DescriptorSet,
    timeout: Timeout,
    waiter: &dyn Waiter,
) -> NetResult<usize> {
    // Step 1: validate every descriptor up front; allocate nothing on error.
    for fd in read_set.iter().chain(write_set.iter()).chain(except_set.iter()) {
        if fd >= table.capacity() {
            return Err(NetError::NotSock);
        }
        table.get(fd)?;
    }

    // Step 2: a fresh event local to this call.
    let call_event = crate::event::WaitEvent::new();

    // Step 3: subscribe each involved socket's own event to the union of
    // interest masks it appears under. `call_event` itself is what the
    // caller parks on; a transport op under the same lock signals the
    // socket's event to wake a parked waiter (§5, §7), but the socket's
    // *current* readiness is always re-derived from the transport's own
    // `poll` rather than trusted from a possibly-stale signaled bit — a
    // bit latched before this call (e.g. a previous, already-consumed
    // READABLE) must not make an empty queue look ready now. `is_ready`
    // below is the single source of truth both the immediate check and
    // the post-park recheck use.
    for fd in read_set.iter() {
        table.event(fd)?.subscribe(PollEvents::READABLE);
    }
    for fd in write_set.iter() {
        table.event(fd)?.subscribe(PollEvents::WRITABLE);
    }
    for fd in except_set.iter() {
        table.event(fd)?.subscribe(PollEvents::ERROR | PollEvents::CLOSED);
    }

    let is_ready = |table: &SocketTable, fd: usize, interest: PollEvents| -> NetResult<bool> {
        let sock = table.get(fd)?;
        let transport_ready = sock
            .transport
            .as_ref()
            .map(|t| t.poll(interest))
            .unwrap_or_else(PollEvents::empty);
        // CLOSED is latched on the event directly (`signal_closed`, not
        // routed through a transport that may no longer exist by the time
        // a suspended caller wakes), so the event's own signaled bits are
        // always consulted alongside the transport's live readiness.
        let event_ready = table.event(fd)?.peek_signaled();
        Ok(transport_ready.intersects(interest) || event_ready.intersects(interest))
    };

    let poll_ready = |table: &SocketTable,
                      read_set: &DescriptorSet,
                      write_set: &DescriptorSet,
                      except_set: &DescriptorSet|
     -> NetResult<usize> {
        let mut ready = 0usize;
        for fd in read_set.iter() {
            if is_ready(table, fd, PollEvents::READABLE)? {
                ready += 1;
            }
        }
        for fd in write_set.iter() {
            if is_ready(table, fd, PollEvents::WRITABLE)? {
                ready += 1;
            }
        }
        for fd in except_set.iter() {
            if is_ready(table, fd, PollEvents::ERROR | PollEvents::CLOSED)? {
                ready += 1;
            }
        }
        Ok(ready)
    };

    let mut ready = poll_ready(table, read_set, write_set, except_set)?;
    if ready == 0 && timeout != Some(0) {
        trace!(
            "select: subscribed {} read, {} write, {} except fds, none ready, parking",
            read_set.len(),
            write_set.len(),
            except_set.len()
        );
        waiter.park(&call_event, timeout);
        trace!("select: woke up, re-checking readiness");
        ready = poll_ready(table, read_set, write_set, except_set)?;
    }

    // Step 5: resolve kept descriptors per set, using the same readiness
    // check as `poll_ready` above.
    read_set.retain(|fd| is_ready(table, fd, PollEvents::READABLE).unwrap_or(false));
    write_set.retain(|fd| is_ready(table, fd, PollEvents::WRITABLE).unwrap_or(false));
    except_set.retain(|fd| is_ready(table, fd, PollEvents::ERROR | PollEvents::CLOSED).unwrap_or(false));

    // Step 6: unsubscribe everything this call touched.
    for fd in read_set.iter() {
        table.event(fd)?.unsubscribe(PollEvents::READABLE);
    }
    for fd in write_set.iter() {
        table.event(fd)?.unsubscribe(PollEvents::WRITABLE);
    }
    for fd in except_set.iter() {
        table.event(fd)?.unsubscribe(PollEvents::ERROR | PollEvents::CLOSED);
    }

    Ok(read_set.len() + write_set.len() + except_set.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SpinWaiter;
    use crate::table::SocketKind;
    use crate::transport::mock::MockTransport;
    use alloc::sync::Arc;

    #[test]
    fn out_of_range_descriptor_is_rejected_without_side_effects() {
        let table = SocketTable::new();
        let mut read_set = DescriptorSet::new();
        read_set.insert(table.capacity() + 5);
        let mut write_set = DescriptorSet::new();
        let mut except_set = DescriptorSet::new();
        let err = select(&table, &mut read_set, &mut write_set, &mut except_set, Some(0), &SpinWaiter).unwrap_err();
        assert_eq!(err, NetError::NotSock);
    }

    #[test]
    fn poll_once_on_empty_queue_times_out_with_zero() {
        let mut table = SocketTable::new();
        let fd = table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        let mut read_set = DescriptorSet::new();
        read_set.insert(fd);
        let mut write_set = DescriptorSet::new();
        let mut except_set = DescriptorSet::new();
        let n = select(&table, &mut read_set, &mut write_set, &mut except_set, Some(0), &SpinWaiter).unwrap();
        assert_eq!(n, 0);
        assert_eq!(read_set.len(), 0);
    }

    #[test]
    fn readable_signal_is_observed_and_set_shrinks_to_match_count() {
        let mut table = SocketTable::new();
        let fd = table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        table.event(fd).unwrap().subscribe(PollEvents::READABLE);
        table.event(fd).unwrap().signal(PollEvents::READABLE);
        let mut read_set = DescriptorSet::new();
        read_set.insert(fd);
        let mut write_set = DescriptorSet::new();
        let mut except_set = DescriptorSet::new();
        let n = select(&table, &mut read_set, &mut write_set, &mut except_set, Some(0), &SpinWaiter).unwrap();
        assert_eq!(n, 1);
        assert_eq!(read_set.len(), 1);
        assert!(read_set.contains(fd));
    }

    /// A datagram queued on the transport makes the socket read-ready
    /// without anything ever calling `WaitEvent::signal` — `select` must
    /// derive this from `Transport::poll` directly, not only from a
    /// previously-latched signal.
    #[test]
    fn transport_readiness_alone_makes_select_report_ready() {
        let mut table = SocketTable::new();
        let mock = Arc::new(MockTransport::new());
        let fd = table.open(SocketKind::Dgram, 0, mock.clone()).unwrap();
        mock.deliver(b"hi", crate::transport::Endpoint::UNSPECIFIED);

        let mut read_set = DescriptorSet::new();
        read_set.insert(fd);
        let mut write_set = DescriptorSet::new();
        let mut except_set = DescriptorSet::new();
        let n = select(&table, &mut read_set, &mut write_set, &mut except_set, Some(0), &SpinWaiter).unwrap();
        assert_eq!(n, 1);
        assert!(read_set.contains(fd));
    }

    #[test]
    fn stale_signal_from_a_prior_call_does_not_falsely_report_ready() {
        let mut table = SocketTable::new();
        let fd = table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        // A bit latched and never consumed by a previous select() call.
        table.event(fd).unwrap().subscribe(PollEvents::WRITABLE);
        table.event(fd).unwrap().signal(PollEvents::WRITABLE);
        table.event(fd).unwrap().unsubscribe(PollEvents::WRITABLE);

        let mut read_set = DescriptorSet::new();
        read_set.insert(fd);
        let mut write_set = DescriptorSet::new();
        let mut except_set = DescriptorSet::new();
        let n = select(&table, &mut read_set, &mut write_set, &mut except_set, Some(0), &SpinWaiter).unwrap();
        // The queue is empty: READABLE must not be reported just because an
        // unrelated WRITABLE bit was left signaled by an earlier call.
        assert_eq!(n, 0);
    }
}
