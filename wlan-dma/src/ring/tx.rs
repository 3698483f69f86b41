//! Transmit ring manager.
//!
//! Hands out free Tx slots, passes filled slots to the device and reclaims
//! them once the device marks them done. The free count drives
//! backpressure towards the upper layer.
//!
//! # Ring discipline
//! ```text
//!   tail ──> [done][done][in flight][in flight][claimed] <── head
//! ```
//! One slot always stays free as the gap between `head` and `tail`, so a
//! ring of `C` slots holds at most `C - 1` frames.

use core::sync::atomic::{fence, Ordering};

use log::{info, log_enabled, trace, warn, Level};

use crate::config::{RingConfig, MGMT_RATE};
use crate::desc::{DescCtl, DescCtl2, HostCtl};
use crate::dma::TxOwnership;
use crate::error::{SlotUnavailable, TxCompletionError};
use crate::frame::{type_label, FrameKind, TxFrame};
use crate::queue::TxQueue;
use crate::ring::diag;
use crate::stats::TxCounters;
use crate::sync::IrqLock;
use crate::traits::{DeviceIo, TxAdmission};

/// Slots kept free between head and tail.
pub const RING_GAP: usize = 1;

/// Claim on one Tx slot, returned by `acquire_tx_slot`.
///
/// Consumed by `submit_tx` or `cancel_tx_slot`. A slot that is simply
/// dropped stays claimed and blocks reclaim behind it.
#[must_use = "a Tx slot must be submitted or cancelled"]
#[derive(Debug, PartialEq, Eq)]
pub struct TxSlot {
    index: usize,
    generation: u32,
}

impl TxSlot {
    /// Ring index of the slot.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Ring cursors, guarded by the Tx lock.
#[derive(Debug)]
struct TxCursor {
    head: usize,
    tail: usize,
    free: usize,
    paused: bool,
}

/// Tx behaviour fixed at build time.
#[derive(Debug, Clone, Copy)]
struct TxPolicy {
    low_water: usize,
    resume_at: usize,
    rts_threshold: u16,
    short_preamble: bool,
    data_rate: u8,
}

/// Transmit ring over a built [`TxQueue`].
pub struct TxRing {
    queue: TxQueue,
    state: IrqLock<TxCursor>,
    policy: TxPolicy,
    generation: u32,
}

impl TxRing {
    pub(crate) fn new(queue: TxQueue, config: &RingConfig, generation: u32) -> Self {
        let capacity = queue.capacity();
        Self {
            queue,
            state: IrqLock::new(
                "tx_lock",
                TxCursor {
                    head: 0,
                    tail: 0,
                    free: capacity,
                    paused: false,
                },
            ),
            policy: TxPolicy {
                low_water: config.low_water,
                resume_at: config.resume_threshold(),
                rts_threshold: config.rts_threshold,
                short_preamble: config.short_preamble,
                data_rate: config.data_rate,
            },
            generation,
        }
    }

    pub(crate) fn into_queue(self) -> TxQueue {
        self.queue
    }

    /// Underlying pools.
    pub fn queue(&self) -> &TxQueue {
        &self.queue
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Free slots.
    pub fn free(&self) -> usize {
        self.state.lock().free
    }

    /// Next slot to hand out.
    pub fn head(&self) -> usize {
        self.state.lock().head
    }

    /// Next slot to reclaim.
    pub fn tail(&self) -> usize {
        self.state.lock().tail
    }

    /// Whether the upper layer is currently paused.
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub(crate) fn try_cursors(&self) -> Option<(usize, usize, usize)> {
        self.state.try_lock().map(|st| (st.head, st.tail, st.free))
    }

    /// Mark the queue paused. True only on the transition.
    fn enter_pause(st: &mut TxCursor) -> bool {
        if st.paused {
            return false;
        }
        st.paused = true;
        true
    }

    /// Unpause once enough slots are back. True only on the transition.
    fn leave_pause(&self, st: &mut TxCursor) -> bool {
        if st.paused && st.free >= self.policy.resume_at {
            st.paused = false;
            info!("wlan-dma: wake queue (avail. Tx desc {})", st.free);
            return true;
        }
        false
    }

    /// Claim the slot at `head`.
    ///
    /// `net` is told to pause after the Tx lock is dropped.
    pub fn acquire<N: TxAdmission + ?Sized>(&self, net: &N) -> Result<TxSlot, SlotUnavailable> {
        let mut st = self.state.lock();
        let head = st.head;
        let owner = TxOwnership::from_ctl(self.queue.descs.get(head).ctl());

        if owner != TxOwnership::Host || st.free <= RING_GAP {
            // Ring full: descriptor at head is still in flight.
            trace!("wlan-dma: Tx desc {} not free ({:?}), {} remain", head, owner, st.free);
            let pause = Self::enter_pause(&mut st);
            drop(st);
            if pause {
                info!("wlan-dma: stop queue (Tx ring full)");
                net.queue_pause();
            }
            return Err(SlotUnavailable);
        }

        st.free -= 1;
        st.head = (head + 1) % self.capacity();
        let free = st.free;
        trace!("wlan-dma: got Tx desc {}, {} remain", head, free);

        let pause = free <= self.policy.low_water && Self::enter_pause(&mut st);
        drop(st);
        if pause {
            info!("wlan-dma: stop queue (avail. Tx desc {})", free);
            net.queue_pause();
        }

        Ok(TxSlot {
            index: head,
            generation: self.generation,
        })
    }

    /// Give back a claimed slot without transmitting it.
    ///
    /// The most recent claim is undone in place. Older claims are marked
    /// done with no error so `reclaim` returns them in ring order.
    pub fn cancel<N: TxAdmission + ?Sized>(&self, slot: TxSlot, net: &N) {
        if slot.generation != self.generation {
            warn!("wlan-dma: dropping Tx slot {} from torn-down queues", slot.index);
            return;
        }
        let idx = slot.index;
        let mut st = self.state.lock();
        let desc = self.queue.descs.get(idx);
        if TxOwnership::from_ctl(desc.ctl()) != TxOwnership::Host {
            warn!("wlan-dma: cancel of Tx slot {} not held by host", idx);
            return;
        }

        let resume = if (idx + 1) % self.capacity() == st.head {
            st.head = idx;
            st.free += 1;
            trace!("wlan-dma: returned Tx desc {}, {} remain", idx, st.free);
            self.leave_pause(&mut st)
        } else {
            desc.set_error(0);
            desc.set_ctl((DescCtl::from_bits_retain(desc.ctl()) | DescCtl::DONE).bits());
            trace!("wlan-dma: Tx desc {} cancelled, left for reclaim", idx);
            false
        };
        drop(st);
        if resume {
            net.queue_resume();
        }
    }

    /// Fill `slot` with `frame` and hand it to the device.
    ///
    /// Metadata and buffers are fully written before ownership moves; the
    /// ownership flip and the device trigger happen under the Tx lock.
    pub fn submit<D: DeviceIo + ?Sized>(
        &self,
        slot: TxSlot,
        frame: &TxFrame<'_>,
        kind: FrameKind,
        device: &D,
        stats: &TxCounters,
    ) {
        if slot.generation != self.generation {
            warn!("wlan-dma: dropping Tx slot {} from torn-down queues", slot.index);
            return;
        }
        let idx = slot.index;
        let desc = self.queue.descs.get(idx);
        let header = self.queue.host.get(2 * idx);
        let payload = self.queue.host.get(2 * idx + 1);

        self.queue.headers.fill(idx, frame.header());
        self.queue.payloads.fill(idx, frame.payload());
        header.set_length(frame.header().len() as u16);
        payload.set_length(frame.payload().len() as u16);

        let total = frame.total_len();
        desc.set_tx_time(frame.tx_time());
        desc.set_total_length(total as u16);

        let mut ctl = DescCtl::from_bits_retain(desc.ctl()) | DescCtl::SUBMIT;
        if self.policy.short_preamble {
            ctl |= DescCtl::SHORT_PREAMBLE;
        }
        desc.set_ctl(ctl.bits());

        let ctl2 = if total > self.policy.rts_threshold as usize {
            DescCtl2::RTS
        } else {
            DescCtl2::empty()
        };
        desc.set_ctl2(ctl2.bits());

        let rate = match kind {
            FrameKind::Management => MGMT_RATE,
            _ => self.policy.data_rate,
        };
        desc.set_rate(rate);

        if log_enabled!(Level::Trace) {
            trace!(
                "wlan-dma: Tx pkt {} ({}): len {}, hdr_len {}, pyld_len {}, rate {}",
                idx,
                type_label(frame.frame_control().unwrap_or(0)),
                total,
                frame.header().len(),
                frame.payload().len(),
                rate
            );
            trace!("wlan-dma: 802.11 header[{}]: {:02x?}", frame.header().len(), frame.header());
            trace!("wlan-dma: 802.11 payload[{}]: {:02x?}", frame.payload().len(), frame.payload());
        }

        stats.submitted(total);

        let _guard = self.state.lock();
        self.release_to_device(idx);
        device.trigger_tx();
    }

    /// Clear OWN on header, payload and descriptor, in that order.
    fn release_to_device(&self, idx: usize) {
        self.state.assert_held("Tx descriptor ownership");
        fence(Ordering::Release);
        let own = HostCtl::OWN.bits();
        let header = self.queue.host.get(2 * idx);
        let payload = self.queue.host.get(2 * idx + 1);
        let desc = self.queue.descs.get(idx);
        header.set_ctl(header.ctl() & !own);
        payload.set_ctl(payload.ctl() & !own);
        desc.set_ctl(desc.ctl() & !DescCtl::OWN.bits());
    }

    /// Reset a completed slot to host-owned idle.
    fn reset_to_host(&self, idx: usize) {
        self.state.assert_held("Tx descriptor ownership");
        let own = HostCtl::OWN.bits();
        let header = self.queue.host.get(2 * idx);
        let payload = self.queue.host.get(2 * idx + 1);
        let desc = self.queue.descs.get(idx);
        desc.set_error(0);
        desc.set_ctl2(0);
        desc.set_ctl(DescCtl::IDLE.bits());
        header.set_ctl(header.ctl() | own);
        payload.set_ctl(payload.ctl() | own);
    }

    /// Reclaim every completed slot from `tail` on.
    ///
    /// Sweeps at most the in-flight slots and stops at the first one not
    /// done. Returns how many slots came back. `net` is told to resume
    /// after the Tx lock is dropped.
    pub fn reclaim<N: TxAdmission + ?Sized>(&self, net: &N, stats: &TxCounters) -> usize {
        if log_enabled!(Level::Trace) {
            diag::log_tx_buffers(&self.queue);
        }

        let capacity = self.capacity();
        let mut st = self.state.lock();
        trace!("wlan-dma: cleaning up Tx bufs from {}", st.tail);

        let in_flight = capacity - st.free;
        let mut finger = st.tail;
        let mut reclaimed = 0;
        let mut resume = false;

        while reclaimed < in_flight {
            let desc = self.queue.descs.get(finger);
            if TxOwnership::from_ctl(desc.ctl()) != TxOwnership::Done {
                break;
            }
            fence(Ordering::Acquire);
            trace!("wlan-dma: cleaning {}", finger);

            if let Some(err) = TxCompletionError::from_code(desc.error()) {
                warn!("wlan-dma: Tx error occurred (error {:#04x})!! ({})", err.code(), err.hint());
                stats.failed(err);
            }

            self.reset_to_host(finger);
            st.free += 1;
            reclaimed += 1;

            resume |= self.leave_pause(&mut st);
            finger = (finger + 1) % capacity;
        }

        st.tail = finger;
        drop(st);
        if resume {
            net.queue_resume();
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::build_tx_queue;
    use core::cell::Cell;
    use dma_pool::HeapPool;

    #[derive(Default)]
    struct Counts {
        pauses: Cell<usize>,
        resumes: Cell<usize>,
        triggers: Cell<usize>,
    }

    impl TxAdmission for Counts {
        fn queue_pause(&self) {
            self.pauses.set(self.pauses.get() + 1);
        }
        fn queue_resume(&self) {
            self.resumes.set(self.resumes.get() + 1);
        }
    }

    impl DeviceIo for Counts {
        fn read_memory_map(&self) -> Option<crate::region::MemoryMap> {
            None
        }
        fn configure_queues(&self, _: &crate::region::QueueRegion) -> bool {
            true
        }
        fn write_memory_map(&self, _: &crate::region::MemoryMap) -> bool {
            true
        }
        fn configure_memory(&self, _: &crate::region::MemoryConfig) -> bool {
            true
        }
        fn trigger_tx(&self) {
            self.triggers.set(self.triggers.get() + 1);
        }
    }

    fn ring(heap: &HeapPool, config: &RingConfig) -> TxRing {
        TxRing::new(build_tx_queue(heap, config.tx_capacity).unwrap(), config, 1)
    }

    fn complete(ring: &TxRing, idx: usize, error: u8) {
        let d = ring.queue().descriptors().get(idx);
        d.set_error(error);
        d.set_ctl(d.ctl() | DescCtl::DONE.bits());
    }

    #[test]
    fn test_submit_sets_metadata_and_releases() {
        let heap = HeapPool::new();
        let ring = ring(&heap, &RingConfig::default().short_preamble(true).rts_threshold(100));
        let host = Counts::default();
        let stats = TxCounters::default();

        let slot = ring.acquire(&host).unwrap();
        let header = [0x80, 0x00, 1, 2, 3, 4];
        let frame = TxFrame::new(&header, &[0x55; 200]).unwrap().with_tx_time(42);
        ring.submit(slot, &frame, frame.kind(), &host, &stats);

        let d = ring.queue().descriptors().get(0);
        assert_eq!(d.tx_time(), 42);
        assert_eq!(d.total_length(), 206);
        assert_eq!(d.rate(), MGMT_RATE);
        assert_eq!(d.ctl2(), DescCtl2::RTS.bits());
        let ctl = DescCtl::from_bits_retain(d.ctl());
        assert!(!ctl.host_owned());
        assert!(ctl.contains(DescCtl::SUBMIT | DescCtl::SHORT_PREAMBLE));

        let hdr = ring.queue().host_descriptors().get(0);
        let pay = ring.queue().host_descriptors().get(1);
        assert_eq!(hdr.length(), 6);
        assert_eq!(pay.length(), 200);
        assert_eq!(hdr.ctl() & HostCtl::OWN.bits(), 0);
        assert_eq!(pay.ctl() & HostCtl::OWN.bits(), 0);
        assert_eq!(&unsafe { ring.queue().headers().slice(0) }[..6], &header);
        assert_eq!(host.triggers.get(), 1);
    }

    #[test]
    fn test_data_frames_use_configured_rate() {
        let heap = HeapPool::new();
        let ring = ring(&heap, &RingConfig::default().data_rate(55));
        let host = Counts::default();
        let stats = TxCounters::default();

        let slot = ring.acquire(&host).unwrap();
        let frame = TxFrame::new(&[0x08, 0x00], &[0; 10]).unwrap();
        ring.submit(slot, &frame, FrameKind::Data, &host, &stats);
        let d = ring.queue().descriptors().get(0);
        assert_eq!(d.rate(), 55);
        assert_eq!(d.ctl2(), 0);
        assert!(!DescCtl::from_bits_retain(d.ctl()).contains(DescCtl::SHORT_PREAMBLE));
    }

    #[test]
    fn test_reclaim_records_errors() {
        let heap = HeapPool::new();
        let ring = ring(&heap, &RingConfig::default());
        let host = Counts::default();
        let stats = TxCounters::default();
        let frame = TxFrame::new(&[0x08, 0x00], &[0; 10]).unwrap();

        for _ in 0..3 {
            let slot = ring.acquire(&host).unwrap();
            ring.submit(slot, &frame, FrameKind::Data, &host, &stats);
        }
        complete(&ring, 0, 0);
        complete(&ring, 1, 0x20);
        complete(&ring, 2, 0x10);

        assert_eq!(ring.reclaim(&host, &stats), 3);
        let s = stats.snapshot();
        assert_eq!(s.errors, 2);
        assert_eq!(s.range_errors, 1);
        assert_eq!(s.lifetime_timeouts, 1);
        assert_eq!(ring.free(), 16);
        assert_eq!(ring.queue().descriptors().get(1).error(), 0);
        assert_eq!(ring.queue().descriptors().get(1).ctl(), DescCtl::IDLE.bits());
    }

    #[test]
    fn test_reclaim_stops_at_first_pending() {
        let heap = HeapPool::new();
        let ring = ring(&heap, &RingConfig::default());
        let host = Counts::default();
        let stats = TxCounters::default();
        let frame = TxFrame::new(&[0x08, 0x00], &[0; 10]).unwrap();

        for _ in 0..3 {
            let slot = ring.acquire(&host).unwrap();
            ring.submit(slot, &frame, FrameKind::Data, &host, &stats);
        }
        complete(&ring, 0, 0);
        complete(&ring, 2, 0);

        assert_eq!(ring.reclaim(&host, &stats), 1);
        assert_eq!(ring.tail(), 1);
        assert_eq!(ring.free(), 14);
    }

    #[test]
    fn test_stale_slot_is_dropped() {
        let heap = HeapPool::new();
        let ring = ring(&heap, &RingConfig::default());
        let host = Counts::default();
        let stats = TxCounters::default();

        let stale = TxSlot { index: 0, generation: 0 };
        let frame = TxFrame::new(&[0x08, 0x00], &[]).unwrap();
        ring.submit(stale, &frame, FrameKind::Data, &host, &stats);
        assert_eq!(host.triggers.get(), 0);
        assert!(DescCtl::from_bits_retain(ring.queue().descriptors().get(0).ctl()).host_owned());
    }

    /// Admission hook that calls back into the ring it is attached to.
    #[derive(Default)]
    struct Reentrant<'a> {
        ring: Cell<Option<&'a TxRing>>,
        paused_at_resume: Cell<Option<bool>>,
        free_at_pause: Cell<Option<usize>>,
        claimed_at_resume: Cell<Option<usize>>,
    }

    impl TxAdmission for Reentrant<'_> {
        fn queue_pause(&self) {
            if let Some(ring) = self.ring.get() {
                self.free_at_pause.set(Some(ring.free()));
            }
        }
        fn queue_resume(&self) {
            let Some(ring) = self.ring.get() else {
                return;
            };
            self.paused_at_resume.set(Some(ring.is_paused()));
            if let Ok(slot) = ring.acquire(self) {
                self.claimed_at_resume.set(Some(slot.index()));
                ring.cancel(slot, self);
            }
        }
    }

    #[test]
    fn test_admission_hooks_may_reenter_ring() {
        let heap = HeapPool::new();
        let ring = ring(&heap, &RingConfig::default().capacities(4, 4).low_water(1));
        let dev = Counts::default();
        let stats = TxCounters::default();
        let host = Reentrant::default();
        host.ring.set(Some(&ring));
        let frame = TxFrame::new(&[0x08, 0x00], &[0; 10]).unwrap();

        for _ in 0..3 {
            let slot = ring.acquire(&host).unwrap();
            ring.submit(slot, &frame, FrameKind::Data, &dev, &stats);
        }
        assert_eq!(host.free_at_pause.get(), Some(1));

        for i in 0..3 {
            complete(&ring, i, 0);
        }
        assert_eq!(ring.reclaim(&host, &stats), 3);
        assert_eq!(host.paused_at_resume.get(), Some(false));
        assert_eq!(host.claimed_at_resume.get(), Some(3));
        assert_eq!((ring.head(), ring.free()), (3, 4));
    }

    #[test]
    fn test_cancel_latest_claim_rewinds_head() {
        let heap = HeapPool::new();
        let ring = ring(&heap, &RingConfig::default());
        let host = Counts::default();

        let a = ring.acquire(&host).unwrap();
        let b = ring.acquire(&host).unwrap();
        ring.cancel(b, &host);
        assert_eq!((ring.head(), ring.free()), (1, 15));

        let again = ring.acquire(&host).unwrap();
        assert_eq!(again.index(), 1);
        ring.cancel(again, &host);
        ring.cancel(a, &host);
        assert_eq!((ring.head(), ring.tail(), ring.free()), (0, 0, 16));
    }

    #[test]
    fn test_cancel_older_claim_is_reclaimed_in_order() {
        let heap = HeapPool::new();
        let ring = ring(&heap, &RingConfig::default());
        let host = Counts::default();
        let stats = TxCounters::default();
        let frame = TxFrame::new(&[0x08, 0x00], &[0; 10]).unwrap();

        let dropped = ring.acquire(&host).unwrap();
        let sent = ring.acquire(&host).unwrap();
        ring.cancel(dropped, &host);
        assert_eq!(ring.queue().descriptors().get(0).ctl(), DescCtl::INIT.bits() | DescCtl::DONE.bits());

        ring.submit(sent, &frame, FrameKind::Data, &host, &stats);
        complete(&ring, 1, 0);
        assert_eq!(ring.reclaim(&host, &stats), 2);
        assert_eq!((ring.tail(), ring.free()), (2, 16));
        assert_eq!(ring.queue().descriptors().get(0).ctl(), DescCtl::IDLE.bits());
        assert_eq!(stats.snapshot().errors, 0);
    }
}
