//! Descriptor queue builder.
//!
//! Allocates the pools of one queue, lays descriptors over them and links
//! them into rings. A queue either comes out fully built or every pool it
//! allocated is released again.

use alloc::vec::Vec;

use dma_pool::{align_offset, AllocationError, DmaAllocator, DmaRegion, PoolSlot, RING_ALIGN, WORD_ALIGN};
use log::{debug, error, warn};

use crate::desc::{
    DescCtl, Descriptor, HostCtl, HostDescriptor, RxDescriptor, TxDescriptor, HOST_DESC_SLACK,
    RX_BUFFER_SIZE, RX_DESC_CTL_AVAILABLE, RX_HOST_FLAGS, TX_HEADER_SIZE, TX_PAYLOAD_SIZE,
};
use crate::dma::{BufferPool, DescriptorPool};
use crate::error::{AlignmentWarning, DmaError, PoolKind, Result};

// ═══════════════════════════════════════════════════════════════════════════
// SCOPED ACQUISITION
// ═══════════════════════════════════════════════════════════════════════════

/// Pools acquired for a queue under construction.
///
/// Dropping the guard without [`PoolGuard::commit`] frees everything it
/// holds, newest first.
struct PoolGuard<'a, A: DmaAllocator + ?Sized> {
    allocator: &'a A,
    slots: Vec<(PoolKind, PoolSlot)>,
    armed: bool,
}

impl<'a, A: DmaAllocator + ?Sized> PoolGuard<'a, A> {
    fn new(allocator: &'a A) -> Self {
        Self {
            allocator,
            slots: Vec::with_capacity(4),
            armed: true,
        }
    }

    fn alloc(&mut self, pool: PoolKind, size: usize, align: usize) -> Result<DmaRegion> {
        match self.allocator.alloc(size, align) {
            Ok(region) => {
                debug!(
                    "wlan-dma: {} {:#x} bytes cpu={:p} bus={:#x}",
                    pool,
                    size,
                    region.cpu_base(),
                    region.bus_base()
                );
                self.slots.push((pool, PoolSlot::holding(region)));
                Ok(region)
            }
            Err(source) => {
                error!("wlan-dma: {} allocation of {:#x} bytes failed: {}", pool, size, source);
                Err(DmaError::alloc(pool, source))
            }
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl<A: DmaAllocator + ?Sized> Drop for PoolGuard<'_, A> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for (pool, slot) in self.slots.iter_mut().rev() {
            debug!("wlan-dma: rolling back {}", pool);
            // SAFETY: nothing was handed to the device yet.
            unsafe { slot.release(self.allocator) };
        }
    }
}

fn layout_err(pool: PoolKind) -> DmaError {
    error!("wlan-dma: {} region unusable for descriptor layout", pool);
    DmaError::alloc(pool, AllocationError::InvalidRegion)
}

/// Byte offset of the first word-aligned host descriptor in `region`.
fn host_desc_offset(region: &DmaRegion, pool: PoolKind) -> Option<AlignmentWarning> {
    match align_offset(region.cpu_base() as u64, WORD_ALIGN) {
        0 => None,
        offset => {
            warn!("wlan-dma: {} not aligned properly, skipping {} bytes", pool, offset);
            Some(AlignmentWarning { pool, offset })
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TX QUEUE
// ═══════════════════════════════════════════════════════════════════════════

/// Pools backing the Tx ring.
pub struct TxQueue {
    pub(crate) headers: BufferPool,
    pub(crate) payloads: BufferPool,
    pub(crate) host: DescriptorPool<HostDescriptor>,
    pub(crate) descs: DescriptorPool<TxDescriptor>,
    pub(crate) warning: Option<AlignmentWarning>,
}

impl TxQueue {
    /// Number of Tx slots.
    pub fn capacity(&self) -> usize {
        self.descs.len()
    }

    /// Device-visible descriptors.
    pub fn descriptors(&self) -> &DescriptorPool<TxDescriptor> {
        &self.descs
    }

    /// Host descriptors, header at `2 * slot`, payload at `2 * slot + 1`.
    pub fn host_descriptors(&self) -> &DescriptorPool<HostDescriptor> {
        &self.host
    }

    /// Header buffers.
    pub fn headers(&self) -> &BufferPool {
        &self.headers
    }

    /// Payload buffers.
    pub fn payloads(&self) -> &BufferPool {
        &self.payloads
    }

    /// Return every pool to `allocator`, newest first.
    ///
    /// # Safety
    /// The device must be stopped and the pools must come from `allocator`.
    pub(crate) unsafe fn release<A: DmaAllocator + ?Sized>(self, allocator: &A) {
        allocator.free(*self.descs.region());
        allocator.free(*self.host.region());
        allocator.free(*self.payloads.region());
        allocator.free(*self.headers.region());
    }
}

/// Allocate and wire a Tx queue of `capacity` slots.
pub fn build_tx_queue<A: DmaAllocator + ?Sized>(allocator: &A, capacity: usize) -> Result<TxQueue> {
    let host_count = capacity * 2;
    let mut guard = PoolGuard::new(allocator);

    let hdr_region = guard.alloc(PoolKind::TxHeaders, capacity * TX_HEADER_SIZE, WORD_ALIGN)?;
    // Sized for two payload buffers per slot, as the device expects.
    let payload_region = guard.alloc(PoolKind::TxPayloads, host_count * TX_PAYLOAD_SIZE, WORD_ALIGN)?;
    let host_region = guard.alloc(
        PoolKind::TxHostDescriptors,
        host_count * HostDescriptor::SIZE + HOST_DESC_SLACK,
        WORD_ALIGN,
    )?;
    let desc_region = guard.alloc(PoolKind::TxDescriptors, capacity * TxDescriptor::SIZE, RING_ALIGN)?;

    let warning = host_desc_offset(&host_region, PoolKind::TxHostDescriptors);
    let offset = warning.map_or(0, |w| w.offset);

    let headers = BufferPool::new(hdr_region, TX_HEADER_SIZE, capacity)
        .ok_or_else(|| layout_err(PoolKind::TxHeaders))?;
    let payloads = BufferPool::new(payload_region, TX_PAYLOAD_SIZE, host_count)
        .ok_or_else(|| layout_err(PoolKind::TxPayloads))?;
    let host = DescriptorPool::<HostDescriptor>::new(host_region, offset, host_count)
        .ok_or_else(|| layout_err(PoolKind::TxHostDescriptors))?;
    let descs = DescriptorPool::<TxDescriptor>::new(desc_region, 0, capacity)
        .ok_or_else(|| layout_err(PoolKind::TxDescriptors))?;

    // Even host descriptors carry the 802.11 header and chain to the
    // payload descriptor that follows; odd ones end the chain.
    for k in 0..host_count {
        let h = host.get(k);
        let slot = k / 2;
        h.reset();
        if k % 2 == 0 {
            h.set_data_phy(headers.bus_addr(slot));
            h.set_pnext(host.bus_addr(k + 1));
        } else {
            h.set_data_phy(payloads.bus_addr(slot));
            h.set_pnext(0);
        }
        h.set_ctl(HostCtl::OWN.bits());
        h.set_desc_phy(host.bus_addr(k));
        h.set_desc_phy_next(host.bus_addr((k + 1) % host_count));
    }

    for i in 0..capacity {
        let d = descs.get(i);
        d.reset();
        d.set_host_mem_ptr(host.bus_addr(2 * i));
        d.set_ctl(DescCtl::INIT.bits());
        d.set_ctl2(0);
        d.set_next(descs.bus_addr((i + 1) % capacity));
    }

    debug!(
        "wlan-dma: Tx queue {} slots, desc bus={:#x} host bus={:#x}",
        capacity,
        descs.base_bus(),
        host.base_bus()
    );
    guard.commit();
    Ok(TxQueue { headers, payloads, host, descs, warning })
}

// ═══════════════════════════════════════════════════════════════════════════
// RX QUEUE
// ═══════════════════════════════════════════════════════════════════════════

/// Pools backing the Rx ring.
pub struct RxQueue {
    pub(crate) host: DescriptorPool<HostDescriptor>,
    pub(crate) buffers: BufferPool,
    pub(crate) descs: DescriptorPool<RxDescriptor>,
    pub(crate) warning: Option<AlignmentWarning>,
}

impl RxQueue {
    /// Number of Rx slots.
    pub fn capacity(&self) -> usize {
        self.descs.len()
    }

    /// Device-visible descriptors.
    pub fn descriptors(&self) -> &DescriptorPool<RxDescriptor> {
        &self.descs
    }

    /// Host descriptors, one per slot.
    pub fn host_descriptors(&self) -> &DescriptorPool<HostDescriptor> {
        &self.host
    }

    /// Rx buffers, one per slot.
    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Return every pool to `allocator`, newest first.
    ///
    /// # Safety
    /// The device must be stopped and the pools must come from `allocator`.
    pub(crate) unsafe fn release<A: DmaAllocator + ?Sized>(self, allocator: &A) {
        allocator.free(*self.descs.region());
        allocator.free(*self.buffers.region());
        allocator.free(*self.host.region());
    }
}

/// Allocate and wire an Rx queue of `capacity` slots.
///
/// Every slot starts out device-owned and available for receive.
pub fn build_rx_queue<A: DmaAllocator + ?Sized>(allocator: &A, capacity: usize) -> Result<RxQueue> {
    let mut guard = PoolGuard::new(allocator);

    let host_region = guard.alloc(
        PoolKind::RxHostDescriptors,
        capacity * HostDescriptor::SIZE + HOST_DESC_SLACK,
        WORD_ALIGN,
    )?;
    let buf_region = guard.alloc(PoolKind::RxBuffers, capacity * RX_BUFFER_SIZE, WORD_ALIGN)?;
    let desc_region = guard.alloc(PoolKind::RxDescriptors, capacity * RxDescriptor::SIZE, RING_ALIGN)?;

    let warning = host_desc_offset(&host_region, PoolKind::RxHostDescriptors);
    let offset = warning.map_or(0, |w| w.offset);

    let host = DescriptorPool::<HostDescriptor>::new(host_region, offset, capacity)
        .ok_or_else(|| layout_err(PoolKind::RxHostDescriptors))?;
    let buffers = BufferPool::new(buf_region, RX_BUFFER_SIZE, capacity)
        .ok_or_else(|| layout_err(PoolKind::RxBuffers))?;
    let descs = DescriptorPool::<RxDescriptor>::new(desc_region, 0, capacity)
        .ok_or_else(|| layout_err(PoolKind::RxDescriptors))?;

    for k in 0..capacity {
        let h = host.get(k);
        h.reset();
        h.set_data_phy(buffers.bus_addr(k));
        h.set_length(RX_BUFFER_SIZE as u16);
        h.set_host_flags(RX_HOST_FLAGS);
        h.set_ctl(h.ctl() & !HostCtl::OWN.bits());
        h.set_status(0);
        h.set_desc_phy(host.bus_addr(k));
        h.set_desc_phy_next(host.bus_addr((k + 1) % capacity));
    }

    for i in 0..capacity {
        let d = descs.get(i);
        d.reset();
        d.set_ctl(RX_DESC_CTL_AVAILABLE);
        d.set_phy_addr(descs.bus_addr(i));
        d.set_host_mem_ptr(host.bus_addr(i));
        d.set_next(descs.bus_addr((i + 1) % capacity));
    }

    debug!(
        "wlan-dma: Rx queue {} slots, desc bus={:#x} host bus={:#x}",
        capacity,
        descs.base_bus(),
        host.base_bus()
    );
    guard.commit();
    Ok(RxQueue { host, buffers, descs, warning })
}
