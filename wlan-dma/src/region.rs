//! Device-side memory layout.
//!
//! The device keeps its descriptor queues and packet memory in an on-chip
//! window described by a memory map. Bring-up programs three things into
//! it: the queue region (before the rings are built), the pool start
//! (after) and the Tx/Rx memory block split.

use crate::desc::{Descriptor, RxDescriptor, TxDescriptor};

/// Bytes reserved after the last queue.
pub const QUEUE_TRAILER: u32 = 8;

/// Queue option: device resets descriptors after use.
pub const QUEUE_OPT_AUTO_RESET: u8 = 1;

/// DMA config word: block transfer plus indirect descriptors.
pub const DMA_CONFIG_PCI: u32 = 0x30000;

/// DMA config word: block transfer only.
pub const DMA_CONFIG_USB: u32 = 0x20000;

const MEM_ALIGN: u32 = 0x20;

#[inline]
fn align32(v: u32) -> Option<u32> {
    Some(v.checked_add(MEM_ALIGN - 1)? & !(MEM_ALIGN - 1))
}

/// Device memory map as read from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryMap {
    pub code_start: u32,
    pub code_end: u32,
    pub wep_cache_start: u32,
    pub wep_cache_end: u32,
    pub packet_template_start: u32,
    pub packet_template_end: u32,
    /// Start of the descriptor queue area.
    pub queue_start: u32,
    /// End of the descriptor queue area.
    pub queue_end: u32,
    /// Start of packet memory.
    pub pool_start: u32,
    /// End of packet memory.
    pub pool_end: u32,
}

impl MemoryMap {
    /// Place packet memory after the queues, 32-byte aligned with 4 bytes of
    /// headroom. `None` if that runs past the 32-bit address space.
    pub fn finalise(mut self) -> Option<Self> {
        self.pool_start = align32(self.queue_end.checked_add(4)?)?;
        Some(self)
    }
}

/// Queue configuration programmed before the rings are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRegion {
    /// Bytes covered by all descriptors plus trailer.
    pub area_size: u32,
    pub tx_queue_count: u8,
    pub tx_queue_start: u32,
    pub tx_queue_priority: u8,
    pub rx_queue_start: u32,
    pub queue_options: u8,
    pub queue_end: u32,
    pub host_queue_end: u32,
    /// Descriptor counts, only consumed by USB adapters.
    pub tx_desc_count: u8,
    pub rx_desc_count: u8,
}

impl QueueRegion {
    /// Lay out `tx` Tx and `rx` Rx descriptors from `queue_start`.
    ///
    /// `None` if the queues do not fit below 4 GiB.
    pub fn compute(queue_start: u32, tx: usize, rx: usize) -> Option<Self> {
        let tx_bytes = u32::try_from(tx.checked_mul(TxDescriptor::SIZE)?).ok()?;
        let rx_bytes = u32::try_from(rx.checked_mul(RxDescriptor::SIZE)?).ok()?;
        let rx_queue_start = queue_start.checked_add(tx_bytes)?;
        let queue_end = rx_queue_start.checked_add(rx_bytes)?;
        let host_queue_end = queue_end.checked_add(QUEUE_TRAILER)?;
        Some(Self {
            area_size: host_queue_end - queue_start,
            tx_queue_count: 1,
            tx_queue_start: queue_start,
            tx_queue_priority: 0,
            rx_queue_start,
            queue_options: QUEUE_OPT_AUTO_RESET,
            queue_end,
            host_queue_end,
            tx_desc_count: tx.min(u8::MAX as usize) as u8,
            rx_desc_count: rx.min(u8::MAX as usize) as u8,
        })
    }
}

/// Tx/Rx split of device packet memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    pub block_size: u32,
    pub dma_config: u32,
    /// Bus address of the first Rx host descriptor.
    pub rx_host_desc: u32,
    pub rx_mem: u32,
    pub tx_mem: u32,
    pub tx_blocks: u32,
    pub rx_blocks: u32,
}

impl MemoryConfig {
    /// Split `[pool_start, pool_end)` of `map` half and half.
    ///
    /// `None` if an aligned base would run past the 32-bit address space.
    pub fn split(map: &MemoryMap, block_size: u32, rx_host_desc: u32) -> Option<Self> {
        let total = map.pool_end.saturating_sub(map.pool_start) / block_size.max(1);
        let tx_blocks = total / 2;
        let rx_blocks = total - tx_blocks;
        let rx_bytes = rx_blocks * block_size;
        Some(Self {
            block_size,
            dma_config: DMA_CONFIG_PCI,
            rx_host_desc,
            rx_mem: align32(map.pool_start)?,
            tx_mem: align32(map.pool_start.checked_add(rx_bytes)?)?,
            tx_blocks,
            rx_blocks,
        })
    }

    /// Total blocks handed out.
    pub fn total_blocks(&self) -> u32 {
        self.tx_blocks + self.rx_blocks
    }
}
