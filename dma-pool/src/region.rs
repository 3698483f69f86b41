//! DMA region abstraction.
//!
//! Generic DMA-capable memory region. Layout-specific offsets belong in drivers.

use core::ptr::NonNull;

use crate::DmaAllocator;

/// DMA-capable memory region.
///
/// Contains both CPU-accessible pointer and device-visible bus address.
/// Drivers are responsible for their own layout within this region.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DmaRegion {
    cpu_ptr: NonNull<u8>,
    bus_addr: u64,
    size: usize,
}

impl DmaRegion {
    /// Create a new DMA region.
    ///
    /// # Safety
    /// - `cpu_ptr` must point to `size` bytes of valid DMA-capable memory
    /// - `bus_addr` must be the corresponding device-visible address
    /// - Memory must be identity-mapped or IOMMU configured
    pub const unsafe fn new(cpu_ptr: NonNull<u8>, bus_addr: u64, size: usize) -> Self {
        Self { cpu_ptr, bus_addr, size }
    }

    /// CPU base pointer.
    #[inline]
    pub const fn cpu_base(&self) -> *mut u8 {
        self.cpu_ptr.as_ptr()
    }

    /// Bus base address (what devices see).
    #[inline]
    pub const fn bus_base(&self) -> u64 {
        self.bus_addr
    }

    /// Total size in bytes.
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// First bus address past the region.
    #[inline]
    pub const fn bus_end(&self) -> u64 {
        self.bus_addr + self.size as u64
    }

    /// Get CPU pointer at offset.
    ///
    /// # Safety
    /// Offset must be within region bounds.
    #[inline]
    pub unsafe fn cpu_at(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset <= self.size, "offset {:#x} outside region", offset);
        self.cpu_ptr.as_ptr().add(offset)
    }

    /// Get bus address at offset.
    #[inline]
    pub const fn bus_at(&self, offset: usize) -> u64 {
        self.bus_addr + offset as u64
    }

    /// Check whether a bus address falls inside the region.
    #[inline]
    pub const fn contains_bus(&self, addr: u64) -> bool {
        addr >= self.bus_addr && addr < self.bus_end()
    }

    /// Zero the whole region.
    pub fn zero(&self) {
        // SAFETY: the region owns `size` writable bytes.
        unsafe { core::ptr::write_bytes(self.cpu_ptr.as_ptr(), 0, self.size) }
    }
}

unsafe impl Send for DmaRegion {}
unsafe impl Sync for DmaRegion {}

impl core::fmt::Debug for DmaRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DmaRegion")
            .field("cpu_ptr", &self.cpu_ptr)
            .field("bus_addr", &format_args!("{:#x}", self.bus_addr))
            .field("size", &format_args!("{:#x}", self.size))
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// POOL SLOT
// ═══════════════════════════════════════════════════════════════════════════

/// A pool that may or may not currently hold memory.
///
/// Releasing an empty slot does nothing, so teardown paths can release
/// every slot unconditionally.
#[derive(Debug, Default)]
pub struct PoolSlot {
    region: Option<DmaRegion>,
}

impl PoolSlot {
    /// An empty slot.
    pub const fn empty() -> Self {
        Self { region: None }
    }

    /// A slot holding `region`.
    pub const fn holding(region: DmaRegion) -> Self {
        Self { region: Some(region) }
    }

    /// The held region, if any.
    pub fn region(&self) -> Option<&DmaRegion> {
        self.region.as_ref()
    }

    /// Whether the slot holds memory.
    pub fn is_allocated(&self) -> bool {
        self.region.is_some()
    }

    /// Size of the held region, 0 when empty.
    pub fn size(&self) -> usize {
        self.region.map_or(0, |r| r.size())
    }

    /// Give the region back to `allocator`.
    ///
    /// Returns `true` if memory was actually released.
    ///
    /// # Safety
    /// The region must come from `allocator` and the device must be done
    /// with it.
    pub unsafe fn release<A: DmaAllocator + ?Sized>(&mut self, allocator: &A) -> bool {
        match self.region.take() {
            Some(region) => {
                allocator.free(region);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeapPool;

    #[test]
    fn test_region_addressing() {
        let pool = HeapPool::new();
        let region = pool.alloc(0x100, 32).unwrap();

        assert_eq!(region.bus_at(0x10), region.bus_base() + 0x10);
        assert_eq!(region.bus_end(), region.bus_base() + 0x100);
        assert!(region.contains_bus(region.bus_base()));
        assert!(region.contains_bus(region.bus_base() + 0xff));
        assert!(!region.contains_bus(region.bus_end()));

        unsafe { pool.free(region) };
    }

    #[test]
    fn test_slot_release_is_idempotent() {
        let pool = HeapPool::new();
        let mut slot = PoolSlot::holding(pool.alloc(64, 4).unwrap());
        assert!(slot.is_allocated());
        assert_eq!(slot.size(), 64);

        assert!(unsafe { slot.release(&pool) });
        assert!(!slot.is_allocated());
        assert!(!unsafe { slot.release(&pool) });
        assert_eq!(pool.outstanding(), 0);
    }
}
