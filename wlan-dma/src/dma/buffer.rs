//! Packet buffer pools.
//!
//! Header, payload and Rx buffers are equal-sized slices of one region.
//! Whoever owns the matching host descriptor owns the buffer: the host may
//! only touch a buffer while its host descriptor has OWN set.

use dma_pool::DmaRegion;

/// `count` buffers of `stride` bytes each.
pub struct BufferPool {
    region: DmaRegion,
    stride: usize,
    count: usize,
}

impl BufferPool {
    /// Split `region` into `count` buffers of `stride` bytes.
    ///
    /// Returns `None` if the region is too small or not 32-bit addressable.
    pub fn new(region: DmaRegion, stride: usize, count: usize) -> Option<Self> {
        let needed = stride.checked_mul(count)?;
        if stride == 0 || count == 0 || needed > region.size() {
            return None;
        }
        if region.bus_at(needed) > u32::MAX as u64 + 1 {
            return None;
        }
        Some(Self { region, stride, count })
    }

    /// Number of buffers.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Always false; pools hold at least one buffer.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Size of each buffer.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Backing region.
    pub fn region(&self) -> &DmaRegion {
        &self.region
    }

    /// Bus address of buffer `index`.
    #[inline]
    pub fn bus_addr(&self, index: usize) -> u32 {
        self.region.bus_at((index % self.count) * self.stride) as u32
    }

    fn ptr(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.count, "buffer index {} out of range", index);
        // SAFETY: index is reduced into the pool, which new() checked.
        unsafe { self.region.cpu_at((index % self.count) * self.stride) }
    }

    /// Copy `data` into buffer `index`, truncated to the stride.
    ///
    /// Returns the number of bytes copied.
    pub fn fill(&self, index: usize, data: &[u8]) -> usize {
        let len = data.len().min(self.stride);
        // SAFETY: len <= stride, so the copy stays inside this buffer.
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr(index), len) };
        len
    }

    /// View buffer `index`.
    ///
    /// # Safety
    /// The host must own the buffer (its host descriptor has OWN set) and
    /// nobody may write it while the slice is alive.
    pub unsafe fn slice(&self, index: usize) -> &[u8] {
        core::slice::from_raw_parts(self.ptr(index), self.stride)
    }

    /// Mutable view of buffer `index`.
    ///
    /// # Safety
    /// The caller must have exclusive access to the buffer: it plays the
    /// device for a device-owned slot, or the host for a host-owned one.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, index: usize) -> &mut [u8] {
        core::slice::from_raw_parts_mut(self.ptr(index), self.stride)
    }
}
