//! Global-allocator backed DMA pool.
//!
//! Memory comes from the global allocator; bus addresses are handed out
//! first-fit from a 32-bit IOVA window the way an IOMMU would map them, so
//! freed ranges are reused. An optional byte budget lets callers model a
//! small DMA zone.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use alloc::vec::Vec;
use core::ptr::NonNull;

use log::debug;
use spin::Mutex;

use crate::{align_up, check_request, AllocationError, DmaAllocator, DmaRegion, Result};

/// Default base of the IOVA window.
pub const DEFAULT_IOVA_BASE: u64 = 0x1000_0000;

/// Default end of the IOVA window (exclusive, 32-bit devices).
pub const DEFAULT_IOVA_LIMIT: u64 = 0x1_0000_0000;

struct Mapping {
    cpu: usize,
    iova: u64,
    layout: Layout,
}

impl Mapping {
    fn iova_end(&self) -> u64 {
        self.iova + self.layout.size() as u64
    }
}

struct HeapState {
    in_use: usize,
    /// Sorted by `iova`.
    mappings: Vec<Mapping>,
}

impl HeapState {
    /// Lowest aligned gap of `size` bytes in `[base, limit)`.
    fn find_gap(&self, base: u64, limit: u64, size: u64, align: usize) -> Option<(usize, u64)> {
        let mut iova = align_up(base as usize, align) as u64;
        for (pos, m) in self.mappings.iter().enumerate() {
            if iova + size <= m.iova {
                return Some((pos, iova));
            }
            iova = iova.max(align_up(m.iova_end() as usize, align) as u64);
        }
        (iova + size <= limit).then_some((self.mappings.len(), iova))
    }
}

/// DMA pool on top of the global allocator.
pub struct HeapPool {
    iova_base: u64,
    iova_limit: u64,
    budget: Option<usize>,
    state: Mutex<HeapState>,
}

impl HeapPool {
    /// Pool with the default IOVA window and no budget.
    pub const fn new() -> Self {
        Self::with_window(DEFAULT_IOVA_BASE, DEFAULT_IOVA_LIMIT)
    }

    /// Pool handing out bus addresses from `[base, limit)`.
    pub const fn with_window(base: u64, limit: u64) -> Self {
        Self {
            iova_base: base,
            iova_limit: limit,
            budget: None,
            state: Mutex::new(HeapState {
                in_use: 0,
                mappings: Vec::new(),
            }),
        }
    }

    /// Limit the bytes that may be live at once.
    pub fn with_budget(mut self, bytes: usize) -> Self {
        self.budget = Some(bytes);
        self
    }

    /// Number of allocations not yet freed.
    pub fn outstanding(&self) -> usize {
        self.state.lock().mappings.len()
    }

    /// Bytes currently handed out.
    pub fn bytes_in_use(&self) -> usize {
        self.state.lock().in_use
    }
}

impl Default for HeapPool {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaAllocator for HeapPool {
    fn alloc(&self, size: usize, align: usize) -> Result<DmaRegion> {
        check_request(size, align)?;
        let layout =
            Layout::from_size_align(size, align).map_err(|_| AllocationError::InvalidAlignment(align))?;

        let mut state = self.state.lock();
        if let Some(budget) = self.budget {
            if state.in_use + size > budget {
                return Err(AllocationError::OutOfMemory { requested: size });
            }
        }

        let (pos, iova) = state
            .find_gap(self.iova_base, self.iova_limit, size as u64, align)
            .ok_or(AllocationError::AddressOutOfRange)?;

        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(AllocationError::OutOfMemory { requested: size })?;

        state.in_use += size;
        state.mappings.insert(pos, Mapping { cpu: ptr.as_ptr() as usize, iova, layout });
        debug!("dma-pool: heap alloc {:#x} bytes at bus {:#x}", size, iova);

        // SAFETY: freshly allocated, zeroed, exclusively owned.
        Ok(unsafe { DmaRegion::new(ptr, iova, size) })
    }

    unsafe fn free(&self, region: DmaRegion) {
        let cpu = region.cpu_base() as usize;
        let mut state = self.state.lock();
        let Some(pos) = state.mappings.iter().position(|m| m.cpu == cpu) else {
            debug!("dma-pool: free of unknown region {:?}", region);
            return;
        };
        let mapping = state.mappings.remove(pos);
        state.in_use -= mapping.layout.size();
        drop(state);

        dealloc(mapping.cpu as *mut u8, mapping.layout);
    }
}

impl Drop for HeapPool {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for mapping in state.mappings.drain(..) {
            // SAFETY: every mapping was produced by alloc_zeroed with this layout.
            unsafe { dealloc(mapping.cpu as *mut u8, mapping.layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_addresses_are_aligned_and_disjoint() {
        let pool = HeapPool::new();
        let a = pool.alloc(0x30 * 16, 32).unwrap();
        let b = pool.alloc(0x2c * 32 + 3, 4).unwrap();
        let c = pool.alloc(0x34 * 16, 32).unwrap();

        assert_eq!(a.bus_base(), DEFAULT_IOVA_BASE);
        assert_eq!(c.bus_base() % 32, 0);
        assert!(b.bus_base() >= a.bus_end());
        assert!(c.bus_base() >= b.bus_end());
        assert_eq!(pool.outstanding(), 3);
    }

    #[test]
    fn test_budget_exhaustion() {
        let pool = HeapPool::new().with_budget(1024);
        let a = pool.alloc(1000, 4).unwrap();
        assert_eq!(
            pool.alloc(100, 4),
            Err(AllocationError::OutOfMemory { requested: 100 })
        );
        unsafe { pool.free(a) };
        assert!(pool.alloc(100, 4).is_ok());
    }

    #[test]
    fn test_window_exhaustion() {
        let pool = HeapPool::with_window(0x1000, 0x1100);
        assert!(pool.alloc(0x80, 4).is_ok());
        assert_eq!(pool.alloc(0x100, 4), Err(AllocationError::AddressOutOfRange));
    }

    #[test]
    fn test_window_reused_when_empty() {
        let pool = HeapPool::new();
        let a = pool.alloc(64, 4).unwrap();
        unsafe { pool.free(a) };
        assert_eq!(pool.bytes_in_use(), 0);

        let b = pool.alloc(64, 4).unwrap();
        assert_eq!(b.bus_base(), DEFAULT_IOVA_BASE);
    }

    #[test]
    fn test_freed_ranges_are_reused() {
        let pool = HeapPool::with_window(0x1000, 0x1400);
        let long_lived = pool.alloc(0x100, 4).unwrap();

        for _ in 0..64 {
            let r = pool.alloc(0x200, 32).unwrap();
            assert_eq!(r.bus_base(), 0x1100);
            unsafe { pool.free(r) };
        }

        let a = pool.alloc(0x80, 4).unwrap();
        let b = pool.alloc(0x80, 4).unwrap();
        assert_eq!((a.bus_base(), b.bus_base()), (0x1100, 0x1180));
        unsafe { pool.free(a) };
        let c = pool.alloc(0x40, 4).unwrap();
        assert_eq!(c.bus_base(), 0x1100);
        assert_eq!(long_lived.bus_base(), 0x1000);
        assert_eq!(pool.outstanding(), 3);
    }
}
