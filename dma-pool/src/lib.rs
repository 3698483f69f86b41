//! DMA-capable memory pools for descriptor rings and packet buffers.
//!
//! Every allocation hands back a [`DmaRegion`]: the CPU pointer the driver
//! reads and writes through, plus the bus address the device is programmed
//! with. Drivers never see where the memory came from; they only talk to
//! the [`DmaAllocator`] trait.
//!
//! # Design Philosophy
//!
//! - **Zero firmware dependencies**: Works on any platform
//! - **Instance-owned state**: No global pool, each device owns its allocator
//! - **Device-agnostic**: Any driver HAL can use this allocator
//! - **Thread-safe**: Spin-lock based synchronization
//!
//! # Allocators
//!
//! 1. [`BumpPool`]: carves a caller-provided, physically contiguous region
//!    (firmware reservation, static storage). Bus addresses are a fixed
//!    translation of the region base.
//! 2. [`HeapPool`]: backed by the global allocator, handing out bus
//!    addresses from a 32-bit IOVA window. Used for bring-up and tests.
//!
//! # Usage
//!
//! ```ignore
//! use dma_pool::{DmaAllocator, HeapPool, RING_ALIGN};
//!
//! let pool = HeapPool::new();
//! let ring = pool.alloc(16 * 0x30, RING_ALIGN)?;
//! // ... program ring.bus_base() into the device ...
//! unsafe { pool.free(ring) };
//! ```

#![no_std]

extern crate alloc;

mod bump;
mod heap;
mod region;

pub use bump::BumpPool;
pub use heap::HeapPool;
pub use region::{DmaRegion, PoolSlot};

use core::fmt;

/// Page size (4KB).
pub const PAGE_SIZE: usize = 4096;

/// Natural word alignment; the default for pools that carry no ring.
pub const WORD_ALIGN: usize = 4;

/// Alignment for ring-critical pools (descriptor arrays).
pub const RING_ALIGN: usize = 32;

/// Maximum allocation tracking entries per pool.
pub const MAX_ALLOCATIONS: usize = 64;

/// Minimum usable memory region size (64KB).
pub const MIN_REGION_SIZE: usize = 64 * 1024;

// ============================================================================
// Utility functions
// ============================================================================

/// Align a value up to the given alignment.
#[inline]
pub const fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

/// Align a value down to the given alignment.
#[inline]
pub const fn align_down(val: usize, align: usize) -> usize {
    val & !(align - 1)
}

/// Bytes to skip from `addr` to reach the next `unit` boundary.
///
/// Zero when `addr` is already aligned.
#[inline]
pub const fn align_offset(addr: u64, unit: usize) -> usize {
    let rem = (addr as usize) & (unit - 1);
    if rem == 0 {
        0
    } else {
        unit - rem
    }
}

/// Convert pages to bytes.
#[inline]
pub const fn pages_to_bytes(pages: usize) -> usize {
    pages * PAGE_SIZE
}

/// Convert bytes to pages (rounded up).
#[inline]
pub const fn bytes_to_pages(bytes: usize) -> usize {
    align_up(bytes, PAGE_SIZE) / PAGE_SIZE
}

// ============================================================================
// Memory regions
// ============================================================================

/// A physically contiguous memory range handed to a [`BumpPool`].
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    /// CPU-visible base address.
    pub base: usize,
    /// Size in bytes.
    pub size: usize,
}

impl MemoryRegion {
    /// Create a new memory region.
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// Check if region is usable for DMA (page-aligned, large enough).
    pub fn is_usable(&self) -> bool {
        self.base % PAGE_SIZE == 0 && self.size >= MIN_REGION_SIZE
    }

    /// Get aligned region.
    pub fn aligned(&self) -> Self {
        let aligned_base = align_up(self.base, PAGE_SIZE);
        let adjustment = aligned_base - self.base;
        let aligned_size = align_down(self.size.saturating_sub(adjustment), PAGE_SIZE);
        Self {
            base: aligned_base,
            size: aligned_size,
        }
    }
}

// ============================================================================
// Error types
// ============================================================================

/// DMA allocation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    /// Requested 0 bytes.
    ZeroSize,
    /// Alignment is not a power of two.
    InvalidAlignment(usize),
    /// Not enough DMA-capable memory left.
    OutOfMemory {
        /// Bytes requested by the failing call.
        requested: usize,
    },
    /// The bus address window cannot describe the allocation.
    AddressOutOfRange,
    /// Region handed to the pool is unusable.
    InvalidRegion,
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSize => write!(f, "zero-sized DMA allocation"),
            Self::InvalidAlignment(align) => write!(f, "invalid DMA alignment {}", align),
            Self::OutOfMemory { requested } => {
                write!(f, "DMA memory exhausted ({} bytes requested)", requested)
            }
            Self::AddressOutOfRange => write!(f, "bus address out of device range"),
            Self::InvalidRegion => write!(f, "invalid DMA memory region"),
        }
    }
}

/// Result type for DMA operations.
pub type Result<T> = core::result::Result<T, AllocationError>;

/// Validate a size/alignment request before touching allocator state.
pub(crate) fn check_request(size: usize, align: usize) -> Result<()> {
    if size == 0 {
        return Err(AllocationError::ZeroSize);
    }
    if align == 0 || !align.is_power_of_two() {
        return Err(AllocationError::InvalidAlignment(align));
    }
    Ok(())
}

// ============================================================================
// Allocator trait
// ============================================================================

/// Source of DMA-capable memory.
///
/// Returned memory is zeroed, physically contiguous and visible to the
/// device at [`DmaRegion::bus_base`].
pub trait DmaAllocator {
    /// Allocate `size` bytes aligned to `align` on both the CPU and bus side.
    fn alloc(&self, size: usize, align: usize) -> Result<DmaRegion>;

    /// Return a region to the pool.
    ///
    /// # Safety
    ///
    /// - `region` must come from this allocator and not be freed already.
    /// - The device must no longer access the region.
    unsafe fn free(&self, region: DmaRegion);
}

impl<A: DmaAllocator + ?Sized> DmaAllocator for &A {
    fn alloc(&self, size: usize, align: usize) -> Result<DmaRegion> {
        (**self).alloc(size, align)
    }

    unsafe fn free(&self, region: DmaRegion) {
        (**self).free(region)
    }
}

impl<A: DmaAllocator + ?Sized> DmaAllocator for alloc::sync::Arc<A> {
    fn alloc(&self, size: usize, align: usize) -> Result<DmaRegion> {
        (**self).alloc(size, align)
    }

    unsafe fn free(&self, region: DmaRegion) {
        (**self).free(region)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_functions() {
        assert_eq!(align_up(0, 4096), 0);
        assert_eq!(align_up(1, 4096), 4096);
        assert_eq!(align_up(4096, 4096), 4096);
        assert_eq!(align_down(4097, 4096), 4096);
        assert_eq!(align_up(0x1001, RING_ALIGN), 0x1020);
    }

    #[test]
    fn test_align_offset() {
        assert_eq!(align_offset(0x1000, WORD_ALIGN), 0);
        assert_eq!(align_offset(0x1001, WORD_ALIGN), 3);
        assert_eq!(align_offset(0x1002, WORD_ALIGN), 2);
        assert_eq!(align_offset(0x1003, WORD_ALIGN), 1);
    }

    #[test]
    fn test_memory_region() {
        let region = MemoryRegion::new(4096, 65536);
        assert!(region.is_usable());

        let small = MemoryRegion::new(4096, 1024);
        assert!(!small.is_usable());

        let unaligned = MemoryRegion::new(4097, 65536 + 8192).aligned();
        assert_eq!(unaligned.base, 8192);
        assert_eq!(unaligned.size % PAGE_SIZE, 0);
    }

    #[test]
    fn test_check_request() {
        assert_eq!(check_request(0, 4), Err(AllocationError::ZeroSize));
        assert_eq!(check_request(16, 3), Err(AllocationError::InvalidAlignment(3)));
        assert_eq!(check_request(16, 0), Err(AllocationError::InvalidAlignment(0)));
        assert!(check_request(16, RING_ALIGN).is_ok());
    }
}
