//! Bump allocator over a caller-provided contiguous region.
//!
//! Allocation is a pointer bump. Frees are tracked per allocation; once the
//! topmost allocations are released the bump offset rolls back, and once
//! nothing is live the pool starts over from the base. Drivers that tear
//! their rings down in reverse build order therefore get all memory back.

use core::ptr::NonNull;

use log::debug;
use spin::Mutex;

use crate::{
    align_up, check_request, AllocationError, DmaAllocator, DmaRegion, MemoryRegion, Result,
    MAX_ALLOCATIONS,
};

#[derive(Clone, Copy)]
struct Allocation {
    offset: usize,
    end: usize,
    in_use: bool,
}

impl Allocation {
    const fn empty() -> Self {
        Self { offset: 0, end: 0, in_use: false }
    }
}

struct BumpState {
    /// Bump allocator offset.
    offset: usize,
    /// Allocation tracking.
    allocations: [Allocation; MAX_ALLOCATIONS],
    /// Number of tracked entries (live or dead).
    count: usize,
}

impl BumpState {
    const fn new() -> Self {
        Self {
            offset: 0,
            allocations: [Allocation::empty(); MAX_ALLOCATIONS],
            count: 0,
        }
    }

    fn live(&self) -> usize {
        self.allocations[..self.count].iter().filter(|a| a.in_use).count()
    }

    /// Drop dead entries off the top and pull the offset back.
    fn trim(&mut self) {
        while self.count > 0 && !self.allocations[self.count - 1].in_use {
            self.count -= 1;
        }
        self.offset = if self.count == 0 {
            0
        } else {
            self.allocations[self.count - 1].end
        };
    }
}

/// DMA pool carving a single physically contiguous region.
pub struct BumpPool {
    /// CPU base of the region.
    base: usize,
    /// Bus address of `base`.
    bus_base: u64,
    /// Size of the region.
    size: usize,
    state: Mutex<BumpState>,
}

impl BumpPool {
    /// Create a pool over `region`, seen by the device at `bus_base`.
    ///
    /// The region is zeroed.
    ///
    /// # Safety
    ///
    /// - The region must be valid, writable, physically contiguous memory.
    /// - `bus_base` must be the device-visible address of `region.base`.
    /// - The region must not be used by anything else for the pool's lifetime.
    pub unsafe fn new(region: MemoryRegion, bus_base: u64) -> Result<Self> {
        if region.base == 0 || region.size == 0 {
            return Err(AllocationError::InvalidRegion);
        }
        core::ptr::write_bytes(region.base as *mut u8, 0, region.size);
        debug!(
            "dma-pool: bump pool cpu={:#x} bus={:#x} size={:#x}",
            region.base, bus_base, region.size
        );
        Ok(Self {
            base: region.base,
            bus_base,
            size: region.size,
            state: Mutex::new(BumpState::new()),
        })
    }

    /// Create an identity-mapped pool (bus address == CPU address).
    ///
    /// # Safety
    ///
    /// Same requirements as [`BumpPool::new`], plus the region must be
    /// identity-mapped.
    pub unsafe fn identity(region: MemoryRegion) -> Result<Self> {
        Self::new(region, region.base as u64)
    }

    /// Create a pool over leaked or static storage.
    pub fn from_static(mem: &'static mut [u8], bus_base: u64) -> Result<Self> {
        let region = MemoryRegion::new(mem.as_mut_ptr() as usize, mem.len());
        // SAFETY: the slice is exclusively borrowed for 'static.
        unsafe { Self::new(region, bus_base) }
    }

    /// Get remaining free space in bytes (ignoring alignment padding).
    pub fn free_space(&self) -> usize {
        self.size.saturating_sub(self.state.lock().offset)
    }

    /// Get total pool size in bytes.
    pub fn total_size(&self) -> usize {
        self.size
    }

    /// Number of allocations not yet freed.
    pub fn outstanding(&self) -> usize {
        self.state.lock().live()
    }
}

impl DmaAllocator for BumpPool {
    fn alloc(&self, size: usize, align: usize) -> Result<DmaRegion> {
        check_request(size, align)?;

        let mut state = self.state.lock();
        if state.count >= MAX_ALLOCATIONS {
            return Err(AllocationError::OutOfMemory { requested: size });
        }

        // Both sides must honour the alignment, so align the CPU address and
        // require the bus translation to preserve it.
        let cpu_start = align_up(self.base + state.offset, align);
        let offset = cpu_start - self.base;
        let end = offset.checked_add(size).ok_or(AllocationError::OutOfMemory { requested: size })?;
        if end > self.size {
            return Err(AllocationError::OutOfMemory { requested: size });
        }
        let bus = self.bus_base + offset as u64;
        if bus % align as u64 != 0 {
            return Err(AllocationError::InvalidAlignment(align));
        }

        let idx = state.count;
        state.allocations[idx] = Allocation { offset, end, in_use: true };
        state.count += 1;
        state.offset = end;
        drop(state);

        let ptr = NonNull::new(cpu_start as *mut u8).ok_or(AllocationError::InvalidRegion)?;
        // SAFETY: [offset, end) lies inside the pool and is handed out once.
        let region = unsafe { DmaRegion::new(ptr, bus, size) };
        region.zero();
        Ok(region)
    }

    unsafe fn free(&self, region: DmaRegion) {
        let offset = (region.cpu_base() as usize).saturating_sub(self.base);
        let mut state = self.state.lock();
        let count = state.count;
        match state.allocations[..count]
            .iter_mut()
            .find(|a| a.in_use && a.offset == offset)
        {
            Some(entry) => entry.in_use = false,
            None => {
                debug!("dma-pool: free of unknown region {:?}", region);
                return;
            }
        }
        state.trim();
    }
}
