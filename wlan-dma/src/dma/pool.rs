//! Descriptor pools.
//!
//! A pool is an arena of fixed-size descriptors inside one DMA region,
//! addressed by slot index. Slot to bus address mapping is fixed when the
//! pool is created. Every field access is a single volatile load or store,
//! since the device reads and writes the same memory.

use core::marker::PhantomData;
use core::ptr::NonNull;

use dma_pool::DmaRegion;

use crate::desc::{Descriptor, HostDescriptor, RxDescriptor, TxDescriptor};

/// Arena of `count` descriptors of type `T`.
pub struct DescriptorPool<T> {
    region: DmaRegion,
    /// Byte offset of slot 0 inside the region.
    offset: usize,
    count: usize,
    _marker: PhantomData<T>,
}

impl<T: Descriptor + Default> DescriptorPool<T> {
    /// Lay out `count` descriptors starting `offset` bytes into `region`.
    ///
    /// Returns `None` if they do not fit, the first slot is misaligned for
    /// `T`, or the bus range is not 32-bit addressable.
    pub fn new(region: DmaRegion, offset: usize, count: usize) -> Option<Self> {
        let end = offset.checked_add(count.checked_mul(T::SIZE)?)?;
        if count == 0 || end > region.size() {
            return None;
        }
        let first = region.cpu_base() as usize + offset;
        if first % core::mem::align_of::<T>() != 0 {
            return None;
        }
        if region.bus_at(end) > u32::MAX as u64 + 1 {
            return None;
        }
        Some(Self {
            region,
            offset,
            count,
            _marker: PhantomData,
        })
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Always false; pools hold at least one descriptor.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Byte offset of slot 0 inside the region.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Backing region.
    pub fn region(&self) -> &DmaRegion {
        &self.region
    }

    /// Descriptor at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> DescRef<'_, T> {
        debug_assert!(index < self.count, "{} index {} out of range", T::NAME, index);
        let index = index % self.count;
        // SAFETY: new() checked that every slot lies inside the region and
        // is aligned for T.
        let ptr = unsafe { self.region.cpu_at(self.offset + index * T::SIZE) } as *mut T;
        DescRef {
            // SAFETY: region pointers are never null.
            ptr: unsafe { NonNull::new_unchecked(ptr) },
            _pool: PhantomData,
        }
    }

    /// Bus address of the descriptor at `index`.
    #[inline]
    pub fn bus_addr(&self, index: usize) -> u32 {
        self.region.bus_at(self.offset + (index % self.count) * T::SIZE) as u32
    }

    /// Bus address of slot 0.
    pub fn base_bus(&self) -> u32 {
        self.bus_addr(0)
    }

    /// Slot whose descriptor starts at bus address `bus`.
    pub fn index_of(&self, bus: u32) -> Option<usize> {
        let rel = (bus as u64).checked_sub(self.base_bus() as u64)? as usize;
        if rel % T::SIZE != 0 || rel / T::SIZE >= self.count {
            return None;
        }
        Some(rel / T::SIZE)
    }

    /// Zero-fill every descriptor.
    pub fn clear(&self) {
        for i in 0..self.count {
            self.get(i).reset();
        }
    }
}

/// Handle to one descriptor in DMA memory.
pub struct DescRef<'a, T> {
    ptr: NonNull<T>,
    _pool: PhantomData<&'a DescriptorPool<T>>,
}

impl<T: Descriptor + Default> DescRef<'_, T> {
    /// Overwrite the whole descriptor with zeroes.
    pub fn reset(&self) {
        // SAFETY: ptr is a live, aligned descriptor inside its pool.
        unsafe { self.ptr.as_ptr().write_volatile(T::default()) }
    }

    /// Volatile copy of the whole descriptor.
    pub fn snapshot(&self) -> T {
        // SAFETY: as above.
        unsafe { self.ptr.as_ptr().read_volatile() }
    }
}

macro_rules! volatile_fields {
    ($ty:ty { $($field:ident, $set:ident: $fty:ty;)* }) => {
        impl DescRef<'_, $ty> {
            $(
                #[inline]
                pub fn $field(&self) -> $fty {
                    // SAFETY: ptr is a live, aligned descriptor inside its pool.
                    unsafe { core::ptr::addr_of!((*self.ptr.as_ptr()).$field).read_volatile() }
                }

                #[inline]
                pub fn $set(&self, value: $fty) {
                    // SAFETY: as above.
                    unsafe { core::ptr::addr_of_mut!((*self.ptr.as_ptr()).$field).write_volatile(value) }
                }
            )*
        }
    };
}

volatile_fields!(TxDescriptor {
    next, set_next: u32;
    host_mem_ptr, set_host_mem_ptr: u32;
    tx_time, set_tx_time: u32;
    total_length, set_total_length: u16;
    ctl, set_ctl: u8;
    ctl2, set_ctl2: u8;
    error, set_error: u8;
    ack_failures, set_ack_failures: u8;
    rate, set_rate: u8;
});

volatile_fields!(HostDescriptor {
    data_phy, set_data_phy: u32;
    ctl, set_ctl: u16;
    length, set_length: u16;
    desc_phy_next, set_desc_phy_next: u32;
    pnext, set_pnext: u32;
    status, set_status: u32;
    desc_phy, set_desc_phy: u32;
    host_flags, set_host_flags: u16;
});

volatile_fields!(RxDescriptor {
    phy_addr, set_phy_addr: u32;
    host_mem_ptr, set_host_mem_ptr: u32;
    ctl, set_ctl: u8;
    next, set_next: u32;
});
