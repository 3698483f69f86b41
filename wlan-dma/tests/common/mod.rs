//! Common test collaborators and allocators

#![allow(dead_code)]

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use dma_pool::{AllocationError, DmaAllocator, DmaRegion, HeapPool, WORD_ALIGN};
use morpheus_wlan_dma::{
    DmaContext, LoopbackDevice, RingConfig, RxDelivery, RxFrame, TxAdmission,
};
use spin::Mutex;

/// Upper layer that records every call.
#[derive(Default)]
pub struct RecordingHost {
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    /// `(slot index, frame bytes)` per delivered frame.
    pub frames: Mutex<Vec<(usize, Vec<u8>)>>,
    pub captures: Mutex<Vec<Vec<u8>>>,
}

impl RecordingHost {
    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::Relaxed)
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::Relaxed)
    }

    pub fn delivered_slots(&self) -> Vec<usize> {
        self.frames.lock().iter().map(|(idx, _)| *idx).collect()
    }
}

impl TxAdmission for RecordingHost {
    fn queue_pause(&self) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }

    fn queue_resume(&self) {
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }
}

impl RxDelivery for RecordingHost {
    fn deliver_frame(&self, frame: &RxFrame<'_>) {
        self.frames.lock().push((frame.index, frame.data.to_vec()));
    }

    fn deliver_monitor_capture(&self, buffer: &[u8]) {
        self.captures.lock().push(buffer.to_vec());
    }
}

pub type TestContext = DmaContext<HeapPool, LoopbackDevice, RecordingHost>;

/// Context over a fresh heap pool and loopback device.
pub fn context(config: RingConfig) -> TestContext {
    DmaContext::new(HeapPool::new(), LoopbackDevice::new(), RecordingHost::default(), config)
}

/// Context with queues already created at the configured capacities.
pub fn created(config: RingConfig) -> TestContext {
    let (tx, rx) = (config.tx_capacity, config.rx_capacity);
    let mut ctx = context(config);
    ctx.create_queues(tx, rx).unwrap();
    ctx
}

/// A minimal 802.11 data frame of `len` bytes.
pub fn data_frame(len: usize) -> Vec<u8> {
    let mut frame = vec![0u8; len];
    frame[0] = 0x08;
    for (i, b) in frame.iter_mut().enumerate().skip(2) {
        *b = i as u8;
    }
    frame
}

/// Heap pool that fails every allocation after the first `limit`.
pub struct FailingAllocator {
    pub inner: HeapPool,
    limit: usize,
    calls: AtomicUsize,
}

impl FailingAllocator {
    pub fn new(limit: usize) -> Self {
        Self { inner: HeapPool::new(), limit, calls: AtomicUsize::new(0) }
    }
}

impl DmaAllocator for FailingAllocator {
    fn alloc(&self, size: usize, align: usize) -> dma_pool::Result<DmaRegion> {
        if self.calls.fetch_add(1, Ordering::Relaxed) >= self.limit {
            return Err(AllocationError::OutOfMemory { requested: size });
        }
        self.inner.alloc(size, align)
    }

    unsafe fn free(&self, region: DmaRegion) {
        self.inner.free(region)
    }
}

/// Heap pool whose word-aligned regions start 2 bytes past a word boundary.
pub struct MisalignedAllocator {
    pub inner: HeapPool,
}

const SKEW: usize = 2;

impl MisalignedAllocator {
    pub fn new() -> Self {
        Self { inner: HeapPool::new() }
    }
}

impl DmaAllocator for MisalignedAllocator {
    fn alloc(&self, size: usize, align: usize) -> dma_pool::Result<DmaRegion> {
        if align != WORD_ALIGN {
            return self.inner.alloc(size, align);
        }
        let region = self.inner.alloc(size + WORD_ALIGN, align)?;
        let cpu = NonNull::new(unsafe { region.cpu_at(SKEW) }).ok_or(AllocationError::InvalidRegion)?;
        Ok(unsafe { DmaRegion::new(cpu, region.bus_at(SKEW), size) })
    }

    unsafe fn free(&self, region: DmaRegion) {
        if region.cpu_base() as usize % WORD_ALIGN != SKEW {
            return self.inner.free(region);
        }
        let cpu = NonNull::new(region.cpu_base().sub(SKEW)).unwrap();
        let whole = DmaRegion::new(cpu, region.bus_base() - SKEW as u64, region.size() + WORD_ALIGN);
        self.inner.free(whole)
    }
}
