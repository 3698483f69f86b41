//! Per-device DMA context.
//!
//! Owns every pool and both rings of one adapter. Bring-up and teardown
//! need `&mut self`; the data path (`acquire_tx_slot`, `submit_tx`,
//! `reclaim_tx_completions`, `drain_rx_completions`) runs through `&self`
//! from any context, interrupt handler included.
//!
//! # Bring-up
//! ```text
//!   read memory map ─> program queue region ─> build Tx ─> build Rx
//!     ─> re-read memory map ─> place pool start ─> split Tx/Rx memory
//! ```
//! Any failure releases everything built so far.

use dma_pool::DmaAllocator;
use log::{error, info, warn};

use crate::config::RingConfig;
use crate::error::{ConfigureStage, DmaError, Result, SlotUnavailable, TxError};
use crate::frame::{FrameKind, TxFrame};
use crate::queue::{build_rx_queue, build_tx_queue, QueueLayout, RxQueue, TxQueue};
use crate::region::{MemoryConfig, MemoryMap, QueueRegion};
use crate::ring::{RxRing, RxRingReport, TxRing, TxRingReport, TxSlot};
use crate::stats::{RxCounters, RxStats, TxCounters, TxStats, WirelessQuality};
use crate::sync::IrqLock;
use crate::traits::{DeviceIo, RxDelivery, TxAdmission};

/// Everything that exists only while queues are up.
struct Rings {
    tx: TxRing,
    rx: RxRing,
    layout: QueueLayout,
    region: QueueRegion,
    memory_map: MemoryMap,
    memory: MemoryConfig,
}

/// DMA context of one wireless adapter.
pub struct DmaContext<A: DmaAllocator, D, N> {
    allocator: A,
    device: D,
    net: N,
    config: RingConfig,
    rings: Option<Rings>,
    generation: u32,
    tx_stats: TxCounters,
    rx_stats: RxCounters,
    quality: IrqLock<WirelessQuality>,
}

fn configure_failed(stage: ConfigureStage) -> DmaError {
    error!("wlan-dma: device rejected {}", stage);
    DmaError::DeviceConfigure(stage)
}

/// Free both queues, Rx first.
///
/// # Safety
/// The device must no longer access either queue.
unsafe fn release_queues<A: DmaAllocator + ?Sized>(allocator: &A, tx: TxQueue, rx: RxQueue) {
    rx.release(allocator);
    tx.release(allocator);
}

impl<A: DmaAllocator, D, N> DmaContext<A, D, N> {
    /// Create a context with no queues.
    pub fn new(allocator: A, device: D, net: N, config: RingConfig) -> Self {
        Self {
            allocator,
            device,
            net,
            config,
            rings: None,
            generation: 0,
            tx_stats: TxCounters::default(),
            rx_stats: RxCounters::default(),
            quality: IrqLock::new("wstats_lock", WirelessQuality::default()),
        }
    }

    /// Whether queues are currently built.
    pub fn is_created(&self) -> bool {
        self.rings.is_some()
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn net(&self) -> &N {
        &self.net
    }

    /// Tx ring, if queues are up.
    pub fn tx_ring(&self) -> Option<&TxRing> {
        self.rings.as_ref().map(|r| &r.tx)
    }

    /// Rx ring, if queues are up.
    pub fn rx_ring(&self) -> Option<&RxRing> {
        self.rings.as_ref().map(|r| &r.rx)
    }

    /// Host descriptor placement of the current queues.
    pub fn layout(&self) -> Option<&QueueLayout> {
        self.rings.as_ref().map(|r| &r.layout)
    }

    /// Queue region programmed into the device.
    pub fn queue_region(&self) -> Option<&QueueRegion> {
        self.rings.as_ref().map(|r| &r.region)
    }

    /// Memory map written back to the device.
    pub fn memory_map(&self) -> Option<&MemoryMap> {
        self.rings.as_ref().map(|r| &r.memory_map)
    }

    /// Tx/Rx memory split programmed into the device.
    pub fn memory_config(&self) -> Option<&MemoryConfig> {
        self.rings.as_ref().map(|r| &r.memory)
    }

    pub fn tx_stats(&self) -> TxStats {
        self.tx_stats.snapshot()
    }

    pub fn rx_stats(&self) -> RxStats {
        self.rx_stats.snapshot()
    }

    /// Link quality from the last received frame.
    pub fn wireless_quality(&self) -> WirelessQuality {
        *self.quality.lock()
    }

    /// Free every pool. Does nothing if no queues exist.
    ///
    /// The device must have stopped DMA before this is called.
    pub fn destroy_queues(&mut self) {
        let Some(rings) = self.rings.take() else {
            return;
        };
        // SAFETY: the rings are gone, so nothing on the host side can reach
        // the pools any more; the caller stopped the device.
        unsafe { release_queues(&self.allocator, rings.tx.into_queue(), rings.rx.into_queue()) };
        info!("wlan-dma: queues destroyed");
    }

    /// Sample the Tx ring without waiting on its lock.
    pub fn tx_report(&self) -> Option<TxRingReport> {
        self.tx_ring().map(TxRing::report)
    }

    /// Sample the Rx ring without waiting on its lock.
    pub fn rx_report(&self) -> Option<RxRingReport> {
        self.rx_ring().map(RxRing::report)
    }
}

impl<A, D, N> DmaContext<A, D, N>
where
    A: DmaAllocator,
    D: DeviceIo,
    N: TxAdmission + RxDelivery,
{
    /// Build Tx and Rx queues and program the device.
    ///
    /// Either both queues come up with the device configured, or nothing is
    /// left allocated.
    pub fn create_queues(&mut self, tx_capacity: usize, rx_capacity: usize) -> Result<()> {
        if self.rings.is_some() {
            return Err(DmaError::AlreadyCreated);
        }
        let config = self.config.clone().capacities(tx_capacity, rx_capacity);
        config.validate()?;

        let map = self
            .device
            .read_memory_map()
            .ok_or_else(|| configure_failed(ConfigureStage::ReadMemoryMap))?;
        let region = QueueRegion::compute(map.queue_start, tx_capacity, rx_capacity)
            .ok_or_else(|| configure_failed(ConfigureStage::QueueConfig))?;
        if !self.device.configure_queues(&region) {
            return Err(configure_failed(ConfigureStage::QueueConfig));
        }

        let tx = build_tx_queue(&self.allocator, tx_capacity)?;
        let rx = match build_rx_queue(&self.allocator, rx_capacity) {
            Ok(rx) => rx,
            Err(e) => {
                // SAFETY: the device has not been pointed at the Tx queue.
                unsafe { tx.release(&self.allocator) };
                return Err(e);
            }
        };

        let (memory_map, memory) = match self.configure_memory(&config, &rx) {
            Ok(done) => done,
            Err(e) => {
                // SAFETY: memory setup failed, the device never started DMA.
                unsafe { release_queues(&self.allocator, tx, rx) };
                return Err(e);
            }
        };

        self.generation = self.generation.wrapping_add(1);
        let layout = QueueLayout::of(&tx, &rx);
        self.rings = Some(Rings {
            tx: TxRing::new(tx, &config, self.generation),
            rx: RxRing::new(rx, &config),
            layout,
            region,
            memory_map,
            memory,
        });
        self.config = config;
        info!(
            "wlan-dma: queues up, {} Tx / {} Rx descriptors",
            tx_capacity, rx_capacity
        );
        Ok(())
    }

    /// Place device packet memory behind the queues and split it.
    fn configure_memory(&self, config: &RingConfig, rx: &RxQueue) -> Result<(MemoryMap, MemoryConfig)> {
        let map = self
            .device
            .read_memory_map()
            .ok_or_else(|| configure_failed(ConfigureStage::ReadMemoryMap))?
            .finalise()
            .ok_or_else(|| configure_failed(ConfigureStage::WriteMemoryMap))?;
        if !self.device.write_memory_map(&map) {
            return Err(configure_failed(ConfigureStage::WriteMemoryMap));
        }

        let memory = MemoryConfig::split(&map, config.memory_block_size, rx.host_descriptors().base_bus())
            .ok_or_else(|| configure_failed(ConfigureStage::MemoryPools))?;
        if !self.device.configure_memory(&memory) {
            return Err(configure_failed(ConfigureStage::MemoryPools));
        }
        Ok((map, memory))
    }

    /// Claim the next free Tx slot.
    ///
    /// Fails when the ring is full or no queues exist. May pause the upper
    /// layer.
    pub fn acquire_tx_slot(&self) -> core::result::Result<TxSlot, SlotUnavailable> {
        match self.tx_ring() {
            Some(tx) => tx.acquire(&self.net),
            None => Err(SlotUnavailable),
        }
    }

    /// Hand a claimed slot to the device.
    ///
    /// Management frames go out at the fixed base rate, everything else at
    /// the configured data rate.
    pub fn submit_tx(&self, slot: TxSlot, frame: &TxFrame<'_>, kind: FrameKind) {
        match self.tx_ring() {
            Some(tx) => tx.submit(slot, frame, kind, &self.device, &self.tx_stats),
            None => warn!("wlan-dma: Tx slot {} submitted without queues", slot.index()),
        }
    }

    /// Give back a claimed slot that will not be submitted.
    pub fn cancel_tx_slot(&self, slot: TxSlot) {
        match self.tx_ring() {
            Some(tx) => tx.cancel(slot, &self.net),
            None => warn!("wlan-dma: Tx slot {} cancelled without queues", slot.index()),
        }
    }

    /// Acquire a slot and submit `frame` in one go.
    pub fn transmit(&self, frame: &TxFrame<'_>) -> core::result::Result<(), TxError> {
        let slot = self.acquire_tx_slot()?;
        self.submit_tx(slot, frame, frame.kind());
        Ok(())
    }

    /// Reclaim completed Tx slots. Returns how many came back.
    pub fn reclaim_tx_completions(&self) -> usize {
        self.tx_ring()
            .map_or(0, |tx| tx.reclaim(&self.net, &self.tx_stats))
    }

    /// Deliver completed Rx slots upward. Returns how many were handled.
    pub fn drain_rx_completions(&self) -> usize {
        self.rx_ring()
            .map_or(0, |rx| rx.drain(&self.net, &self.rx_stats, &self.quality))
    }
}

impl<A: DmaAllocator, D, N> Drop for DmaContext<A, D, N> {
    fn drop(&mut self) {
        if self.rings.is_some() {
            warn!("wlan-dma: context dropped with live queues, releasing");
            self.destroy_queues();
        }
    }
}
