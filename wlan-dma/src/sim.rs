//! Loopback device model.
//!
//! Stands in for the adapter when there is no hardware: answers the
//! configuration commands from an in-memory memory map and plays the
//! device side of both rings through the same descriptor memory the real
//! DMA engine would touch. Follows the descriptor `next` links, so a broken
//! ring shows up as a stalled device.

use core::sync::atomic::{fence, AtomicUsize, Ordering};

use log::{debug, warn};
use spin::Mutex;

use crate::desc::{
    DescCtl, HostCtl, RxBufferHeader, RX_BUFFER_HEADER, RX_BUFFER_SIZE, RX_PHY_HEADER,
    RX_STATUS_COMPLETE,
};
use crate::dma::TxOwnership;
use crate::error::ConfigureStage;
use crate::region::{MemoryConfig, MemoryMap, QueueRegion};
use crate::ring::{RxRing, TxRing};
use crate::traits::DeviceIo;

/// Memory map of a freshly reset adapter.
pub const DEFAULT_MEMORY_MAP: MemoryMap = MemoryMap {
    code_start: 0x0000_0000,
    code_end: 0x0000_e000,
    wep_cache_start: 0x0000_e000,
    wep_cache_end: 0x0000_f000,
    packet_template_start: 0x0000_f000,
    packet_template_end: 0x0001_0000,
    queue_start: 0x0001_0000,
    queue_end: 0x0001_0000,
    pool_start: 0,
    pool_end: 0x0002_0000,
};

#[derive(Debug, Default)]
struct DeviceState {
    map: MemoryMap,
    region: Option<QueueRegion>,
    memory: Option<MemoryConfig>,
    tx_cursor: usize,
    rx_cursor: usize,
}

/// In-memory adapter implementing [`DeviceIo`].
pub struct LoopbackDevice {
    state: Mutex<DeviceState>,
    fail_at: Option<ConfigureStage>,
    phy_header: bool,
    triggers: AtomicUsize,
}

impl LoopbackDevice {
    pub fn new() -> Self {
        Self::with_memory_map(DEFAULT_MEMORY_MAP)
    }

    pub fn with_memory_map(map: MemoryMap) -> Self {
        Self {
            state: Mutex::new(DeviceState { map, ..DeviceState::default() }),
            fail_at: None,
            phy_header: false,
            triggers: AtomicUsize::new(0),
        }
    }

    /// Reject the given configuration step.
    pub fn failing_at(mut self, stage: ConfigureStage) -> Self {
        self.fail_at = Some(stage);
        self
    }

    /// Prepend a PHY header to received frames.
    pub fn with_phy_header(mut self, enable: bool) -> Self {
        self.phy_header = enable;
        self
    }

    fn fails(&self, stage: ConfigureStage) -> bool {
        if self.fail_at == Some(stage) {
            debug!("loopback: rejecting {}", stage);
            return true;
        }
        false
    }

    /// Number of `trigger_tx` calls seen.
    pub fn trigger_count(&self) -> usize {
        self.triggers.load(Ordering::Relaxed)
    }

    /// Current memory map as the device sees it.
    pub fn memory_map(&self) -> MemoryMap {
        self.state.lock().map
    }

    /// Last queue region programmed.
    pub fn queue_region(&self) -> Option<QueueRegion> {
        self.state.lock().region
    }

    /// Last memory split programmed.
    pub fn memory_config(&self) -> Option<MemoryConfig> {
        self.state.lock().memory
    }

    /// Next Tx slot the device will transmit.
    pub fn tx_cursor(&self) -> usize {
        self.state.lock().tx_cursor
    }

    /// Next Rx slot the device will fill.
    pub fn rx_cursor(&self) -> usize {
        self.state.lock().rx_cursor
    }

    /// Transmit up to `max` submitted slots, completing each with `error`.
    ///
    /// Steps over slots the host already marked done and stops at the first
    /// slot not handed to the device. Returns how many were completed.
    pub fn complete_tx(&self, ring: &TxRing, max: usize, error: u8) -> usize {
        let descs = ring.queue().descriptors();
        let mut st = self.state.lock();
        let mut done = 0;
        let mut steps = 0;

        while done < max && steps < descs.len() {
            let d = descs.get(st.tx_cursor);
            match TxOwnership::from_ctl(d.ctl()) {
                TxOwnership::Host => break,
                TxOwnership::Done => debug!("loopback: skipping completed Tx desc {}", st.tx_cursor),
                TxOwnership::Device => {
                    fence(Ordering::Acquire);
                    d.set_error(error);
                    d.set_ack_failures(0);
                    fence(Ordering::Release);
                    d.set_ctl(d.ctl() | DescCtl::DONE.bits());
                    done += 1;
                }
            }
            steps += 1;

            match descs.index_of(d.next()) {
                Some(next) => st.tx_cursor = next,
                None => {
                    warn!("loopback: Tx desc {} links outside the ring ({:#x})", st.tx_cursor, d.next());
                    break;
                }
            }
        }
        done
    }

    /// Receive `frame` into the next device-owned Rx slot.
    ///
    /// Returns `false` if the host has not given that slot back yet.
    pub fn receive(&self, ring: &RxRing, frame: &[u8], level: u8, snr: u8, mac_time: u32) -> bool {
        let queue = ring.queue();
        let mut st = self.state.lock();
        let idx = st.rx_cursor;
        let h = queue.host_descriptors().get(idx);
        if HostCtl::from_bits_retain(h.ctl()).contains(HostCtl::OWN) {
            debug!("loopback: Rx slot {} still with host, dropping frame", idx);
            return false;
        }

        let start = RX_BUFFER_HEADER + if self.phy_header { RX_PHY_HEADER } else { 0 };
        let len = frame.len().min(RX_BUFFER_SIZE - start).min(0xfff);
        let status = RX_STATUS_COMPLETE | len as u32;

        // SAFETY: the host descriptor is device-owned, the host does not
        // touch the buffer until OWN is set below.
        let buf = unsafe { queue.buffers().slice_mut(idx) };
        RxBufferHeader { status, level, snr, mac_time }.write(buf);
        buf[RX_BUFFER_HEADER..start].fill(0);
        buf[start..start + len].copy_from_slice(&frame[..len]);

        fence(Ordering::Release);
        h.set_status(status);
        h.set_ctl(h.ctl() | HostCtl::OWN.bits());

        let d = queue.descriptors().get(idx);
        match queue.descriptors().index_of(d.next()) {
            Some(next) => st.rx_cursor = next,
            None => warn!("loopback: Rx desc {} links outside the ring ({:#x})", idx, d.next()),
        }
        true
    }
}

impl Default for LoopbackDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceIo for LoopbackDevice {
    fn read_memory_map(&self) -> Option<MemoryMap> {
        if self.fails(ConfigureStage::ReadMemoryMap) {
            return None;
        }
        Some(self.state.lock().map)
    }

    fn configure_queues(&self, region: &QueueRegion) -> bool {
        if self.fails(ConfigureStage::QueueConfig) {
            return false;
        }
        let mut st = self.state.lock();
        st.map.queue_end = region.queue_end;
        st.region = Some(*region);
        st.tx_cursor = 0;
        st.rx_cursor = 0;
        true
    }

    fn write_memory_map(&self, map: &MemoryMap) -> bool {
        if self.fails(ConfigureStage::WriteMemoryMap) {
            return false;
        }
        self.state.lock().map = *map;
        true
    }

    fn configure_memory(&self, config: &MemoryConfig) -> bool {
        if self.fails(ConfigureStage::MemoryPools) {
            return false;
        }
        self.state.lock().memory = Some(*config);
        true
    }

    fn trigger_tx(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
    }
}
