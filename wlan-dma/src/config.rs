//! Ring configuration.
//!
//! Defaults match a PCI/CardBus adapter. USB adapters use shorter rings,
//! see [`RingConfig::usb`].

use crate::error::{DmaError, Result};
use crate::ring::RING_GAP;

/// Tx ring length for PCI/CardBus adapters.
pub const TX_BUFFER_COUNT: usize = 16;

/// Rx ring length for PCI/CardBus adapters.
pub const RX_BUFFER_COUNT: usize = 16;

/// Ring length for USB adapters.
pub const USB_BUFFER_COUNT: usize = 10;

/// Largest ring the builder accepts.
pub const MAX_RING_CAPACITY: usize = 256;

/// Free-slot count at which the upper layer is paused.
pub const MIN_FREE_TX: usize = 3;

/// Rate used for management frames (2 Mbps, 100 kbps units).
pub const MGMT_RATE: u8 = 20;

/// Default data rate (11 Mbps, 100 kbps units).
pub const DEFAULT_DATA_RATE: u8 = 110;

/// Default RTS threshold; frames longer than this get RTS/CTS.
pub const DEFAULT_RTS_THRESHOLD: u16 = 2312;

/// Shortest frame handed to the upper layer.
pub const MIN_RX_FRAME_LEN: usize = 14;

/// Default device memory block size.
pub const DEFAULT_MEMORY_BLOCK_SIZE: u32 = 256;

/// Descriptor ring configuration.
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Number of Tx descriptors.
    pub tx_capacity: usize,
    /// Number of Rx descriptors.
    pub rx_capacity: usize,
    /// Pause the upper layer once free Tx slots drop to this count.
    pub low_water: usize,
    /// Resume once free slots reach `low_water + resume_margin`.
    pub resume_margin: usize,
    /// Frames longer than this use RTS/CTS.
    pub rts_threshold: u16,
    /// Use short preamble.
    pub short_preamble: bool,
    /// Rate for data frames, 100 kbps units.
    pub data_rate: u8,
    /// Hand raw captures to the monitor sink instead of delivering frames.
    pub monitor: bool,
    /// The device prepends a 4-byte PHY header to received frames.
    pub rx_include_phy_header: bool,
    /// Frames shorter than this are dropped.
    pub min_rx_frame_len: usize,
    /// Device memory block size.
    pub memory_block_size: u32,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            tx_capacity: TX_BUFFER_COUNT,
            rx_capacity: RX_BUFFER_COUNT,
            low_water: MIN_FREE_TX,
            resume_margin: 1,
            rts_threshold: DEFAULT_RTS_THRESHOLD,
            short_preamble: false,
            data_rate: DEFAULT_DATA_RATE,
            monitor: false,
            rx_include_phy_header: false,
            min_rx_frame_len: MIN_RX_FRAME_LEN,
            memory_block_size: DEFAULT_MEMORY_BLOCK_SIZE,
        }
    }
}

impl RingConfig {
    /// Config for USB adapters.
    pub fn usb() -> Self {
        Self {
            tx_capacity: USB_BUFFER_COUNT,
            rx_capacity: USB_BUFFER_COUNT,
            ..Default::default()
        }
    }

    /// Set ring lengths.
    pub fn capacities(mut self, tx: usize, rx: usize) -> Self {
        self.tx_capacity = tx;
        self.rx_capacity = rx;
        self
    }

    /// Set the pause threshold.
    pub fn low_water(mut self, free: usize) -> Self {
        self.low_water = free;
        self
    }

    /// Set how far above the low-water mark the queue must recover.
    pub fn with_hysteresis(mut self, margin: usize) -> Self {
        self.resume_margin = margin;
        self
    }

    /// Set RTS threshold.
    pub fn rts_threshold(mut self, bytes: u16) -> Self {
        self.rts_threshold = bytes;
        self
    }

    /// Enable short preamble.
    pub fn short_preamble(mut self, enabled: bool) -> Self {
        self.short_preamble = enabled;
        self
    }

    /// Set the data frame rate.
    pub fn data_rate(mut self, rate: u8) -> Self {
        self.data_rate = rate;
        self
    }

    /// Enable monitor mode.
    pub fn monitor(mut self, enabled: bool) -> Self {
        self.monitor = enabled;
        self
    }

    /// Expect a PHY header in front of received frames.
    pub fn rx_phy_header(mut self, enabled: bool) -> Self {
        self.rx_include_phy_header = enabled;
        self
    }

    /// Free count at which a paused queue is resumed.
    pub fn resume_threshold(&self) -> usize {
        self.low_water + self.resume_margin
    }

    /// Check ring lengths and thresholds.
    pub fn validate(&self) -> Result<()> {
        for n in [self.tx_capacity, self.rx_capacity] {
            if n == 0 || n > MAX_RING_CAPACITY {
                return Err(DmaError::InvalidCapacity(n));
            }
        }
        if self.tx_capacity <= RING_GAP || self.low_water >= self.tx_capacity {
            return Err(DmaError::InvalidCapacity(self.tx_capacity));
        }
        if self.memory_block_size == 0 {
            return Err(DmaError::InvalidCapacity(0));
        }
        Ok(())
    }
}
