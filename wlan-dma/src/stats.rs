//! Ring statistics.
//!
//! Counters are atomics so the interrupt path can bump them without taking
//! another lock; readers get a plain snapshot.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::TxCompletionError;

/// Link quality derived from the last received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WirelessQuality {
    /// Signal level, 0..=100.
    pub level: u8,
    /// Noise, 0..=100.
    pub noise: u8,
    /// 100 - noise.
    pub quality: u8,
    /// Bitmask of fields updated since last read.
    pub updated: u8,
}

impl WirelessQuality {
    /// Level, noise and quality all updated.
    pub const UPDATED_ALL: u8 = 7;

    /// Scale raw 0..=255 readings to percentages.
    pub fn from_raw(level: u8, snr: u8) -> Self {
        let scale = |v: u8| (v as u32 * 100 / 255) as u8;
        let noise = scale(snr);
        Self {
            level: scale(level),
            noise,
            quality: if noise <= 100 { 100 - noise } else { 0 },
            updated: Self::UPDATED_ALL,
        }
    }
}

/// Tx statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxStats {
    pub packets: u64,
    pub bytes: u64,
    pub errors: u64,
    pub carrier_errors: u64,
    pub lifetime_timeouts: u64,
    pub range_errors: u64,
    pub unknown_errors: u64,
}

/// Rx statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxStats {
    pub packets: u64,
    pub bytes: u64,
    pub too_short: u64,
    pub monitor_captures: u64,
}

#[derive(Default)]
pub(crate) struct TxCounters {
    packets: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
    carrier_errors: AtomicU64,
    lifetime_timeouts: AtomicU64,
    range_errors: AtomicU64,
    unknown_errors: AtomicU64,
}

impl TxCounters {
    pub fn submitted(&self, bytes: usize) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn failed(&self, err: TxCompletionError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.carrier_errors.fetch_add(1, Ordering::Relaxed);
        let class = match err {
            TxCompletionError::LifetimeTimeout => &self.lifetime_timeouts,
            TxCompletionError::RangeOrPower => &self.range_errors,
            TxCompletionError::Unknown(_) => &self.unknown_errors,
        };
        class.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TxStats {
        TxStats {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            carrier_errors: self.carrier_errors.load(Ordering::Relaxed),
            lifetime_timeouts: self.lifetime_timeouts.load(Ordering::Relaxed),
            range_errors: self.range_errors.load(Ordering::Relaxed),
            unknown_errors: self.unknown_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
pub(crate) struct RxCounters {
    packets: AtomicU64,
    bytes: AtomicU64,
    too_short: AtomicU64,
    monitor_captures: AtomicU64,
}

impl RxCounters {
    pub fn delivered(&self, bytes: usize) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn captured(&self) {
        self.monitor_captures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn too_short(&self) {
        self.too_short.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RxStats {
        RxStats {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            too_short: self.too_short.load(Ordering::Relaxed),
            monitor_captures: self.monitor_captures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_scaling() {
        let q = WirelessQuality::from_raw(255, 51);
        assert_eq!(q.level, 100);
        assert_eq!(q.noise, 20);
        assert_eq!(q.quality, 80);
        assert_eq!(q.updated, 7);

        let q = WirelessQuality::from_raw(0, 255);
        assert_eq!((q.level, q.noise, q.quality), (0, 100, 0));
    }

    #[test]
    fn test_tx_error_classes() {
        let counters = TxCounters::default();
        counters.failed(TxCompletionError::LifetimeTimeout);
        counters.failed(TxCompletionError::RangeOrPower);
        counters.failed(TxCompletionError::Unknown(0x33));
        counters.failed(TxCompletionError::RangeOrPower);

        let stats = counters.snapshot();
        assert_eq!(stats.errors, 4);
        assert_eq!(stats.carrier_errors, 4);
        assert_eq!(stats.lifetime_timeouts, 1);
        assert_eq!(stats.range_errors, 2);
        assert_eq!(stats.unknown_errors, 1);
    }
}
