//! Error types for the descriptor ring core.

use core::fmt;

use dma_pool::AllocationError;

/// Pools making up a DMA context, in build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// 802.11 header buffers for Tx.
    TxHeaders,
    /// Payload buffers for Tx.
    TxPayloads,
    /// Tx host descriptors (header/payload pairs).
    TxHostDescriptors,
    /// Device-visible Tx descriptors.
    TxDescriptors,
    /// Rx host descriptors.
    RxHostDescriptors,
    /// Rx buffers.
    RxBuffers,
    /// Device-visible Rx descriptors.
    RxDescriptors,
}

impl PoolKind {
    /// Short name used in log lines.
    pub const fn name(self) -> &'static str {
        match self {
            Self::TxHeaders => "tx-headers",
            Self::TxPayloads => "tx-payloads",
            Self::TxHostDescriptors => "tx-host-desc",
            Self::TxDescriptors => "tx-desc",
            Self::RxHostDescriptors => "rx-host-desc",
            Self::RxBuffers => "rx-buffers",
            Self::RxDescriptors => "rx-desc",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device configuration steps run by `create_queues`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureStage {
    /// Reading the device memory map.
    ReadMemoryMap,
    /// Programming the queue region.
    QueueConfig,
    /// Writing back the finalised memory map.
    WriteMemoryMap,
    /// Splitting device memory into Tx/Rx blocks.
    MemoryPools,
}

impl fmt::Display for ConfigureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadMemoryMap => write!(f, "memory map read"),
            Self::QueueConfig => write!(f, "queue configuration"),
            Self::WriteMemoryMap => write!(f, "memory map write"),
            Self::MemoryPools => write!(f, "memory pool setup"),
        }
    }
}

/// Errors from bringing the DMA context up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaError {
    /// A pool could not be allocated.
    Allocation {
        /// Pool that failed.
        pool: PoolKind,
        /// Allocator error.
        source: AllocationError,
    },
    /// The device rejected a configuration step.
    DeviceConfigure(ConfigureStage),
    /// Ring capacity outside the supported range.
    InvalidCapacity(usize),
    /// Queues already exist; destroy them first.
    AlreadyCreated,
}

impl DmaError {
    pub(crate) const fn alloc(pool: PoolKind, source: AllocationError) -> Self {
        Self::Allocation { pool, source }
    }
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { pool, source } => write!(f, "{} allocation failed: {}", pool, source),
            Self::DeviceConfigure(stage) => write!(f, "device rejected {}", stage),
            Self::InvalidCapacity(n) => write!(f, "invalid ring capacity {}", n),
            Self::AlreadyCreated => write!(f, "DMA queues already created"),
        }
    }
}

/// Result type for context bring-up.
pub type Result<T> = core::result::Result<T, DmaError>;

/// No Tx descriptor is free; the caller should back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotUnavailable;

impl fmt::Display for SlotUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no free Tx descriptor")
    }
}

/// TX error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxError {
    /// No descriptor available or queues not created.
    NotReady,
    /// 802.11 header exceeds a header buffer.
    HeaderTooLarge {
        /// Header length.
        len: usize,
    },
    /// Payload exceeds a payload buffer.
    PayloadTooLarge {
        /// Payload length.
        len: usize,
    },
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "Tx ring not ready"),
            Self::HeaderTooLarge { len } => write!(f, "802.11 header too large ({} bytes)", len),
            Self::PayloadTooLarge { len } => write!(f, "payload too large ({} bytes)", len),
        }
    }
}

impl From<SlotUnavailable> for TxError {
    fn from(_: SlotUnavailable) -> Self {
        Self::NotReady
    }
}

/// Error reported by the device in a completed Tx descriptor.
///
/// Recorded in statistics only, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxCompletionError {
    /// 0x10: MSDU lifetime expired before the frame went out.
    LifetimeTimeout,
    /// 0x20: no acknowledgement, peer out of range or Tx power too low.
    RangeOrPower,
    /// Any other non-zero code.
    Unknown(u8),
}

impl TxCompletionError {
    /// Classify a descriptor error byte; `None` for 0.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => None,
            0x10 => Some(Self::LifetimeTimeout),
            0x20 => Some(Self::RangeOrPower),
            other => Some(Self::Unknown(other)),
        }
    }

    /// Raw error byte.
    pub const fn code(self) -> u8 {
        match self {
            Self::LifetimeTimeout => 0x10,
            Self::RangeOrPower => 0x20,
            Self::Unknown(code) => code,
        }
    }

    /// Operator hint logged with the error.
    pub const fn hint(self) -> &'static str {
        match self {
            Self::LifetimeTimeout => "MSDU lifetime timeout? - raise the retry lifetime",
            Self::RangeOrPower => "maybe distance too high? - raise the Tx power",
            Self::Unknown(_) => "unknown error",
        }
    }
}

impl fmt::Display for TxCompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tx error {:#04x} ({})", self.code(), self.hint())
    }
}

/// The host descriptor pool was not aligned to the DMA unit.
///
/// Wiring starts `offset` bytes in; the build carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentWarning {
    /// Pool that was misaligned.
    pub pool: PoolKind,
    /// Bytes skipped to the first aligned entry.
    pub offset: usize,
}

impl fmt::Display for AlignmentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} not aligned, wiring from offset {}", self.pool, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_error_classification() {
        assert_eq!(TxCompletionError::from_code(0), None);
        assert_eq!(TxCompletionError::from_code(0x10), Some(TxCompletionError::LifetimeTimeout));
        assert_eq!(TxCompletionError::from_code(0x20), Some(TxCompletionError::RangeOrPower));
        assert_eq!(TxCompletionError::from_code(0x33), Some(TxCompletionError::Unknown(0x33)));
        assert_eq!(TxCompletionError::Unknown(0x33).code(), 0x33);
    }

    #[test]
    fn test_slot_unavailable_maps_to_not_ready() {
        assert_eq!(TxError::from(SlotUnavailable), TxError::NotReady);
    }
}
