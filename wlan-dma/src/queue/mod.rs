//! Descriptor queue construction.

pub mod builder;

pub use builder::{build_rx_queue, build_tx_queue, RxQueue, TxQueue};

use alloc::vec::Vec;

use crate::error::AlignmentWarning;

/// Where the builder placed the host descriptor rings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueLayout {
    /// Offset of the first Tx host descriptor in its pool.
    pub tx_host_offset: usize,
    /// Offset of the first Rx host descriptor in its pool.
    pub rx_host_offset: usize,
    /// Alignment warnings raised while building.
    pub warnings: Vec<AlignmentWarning>,
}

impl QueueLayout {
    pub(crate) fn of(tx: &TxQueue, rx: &RxQueue) -> Self {
        Self {
            tx_host_offset: tx.host.offset(),
            rx_host_offset: rx.host.offset(),
            warnings: tx.warning.into_iter().chain(rx.warning).collect(),
        }
    }
}
