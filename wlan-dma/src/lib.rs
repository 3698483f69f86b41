//! MorpheusX wireless DMA rings
//!
//! Descriptor ring core for ACX100/ACX111 class adapters: pool layout,
//! Tx slot handout and reclaim, Rx drain and hand-off upward.
//!
//! # Layers
//! ```text
//!   DmaContext        create/destroy queues, data-path entry points
//!     ring::{tx,rx}   cursors, ownership flips, backpressure
//!     queue           pool allocation and descriptor wiring
//!     dma             descriptor arenas and packet buffers
//!   dma_pool          DMA-capable memory
//! ```
//!
//! Register access, 802.11 framing and the network stack stay outside and
//! are reached through [`DeviceIo`], [`TxAdmission`] and [`RxDelivery`].

#![no_std]

extern crate alloc;

pub mod config;
pub mod context;
pub mod desc;
pub mod dma;
pub mod error;
pub mod frame;
pub mod queue;
pub mod region;
pub mod ring;
pub mod sim;
pub mod stats;
pub mod sync;
pub mod traits;

pub use config::RingConfig;
pub use context::DmaContext;
pub use error::{
    AlignmentWarning, ConfigureStage, DmaError, PoolKind, Result, SlotUnavailable,
    TxCompletionError, TxError,
};
pub use frame::{type_label, FrameKind, RxFrame, TxFrame};
pub use queue::QueueLayout;
pub use region::{MemoryConfig, MemoryMap, QueueRegion};
pub use ring::{RxRing, RxRingReport, TxRing, TxRingReport, TxSlot};
pub use sim::LoopbackDevice;
pub use stats::{RxStats, TxStats, WirelessQuality};
pub use traits::{DeviceIo, RxDelivery, TxAdmission};
