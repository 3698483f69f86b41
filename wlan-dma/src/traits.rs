//! Collaborator interfaces.
//!
//! The ring core never touches device registers or the network stack
//! directly. The embedding driver supplies these.

use crate::frame::RxFrame;
use crate::region::{MemoryConfig, MemoryMap, QueueRegion};

/// Device register and command access needed by the rings.
pub trait DeviceIo {
    /// Read the device memory map. `None` if the command failed.
    fn read_memory_map(&self) -> Option<MemoryMap>;

    /// Program the queue region. Returns `false` if the device rejected it.
    fn configure_queues(&self, region: &QueueRegion) -> bool;

    /// Write back a finalised memory map.
    fn write_memory_map(&self, map: &MemoryMap) -> bool;

    /// Program the Tx/Rx memory split and start device memory.
    fn configure_memory(&self, config: &MemoryConfig) -> bool;

    /// Tell the device new Tx descriptors are waiting.
    ///
    /// Called with the Tx lock held; must not block.
    fn trigger_tx(&self);
}

/// Flow control towards the upper layer.
///
/// Called after the Tx lock is released, so implementations may query the
/// ring or transmit from inside either hook.
pub trait TxAdmission {
    /// Stop handing frames to the driver.
    fn queue_pause(&self);

    /// Resume handing frames to the driver.
    fn queue_resume(&self);
}

/// Upward delivery of received frames.
///
/// Called from the Rx drain without the Rx lock held.
pub trait RxDelivery {
    /// A received 802.11 frame.
    fn deliver_frame(&self, frame: &RxFrame<'_>);

    /// A raw Rx buffer in monitor mode, status header included.
    fn deliver_monitor_capture(&self, buffer: &[u8]);
}
