//! Slot ownership state machine.
//!
//! # Tx
//! ```text
//!   HOST_IDLE ──acquire()──> HOST_CLAIMED ──submit()──> DEVICE
//!       ▲                                                 │
//!       └───────────reclaim()────── DONE <──device tx─────┘
//! ```
//!
//! # Rx
//! ```text
//!   DEVICE ──device rx──> HOST_FULL ──drain()──> DEVICE
//! ```
//!
//! INVARIANT: the host never writes a descriptor in a device-owned state.
//! Only the ring lock holder moves a slot between states.

use crate::desc::{DescCtl, HostCtl, RX_STATUS_COMPLETE};

/// State of a Tx slot as read from its descriptor control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOwnership {
    /// Host-owned, free to hand out (or handed out, not yet submitted).
    Host,
    /// Device owns the slot and may still be reading it.
    Device,
    /// Device finished; waiting to be reclaimed.
    Done,
}

impl TxOwnership {
    /// Classify a raw control byte.
    pub const fn from_ctl(ctl: u8) -> Self {
        let ctl = DescCtl::from_bits_retain(ctl);
        if ctl.is_done() {
            Self::Done
        } else if ctl.host_owned() {
            Self::Host
        } else {
            Self::Device
        }
    }
}

/// State of an Rx slot as read from its host descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxOwnership {
    /// Device owns the buffer and may fill it.
    Device,
    /// Host owns the buffer but the device has not marked it complete.
    HostPending,
    /// Buffer holds a complete frame for the host.
    Ready,
}

impl RxOwnership {
    /// Classify host descriptor control and status words.
    pub const fn from_host(ctl: u16, status: u32) -> Self {
        let owned = HostCtl::from_bits_retain(ctl).contains(HostCtl::OWN);
        match (owned, status & RX_STATUS_COMPLETE != 0) {
            (true, true) => Self::Ready,
            (true, false) => Self::HostPending,
            (false, _) => Self::Device,
        }
    }
}
