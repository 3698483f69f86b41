//! Descriptor layouts shared with the device.
//!
//! All fields are little-endian as the device reads them; every multi-byte
//! field sits on its natural alignment, so structs need at most 4-byte
//! alignment and a host descriptor pool may start at any word boundary.
//!
//! # Layout
//! ```text
//! TxDescriptor      0x30  device ring, one per Tx slot
//! HostDescriptor    0x2c  host side, two per Tx slot (header, payload),
//!                         one per Rx slot
//! RxDescriptor      0x34  device ring, one per Rx slot
//! ```

use bitflags::bitflags;

// ═══════════════════════════════════════════════════════════════════════════
// CONTROL BITS
// ═══════════════════════════════════════════════════════════════════════════

bitflags! {
    /// Tx descriptor control byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescCtl: u8 {
        const SHORT_PREAMBLE = 0x01;
        const FIRST_FRAG     = 0x02;
        const AUTO_DMA       = 0x04;
        const RECLAIM        = 0x08;
        const HOST_DONE      = 0x20;
        const ACX_DONE       = 0x40;
        /// Set: host owns the descriptor. Clear: device owns it.
        const OWN            = 0x80;
    }
}

impl DescCtl {
    /// Value written at build time.
    pub const INIT: Self = Self::from_bits_truncate(0x8e);
    /// Host-owned idle value a reclaimed descriptor returns to.
    pub const IDLE: Self = Self::OWN;
    /// Device finished and handed the descriptor back.
    pub const DONE: Self = Self::from_bits_truncate(0xc0);
    /// Bits set on every submitted frame.
    pub const SUBMIT: Self = Self::from_bits_truncate(0x0e);

    /// Whether the host may write the descriptor.
    pub const fn host_owned(self) -> bool {
        self.contains(Self::OWN)
    }

    /// Whether the device completed the descriptor.
    pub const fn is_done(self) -> bool {
        self.contains(Self::DONE)
    }
}

bitflags! {
    /// Tx descriptor second control byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescCtl2: u8 {
        /// Do RTS/CTS before the frame.
        const RTS = 0x20;
    }
}

bitflags! {
    /// Host descriptor control word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HostCtl: u16 {
        /// Set: host owns the descriptor.
        const OWN = 0x80;
    }
}

/// Host descriptor status bit set by the device once an Rx buffer is full.
pub const RX_STATUS_COMPLETE: u32 = 1 << 31;

/// Control value of an Rx descriptor available for receive.
pub const RX_DESC_CTL_AVAILABLE: u8 = 0x0c;

/// Value the device expects at offset 0x28 of an Rx host descriptor.
pub const RX_HOST_FLAGS: u16 = 2;

// ═══════════════════════════════════════════════════════════════════════════
// DESCRIPTORS
// ═══════════════════════════════════════════════════════════════════════════

/// A fixed-size record living in DMA memory.
pub trait Descriptor: Sized {
    /// Size in bytes, the stride of a pool.
    const SIZE: usize = core::mem::size_of::<Self>();
    /// Name used in logs.
    const NAME: &'static str;
}

/// Device-visible Tx descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TxDescriptor {
    /// Bus address of the next descriptor.
    pub next: u32,
    /// Bus address of the header host descriptor.
    pub host_mem_ptr: u32,
    /// Device-internal buffer pointer.
    pub acx_mem_ptr: u32,
    /// Submission tick.
    pub tx_time: u32,
    /// Header + payload length.
    pub total_length: u16,
    pub reserved0: u16,
    pub reserved1: [u32; 4],
    pub ctl: u8,
    pub ctl2: u8,
    /// Completion error code, 0 on success.
    pub error: u8,
    pub ack_failures: u8,
    pub rts_failures: u8,
    pub rts_ok: u8,
    /// Tx rate, 100 kbps units.
    pub rate: u8,
    pub queue_ctrl: u8,
    pub queue_info: u32,
}

impl Descriptor for TxDescriptor {
    const NAME: &'static str = "txdesc";
}

/// Host-side descriptor carrying a data buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDescriptor {
    /// Bus address of the data buffer.
    pub data_phy: u32,
    pub data_offset: u16,
    pub reserved0: u16,
    pub ctl: u16,
    /// Bytes valid in the buffer (Tx) or buffer size (Rx).
    pub length: u16,
    /// Bus address of the next host descriptor in the ring.
    pub desc_phy_next: u32,
    /// Next descriptor of the same frame, 0 when last.
    pub pnext: u32,
    pub status: u32,
    /// Bus address of this descriptor.
    pub desc_phy: u32,
    pub reserved1: [u32; 3],
    pub host_flags: u16,
    pub rate: u8,
    pub reserved2: u8,
}

impl Descriptor for HostDescriptor {
    const NAME: &'static str = "hostdesc";
}

/// Device-visible Rx descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RxDescriptor {
    /// Bus address of this descriptor.
    pub phy_addr: u32,
    /// Bus address of the paired host descriptor.
    pub host_mem_ptr: u32,
    pub ctl: u8,
    pub rate: u8,
    pub error: u8,
    pub snr: u8,
    /// Bus address of the next descriptor.
    pub next: u32,
    pub reserved: [u32; 9],
}

impl Descriptor for RxDescriptor {
    const NAME: &'static str = "rxdesc";
}

const _: () = assert!(core::mem::size_of::<TxDescriptor>() == 0x30);
const _: () = assert!(core::mem::size_of::<HostDescriptor>() == 0x2c);
const _: () = assert!(core::mem::size_of::<RxDescriptor>() == 0x34);
const _: () = assert!(core::mem::align_of::<HostDescriptor>() <= dma_pool::WORD_ALIGN);

// ═══════════════════════════════════════════════════════════════════════════
// BUFFERS
// ═══════════════════════════════════════════════════════════════════════════

/// Bytes per Tx header buffer.
pub const TX_HEADER_SIZE: usize = 0x26;

/// Bytes per Tx payload buffer (max Ethernet frame minus its header).
pub const TX_PAYLOAD_SIZE: usize = 1500;

/// Bytes per Rx buffer.
pub const RX_BUFFER_SIZE: usize = 0x956;

/// Rx buffer status header preceding the frame.
pub const RX_BUFFER_HEADER: usize = 0x0c;

/// PHY header the device may insert before the 802.11 header.
pub const RX_PHY_HEADER: usize = 4;

/// Slack added to host descriptor pools for start alignment.
pub const HOST_DESC_SLACK: usize = 3;

/// Status header at the start of every Rx buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxBufferHeader {
    /// Raw status word; low 12 bits are the frame length.
    pub status: u32,
    /// Signal level, 0..=255.
    pub level: u8,
    /// Signal-to-noise, 0..=255.
    pub snr: u8,
    /// MAC timestamp.
    pub mac_time: u32,
}

impl RxBufferHeader {
    /// Parse from the first bytes of an Rx buffer.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let hdr = buf.get(..RX_BUFFER_HEADER)?;
        Some(Self {
            status: u32::from_le_bytes([hdr[0], hdr[1], hdr[2], hdr[3]]),
            level: hdr[6],
            snr: hdr[7],
            mac_time: u32::from_le_bytes([hdr[8], hdr[9], hdr[10], hdr[11]]),
        })
    }

    /// Encode into the first bytes of `buf`.
    pub fn write(&self, buf: &mut [u8]) {
        if buf.len() < RX_BUFFER_HEADER {
            return;
        }
        buf[0..4].copy_from_slice(&self.status.to_le_bytes());
        buf[4..6].fill(0);
        buf[6] = self.level;
        buf[7] = self.snr;
        buf[8..12].copy_from_slice(&self.mac_time.to_le_bytes());
    }

    /// Frame length reported by the device.
    pub const fn frame_len(&self) -> usize {
        (self.status & 0xfff) as usize
    }
}
