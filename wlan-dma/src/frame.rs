//! Frames crossing the ring boundary and 802.11 frame-control helpers.

use core::fmt;

use crate::desc::{TX_HEADER_SIZE, TX_PAYLOAD_SIZE};
use crate::error::TxError;

// ═══════════════════════════════════════════════════════════════════════════
// FRAME CONTROL
// ═══════════════════════════════════════════════════════════════════════════

/// 802.11 frame type from the frame-control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Management,
    Control,
    Data,
    Reserved,
}

impl FrameKind {
    /// Decode the type bits of `fc`.
    pub const fn from_fc(fc: u16) -> Self {
        match (fc >> 2) & 0x3 {
            0 => Self::Management,
            1 => Self::Control,
            2 => Self::Data,
            _ => Self::Reserved,
        }
    }
}

/// Subtype bits of `fc`.
#[inline]
pub const fn subtype(fc: u16) -> u16 {
    (fc >> 4) & 0xf
}

/// Whether `fc` is a beacon.
pub const fn is_beacon(fc: u16) -> bool {
    matches!(FrameKind::from_fc(fc), FrameKind::Management) && subtype(fc) == 8
}

/// Read the frame-control word at the start of an 802.11 header.
pub fn frame_control(header: &[u8]) -> Option<u16> {
    match header {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

/// Printable "TYPE/Subtype" label for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLabel {
    pub kind: &'static str,
    pub subtype: &'static str,
}

impl fmt::Display for TypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)
    }
}

/// Label a frame-control word, e.g. "MGMT/Beacon".
pub const fn type_label(fc: u16) -> TypeLabel {
    const UNKNOWN: &str = "UNKNOWN";
    let (kind, subtype) = match FrameKind::from_fc(fc) {
        FrameKind::Management => (
            "MGMT",
            match subtype(fc) {
                0 => "AssocReq",
                1 => "AssocResp",
                2 => "ReassocReq",
                3 => "ReassocResp",
                4 => "ProbeReq",
                5 => "ProbeResp",
                8 => "Beacon",
                9 => "ATIM",
                10 => "Disassoc",
                11 => "Authen",
                12 => "Deauthen",
                _ => UNKNOWN,
            },
        ),
        FrameKind::Control => (
            "CTL",
            match subtype(fc) {
                10 => "PSPoll",
                11 => "RTS",
                12 => "CTS",
                13 => "Ack",
                14 => "CFEnd",
                15 => "CFEndCFAck",
                _ => UNKNOWN,
            },
        ),
        FrameKind::Data => (
            "DATA",
            match subtype(fc) {
                0 => "DataOnly",
                1 => "Data CFAck",
                2 => "Data CFPoll",
                3 => "Data CFAck/CFPoll",
                4 => "Null",
                5 => "CFAck",
                6 => "CFPoll",
                7 => "CFAck/CFPoll",
                _ => UNKNOWN,
            },
        ),
        FrameKind::Reserved => (UNKNOWN, UNKNOWN),
    };
    TypeLabel { kind, subtype }
}

// ═══════════════════════════════════════════════════════════════════════════
// TX FRAME
// ═══════════════════════════════════════════════════════════════════════════

/// A validated outgoing frame: 802.11 header plus payload.
#[derive(Debug, Clone, Copy)]
pub struct TxFrame<'a> {
    header: &'a [u8],
    payload: &'a [u8],
    tx_time: u32,
}

impl<'a> TxFrame<'a> {
    /// Check that both parts fit their DMA buffers.
    pub fn new(header: &'a [u8], payload: &'a [u8]) -> Result<Self, TxError> {
        if header.len() > TX_HEADER_SIZE {
            return Err(TxError::HeaderTooLarge { len: header.len() });
        }
        if payload.len() > TX_PAYLOAD_SIZE {
            return Err(TxError::PayloadTooLarge { len: payload.len() });
        }
        Ok(Self { header, payload, tx_time: 0 })
    }

    /// Stamp the frame with the submitting tick.
    pub fn with_tx_time(mut self, tick: u32) -> Self {
        self.tx_time = tick;
        self
    }

    pub fn header(&self) -> &'a [u8] {
        self.header
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn tx_time(&self) -> u32 {
        self.tx_time
    }

    /// Header plus payload length.
    pub fn total_len(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    /// Frame-control word, if the header carries one.
    pub fn frame_control(&self) -> Option<u16> {
        frame_control(self.header)
    }

    /// Frame type from the header; headerless frames count as data.
    pub fn kind(&self) -> FrameKind {
        self.frame_control().map_or(FrameKind::Data, FrameKind::from_fc)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RX FRAME
// ═══════════════════════════════════════════════════════════════════════════

/// A received frame handed to the upper layer.
///
/// `data` borrows the Rx buffer and is only valid for the duration of the
/// delivery call; the slot goes back to the device right after.
#[derive(Debug, Clone, Copy)]
pub struct RxFrame<'a> {
    /// Ring slot the frame came from.
    pub index: usize,
    /// 802.11 header and body.
    pub data: &'a [u8],
    /// Frame length, clamped to what the Rx buffer holds.
    pub length: usize,
    /// Raw signal level, 0..=255.
    pub level: u8,
    /// Raw SNR, 0..=255.
    pub snr: u8,
    /// MAC timestamp.
    pub mac_time: u32,
}

impl RxFrame<'_> {
    /// Frame-control word of the received frame.
    pub fn frame_control(&self) -> Option<u16> {
        frame_control(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_labels() {
        let label = |fc| {
            let l = type_label(fc);
            (l.kind, l.subtype)
        };
        assert_eq!(label(0x0080), ("MGMT", "Beacon"));
        assert_eq!(label(0x00b0), ("MGMT", "Authen"));
        assert_eq!(label(0x00b4), ("CTL", "RTS"));
        assert_eq!(label(0x00d4), ("CTL", "Ack"));
        assert_eq!(label(0x0008), ("DATA", "DataOnly"));
        assert_eq!(label(0x0048), ("DATA", "Null"));
        assert_eq!(label(0x0060), ("MGMT", "UNKNOWN"));
        assert_eq!(label(0x000c), ("UNKNOWN", "UNKNOWN"));
    }

    #[test]
    fn test_frame_kind() {
        assert_eq!(FrameKind::from_fc(0x0080), FrameKind::Management);
        assert_eq!(FrameKind::from_fc(0x0008), FrameKind::Data);
        assert!(is_beacon(0x0080));
        assert!(!is_beacon(0x0008));
    }

    #[test]
    fn test_tx_frame_validation() {
        let header = [0x08, 0x00, 0, 0];
        let frame = TxFrame::new(&header, &[0u8; 100]).unwrap();
        assert_eq!(frame.kind(), FrameKind::Data);
        assert_eq!(frame.total_len(), 104);

        assert_eq!(
            TxFrame::new(&[0u8; TX_HEADER_SIZE + 1], &[]).unwrap_err(),
            TxError::HeaderTooLarge { len: TX_HEADER_SIZE + 1 }
        );
        assert_eq!(
            TxFrame::new(&header, &[0u8; TX_PAYLOAD_SIZE + 1]).unwrap_err(),
            TxError::PayloadTooLarge { len: TX_PAYLOAD_SIZE + 1 }
        );
        assert_eq!(TxFrame::new(&[], &[1, 2]).unwrap().kind(), FrameKind::Data);
    }
}
