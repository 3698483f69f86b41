//! Tx/Rx ring managers and diagnostics.

pub mod diag;
pub mod rx;
pub mod tx;

pub use diag::{ring_length, RxRingReport, TxRingReport};
pub use rx::RxRing;
pub use tx::{TxRing, TxSlot, RING_GAP};
