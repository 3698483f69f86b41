//! Read-only ring diagnostics.
//!
//! Sweeps read descriptor memory only. Cursors are sampled with
//! `try_lock`, so a sweep never spins on a ring lock and never blocks the
//! interrupt path.

use log::trace;

use crate::desc::Descriptor;
use crate::dma::{DescriptorPool, RxOwnership, TxOwnership};
use crate::queue::{RxQueue, TxQueue};
use crate::ring::{RxRing, TxRing};

/// Log Tx slots the device finished but nobody reclaimed yet.
///
/// Returns how many there are.
pub fn log_tx_buffers(queue: &TxQueue) -> usize {
    let mut done = 0;
    for i in 0..queue.capacity() {
        if TxOwnership::from_ctl(queue.descs.get(i).ctl()) == TxOwnership::Done {
            trace!("wlan-dma: txbuf {} done", i);
            done += 1;
        }
    }
    done
}

/// Log Rx slots holding a complete frame not drained yet.
///
/// Returns how many there are.
pub fn log_rx_buffers(queue: &RxQueue) -> usize {
    let mut full = 0;
    for i in 0..queue.capacity() {
        let h = queue.host.get(i);
        if RxOwnership::from_host(h.ctl(), h.status()) == RxOwnership::Ready {
            trace!("wlan-dma: rxbuf {} full", i);
            full += 1;
        }
    }
    full
}

/// Follow `next` links from `start` until they come back around.
///
/// Returns the number of hops, or `None` if a link leaves the pool or the
/// walk does not close within the pool size.
pub fn ring_length<T, F>(pool: &DescriptorPool<T>, start: usize, next: F) -> Option<usize>
where
    T: Descriptor + Default,
    F: Fn(&DescriptorPool<T>, usize) -> u32,
{
    let mut idx = start;
    for hops in 1..=pool.len() {
        idx = pool.index_of(next(pool, idx))?;
        if idx == start {
            return Some(hops);
        }
    }
    None
}

/// Point-in-time view of the Tx ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRingReport {
    /// `(head, tail, free)`, `None` if the Tx lock was busy.
    pub cursors: Option<(usize, usize, usize)>,
    /// Slots done but not reclaimed.
    pub done_unreclaimed: usize,
}

/// Point-in-time view of the Rx ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxRingReport {
    /// `rx_tail`, `None` if the Rx lock was busy.
    pub tail: Option<usize>,
    /// Slots full but not drained.
    pub full_undrained: usize,
}

impl TxRing {
    /// Sample the ring without waiting on the Tx lock.
    pub fn report(&self) -> TxRingReport {
        TxRingReport {
            cursors: self.try_cursors(),
            done_unreclaimed: log_tx_buffers(self.queue()),
        }
    }
}

impl RxRing {
    /// Sample the ring without waiting on the Rx lock.
    pub fn report(&self) -> RxRingReport {
        RxRingReport {
            tail: self.try_tail(),
            full_undrained: log_rx_buffers(self.queue()),
        }
    }
}
