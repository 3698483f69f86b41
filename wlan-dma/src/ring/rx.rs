//! Receive ring manager.
//!
//! The device fills a buffer, sets OWN and the complete bit in the host
//! descriptor, and raises an interrupt. The drain walks ready slots from
//! `tail`, hands each frame up and gives the slot back to the device.

use core::sync::atomic::{fence, Ordering};

use log::{debug, log_enabled, trace, Level};

use crate::config::RingConfig;
use crate::desc::{HostCtl, RxBufferHeader, RX_BUFFER_HEADER, RX_PHY_HEADER};
use crate::dma::RxOwnership;
use crate::frame::{frame_control, is_beacon, type_label, RxFrame};
use crate::queue::RxQueue;
use crate::ring::diag;
use crate::stats::{RxCounters, WirelessQuality};
use crate::sync::IrqLock;
use crate::traits::RxDelivery;

#[derive(Debug, Clone, Copy)]
struct RxPolicy {
    monitor: bool,
    phy_header: bool,
    min_frame_len: usize,
}

/// Receive ring over a built [`RxQueue`].
pub struct RxRing {
    queue: RxQueue,
    /// Next slot to inspect.
    tail: IrqLock<usize>,
    policy: RxPolicy,
}

impl RxRing {
    pub(crate) fn new(queue: RxQueue, config: &RingConfig) -> Self {
        Self {
            queue,
            tail: IrqLock::new("rx_lock", 0),
            policy: RxPolicy {
                monitor: config.monitor,
                phy_header: config.rx_include_phy_header,
                min_frame_len: config.min_rx_frame_len,
            },
        }
    }

    pub(crate) fn into_queue(self) -> RxQueue {
        self.queue
    }

    /// Underlying pools.
    pub fn queue(&self) -> &RxQueue {
        &self.queue
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Next slot the drain will look at.
    pub fn tail(&self) -> usize {
        *self.tail.lock()
    }

    pub(crate) fn try_tail(&self) -> Option<usize> {
        self.tail.try_lock().map(|tail| *tail)
    }

    fn state(&self, idx: usize) -> RxOwnership {
        let h = self.queue.host.get(idx);
        RxOwnership::from_host(h.ctl(), h.status())
    }

    /// Give slot `idx` back to the device.
    fn return_to_device(&self, idx: usize) {
        self.tail.assert_held("Rx descriptor ownership");
        let h = self.queue.host.get(idx);
        fence(Ordering::Release);
        h.set_ctl(h.ctl() & !HostCtl::OWN.bits());
        h.set_status(0);
    }

    /// Process every ready slot from `tail` on.
    ///
    /// Returns the number of slots handed back to the device. Bounded by
    /// the ring capacity; safe to call again at any time.
    pub fn drain<N: RxDelivery + ?Sized>(
        &self,
        net: &N,
        stats: &RxCounters,
        quality: &IrqLock<WirelessQuality>,
    ) -> usize {
        if log_enabled!(Level::Trace) {
            diag::log_rx_buffers(&self.queue);
        }

        let capacity = self.capacity();

        // Find the first full slot in case tail lost sync with the device.
        let mut idx = {
            let mut tail = self.tail.lock();
            let mut found = None;
            for _ in 0..capacity {
                let candidate = *tail;
                *tail = (candidate + 1) % capacity;
                if self.state(candidate) == RxOwnership::Ready {
                    found = Some(candidate);
                    break;
                }
            }
            match found {
                Some(idx) => idx,
                None => return 0,
            }
        };

        let mut processed = 0;
        loop {
            fence(Ordering::Acquire);
            self.process(idx, net, stats, quality);
            processed += 1;

            let mut tail = self.tail.lock();
            self.return_to_device(idx);
            trace!("wlan-dma: Rx slot {} done, rx_tail is now {}", idx, *tail);

            if processed >= capacity {
                break;
            }
            let next = *tail;
            if self.state(next) != RxOwnership::Ready {
                break;
            }
            *tail = (next + 1) % capacity;
            idx = next;
        }
        processed
    }

    /// Hand the frame in slot `idx` upward. Runs without the Rx lock.
    fn process<N: RxDelivery + ?Sized>(
        &self,
        idx: usize,
        net: &N,
        stats: &RxCounters,
        quality: &IrqLock<WirelessQuality>,
    ) {
        // SAFETY: the slot is Ready, so the host owns the buffer until
        // return_to_device().
        let buf = unsafe { self.queue.buffers.slice(idx) };
        let Some(hdr) = RxBufferHeader::parse(buf) else {
            return;
        };

        let start = RX_BUFFER_HEADER + if self.policy.phy_header { RX_PHY_HEADER } else { 0 };
        let reported = hdr.frame_len();
        let end = (start + reported).min(buf.len());
        let data = &buf[start.min(end)..end];
        let length = data.len();
        if length < reported {
            debug!("wlan-dma: Rx slot {} claims {} bytes, buffer holds {}", idx, reported, length);
        }
        let fc = frame_control(data).unwrap_or(0);

        if !is_beacon(fc) {
            trace!(
                "wlan-dma: Rx pkt {:02} ({}): time {}, len {}, signal {}, SNR {}",
                idx,
                type_label(fc),
                hdr.mac_time,
                length,
                hdr.level,
                hdr.snr
            );
        }

        *quality.lock() = WirelessQuality::from_raw(hdr.level, hdr.snr);

        if self.policy.monitor {
            net.deliver_monitor_capture(&buf[..end]);
            stats.captured();
        } else if length >= self.policy.min_frame_len {
            let frame = RxFrame {
                index: idx,
                data,
                length,
                level: hdr.level,
                snr: hdr.snr,
                mac_time: hdr.mac_time,
            };
            net.deliver_frame(&frame);
            stats.delivered(length);
        } else {
            debug!(
                "wlan-dma: NOT receiving packet ({}): size too small ({})",
                type_label(fc),
                length
            );
            stats.too_short();
        }
    }
}
