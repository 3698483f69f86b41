//! Transmit ring tests driven through the loopback device

mod common;

use common::{created, data_frame};
use morpheus_wlan_dma::desc::{DescCtl, HostCtl};
use morpheus_wlan_dma::ring::ring_length;
use morpheus_wlan_dma::{FrameKind, RingConfig, SlotUnavailable, TxError, TxFrame};

const HEADER: [u8; 24] = [
    0x08, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x00, 0x00,
];

fn send_one(ctx: &common::TestContext, payload: &[u8]) -> usize {
    let slot = ctx.acquire_tx_slot().unwrap();
    let idx = slot.index();
    let frame = TxFrame::new(&HEADER, payload).unwrap();
    ctx.submit_tx(slot, &frame, FrameKind::Data);
    idx
}

#[test]
fn test_acquire_until_exhausted() {
    let ctx = created(RingConfig::default());
    let tx = ctx.tx_ring().unwrap();

    for i in 0..15 {
        let slot = ctx.acquire_tx_slot().unwrap();
        assert_eq!(slot.index(), i);
    }
    assert_eq!(tx.free(), 1);
    assert_eq!(ctx.acquire_tx_slot(), Err(SlotUnavailable));
    // Failed acquisition does not move the ring.
    assert_eq!(tx.head(), 15);
    assert_eq!(tx.free(), 1);
}

#[test]
fn test_round_trip_restores_host_ownership() {
    let ctx = created(RingConfig::default());
    let tx = ctx.tx_ring().unwrap();
    let payload = data_frame(100);

    let idx = send_one(&ctx, &payload);
    assert_eq!(ctx.device().trigger_count(), 1);
    assert_eq!(tx.free(), 15);

    let desc = tx.queue().descriptors().get(idx);
    assert!(!DescCtl::from_bits_retain(desc.ctl()).host_owned());
    assert_eq!(desc.total_length() as usize, HEADER.len() + 100);
    assert_eq!(desc.rate(), RingConfig::default().data_rate);

    assert_eq!(ctx.device().complete_tx(tx, 16, 0), 1);
    assert_eq!(ctx.reclaim_tx_completions(), 1);

    assert_eq!(desc.ctl(), DescCtl::IDLE.bits());
    let host = tx.queue().host_descriptors();
    assert_ne!(host.get(2 * idx).ctl() & HostCtl::OWN.bits(), 0);
    assert_ne!(host.get(2 * idx + 1).ctl() & HostCtl::OWN.bits(), 0);
    assert_eq!(tx.free(), 16);
    assert_eq!(tx.tail(), 1);

    let stats = ctx.tx_stats();
    assert_eq!(stats.packets, 1);
    assert_eq!(stats.bytes as usize, HEADER.len() + 100);
    assert_eq!(stats.errors, 0);
}

#[test]
fn test_reclaim_twice_changes_nothing() {
    let ctx = created(RingConfig::default());
    let tx = ctx.tx_ring().unwrap();

    for _ in 0..4 {
        send_one(&ctx, &[0u8; 32]);
    }
    ctx.device().complete_tx(tx, 2, 0);

    assert_eq!(ctx.reclaim_tx_completions(), 2);
    let before = (tx.head(), tx.tail(), tx.free());
    assert_eq!(ctx.reclaim_tx_completions(), 0);
    assert_eq!((tx.head(), tx.tail(), tx.free()), before);
    assert_eq!(before, (4, 2, 14));
}

#[test]
fn test_wraparound_keeps_links_closed() {
    let ctx = created(RingConfig::default());
    let tx = ctx.tx_ring().unwrap();
    let descs = tx.queue().descriptors();
    let host = tx.queue().host_descriptors();

    for cycle in 0..20 {
        let idx = send_one(&ctx, &[cycle as u8; 64]);
        assert_eq!(idx, cycle % 16);
        assert_eq!(ctx.device().complete_tx(tx, 16, 0), 1);
        assert_eq!(ctx.reclaim_tx_completions(), 1);
        assert_eq!(tx.head(), tx.tail());

        for start in 0..16 {
            assert_eq!(ring_length(descs, start, |p, i| p.get(i).next()), Some(16));
        }
        assert_eq!(ring_length(host, 0, |p, i| p.get(i).desc_phy_next()), Some(32));
    }
    assert_eq!(tx.free(), 16);
    assert_eq!(ctx.tx_stats().packets, 20);
}

#[test]
fn test_pause_and_resume_exactly_once() {
    let ctx = created(RingConfig::default().low_water(3));
    let tx = ctx.tx_ring().unwrap();

    for _ in 0..12 {
        send_one(&ctx, &[0u8; 16]);
    }
    assert_eq!(tx.free(), 4);
    assert_eq!(ctx.net().pauses(), 0);

    // Down to 3 free, then below.
    send_one(&ctx, &[0u8; 16]);
    assert!(tx.is_paused());
    send_one(&ctx, &[0u8; 16]);
    send_one(&ctx, &[0u8; 16]);
    assert!(ctx.acquire_tx_slot().is_err());
    assert_eq!(ctx.net().pauses(), 1);

    assert_eq!(ctx.device().complete_tx(tx, 16, 0), 15);
    assert_eq!(ctx.reclaim_tx_completions(), 15);
    assert!(!tx.is_paused());
    assert_eq!(ctx.net().pauses(), 1);
    assert_eq!(ctx.net().resumes(), 1);
}

#[test]
fn test_resume_waits_for_hysteresis() {
    let ctx = created(RingConfig::default().with_hysteresis(3));
    let tx = ctx.tx_ring().unwrap();

    for _ in 0..15 {
        send_one(&ctx, &[0u8; 16]);
    }
    assert_eq!(tx.free(), 1);

    // Free count back to 5, one short of the wake point.
    ctx.device().complete_tx(tx, 4, 0);
    ctx.reclaim_tx_completions();
    assert_eq!(tx.free(), 5);
    assert_eq!(ctx.net().resumes(), 0);

    ctx.device().complete_tx(tx, 1, 0);
    ctx.reclaim_tx_completions();
    assert_eq!(ctx.net().resumes(), 1);
}

#[test]
fn test_completion_errors_are_classified() {
    let ctx = created(RingConfig::default());
    let tx = ctx.tx_ring().unwrap();

    for _ in 0..3 {
        send_one(&ctx, &[0u8; 16]);
    }
    ctx.device().complete_tx(tx, 1, 0x10);
    ctx.device().complete_tx(tx, 1, 0x20);
    ctx.device().complete_tx(tx, 1, 0x04);
    assert_eq!(ctx.reclaim_tx_completions(), 3);

    let stats = ctx.tx_stats();
    assert_eq!(stats.errors, 3);
    assert_eq!(stats.lifetime_timeouts, 1);
    assert_eq!(stats.range_errors, 1);
    assert_eq!(stats.unknown_errors, 1);
    for i in 0..3 {
        assert_eq!(tx.queue().descriptors().get(i).error(), 0);
    }
}

#[test]
fn test_management_frames_use_base_rate() {
    let ctx = created(RingConfig::default().data_rate(55));
    let tx = ctx.tx_ring().unwrap();

    let mut beacon = HEADER;
    beacon[0] = 0x80;
    let frame = TxFrame::new(&beacon, &[0u8; 40]).unwrap();
    assert_eq!(frame.kind(), FrameKind::Management);
    ctx.transmit(&frame).unwrap();
    assert_eq!(tx.queue().descriptors().get(0).rate(), 20);

    send_one(&ctx, &[0u8; 40]);
    assert_eq!(tx.queue().descriptors().get(1).rate(), 55);
}

#[test]
fn test_transmit_reports_full_ring() {
    let ctx = created(RingConfig::default().capacities(4, 4).low_water(1));
    let frame = TxFrame::new(&HEADER, &[1, 2, 3]).unwrap();

    for _ in 0..3 {
        ctx.transmit(&frame).unwrap();
    }
    assert_eq!(ctx.transmit(&frame), Err(TxError::NotReady));
    assert_eq!(ctx.device().trigger_count(), 3);
}

#[test]
fn test_oversized_frames_rejected_before_acquire() {
    let ctx = created(RingConfig::default());
    let big = vec![0u8; 1501];
    assert_eq!(
        TxFrame::new(&HEADER, &big).err(),
        Some(TxError::PayloadTooLarge { len: 1501 })
    );
    assert_eq!(ctx.tx_ring().unwrap().free(), 16);
}

#[test]
fn test_cancelled_slot_does_not_block_reclaim() {
    let ctx = created(RingConfig::default());
    let tx = ctx.tx_ring().unwrap();

    let held = ctx.acquire_tx_slot().unwrap();
    for _ in 0..3 {
        send_one(&ctx, &[0u8; 16]);
    }
    ctx.cancel_tx_slot(held);

    assert_eq!(ctx.device().complete_tx(tx, 16, 0), 3);
    assert_eq!(ctx.reclaim_tx_completions(), 4);
    assert_eq!((tx.head(), tx.tail(), tx.free()), (4, 4, 16));
    assert_eq!(ctx.device().trigger_count(), 3);

    let stats = ctx.tx_stats();
    assert_eq!(stats.packets, 3);
    assert_eq!(stats.errors, 0);
}

#[test]
fn test_cancel_latest_slot_reuses_it() {
    let ctx = created(RingConfig::default());
    let tx = ctx.tx_ring().unwrap();

    let slot = ctx.acquire_tx_slot().unwrap();
    assert_eq!(slot.index(), 0);
    ctx.cancel_tx_slot(slot);
    assert_eq!((tx.head(), tx.free()), (0, 16));

    assert_eq!(send_one(&ctx, &[0u8; 16]), 0);
    assert_eq!(ctx.device().complete_tx(tx, 16, 0), 1);
    assert_eq!(ctx.reclaim_tx_completions(), 1);
}
