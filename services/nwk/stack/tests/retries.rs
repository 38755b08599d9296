//! Network-level ACK timeouts and retransmission, on a paused clock

mod common;

use common::{run, settle, TestNode, APP_ENDPOINT};
use nwk_stack::sim::SimMedium;
use nwk_stack::{DataReqOptions, RadioStatus, TxStatus};
use nwk_wire::{Command, BROADCAST_ADDR};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

const STEP: Duration = Duration::from_millis(10);

/// Run passes, advancing the clock by `STEP` between them, until `sender` has a confirm
async fn until_confirmed(nodes: &mut [&mut TestNode], sender: usize, max_steps: usize) {
    for _ in 0..max_steps {
        run(nodes, 2);
        if !nodes[sender].confirms().is_empty() {
            return;
        }
        tokio::time::advance(STEP).await;
    }
}

fn data_frames(medium: &SimMedium, node: nwk_stack::sim::NodeId) -> usize {
    medium
        .sent_headers(node)
        .iter()
        .filter(|h| h.nwk.endpoints.dst == APP_ENDPOINT)
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_frame_times_out_after_all_attempts() {
    let medium = SimMedium::new();
    let mut x = TestNode::new(&medium, 0x0001);
    let mut y = TestNode::new(&medium, 0x0002);
    medium.connect(x.id, y.id, 220);

    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    y.nwk
        .open_endpoint(APP_ENDPOINT, move |_| {
            seen.set(seen.get() + 1);
            false
        })
        .unwrap();

    x.send(0x0002, b"anyone?", DataReqOptions::ACK_REQUEST);
    until_confirmed(&mut [&mut x, &mut y], 0, 200).await;

    let confirms = x.confirms();
    assert_eq!(confirms.len(), 1);
    assert_eq!(confirms[0].status, TxStatus::NoAck);
    assert_eq!(data_frames(&medium, x.id), x.nwk.config().tx_attempts as usize);

    // Retransmissions are recognized as duplicates
    assert_eq!(calls.get(), 1);
    assert!(medium.sent(y.id).is_empty());
    assert!(x.pool_idle());
    assert!(y.pool_idle());
}

#[tokio::test(start_paused = true)]
async fn test_closed_endpoint_times_out() {
    let medium = SimMedium::new();
    let mut x = TestNode::new(&medium, 0x0001);
    let mut y = TestNode::new(&medium, 0x0002);
    medium.connect(x.id, y.id, 220);

    let confirms = x.confirms.clone();
    let req = nwk_stack::DataRequest::new(0x0002, 9, APP_ENDPOINT, b"nobody home")
        .with_options(DataReqOptions::ACK_REQUEST)
        .on_confirm(move |conf| confirms.borrow_mut().push(conf));
    x.nwk.data_request(req).unwrap();
    until_confirmed(&mut [&mut x, &mut y], 0, 200).await;

    assert_eq!(x.confirms()[0].status, TxStatus::NoAck);
    assert!(y.delivered().is_empty());
    assert!(medium.sent(y.id).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_lost_ack_is_resent_for_duplicate() {
    let medium = SimMedium::new();
    let mut x = TestNode::new(&medium, 0x0001);
    let mut y = TestNode::new(&medium, 0x0002);
    medium.connect(x.id, y.id, 220);

    // Every attempt of the first ACK is lost on air
    let attempts = y.nwk.config().tx_attempts as usize;
    medium.force_send_status(y.id, RadioStatus::NoAck, attempts);

    x.send(0x0002, b"ack me", DataReqOptions::ACK_REQUEST);
    until_confirmed(&mut [&mut x, &mut y], 0, 200).await;

    let confirms = x.confirms();
    assert_eq!(confirms.len(), 1);
    assert_eq!(confirms[0].status, TxStatus::Success);
    assert_eq!(data_frames(&medium, x.id), 2);
    assert_eq!(y.delivered().len(), 1);

    let acks = medium
        .sent(y.id)
        .iter()
        .filter(|psdu| matches!(common::sent_command(psdu), Some((_, Command::Ack(_)))))
        .count();
    assert_eq!(acks, attempts + 1);
}

#[tokio::test(start_paused = true)]
async fn test_lost_ack_over_relay_is_recovered() {
    let medium = SimMedium::new();
    let mut x = TestNode::new(&medium, 0x0001);
    let mut r = TestNode::new(&medium, 0x0002);
    let mut y = TestNode::new(&medium, 0x0003);
    medium.connect(x.id, r.id, 220);
    medium.connect(r.id, y.id, 220);

    y.send(BROADCAST_ADDR, b"hello", DataReqOptions::empty());
    settle(&mut [&mut x, &mut r, &mut y], 100);
    assert_eq!(x.nwk.route_next_hop(0x0003), Some(0x0002));
    medium.clear_sent();

    // The destination's first ACK never leaves its radio
    let attempts = y.nwk.config().tx_attempts as usize;
    medium.force_send_status(y.id, RadioStatus::NoAck, attempts);

    x.send(0x0003, b"ack me twice", DataReqOptions::ACK_REQUEST);
    until_confirmed(&mut [&mut x, &mut r, &mut y], 0, 200).await;

    let confirms = x.confirms();
    assert_eq!(confirms.len(), 1);
    assert_eq!(confirms[0].status, TxStatus::Success);
    assert_eq!(data_frames(&medium, x.id), 2);

    // The relay passes the retransmission on; the destination delivers once
    let forwarded = medium
        .sent_headers(r.id)
        .iter()
        .filter(|h| h.nwk.src_addr == 0x0001 && h.nwk.endpoints.dst == APP_ENDPOINT)
        .count();
    assert_eq!(forwarded, 2);
    assert_eq!(y.delivered().iter().filter(|ind| ind.src_addr == 0x0001).count(), 1);

    run(&mut [&mut x, &mut r, &mut y], 10);
    assert!(x.pool_idle());
    assert!(r.pool_idle());
    assert!(y.pool_idle());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_destination_times_out_once() {
    let medium = SimMedium::new();
    let mut x = TestNode::new(&medium, 0x0001);
    let mut y = TestNode::new(&medium, 0x0002);
    medium.connect(x.id, y.id, 220);

    // Y is out of range until X has given up
    medium.disconnect(x.id, y.id);
    x.send(0x0002, b"late", DataReqOptions::ACK_REQUEST);
    until_confirmed(&mut [&mut x, &mut y], 0, 200).await;
    assert_eq!(x.confirms()[0].status, TxStatus::NoAck);
    assert_eq!(data_frames(&medium, x.id), x.nwk.config().tx_attempts as usize);

    medium.connect(x.id, y.id, 220);
    run(&mut [&mut x, &mut y], 10);
    assert_eq!(x.confirms().len(), 1);
    assert!(!x.nwk.busy());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_window_expires() {
    let medium = SimMedium::new();
    let mut x = TestNode::new(&medium, 0x0001);
    let mut y = TestNode::new(&medium, 0x0002);
    medium.connect(x.id, y.id, 220);

    // A replay inside the window is dropped; once the window passes it is accepted again
    x.send(0x0002, b"replay", DataReqOptions::empty());
    run(&mut [&mut x, &mut y], 5);
    let psdu = medium.sent(x.id)[0].clone();

    medium.inject(y.id, &psdu, 200);
    run(&mut [&mut x, &mut y], 5);
    assert_eq!(y.delivered().len(), 1);

    tokio::time::advance(y.nwk.config().duplicate_ttl() + STEP).await;
    medium.inject(y.id, &psdu, 200);
    run(&mut [&mut x, &mut y], 5);
    assert_eq!(y.delivered().len(), 2);
}
