//! Multi-hop forwarding, route errors and broadcast relay

mod common;

use common::{settle, TestNode, KEY, PAN_ID};
use nwk_stack::sim::SimMedium;
use nwk_stack::{DataReqOptions, IndOptions, NwkConfig, TxStatus};
use nwk_wire::{
    Command, Endpoints, FrameHeader, MacHeader, NwkFlags, NwkHeader, RouteErrorCommand,
    BROADCAST_ADDR, MAC_FCF_ACK_REQUEST, MAC_FCF_DATA,
};

/// Nodes 1, 2 and 3 in a line, with routes learned from a broadcast by node 3
fn line(medium: &SimMedium, relay_config: NwkConfig) -> (TestNode, TestNode, TestNode) {
    let mut x = TestNode::new(medium, 0x0001);
    let mut r = TestNode::with_config(medium, 0x0002, relay_config);
    let mut y = TestNode::new(medium, 0x0003);
    medium.connect(x.id, r.id, 200);
    medium.connect(r.id, y.id, 200);

    y.send(BROADCAST_ADDR, b"hello", DataReqOptions::empty());
    settle(&mut [&mut x, &mut r, &mut y], 100);

    (x, r, y)
}

#[test]
fn test_routes_learned_from_broadcast() {
    let medium = SimMedium::new();
    let (x, r, y) = line(&medium, NwkConfig::default());

    assert_eq!(x.nwk.route_next_hop(0x0003), Some(0x0002));
    assert_eq!(r.nwk.route_next_hop(0x0003), Some(0x0003));
    assert_eq!(y.nwk.route_next_hop(0x0003), None);

    // Everyone but the originator saw it exactly once
    assert_eq!(x.delivered().len(), 1);
    assert_eq!(r.delivered().len(), 1);
    assert!(y.delivered().is_empty());

    // Only the relay's copy reaches node 1
    assert!(!x.delivered()[0].options.contains(IndOptions::LOCAL));
    assert!(r.delivered()[0].options.contains(IndOptions::LOCAL));
}

#[test]
fn test_forwarded_unicast_is_acknowledged_end_to_end() {
    let medium = SimMedium::new();
    let (mut x, mut r, mut y) = line(&medium, NwkConfig::default());
    medium.clear_sent();

    x.send(0x0003, b"over the hill", DataReqOptions::ACK_REQUEST);
    settle(&mut [&mut x, &mut r, &mut y], 100);

    let confirms = x.confirms();
    assert_eq!(confirms.len(), 1);
    assert_eq!(confirms[0].status, TxStatus::Success);

    let delivered = y.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].src_addr, 0x0001);
    assert_eq!(delivered[0].data, b"over the hill");
    assert!(!delivered[0].options.contains(IndOptions::LOCAL));

    // The relay forwards without delivering
    assert_eq!(r.delivered().len(), 1);
    let forwarded = medium.sent_headers(r.id);
    assert!(forwarded.iter().any(|h| {
        h.nwk.src_addr == 0x0001 && h.nwk.dst_addr == 0x0003 && h.mac.dst_addr == 0x0003
    }));
    assert_eq!(r.nwk.routes().stats().forwarded, 2);

    // The originator's first hop is the relay
    let headers = medium.sent_headers(x.id);
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].mac.dst_addr, 0x0002);
    assert!(headers[0].mac.ack_requested());

    assert!(x.pool_idle());
    assert!(r.pool_idle());
    assert!(y.pool_idle());
}

#[test]
fn test_secured_frame_is_reencrypted_at_each_hop() {
    let medium = SimMedium::new();
    let (mut x, mut r, mut y) = line(&medium, NwkConfig::default());
    for node in [&mut x, &mut r, &mut y] {
        node.nwk.set_security_key(&KEY);
    }
    medium.clear_sent();

    x.send(
        0x0003,
        b"for your eyes",
        DataReqOptions::ACK_REQUEST | DataReqOptions::ENABLE_SECURITY,
    );
    settle(&mut [&mut x, &mut r, &mut y], 100);

    assert_eq!(x.confirms()[0].status, TxStatus::Success);
    let delivered = y.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].data, b"for your eyes");
    assert!(delivered[0].options.contains(IndOptions::SECURED));

    // Plaintext never goes on air, not even from the relay
    let relayed = medium.sent(r.id);
    assert!(!relayed.is_empty());
    for psdu in relayed.iter().chain(medium.sent(x.id).iter()) {
        assert!(!psdu.windows(13).any(|w| w == b"for your eyes"));
    }
    assert!(r.pool_idle());
}

#[test]
fn test_missing_route_answers_with_route_error() {
    let medium = SimMedium::new();
    let mut x = TestNode::new(&medium, 0x0001);
    let mut r = TestNode::new(&medium, 0x0002);
    medium.connect(x.id, r.id, 200);

    let header = FrameHeader {
        mac: MacHeader {
            fcf: MAC_FCF_DATA | MAC_FCF_ACK_REQUEST,
            seq: 0,
            dst_pan_id: PAN_ID,
            dst_addr: 0x0002,
            src_addr: 0x0001,
        },
        nwk: NwkHeader {
            flags: NwkFlags::empty(),
            seq: 7,
            src_addr: 0x0001,
            dst_addr: 0x0009,
            endpoints: Endpoints::new(1, 1).unwrap(),
        },
    };
    let mut psdu = Vec::new();
    header.encode(&mut psdu);
    psdu.extend_from_slice(b"data");

    medium.inject(r.id, &psdu, 180);
    settle(&mut [&mut x, &mut r], 100);

    let sent = medium.sent(r.id);
    assert_eq!(sent.len(), 1);
    let (header, command) = common::sent_command(&sent[0]).unwrap();
    assert_eq!(header.nwk.dst_addr, 0x0001);
    assert_eq!(header.mac.dst_addr, 0x0001);
    assert_eq!(
        command,
        Command::RouteError(RouteErrorCommand {
            src_addr: 0x0001,
            dst_addr: 0x0009,
        })
    );

    assert_eq!(r.nwk.routes().stats().no_route, 1);
    assert!(r.delivered().is_empty());
    assert!(x.delivered().is_empty());
    assert!(r.pool_idle());
}

#[test]
fn test_broken_link_evicts_route_and_notifies_originator() {
    let medium = SimMedium::new();
    let relay_config = NwkConfig {
        route_default_score: 1,
        ..Default::default()
    };
    let (mut x, mut r, mut y) = line(&medium, relay_config);
    assert_eq!(r.nwk.route_next_hop(0x0003), Some(0x0003));

    medium.disconnect(r.id, y.id);

    // First hop succeeds, the forward fails and costs the relay its route
    x.send(0x0003, b"one", DataReqOptions::empty());
    settle(&mut [&mut x, &mut r, &mut y], 100);
    assert_eq!(x.confirms()[0].status, TxStatus::Success);
    assert_eq!(r.nwk.route_next_hop(0x0003), None);
    assert_eq!(x.nwk.route_next_hop(0x0003), Some(0x0002));

    // Next time the relay answers with a route error and the originator forgets the route
    medium.clear_sent();
    x.send(0x0003, b"two", DataReqOptions::empty());
    settle(&mut [&mut x, &mut r, &mut y], 100);

    let route_errors: Vec<_> = medium
        .sent(r.id)
        .iter()
        .filter_map(|psdu| common::sent_command(psdu))
        .filter(|(_, command)| matches!(command, Command::RouteError(_)))
        .collect();
    assert_eq!(route_errors.len(), 1);
    assert_eq!(route_errors[0].0.nwk.dst_addr, 0x0001);

    assert_eq!(x.nwk.route_next_hop(0x0003), None);
    assert!(y.delivered().is_empty());
    assert!(r.pool_idle());
}

#[test]
fn test_broadcast_flood_delivers_once_per_node() {
    let medium = SimMedium::new();
    let mut a = TestNode::new(&medium, 0x0001);
    let mut b = TestNode::new(&medium, 0x0002);
    let mut c = TestNode::new(&medium, 0x0003);
    medium.connect(a.id, b.id, 200);
    medium.connect(b.id, c.id, 200);
    medium.connect(a.id, c.id, 200);

    a.send(BROADCAST_ADDR, b"flood", DataReqOptions::empty());
    settle(&mut [&mut a, &mut b, &mut c], 100);

    assert!(a.delivered().is_empty());
    assert_eq!(b.delivered().len(), 1);
    assert_eq!(c.delivered().len(), 1);
    assert!(b.delivered()[0].options.contains(IndOptions::BROADCAST));

    // Each receiver relays once; nothing else goes on air
    assert_eq!(medium.sent(a.id).len(), 1);
    assert_eq!(medium.sent(b.id).len(), 1);
    assert_eq!(medium.sent(c.id).len(), 1);
    for node in [&a, &b, &c] {
        assert!(node.pool_idle());
    }
}

#[test]
fn test_link_local_broadcast_is_not_relayed() {
    let medium = SimMedium::new();
    let mut x = TestNode::new(&medium, 0x0001);
    let mut r = TestNode::new(&medium, 0x0002);
    let mut y = TestNode::new(&medium, 0x0003);
    medium.connect(x.id, r.id, 200);
    medium.connect(r.id, y.id, 200);

    x.send(BROADCAST_ADDR, b"neighbours only", DataReqOptions::LINK_LOCAL);
    settle(&mut [&mut x, &mut r, &mut y], 100);

    let delivered = r.delivered();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].options.contains(IndOptions::LINK_LOCAL));
    assert!(y.delivered().is_empty());
    assert!(medium.sent(r.id).is_empty());
}

#[test]
fn test_link_local_unicast_skips_routing() {
    let medium = SimMedium::new();
    let (mut x, mut r, mut y) = line(&medium, NwkConfig::default());
    medium.clear_sent();

    // Node 3 is two hops away, so a link-local frame cannot reach it
    x.send(0x0003, b"too far", DataReqOptions::LINK_LOCAL);
    settle(&mut [&mut x, &mut r, &mut y], 100);

    let headers = medium.sent_headers(x.id);
    assert_eq!(headers[0].mac.dst_addr, 0x0003);
    assert!(headers[0].nwk.flags.contains(NwkFlags::LINK_LOCAL));
    assert!(y.delivered().is_empty());
    assert!(medium.sent(r.id).is_empty());
}

#[test]
fn test_routing_disabled_addresses_link_directly() {
    let medium = SimMedium::new();
    let config = NwkConfig {
        routing: false,
        ..Default::default()
    };
    let mut x = TestNode::with_config(&medium, 0x0001, config.clone());
    let mut y = TestNode::with_config(&medium, 0x0002, config);
    medium.connect(x.id, y.id, 200);

    x.send(0x0002, b"direct", DataReqOptions::ACK_REQUEST);
    settle(&mut [&mut x, &mut y], 100);

    assert_eq!(x.confirms()[0].status, TxStatus::Success);
    assert_eq!(medium.sent_headers(x.id)[0].mac.dst_addr, 0x0002);
    assert_eq!(y.delivered().len(), 1);
    assert!(x.nwk.routes().routes().next().is_none());
    assert!(y.nwk.routes().routes().next().is_none());
}
