//! In-memory radio medium for development and testing
//!
//! A [`SimMedium`] connects any number of [`SimRadio`] drivers. Links are
//! directional and carry the LQI reported to the receiver. A transmission
//! reaches every awake, receive-enabled radio on the same channel that has a
//! link from the sender; link-unicast frames are only accepted by the radio
//! whose short address matches, as with hardware address filtering.

use crate::radio::{Radio, RadioEvent, RadioFrame, RadioStatus};
use bytes::Bytes;
use nwk_wire::{FrameHeader, BROADCAST_ADDR};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use tracing::trace;

/// Identifier of a radio attached to a medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug)]
struct NodeState {
    addr: u16,
    pan_id: u16,
    channel: u8,
    rx_on: bool,
    sleeping: bool,
    tx_busy: bool,
    events: VecDeque<RadioEvent>,
    forced: VecDeque<RadioStatus>,
    corrupt_next: bool,
    sent: Vec<Bytes>,
}

impl NodeState {
    fn new() -> Self {
        Self {
            addr: BROADCAST_ADDR,
            pan_id: 0,
            channel: 0,
            rx_on: false,
            sleeping: false,
            tx_busy: false,
            events: VecDeque::new(),
            forced: VecDeque::new(),
            corrupt_next: false,
            sent: Vec::new(),
        }
    }

    fn listening(&self, channel: u8) -> bool {
        self.rx_on && !self.sleeping && self.channel == channel
    }
}

#[derive(Debug, Default)]
struct MediumState {
    nodes: Vec<NodeState>,
    links: HashMap<(NodeId, NodeId), u8>,
}

impl MediumState {
    fn transmit(&mut self, from: NodeId, psdu: &[u8]) {
        let sender = &mut self.nodes[from.0];
        sender.tx_busy = true;
        sender.sent.push(Bytes::copy_from_slice(psdu));

        if let Some(status) = sender.forced.pop_front() {
            trace!("Node {:?} forced send status {:?}", from, status);
            sender.events.push_back(RadioEvent::DataConf(status));
            return;
        }

        let channel = sender.channel;
        let link_dst = FrameHeader::decode(&mut &psdu[..])
            .map(|header| header.mac.dst_addr)
            .unwrap_or(BROADCAST_ADDR);

        let mut accepted = false;
        for (index, node) in self.nodes.iter_mut().enumerate() {
            let to = NodeId(index);
            if to == from || !node.listening(channel) {
                continue;
            }
            let Some(&lqi) = self.links.get(&(from, to)) else {
                continue;
            };
            if link_dst != BROADCAST_ADDR && link_dst != node.addr {
                continue;
            }

            let mut bytes = psdu.to_vec();
            if node.corrupt_next {
                node.corrupt_next = false;
                if let Some(last) = bytes.last_mut() {
                    *last ^= 0xff;
                }
            }

            node.events.push_back(RadioEvent::DataInd(RadioFrame {
                psdu: Bytes::from(bytes),
                lqi,
                rssi: rssi_for(lqi),
            }));
            accepted = true;
        }

        let status = if link_dst == BROADCAST_ADDR || accepted {
            RadioStatus::Success
        } else {
            RadioStatus::NoAck
        };
        self.nodes[from.0]
            .events
            .push_back(RadioEvent::DataConf(status));
    }
}

fn rssi_for(lqi: u8) -> i8 {
    (-91 + i16::from(lqi) / 4) as i8
}

/// Shared in-memory radio medium
#[derive(Debug, Clone, Default)]
pub struct SimMedium {
    state: Rc<RefCell<MediumState>>,
}

impl SimMedium {
    /// Empty medium
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new radio
    pub fn add_radio(&self) -> SimRadio {
        let mut state = self.state.borrow_mut();
        state.nodes.push(NodeState::new());
        SimRadio {
            id: NodeId(state.nodes.len() - 1),
            medium: self.clone(),
        }
    }

    /// Let `to` hear `from` with the given link quality
    pub fn link(&self, from: NodeId, to: NodeId, lqi: u8) {
        self.state.borrow_mut().links.insert((from, to), lqi);
    }

    /// Link two radios in both directions
    pub fn connect(&self, a: NodeId, b: NodeId, lqi: u8) {
        self.link(a, b, lqi);
        self.link(b, a, lqi);
    }

    /// Remove the links between two radios in both directions
    pub fn disconnect(&self, a: NodeId, b: NodeId) {
        let mut state = self.state.borrow_mut();
        state.links.remove(&(a, b));
        state.links.remove(&(b, a));
    }

    /// Fail the next transmissions of `node` with `status`, in order; forced frames never reach a receiver
    pub fn force_send_status(&self, node: NodeId, status: RadioStatus, count: usize) {
        let mut state = self.state.borrow_mut();
        if let Some(node) = state.nodes.get_mut(node.0) {
            node.forced.extend(std::iter::repeat(status).take(count));
        }
    }

    /// Flip the last byte of the next frame `node` receives
    pub fn corrupt_next_rx(&self, node: NodeId) {
        if let Some(node) = self.state.borrow_mut().nodes.get_mut(node.0) {
            node.corrupt_next = true;
        }
    }

    /// Deliver raw bytes to `node` as if received over a link with quality `lqi`
    pub fn inject(&self, node: NodeId, psdu: &[u8], lqi: u8) {
        if let Some(node) = self.state.borrow_mut().nodes.get_mut(node.0) {
            node.events.push_back(RadioEvent::DataInd(RadioFrame {
                psdu: Bytes::copy_from_slice(psdu),
                lqi,
                rssi: rssi_for(lqi),
            }));
        }
    }

    /// Every frame `node` has put on air, in order
    pub fn sent(&self, node: NodeId) -> Vec<Bytes> {
        self.state
            .borrow()
            .nodes
            .get(node.0)
            .map(|node| node.sent.clone())
            .unwrap_or_default()
    }

    /// Headers of every frame `node` has put on air
    pub fn sent_headers(&self, node: NodeId) -> Vec<FrameHeader> {
        self.sent(node)
            .iter()
            .filter_map(|psdu| FrameHeader::decode(&mut &psdu[..]).ok())
            .collect()
    }

    /// Forget every node's transmit log
    pub fn clear_sent(&self) {
        for node in self.state.borrow_mut().nodes.iter_mut() {
            node.sent.clear();
        }
    }
}

/// Radio driver attached to a [`SimMedium`]
#[derive(Debug)]
pub struct SimRadio {
    id: NodeId,
    medium: SimMedium,
}

impl SimRadio {
    /// Identifier of this radio on its medium
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Current channel
    pub fn channel(&self) -> u8 {
        self.with(|node| node.channel)
    }

    /// Whether the radio is asleep
    pub fn is_sleeping(&self) -> bool {
        self.with(|node| node.sleeping)
    }

    fn with<T>(&self, f: impl FnOnce(&NodeState) -> T) -> T {
        f(&self.medium.state.borrow().nodes[self.id.0])
    }

    fn with_mut<T>(&self, f: impl FnOnce(&mut NodeState) -> T) -> T {
        f(&mut self.medium.state.borrow_mut().nodes[self.id.0])
    }
}

impl Radio for SimRadio {
    fn set_short_addr(&mut self, addr: u16) {
        self.with_mut(|node| node.addr = addr);
    }

    fn set_pan_id(&mut self, pan_id: u16) {
        self.with_mut(|node| node.pan_id = pan_id);
    }

    fn set_channel(&mut self, channel: u8) {
        self.with_mut(|node| node.channel = channel);
    }

    fn set_rx_state(&mut self, on: bool) {
        self.with_mut(|node| node.rx_on = on);
    }

    fn sleep(&mut self) {
        self.with_mut(|node| node.sleeping = true);
    }

    fn wakeup(&mut self) {
        self.with_mut(|node| node.sleeping = false);
    }

    fn busy(&self) -> bool {
        self.with(|node| node.tx_busy)
    }

    fn data_req(&mut self, psdu: &[u8]) {
        self.medium.state.borrow_mut().transmit(self.id, psdu);
    }

    fn poll(&mut self) -> Option<RadioEvent> {
        self.with_mut(|node| {
            let event = node.events.pop_front()?;
            if matches!(event, RadioEvent::DataConf(_)) {
                node.tx_busy = false;
            }
            Some(event)
        })
    }
}
