//! Shared helpers for multi-node tests over the simulated medium

#![allow(dead_code)]

use nwk_stack::sim::{NodeId, SimMedium, SimRadio};
use nwk_stack::{DataConfirm, DataReqOptions, DataRequest, IndOptions, Nwk, NwkConfig};
use nwk_wire::{Command, FrameHeader, HEADER_SIZE};
use std::cell::RefCell;
use std::rc::Rc;

pub const PAN_ID: u16 = 0x1234;
pub const APP_ENDPOINT: u8 = 1;
pub const KEY: [u8; 16] = *b"network-key-0001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub src_addr: u16,
    pub dst_addr: u16,
    pub data: Vec<u8>,
    pub options: IndOptions,
}

pub struct TestNode {
    pub nwk: Nwk<SimRadio>,
    pub id: NodeId,
    pub delivered: Rc<RefCell<Vec<Delivery>>>,
    pub confirms: Rc<RefCell<Vec<DataConfirm>>>,
}

impl TestNode {
    pub fn new(medium: &SimMedium, addr: u16) -> Self {
        Self::with_config(medium, addr, NwkConfig::default())
    }

    pub fn with_config(medium: &SimMedium, addr: u16, config: NwkConfig) -> Self {
        let radio = medium.add_radio();
        let id = radio.id();
        let mut nwk = Nwk::new(radio, config).unwrap();
        nwk.set_addr(addr);
        nwk.set_pan_id(PAN_ID);

        let delivered = Rc::new(RefCell::new(Vec::new()));
        let sink = delivered.clone();
        nwk.open_endpoint(APP_ENDPOINT, move |ind| {
            sink.borrow_mut().push(Delivery {
                src_addr: ind.src_addr,
                dst_addr: ind.dst_addr,
                data: ind.data.to_vec(),
                options: ind.options,
            });
            true
        })
        .unwrap();

        Self {
            nwk,
            id,
            delivered,
            confirms: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Send `data` to `dst` on the application endpoint, recording the confirm
    pub fn send(&mut self, dst: u16, data: &[u8], options: DataReqOptions) {
        let confirms = self.confirms.clone();
        let req = DataRequest::new(dst, APP_ENDPOINT, APP_ENDPOINT, data)
            .with_options(options)
            .on_confirm(move |conf| confirms.borrow_mut().push(conf));
        self.nwk.data_request(req).unwrap();
    }

    pub fn delivered(&self) -> Vec<Delivery> {
        self.delivered.borrow().clone()
    }

    pub fn confirms(&self) -> Vec<DataConfirm> {
        self.confirms.borrow().clone()
    }

    pub fn pool_idle(&self) -> bool {
        self.nwk.pool().free_count() == self.nwk.pool().capacity()
    }
}

/// Run `passes` task handler passes over every node
pub fn run(nodes: &mut [&mut TestNode], passes: usize) {
    for _ in 0..passes {
        for node in nodes.iter_mut() {
            node.nwk.task_handler();
        }
    }
}

/// Run until no node has been busy for a few consecutive passes, up to `max_passes`
pub fn settle(nodes: &mut [&mut TestNode], max_passes: usize) {
    let mut idle = 0;
    for _ in 0..max_passes {
        run(nodes, 1);
        if nodes.iter().all(|node| !node.nwk.busy()) {
            idle += 1;
            if idle >= 3 {
                return;
            }
        } else {
            idle = 0;
        }
    }
}

/// Decode the command carried by a transmitted frame, if any
pub fn sent_command(psdu: &[u8]) -> Option<(FrameHeader, Command)> {
    let header = FrameHeader::decode(&mut &psdu[..]).ok()?;
    if header.nwk.endpoints.dst != 0 {
        return None;
    }
    Command::decode(&psdu[HEADER_SIZE..])
        .ok()
        .map(|command| (header, command))
}
