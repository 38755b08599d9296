//! Network control block: identity, sequence counters and endpoint table.

use crate::frame::Frame;
use crate::NwkError;
use bitflags::bitflags;
use nwk_wire::{Endpoints, NwkFlags, COMMAND_ENDPOINT, MAX_ENDPOINTS};
use std::fmt;

bitflags! {
    /// Properties of a delivered frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IndOptions: u8 {
        /// Originator requested an acknowledgment
        const ACK_REQUESTED = 1 << 0;
        /// Frame arrived encrypted and authenticated
        const SECURED = 1 << 1;
        /// Frame was restricted to a single hop
        const LINK_LOCAL = 1 << 2;
        /// Frame was a network broadcast
        const BROADCAST = 1 << 3;
        /// Originator is a direct neighbour
        const LOCAL = 1 << 4;
        /// Frame was sent with the wildcard PAN id
        const BROADCAST_PAN_ID = 1 << 5;
    }
}

/// Inbound data handed to an endpoint handler
#[derive(Debug)]
pub struct DataIndication<'a> {
    /// Originator address
    pub src_addr: u16,
    /// Destination address (local or broadcast)
    pub dst_addr: u16,
    /// Originator endpoint
    pub src_endpoint: u8,
    /// Local endpoint
    pub dst_endpoint: u8,
    /// Delivery properties
    pub options: IndOptions,
    /// Application payload
    pub data: &'a [u8],
    /// Link quality of the last hop
    pub lqi: u8,
    /// Signal strength of the last hop (dBm)
    pub rssi: i8,
    /// Control byte returned to the originator in the ACK
    pub ack_control: u8,
}

/// Endpoint handler; returning `true` accepts the frame and allows an ACK
pub type EndpointHandler = Box<dyn FnMut(&mut DataIndication<'_>) -> bool>;

/// Process-wide network state, owned by the [`crate::Nwk`] context
pub struct ControlBlock {
    /// Local short address
    pub addr: u16,
    /// PAN id
    pub pan_id: u16,
    nwk_seq: u8,
    mac_seq: u8,
    endpoints: [Option<EndpointHandler>; MAX_ENDPOINTS],
}

impl ControlBlock {
    /// Fresh control block with no address and no endpoints
    pub fn new() -> Self {
        Self {
            addr: 0,
            pan_id: 0,
            nwk_seq: 0,
            mac_seq: 0,
            endpoints: std::array::from_fn(|_| None),
        }
    }

    /// Next network sequence number (pre-increment, wraps)
    pub fn next_nwk_seq(&mut self) -> u8 {
        self.nwk_seq = self.nwk_seq.wrapping_add(1);
        self.nwk_seq
    }

    /// Next link sequence number (pre-increment, wraps)
    pub fn next_mac_seq(&mut self) -> u8 {
        self.mac_seq = self.mac_seq.wrapping_add(1);
        self.mac_seq
    }

    /// Register the handler for an application endpoint, replacing any previous one
    pub fn open_endpoint<F>(&mut self, id: u8, handler: F) -> Result<(), NwkError>
    where
        F: FnMut(&mut DataIndication<'_>) -> bool + 'static,
    {
        if id == COMMAND_ENDPOINT {
            return Err(NwkError::ReservedEndpoint);
        }
        let slot = self
            .endpoints
            .get_mut(id as usize)
            .ok_or(NwkError::InvalidEndpoint(id))?;
        *slot = Some(Box::new(handler));
        Ok(())
    }

    /// Handler registered for `id`
    pub(crate) fn endpoint_mut(&mut self, id: u8) -> Option<&mut EndpointHandler> {
        self.endpoints.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// Whether an application endpoint has a handler
    pub fn is_endpoint_open(&self, id: u8) -> bool {
        matches!(self.endpoints.get(id as usize), Some(Some(_)))
    }

    /// Prepare the network header of a frame originated by this node
    ///
    /// Clears the network flags, assigns the next network sequence number,
    /// sets the local source address and zeroes the destination and endpoints.
    pub fn command_init(&mut self, frame: &mut Frame) {
        let seq = self.next_nwk_seq();
        let nwk = &mut frame.header_mut().nwk;
        nwk.flags = NwkFlags::empty();
        nwk.seq = seq;
        nwk.src_addr = self.addr;
        nwk.dst_addr = 0;
        nwk.endpoints = Endpoints::default();
    }
}

impl Default for ControlBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open: Vec<usize> = self
            .endpoints
            .iter()
            .enumerate()
            .filter(|(_, handler)| handler.is_some())
            .map(|(id, _)| id)
            .collect();

        f.debug_struct("ControlBlock")
            .field("addr", &self.addr)
            .field("pan_id", &self.pan_id)
            .field("nwk_seq", &self.nwk_seq)
            .field("mac_seq", &self.mac_seq)
            .field("endpoints", &open)
            .finish()
    }
}
