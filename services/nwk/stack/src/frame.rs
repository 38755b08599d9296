//! Frame buffers and their per-pipeline metadata.

use crate::NwkError;
use bitflags::bitflags;
use nwk_wire::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE, MAX_PSDU_SIZE};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Delivery status reported to the owner of a transmitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Delivered (and acknowledged, when requested)
    Success,
    /// Generic failure
    Error,
    /// No network ACK within the wait period
    NoAck,
    /// Radio could not access the channel
    PhyChannelAccessFailure,
    /// Radio got no link-layer ACK
    PhyNoAck,
}

impl TxStatus {
    /// Whether this is [`TxStatus::Success`]
    pub fn is_success(self) -> bool {
        self == TxStatus::Success
    }
}

bitflags! {
    /// Transmit control flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TxControl: u8 {
        /// Send with the wildcard PAN id
        const BROADCAST_PAN_ID = 1 << 0;
        /// Frame is being relayed on behalf of another node
        const ROUTING = 1 << 1;
    }
}

/// Component a transmitted frame returns to on completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOwner {
    /// The data request gate
    DataRequest,
    /// Unicast forwarding
    Route,
    /// A route error report
    RouteError,
    /// A network ACK
    Ack,
    /// A relayed broadcast copy
    Relay,
}

/// Transmit pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxState {
    Encrypt,
    WaitEncrypt,
    Send,
    WaitConf,
    WaitAck,
    Confirm,
}

/// Metadata of a frame owned by the transmit pipeline
#[derive(Debug, Clone)]
pub struct TxMeta {
    /// Delivery status so far
    pub status: TxStatus,
    /// Transmissions made
    pub attempts: u8,
    /// Control flags
    pub control: TxControl,
    /// Component to return the frame to
    pub owner: TxOwner,
    /// Control byte echoed in the ACK
    pub ack_control: u8,
    pub(crate) state: TxState,
    pub(crate) deadline: Option<Instant>,
}

impl TxMeta {
    /// Fresh metadata for a frame about to be submitted by `owner`
    pub fn new(owner: TxOwner) -> Self {
        Self {
            status: TxStatus::Success,
            attempts: 0,
            control: TxControl::empty(),
            owner,
            ack_control: 0,
            state: TxState::Send,
            deadline: None,
        }
    }
}

/// Metadata of a frame captured by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxMeta {
    /// Link quality indicator
    pub lqi: u8,
    /// Received signal strength (dBm)
    pub rssi: i8,
}

/// Role-specific metadata, selected by the owning pipeline
#[derive(Debug, Clone)]
pub enum FrameMeta {
    /// Allocated but not yet claimed by a pipeline
    None,
    /// Owned by the receive pipeline
    Rx(RxMeta),
    /// Owned by the transmit pipeline
    Tx(TxMeta),
}

/// A frame buffer
#[derive(Debug, Clone)]
pub struct Frame {
    index: usize,
    header: FrameHeader,
    payload: [u8; MAX_PAYLOAD_SIZE],
    payload_len: usize,
    meta: FrameMeta,
}

impl Frame {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            header: FrameHeader::default(),
            payload: [0; MAX_PAYLOAD_SIZE],
            payload_len: 0,
            meta: FrameMeta::None,
        }
    }

    /// Pool slot holding this frame
    pub fn index(&self) -> usize {
        self.index
    }

    /// Frame header
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Mutable frame header
    pub fn header_mut(&mut self) -> &mut FrameHeader {
        &mut self.header
    }

    /// Encoded size: header plus payload (and tag, when present)
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }

    /// Current payload
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len]
    }

    /// Mutable current payload
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload[..self.payload_len]
    }

    /// Resize the payload; bytes beyond the previous length are left as they were
    pub(crate) fn set_payload_len(&mut self, len: usize) -> Result<(), NwkError> {
        if len > MAX_PAYLOAD_SIZE {
            return Err(NwkError::PayloadTooLarge {
                size: len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        self.payload_len = len;
        Ok(())
    }

    /// Replace the payload
    pub(crate) fn set_payload(&mut self, data: &[u8]) -> Result<(), NwkError> {
        self.set_payload_len(data.len())?;
        self.payload[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Whole payload buffer, for in-place growth
    pub(crate) fn payload_buf_mut(&mut self) -> &mut [u8; MAX_PAYLOAD_SIZE] {
        &mut self.payload
    }

    /// Role metadata
    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    pub(crate) fn set_meta(&mut self, meta: FrameMeta) {
        self.meta = meta;
    }

    /// Receive metadata, if the receive pipeline owns this frame
    pub fn rx(&self) -> Option<&RxMeta> {
        match &self.meta {
            FrameMeta::Rx(rx) => Some(rx),
            _ => None,
        }
    }

    /// Transmit metadata, if the transmit pipeline owns this frame
    pub fn tx(&self) -> Option<&TxMeta> {
        match &self.meta {
            FrameMeta::Tx(tx) => Some(tx),
            _ => None,
        }
    }

    pub(crate) fn rx_meta(&self) -> Result<RxMeta, NwkError> {
        self.rx().copied().ok_or(NwkError::FrameRole {
            index: self.index,
            expected: "receive",
        })
    }

    pub(crate) fn tx_mut(&mut self) -> Result<&mut TxMeta, NwkError> {
        let index = self.index;
        match &mut self.meta {
            FrameMeta::Tx(tx) => Ok(tx),
            _ => Err(NwkError::FrameRole {
                index,
                expected: "transmit",
            }),
        }
    }

    /// Serialize header and payload into `out`, returning the frame length
    pub(crate) fn encode(&self, out: &mut [u8; MAX_PSDU_SIZE]) -> usize {
        let size = self.size();
        let mut buf = &mut out[..];
        self.header.encode(&mut buf);
        out[HEADER_SIZE..size].copy_from_slice(self.payload());
        size
    }

    /// Load a received frame, returning an error for malformed input
    pub(crate) fn decode_from(&mut self, psdu: &[u8]) -> Result<(), NwkError> {
        let mut buf = psdu;
        self.header = FrameHeader::decode(&mut buf)?;
        self.set_payload(buf)
    }
}
