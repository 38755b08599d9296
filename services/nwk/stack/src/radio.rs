//! Radio driver boundary.
//!
//! The network layer drives the radio through [`Radio`] and learns about send
//! confirmations and received frames by draining [`Radio::poll`] at the start
//! of every task handler pass.

use crate::frame::TxStatus;
use bytes::Bytes;

/// Outcome of a radio transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioStatus {
    /// Sent (and link-acknowledged, when requested)
    Success,
    /// Clear channel assessment failed
    ChannelAccessFailure,
    /// No link-layer acknowledgment
    NoAck,
    /// Any other driver failure
    Error,
}

impl From<RadioStatus> for TxStatus {
    fn from(status: RadioStatus) -> Self {
        match status {
            RadioStatus::Success => TxStatus::Success,
            RadioStatus::ChannelAccessFailure => TxStatus::PhyChannelAccessFailure,
            RadioStatus::NoAck => TxStatus::PhyNoAck,
            RadioStatus::Error => TxStatus::Error,
        }
    }
}

/// A frame captured by the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioFrame {
    /// Frame bytes, without the frame check sequence
    pub psdu: Bytes,
    /// Link quality indicator
    pub lqi: u8,
    /// Received signal strength (dBm)
    pub rssi: i8,
}

/// Event raised by the radio driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// The pending transmission completed
    DataConf(RadioStatus),
    /// A frame was received
    DataInd(RadioFrame),
}

/// Radio driver used by the network layer
pub trait Radio {
    /// Set the link-layer short address
    fn set_short_addr(&mut self, addr: u16);

    /// Set the PAN id
    fn set_pan_id(&mut self, pan_id: u16);

    /// Set the channel
    fn set_channel(&mut self, channel: u8);

    /// Enable or disable the receiver
    fn set_rx_state(&mut self, on: bool);

    /// Put the radio to sleep
    fn sleep(&mut self);

    /// Wake the radio up
    fn wakeup(&mut self);

    /// Whether a transmission or state change is in progress
    fn busy(&self) -> bool;

    /// Start transmitting a frame; completion arrives as [`RadioEvent::DataConf`]
    fn data_req(&mut self, psdu: &[u8]);

    /// Next pending driver event
    fn poll(&mut self) -> Option<RadioEvent>;
}
