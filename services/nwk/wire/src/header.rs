//! Two-sublayer frame header.
//!
//! The header is a fixed 16-byte structure: a 9-byte link-layer part followed
//! by a 7-byte network-layer part. All multi-byte fields are little-endian, as
//! on the radio.

use crate::WireError;
use bitflags::bitflags;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Link-layer header size in bytes
pub const MAC_HEADER_SIZE: usize = 9;

/// Network-layer header size in bytes
pub const NWK_HEADER_SIZE: usize = 7;

/// Full header size in bytes
pub const HEADER_SIZE: usize = MAC_HEADER_SIZE + NWK_HEADER_SIZE;

/// Broadcast short address, also the "unknown" route marker
pub const BROADCAST_ADDR: u16 = 0xffff;

/// Wildcard PAN id
pub const BROADCAST_PAN_ID: u16 = 0xffff;

/// Number of addressable endpoints (4-bit endpoint ids)
pub const MAX_ENDPOINTS: usize = 16;

/// Data frame, PAN id compression, short destination and source addressing
pub const MAC_FCF_DATA: u16 = 0x8841;

/// Link-layer acknowledgment request bit
pub const MAC_FCF_ACK_REQUEST: u16 = 1 << 5;

const MAC_FCF_FRAME_TYPE_MASK: u16 = 0x0007;
const MAC_FCF_FRAME_TYPE_DATA: u16 = 0x0001;

bitflags! {
    /// Network frame control flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct NwkFlags: u8 {
        /// Originator wants a network-level acknowledgment
        const ACK_REQUEST = 1 << 0;
        /// Payload is encrypted and followed by an authentication tag
        const SECURITY_ENABLED = 1 << 1;
        /// Frame must not be relayed past the first hop
        const LINK_LOCAL = 1 << 2;
    }
}

/// Source and destination endpoint ids packed into one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Endpoints {
    /// Source endpoint (0..15)
    pub src: u8,
    /// Destination endpoint (0..15)
    pub dst: u8,
}

impl Endpoints {
    /// Create an endpoint pair, rejecting ids that do not fit in 4 bits
    pub fn new(src: u8, dst: u8) -> Result<Self, WireError> {
        if src as usize >= MAX_ENDPOINTS {
            return Err(WireError::Endpoint(src));
        }
        if dst as usize >= MAX_ENDPOINTS {
            return Err(WireError::Endpoint(dst));
        }
        Ok(Self { src, dst })
    }

    /// Pack into a single byte: source in the low nibble, destination in the high nibble
    pub fn pack(self) -> u8 {
        (self.src & 0x0f) | ((self.dst & 0x0f) << 4)
    }

    /// Unpack from a single byte
    pub fn unpack(value: u8) -> Self {
        Self {
            src: value & 0x0f,
            dst: value >> 4,
        }
    }
}

/// Link-layer part of the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MacHeader {
    /// Frame control field
    pub fcf: u16,
    /// Link sequence number
    pub seq: u8,
    /// Destination PAN id
    pub dst_pan_id: u16,
    /// Link destination short address
    pub dst_addr: u16,
    /// Link source short address
    pub src_addr: u16,
}

impl MacHeader {
    /// Whether the link layer is asked to acknowledge this frame
    pub fn ack_requested(&self) -> bool {
        self.fcf & MAC_FCF_ACK_REQUEST != 0
    }

    /// Whether the link destination is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        self.dst_addr == BROADCAST_ADDR
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.fcf);
        buf.put_u8(self.seq);
        buf.put_u16_le(self.dst_pan_id);
        buf.put_u16_le(self.dst_addr);
        buf.put_u16_le(self.src_addr);
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        Self {
            fcf: buf.get_u16_le(),
            seq: buf.get_u8(),
            dst_pan_id: buf.get_u16_le(),
            dst_addr: buf.get_u16_le(),
            src_addr: buf.get_u16_le(),
        }
    }
}

/// Network-layer part of the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NwkHeader {
    /// Frame control flags
    pub flags: NwkFlags,
    /// Network sequence number
    pub seq: u8,
    /// Originator short address
    pub src_addr: u16,
    /// Final destination short address
    pub dst_addr: u16,
    /// Source and destination endpoints
    pub endpoints: Endpoints,
}

impl NwkHeader {
    /// Encode the network header (little-endian)
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.seq);
        buf.put_u16_le(self.src_addr);
        buf.put_u16_le(self.dst_addr);
        buf.put_u8(self.endpoints.pack());
    }

    /// Decode the network header (little-endian)
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        if buf.remaining() < NWK_HEADER_SIZE {
            return Err(WireError::Incomplete {
                needed: NWK_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        let raw_flags = buf.get_u8();
        let flags = NwkFlags::from_bits(raw_flags).ok_or(WireError::Reserved(raw_flags))?;
        let seq = buf.get_u8();
        let src_addr = buf.get_u16_le();
        let dst_addr = buf.get_u16_le();
        let endpoints = Endpoints::unpack(buf.get_u8());

        Ok(Self {
            flags,
            seq,
            src_addr,
            dst_addr,
            endpoints,
        })
    }

    /// The encoded network header as a fixed array
    pub fn to_bytes(&self) -> [u8; NWK_HEADER_SIZE] {
        let mut out = [0u8; NWK_HEADER_SIZE];
        let mut buf = &mut out[..];
        self.encode(&mut buf);
        out
    }

    /// Whether the final destination is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        self.dst_addr == BROADCAST_ADDR
    }
}

/// Complete frame header (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Link-layer fields
    pub mac: MacHeader,
    /// Network-layer fields
    pub nwk: NwkHeader,
}

impl FrameHeader {
    /// Encode the full header
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        self.mac.encode(buf);
        self.nwk.encode(buf);
    }

    /// Decode the full header, accepting only link-layer data frames
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        if buf.remaining() < HEADER_SIZE {
            return Err(WireError::Incomplete {
                needed: HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        let mac = MacHeader::decode(buf);
        if mac.fcf & MAC_FCF_FRAME_TYPE_MASK != MAC_FCF_FRAME_TYPE_DATA {
            return Err(WireError::FrameControl(mac.fcf));
        }
        let nwk = NwkHeader::decode(buf)?;

        Ok(Self { mac, nwk })
    }
}
