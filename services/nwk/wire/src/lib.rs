//! Frame header and command encoding for the low-power wireless network layer.
//!
//! This crate defines the bit-exact on-air layout used by the network layer:
//! the two-sublayer frame header, endpoint packing, network flags, and the
//! command payloads carried on endpoint 0.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u16 link fcf         | frame control              |
//! | u8  link seq         | link sequence number       |
//! | u16 pan id           | destination PAN            |
//! | u16 link dst         | next hop / broadcast       |
//! | u16 link src         | transmitting node          |
//! +----------------------+----------------------------+
//! | u8  nwk flags        | ack, security, link-local  |
//! | u8  nwk seq          | network sequence number    |
//! | u16 nwk src          | originator                 |
//! | u16 nwk dst          | final destination          |
//! | u8  endpoints        | src (low 4) / dst (high 4) |
//! +----------------------+----------------------------+
//! | payload              | 0..109 bytes               |
//! +----------------------+----------------------------+
//! | tag (secured only)   | 16 bytes                   |
//! +----------------------+----------------------------+
//! ```
//!
//! All multi-byte fields are little-endian.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod header;

// Re-export main types
pub use command::{AckCommand, Command, CommandId, RouteErrorCommand, COMMAND_ENDPOINT};
pub use error::WireError;
pub use header::{
    Endpoints, FrameHeader, MacHeader, NwkFlags, NwkHeader, BROADCAST_ADDR, BROADCAST_PAN_ID,
    HEADER_SIZE, MAC_FCF_ACK_REQUEST, MAC_FCF_DATA, MAC_HEADER_SIZE, MAX_ENDPOINTS,
    NWK_HEADER_SIZE,
};

/// Largest frame the radio accepts, including the frame check sequence
pub const MAX_PSDU_SIZE: usize = 127;

/// Frame check sequence appended by the radio
pub const FCS_SIZE: usize = 2;

/// Authentication tag size for secured frames
pub const MIC_SIZE: usize = 16;

/// Largest unsecured payload
pub const MAX_PAYLOAD_SIZE: usize = MAX_PSDU_SIZE - HEADER_SIZE - FCS_SIZE;

/// Largest payload that still fits once the authentication tag is appended
pub const MAX_SECURED_PAYLOAD_SIZE: usize = MAX_PAYLOAD_SIZE - MIC_SIZE;
