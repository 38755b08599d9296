//! Network command payloads.
//!
//! Commands travel as ordinary payloads addressed to endpoint 0. The first
//! payload byte is the command id.

use crate::WireError;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Endpoint reserved for network commands
pub const COMMAND_ENDPOINT: u8 = 0;

/// Network command identifiers
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandId {
    /// Network-level acknowledgment
    Ack = 0x00,
    /// Route error report
    RouteError = 0x01,
}

impl TryFrom<u8> for CommandId {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(CommandId::Ack),
            0x01 => Ok(CommandId::RouteError),
            _ => Err(WireError::Command(value)),
        }
    }
}

/// Acknowledgment of a network-unicast data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckCommand {
    /// Network sequence number being acknowledged
    pub seq: u8,
    /// Control byte echoed back to the originator
    pub control: u8,
}

impl AckCommand {
    /// Encoded size including the command id
    pub const SIZE: usize = 3;
}

/// Report that a relay has no route towards `dst_addr`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteErrorCommand {
    /// Originator of the undeliverable frame
    pub src_addr: u16,
    /// Unreachable destination
    pub dst_addr: u16,
}

impl RouteErrorCommand {
    /// Encoded size including the command id
    pub const SIZE: usize = 5;
}

/// Decoded network command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Acknowledgment
    Ack(AckCommand),
    /// Route error
    RouteError(RouteErrorCommand),
}

impl Command {
    /// Command id of this command
    pub fn id(&self) -> CommandId {
        match self {
            Command::Ack(_) => CommandId::Ack,
            Command::RouteError(_) => CommandId::RouteError,
        }
    }

    /// Encoded size including the command id
    pub fn encoded_size(&self) -> usize {
        match self {
            Command::Ack(_) => AckCommand::SIZE,
            Command::RouteError(_) => RouteErrorCommand::SIZE,
        }
    }

    /// Encode the command (little-endian)
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.id() as u8);
        match self {
            Command::Ack(ack) => {
                buf.put_u8(ack.seq);
                buf.put_u8(ack.control);
            }
            Command::RouteError(err) => {
                buf.put_u16_le(err.src_addr);
                buf.put_u16_le(err.dst_addr);
            }
        }
    }

    /// Decode a command from a payload
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut buf = payload;
        if !buf.has_remaining() {
            return Err(WireError::Incomplete {
                needed: 1,
                available: 0,
            });
        }

        let id = CommandId::try_from(buf[0])?;
        let needed = match id {
            CommandId::Ack => AckCommand::SIZE,
            CommandId::RouteError => RouteErrorCommand::SIZE,
        };
        if payload.len() < needed {
            return Err(WireError::Incomplete {
                needed,
                available: payload.len(),
            });
        }

        buf.advance(1);
        let command = match id {
            CommandId::Ack => Command::Ack(AckCommand {
                seq: buf.get_u8(),
                control: buf.get_u8(),
            }),
            CommandId::RouteError => Command::RouteError(RouteErrorCommand {
                src_addr: buf.get_u16_le(),
                dst_addr: buf.get_u16_le(),
            }),
        };

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_id_conversion() {
        assert_eq!(CommandId::try_from(0x00).unwrap(), CommandId::Ack);
        assert_eq!(CommandId::try_from(0x01).unwrap(), CommandId::RouteError);
        assert!(CommandId::try_from(0x02).is_err());
    }

    #[test]
    fn test_ack_layout() {
        let command = Command::Ack(AckCommand {
            seq: 0x10,
            control: 0x5a,
        });

        let mut buf = Vec::new();
        command.encode(&mut buf);

        assert_eq!(buf, vec![0x00, 0x10, 0x5a]);
        assert_eq!(buf.len(), command.encoded_size());
        assert_eq!(Command::decode(&buf).unwrap(), command);
    }

    #[test]
    fn test_route_error_layout() {
        let command = Command::RouteError(RouteErrorCommand {
            src_addr: 0x0102,
            dst_addr: 0x8003,
        });

        let mut buf = Vec::new();
        command.encode(&mut buf);

        assert_eq!(buf, vec![0x01, 0x02, 0x01, 0x03, 0x80]);
        assert_eq!(Command::decode(&buf).unwrap(), command);
    }

    #[test]
    fn test_truncated_commands() {
        assert!(matches!(
            Command::decode(&[]),
            Err(WireError::Incomplete { needed: 1, .. })
        ));
        assert!(matches!(
            Command::decode(&[0x01, 0x02, 0x01]),
            Err(WireError::Incomplete { needed: 5, available: 3 })
        ));
        assert_eq!(Command::decode(&[0x7f]), Err(WireError::Command(0x7f)));
    }
}
