//! Wire format error types.

use thiserror::Error;

/// Wire format errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer shorter than the structure being decoded
    #[error("incomplete frame: need {needed} bytes, have {available}")]
    Incomplete {
        /// Bytes required
        needed: usize,
        /// Bytes present
        available: usize,
    },

    /// Reserved network flag bits nonzero
    #[error("reserved bits nonzero: {0:#04x}")]
    Reserved(u8),

    /// Endpoint id outside the 4-bit range
    #[error("endpoint {0} out of range")]
    Endpoint(u8),

    /// Unknown network command identifier
    #[error("unknown command {0:#04x}")]
    Command(u8),

    /// Link-layer frame type other than data
    #[error("unsupported link frame control {0:#06x}")]
    FrameControl(u16),
}
