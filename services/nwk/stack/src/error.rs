//! Network layer error types.

use nwk_wire::WireError;
use thiserror::Error;

/// Network layer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NwkError {
    /// Every frame buffer is in use; retry later
    #[error("frame pool exhausted")]
    PoolExhausted,

    /// A frame buffer was released while already free
    #[error("frame {index} released twice")]
    DoubleRelease {
        /// Pool slot index
        index: usize,
    },

    /// Frame metadata accessed under the wrong pipeline role
    #[error("frame {index} is not owned by the {expected} pipeline")]
    FrameRole {
        /// Pool slot index
        index: usize,
        /// Role the caller expected
        expected: &'static str,
    },

    /// A data request is already in flight
    #[error("data request already pending")]
    Busy,

    /// Endpoint id outside the endpoint table
    #[error("endpoint {0} out of range")]
    InvalidEndpoint(u8),

    /// Endpoint 0 carries network commands
    #[error("endpoint 0 is reserved for network commands")]
    ReservedEndpoint,

    /// Payload does not fit into a frame
    #[error("payload of {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Requested payload size
        size: usize,
        /// Largest allowed payload size
        max: usize,
    },

    /// Security requested but no network key installed
    #[error("security requested without a network key")]
    SecurityKeyMissing,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Wire format error
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}
