//! Network layer core for low-power wireless mesh nodes.
//!
//! One [`Nwk`] value owns everything a node needs: a fixed pool of frame
//! buffers, the network control block (address, PAN id, sequence counters and
//! endpoint handlers), the routing table, the payload security engine and the
//! transmit, receive and data request pipelines. Nothing blocks; the
//! application calls [`Nwk::task_handler`] from its main loop and every
//! pending operation advances on those passes.
//!
//! ## Example
//!
//! ```no_run
//! use nwk_stack::sim::SimMedium;
//! use nwk_stack::{DataReqOptions, DataRequest, Nwk, NwkConfig};
//!
//! let medium = SimMedium::new();
//! let mut node = Nwk::new(medium.add_radio(), NwkConfig::default()).unwrap();
//! node.set_addr(0x0001);
//! node.set_pan_id(0x1234);
//! node.open_endpoint(1, |ind| {
//!     println!("{} bytes from {:#06x}", ind.data.len(), ind.src_addr);
//!     true
//! })
//! .unwrap();
//!
//! let req = DataRequest::new(0x0002, 1, 1, b"hello")
//!     .with_options(DataReqOptions::ACK_REQUEST)
//!     .on_confirm(|conf| println!("delivered: {:?}", conf.status));
//! node.data_request(req).unwrap();
//!
//! loop {
//!     node.task_handler();
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod data_req;
pub mod error;
pub mod frame;
pub mod ib;
pub mod nwk;
pub mod pool;
pub mod radio;
mod route;
pub mod rx;
pub mod security;
pub mod sim;
pub mod tx;

// Re-export main types
pub use config::NwkConfig;
pub use data_req::{ConfirmCallback, DataConfirm, DataReqGate, DataReqOptions, DataRequest};
pub use error::NwkError;
pub use frame::{Frame, FrameMeta, RxMeta, TxControl, TxMeta, TxOwner, TxStatus};
pub use ib::{ControlBlock, DataIndication, EndpointHandler, IndOptions};
pub use nwk::Nwk;
pub use pool::{FrameHandle, FramePool};
pub use radio::{Radio, RadioEvent, RadioFrame, RadioStatus};
pub use rx::{DuplicateTable, RxPipeline, Seen};
pub use security::{Direction, SecurityCompletion, SecurityEngine, KEY_SIZE};
pub use tx::TxPipeline;
