//! Data request gate: the single-request-at-a-time send API.

use crate::frame::{TxControl, TxOwner, TxStatus};
use crate::nwk::Context;
use crate::pool::FrameHandle;
use crate::radio::Radio;
use crate::tx::TxPipeline;
use crate::NwkError;
use bitflags::bitflags;
use nwk_wire::{
    Endpoints, NwkFlags, COMMAND_ENDPOINT, MAX_PAYLOAD_SIZE, MAX_SECURED_PAYLOAD_SIZE,
};
use std::fmt;
use tracing::{debug, warn};

bitflags! {
    /// Data request options
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DataReqOptions: u8 {
        /// Ask the destination for a network ACK
        const ACK_REQUEST = 1 << 0;
        /// Encrypt and authenticate the payload
        const ENABLE_SECURITY = 1 << 1;
        /// Deliver to a direct neighbour only
        const LINK_LOCAL = 1 << 2;
        /// Send with the wildcard PAN id
        const BROADCAST_PAN_ID = 1 << 3;
    }
}

/// Result of a data request, passed to its confirm callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataConfirm {
    /// Delivery status
    pub status: TxStatus,
    /// Control byte from the destination's ACK
    pub control: u8,
}

/// Confirm callback of a data request
pub type ConfirmCallback = Box<dyn FnOnce(DataConfirm)>;

/// An outbound payload
pub struct DataRequest<'a> {
    /// Destination address, or broadcast
    pub dst_addr: u16,
    /// Destination endpoint
    pub dst_endpoint: u8,
    /// Source endpoint
    pub src_endpoint: u8,
    /// Options
    pub options: DataReqOptions,
    /// Payload, copied into a frame buffer on submission
    pub data: &'a [u8],
    /// Called once when delivery finishes
    pub confirm: Option<ConfirmCallback>,
}

impl<'a> DataRequest<'a> {
    /// Request without options or confirm callback
    pub fn new(dst_addr: u16, dst_endpoint: u8, src_endpoint: u8, data: &'a [u8]) -> Self {
        Self {
            dst_addr,
            dst_endpoint,
            src_endpoint,
            options: DataReqOptions::empty(),
            data,
            confirm: None,
        }
    }

    /// Set options
    pub fn with_options(mut self, options: DataReqOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the confirm callback
    pub fn on_confirm<F>(mut self, confirm: F) -> Self
    where
        F: FnOnce(DataConfirm) + 'static,
    {
        self.confirm = Some(Box::new(confirm));
        self
    }
}

impl fmt::Debug for DataRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRequest")
            .field("dst_addr", &self.dst_addr)
            .field("dst_endpoint", &self.dst_endpoint)
            .field("src_endpoint", &self.src_endpoint)
            .field("options", &self.options)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Admits at most one data request at a time
#[derive(Default)]
pub struct DataReqGate {
    busy: bool,
    confirm: Option<ConfirmCallback>,
}

impl DataReqGate {
    /// Idle gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a request is in flight
    pub fn busy(&self) -> bool {
        self.busy
    }

    /// Validate, copy and submit a request
    pub(crate) fn request<R: Radio>(
        &mut self,
        ctx: &mut Context<R>,
        tx: &mut TxPipeline,
        req: DataRequest<'_>,
    ) -> Result<(), NwkError> {
        if self.busy {
            return Err(NwkError::Busy);
        }
        if req.src_endpoint == COMMAND_ENDPOINT || req.dst_endpoint == COMMAND_ENDPOINT {
            return Err(NwkError::ReservedEndpoint);
        }
        let endpoints = Endpoints::new(req.src_endpoint, req.dst_endpoint)
            .map_err(|_| NwkError::InvalidEndpoint(req.src_endpoint.max(req.dst_endpoint)))?;

        let secure = req.options.contains(DataReqOptions::ENABLE_SECURITY);
        if secure && !ctx.security.has_key() {
            return Err(NwkError::SecurityKeyMissing);
        }
        let max = if secure {
            MAX_SECURED_PAYLOAD_SIZE
        } else {
            MAX_PAYLOAD_SIZE
        };
        if req.data.len() > max {
            return Err(NwkError::PayloadTooLarge {
                size: req.data.len(),
                max,
            });
        }

        let handle = ctx.pool.alloc(req.data.len())?;

        let mut flags = NwkFlags::empty();
        flags.set(
            NwkFlags::ACK_REQUEST,
            req.options.contains(DataReqOptions::ACK_REQUEST),
        );
        flags.set(NwkFlags::SECURITY_ENABLED, secure);
        flags.set(
            NwkFlags::LINK_LOCAL,
            req.options.contains(DataReqOptions::LINK_LOCAL),
        );

        let frame = ctx.pool.get_mut(&handle);
        ctx.ib.command_init(frame);
        let nwk = &mut frame.header_mut().nwk;
        let seq = nwk.seq;
        nwk.flags = flags;
        nwk.dst_addr = req.dst_addr;
        nwk.endpoints = endpoints;
        frame.payload_mut().copy_from_slice(req.data);

        let mut control = TxControl::empty();
        control.set(
            TxControl::BROADCAST_PAN_ID,
            req.options.contains(DataReqOptions::BROADCAST_PAN_ID),
        );

        debug!(
            "Data request seq {} to {:#06x}:{} ({} bytes)",
            seq,
            req.dst_addr,
            req.dst_endpoint,
            req.data.len()
        );
        tx.submit(ctx, handle, TxOwner::DataRequest, control);
        self.busy = true;
        self.confirm = req.confirm;
        Ok(())
    }

    /// The transmit pipeline finished with the gate's frame
    pub(crate) fn confirm<R: Radio>(&mut self, ctx: &mut Context<R>, handle: FrameHandle) {
        let confirm = match ctx.pool.get_mut(&handle).tx_mut() {
            Ok(tx) => DataConfirm {
                status: tx.status,
                control: tx.ack_control,
            },
            Err(err) => {
                warn!("Data request completed without transmit state: {}", err);
                DataConfirm {
                    status: TxStatus::Error,
                    control: 0,
                }
            }
        };
        ctx.release(handle);
        self.busy = false;

        if !confirm.status.is_success() {
            warn!("Data request failed: {:?}", confirm.status);
        }
        if let Some(callback) = self.confirm.take() {
            callback(confirm);
        }
    }
}

impl fmt::Debug for DataReqGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataReqGate")
            .field("busy", &self.busy)
            .field("has_confirm", &self.confirm.is_some())
            .finish()
    }
}
