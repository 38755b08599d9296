//! Forwarding step between the receive pipeline and the routing table.

use crate::frame::{TxControl, TxOwner};
use crate::nwk::Context;
use crate::pool::FrameHandle;
use crate::radio::Radio;
use crate::tx::TxPipeline;
use nwk_wire::{Command, RouteErrorCommand};
use tracing::{debug, info};

/// Forward a frame addressed to another node, or answer with a route error
///
/// Takes ownership of the frame: it either moves to the transmit pipeline or
/// is released here.
pub(crate) fn route_frame<R: Radio>(ctx: &mut Context<R>, tx: &mut TxPipeline, handle: FrameHandle) {
    let nwk = ctx.pool.get(&handle).header().nwk;

    match ctx.routes.resolve(nwk.dst_addr) {
        Some(next_hop) => {
            debug!(
                "Forwarding frame from {:#06x} seq {} to {:#06x} via {:#06x}",
                nwk.src_addr, nwk.seq, nwk.dst_addr, next_hop
            );
            tx.submit(ctx, handle, TxOwner::Route, TxControl::ROUTING);
        }
        None => {
            info!(
                "No route to {:#06x} for frame from {:#06x}",
                nwk.dst_addr, nwk.src_addr
            );
            send_route_error(ctx, tx, nwk.src_addr, nwk.dst_addr);
            ctx.release(handle);
        }
    }
}

/// Tell `src` that this node cannot reach `dst`
pub(crate) fn send_route_error<R: Radio>(
    ctx: &mut Context<R>,
    tx: &mut TxPipeline,
    src: u16,
    dst: u16,
) {
    let command = Command::RouteError(RouteErrorCommand {
        src_addr: src,
        dst_addr: dst,
    });
    let handle = match ctx.pool.alloc(command.encoded_size()) {
        Ok(handle) => handle,
        Err(_) => {
            debug!("No free frame for route error to {:#06x}", src);
            return;
        }
    };

    let frame = ctx.pool.get_mut(&handle);
    ctx.ib.command_init(frame);
    frame.header_mut().nwk.dst_addr = src;
    let mut buf = frame.payload_mut();
    command.encode(&mut buf);

    tx.submit(ctx, handle, TxOwner::RouteError, TxControl::empty());
}
