//! Transmit pipeline
//!
//! Frames enter through [`TxPipeline::submit`] fully addressed at the network
//! level. The pipeline fills in the link-layer header, optionally hands the
//! frame to the security engine, feeds the radio one frame at a time, waits for
//! a network ACK when this node originated an ACK-requested unicast frame, and
//! retries failed attempts. Finished frames are parked until the owner
//! collects them with [`TxPipeline::pop_completed`]; the pipeline never
//! releases a frame itself.

use crate::frame::{FrameMeta, TxControl, TxMeta, TxOwner, TxState, TxStatus};
use crate::nwk::Context;
use crate::pool::FrameHandle;
use crate::radio::{Radio, RadioStatus};
use crate::security::Direction;
use nwk_wire::{
    AckCommand, NwkFlags, BROADCAST_ADDR, BROADCAST_PAN_ID, MAC_FCF_ACK_REQUEST, MAC_FCF_DATA,
    MAX_PSDU_SIZE,
};
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Transmit pipeline state
#[derive(Debug, Default)]
pub struct TxPipeline {
    frames: VecDeque<FrameHandle>,
    active: Option<FrameHandle>,
    completed: VecDeque<FrameHandle>,
    encrypting: usize,
}

impl TxPipeline {
    /// Empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a network-addressed frame for transmission on behalf of `owner`
    pub(crate) fn submit<R: Radio>(
        &mut self,
        ctx: &mut Context<R>,
        handle: FrameHandle,
        owner: TxOwner,
        control: TxControl,
    ) {
        self.enqueue(ctx, handle, owner, control, false);
    }

    /// Queue a frame for link-layer broadcast; never waits for a network ACK
    pub(crate) fn submit_broadcast<R: Radio>(
        &mut self,
        ctx: &mut Context<R>,
        handle: FrameHandle,
        owner: TxOwner,
        control: TxControl,
    ) {
        self.enqueue(ctx, handle, owner, control, true);
    }

    fn enqueue<R: Radio>(
        &mut self,
        ctx: &mut Context<R>,
        handle: FrameHandle,
        owner: TxOwner,
        mut control: TxControl,
        broadcast: bool,
    ) {
        let nwk = ctx.pool.get(&handle).header().nwk;

        let mac_dst = if broadcast || nwk.is_broadcast() {
            BROADCAST_ADDR
        } else if nwk.flags.contains(NwkFlags::LINK_LOCAL) || !ctx.config.routing {
            nwk.dst_addr
        } else {
            match ctx.routes.next_hop(nwk.dst_addr) {
                Some(next_hop) => {
                    control |= TxControl::ROUTING;
                    next_hop
                }
                None => BROADCAST_ADDR,
            }
        };

        let mac_seq = ctx.ib.next_mac_seq();
        let pan_id = if control.contains(TxControl::BROADCAST_PAN_ID) {
            BROADCAST_PAN_ID
        } else {
            ctx.ib.pan_id
        };
        let local = ctx.ib.addr;

        let frame = ctx.pool.get_mut(&handle);
        let mac = &mut frame.header_mut().mac;
        mac.fcf = if mac_dst == BROADCAST_ADDR {
            MAC_FCF_DATA
        } else {
            MAC_FCF_DATA | MAC_FCF_ACK_REQUEST
        };
        mac.seq = mac_seq;
        mac.dst_pan_id = pan_id;
        mac.dst_addr = mac_dst;
        mac.src_addr = local;

        let mut meta = TxMeta::new(owner);
        meta.control = control;
        meta.state = if nwk.flags.contains(NwkFlags::SECURITY_ENABLED) {
            TxState::Encrypt
        } else {
            TxState::Send
        };
        frame.set_meta(FrameMeta::Tx(meta));

        trace!(
            "Queued frame {} seq {} for {:#06x} via {:#06x}",
            handle.index(),
            nwk.seq,
            nwk.dst_addr,
            mac_dst
        );
        self.frames.push_back(handle);
    }

    /// Whether any frame is queued, encrypting, on air or awaiting an ACK
    pub fn busy(&self) -> bool {
        !self.frames.is_empty()
            || self.active.is_some()
            || !self.completed.is_empty()
            || self.encrypting > 0
    }

    /// Next frame whose transmission finished, with its status in the tx metadata
    pub(crate) fn pop_completed(&mut self) -> Option<FrameHandle> {
        self.completed.pop_front()
    }

    /// Advance queued frames by one step
    pub(crate) fn task<R: Radio>(&mut self, ctx: &mut Context<R>) {
        let now = Instant::now();
        let attempts = ctx.config.tx_attempts;
        let mut remaining = VecDeque::with_capacity(self.frames.len());

        while let Some(handle) = self.frames.pop_front() {
            let frame = ctx.pool.get_mut(&handle);
            let tx = match frame.tx_mut() {
                Ok(tx) => tx,
                Err(err) => {
                    warn!("Dropping frame {} from transmit queue: {}", handle.index(), err);
                    ctx.release(handle);
                    continue;
                }
            };

            match tx.state {
                TxState::Encrypt => {
                    tx.state = TxState::WaitEncrypt;
                    self.encrypting += 1;
                    ctx.security.process(handle, Direction::Encrypt);
                }
                TxState::Send => {
                    if self.active.is_none() && !ctx.radio.busy() {
                        tx.state = TxState::WaitConf;
                        tx.attempts += 1;
                        let attempt = tx.attempts;

                        let mut psdu = [0u8; MAX_PSDU_SIZE];
                        let len = frame.encode(&mut psdu);
                        ctx.radio.data_req(&psdu[..len]);
                        trace!(
                            "Sending frame {} ({} bytes, attempt {})",
                            handle.index(),
                            len,
                            attempt
                        );
                        self.active = Some(handle);
                    } else {
                        remaining.push_back(handle);
                    }
                }
                TxState::WaitAck => {
                    if tx.deadline.map_or(true, |deadline| now >= deadline) {
                        tx.status = TxStatus::NoAck;
                        tx.deadline = None;
                        retry_or_confirm(tx, attempts);
                        debug!(
                            "No ACK for frame {} seq {}",
                            handle.index(),
                            frame.header().nwk.seq
                        );
                    }
                    remaining.push_back(handle);
                }
                TxState::Confirm => self.completed.push_back(handle),
                TxState::WaitEncrypt | TxState::WaitConf => remaining.push_back(handle),
            }
        }

        // Frames that became ready this pass are confirmed on the next one
        self.frames = remaining;
    }

    /// Security engine finished sealing a frame
    pub(crate) fn encrypt_conf<R: Radio>(
        &mut self,
        ctx: &mut Context<R>,
        handle: FrameHandle,
        success: bool,
    ) {
        self.encrypting = self.encrypting.saturating_sub(1);
        if let Ok(tx) = ctx.pool.get_mut(&handle).tx_mut() {
            if success {
                tx.state = TxState::Send;
            } else {
                tx.status = TxStatus::Error;
                tx.state = TxState::Confirm;
            }
        }
        self.frames.push_back(handle);
    }

    /// Radio finished the transmission in progress
    pub(crate) fn radio_conf<R: Radio>(&mut self, ctx: &mut Context<R>, status: RadioStatus) {
        let Some(handle) = self.active.take() else {
            debug!("Radio confirm {:?} with nothing in flight", status);
            return;
        };

        let local = ctx.ib.addr;
        let ack_wait = ctx.config.ack_wait();
        let attempts = ctx.config.tx_attempts;
        let frame = ctx.pool.get_mut(&handle);
        let header = *frame.header();

        if let Ok(tx) = frame.tx_mut() {
            tx.status = status.into();
            if status == RadioStatus::Success {
                let wait_ack = header.nwk.src_addr == local
                    && header.nwk.flags.contains(NwkFlags::ACK_REQUEST)
                    && !header.nwk.is_broadcast();
                if wait_ack {
                    tx.state = TxState::WaitAck;
                    tx.deadline = Some(Instant::now() + ack_wait);
                } else {
                    tx.state = TxState::Confirm;
                }
            } else {
                debug!(
                    "Frame {} to {:#06x} failed on attempt {}: {:?}",
                    handle.index(),
                    header.mac.dst_addr,
                    tx.attempts,
                    status
                );
                retry_or_confirm(tx, attempts);
            }
        }

        self.frames.push_back(handle);
    }

    /// Match a received network ACK from `src_addr` against frames awaiting one
    pub(crate) fn ack_received<R: Radio>(
        &mut self,
        ctx: &mut Context<R>,
        src_addr: u16,
        ack: &AckCommand,
    ) -> bool {
        for handle in &self.frames {
            let frame = ctx.pool.get_mut(handle);
            let nwk = frame.header().nwk;
            let Ok(tx) = frame.tx_mut() else {
                continue;
            };

            if tx.state == TxState::WaitAck && nwk.seq == ack.seq && nwk.dst_addr == src_addr {
                tx.status = TxStatus::Success;
                tx.ack_control = ack.control;
                tx.deadline = None;
                tx.state = TxState::Confirm;
                trace!("ACK for seq {} from {:#06x}", ack.seq, src_addr);
                return true;
            }
        }

        debug!("Unmatched ACK for seq {} from {:#06x}", ack.seq, src_addr);
        false
    }
}

fn retry_or_confirm(tx: &mut TxMeta, attempts: u8) {
    tx.state = if tx.attempts < attempts {
        TxState::Send
    } else {
        TxState::Confirm
    };
}
