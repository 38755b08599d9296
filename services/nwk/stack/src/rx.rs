//! Receive pipeline
//!
//! Frames captured by the radio are copied into pool buffers and queued in
//! arrival order. Each task pass filters them against the local identity,
//! decrypts secured frames (holding back the rest of the queue until the
//! security engine answers), rejects duplicates, learns routes, and then
//! delivers, relays or forwards.

use crate::frame::{FrameMeta, RxMeta, TxControl, TxOwner};
use crate::ib::{DataIndication, IndOptions};
use crate::nwk::Context;
use crate::pool::FrameHandle;
use crate::radio::{Radio, RadioFrame};
use crate::route;
use crate::security::Direction;
use crate::tx::TxPipeline;
use nwk_routing::{DropReason, RoutingDecision};
use nwk_wire::{
    AckCommand, Command, FrameHeader, NwkFlags, BROADCAST_PAN_ID, COMMAND_ENDPOINT,
    MAX_PAYLOAD_SIZE,
};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Outcome of a duplicate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    /// First copy within the rejection window
    New,
    /// Repeat of an accepted frame; carries the ACK control byte if the first copy was acknowledged
    Duplicate {
        /// Control byte of the ACK sent for the first copy
        acked: Option<u8>,
    },
}

#[derive(Debug, Clone, Copy)]
struct DuplicateEntry {
    src_addr: u16,
    seq: u8,
    expires: Instant,
    acked: Option<u8>,
}

/// Recently accepted (source, sequence) pairs
#[derive(Debug)]
pub struct DuplicateTable {
    entries: Vec<DuplicateEntry>,
    capacity: usize,
    ttl: Duration,
}

impl DuplicateTable {
    /// Table tracking up to `capacity` sources for `ttl` each
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Record a frame from `src_addr` with sequence `seq`, reporting repeats
    pub fn check(&mut self, src_addr: u16, seq: u8, now: Instant) -> Seen {
        self.entries.retain(|entry| entry.expires > now);
        let expires = now + self.ttl;

        if let Some(entry) = self.entries.iter_mut().find(|e| e.src_addr == src_addr) {
            if entry.seq == seq {
                return Seen::Duplicate {
                    acked: entry.acked,
                };
            }
            entry.seq = seq;
            entry.expires = expires;
            entry.acked = None;
            return Seen::New;
        }

        let entry = DuplicateEntry {
            src_addr,
            seq,
            expires,
            acked: None,
        };
        if self.entries.len() < self.capacity {
            self.entries.push(entry);
        } else if let Some(oldest) = self.entries.iter_mut().min_by_key(|e| e.expires) {
            *oldest = entry;
        }
        Seen::New
    }

    /// Remember that the frame `seq` from `src_addr` was acknowledged with `control`
    pub fn mark_acked(&mut self, src_addr: u16, seq: u8, control: u8) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.src_addr == src_addr && e.seq == seq)
        {
            entry.acked = Some(control);
        }
    }

    /// Number of tracked sources
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no source is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Receive pipeline state
#[derive(Debug)]
pub struct RxPipeline {
    queue: VecDeque<FrameHandle>,
    decrypting: bool,
    decrypted: Option<(FrameHandle, bool)>,
    duplicates: DuplicateTable,
}

impl RxPipeline {
    /// Empty pipeline with the given duplicate rejection settings
    pub fn new(duplicate_table_size: usize, duplicate_ttl: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            decrypting: false,
            decrypted: None,
            duplicates: DuplicateTable::new(duplicate_table_size, duplicate_ttl),
        }
    }

    /// Whether frames are queued, decrypting or awaiting dispatch
    pub fn busy(&self) -> bool {
        !self.queue.is_empty() || self.decrypting || self.decrypted.is_some()
    }

    /// Capture a frame from the radio; dropped when no buffer is free or it does not parse
    pub(crate) fn frame_received<R: Radio>(&mut self, ctx: &mut Context<R>, ind: RadioFrame) {
        let handle = match ctx.pool.alloc(0) {
            Ok(handle) => handle,
            Err(_) => {
                debug!("No free frame, dropping received frame");
                return;
            }
        };

        let frame = ctx.pool.get_mut(&handle);
        if let Err(err) = frame.decode_from(&ind.psdu) {
            debug!("Dropping malformed frame: {}", err);
            ctx.release(handle);
            return;
        }
        frame.set_meta(FrameMeta::Rx(RxMeta {
            lqi: ind.lqi,
            rssi: ind.rssi,
        }));

        self.queue.push_back(handle);
    }

    /// Security engine finished checking a frame
    pub(crate) fn decrypt_conf(&mut self, handle: FrameHandle, success: bool) {
        self.decrypting = false;
        self.decrypted = Some((handle, success));
    }

    /// Process queued frames in arrival order until the queue drains or blocks on decryption
    pub(crate) fn task<R: Radio>(&mut self, ctx: &mut Context<R>, tx: &mut TxPipeline) {
        loop {
            if let Some((handle, success)) = self.decrypted.take() {
                self.process(ctx, tx, handle, Some(success));
                continue;
            }
            if self.decrypting {
                break;
            }
            let Some(handle) = self.queue.pop_front() else {
                break;
            };
            self.process(ctx, tx, handle, None);
        }
    }

    fn process<R: Radio>(
        &mut self,
        ctx: &mut Context<R>,
        tx: &mut TxPipeline,
        handle: FrameHandle,
        decrypted: Option<bool>,
    ) {
        let frame = ctx.pool.get(&handle);
        let header = *frame.header();
        let rx = match frame.rx_meta() {
            Ok(rx) => rx,
            Err(err) => {
                warn!("Dropping frame from receive queue: {}", err);
                ctx.release(handle);
                return;
            }
        };
        let local = ctx.ib.addr;

        if header.mac.dst_pan_id != ctx.ib.pan_id && header.mac.dst_pan_id != BROADCAST_PAN_ID {
            trace!("Dropping frame for PAN {:#06x}", header.mac.dst_pan_id);
            ctx.release(handle);
            return;
        }
        if header.mac.dst_addr != local && !header.mac.is_broadcast() {
            trace!("Dropping frame for {:#06x}", header.mac.dst_addr);
            ctx.release(handle);
            return;
        }
        if header.nwk.src_addr == local {
            trace!("Dropping echo of own frame seq {}", header.nwk.seq);
            ctx.release(handle);
            return;
        }

        if header.nwk.flags.contains(NwkFlags::SECURITY_ENABLED) {
            match decrypted {
                None => {
                    if !ctx.security.has_key() {
                        debug!(
                            "Dropping secured frame from {:#06x}: no network key",
                            header.nwk.src_addr
                        );
                        ctx.release(handle);
                        return;
                    }
                    self.decrypting = true;
                    ctx.security.process(handle, Direction::Decrypt);
                    return;
                }
                Some(false) => {
                    debug!(
                        "Dropping frame from {:#06x} seq {}: authentication failed",
                        header.nwk.src_addr, header.nwk.seq
                    );
                    ctx.release(handle);
                    return;
                }
                Some(true) => {}
            }
        }

        // Transit unicast is left to the originator's retries and the destination's table
        let terminates_here = header.nwk.dst_addr == local || header.nwk.is_broadcast();
        if let Some(Seen::Duplicate { acked }) = terminates_here.then(|| {
            self.duplicates
                .check(header.nwk.src_addr, header.nwk.seq, Instant::now())
        }) {
            debug!(
                "Dropping duplicate frame from {:#06x} seq {}",
                header.nwk.src_addr, header.nwk.seq
            );
            if let Some(control) = acked {
                send_ack(ctx, tx, &header, control);
            }
            ctx.release(handle);
            return;
        }

        let routing = ctx.config.routing;
        if routing {
            ctx.routes.learn(&header, rx.lqi);
        }

        match ctx.routes.decide(&header, local) {
            RoutingDecision::Local => self.deliver(ctx, tx, handle),
            RoutingDecision::Broadcast { relay } => {
                if relay && routing {
                    relay_broadcast(ctx, tx, &handle);
                }
                self.deliver(ctx, tx, handle);
            }
            RoutingDecision::Forward { .. } | RoutingDecision::Drop(DropReason::NoRoute)
                if routing =>
            {
                route::route_frame(ctx, tx, handle);
            }
            decision => {
                trace!(
                    "Not delivering frame from {:#06x} to {:#06x}: {:?}",
                    header.nwk.src_addr,
                    header.nwk.dst_addr,
                    decision
                );
                ctx.release(handle);
            }
        }
    }

    fn deliver<R: Radio>(&mut self, ctx: &mut Context<R>, tx: &mut TxPipeline, handle: FrameHandle) {
        let frame = ctx.pool.get(&handle);
        let header = *frame.header();
        let local = ctx.ib.addr;

        if header.nwk.endpoints.dst == COMMAND_ENDPOINT {
            let command = Command::decode(frame.payload());
            ctx.release(handle);
            match command {
                Ok(command) if header.nwk.dst_addr == local => {
                    command_received(ctx, tx, header.nwk.src_addr, command)
                }
                Ok(_) => trace!("Ignoring broadcast command from {:#06x}", header.nwk.src_addr),
                Err(err) => debug!("Dropping bad command from {:#06x}: {}", header.nwk.src_addr, err),
            }
            return;
        }

        let Ok(rx) = frame.rx_meta() else {
            ctx.release(handle);
            return;
        };

        let mut options = IndOptions::empty();
        let flags = header.nwk.flags;
        options.set(IndOptions::ACK_REQUESTED, flags.contains(NwkFlags::ACK_REQUEST));
        options.set(IndOptions::SECURED, flags.contains(NwkFlags::SECURITY_ENABLED));
        options.set(IndOptions::LINK_LOCAL, flags.contains(NwkFlags::LINK_LOCAL));
        options.set(IndOptions::BROADCAST, header.nwk.is_broadcast());
        options.set(IndOptions::LOCAL, header.mac.src_addr == header.nwk.src_addr);
        options.set(
            IndOptions::BROADCAST_PAN_ID,
            header.mac.dst_pan_id == BROADCAST_PAN_ID,
        );

        let mut ind = DataIndication {
            src_addr: header.nwk.src_addr,
            dst_addr: header.nwk.dst_addr,
            src_endpoint: header.nwk.endpoints.src,
            dst_endpoint: header.nwk.endpoints.dst,
            options,
            data: frame.payload(),
            lqi: rx.lqi,
            rssi: rx.rssi,
            ack_control: 0,
        };

        let accepted = match ctx.ib.endpoint_mut(ind.dst_endpoint) {
            Some(handler) => handler(&mut ind),
            None => {
                debug!(
                    "No handler on endpoint {} for frame from {:#06x}",
                    ind.dst_endpoint, ind.src_addr
                );
                false
            }
        };
        let ack_control = ind.ack_control;
        ctx.release(handle);

        if accepted
            && flags.contains(NwkFlags::ACK_REQUEST)
            && header.nwk.dst_addr == local
        {
            self.duplicates
                .mark_acked(header.nwk.src_addr, header.nwk.seq, ack_control);
            send_ack(ctx, tx, &header, ack_control);
        }
    }
}

fn command_received<R: Radio>(
    ctx: &mut Context<R>,
    tx: &mut TxPipeline,
    src_addr: u16,
    command: Command,
) {
    match command {
        Command::Ack(ack) => {
            tx.ack_received(ctx, src_addr, &ack);
        }
        Command::RouteError(err) => {
            debug!(
                "Route error from {:#06x}: {:#06x} unreachable",
                src_addr, err.dst_addr
            );
            ctx.routes.remove(err.dst_addr);
        }
    }
}

fn send_ack<R: Radio>(ctx: &mut Context<R>, tx: &mut TxPipeline, header: &FrameHeader, control: u8) {
    let command = Command::Ack(AckCommand {
        seq: header.nwk.seq,
        control,
    });
    let handle = match ctx.pool.alloc(command.encoded_size()) {
        Ok(handle) => handle,
        Err(_) => {
            debug!("No free frame for ACK to {:#06x}", header.nwk.src_addr);
            return;
        }
    };

    let frame = ctx.pool.get_mut(&handle);
    ctx.ib.command_init(frame);
    frame.header_mut().nwk.dst_addr = header.nwk.src_addr;
    let mut buf = frame.payload_mut();
    command.encode(&mut buf);

    trace!(
        "Sending ACK for seq {} to {:#06x}",
        header.nwk.seq,
        header.nwk.src_addr
    );
    tx.submit(ctx, handle, TxOwner::Ack, TxControl::empty());
}

fn relay_broadcast<R: Radio>(ctx: &mut Context<R>, tx: &mut TxPipeline, original: &FrameHandle) {
    let frame = ctx.pool.get(original);
    let header = *frame.header();
    let len = frame.payload().len();
    let mut payload = [0u8; MAX_PAYLOAD_SIZE];
    payload[..len].copy_from_slice(frame.payload());

    let handle = match ctx.pool.alloc(len) {
        Ok(handle) => handle,
        Err(_) => {
            debug!(
                "No free frame to relay broadcast from {:#06x} seq {}",
                header.nwk.src_addr, header.nwk.seq
            );
            return;
        }
    };

    let copy = ctx.pool.get_mut(&handle);
    copy.header_mut().nwk = header.nwk;
    copy.payload_mut().copy_from_slice(&payload[..len]);

    let control = if header.mac.dst_pan_id == BROADCAST_PAN_ID {
        TxControl::BROADCAST_PAN_ID
    } else {
        TxControl::empty()
    };
    trace!(
        "Relaying broadcast from {:#06x} seq {}",
        header.nwk.src_addr,
        header.nwk.seq
    );
    tx.submit_broadcast(ctx, handle, TxOwner::Relay, control);
}
