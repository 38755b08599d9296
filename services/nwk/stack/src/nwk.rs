//! Public network layer API.

use crate::config::NwkConfig;
use crate::data_req::{DataReqGate, DataRequest};
use crate::frame::{TxControl, TxOwner};
use crate::ib::{ControlBlock, DataIndication};
use crate::pool::{FrameHandle, FramePool};
use crate::radio::{Radio, RadioEvent};
use crate::rx::RxPipeline;
use crate::security::{Direction, SecurityEngine, KEY_SIZE};
use crate::tx::TxPipeline;
use crate::NwkError;
use nwk_routing::RoutingTable;
use tracing::{debug, info, warn};

/// State shared by the pipelines of one node
#[derive(Debug)]
pub(crate) struct Context<R> {
    pub(crate) radio: R,
    pub(crate) pool: FramePool,
    pub(crate) ib: ControlBlock,
    pub(crate) routes: RoutingTable,
    pub(crate) security: SecurityEngine,
    pub(crate) config: NwkConfig,
}

impl<R> Context<R> {
    /// Return a frame to the pool
    ///
    /// A double release is an ownership bug: it panics in debug builds and is
    /// logged in release builds.
    pub(crate) fn release(&mut self, handle: FrameHandle) {
        if let Err(err) = self.pool.release(handle) {
            warn!("Frame release failed: {}", err);
            debug_assert!(false, "frame release failed: {}", err);
        }
    }
}

/// One node's network layer
///
/// Drive it by calling [`Nwk::task_handler`] from the application loop; every
/// other call returns immediately.
#[derive(Debug)]
pub struct Nwk<R: Radio> {
    ctx: Context<R>,
    tx: TxPipeline,
    rx: RxPipeline,
    data_req: DataReqGate,
}

impl<R: Radio> Nwk<R> {
    /// Initialize the network layer on top of `radio`
    pub fn new(mut radio: R, config: NwkConfig) -> Result<Self, NwkError> {
        config.validate()?;
        let pool = FramePool::new(config.buffers)?;
        let routes = RoutingTable::new(config.route_table_size, config.route_default_score);
        let rx = RxPipeline::new(config.duplicate_table_size, config.duplicate_ttl());
        radio.set_rx_state(true);

        Ok(Self {
            ctx: Context {
                radio,
                pool,
                ib: ControlBlock::new(),
                routes,
                security: SecurityEngine::new(),
                config,
            },
            tx: TxPipeline::new(),
            rx,
            data_req: DataReqGate::new(),
        })
    }

    /// Set the local short address
    pub fn set_addr(&mut self, addr: u16) {
        self.ctx.ib.addr = addr;
        self.ctx.radio.set_short_addr(addr);
    }

    /// Local short address
    pub fn addr(&self) -> u16 {
        self.ctx.ib.addr
    }

    /// Set the PAN id
    pub fn set_pan_id(&mut self, pan_id: u16) {
        self.ctx.ib.pan_id = pan_id;
        self.ctx.radio.set_pan_id(pan_id);
    }

    /// PAN id
    pub fn pan_id(&self) -> u16 {
        self.ctx.ib.pan_id
    }

    /// Install the shared network key
    pub fn set_security_key(&mut self, key: &[u8; KEY_SIZE]) {
        self.ctx.security.set_key(key);
    }

    /// Register the handler for endpoint `id` (1..=15), replacing any previous one
    pub fn open_endpoint<F>(&mut self, id: u8, handler: F) -> Result<(), NwkError>
    where
        F: FnMut(&mut DataIndication<'_>) -> bool + 'static,
    {
        self.ctx.ib.open_endpoint(id, handler)
    }

    /// Submit a payload; fails immediately when a request is already in flight
    pub fn data_request(&mut self, req: DataRequest<'_>) -> Result<(), NwkError> {
        self.data_req.request(&mut self.ctx, &mut self.tx, req)
    }

    /// Whether any pipeline or the radio has work in progress
    pub fn busy(&self) -> bool {
        self.rx.busy()
            || self.tx.busy()
            || self.data_req.busy()
            || self.ctx.security.busy()
            || self.ctx.radio.busy()
    }

    /// Put the radio to sleep
    pub fn sleep_req(&mut self) {
        debug!("Node {:#06x} going to sleep", self.ctx.ib.addr);
        self.ctx.radio.sleep();
    }

    /// Wake the radio up
    pub fn wakeup_req(&mut self) {
        debug!("Node {:#06x} waking up", self.ctx.ib.addr);
        self.ctx.radio.wakeup();
    }

    /// Run one cooperative pass over the radio and every pipeline
    pub fn task_handler(&mut self) {
        while let Some(event) = self.ctx.radio.poll() {
            match event {
                RadioEvent::DataConf(status) => self.tx.radio_conf(&mut self.ctx, status),
                RadioEvent::DataInd(frame) => self.rx.frame_received(&mut self.ctx, frame),
            }
        }

        self.rx.task(&mut self.ctx, &mut self.tx);
        self.tx.task(&mut self.ctx);
        while let Some(handle) = self.tx.pop_completed() {
            self.tx_complete(handle);
        }

        if let Some(done) = self.ctx.security.poll(&mut self.ctx.pool) {
            match done.direction {
                Direction::Encrypt => self.tx.encrypt_conf(&mut self.ctx, done.handle, done.success),
                Direction::Decrypt => self.rx.decrypt_conf(done.handle, done.success),
            }
        }
    }

    fn tx_complete(&mut self, handle: FrameHandle) {
        let frame = self.ctx.pool.get_mut(&handle);
        let dst = frame.header().nwk.dst_addr;
        let (owner, status, control) = match frame.tx_mut() {
            Ok(tx) => (tx.owner, tx.status, tx.control),
            Err(err) => {
                warn!("Completed frame without transmit state: {}", err);
                self.ctx.release(handle);
                return;
            }
        };

        if control.contains(TxControl::ROUTING) {
            self.ctx.routes.on_send_outcome(dst, status.is_success());
        }

        match owner {
            TxOwner::DataRequest => self.data_req.confirm(&mut self.ctx, handle),
            TxOwner::Route | TxOwner::RouteError | TxOwner::Ack | TxOwner::Relay => {
                if !status.is_success() {
                    info!("{:?} frame to {:#06x} failed: {:?}", owner, dst, status);
                }
                self.ctx.release(handle);
            }
        }
    }

    /// Next hop towards `dst`, if a route is known
    pub fn route_next_hop(&self, dst: u16) -> Option<u16> {
        self.ctx.routes.next_hop(dst)
    }

    /// Routing table
    pub fn routes(&self) -> &RoutingTable {
        &self.ctx.routes
    }

    /// Frame pool
    pub fn pool(&self) -> &FramePool {
        &self.ctx.pool
    }

    /// Configuration in effect
    pub fn config(&self) -> &NwkConfig {
        &self.ctx.config
    }

    /// Radio driver
    pub fn radio(&self) -> &R {
        &self.ctx.radio
    }

    /// Mutable radio driver, for channel and receiver control
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.ctx.radio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context<()> {
        let config = NwkConfig::default();
        Context {
            radio: (),
            pool: FramePool::new(config.buffers).unwrap(),
            ib: ControlBlock::new(),
            routes: RoutingTable::new(config.route_table_size, config.route_default_score),
            security: SecurityEngine::new(),
            config,
        }
    }

    #[test]
    fn test_release_returns_frame() {
        let mut ctx = context();
        let handle = ctx.pool.alloc(4).unwrap();
        ctx.release(handle);
        assert_eq!(ctx.pool.free_count(), ctx.pool.capacity());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "frame release failed")]
    fn test_double_release_panics_in_debug() {
        let mut ctx = context();
        let handle = ctx.pool.alloc(4).unwrap();
        let index = handle.index();
        ctx.release(handle);
        ctx.release(FrameHandle::from_index(index));
    }
}
