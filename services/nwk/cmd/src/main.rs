//! Multi-node network layer simulator.
//!
//! Builds the configured nodes on a shared in-memory radio medium and drives
//! them all from one cooperative loop, generating periodic application
//! traffic and logging deliveries and confirms.

use anyhow::Context as _;
use clap::Parser;
use nwk_stack::sim::{SimMedium, SimRadio};
use nwk_stack::{DataReqOptions, DataRequest, Nwk, NwkError, Radio, TxStatus};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::{FlowConfig, SimConfig};
use logging::NwkLogFormatter;

/// Simulated low-power wireless network
#[derive(Parser, Debug)]
#[command(name = "nwk-sim", version, about = "Run network layer nodes over a simulated radio medium")]
struct Args {
    /// Simulation description (YAML)
    #[arg(long, default_value = "nwk-sim.yaml")]
    config: PathBuf,

    /// Number of ticks to run, overriding the file
    #[arg(long)]
    ticks: Option<u64>,

    /// Tick period, e.g. 5ms, overriding the file
    #[arg(long)]
    tick: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

struct SimNode {
    addr: u16,
    label: String,
    nwk: Nwk<SimRadio>,
    received: Rc<RefCell<u64>>,
}

#[derive(Debug, Default)]
struct FlowStats {
    sent: u64,
    delivered: u64,
    failed: u64,
}

struct Flow {
    config: FlowConfig,
    node: usize,
    due: Instant,
    stats: Rc<RefCell<FlowStats>>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "warn,nwk_sim={level},nwk_stack={level},nwk_routing={level},nwk_wire={level}",
            level = args.log_level
        ))
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .event_format(NwkLogFormatter::new("nwk-sim"))
        .init();

    info!("Starting nwk-sim v{}", env!("CARGO_PKG_VERSION"));

    let mut config = SimConfig::load_from_file(&args.config)?;
    if let Some(ticks) = args.ticks {
        config.ticks = ticks;
    }
    if let Some(tick) = args.tick {
        config.tick_ms = Duration::from(tick).as_millis().max(1) as u64;
    }

    let medium = SimMedium::new();
    let mut nodes = build_nodes(&medium, &config)?;
    let index: HashMap<u16, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.addr, i))
        .collect();

    for link in &config.links {
        let from = nodes[index[&link.from]].nwk.radio().id();
        let to = nodes[index[&link.to]].nwk.radio().id();
        if link.bidirectional {
            medium.connect(from, to, link.lqi);
        } else {
            medium.link(from, to, link.lqi);
        }
    }

    let start = Instant::now();
    let mut flows: Vec<Flow> = config
        .flows
        .iter()
        .map(|flow| Flow {
            config: flow.clone(),
            node: index[&flow.src],
            due: start + flow.interval(),
            stats: Rc::new(RefCell::new(FlowStats::default())),
        })
        .collect();

    let mut interval = tokio::time::interval(config.tick());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks = 0;
    while ticks < config.ticks {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted after {} ticks", ticks);
                break;
            }
        }

        let now = Instant::now();
        for (seq, flow) in flows.iter_mut().enumerate() {
            if now >= flow.due {
                start_flow(&mut nodes[flow.node], flow, seq);
            }
        }

        for node in nodes.iter_mut() {
            node.nwk.task_handler();
        }
        ticks += 1;
    }

    report(&nodes, &flows);
    Ok(())
}

fn build_nodes(medium: &SimMedium, config: &SimConfig) -> anyhow::Result<Vec<SimNode>> {
    let key = config.key_bytes()?;
    let endpoints: BTreeSet<u8> = config.flows.iter().map(|flow| flow.endpoint).collect();

    let mut nodes = Vec::with_capacity(config.nodes.len());
    for node_config in &config.nodes {
        let mut radio = medium.add_radio();
        radio.set_channel(config.channel);

        let mut nwk = Nwk::new(radio, node_config.nwk.clone())
            .with_context(|| format!("node {:#06x}", node_config.addr))?;
        nwk.set_addr(node_config.addr);
        nwk.set_pan_id(config.pan_id);
        if let Some(key) = &key {
            nwk.set_security_key(key);
        }

        let label = format!("node-{:#06x}", node_config.addr);
        let received = Rc::new(RefCell::new(0));
        for &endpoint in &endpoints {
            let label = label.clone();
            let received = received.clone();
            nwk.open_endpoint(endpoint, move |ind| {
                *received.borrow_mut() += 1;
                crate::component_info!(
                    label.as_str(),
                    "Endpoint {} got {:?} from {:#06x} (lqi {}, {:?})",
                    ind.dst_endpoint,
                    String::from_utf8_lossy(ind.data),
                    ind.src_addr,
                    ind.lqi,
                    ind.options
                );
                true
            })?;
        }

        if node_config.sleeping {
            nwk.sleep_req();
        }

        crate::component_debug!(label.as_str(), "Node up on channel {}", config.channel);
        nodes.push(SimNode {
            addr: node_config.addr,
            label,
            nwk,
            received,
        });
    }
    Ok(nodes)
}

fn start_flow(node: &mut SimNode, flow: &mut Flow, seq: usize) {
    let config = &flow.config;
    let payload = format!("{} #{}", config.payload, flow.stats.borrow().sent + 1);

    let mut options = DataReqOptions::empty();
    options.set(DataReqOptions::ACK_REQUEST, config.ack);
    options.set(DataReqOptions::ENABLE_SECURITY, config.secure);
    options.set(DataReqOptions::LINK_LOCAL, config.link_local);

    let stats = flow.stats.clone();
    let label = node.label.clone();
    let dst = config.dst;
    let req = DataRequest::new(dst, config.endpoint, config.endpoint, payload.as_bytes())
        .with_options(options)
        .on_confirm(move |conf| {
            let mut stats = stats.borrow_mut();
            if conf.status == TxStatus::Success {
                stats.delivered += 1;
                crate::component_debug!(label.as_str(), "Flow {} to {:#06x} confirmed", seq, dst);
            } else {
                stats.failed += 1;
                crate::component_warn!(
                    label.as_str(),
                    "Flow {} to {:#06x} failed: {:?}",
                    seq,
                    dst,
                    conf.status
                );
            }
        });

    match node.nwk.data_request(req) {
        Ok(()) => {
            flow.stats.borrow_mut().sent += 1;
            flow.due += config.interval();
        }
        Err(NwkError::Busy) | Err(NwkError::PoolExhausted) => {
            debug!("Flow {} on {} deferred, node busy", seq, node.label);
        }
        Err(e) => {
            warn!("Flow {} on {} rejected: {}", seq, node.label, e);
            flow.due += config.interval();
        }
    }
}

fn report(nodes: &[SimNode], flows: &[Flow]) {
    for node in nodes {
        let label = node.label.as_str();
        let stats = node.nwk.routes().stats();
        crate::component_info!(
            label,
            "Received {} frames; routes learned {}, evicted {}, forwarded {}, no route {}",
            node.received.borrow(),
            stats.learned,
            stats.evicted,
            stats.forwarded,
            stats.no_route
        );
        for record in node.nwk.routes().routes() {
            crate::component_info!(
                label,
                "  {:#06x} via {:#06x} score {} lqi {}",
                record.dst,
                record.next_hop,
                record.score,
                record.lqi
            );
        }
        if let Some(parent) = node.nwk.routes().default_next_hop() {
            crate::component_info!(label, "  default next hop {:#06x}", parent);
        }
    }

    for (seq, flow) in flows.iter().enumerate() {
        let stats = flow.stats.borrow();
        info!(
            "Flow {} {:#06x} -> {:#06x}: sent {}, confirmed {}, failed {}",
            seq, flow.config.src, flow.config.dst, stats.sent, stats.delivered, stats.failed
        );
    }
}
