//! Simulator configuration.
//!
//! The node layout, links and traffic flows come from a YAML file; a few
//! run-level settings can be overridden from the environment.

use anyhow::{bail, Result};
use nwk_stack::{NwkConfig, KEY_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// One simulated node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Short address
    pub addr: u16,
    /// Network layer settings for this node
    #[serde(default)]
    pub nwk: NwkConfig,
    /// Start with the radio asleep
    #[serde(default)]
    pub sleeping: bool,
}

/// Radio reachability between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub from: u16,
    pub to: u16,
    #[serde(default = "default_lqi")]
    pub lqi: u8,
    /// Also add the reverse direction
    #[serde(default = "default_true")]
    pub bidirectional: bool,
}

/// Periodic application traffic from one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub src: u16,
    pub dst: u16,
    #[serde(default = "default_endpoint")]
    pub endpoint: u8,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub ack: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub link_local: bool,
    #[serde(default = "default_payload")]
    pub payload: String,
}

impl FlowConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Whole simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of ticks to run
    pub ticks: u64,
    /// Tick period in milliseconds
    pub tick_ms: u64,
    pub channel: u8,
    pub pan_id: u16,
    /// Shared network key, exactly 16 characters
    pub key: Option<String>,
    pub nodes: Vec<NodeConfig>,
    pub links: Vec<LinkConfig>,
    pub flows: Vec<FlowConfig>,
}

fn default_lqi() -> u8 {
    200
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> u8 {
    1
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_payload() -> String {
    "ping".to_string()
}

impl Default for SimConfig {
    /// Three nodes in a line, the far end reporting to the near end
    fn default() -> Self {
        let nodes = (1..=3)
            .map(|addr| NodeConfig {
                addr,
                nwk: NwkConfig::default(),
                sleeping: false,
            })
            .collect();
        let links = vec![
            LinkConfig {
                from: 1,
                to: 2,
                lqi: 220,
                bidirectional: true,
            },
            LinkConfig {
                from: 2,
                to: 3,
                lqi: 180,
                bidirectional: true,
            },
        ];
        let flows = vec![
            FlowConfig {
                src: 3,
                dst: 0xffff,
                endpoint: 1,
                interval_ms: 5000,
                ack: false,
                secure: false,
                link_local: false,
                payload: "hello".to_string(),
            },
            FlowConfig {
                src: 3,
                dst: 1,
                endpoint: 1,
                interval_ms: 1000,
                ack: true,
                secure: false,
                link_local: false,
                payload: "report".to_string(),
            },
        ];

        Self {
            ticks: 2000,
            tick_ms: 5,
            channel: 15,
            pan_id: 0x1234,
            key: None,
            nodes,
            links,
            flows,
        }
    }
}

impl SimConfig {
    /// Load from `config_path`, falling back to the built-in topology, then apply environment overrides
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<SimConfig>(&content) {
                Ok(config) => {
                    info!("Loaded simulation from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse {:?} ({}), using the built-in line", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using the built-in line", path);
                Self::default()
            }
        };

        config.apply_environment_overrides();
        config.validate()?;

        info!(
            "Simulation: {} nodes, {} links, {} flows, {} ticks of {}ms",
            config.nodes.len(),
            config.links.len(),
            config.flows.len(),
            config.ticks,
            config.tick_ms
        );
        Ok(config)
    }

    fn apply_environment_overrides(&mut self) {
        if let Ok(value) = std::env::var("NWK_SIM_TICKS") {
            match value.parse::<u64>() {
                Ok(ticks) => {
                    self.ticks = ticks;
                    info!("Tick count overridden by environment: {}", ticks);
                }
                Err(_) => warn!("Ignoring NWK_SIM_TICKS={:?}", value),
            }
        }

        if let Ok(value) = std::env::var("NWK_SIM_TICK_MS") {
            match value.parse::<u64>() {
                Ok(tick_ms) => {
                    self.tick_ms = tick_ms;
                    info!("Tick period overridden by environment: {}ms", tick_ms);
                }
                Err(_) => warn!("Ignoring NWK_SIM_TICK_MS={:?}", value),
            }
        }

        if let Ok(key) = std::env::var("NWK_SIM_KEY") {
            self.key = Some(key);
            info!("Network key overridden by environment");
        }
    }

    /// Reject layouts the simulator cannot build
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            bail!("at least one node is required");
        }
        if self.tick_ms == 0 {
            bail!("tick_ms must be positive");
        }

        let mut addrs = HashSet::new();
        for node in &self.nodes {
            if node.addr == nwk_wire::BROADCAST_ADDR {
                bail!("node address {:#06x} is the broadcast address", node.addr);
            }
            if !addrs.insert(node.addr) {
                bail!("duplicate node address {:#06x}", node.addr);
            }
            node.nwk.validate()?;
        }

        for link in &self.links {
            for addr in [link.from, link.to] {
                if !addrs.contains(&addr) {
                    bail!("link {:#06x} -> {:#06x} names unknown node {:#06x}", link.from, link.to, addr);
                }
            }
        }

        for flow in &self.flows {
            if !addrs.contains(&flow.src) {
                bail!("flow source {:#06x} is not a node", flow.src);
            }
            if flow.endpoint == 0 || flow.endpoint as usize >= nwk_wire::MAX_ENDPOINTS {
                bail!("flow from {:#06x} uses endpoint {}, expected 1..=15", flow.src, flow.endpoint);
            }
            if flow.interval_ms == 0 {
                bail!("flow from {:#06x} has a zero interval", flow.src);
            }
            if flow.secure && self.key.is_none() {
                bail!("flow from {:#06x} is secured but no key is configured", flow.src);
            }
        }

        self.key_bytes()?;
        Ok(())
    }

    /// The network key as raw bytes
    pub fn key_bytes(&self) -> Result<Option<[u8; KEY_SIZE]>> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        match <[u8; KEY_SIZE]>::try_from(key.as_bytes()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(_) => bail!("network key must be {} bytes, got {}", KEY_SIZE, key.len()),
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}
