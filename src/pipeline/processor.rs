//! Processor abstraction: the behaviour behind an agent.
//!
//! The runtime builds one processor per agent through a factory looked up by
//! the agent's `kind`, configures it once, then shares it between every
//! worker of the agent. Hooks therefore take `&self`; processors that keep
//! mutable state guard it themselves.
//!
//! Processors talk to the rest of the graph only through their
//! [`Emitter`], which delivers packets to the queues subscribed to each of
//! the agent's output ports.

use crate::pipeline::error::ProcessorError;
use crate::pipeline::id::{AgentId, PipelineId};
use crate::pipeline::options::Options;
use crate::pipeline::packet::Packet;
use crate::pipeline::port::PortNumber;
use crate::pipeline::stats::AgentStats;
use crossbeam_channel::Sender;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// `max_concurrency` value meaning "no limit beyond the agent's pool size".
pub const UNBOUNDED_CONCURRENCY: usize = usize::MAX;

/// Behaviour of one agent.
///
/// `configure` runs once before start. `start` runs before any traffic
/// reaches the agent, `receive` once per inbound packet, `tick` on each
/// timer firing and `stop` after the agent's workers have drained.
pub trait Processor: Send + Sync {
    fn configure(&mut self, ctx: ProcessorContext, options: &Options) -> Result<(), ProcessorError>;

    fn start(&self, _packet: Packet) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn receive(&self, packet: Packet) -> Result<(), ProcessorError>;

    fn tick(&self, _packet: Packet) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn stop(&self, _packet: Packet) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Upper bound on concurrent workers. `0` means a single worker.
    fn max_concurrency(&self) -> usize {
        UNBOUNDED_CONCURRENCY
    }
}

/// Number of workers actually spawned for an agent.
pub fn effective_workers(pool_size: usize, max_concurrency: usize) -> usize {
    let ceiling = max_concurrency.max(1);
    pool_size.clamp(1, ceiling)
}

/// Everything a processor learns about its place in the running graph.
#[derive(Clone)]
pub struct ProcessorContext {
    pub agent: AgentId,
    pub pipeline: PipelineId,
    pub label: String,
    /// Directory relative paths in the agent's options resolve against.
    pub wd: PathBuf,
    /// Engine-wide directory for processor state.
    pub data_location: PathBuf,
    pub trace: bool,
    pub emitter: Emitter,
}

impl ProcessorContext {
    /// Context whose emitter has no subscribers; used when configuring a
    /// processor outside a running graph.
    pub fn detached(agent: AgentId, label: impl Into<String>) -> Self {
        Self {
            agent,
            pipeline: PipelineId::new(),
            label: label.into(),
            wd: PathBuf::from("."),
            data_location: std::env::temp_dir(),
            trace: false,
            emitter: Emitter::detached(agent),
        }
    }
}

/// A subscriber queue.
#[derive(Clone)]
pub(crate) struct Outlet {
    pub target: AgentId,
    pub tx: Sender<Packet>,
}

/// Delivers packets from one agent's ports to subscriber queues.
///
/// Sends block while a subscriber queue is full, which is how a slow
/// consumer throttles its producers.
#[derive(Clone)]
pub struct Emitter {
    agent: AgentId,
    routes: Arc<BTreeMap<PortNumber, Vec<Outlet>>>,
    stats: Arc<AgentStats>,
}

impl Emitter {
    pub(crate) fn new(
        agent: AgentId,
        routes: BTreeMap<PortNumber, Vec<Outlet>>,
        stats: Arc<AgentStats>,
    ) -> Self {
        Self {
            agent,
            routes: Arc::new(routes),
            stats,
        }
    }

    pub fn detached(agent: AgentId) -> Self {
        Self::new(agent, BTreeMap::new(), Arc::new(AgentStats::new()))
    }

    /// Number of queues subscribed to `port`.
    pub fn subscribers(&self, port: PortNumber) -> usize {
        self.routes.get(&port).map_or(0, Vec::len)
    }

    /// Send `packet` to every subscriber of `port`, duplicating it for all
    /// but the last. Returns the number of deliveries.
    pub fn send(&self, packet: Packet, port: PortNumber) -> usize {
        let Some(outlets) = self.routes.get(&port) else {
            tracing::trace!("Agent {} port {} has no subscribers", self.agent, port);
            return 0;
        };

        let mut delivered = 0;
        if let Some((last, rest)) = outlets.split_last() {
            for outlet in rest {
                delivered += self.deliver(outlet, packet.clone(), port);
            }
            delivered += self.deliver(last, packet, port);
        }
        self.stats.record_emitted(delivered as u64);
        delivered
    }

    fn deliver(&self, outlet: &Outlet, packet: Packet, port: PortNumber) -> usize {
        match outlet.tx.send(packet) {
            Ok(()) => 1,
            Err(_) => {
                self.stats.record_dropped();
                tracing::debug!(
                    "Agent {} port {}: agent {} no longer accepts packets, dropped",
                    self.agent,
                    port,
                    outlet.target
                );
                0
            }
        }
    }
}

/// Builds a fresh processor instance.
pub type ProcessorFactory = Arc<dyn Fn() -> Box<dyn Processor> + Send + Sync>;

/// Processor factories by agent kind.
///
/// Register factories before compiling and starting pipelines; lookups are
/// safe from any thread.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    factories: Arc<RwLock<HashMap<String, ProcessorFactory>>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Processor> + Send + Sync + 'static,
    {
        let kind = kind.into();
        tracing::debug!("Registered processor '{}'", kind);
        if let Ok(mut factories) = self.factories.write() {
            factories.insert(kind, Arc::new(factory));
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories
            .read()
            .map(|f| f.contains_key(kind))
            .unwrap_or(false)
    }

    pub fn create(&self, kind: &str) -> Option<Box<dyn Processor>> {
        let factory = self.factories.read().ok()?.get(kind).cloned()?;
        Some(factory())
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .factories
            .read()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default();
        kinds.sort();
        kinds
    }
}
