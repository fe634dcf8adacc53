//! Runtime executor: turns a [`CompiledGraph`] into running worker pools.
//!
//! # Wiring
//!
//! Every agent gets one bounded inbound queue of capacity `buffer`. For each
//! source port an agent declares, the producer's [`Emitter`] gets a sender
//! for that queue. After wiring, emitters hold the only senders and worker
//! threads hold the only receivers.
//!
//! # Lifecycle
//!
//! ```text
//! build:  validate → create processors → configure
//! start:  spawn workers → start hooks (consumers first) → timers
//! stop:   halt timers → close + drain queues (producers first) → stop hooks
//! ```

use crate::pipeline::agent::Agent;
use crate::pipeline::compiled_plan::CompiledGraph;
use crate::pipeline::error::{CompileError, ProcessorError, StartError};
use crate::pipeline::id::{AgentId, PipelineId};
use crate::pipeline::packet::Packet;
use crate::pipeline::port::PortNumber;
use crate::pipeline::processor::{
    effective_workers, Emitter, Outlet, Processor, ProcessorContext, ProcessorRegistry,
};
use crate::pipeline::scheduler::{Schedule, Timer};
use crate::pipeline::stats::{AgentStats, StatsSnapshot};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Environment shared by every agent of one pipeline.
#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    pub pipeline: PipelineId,
    pub data_location: PathBuf,
    /// Log every packet received by every agent, not just traced ones.
    pub verbose: bool,
}

impl RuntimeEnv {
    pub fn new(pipeline: PipelineId, data_location: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            data_location: data_location.into(),
            verbose: false,
        }
    }
}

/// Per-agent counters with identity, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub id: AgentId,
    pub kind: String,
    pub label: String,
    pub workers: usize,
    pub stats: StatsSnapshot,
}

/// Live state of one agent. Owned exclusively by the running graph.
struct AgentSlot {
    agent: Agent,
    processor: Arc<dyn Processor>,
    inbox: Option<Receiver<Packet>>,
    /// Dropped to tell the workers no further work is coming.
    close_tx: Option<Sender<()>>,
    close_rx: Receiver<()>,
    schedule: Option<Schedule>,
    stats: Arc<AgentStats>,
    workers: Vec<JoinHandle<()>>,
    timer: Option<Timer>,
    started: bool,
}

/// A compiled graph with processors attached.
pub struct RunningGraph {
    pipeline: PipelineId,
    slots: Vec<AgentSlot>,
    /// Slot indices, producers first.
    order: Vec<usize>,
    verbose: bool,
    stopped: bool,
}

impl RunningGraph {
    /// Create and configure a processor for every agent and wire the queues.
    /// No thread is started yet.
    pub fn build(
        graph: &CompiledGraph,
        registry: &ProcessorRegistry,
        env: &RuntimeEnv,
    ) -> Result<Self, StartError> {
        graph.validate()?;
        let order = graph.topological_order()?;

        let mut senders: HashMap<AgentId, Sender<Packet>> = HashMap::new();
        let mut inboxes = Vec::with_capacity(graph.len());
        for agent in &graph.agents {
            let (tx, rx) = bounded(agent.buffer);
            senders.insert(agent.id, tx);
            inboxes.push(rx);
        }

        let mut routes: HashMap<AgentId, BTreeMap<PortNumber, Vec<Outlet>>> = HashMap::new();
        for agent in &graph.agents {
            let Some(tx) = senders.get(&agent.id) else {
                continue;
            };
            for source in &agent.sources {
                routes
                    .entry(source.agent)
                    .or_default()
                    .entry(source.number)
                    .or_default()
                    .push(Outlet {
                        target: agent.id,
                        tx: tx.clone(),
                    });
            }
        }
        drop(senders);

        let mut slots = Vec::with_capacity(graph.len());
        for (agent, inbox) in graph.agents.iter().zip(inboxes) {
            let mut processor = instantiate(agent, registry)?;
            let schedule = parse_schedule(agent)?;

            let stats = Arc::new(AgentStats::new());
            let emitter = Emitter::new(
                agent.id,
                routes.remove(&agent.id).unwrap_or_default(),
                stats.clone(),
            );
            let ctx = ProcessorContext {
                agent: agent.id,
                pipeline: env.pipeline,
                label: agent.label.clone(),
                wd: agent.wd.clone(),
                data_location: env.data_location.clone(),
                trace: agent.trace || env.verbose,
                emitter,
            };
            processor
                .configure(ctx, &agent.options)
                .map_err(|source| StartError::Configure {
                    agent: agent.id,
                    source,
                })?;

            let (close_tx, close_rx) = bounded(0);
            slots.push(AgentSlot {
                agent: agent.clone(),
                processor: Arc::from(processor),
                inbox: Some(inbox),
                close_tx: Some(close_tx),
                close_rx,
                schedule,
                stats,
                workers: Vec::new(),
                timer: None,
                started: false,
            });
        }

        Ok(Self {
            pipeline: env.pipeline,
            slots,
            order,
            verbose: env.verbose,
            stopped: false,
        })
    }

    /// Spawn workers, run start hooks and arm timers.
    ///
    /// On failure everything already running is torn down before the error
    /// is returned.
    pub fn start(&mut self) -> Result<(), StartError> {
        let order = self.order.clone();

        for &idx in &order {
            if let Err(e) = self.spawn_workers(idx) {
                self.stop();
                return Err(e);
            }
        }

        // consumers are ready before their producers start emitting
        for &idx in order.iter().rev() {
            let slot = &mut self.slots[idx];
            match slot.processor.start(Packet::empty()) {
                Ok(()) => slot.started = true,
                Err(source) => {
                    let agent = slot.agent.id;
                    tracing::error!(
                        "Pipeline {}: agent {} '{}' failed to start: {}",
                        self.pipeline,
                        agent,
                        slot.agent.label,
                        source
                    );
                    self.stop();
                    return Err(StartError::Startup { agent, source });
                }
            }
        }

        for &idx in &order {
            if let Err(e) = self.spawn_timer(idx) {
                self.stop();
                return Err(e);
            }
        }

        tracing::info!(
            "Pipeline {} started: {} agents",
            self.pipeline,
            self.slots.len()
        );
        Ok(())
    }

    fn spawn_workers(&mut self, idx: usize) -> Result<(), StartError> {
        let verbose = self.verbose;
        let slot = &mut self.slots[idx];
        let Some(inbox) = slot.inbox.take() else {
            return Ok(());
        };
        // nothing can ever arrive on the queue of an agent without sources
        if slot.agent.sources.is_empty() {
            return Ok(());
        }

        let count = effective_workers(slot.agent.pool_size, slot.processor.max_concurrency());
        for i in 0..count {
            let worker = Worker {
                label: slot.agent.label.clone(),
                processor: slot.processor.clone(),
                inbox: inbox.clone(),
                close: slot.close_rx.clone(),
                stats: slot.stats.clone(),
                trace: slot.agent.trace || verbose,
            };
            let handle = thread::Builder::new()
                .name(format!("{}-{}", slot.agent.label, i))
                .spawn(move || worker.run())
                .map_err(|source| StartError::Spawn {
                    agent: slot.agent.id,
                    source,
                })?;
            slot.workers.push(handle);
        }

        tracing::debug!(
            "Agent {} '{}': {} worker(s), buffer {}",
            slot.agent.id,
            slot.agent.label,
            count,
            slot.agent.buffer
        );
        Ok(())
    }

    fn spawn_timer(&mut self, idx: usize) -> Result<(), StartError> {
        let slot = &mut self.slots[idx];
        let Some(schedule) = slot.schedule.clone() else {
            return Ok(());
        };

        let processor = slot.processor.clone();
        let stats = slot.stats.clone();
        let label = slot.agent.label.clone();
        let name = format!("{label}-timer");
        let timer = Timer::spawn(name, schedule, move || {
            stats.record_tick();
            if let Err(e) = processor.tick(Packet::empty()) {
                stats.record_failed();
                tracing::warn!("{}: tick failed: {}", label, e);
            }
        })
        .map_err(|source| StartError::Spawn {
            agent: slot.agent.id,
            source,
        })?;

        slot.timer = Some(timer);
        Ok(())
    }

    /// Halt timers, drain every queue producers first, then run the stop
    /// hooks of every started agent. Returns the hooks that failed.
    pub fn stop(&mut self) -> Vec<(AgentId, ProcessorError)> {
        if self.stopped {
            return Vec::new();
        }
        self.stopped = true;

        for slot in &mut self.slots {
            if let Some(mut timer) = slot.timer.take() {
                timer.halt();
            }
        }

        for &idx in &self.order {
            let slot = &mut self.slots[idx];
            slot.close_tx.take();
            slot.inbox.take();
            for handle in slot.workers.drain(..) {
                if handle.join().is_err() {
                    tracing::error!("Agent {} '{}': worker panicked", slot.agent.id, slot.agent.label);
                }
            }
        }

        let mut failures = Vec::new();
        for &idx in &self.order {
            let slot = &mut self.slots[idx];
            if !slot.started {
                continue;
            }
            slot.started = false;
            if let Err(e) = slot.processor.stop(Packet::empty()) {
                tracing::error!(
                    "Pipeline {}: agent {} '{}' failed to stop: {}",
                    self.pipeline,
                    slot.agent.id,
                    slot.agent.label,
                    e
                );
                failures.push((slot.agent.id, e));
            }
        }

        tracing::info!("Pipeline {} stopped", self.pipeline);
        failures
    }

    pub fn reports(&self) -> Vec<AgentReport> {
        self.slots
            .iter()
            .map(|slot| AgentReport {
                id: slot.agent.id,
                kind: slot.agent.kind.clone(),
                label: slot.agent.label.clone(),
                workers: slot.workers.len(),
                stats: slot.stats.snapshot(),
            })
            .collect()
    }

    pub fn stats(&self, agent: AgentId) -> Option<StatsSnapshot> {
        self.slots
            .iter()
            .find(|s| s.agent.id == agent)
            .map(|s| s.stats.snapshot())
    }
}

impl Drop for RunningGraph {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Create and configure every processor without wiring or starting anything.
///
/// Reports unknown kinds, bad schedules and rejected options as compile
/// errors so configurations can be checked before they run.
pub fn check(graph: &CompiledGraph, registry: &ProcessorRegistry) -> Result<(), CompileError> {
    graph.validate()?;
    for agent in &graph.agents {
        let mut processor = instantiate(agent, registry).map_err(|e| CompileError::Invalid(e.to_string()))?;
        parse_schedule(agent).map_err(|e| CompileError::Invalid(e.to_string()))?;
        processor
            .configure(
                ProcessorContext::detached(agent.id, agent.label.clone()),
                &agent.options,
            )
            .map_err(|e| CompileError::Options {
                agent: agent.id,
                kind: agent.kind.clone(),
                message: e.to_string(),
            })?;
    }
    Ok(())
}

fn instantiate(agent: &Agent, registry: &ProcessorRegistry) -> Result<Box<dyn Processor>, StartError> {
    registry
        .create(&agent.kind)
        .ok_or_else(|| StartError::UnknownProcessor {
            agent: agent.id,
            kind: agent.kind.clone(),
        })
}

fn parse_schedule(agent: &Agent) -> Result<Option<Schedule>, StartError> {
    match agent.schedule.as_deref() {
        Some(expression) if agent.is_scheduled() => Schedule::parse(expression)
            .map(Some)
            .map_err(|message| StartError::Schedule {
                agent: agent.id,
                message,
            }),
        _ => Ok(None),
    }
}

/// One worker of an agent's pool.
struct Worker {
    label: String,
    processor: Arc<dyn Processor>,
    inbox: Receiver<Packet>,
    close: Receiver<()>,
    stats: Arc<AgentStats>,
    trace: bool,
}

impl Worker {
    fn run(self) {
        loop {
            select! {
                recv(self.inbox) -> msg => match msg {
                    Ok(packet) => self.handle(packet),
                    Err(_) => break,
                },
                recv(self.close) -> _ => {
                    // finish what was queued when the close arrived
                    let pending = self.inbox.len();
                    for _ in 0..pending {
                        match self.inbox.try_recv() {
                            Ok(packet) => self.handle(packet),
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }
        tracing::trace!("{}: worker exiting", self.label);
    }

    fn handle(&self, packet: Packet) {
        self.stats.record_received();
        if self.trace {
            match packet.to_json() {
                Ok(json) => tracing::info!("[{}] {}", self.label, json),
                Err(e) => tracing::info!("[{}] unprintable packet: {}", self.label, e),
            }
        }
        if let Err(e) = self.processor.receive(packet) {
            self.stats.record_failed();
            tracing::warn!("{}: failed to process packet: {}", self.label, e);
        }
    }
}
