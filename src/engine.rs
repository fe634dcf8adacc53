//! Process-scoped engine.
//!
//! The [`Engine`] owns the processor registry every pipeline resolves its
//! agent types against, and the registry of running pipelines keyed by
//! [`PipelineId`]. Pipelines are compiled, started and stopped
//! independently; the registry is the only state they share.

use crate::config::{ensure_dir, EngineConfig};
use crate::error::{EngineError, Result};
use crate::pipeline::compiled_plan::CompiledGraph;
use crate::pipeline::compiler::GraphCompiler;
use crate::pipeline::error::{CompileResult, ProcessorError, StartError, StopError};
use crate::pipeline::executor::{self, AgentReport, RunningGraph, RuntimeEnv};
use crate::pipeline::id::{AgentId, PipelineId};
use crate::pipeline::loader::{ConfigLoader, FileLoader};
use crate::pipeline::nodes;
use crate::pipeline::processor::{Processor, ProcessorRegistry};
use crate::pipeline::tree::ConfigTree;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Compiled,
    /// Start hooks are running.
    Started,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Compiled => "compiled",
            PipelineState::Started => "started",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Identity of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineInfo {
    pub id: PipelineId,
    pub name: String,
    pub location: Option<String>,
}

impl PipelineInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PipelineId::new(),
            name: name.into(),
            location: None,
        }
    }

    /// Named after the file stem of `location`.
    pub fn from_location(location: impl Into<String>) -> Self {
        let location = location.into();
        let name = Path::new(&location)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| location.clone());
        Self {
            id: PipelineId::new(),
            name,
            location: Some(location),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One compiled graph and, while it runs, its live runtime.
pub struct Pipeline {
    info: PipelineInfo,
    graph: CompiledGraph,
    state: Mutex<PipelineState>,
    runtime: Mutex<Option<RunningGraph>>,
}

impl Pipeline {
    pub fn new(info: PipelineInfo, graph: CompiledGraph) -> Self {
        Self {
            info,
            graph,
            state: Mutex::new(PipelineState::Compiled),
            runtime: Mutex::new(None),
        }
    }

    pub fn id(&self) -> PipelineId {
        self.info.id
    }

    pub fn info(&self) -> &PipelineInfo {
        &self.info
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    fn set_state(&self, state: PipelineState) {
        *lock(&self.state) = state;
    }

    /// Per-agent counters; empty unless running.
    pub fn reports(&self) -> Vec<AgentReport> {
        lock(&self.runtime)
            .as_ref()
            .map(|r| r.reports())
            .unwrap_or_default()
    }

    fn start(&self, registry: &ProcessorRegistry, env: &RuntimeEnv) -> std::result::Result<(), StartError> {
        let mut runtime = RunningGraph::build(&self.graph, registry, env)?;
        self.set_state(PipelineState::Started);
        if let Err(e) = runtime.start() {
            self.set_state(PipelineState::Stopped);
            return Err(e);
        }
        *lock(&self.runtime) = Some(runtime);
        self.set_state(PipelineState::Running);
        Ok(())
    }

    fn stop(&self) -> Vec<(AgentId, ProcessorError)> {
        let runtime = lock(&self.runtime).take();
        let Some(mut runtime) = runtime else {
            return Vec::new();
        };
        self.set_state(PipelineState::Stopping);
        let failures = runtime.stop();
        self.set_state(PipelineState::Stopped);
        failures
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("info", &self.info)
            .field("agents", &self.graph.len())
            .field("state", &self.state())
            .finish()
    }
}

/// Processor registry plus the registry of running pipelines.
pub struct Engine {
    config: EngineConfig,
    processors: ProcessorRegistry,
    loader: Arc<dyn ConfigLoader>,
    pipelines: DashMap<PipelineId, Arc<Pipeline>>,
}

impl Engine {
    /// Engine with the built-in plumbing processors registered and imports
    /// read from disk.
    pub fn new(config: EngineConfig) -> Self {
        let processors = ProcessorRegistry::new();
        nodes::register_builtins(&processors);
        Self {
            config,
            processors,
            loader: Arc::new(FileLoader),
            pipelines: DashMap::new(),
        }
    }

    pub fn with_loader(mut self, loader: impl ConfigLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    /// Make `kind` available to every pipeline started afterwards.
    pub fn register_processor<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Processor> + Send + Sync + 'static,
    {
        self.processors.register(kind, factory);
    }

    fn compiler(&self) -> GraphCompiler<'_> {
        GraphCompiler::new(self.loader.as_ref()).with_defaults(self.config.defaults)
    }

    pub fn compile(&self, tree: &ConfigTree, wd: &Path) -> CompileResult<CompiledGraph> {
        self.compiler().compile(tree, wd)
    }

    pub fn compile_location(&self, location: &str, wd: &Path) -> CompileResult<CompiledGraph> {
        self.compiler().compile_location(location, wd)
    }

    /// Resolve every agent type and configure every processor without
    /// starting anything.
    pub fn verify(&self, graph: &CompiledGraph) -> CompileResult<()> {
        executor::check(graph, &self.processors)
    }

    /// Create the data location if needed.
    pub fn prepare_data_location(&self) -> Result<PathBuf> {
        let location = self.config.data_location();
        if location.exists() && !location.is_dir() {
            return Err(EngineError::Config(format!(
                "Data location {:?} is not a directory",
                location
            )));
        }
        ensure_dir(location)
    }

    /// Start `graph` and register it under `info.id`.
    ///
    /// A pipeline whose start hooks fail is torn down and never registered.
    pub fn start_pipeline(
        &self,
        info: PipelineInfo,
        graph: CompiledGraph,
    ) -> std::result::Result<PipelineId, StartError> {
        let id = info.id;
        if self.pipelines.contains_key(&id) {
            return Err(StartError::AlreadyRunning(id));
        }

        let env = RuntimeEnv {
            pipeline: id,
            data_location: self.config.data_location(),
            verbose: self.config.log.verbose,
        };
        let name = info.name.clone();
        let pipeline = Arc::new(Pipeline::new(info, graph));
        pipeline.start(&self.processors, &env)?;

        let registered = match self.pipelines.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(pipeline.clone());
                true
            }
        };
        if !registered {
            pipeline.stop();
            return Err(StartError::AlreadyRunning(id));
        }

        tracing::info!("Pipeline '{}' ({}) running", name, id);
        Ok(id)
    }

    /// Compile the configuration at `location` and start it.
    pub fn start_location(&self, location: &str, wd: &Path) -> Result<PipelineId> {
        self.prepare_data_location()?;
        let graph = self.compile_location(location, wd)?;
        let id = self.start_pipeline(PipelineInfo::from_location(location), graph)?;
        Ok(id)
    }

    /// Stop the pipeline and remove it from the registry.
    pub fn stop_pipeline(&self, id: PipelineId) -> std::result::Result<(), StopError> {
        let (_, pipeline) = self.pipelines.remove(&id).ok_or(StopError::NotFound(id))?;
        let failures = pipeline.stop();
        if failures.is_empty() {
            tracing::info!("Pipeline '{}' ({}) stopped", pipeline.info().name, id);
            Ok(())
        } else {
            tracing::warn!(
                "Pipeline '{}' ({}) stopped, {} shutdown hook(s) failed",
                pipeline.info().name,
                id,
                failures.len()
            );
            Err(StopError::Hooks { id, failures })
        }
    }

    pub fn pipeline(&self, id: PipelineId) -> Option<Arc<Pipeline>> {
        self.pipelines.get(&id).map(|p| p.value().clone())
    }

    pub fn pipelines(&self) -> Vec<PipelineInfo> {
        self.pipelines
            .iter()
            .map(|p| p.value().info().clone())
            .collect()
    }

    /// Stop every registered pipeline; failures are logged.
    pub fn stop_all(&self) {
        let ids: Vec<PipelineId> = self.pipelines.iter().map(|p| *p.key()).collect();
        for id in ids {
            if let Err(e) = self.stop_pipeline(id) {
                tracing::error!("{}", e);
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop_all();
    }
}
