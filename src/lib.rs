//! # pipefan: declarative event-processing pipelines
//!
//! pipefan compiles a pipeline configuration (input, filter and output
//! sections of plugins, with conditional branches and imported fragments)
//! into a flat graph of agents, then runs that graph with one bounded queue
//! and one worker pool per agent.
//!
//! ## Architecture
//!
//! - **Compiler**: turns a [`pipeline::ConfigTree`] into a [`pipeline::CompiledGraph`],
//!   splicing imported fragments through a [`pipeline::ConfigLoader`]
//! - **Runtime**: wires queues, spawns workers and timers, and orders start/stop
//! - **Scripting**: Rhai-based expressions selecting `when` branches
//! - **Engine**: processor registry plus the registry of running pipelines
//!
//! ## Processors
//!
//! Only the agents the compiler synthesizes (`when`, `use`, `route`) ship
//! with the engine. Every other input, filter and output type must be
//! registered with [`Engine::register_processor`] before a pipeline using
//! it can be verified or started. The `pipefan` binary registers nothing
//! else, so it can only check and run pipelines built from those agents.
//!
//! ## Configuration
//!
//! The engine configuration (agent defaults, logging, data location) is a
//! TOML file, by default under the platform config directory in `pipefan/`.
//!
//! ## Example
//!
//! ```ignore
//! use pipefan::{config::EngineConfig, engine::{Engine, PipelineInfo}};
//! use std::path::Path;
//!
//! let engine = Engine::new(EngineConfig::default());
//! engine.register_processor("input_stdin", || Box::new(StdinInput::default()));
//! engine.register_processor("output_stdout", || Box::new(StdoutOutput::default()));
//!
//! let graph = engine.compile_location("main.json", Path::new("."))?;
//! let id = engine.start_pipeline(PipelineInfo::from_location("main.json"), graph)?;
//! // ...
//! engine.stop_pipeline(id)?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod scripting;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{Engine, Pipeline, PipelineInfo, PipelineState};
pub use error::{EngineError, Result, ResultExt};
pub use pipeline::{
    Agent, AgentId, CompiledGraph, ConfigTree, Emitter, Packet, PipelineId, Plugin, Port,
    Processor, ProcessorContext, ProcessorError, ProcessorRegistry,
};
pub use scripting::{Condition, ExpressionEngine};
