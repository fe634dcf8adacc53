//! Agent-graph pipeline architecture.
//!
//! A configuration tree (input, filter and output sections) is compiled into
//! a flat list of agents wired port-to-queue, then executed by worker pools
//! communicating over bounded crossbeam channels.
//!
//! # Architecture
//!
//! ```text
//!                 compile                         start
//! [ConfigTree] ───────────► [CompiledGraph] ─────────────► [RunningGraph]
//!      ▲                         │                              │
//!  ConfigLoader             validate / order              workers + timers
//!  (file, memory)
//!
//! [input_stdin] ──► [when] ─0─► [grok] ──► [output_elasticsearch]
//!                          └1─► [output_file]
//! ```
//!
//! # Design
//!
//! - **Flat agent list**: agents reference their producers by `(AgentId, port)`.
//! - **One queue per agent**: bounded, so slow consumers throttle producers.
//! - **Shared processor**: one instance per agent, shared by its worker pool.
//! - **Ordered lifecycle**: consumers start first, producers stop first.

pub mod agent;
pub mod compiled_plan;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod id;
pub mod loader;
pub mod nodes;
pub mod options;
pub mod packet;
pub mod port;
pub mod processor;
pub mod scheduler;
pub mod stats;
pub mod tree;

pub use agent::{Agent, Codec};
pub use compiled_plan::{CompiledGraph, Edge, GraphStats};
pub use compiler::GraphCompiler;
pub use error::{CompileError, CompileResult, ProcessorError, StartError, StopError};
pub use executor::{check, AgentReport, RunningGraph, RuntimeEnv};
pub use id::{AgentId, IdAllocator, PipelineId};
pub use loader::{ConfigLoader, FileLoader, Format, Loaded, MemoryLoader};
pub use options::{Options, Value};
pub use packet::{Fields, Packet};
pub use port::{Port, PortNumber};
pub use processor::{
    Emitter, Processor, ProcessorContext, ProcessorFactory, ProcessorRegistry,
    UNBOUNDED_CONCURRENCY,
};
pub use scheduler::{Schedule, Timer};
pub use stats::{AgentStats, StatsSnapshot};
pub use tree::{CodecSpec, ConfigTree, Plugin, SectionKind, When};
