//! Pipeline-specific error types.
//!
//! Compilation, start-up, processing and shutdown each get their own enum so
//! callers can tell a bad configuration apart from a processor that failed
//! at runtime.

use crate::pipeline::id::{AgentId, PipelineId};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning a configuration tree into a graph.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("empty import location")]
    EmptyLocation,

    #[error("failed to load {location}: {source}")]
    Load {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {location}: {message}")]
    Parse { location: String, message: String },

    #[error("import cycle: {}", chain.join(" -> "))]
    ImportCycle { chain: Vec<String> },

    #[error("invalid import in '{plugin}': {message}")]
    InvalidImport { plugin: String, message: String },

    #[error("agent {agent} ({kind}) rejected its options: {message}")]
    Options {
        agent: AgentId,
        kind: String,
        message: String,
    },

    #[error("invalid graph: {0}")]
    Invalid(String),
}

impl CompileError {
    pub fn load(location: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompileError::Load {
            location: location.into().display().to_string(),
            source,
        }
    }
}

/// Errors returned by processor hooks.
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("invalid options: {0}")]
    Options(String),

    #[error("field '{path}': {message}")]
    Field { path: String, message: String },

    #[error("expression error: {0}")]
    Expression(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Message(String),
}

impl ProcessorError {
    pub fn msg(message: impl Into<String>) -> Self {
        ProcessorError::Message(message.into())
    }
}

/// Errors that prevent a compiled graph from starting.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("agent {agent}: no processor registered for type '{kind}'")]
    UnknownProcessor { agent: AgentId, kind: String },

    #[error("agent {agent}: configure failed: {source}")]
    Configure {
        agent: AgentId,
        #[source]
        source: ProcessorError,
    },

    #[error("agent {agent}: start failed: {source}")]
    Startup {
        agent: AgentId,
        #[source]
        source: ProcessorError,
    },

    #[error("agent {agent}: invalid schedule: {message}")]
    Schedule { agent: AgentId, message: String },

    #[error("agent {agent}: failed to spawn thread: {source}")]
    Spawn {
        agent: AgentId,
        #[source]
        source: std::io::Error,
    },

    #[error("pipeline {0} is already running")]
    AlreadyRunning(PipelineId),

    #[error(transparent)]
    Invalid(#[from] CompileError),
}

/// Errors returned when stopping a pipeline.
#[derive(Error, Debug)]
pub enum StopError {
    #[error("pipeline {0} not found")]
    NotFound(PipelineId),

    /// The pipeline was stopped and removed, but some shutdown hooks failed.
    #[error("pipeline {id} stopped with {} failed shutdown hook(s)", failures.len())]
    Hooks {
        id: PipelineId,
        failures: Vec<(AgentId, ProcessorError)>,
    },
}

pub type CompileResult<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_cycle_display() {
        let err = CompileError::ImportCycle {
            chain: vec!["a.json".into(), "b.json".into(), "a.json".into()],
        };
        assert_eq!(err.to_string(), "import cycle: a.json -> b.json -> a.json");
    }

    #[test]
    fn test_load_error_names_location() {
        let err = CompileError::load(
            "/etc/pipefan/missing.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.to_string().contains("/etc/pipefan/missing.json"));
    }

    #[test]
    fn test_start_error_wraps_processor_error() {
        let err = StartError::Configure {
            agent: AgentId(3),
            source: ProcessorError::Options("missing field `path`".into()),
        };
        assert_eq!(
            err.to_string(),
            "agent 3: configure failed: invalid options: missing field `path`"
        );
    }

    #[test]
    fn test_stop_hooks_display() {
        let err = StopError::Hooks {
            id: PipelineId::new(),
            failures: vec![
                (AgentId(1), ProcessorError::msg("a")),
                (AgentId(2), ProcessorError::msg("b")),
            ],
        };
        assert!(err.to_string().ends_with("stopped with 2 failed shutdown hook(s)"));
    }
}
