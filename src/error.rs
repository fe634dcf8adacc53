//! Error handling for pipefan
//!
//! This module defines the top-level error type and a Result alias for use
//! by the engine, configuration and the runner binary. The pipeline layer
//! has its own finer-grained errors in [`crate::pipeline::error`].

use crate::pipeline::error::{CompileError, ProcessorError, StartError, StopError};
use thiserror::Error;

/// Main error type for pipefan operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// A configuration tree could not be compiled
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// A compiled graph could not be started
    #[error("Start error: {0}")]
    Start(#[from] StartError),

    /// A pipeline could not be stopped
    #[error("Stop error: {0}")]
    Stop(#[from] StopError),

    /// A processor hook failed outside a running graph
    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EngineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for pipefan operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<EngineError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
