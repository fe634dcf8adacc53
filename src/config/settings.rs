//! Settings sections of the engine configuration.
//!
//! # Main Types
//!
//! - [`AgentDefaults`] - Queue capacity and worker pool sizes applied by the compiler
//! - [`LogSettings`] - Log filter, optional log file and packet tracing
//! - [`PipelineEntry`] - A pipeline the runner starts at boot
//!
//! Every field has a serde default so a partial TOML file is always valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default inbound queue capacity for every agent
pub const DEFAULT_BUFFER: usize = 20;

/// Default worker pool size of input agents
pub const DEFAULT_INPUT_WORKERS: usize = 1;

/// Default worker pool size of filter agents
pub const DEFAULT_FILTER_WORKERS: usize = 2;

/// Default worker pool size of output agents
pub const DEFAULT_OUTPUT_WORKERS: usize = 1;

/// Defaults the compiler applies to every agent it creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefaults {
    /// Inbound queue capacity
    #[serde(default = "default_buffer")]
    pub buffer: usize,

    /// Worker pool size for agents built from the input section
    #[serde(default = "default_input_workers")]
    pub input_workers: usize,

    /// Worker pool size for agents built from the filter section
    #[serde(default = "default_filter_workers")]
    pub filter_workers: usize,

    /// Worker pool size for agents built from the output section
    #[serde(default = "default_output_workers")]
    pub output_workers: usize,
}

fn default_buffer() -> usize {
    DEFAULT_BUFFER
}

fn default_input_workers() -> usize {
    DEFAULT_INPUT_WORKERS
}

fn default_filter_workers() -> usize {
    DEFAULT_FILTER_WORKERS
}

fn default_output_workers() -> usize {
    DEFAULT_OUTPUT_WORKERS
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_BUFFER,
            input_workers: DEFAULT_INPUT_WORKERS,
            filter_workers: DEFAULT_FILTER_WORKERS,
            output_workers: DEFAULT_OUTPUT_WORKERS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional file to append logs to (rotated daily)
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Log every packet received by agents with tracing enabled
    #[serde(default)]
    pub verbose: bool,
}

fn default_log_level() -> String {
    "info,pipefan=debug".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            verbose: false,
        }
    }
}

/// A pipeline started by the runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEntry {
    /// Display name; defaults to the location
    #[serde(default)]
    pub name: Option<String>,

    /// Configuration location (file path, relative to the engine config)
    pub location: String,
}
