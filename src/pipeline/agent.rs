//! Agent descriptors: the nodes of a compiled graph.
//!
//! An [`Agent`] is created once by the compiler and never mutated after
//! compilation. The runtime reads it to decide which processor to build,
//! how large the inbound queue is, how many workers to run and which ports
//! to subscribe to.

use crate::pipeline::id::AgentId;
use crate::pipeline::options::{Options, Value};
use crate::pipeline::port::{Port, PortNumber};
use crate::pipeline::tree::CodecSpec;
use serde::Serialize;
use std::path::PathBuf;

/// Option key holding the branch expressions of a conditional agent.
pub const EXPRESSIONS_OPTION: &str = "expressions";

/// Option key holding the codec descriptors of an agent.
pub const CODECS_OPTION: &str = "codecs";

/// Compiled node descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agent {
    pub id: AgentId,
    /// Processor type name used for registry lookup.
    pub kind: String,
    pub label: String,
    pub options: Options,
    /// Inbound queue capacity.
    pub buffer: usize,
    /// Requested worker pool size.
    pub pool_size: usize,
    /// Timer expression; `None` for purely reactive agents.
    pub schedule: Option<String>,
    pub trace: bool,
    /// Directory relative paths in the options resolve against.
    pub wd: PathBuf,
    /// Ports this agent consumes from.
    pub sources: Vec<Port>,
}

impl Agent {
    pub fn new(id: AgentId, kind: impl Into<String>, wd: impl Into<PathBuf>) -> Self {
        let kind = kind.into();
        Self {
            id,
            label: kind.clone(),
            kind,
            options: Options::new(),
            buffer: crate::config::DEFAULT_BUFFER,
            pool_size: 1,
            schedule: None,
            trace: false,
            wd: wd.into(),
            sources: Vec::new(),
        }
    }

    pub fn port(&self, number: PortNumber) -> Port {
        Port::new(self.id, number)
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Branch expressions of a conditional agent, in port order.
    pub fn expressions(&self) -> Vec<&str> {
        self.options
            .get(EXPRESSIONS_OPTION)
            .and_then(Value::as_list)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Number of output ports this agent exposes.
    pub fn port_count(&self) -> usize {
        let branches = self.expressions().len();
        if branches > 0 {
            branches
        } else if self.kind == crate::pipeline::nodes::ROUTE {
            2
        } else {
            1
        }
    }
}

/// Codec descriptor stored under the `codecs` option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Codec {
    pub name: String,
    pub role: Option<String>,
    pub options: Options,
}

impl Codec {
    pub fn to_value(&self) -> Value {
        let mut entries = vec![("name".to_string(), Value::from(self.name.as_str()))];
        if let Some(role) = &self.role {
            entries.push(("role".to_string(), Value::from(role.as_str())));
        }
        entries.push(("options".to_string(), Value::from(self.options.clone())));
        Value::Map(entries)
    }
}

impl From<&CodecSpec> for Codec {
    fn from(spec: &CodecSpec) -> Self {
        Self {
            name: spec.name.clone(),
            role: spec.role.clone(),
            options: spec.settings.clone(),
        }
    }
}
