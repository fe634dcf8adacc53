//! Output ports.
//!
//! A port is a numbered output of an agent. Agents subscribe to ports by
//! listing them as sources; the runtime turns each subscription into a
//! queue edge.

use crate::pipeline::id::AgentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output port number. Branch routers expose one port per expression.
pub type PortNumber = u16;

/// Reference to one output of one agent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Port {
    pub agent: AgentId,
    pub number: PortNumber,
}

impl Port {
    pub const fn new(agent: AgentId, number: PortNumber) -> Self {
        Self { agent, number }
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port({}:{})", self.agent, self.number)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.agent, self.number)
    }
}
