use crate::pipeline::agent::Agent;
use crate::pipeline::error::CompileError;
use crate::pipeline::id::AgentId;
use crate::pipeline::port::Port;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// Flat graph produced by the compiler.
/// Agents reference each other only through `Port` values in `sources`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompiledGraph {
    /// Every agent of the graph, in compiler emission order
    pub agents: Vec<Agent>,

    /// Output ports no agent of the graph consumes yet
    pub outputs: Vec<Port>,

    /// Compilation statistics
    pub stats: GraphStats,
}

/// Statistics about a compiled graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Total number of agents
    pub total_agents: usize,

    /// Number of port subscriptions (edges)
    pub edges: usize,

    /// Agents without sources
    pub source_agents: usize,

    /// Agents nobody subscribes to
    pub sink_agents: usize,

    /// Agents driven by a timer
    pub scheduled_agents: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

/// One subscription: `to` consumes `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    pub from: Port,
    pub to: AgentId,
}

impl CompiledGraph {
    pub fn new(agents: Vec<Agent>, outputs: Vec<Port>) -> Self {
        let mut graph = Self {
            agents,
            outputs,
            stats: GraphStats::default(),
        };
        graph.stats = graph.compute_stats(0);
        graph
    }

    /// Check if the graph has any agents
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Agents whose `kind` equals `kind`.
    pub fn agents_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Agent> + 'a {
        self.agents.iter().filter(move |a| a.kind == kind)
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.agents
            .iter()
            .flat_map(|agent| {
                agent.sources.iter().map(move |&from| Edge { from, to: agent.id })
            })
            .collect()
    }

    /// Agents subscribed to `port`.
    pub fn subscribers(&self, port: Port) -> Vec<AgentId> {
        self.agents
            .iter()
            .filter(|a| a.sources.contains(&port))
            .map(|a| a.id)
            .collect()
    }

    pub(crate) fn compute_stats(&self, compile_time_us: u64) -> GraphStats {
        let consumed: HashSet<AgentId> = self
            .agents
            .iter()
            .flat_map(|a| a.sources.iter().map(|p| p.agent))
            .collect();

        GraphStats {
            total_agents: self.agents.len(),
            edges: self.agents.iter().map(|a| a.sources.len()).sum(),
            source_agents: self.agents.iter().filter(|a| a.sources.is_empty()).count(),
            sink_agents: self
                .agents
                .iter()
                .filter(|a| !consumed.contains(&a.id))
                .count(),
            scheduled_agents: self.agents.iter().filter(|a| a.is_scheduled()).count(),
            compile_time_us,
        }
    }

    /// Check structural invariants: unique ids, resolvable sources and
    /// source port numbers within the producer's port range.
    pub fn validate(&self) -> Result<(), CompileError> {
        let mut by_id: HashMap<AgentId, &Agent> = HashMap::with_capacity(self.agents.len());
        for agent in &self.agents {
            if by_id.insert(agent.id, agent).is_some() {
                return Err(CompileError::Invalid(format!(
                    "duplicate agent id {}",
                    agent.id
                )));
            }
        }

        for agent in &self.agents {
            for source in &agent.sources {
                let producer = by_id.get(&source.agent).ok_or_else(|| {
                    CompileError::Invalid(format!(
                        "agent {} ({}) consumes unknown port {}",
                        agent.id, agent.label, source
                    ))
                })?;
                if usize::from(source.number) >= producer.port_count() {
                    return Err(CompileError::Invalid(format!(
                        "agent {} ({}) consumes port {} but '{}' exposes {} port(s)",
                        agent.id,
                        agent.label,
                        source,
                        producer.label,
                        producer.port_count()
                    )));
                }
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Agent indices ordered producers first, using Kahn's algorithm.
    pub fn topological_order(&self) -> Result<Vec<usize>, CompileError> {
        let n = self.agents.len();
        let index: HashMap<AgentId, usize> = self
            .agents
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id, i))
            .collect();

        let mut adj = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];

        for (to, agent) in self.agents.iter().enumerate() {
            for source in &agent.sources {
                if let Some(&from) = index.get(&source.agent) {
                    adj[from].push(to);
                    in_degree[to] += 1;
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut result = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            result.push(node);

            for &neighbor in &adj[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        if result.len() != n {
            return Err(CompileError::Invalid("cycle detected in agent graph".into()));
        }
        Ok(result)
    }

    /// Edges with agent ids replaced by their position in `agents`.
    ///
    /// Two compilations of the same tree yield equal canonical edges even
    /// when their id allocators started at different values.
    pub fn canonical_edges(&self) -> Vec<((usize, u16), usize)> {
        let position: HashMap<AgentId, usize> = self
            .agents
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id, i))
            .collect();

        let mut edges: Vec<_> = self
            .edges()
            .into_iter()
            .filter_map(|e| {
                Some((
                    (*position.get(&e.from.agent)?, e.from.number),
                    *position.get(&e.to)?,
                ))
            })
            .collect();
        edges.sort_unstable();
        edges
    }
}
