//! Graph compiler: configuration tree → flat agent graph.
//!
//! Sections are processed in order. A running set of "current" output ports
//! is threaded through the filter section; every plugin consumes that set
//! and yields the next one. Conditional blocks give each branch its own port
//! on the owning agent, and `use`/`route` imports compile other
//! configuration fragments and splice them into the graph.
//!
//! Agent lists are accumulated by prepending, so the emitted order is the
//! reverse of processing order. Only `Port` linkage carries meaning.

use crate::config::AgentDefaults;
use crate::pipeline::agent::{Agent, Codec, CODECS_OPTION, EXPRESSIONS_OPTION};
use crate::pipeline::compiled_plan::CompiledGraph;
use crate::pipeline::error::{CompileError, CompileResult};
use crate::pipeline::id::IdAllocator;
use crate::pipeline::loader::ConfigLoader;
use crate::pipeline::nodes::{CATCH_ALL, ROUTE, USE};
use crate::pipeline::options::{Options, Value};
use crate::pipeline::port::{Port, PortNumber};
use crate::pipeline::tree::{ConfigTree, Plugin, SectionKind};
use std::path::Path;
use std::time::Instant;

/// Setting holding import locations of `use` and `route` plugins.
pub const PATH_OPTION: &str = "path";
pub const INTERVAL_OPTION: &str = "interval";
pub const TRACE_OPTION: &str = "trace";
pub const WORKERS_OPTION: &str = "workers";

const ALL_SECTIONS: [SectionKind; 3] = [SectionKind::Input, SectionKind::Filter, SectionKind::Output];

/// Where a fragment is being compiled from.
#[derive(Clone, Copy)]
struct Scope<'s> {
    wd: &'s Path,
    /// Locations of the imports currently being compiled, outermost first.
    chain: &'s [String],
}

/// Compiles configuration trees into [`CompiledGraph`]s.
///
/// One compiler owns one id allocator; agent ids are unique across every
/// graph it produces.
pub struct GraphCompiler<'a> {
    loader: &'a dyn ConfigLoader,
    defaults: AgentDefaults,
    ids: IdAllocator,
}

impl<'a> GraphCompiler<'a> {
    pub fn new(loader: &'a dyn ConfigLoader) -> Self {
        Self {
            loader,
            defaults: AgentDefaults::default(),
            ids: IdAllocator::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: AgentDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_allocator(mut self, ids: IdAllocator) -> Self {
        self.ids = ids;
        self
    }

    /// Compile an already parsed tree. Relative imports resolve against `wd`.
    pub fn compile(&self, tree: &ConfigTree, wd: &Path) -> CompileResult<CompiledGraph> {
        self.compile_scoped(tree, Scope { wd, chain: &[] })
    }

    /// Load `location` through the loader and compile it.
    pub fn compile_location(&self, location: &str, wd: &Path) -> CompileResult<CompiledGraph> {
        if location.trim().is_empty() {
            return Err(CompileError::EmptyLocation);
        }
        let loaded = self.loader.load(location, wd, &Options::new())?;
        let chain = vec![loaded.location.clone()];
        self.compile_scoped(
            &loaded.tree,
            Scope {
                wd: &loaded.wd,
                chain: &chain,
            },
        )
    }

    fn compile_scoped(&self, tree: &ConfigTree, scope: Scope<'_>) -> CompileResult<CompiledGraph> {
        let start_time = Instant::now();

        let (agents, outputs) = self.build(tree, &ALL_SECTIONS, Vec::new(), scope)?;
        let mut graph = CompiledGraph::new(agents, outputs);
        graph.validate()?;
        graph.stats = graph.compute_stats(start_time.elapsed().as_micros() as u64);

        tracing::debug!(
            "Compiled graph: {} agents, {} edges, {} scheduled ({}us)",
            graph.stats.total_agents,
            graph.stats.edges,
            graph.stats.scheduled_agents,
            graph.stats.compile_time_us
        );
        Ok(graph)
    }

    fn build(
        &self,
        tree: &ConfigTree,
        sections: &[SectionKind],
        upstream: Vec<Port>,
        scope: Scope<'_>,
    ) -> CompileResult<(Vec<Agent>, Vec<Port>)> {
        let mut agents = Vec::new();
        let mut current = upstream;

        if sections.contains(&SectionKind::Input) {
            for plugin in &tree.input {
                let (built, ports) = self.build_input(plugin, scope)?;
                prepend(&mut agents, built);
                current.extend(ports);
            }
        }

        if sections.contains(&SectionKind::Filter) {
            for plugin in &tree.filter {
                let (built, ports) = self.build_filter(plugin, current, scope)?;
                prepend(&mut agents, built);
                current = ports;
            }
        }

        if sections.contains(&SectionKind::Output) && !tree.output.is_empty() {
            for plugin in &tree.output {
                let built = self.build_output(plugin, &current, scope)?;
                prepend(&mut agents, built);
            }
            // outputs are sinks: nothing is left dangling
            current = Vec::new();
        }

        Ok((agents, current))
    }

    fn build_input(
        &self,
        plugin: &Plugin,
        scope: Scope<'_>,
    ) -> CompileResult<(Vec<Agent>, Vec<Port>)> {
        let mut agent = self.new_agent(
            format!("input_{}", plugin.name),
            plugin,
            self.defaults.input_workers,
            scope,
        )?;
        let out = vec![agent.port(0)];

        if plugin.name != USE {
            return Ok((vec![agent], out));
        }

        let paths = import_paths(plugin, &mut agent.options)?;
        let mut imported = Vec::new();
        for path in &paths {
            let (fragment, ports) = self.import(
                path,
                &[SectionKind::Input, SectionKind::Filter],
                Vec::new(),
                &agent.options,
                scope,
            )?;
            imported.extend(fragment);
            agent.sources.extend(ports);
        }

        let mut built = vec![agent];
        built.extend(imported);
        Ok((built, out))
    }

    fn build_filter(
        &self,
        plugin: &Plugin,
        current: Vec<Port>,
        scope: Scope<'_>,
    ) -> CompileResult<(Vec<Agent>, Vec<Port>)> {
        let mut agent = self.new_agent(
            plugin.name.clone(),
            plugin,
            self.defaults.filter_workers,
            scope,
        )?;

        match plugin.name.as_str() {
            USE => {
                let paths = import_paths(plugin, &mut agent.options)?;
                let mut imported = Vec::new();
                for path in &paths {
                    let (fragment, ports) = self.import(
                        path,
                        &[SectionKind::Filter],
                        current.clone(),
                        &agent.options,
                        scope,
                    )?;
                    imported.extend(fragment);
                    agent.sources.extend(ports);
                }
                let out = vec![agent.port(0)];
                let mut built = vec![agent];
                built.extend(imported);
                Ok((built, out))
            }
            ROUTE => {
                let paths = import_paths(plugin, &mut agent.options)?;
                let side = vec![agent.port(0)];
                let mut built = Vec::new();
                for path in &paths {
                    let (fragment, _) = self.import(
                        path,
                        &[SectionKind::Filter, SectionKind::Output],
                        side.clone(),
                        &agent.options,
                        scope,
                    )?;
                    built.extend(fragment);
                }
                agent.sources = current.clone();
                built.push(agent);
                // the main chain continues from the unchanged upstream ports
                Ok((built, current))
            }
            _ => {
                agent.sources = current;
                if plugin.when.is_empty() {
                    let out = vec![agent.port(0)];
                    return Ok((vec![agent], out));
                }

                let mut expressions = Vec::with_capacity(plugin.when.len() + 1);
                let mut branch_agents = Vec::new();
                let mut outputs = Vec::new();
                let mut has_catch_all = false;

                for (index, branch) in plugin.when.iter().enumerate() {
                    let number = port_number(index)?;
                    has_catch_all |= branch.expression.trim() == CATCH_ALL;
                    expressions.push(branch.expression.clone());

                    let mut ports = vec![agent.port(number)];
                    for nested in &branch.plugins {
                        let (built, next) = self.build_filter(nested, ports, scope)?;
                        prepend(&mut branch_agents, built);
                        ports = next;
                    }
                    prepend(&mut outputs, ports);
                }

                if !has_catch_all {
                    let number = port_number(expressions.len())?;
                    expressions.push(CATCH_ALL.to_string());
                    prepend(&mut outputs, vec![agent.port(number)]);
                }

                agent
                    .options
                    .insert(EXPRESSIONS_OPTION, Value::from(expressions));
                let mut built = vec![agent];
                built.extend(branch_agents);
                Ok((built, outputs))
            }
        }
    }

    /// Output agents are sinks; conditional blocks here get no implicit else,
    /// so packets matching no branch stop at the router.
    fn build_output(
        &self,
        plugin: &Plugin,
        current: &[Port],
        scope: Scope<'_>,
    ) -> CompileResult<Vec<Agent>> {
        if plugin.name == USE {
            let mut options = plugin.settings.clone();
            let paths = import_paths(plugin, &mut options)?;
            let mut built = Vec::new();
            for path in &paths {
                let (fragment, _) = self.import(
                    path,
                    &[SectionKind::Filter, SectionKind::Output],
                    current.to_vec(),
                    &options,
                    scope,
                )?;
                built.extend(fragment);
            }
            return Ok(built);
        }

        let mut agent = self.new_agent(
            format!("output_{}", plugin.name),
            plugin,
            self.defaults.output_workers,
            scope,
        )?;
        agent.sources = current.to_vec();
        if plugin.when.is_empty() {
            return Ok(vec![agent]);
        }

        let mut expressions = Vec::with_capacity(plugin.when.len());
        let mut branch_agents = Vec::new();
        for (index, branch) in plugin.when.iter().enumerate() {
            let branch_port = [agent.port(port_number(index)?)];
            expressions.push(branch.expression.clone());
            for nested in &branch.plugins {
                let built = self.build_output(nested, &branch_port, scope)?;
                prepend(&mut branch_agents, built);
            }
        }

        agent
            .options
            .insert(EXPRESSIONS_OPTION, Value::from(expressions));
        let mut built = vec![agent];
        built.extend(branch_agents);
        Ok(built)
    }

    fn import(
        &self,
        location: &str,
        sections: &[SectionKind],
        upstream: Vec<Port>,
        options: &Options,
        scope: Scope<'_>,
    ) -> CompileResult<(Vec<Agent>, Vec<Port>)> {
        if location.trim().is_empty() {
            return Err(CompileError::EmptyLocation);
        }

        let loaded = self.loader.load(location, scope.wd, options)?;

        let mut chain = scope.chain.to_vec();
        let cyclic = chain.contains(&loaded.location);
        chain.push(loaded.location.clone());
        if cyclic {
            return Err(CompileError::ImportCycle { chain });
        }

        tracing::debug!(
            "Importing {} ({})",
            loaded.location,
            sections
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join("+")
        );

        self.build(
            &loaded.tree,
            sections,
            upstream,
            Scope {
                wd: &loaded.wd,
                chain: &chain,
            },
        )
    }

    fn new_agent(
        &self,
        kind: String,
        plugin: &Plugin,
        workers: usize,
        scope: Scope<'_>,
    ) -> CompileResult<Agent> {
        if plugin.settings.contains_key(EXPRESSIONS_OPTION) {
            return Err(CompileError::Invalid(format!(
                "'{}' uses the reserved setting '{EXPRESSIONS_OPTION}'",
                plugin.name
            )));
        }

        let mut agent = Agent::new(self.ids.allocate(), kind, scope.wd);
        agent.label = plugin
            .label
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| plugin.name.clone());
        agent.buffer = self.defaults.buffer;
        agent.pool_size = workers;

        for (key, value) in plugin.settings.iter() {
            agent.options.insert(key, value.clone());
        }

        let codecs: Vec<Value> = plugin
            .codecs
            .iter()
            .filter(|c| !c.name.is_empty())
            .map(|c| Codec::from(c).to_value())
            .collect();
        if !codecs.is_empty() {
            agent.options.insert(CODECS_OPTION, Value::List(codecs));
        }

        apply_special_fields(&mut agent);

        tracing::trace!("Agent {} '{}' ({})", agent.id, agent.label, agent.kind);
        Ok(agent)
    }
}

fn prepend<T>(list: &mut Vec<T>, items: Vec<T>) {
    list.splice(0..0, items);
}

fn port_number(index: usize) -> CompileResult<PortNumber> {
    PortNumber::try_from(index)
        .map_err(|_| CompileError::Invalid(format!("too many branches ({index})")))
}

/// Read the import locations of a `use`/`route` plugin and store them back
/// as a list.
fn import_paths(plugin: &Plugin, options: &mut Options) -> CompileResult<Vec<String>> {
    let invalid = |message: &str| CompileError::InvalidImport {
        plugin: plugin.label.clone().unwrap_or_else(|| plugin.name.clone()),
        message: message.to_string(),
    };

    let paths = match options.get(PATH_OPTION) {
        Some(Value::String(path)) => vec![path.clone()],
        Some(Value::List(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("'path' entries must be strings"))
            })
            .collect::<CompileResult<Vec<_>>>()?,
        Some(_) => return Err(invalid("'path' must be a string or a list of strings")),
        None => return Err(invalid("missing 'path' setting")),
    };

    if paths.is_empty() {
        return Err(invalid("'path' lists no locations"));
    }

    options.insert(PATH_OPTION, Value::from(paths.clone()));
    Ok(paths)
}

/// Apply `interval`, `trace` and `workers`. Values of an unexpected shape
/// leave the field at its default.
fn apply_special_fields(agent: &mut Agent) {
    if let Some(schedule) = agent.options.get(INTERVAL_OPTION).and_then(interval_schedule) {
        agent.schedule = Some(schedule);
    }
    if let Some(trace) = agent.options.get(TRACE_OPTION).and_then(truthy) {
        agent.trace = trace;
    }
    if let Some(workers) = agent.options.get(WORKERS_OPTION).and_then(worker_count) {
        agent.pool_size = workers;
    }
}

/// Numbers (and numeric strings) become `@every <n>s`; other strings pass
/// through as schedule expressions.
pub fn interval_schedule(value: &Value) -> Option<String> {
    match value {
        Value::Int(n) if *n > 0 => Some(format!("@every {n}s")),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<u64>() {
                Ok(0) => None,
                Ok(n) => Some(format!("@every {n}s")),
                Err(_) if s.is_empty() => None,
                Err(_) => Some(s.to_string()),
            }
        }
        _ => None,
    }
}

fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(!matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "" | "false" | "0" | "no" | "off"
        )),
        _ => None,
    }
}

fn worker_count(value: &Value) -> Option<usize> {
    match value {
        Value::Int(n) => usize::try_from(*n).ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
