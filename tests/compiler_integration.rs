//! Structural invariants of compiled graphs over generated configurations.

mod common;

use common::builders::{plugin, TreeBuilder};
use pipefan::pipeline::compiler::GraphCompiler;
use pipefan::pipeline::id::IdAllocator;
use pipefan::pipeline::loader::MemoryLoader;
use pipefan::pipeline::tree::{ConfigTree, Plugin};
use pipefan::CompiledGraph;
use proptest::prelude::*;
use std::collections::HashSet;
use std::path::Path;

fn compile(tree: &ConfigTree, first_id: u32) -> CompiledGraph {
    let loader = MemoryLoader::new();
    GraphCompiler::new(&loader)
        .with_allocator(IdAllocator::starting_at(first_id))
        .compile(tree, Path::new("."))
        .unwrap()
}

fn leaf(names: &'static [&'static str]) -> impl Strategy<Value = Plugin> {
    prop::sample::select(names).prop_map(Plugin::new)
}

fn with_branches(names: &'static [&'static str]) -> impl Strategy<Value = Plugin> {
    (
        leaf(names),
        prop::collection::vec(prop::collection::vec(leaf(names), 0..3), 0..3),
        any::<bool>(),
    )
        .prop_map(|(mut plugin, branches, catch_all)| {
            let count = branches.len();
            for (i, nested) in branches.into_iter().enumerate() {
                let expression = if catch_all && i + 1 == count {
                    "true".to_string()
                } else {
                    format!("n == {i}")
                };
                plugin = plugin.with_branch(expression, nested);
            }
            plugin
        })
}

const INPUTS: &[&str] = &["stdin", "tcp", "file"];
const FILTERS: &[&str] = &["grok", "mutate", "date", "drop"];
const OUTPUTS: &[&str] = &["stdout", "file", "elasticsearch"];

fn tree_strategy() -> impl Strategy<Value = ConfigTree> {
    (
        prop::collection::vec(leaf(INPUTS), 1..4),
        prop::collection::vec(with_branches(FILTERS), 0..4),
        prop::collection::vec(with_branches(OUTPUTS), 0..3),
    )
        .prop_map(|(input, filter, output)| ConfigTree {
            input,
            filter,
            output,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_ids_are_unique(tree in tree_strategy()) {
        let graph = compile(&tree, 1);
        let ids: HashSet<_> = graph.agents.iter().map(|a| a.id).collect();
        prop_assert_eq!(ids.len(), graph.agents.len());
    }

    #[test]
    fn prop_sources_resolve_within_port_range(tree in tree_strategy()) {
        let graph = compile(&tree, 1);
        prop_assert!(graph.validate().is_ok());
        for agent in &graph.agents {
            for source in &agent.sources {
                let producer = graph.agent(source.agent).unwrap();
                prop_assert!(usize::from(source.number) < producer.port_count());
            }
        }
        prop_assert_eq!(graph.topological_order().unwrap().len(), graph.len());
    }

    #[test]
    fn prop_only_inputs_lack_sources(tree in tree_strategy()) {
        let graph = compile(&tree, 1);
        for agent in &graph.agents {
            let is_input = agent.kind.starts_with("input_");
            prop_assert_eq!(agent.sources.is_empty(), is_input, "{}", agent.kind);
        }
    }

    #[test]
    fn prop_outputs_are_sinks(tree in tree_strategy()) {
        let graph = compile(&tree, 1);
        let consumed: HashSet<_> = graph
            .agents
            .iter()
            .flat_map(|a| a.sources.iter().map(|p| p.agent))
            .collect();
        // branching outputs feed their nested outputs; plain outputs feed nothing
        for agent in graph
            .agents
            .iter()
            .filter(|a| a.kind.starts_with("output_") && a.expressions().is_empty())
        {
            prop_assert!(!consumed.contains(&agent.id));
        }
        if !tree.output.is_empty() {
            prop_assert!(graph.outputs.is_empty());
        } else {
            prop_assert!(!graph.outputs.is_empty());
        }
    }

    #[test]
    fn prop_recompilation_is_isomorphic(tree in tree_strategy(), offset in 2u32..10_000) {
        let first = compile(&tree, 1);
        let second = compile(&tree, offset);

        let kinds = |g: &CompiledGraph| g.agents.iter().map(|a| a.kind.clone()).collect::<Vec<_>>();
        prop_assert_eq!(kinds(&first), kinds(&second));
        prop_assert_eq!(first.canonical_edges(), second.canonical_edges());
        prop_assert_eq!(first.stats.edges, second.stats.edges);
    }
}

#[test]
fn test_else_port_carries_unmatched_packets() {
    let tree = TreeBuilder::new()
        .input(plugin("stdin"))
        .filter(plugin("when").with_branch("level == \"error\"", vec![plugin("mutate")]))
        .output(plugin("stdout"))
        .build();
    let graph = compile(&tree, 1);

    let when = graph.agents_of_kind("when").next().unwrap();
    assert_eq!(when.expressions(), vec!["level == \"error\"", "true"]);
    assert_eq!(when.port_count(), 2);

    let mutate = graph.agents_of_kind("mutate").next().unwrap();
    let stdout = graph.agents_of_kind("output_stdout").next().unwrap();
    assert_eq!(mutate.sources, vec![when.port(0)]);
    let mut sources = stdout.sources.clone();
    sources.sort_by_key(|p| (p.agent.0, p.number));
    let mut expected = vec![mutate.port(0), when.port(1)];
    expected.sort_by_key(|p| (p.agent.0, p.number));
    assert_eq!(sources, expected);
}

#[test]
fn test_stats_describe_graph() {
    let tree = TreeBuilder::new()
        .input(plugin("stdin"))
        .input(plugin("tcp"))
        .filter(plugin("grok"))
        .output(plugin("stdout"))
        .output(plugin("file"))
        .build();
    let graph = compile(&tree, 1);

    assert_eq!(graph.stats.total_agents, 5);
    assert_eq!(graph.stats.source_agents, 2);
    assert_eq!(graph.stats.sink_agents, 2);
    // grok consumes both inputs, each output consumes grok
    assert_eq!(graph.stats.edges, 4);
}
