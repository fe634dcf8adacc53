//! Wall-clock tests for scheduled agents.

mod common;

use common::builders::{plugin, TreeBuilder};
use common::processors::{Collected, Collector, HookCounter, Ticker};
use pipefan::config::EngineConfig;
use pipefan::{Engine, PipelineInfo};
use serial_test::serial;
use std::path::Path;
use std::time::Duration;

fn engine(collected: &Collected) -> Engine {
    let engine = Engine::new(EngineConfig {
        data_location: Some(std::env::temp_dir()),
        ..EngineConfig::default()
    });
    engine.register_processor("input_ticker", || Box::new(Ticker::new()));
    let collected = collected.clone();
    engine.register_processor("output_collect", move || {
        Box::new(Collector::new(collected.clone(), HookCounter::default()))
    });
    engine
}

#[test]
#[serial]
fn test_interval_drives_input_without_traffic() {
    let collected = Collected::default();
    let engine = engine(&collected);

    let tree = TreeBuilder::new()
        .input(plugin("ticker").with_setting("interval", 1))
        .output(plugin("collect"))
        .build();
    let graph = engine.compile(&tree, Path::new(".")).unwrap();
    assert_eq!(graph.len(), 2);
    assert_eq!(graph.edges().len(), 1);
    assert_eq!(graph.stats.scheduled_agents, 1);
    let ticker = graph.agents_of_kind("input_ticker").next().unwrap();
    assert_eq!(ticker.schedule.as_deref(), Some("@every 1s"));

    let id = engine.start_pipeline(PipelineInfo::new("ticker"), graph).unwrap();
    std::thread::sleep(Duration::from_millis(3500));
    engine.stop_pipeline(id).unwrap();

    let packets = collected.packets();
    assert!(packets.len() >= 3, "only {} ticks", packets.len());
    let ticks: Vec<i64> = packets
        .iter()
        .filter_map(|p| p.get("tick").and_then(|v| v.as_i64()))
        .collect();
    assert_eq!(ticks, (0..packets.len() as i64).collect::<Vec<_>>());
}

#[test]
#[serial]
fn test_no_firing_after_stop() {
    let collected = Collected::default();
    let engine = engine(&collected);

    let tree = TreeBuilder::new()
        .input(plugin("ticker").with_setting("interval", "@every 50ms"))
        .output(plugin("collect"))
        .build();
    let graph = engine.compile(&tree, Path::new(".")).unwrap();
    let id = engine.start_pipeline(PipelineInfo::new("fast"), graph).unwrap();

    assert!(common::wait_until(|| collected.len() >= 2));
    engine.stop_pipeline(id).unwrap();
    let after_stop = collected.len();

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(collected.len(), after_stop);
}
