//! Test data builders for creating configuration trees and packets

use pipefan::pipeline::packet::Fields;
use pipefan::pipeline::tree::{ConfigTree, Plugin};
use pipefan::Packet;
use serde_json::Value;

/// Builder for creating test configuration trees
#[derive(Default)]
pub struct TreeBuilder {
    tree: ConfigTree,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, plugin: Plugin) -> Self {
        self.tree.input.push(plugin);
        self
    }

    pub fn filter(mut self, plugin: Plugin) -> Self {
        self.tree.filter.push(plugin);
        self
    }

    pub fn output(mut self, plugin: Plugin) -> Self {
        self.tree.output.push(plugin);
        self
    }

    pub fn build(self) -> ConfigTree {
        self.tree
    }
}

/// Shorthand for `Plugin::new`
pub fn plugin(name: &str) -> Plugin {
    Plugin::new(name)
}

/// Packet with a numeric `seq` field
pub fn seq_packet(seq: i64) -> Packet {
    let mut fields = Fields::new();
    fields.insert("seq".into(), Value::from(seq));
    Packet::new(fields)
}

/// Read `seq` back from a packet built by [`seq_packet`]
pub fn seq_of(packet: &Packet) -> i64 {
    packet.get("seq").and_then(Value::as_i64).unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_builder() {
        let tree = TreeBuilder::new()
            .input(plugin("stdin"))
            .filter(plugin("mutate"))
            .output(plugin("stdout"))
            .build();

        assert_eq!(tree.input[0].name, "stdin");
        assert_eq!(tree.filter[0].name, "mutate");
        assert_eq!(tree.output[0].name, "stdout");
        assert_eq!(seq_of(&seq_packet(7)), 7);
    }
}
