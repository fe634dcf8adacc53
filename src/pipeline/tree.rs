//! Parsed pipeline configuration.
//!
//! A [`ConfigTree`] is what a configuration parser produces: three ordered
//! sections of plugin declarations. Trees deserialize from JSON or TOML:
//!
//! ```json
//! {
//!   "input":  [{ "name": "stdin", "codecs": [{ "name": "json" }] }],
//!   "filter": [{ "name": "mutate",
//!                "when": [{ "expression": "level == \"error\"",
//!                           "plugins": [{ "name": "tag" }] }] }],
//!   "output": [{ "name": "stdout" }]
//! }
//! ```

use crate::pipeline::options::{Options, Value};
use serde::{Deserialize, Serialize};

/// The three sections of a pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Input,
    Filter,
    Output,
}

impl SectionKind {
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Input => "input",
            SectionKind::Filter => "filter",
            SectionKind::Output => "output",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigTree {
    #[serde(default)]
    pub input: Vec<Plugin>,
    #[serde(default)]
    pub filter: Vec<Plugin>,
    #[serde(default)]
    pub output: Vec<Plugin>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self, kind: SectionKind) -> &[Plugin] {
        match kind {
            SectionKind::Input => &self.input,
            SectionKind::Filter => &self.filter,
            SectionKind::Output => &self.output,
        }
    }

    pub fn with_input(mut self, plugin: Plugin) -> Self {
        self.input.push(plugin);
        self
    }

    pub fn with_filter(mut self, plugin: Plugin) -> Self {
        self.filter.push(plugin);
        self
    }

    pub fn with_output(mut self, plugin: Plugin) -> Self {
        self.output.push(plugin);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.filter.is_empty() && self.output.is_empty()
    }
}

/// One plugin declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub settings: Options,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codecs: Vec<CodecSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<When>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key, value);
        self
    }

    pub fn with_codec(mut self, codec: CodecSpec) -> Self {
        self.codecs.push(codec);
        self
    }

    pub fn with_branch(mut self, expression: impl Into<String>, plugins: Vec<Plugin>) -> Self {
        self.when.push(When {
            expression: expression.into(),
            plugins,
        });
        self
    }
}

/// A codec attached to a plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodecSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub settings: Options,
}

impl CodecSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One conditional branch: an expression and the plugins it guards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct When {
    pub expression: String,
    #[serde(default)]
    pub plugins: Vec<Plugin>,
}
