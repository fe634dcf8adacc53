//! Resolution of import locations into configuration trees.
//!
//! The compiler never touches the filesystem itself: every import goes
//! through a [`ConfigLoader`], which returns the parsed tree together with
//! the canonical location (used for cycle detection) and the working
//! directory nested imports resolve against.

use crate::pipeline::error::CompileError;
use crate::pipeline::options::Options;
use crate::pipeline::tree::ConfigTree;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A loaded configuration fragment.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub tree: ConfigTree,
    /// Canonical identity of the fragment.
    pub location: String,
    /// Directory relative imports inside this fragment resolve against.
    pub wd: PathBuf,
}

/// Fetches and parses configuration fragments.
pub trait ConfigLoader: Send + Sync {
    /// Load `location` as seen from `wd`. `options` are the settings of the
    /// importing plugin.
    fn load(&self, location: &str, wd: &Path, options: &Options) -> Result<Loaded, CompileError>;
}

/// Configuration formats understood by [`FileLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Format::Json),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }
}

/// Parse tree source text. Without a known format JSON is tried first.
pub fn parse_tree(
    source: &str,
    format: Option<Format>,
    location: &str,
) -> Result<ConfigTree, CompileError> {
    let parse_error = |message: String| CompileError::Parse {
        location: location.to_string(),
        message,
    };
    match format {
        Some(Format::Json) => serde_json::from_str(source).map_err(|e| parse_error(e.to_string())),
        Some(Format::Toml) => toml::from_str(source).map_err(|e| parse_error(e.to_string())),
        None => serde_json::from_str(source).or_else(|json_err| {
            toml::from_str(source)
                .map_err(|toml_err| parse_error(format!("not JSON ({json_err}) nor TOML ({toml_err})")))
        }),
    }
}

/// Loads fragments from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    fn resolve(location: &str, wd: &Path) -> PathBuf {
        let path = Path::new(location);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            wd.join(path)
        }
    }
}

impl ConfigLoader for FileLoader {
    fn load(&self, location: &str, wd: &Path, _options: &Options) -> Result<Loaded, CompileError> {
        if location.trim().is_empty() {
            return Err(CompileError::EmptyLocation);
        }

        let path = Self::resolve(location, wd);
        let source = std::fs::read_to_string(&path).map_err(|e| CompileError::load(&path, e))?;
        let canonical = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        let location = canonical.display().to_string();
        let tree = parse_tree(&source, Format::from_path(&canonical), &location)?;

        tracing::debug!("Loaded configuration {}", location);

        Ok(Loaded {
            tree,
            wd: canonical
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| wd.to_path_buf()),
            location,
        })
    }
}

/// Serves fragments registered in memory, keyed by location.
///
/// Locations are taken verbatim; the working directory is ignored.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    trees: HashMap<String, ConfigTree>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: impl Into<String>, tree: ConfigTree) {
        self.trees.insert(location.into(), tree);
    }

    pub fn with(mut self, location: impl Into<String>, tree: ConfigTree) -> Self {
        self.insert(location, tree);
        self
    }
}

impl ConfigLoader for MemoryLoader {
    fn load(&self, location: &str, wd: &Path, _options: &Options) -> Result<Loaded, CompileError> {
        if location.trim().is_empty() {
            return Err(CompileError::EmptyLocation);
        }
        let tree = self.trees.get(location).cloned().ok_or_else(|| {
            CompileError::load(
                location,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such configuration"),
            )
        })?;
        Ok(Loaded {
            tree,
            location: location.to_string(),
            wd: wd.to_path_buf(),
        })
    }
}
