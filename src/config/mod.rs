//! Configuration model: application files, behavior templates, runtime settings.
//!
//! Application and behavior documents are YAML, read through a
//! [`ConfigProvider`] so that the pipeline never touches the filesystem
//! directly. Both are validated once at load and immutable afterwards.
//! Runtime settings (model endpoint, solver knobs) are TOML, see [`settings`].

pub mod application;
pub mod behavior;
pub mod settings;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};

pub use application::{ApplicationConfig, Entry, Section, CONTEXT_KEY};
pub use behavior::{Behavior, PostprocessingTemplates, PreprocessingTemplates};
pub use settings::{HelperScript, LlmSettings, Settings, SolverSettings};

/// Source of parsed configuration trees.
pub trait ConfigProvider {
    /// Load and parse the document at `path`.
    fn load(&self, path: &Path) -> ConfigResult<serde_yaml::Value>;
}

/// Reads YAML documents from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFileProvider;

impl ConfigProvider for YamlFileProvider {
    fn load(&self, path: &Path) -> ConfigResult<serde_yaml::Value> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        parse_yaml(path, &content)
    }
}

/// Serves YAML documents from memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    documents: HashMap<PathBuf, String>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document, builder style.
    pub fn with(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.documents.insert(path.into(), content.into());
    }
}

impl ConfigProvider for InMemoryProvider {
    fn load(&self, path: &Path) -> ConfigResult<serde_yaml::Value> {
        let content = self.documents.get(path).ok_or_else(|| ConfigError::Read {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such document"),
        })?;
        parse_yaml(path, content)
    }
}

fn parse_yaml(path: &Path, content: &str) -> ConfigResult<serde_yaml::Value> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Look up a string-keyed child of a YAML mapping.
pub(crate) fn child<'a>(value: &'a serde_yaml::Value, key: &str) -> Option<&'a serde_yaml::Value> {
    value.as_mapping().and_then(|m| m.get(key))
}
