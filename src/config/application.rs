//! Application configuration: what to extract, how to narrate it, and the
//! static program text every solver call receives.
//!
//! ```yaml
//! preprocessing:
//!   - _: "The user is shopping for groceries."
//!   - "item(Name)": "Extract every item the user wants."
//! postprocessing:
//!   - _: "You are a shopping assistant."
//!   - "item(Name)": "Say which items are in stock."
//! knowledge_base: |
//!   in_stock(X) :- item(X), stock(X).
//! database: database.yml
//! ```

use std::path::{Path, PathBuf};

use serde_yaml::Value;

use super::{child, ConfigProvider};
use crate::error::{ConfigError, ConfigResult};

/// Reserved key holding the application-wide context string.
pub const CONTEXT_KEY: &str = "_";

/// One `key: instructions` entry of a processing section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Predicate format such as `item(Name)`, or [`CONTEXT_KEY`].
    pub key: String,
    /// Free-text instructions for the model.
    pub instructions: String,
}

impl Entry {
    /// The predicate name this entry describes: the key up to its first `(`.
    pub fn predicate_name(&self) -> &str {
        predicate_name(&self.key)
    }

    pub fn is_context(&self) -> bool {
        self.key == CONTEXT_KEY
    }
}

/// Name of a predicate format or fact: everything before the first `(`.
///
/// Zero-arity facts carry no parentheses; their statement terminator is
/// dropped so that `flag.` groups under `flag`.
pub fn predicate_name(text: &str) -> &str {
    let text = text.trim();
    match text.find('(') {
        Some(idx) => text[..idx].trim_end(),
        None => text.strip_suffix('.').unwrap_or(text).trim_end(),
    }
}

/// An ordered list of entries (`preprocessing` or `postprocessing`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    entries: Vec<Entry>,
}

impl Section {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entry whose key is exactly `key`.
    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// The application context stored under [`CONTEXT_KEY`].
    pub fn context(&self) -> Option<&str> {
        self.get(CONTEXT_KEY).map(|e| e.instructions.as_str())
    }

    /// First entry whose predicate name equals `name`.
    pub fn for_predicate(&self, name: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .filter(|e| !e.is_context())
            .find(|e| e.predicate_name() == name)
    }

    /// Every entry except the reserved context, in file order.
    pub fn predicates(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| !e.is_context())
    }
}

/// A validated application file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationConfig {
    pub preprocessing: Section,
    pub postprocessing: Section,
    pub knowledge_base: String,
    /// Program text from the optional database file; empty when absent.
    pub database: String,
}

impl ApplicationConfig {
    /// Load the application file at `path`, then its database file if it names one.
    pub fn load(provider: &dyn ConfigProvider, path: &Path) -> ConfigResult<Self> {
        let document = path.display().to_string();
        let tree = provider.load(path)?;
        let mut config = Self::from_value(&tree, &document)?;

        if let Some(db) = child(&tree, "database").filter(|v| !v.is_null()) {
            let db = db.as_str().ok_or_else(|| ConfigError::InvalidEntry {
                document: document.clone(),
                section: "database".into(),
                message: "expected a file path".into(),
            })?;
            config.database = load_database(provider, &resolve_relative(path, db));
        }

        tracing::debug!(
            path = %document,
            preprocessing = config.preprocessing.entries().len(),
            postprocessing = config.postprocessing.entries().len(),
            database_bytes = config.database.len(),
            "loaded application configuration"
        );
        Ok(config)
    }

    /// Build from an already-parsed tree. The `database` key is not followed.
    pub fn from_value(tree: &Value, document: &str) -> ConfigResult<Self> {
        if !tree.is_mapping() {
            return Err(ConfigError::InvalidEntry {
                document: document.into(),
                section: "<root>".into(),
                message: "expected a mapping at the top level".into(),
            });
        }
        let preprocessing = parse_section(tree, "preprocessing", document)?;
        let postprocessing = parse_section(tree, "postprocessing", document)?;
        let knowledge_base = match required(tree, "knowledge_base", document)? {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            _ => {
                return Err(ConfigError::InvalidEntry {
                    document: document.into(),
                    section: "knowledge_base".into(),
                    message: "expected program text".into(),
                });
            }
        };

        Ok(Self {
            preprocessing,
            postprocessing,
            knowledge_base,
            database: String::new(),
        })
    }
}

fn required<'a>(tree: &'a Value, section: &str, document: &str) -> ConfigResult<&'a Value> {
    child(tree, section).ok_or_else(|| ConfigError::MissingSection {
        document: document.into(),
        section: section.into(),
    })
}

fn parse_section(tree: &Value, section: &str, document: &str) -> ConfigResult<Section> {
    let invalid = |message: String| ConfigError::InvalidEntry {
        document: document.into(),
        section: section.into(),
        message,
    };

    let items = required(tree, section, document)?
        .as_sequence()
        .ok_or_else(|| invalid("expected a list of single-key mappings".into()))?;

    let mut entries = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let mapping = item
            .as_mapping()
            .ok_or_else(|| invalid(format!("entry {idx} is not a mapping")))?;
        if mapping.len() != 1 {
            return Err(invalid(format!(
                "entry {idx} has {} keys, expected exactly one",
                mapping.len()
            )));
        }
        let Some((key, value)) = mapping.iter().next() else {
            continue;
        };
        let key = key
            .as_str()
            .ok_or_else(|| invalid(format!("entry {idx} has a non-string key")))?;
        let instructions = match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            _ => return Err(invalid(format!("entry \"{key}\" must map to text"))),
        };
        entries.push(Entry {
            key: key.to_string(),
            instructions,
        });
    }
    Ok(Section::new(entries))
}

fn resolve_relative(base: &Path, target: &str) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        return target.to_path_buf();
    }
    match base.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(target),
        _ => target.to_path_buf(),
    }
}

/// Read the database program text. Failures are tolerated: the database is
/// supplementary, so a broken file degrades to an empty program.
fn load_database(provider: &dyn ConfigProvider, path: &Path) -> String {
    match provider.load(path) {
        Ok(tree) => match child(&tree, "database").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => {
                tracing::warn!(path = %path.display(), "database file has no `database` text");
                String::new()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "database configuration not loaded");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InMemoryProvider;

    const APP: &str = r#"
preprocessing:
  - _: "ctx"
  - "item(Name)": "extract items"
  - "wants(Who, What)": "extract wishes"
postprocessing:
  - _: "post ctx"
  - "item(Name)": "narrate items"
knowledge_base: |
  in_stock(X) :- item(X).
database: db.yml
"#;

    #[test]
    fn loads_sections_in_order() {
        let provider = InMemoryProvider::new()
            .with("specs/app.yml", APP)
            .with("specs/db.yml", "database: |\n  stock(apples).\n");
        let cfg = ApplicationConfig::load(&provider, Path::new("specs/app.yml")).unwrap();

        assert_eq!(cfg.preprocessing.context(), Some("ctx"));
        let keys: Vec<_> = cfg.preprocessing.predicates().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["item(Name)", "wants(Who, What)"]);
        assert!(cfg.knowledge_base.contains("in_stock"));
        assert_eq!(cfg.database.trim(), "stock(apples).");
    }

    #[test]
    fn missing_knowledge_base_is_missing_section() {
        let provider = InMemoryProvider::new().with(
            "app.yml",
            "preprocessing: []\npostprocessing: []\n",
        );
        let err = ApplicationConfig::load(&provider, Path::new("app.yml")).unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingSection { ref section, .. } if section == "knowledge_base")
        );
    }

    #[test]
    fn multi_key_entry_rejected() {
        let provider = InMemoryProvider::new().with(
            "app.yml",
            "preprocessing:\n  - {a: x, b: y}\npostprocessing: []\nknowledge_base: ''\n",
        );
        let err = ApplicationConfig::load(&provider, Path::new("app.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry { .. }));
    }

    #[test]
    fn unreadable_database_degrades_to_empty() {
        let provider = InMemoryProvider::new().with("specs/app.yml", APP);
        let cfg = ApplicationConfig::load(&provider, Path::new("specs/app.yml")).unwrap();
        assert!(cfg.database.is_empty());
    }

    #[test]
    fn null_database_is_treated_as_absent() {
        let provider = InMemoryProvider::new().with(
            "app.yml",
            "preprocessing: []\npostprocessing: []\nknowledge_base: 'a.'\ndatabase: ~\n",
        );
        let cfg = ApplicationConfig::load(&provider, Path::new("app.yml")).unwrap();
        assert!(cfg.database.is_empty());
        assert_eq!(cfg.knowledge_base, "a.");
    }

    #[test]
    fn predicate_lookup_uses_name_before_paren() {
        let provider = InMemoryProvider::new().with("app.yml", APP);
        let cfg = ApplicationConfig::load(&provider, Path::new("app.yml")).unwrap();
        let entry = cfg.postprocessing.for_predicate("item").unwrap();
        assert_eq!(entry.key, "item(Name)");
        assert!(cfg.postprocessing.for_predicate("wants").is_none());
    }

    #[test]
    fn predicate_name_handles_zero_arity() {
        assert_eq!(predicate_name("item(apples)."), "item");
        assert_eq!(predicate_name("done."), "done");
        assert_eq!(predicate_name("wants(Who, What)"), "wants");
    }
}
