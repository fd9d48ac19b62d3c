//! Behavior templates: the prompt skeletons for both translation phases.
//!
//! A behavior is chosen once, when the pipeline is built. Every field is
//! parsed into a [`Template`] so placeholder mistakes surface at load time.

use std::path::Path;

use serde_yaml::Value;

use super::{child, ConfigProvider};
use crate::error::{ConfigError, ConfigResult};
use crate::template::{Template, TemplateKind};

/// Prompt fragments for natural language → facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessingTemplates {
    pub init: Template,
    pub context: Template,
    pub mapping: Template,
}

/// Prompt fragments for facts → natural language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostprocessingTemplates {
    pub init: Template,
    pub context: Template,
    pub mapping: Template,
    pub summarize: Template,
}

/// A validated behavior file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Behavior {
    pub preprocessing: PreprocessingTemplates,
    pub postprocessing: PostprocessingTemplates,
}

impl Behavior {
    pub fn load(provider: &dyn ConfigProvider, path: &Path) -> ConfigResult<Self> {
        let document = path.display().to_string();
        let tree = provider.load(path)?;
        let behavior = Self::from_value(&tree, &document)?;
        tracing::debug!(path = %document, "loaded behavior templates");
        Ok(behavior)
    }

    pub fn from_value(tree: &Value, document: &str) -> ConfigResult<Self> {
        let field = |kind: TemplateKind| -> ConfigResult<Template> {
            let (section, name) = kind.location();
            let section_tree = child(tree, section).ok_or_else(|| ConfigError::MissingSection {
                document: document.into(),
                section: section.into(),
            })?;
            let text = child(section_tree, name)
                .and_then(Value::as_str)
                .ok_or_else(|| ConfigError::MissingField {
                    document: document.into(),
                    section: section.into(),
                    field: name.into(),
                })?;
            Template::parse(kind, text)
        };

        Ok(Self {
            preprocessing: PreprocessingTemplates {
                init: field(TemplateKind::PreInit)?,
                context: field(TemplateKind::PreContext)?,
                mapping: field(TemplateKind::PreMapping)?,
            },
            postprocessing: PostprocessingTemplates {
                init: field(TemplateKind::PostInit)?,
                context: field(TemplateKind::PostContext)?,
                mapping: field(TemplateKind::PostMapping)?,
                summarize: field(TemplateKind::PostSummarize)?,
            },
        })
    }
}
