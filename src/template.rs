//! Prompt templates with named placeholders.
//!
//! Templates are plain text with `{identifier}` placeholders. The set of
//! placeholders a template may reference is fixed per [`TemplateKind`] and
//! checked once, when the behavior file is loaded, so a misspelt placeholder
//! is a configuration error instead of a silent no-op at render time.
//!
//! Rendering is a single left-to-right pass: substituted text is never
//! rescanned, so user input that happens to contain `{atom}` stays literal.
//! Braces around anything other than a bare identifier (ASP choice rules such
//! as `{ pick(X) : item(X) } 1`) are ordinary text. A bare identifier in
//! braces is always read as a placeholder, so literal text of that shape is
//! written with doubled braces: `1 {{chosen}} 1` renders as `1 {chosen} 1`.
//! Outside that, `{{` and `}}` render as a single brace.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{ConfigError, ConfigResult, TemplateError, TemplateResult};

/// The closed set of placeholder names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Context,
    Instructions,
    Atom,
    Input,
    Facts,
    Responses,
}

impl Placeholder {
    pub fn name(self) -> &'static str {
        match self {
            Placeholder::Context => "context",
            Placeholder::Instructions => "instructions",
            Placeholder::Atom => "atom",
            Placeholder::Input => "input",
            Placeholder::Facts => "facts",
            Placeholder::Responses => "responses",
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

/// Which behavior field a template fills, and therefore which placeholders it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    PreInit,
    PreContext,
    PreMapping,
    PostInit,
    PostContext,
    PostMapping,
    PostSummarize,
}

impl TemplateKind {
    pub fn allowed(self) -> &'static [Placeholder] {
        use Placeholder::*;
        match self {
            TemplateKind::PreInit | TemplateKind::PostInit => &[],
            TemplateKind::PreContext | TemplateKind::PostContext => &[Context],
            TemplateKind::PreMapping => &[Instructions, Atom, Input],
            TemplateKind::PostMapping => &[Atom, Instructions, Facts],
            TemplateKind::PostSummarize => &[Responses],
        }
    }

    /// `(section, field)` in the behavior file.
    pub fn location(self) -> (&'static str, &'static str) {
        match self {
            TemplateKind::PreInit => ("preprocessing", "init"),
            TemplateKind::PreContext => ("preprocessing", "context"),
            TemplateKind::PreMapping => ("preprocessing", "mapping"),
            TemplateKind::PostInit => ("postprocessing", "init"),
            TemplateKind::PostContext => ("postprocessing", "context"),
            TemplateKind::PostMapping => ("postprocessing", "mapping"),
            TemplateKind::PostSummarize => ("postprocessing", "summarize"),
        }
    }
}

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    kind: TemplateKind,
    text: String,
}

impl Template {
    /// Validate `text` against the placeholders allowed for `kind`.
    pub fn parse(kind: TemplateKind, text: impl Into<String>) -> ConfigResult<Self> {
        let text = text.into();
        let allowed = kind.allowed();
        for caps in RE_PLACEHOLDER.captures_iter(&text) {
            let Some(name) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if !allowed.iter().any(|p| p.name() == name) {
                let (section, field) = kind.location();
                let allowed = if allowed.is_empty() {
                    "no placeholders".to_string()
                } else {
                    allowed
                        .iter()
                        .map(|p| p.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                return Err(ConfigError::UnknownPlaceholder {
                    section: section.into(),
                    field: field.into(),
                    placeholder: name.into(),
                    allowed,
                });
            }
        }
        Ok(Self { kind, text })
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Placeholders this template actually references, in first-use order.
    pub fn placeholders(&self) -> Vec<Placeholder> {
        let mut used = Vec::new();
        for caps in RE_PLACEHOLDER.captures_iter(&self.text) {
            let Some(name) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if let Some(p) = self.kind.allowed().iter().copied().find(|p| p.name() == name) {
                if !used.contains(&p) {
                    used.push(p);
                }
            }
        }
        used
    }

    /// Substitute `bindings` into the template.
    pub fn render(&self, bindings: &[(Placeholder, &str)]) -> TemplateResult<String> {
        render(&self.text, bindings)
    }
}

/// Single-pass substitution of `{name}` placeholders.
///
/// Placeholders without a binding fail with [`TemplateError::Unbound`];
/// bindings the text never references are ignored. Doubled braces collapse
/// to one.
pub fn render(template: &str, bindings: &[(Placeholder, &str)]) -> TemplateResult<String> {
    let mut unbound = None;
    let out = RE_PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let Some(name) = caps.get(1).map(|m| m.as_str()) else {
            return caps[0][..1].to_string();
        };
        match bindings.iter().find(|(p, _)| p.name() == name) {
            Some((_, value)) => (*value).to_string(),
            None => {
                if unbound.is_none() {
                    unbound = Some(name.to_string());
                }
                caps[0].to_string()
            }
        }
    });
    match unbound {
        Some(placeholder) => Err(TemplateError::Unbound { placeholder }),
        None => Ok(out.into_owned()),
    }
}
