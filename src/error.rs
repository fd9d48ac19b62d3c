//! Rich diagnostic error types for the llm-asp pipeline.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

use crate::llm::LlmError;
use crate::solver::SolverError;

/// Top-level error type for the llm-asp pipeline.
///
/// Construction-time failures arrive as [`ConfigError`]; everything that can
/// go wrong while processing a single turn arrives as [`PipelineError`].
#[derive(Debug, Error, Diagnostic)]
pub enum LlmAspError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),
}

pub type LlmAspResult<T> = std::result::Result<T, LlmAspError>;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read configuration file: {path}")]
    #[diagnostic(
        code(llmasp::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {message}")]
    #[diagnostic(
        code(llmasp::config::parse),
        help("Fix the YAML syntax. Multi-line prompts and programs are easiest as `|` block scalars.")
    )]
    Parse { path: String, message: String },

    #[error("missing required section \"{section}\" in {document}")]
    #[diagnostic(
        code(llmasp::config::missing_section),
        help(
            "An application file needs `preprocessing`, `postprocessing` and `knowledge_base`. \
             A behavior file needs `preprocessing` and `postprocessing`."
        )
    )]
    MissingSection { document: String, section: String },

    #[error("missing required field \"{section}.{field}\" in {document}")]
    #[diagnostic(
        code(llmasp::config::missing_field),
        help(
            "Behavior `preprocessing` needs `init`, `context` and `mapping`; \
             `postprocessing` additionally needs `summarize`. All fields must be strings."
        )
    )]
    MissingField {
        document: String,
        section: String,
        field: String,
    },

    #[error("invalid entry in {document} section \"{section}\": {message}")]
    #[diagnostic(
        code(llmasp::config::invalid_entry),
        help(
            "Each entry must be a single-key mapping from a string to a string, \
             e.g. `- \"item(Name)\": \"extract every item\"`."
        )
    )]
    InvalidEntry {
        document: String,
        section: String,
        message: String,
    },

    #[error("unknown placeholder {{{placeholder}}} in behavior field \"{section}.{field}\"")]
    #[diagnostic(
        code(llmasp::config::unknown_placeholder),
        help("This field accepts only: {allowed}. Check the placeholder name for typos.")
    )]
    UnknownPlaceholder {
        section: String,
        field: String,
        placeholder: String,
        allowed: String,
    },

    #[error("failed to read settings file: {path}")]
    #[diagnostic(
        code(llmasp::config::settings_read),
        help("Ensure the settings file exists, or omit --settings to use defaults.")
    )]
    SettingsRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file: {path}: {message}")]
    #[diagnostic(
        code(llmasp::config::settings_parse),
        help("Check the TOML syntax. Every key is optional; see `Settings` for the defaults.")
    )]
    SettingsParse { path: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Template errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TemplateError {
    #[error("placeholder {{{placeholder}}} has no binding")]
    #[diagnostic(
        code(llmasp::template::unbound),
        help("Every placeholder a template uses must be bound when it is rendered.")
    )]
    Unbound { placeholder: String },
}

pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

// ---------------------------------------------------------------------------
// Pipeline (per-turn) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("property not found in {section} configuration: \"{key}\"")]
    #[diagnostic(
        code(llmasp::pipeline::property_not_found),
        help(
            "Every predicate the model or the solver can produce needs a matching entry, \
             and each section needs a reserved `_` entry holding the application context."
        )
    )]
    PropertyNotFound { section: String, key: String },

    #[error("single-pass translation needs at least one predicate entry in preprocessing")]
    #[diagnostic(
        code(llmasp::pipeline::no_predicates),
        help("Add a predicate entry besides `_`, or run in per-predicate mode.")
    )]
    NoPredicates,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Solver(#[from] SolverError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
