// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # llm-asp
//!
//! Answers natural-language requests by pairing a language model with an
//! answer-set solver. The model translates the request into facts, the
//! solver reasons over them together with a fixed knowledge base, and the
//! model narrates the resulting answer set back in plain language.
//!
//! ## Architecture
//!
//! - **Configuration** (`config`): application files (predicates, knowledge
//!   base, database), behavior templates, runtime settings
//! - **Model gateway** (`llm`): chat-completion contract plus an
//!   OpenAI-compatible client
//! - **Solver gateway** (`solver`): time-bounded solve with wait/cancel/wait,
//!   backed by `clingo`
//! - **Translation** (`translate`): natural language → facts → program, and
//!   answer set → natural language
//! - **Orchestration** (`pipeline`): one turn end to end, best-effort, with a
//!   verbose trace
//!
//! ## Library usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use llm_asp::config::{Settings, YamlFileProvider};
//! use llm_asp::llm::OpenAiClient;
//! use llm_asp::pipeline::{Pipeline, TurnOptions};
//! use llm_asp::solver::ClingoSolver;
//!
//! let settings = Settings::default();
//! let pipeline = Pipeline::from_files(
//!     &YamlFileProvider,
//!     Path::new("specifications/application_marketplace.yml"),
//!     Path::new("specifications/behavior_translator_v2.yml"),
//!     OpenAiClient::new(&settings.llm),
//!     ClingoSolver::new(settings.solver),
//! )
//! .unwrap();
//!
//! let answer = pipeline.run("A dessert with apples, please.", &TurnOptions::default());
//! println!("{}", answer.unwrap_or_default());
//! ```

pub mod config;
pub mod demo;
pub mod error;
pub mod fact;
pub mod llm;
pub mod message;
pub mod pipeline;
pub mod solver;
pub mod template;
pub mod translate;
