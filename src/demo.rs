//! Built-in marketplace example (`llm-asp --example`).
//!
//! The three specification files are compiled into the binary and served
//! through an [`InMemoryProvider`] under their usual relative paths, so the
//! example runs from any working directory.

use std::path::Path;

use crate::config::InMemoryProvider;
use crate::error::ConfigResult;
use crate::llm::LlmGateway;
use crate::pipeline::{Pipeline, TurnOptions};
use crate::solver::Solver;

pub const APPLICATION_PATH: &str = "specifications/application_marketplace.yml";
pub const DATABASE_PATH: &str = "specifications/database_marketplace.yml";
pub const BEHAVIOR_PATH: &str = "specifications/behavior_translator_v2.yml";

/// The request the example answers.
pub const USER_INPUT: &str =
    "I would like some cooking ideas for a dessert with apples and for a main plate with meat.";

const APPLICATION: &str = include_str!("../specifications/application_marketplace.yml");
const DATABASE: &str = include_str!("../specifications/database_marketplace.yml");
const BEHAVIOR: &str = include_str!("../specifications/behavior_translator_v2.yml");

/// Provider serving the embedded specification files.
pub fn provider() -> InMemoryProvider {
    InMemoryProvider::new()
        .with(APPLICATION_PATH, APPLICATION)
        .with(DATABASE_PATH, DATABASE)
        .with(BEHAVIOR_PATH, BEHAVIOR)
}

/// A pipeline over the marketplace application.
pub fn pipeline(
    llm: impl LlmGateway + 'static,
    solver: impl Solver + 'static,
) -> ConfigResult<Pipeline> {
    Pipeline::from_files(
        &provider(),
        Path::new(APPLICATION_PATH),
        Path::new(BEHAVIOR_PATH),
        llm,
        solver,
    )
}

/// Answer [`USER_INPUT`] with the full trace sent to the pipeline's sink.
pub fn run(pipeline: &Pipeline) -> Option<String> {
    tracing::info!("running marketplace example");
    pipeline.run(
        USER_INPUT,
        &TurnOptions {
            verbose: true,
            ..Default::default()
        },
    )
}
