//! Answer-set solver gateway.
//!
//! The solver is a black box behind [`Solver`]: program text in, the shown
//! atoms of the first model found out, within a caller-chosen time budget.
//! Running out of time is not an error; it is reported through
//! [`SolveResult::interrupted`] alongside whatever model was captured.

pub mod clingo;

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::fact::Fact;

pub use clingo::{ClingoSolver, SolveHandle};

/// Errors from the solver subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum SolverError {
    #[error("failed to start solver \"{binary}\"")]
    #[diagnostic(
        code(llmasp::solver::spawn),
        help("Install clingo (e.g. `pip install clingo` or your package manager) or set `solver.binary`.")
    )]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("solver I/O failed: {message}")]
    #[diagnostic(
        code(llmasp::solver::io),
        help("The solver process could not be driven. Check that it is still running.")
    )]
    Io { message: String },

    #[error("solver rejected the program (exit code {code}): {message}")]
    #[diagnostic(
        code(llmasp::solver::grounding),
        help(
            "The program is malformed or could not be grounded. \
             Check the extracted facts and the knowledge base for syntax errors."
        )
    )]
    Grounding { code: i32, message: String },

    #[error("unreadable solver output: {message}")]
    #[diagnostic(
        code(llmasp::solver::output),
        help("The solver must support JSON output (`--outf=2`).")
    )]
    Output { message: String },
}

pub type SolverResult<T> = std::result::Result<T, SolverError>;

/// Per-call solve parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveOptions {
    /// How long to let the solver search before cancelling it.
    pub timeout: Duration,
    /// Engine flags appended after the configured defaults.
    pub extra_arguments: Vec<String>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            extra_arguments: Vec::new(),
        }
    }
}

impl SolveOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

/// Outcome of one solver invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveResult {
    /// Shown atoms of the first model found, in solver order. Empty when no
    /// model was captured.
    pub facts: Vec<Fact>,
    /// The time budget ran out before the search completed.
    pub interrupted: bool,
    /// `Some(true)` satisfiable, `Some(false)` unsatisfiable, `None` unknown.
    pub satisfiable: Option<bool>,
}

/// Synchronous solve contract.
pub trait Solver: Send + Sync {
    fn solve(&self, program: &str, options: &SolveOptions) -> SolverResult<SolveResult>;
}

impl<T: Solver + ?Sized> Solver for Box<T> {
    fn solve(&self, program: &str, options: &SolveOptions) -> SolverResult<SolveResult> {
        (**self).solve(program, options)
    }
}

impl<T: Solver + ?Sized> Solver for std::sync::Arc<T> {
    fn solve(&self, program: &str, options: &SolveOptions) -> SolverResult<SolveResult> {
        (**self).solve(program, options)
    }
}
