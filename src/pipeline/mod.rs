//! Pipeline orchestrator: one user turn end to end.
//!
//! A turn moves through fixed stages:
//!
//! ```text
//! Init → TranslatingForward → Solving ─┬─ NoModel ─────────────────┬→ Done
//!                                      └─ TranslatingBackward ─────┘
//! ```
//!
//! and ends in `Failed` if any stage errors. [`Pipeline::try_run`] exposes
//! the outcome; [`Pipeline::run`] is the best-effort form used by sessions:
//! a failed turn is logged, traced when verbose, and yields `None` so the
//! caller can move on to the next turn.

pub mod trace;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use miette::Diagnostic;

use crate::config::{ApplicationConfig, Behavior, ConfigProvider};
use crate::error::{ConfigResult, PipelineError, PipelineResult};
use crate::fact::Fact;
use crate::llm::{CallOptions, LlmGateway, Usage};
use crate::message::Query;
use crate::solver::{SolveOptions, Solver};
use crate::translate::Translator;

pub use trace::{JsonSink, NullSink, StdoutSink, TraceEvent, TraceSink, VecSink};

/// Stage of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Init,
    TranslatingForward,
    Solving,
    NoModel,
    TranslatingBackward,
    Done,
    Failed,
}

/// Per-turn switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOptions {
    /// One combined extraction query instead of one per predicate.
    pub single_pass: bool,
    /// Prefix every narration query with the forward queries of the session.
    pub use_history: bool,
    /// Emit the turn trace to the pipeline's sink.
    pub verbose: bool,
    /// Completion cap for extraction queries.
    pub max_tokens: Option<u32>,
}

/// How a turn that did not fail ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The solver found a model and it was narrated.
    Answered {
        facts: String,
        program: String,
        answer_set: Vec<Fact>,
        interrupted: bool,
        satisfiable: Option<bool>,
        response: String,
        usage: Option<Usage>,
        queries: Vec<Query>,
    },
    /// The solver produced no model; nothing was narrated.
    NoModel {
        facts: String,
        program: String,
        interrupted: bool,
        satisfiable: Option<bool>,
        queries: Vec<Query>,
    },
}

impl TurnOutcome {
    /// The final answer, if the turn produced one.
    pub fn response(&self) -> Option<&str> {
        match self {
            TurnOutcome::Answered { response, .. } => Some(response.as_str()),
            TurnOutcome::NoModel { .. } => None,
        }
    }

    /// Program text the solver received.
    pub fn program(&self) -> &str {
        match self {
            TurnOutcome::Answered { program, .. } | TurnOutcome::NoModel { program, .. } => {
                program.as_str()
            }
        }
    }

    /// Forward queries of the turn, each ending with the extracted facts.
    pub fn queries(&self) -> &[Query] {
        match self {
            TurnOutcome::Answered { queries, .. } | TurnOutcome::NoModel { queries, .. } => {
                queries.as_slice()
            }
        }
    }

    pub fn into_response(self) -> Option<String> {
        match self {
            TurnOutcome::Answered { response, .. } => Some(response),
            TurnOutcome::NoModel { .. } => None,
        }
    }
}

/// Natural language → facts → solver → natural language.
///
/// Configuration and behavior are fixed at construction; gateways are owned
/// and called strictly one at a time.
pub struct Pipeline {
    application: ApplicationConfig,
    behavior: Behavior,
    llm: Box<dyn LlmGateway>,
    solver: Box<dyn Solver>,
    sink: Arc<dyn TraceSink>,
    solve_options: SolveOptions,
    temperature: f32,
}

impl Pipeline {
    pub fn new(
        application: ApplicationConfig,
        behavior: Behavior,
        llm: impl LlmGateway + 'static,
        solver: impl Solver + 'static,
    ) -> Self {
        Self {
            application,
            behavior,
            llm: Box::new(llm),
            solver: Box::new(solver),
            sink: Arc::new(StdoutSink),
            solve_options: SolveOptions::default(),
            temperature: 0.0,
        }
    }

    /// Load both documents through `provider`, then build the pipeline.
    ///
    /// Fails before any gateway is touched if either document is invalid.
    pub fn from_files(
        provider: &dyn ConfigProvider,
        application_path: &Path,
        behavior_path: &Path,
        llm: impl LlmGateway + 'static,
        solver: impl Solver + 'static,
    ) -> ConfigResult<Self> {
        let application = ApplicationConfig::load(provider, application_path)?;
        let behavior = Behavior::load(provider, behavior_path)?;
        Ok(Self::new(application, behavior, llm, solver))
    }

    /// Send verbose traces to `sink` instead of stdout.
    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Solve budget and extra engine flags for every turn.
    pub fn with_solve_options(mut self, options: SolveOptions) -> Self {
        self.solve_options = options;
        self
    }

    pub fn with_solver_timeout(mut self, timeout: Duration) -> Self {
        self.solve_options.timeout = timeout;
        self
    }

    /// Sampling temperature for every model call.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn application(&self) -> &ApplicationConfig {
        &self.application
    }

    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    fn translator(&self) -> Translator<'_> {
        Translator::new(&self.application, &self.behavior, self.llm.as_ref())
    }

    /// Run one turn, best effort: failures and turns without a model yield `None`.
    pub fn run(&self, input: &str, options: &TurnOptions) -> Option<String> {
        self.run_with_history(input, options, &[])
    }

    /// Run one turn and report its outcome or the error that stopped it.
    pub fn try_run(&self, input: &str, options: &TurnOptions) -> PipelineResult<TurnOutcome> {
        self.try_run_with_history(input, options, &[])
    }

    /// [`Pipeline::run`] with earlier forward queries available to narration.
    pub fn run_with_history(
        &self,
        input: &str,
        options: &TurnOptions,
        history: &[Query],
    ) -> Option<String> {
        match self.try_run_with_history(input, options, history) {
            Ok(outcome) => outcome.into_response(),
            Err(e) => {
                self.report_failure(&e, options);
                None
            }
        }
    }

    /// [`Pipeline::try_run`] with earlier forward queries available to narration.
    ///
    /// With `use_history` set, narration queries are prefixed with `history`
    /// followed by this turn's own forward queries.
    pub fn try_run_with_history(
        &self,
        input: &str,
        options: &TurnOptions,
        history: &[Query],
    ) -> PipelineResult<TurnOutcome> {
        let started = Instant::now();
        stage(TurnStage::Init);
        let translator = self.translator();
        let base = CallOptions {
            temperature: self.temperature,
            max_tokens: None,
        };
        self.trace(options, || TraceEvent::Input { text: input.into() });

        stage(TurnStage::TranslatingForward);
        let forward = translator.natural_to_asp(
            input,
            options.single_pass,
            &CallOptions {
                max_tokens: options.max_tokens,
                ..base
            },
        )?;
        self.trace(options, || TraceEvent::ExtractedFacts {
            facts: forward.facts_text.clone(),
        });
        self.trace(options, || TraceEvent::Program {
            text: forward.program.clone(),
        });

        stage(TurnStage::Solving);
        let solved = self.solver.solve(&forward.program, &self.solve_options)?;

        if solved.facts.is_empty() {
            stage(TurnStage::NoModel);
            tracing::info!(
                interrupted = solved.interrupted,
                satisfiable = ?solved.satisfiable,
                "no answer set, skipping narration"
            );
            self.trace(options, || TraceEvent::NoAnswerSet {
                interrupted: solved.interrupted,
                satisfiable: solved.satisfiable,
            });
            self.trace(options, || TraceEvent::Output { text: None });
            stage(TurnStage::Done);
            return Ok(TurnOutcome::NoModel {
                facts: forward.facts_text,
                program: forward.program,
                interrupted: solved.interrupted,
                satisfiable: solved.satisfiable,
                queries: forward.queries,
            });
        }
        self.trace(options, || TraceEvent::AnswerSet {
            facts: solved.facts.clone(),
            interrupted: solved.interrupted,
            satisfiable: solved.satisfiable,
        });

        stage(TurnStage::TranslatingBackward);
        let backward = if options.use_history {
            let mut threaded = history.to_vec();
            threaded.extend(forward.queries.iter().cloned());
            translator.asp_to_natural(&solved.facts, &threaded, true, &base)?
        } else {
            translator.asp_to_natural(&solved.facts, &[], false, &base)?
        };
        self.trace(options, || TraceEvent::Output {
            text: Some(backward.response.clone()),
        });

        stage(TurnStage::Done);
        tracing::info!(
            facts = forward.facts.len(),
            answer_set = solved.facts.len(),
            interrupted = solved.interrupted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn answered"
        );
        Ok(TurnOutcome::Answered {
            facts: forward.facts_text,
            program: forward.program,
            answer_set: solved.facts,
            interrupted: solved.interrupted,
            satisfiable: solved.satisfiable,
            response: backward.response,
            usage: backward.usage,
            queries: forward.queries,
        })
    }

    fn trace(&self, options: &TurnOptions, event: impl FnOnce() -> TraceEvent) {
        if options.verbose {
            self.sink.emit(&event());
        }
    }

    fn report_failure(&self, error: &PipelineError, options: &TurnOptions) {
        stage(TurnStage::Failed);
        tracing::error!(error = %error, "turn failed");
        self.trace(options, || TraceEvent::Error {
            code: error.code().map(|c| c.to_string()),
            message: error.to_string(),
        });
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("preprocessing", &self.application.preprocessing.entries().len())
            .field("postprocessing", &self.application.postprocessing.entries().len())
            .field("solve_options", &self.solve_options)
            .field("temperature", &self.temperature)
            .finish()
    }
}

fn stage(stage: TurnStage) {
    tracing::debug!(?stage, "turn stage");
}

/// A conversation over one pipeline.
///
/// Forward queries accumulate across turns so that, with
/// [`TurnOptions::use_history`], narration can see what was asked before.
#[derive(Debug)]
pub struct Session<'p> {
    pipeline: &'p Pipeline,
    history: Vec<Query>,
}

impl<'p> Session<'p> {
    pub fn new(pipeline: &'p Pipeline) -> Self {
        Self {
            pipeline,
            history: Vec::new(),
        }
    }

    /// Best-effort turn; see [`Pipeline::run`].
    pub fn run(&mut self, input: &str, options: &TurnOptions) -> Option<String> {
        match self.try_run(input, options) {
            Ok(outcome) => outcome.into_response(),
            Err(e) => {
                self.pipeline.report_failure(&e, options);
                None
            }
        }
    }

    /// One turn; its forward queries join the history unless it fails.
    pub fn try_run(&mut self, input: &str, options: &TurnOptions) -> PipelineResult<TurnOutcome> {
        let outcome = self
            .pipeline
            .try_run_with_history(input, options, &self.history)?;
        self.history.extend(outcome.queries().iter().cloned());
        Ok(outcome)
    }

    pub fn history(&self) -> &[Query] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{SolveResult, SolverError, SolverResult};
    use crate::translate::testing::{load, ScriptedLlm};

    const APP: &str = r#"
preprocessing:
  - _: "ctx"
  - "item(Name)": "extract items"
postprocessing:
  - _: "shop"
  - "item(Name)": "list items"
knowledge_base: ""
"#;

    struct Echo;

    impl Solver for Echo {
        fn solve(&self, program: &str, _: &SolveOptions) -> SolverResult<SolveResult> {
            Ok(SolveResult {
                facts: crate::fact::extract_facts(program),
                interrupted: false,
                satisfiable: Some(true),
            })
        }
    }

    struct Broken;

    impl Solver for Broken {
        fn solve(&self, _: &str, _: &SolveOptions) -> SolverResult<SolveResult> {
            Err(SolverError::Grounding {
                code: 65,
                message: "parsing failed".into(),
            })
        }
    }

    fn pipeline(llm: Arc<ScriptedLlm>, solver: impl Solver + 'static) -> Pipeline {
        let (app, behavior) = load(APP);
        Pipeline::new(app, behavior, llm, solver).with_sink(Arc::new(NullSink))
    }

    #[test]
    fn answered_turn() {
        let llm = Arc::new(ScriptedLlm::new(["item(apples).", "apples listed", "You get apples."]));
        let outcome = pipeline(llm.clone(), Echo)
            .try_run("I want apples", &TurnOptions::default())
            .unwrap();
        assert_eq!(outcome.response(), Some("You get apples."));
        assert_eq!(outcome.queries().len(), 1);
        assert_eq!(llm.calls(), 3);
    }

    #[test]
    fn solver_error_is_best_effort_none() {
        let llm = Arc::new(ScriptedLlm::new(["item(apples)."]));
        let p = pipeline(llm.clone(), Broken);
        assert!(matches!(
            p.try_run("x", &TurnOptions::default()),
            Err(PipelineError::Solver(_))
        ));

        let llm = Arc::new(ScriptedLlm::new(["item(apples)."]));
        assert_eq!(pipeline(llm, Broken).run("x", &TurnOptions::default()), None);
    }

    #[test]
    fn session_threads_history_into_narration() {
        let llm = Arc::new(ScriptedLlm::new([
            "item(apples).",
            "n1",
            "a1",
            "item(pears).",
            "n2",
            "a2",
        ]));
        let p = pipeline(llm.clone(), Echo);
        let mut session = Session::new(&p);
        let opts = TurnOptions {
            use_history: true,
            ..Default::default()
        };

        assert_eq!(session.run("apples", &opts).as_deref(), Some("a1"));
        assert_eq!(session.run("pears", &opts).as_deref(), Some("a2"));
        assert_eq!(session.history().len(), 2);

        // Second narration query: two earlier forward queries (4 messages each) + 3.
        let queries = llm.queries.lock().unwrap().clone();
        assert_eq!(queries[4].len(), 4 + 4 + 3);
    }
}
