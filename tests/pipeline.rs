//! End-to-end pipeline tests with mock gateways.
//!
//! The model and the solver are replaced by recording fakes so that every
//! call the pipeline makes can be counted and inspected.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use llm_asp::config::{ApplicationConfig, Behavior, InMemoryProvider, YamlFileProvider};
use llm_asp::error::{ConfigError, LlmAspError, PipelineError};
use llm_asp::fact::Fact;
use llm_asp::llm::{CallOptions, Completion, LlmError, LlmGateway, LlmResult};
use llm_asp::message::{Query, Role};
use llm_asp::pipeline::{NullSink, Pipeline, TraceEvent, TurnOptions, TurnOutcome, VecSink};
use llm_asp::solver::{SolveOptions, SolveResult, Solver, SolverResult};

const BEHAVIOR: &str = r#"
preprocessing:
  init: "Translate text into facts."
  context: "Context: {context}"
  mapping: "{instructions} Answer as {atom}. Input: {input}"
postprocessing:
  init: "Explain facts."
  context: "Context: {context}"
  mapping: "{atom} means {instructions}.\n{facts}"
  summarize: "Summarize:\n{responses}"
"#;

const APPLICATION: &str = r#"
preprocessing:
  - _: "ctx"
  - "item(Name)": "extract items"
postprocessing:
  - _: "shop"
  - "item(Name)": "an item in the basket"
  - "foo(X)": "foo things"
  - "bar(X)": "bar things"
knowledge_base: |
  basket(X) :- item(X).
"#;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockLlm {
    replies: Mutex<VecDeque<LlmResult<String>>>,
    queries: Mutex<Vec<Query>>,
}

impl MockLlm {
    fn replying<const N: usize>(replies: [&str; N]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([Err(LlmError::Transport {
                url: "http://localhost:11434/v1/chat/completions".into(),
                attempts: 5,
                message: "connection refused".into(),
            })])),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    fn query(&self, idx: usize) -> Query {
        self.queries.lock().unwrap()[idx].clone()
    }
}

impl LlmGateway for MockLlm {
    fn call(&self, query: &Query, _options: &CallOptions) -> LlmResult<Completion> {
        self.queries.lock().unwrap().push(query.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => reply.map(Completion::new),
            None => Err(LlmError::EmptyResponse),
        }
    }

    fn call_stream(&self, query: &Query, options: &CallOptions) -> LlmResult<String> {
        self.call(query, options).map(|c| c.text)
    }
}

struct MockSolver {
    facts: Vec<Fact>,
    calls: AtomicUsize,
    programs: Mutex<Vec<String>>,
}

impl MockSolver {
    fn returning(facts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            facts: facts.iter().map(|f| Fact::new(*f)).collect(),
            calls: AtomicUsize::new(0),
            programs: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Solver for MockSolver {
    fn solve(&self, program: &str, _options: &SolveOptions) -> SolverResult<SolveResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.programs.lock().unwrap().push(program.to_string());
        Ok(SolveResult {
            facts: self.facts.clone(),
            interrupted: false,
            satisfiable: Some(!self.facts.is_empty()),
        })
    }
}

fn provider(application: &str) -> InMemoryProvider {
    InMemoryProvider::new()
        .with("app.yml", application)
        .with("behavior.yml", BEHAVIOR)
}

fn build(application: &str, llm: Arc<MockLlm>, solver: Arc<MockSolver>) -> Pipeline {
    Pipeline::from_files(
        &provider(application),
        Path::new("app.yml"),
        Path::new("behavior.yml"),
        llm,
        solver,
    )
    .unwrap()
    .with_sink(Arc::new(NullSink))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn round_trip_apples() {
    let llm = MockLlm::replying(["item(apples).", "Apples are in your basket.", "You get apples."]);
    let solver = MockSolver::returning(&["item(apples)."]);
    let pipeline = build(APPLICATION, llm.clone(), solver.clone());

    let outcome = pipeline
        .try_run("I want apples", &TurnOptions::default())
        .unwrap();

    let forward = llm.query(0);
    let user = forward.messages().iter().find(|m| m.role == Role::User).unwrap();
    assert!(user.content.contains("extract items"));
    assert!(user.content.contains("apples"));

    match outcome {
        TurnOutcome::Answered {
            facts,
            program,
            answer_set,
            response,
            ..
        } => {
            assert_eq!(facts, "item(apples).");
            assert!(program.starts_with("item(apples).\n"));
            assert!(program.contains("basket(X) :- item(X)."));
            assert_eq!(answer_set, vec![Fact::new("item(apples)")]);
            assert_eq!(response, "You get apples.");
        }
        other => panic!("expected an answer, got {other:?}"),
    }
    assert_eq!(solver.calls(), 1);
    assert_eq!(solver.programs.lock().unwrap()[0], "item(apples).\n\nbasket(X) :- item(X).\n");
}

#[test]
fn empty_answer_set_skips_narration() {
    let llm = MockLlm::replying(["item(apples).", "never", "used"]);
    let solver = MockSolver::returning(&[]);
    let pipeline = build(APPLICATION, llm.clone(), solver.clone());

    assert_eq!(pipeline.run("I want apples", &TurnOptions::default()), None);
    assert_eq!(solver.calls(), 1);
    // Only the forward query reached the model.
    assert_eq!(llm.calls(), 1);

    let llm = MockLlm::replying(["item(apples)."]);
    let outcome = build(APPLICATION, llm, MockSolver::returning(&[]))
        .try_run("I want apples", &TurnOptions::default())
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::NoModel { .. }));
}

#[test]
fn missing_knowledge_base_fails_construction() {
    let llm = MockLlm::replying([]);
    let solver = MockSolver::returning(&["a."]);
    let application = "preprocessing:\n  - _: ctx\npostprocessing:\n  - _: shop\n";

    let err = Pipeline::from_files(
        &provider(application),
        Path::new("app.yml"),
        Path::new("behavior.yml"),
        llm.clone(),
        solver.clone(),
    )
    .unwrap_err();

    assert!(
        matches!(err, ConfigError::MissingSection { ref section, .. } if section == "knowledge_base")
    );
    assert_eq!(llm.calls(), 0);
    assert_eq!(solver.calls(), 0);

    let top: LlmAspError = err.into();
    assert!(matches!(top, LlmAspError::Config(_)));
}

#[test]
fn two_groups_make_three_narration_calls() {
    let llm = MockLlm::replying(["item(x).", "foo narration", "bar narration", "summary"]);
    let solver = MockSolver::returning(&["foo(1).", "bar(a).", "foo(2)."]);
    let pipeline = build(APPLICATION, llm.clone(), solver);

    let answer = pipeline.run("anything", &TurnOptions::default());
    assert_eq!(answer.as_deref(), Some("summary"));

    // One forward call, two per-group calls, one summarization call.
    assert_eq!(llm.calls(), 4);
    assert!(llm.query(1).last().unwrap().content.ends_with("foo(1).\nfoo(2)."));
    assert!(llm.query(2).last().unwrap().content.ends_with("bar(a)."));
    assert_eq!(
        llm.query(3).last().unwrap().content,
        "Summarize:\nfoo narration\nbar narration"
    );
}

#[test]
fn transport_failure_is_best_effort() {
    let llm = MockLlm::failing();
    let solver = MockSolver::returning(&["item(apples)."]);
    let sink = Arc::new(VecSink::new());
    let pipeline = build(APPLICATION, llm, solver.clone()).with_sink(sink.clone());

    let verbose = TurnOptions {
        verbose: true,
        ..Default::default()
    };
    assert_eq!(pipeline.run("I want apples", &verbose), None);
    assert_eq!(solver.calls(), 0);

    let events = sink.events();
    match events.last() {
        Some(TraceEvent::Error { code, message }) => {
            assert_eq!(code.as_deref(), Some("llmasp::llm::transport"));
            assert!(message.contains("connection refused"));
        }
        other => panic!("expected an error event, got {other:?}"),
    }
}

#[test]
fn unknown_answer_set_predicate_fails_turn() {
    let llm = MockLlm::replying(["item(x).", "unused", "unused"]);
    let solver = MockSolver::returning(&["mystery(1)."]);
    let pipeline = build(APPLICATION, llm.clone(), solver);

    let err = pipeline.try_run("x", &TurnOptions::default()).unwrap_err();
    assert!(matches!(err, PipelineError::PropertyNotFound { ref key, .. } if key == "mystery"));
    assert_eq!(llm.calls(), 1);
}

#[test]
fn verbose_trace_follows_call_order() {
    let llm = MockLlm::replying(["item(apples).", "narration", "final answer"]);
    let solver = MockSolver::returning(&["item(apples)."]);
    let sink = Arc::new(VecSink::new());
    let pipeline = build(APPLICATION, llm, solver).with_sink(sink.clone());

    pipeline.run(
        "I want apples",
        &TurnOptions {
            verbose: true,
            ..Default::default()
        },
    );

    let kinds: Vec<&str> = sink
        .events()
        .iter()
        .map(|e| match e {
            TraceEvent::Input { .. } => "input",
            TraceEvent::ExtractedFacts { .. } => "facts",
            TraceEvent::Program { .. } => "program",
            TraceEvent::AnswerSet { .. } => "answer_set",
            TraceEvent::NoAnswerSet { .. } => "no_answer_set",
            TraceEvent::Output { .. } => "output",
            TraceEvent::Error { .. } => "error",
        })
        .collect();
    assert_eq!(kinds, vec!["input", "facts", "program", "answer_set", "output"]);
    assert_eq!(
        sink.events().last(),
        Some(&TraceEvent::Output {
            text: Some("final answer".into())
        })
    );
}

#[test]
fn quiet_turn_emits_nothing() {
    let llm = MockLlm::replying(["item(apples)."]);
    let sink = Arc::new(VecSink::new());
    let pipeline = build(APPLICATION, llm, MockSolver::returning(&[])).with_sink(sink.clone());
    pipeline.run("I want apples", &TurnOptions::default());
    assert!(sink.is_empty());
}

#[test]
fn no_model_trace_reports_absence() {
    let llm = MockLlm::replying(["item(apples)."]);
    let sink = Arc::new(VecSink::new());
    let pipeline = build(APPLICATION, llm, MockSolver::returning(&[])).with_sink(sink.clone());
    pipeline.run(
        "I want apples",
        &TurnOptions {
            verbose: true,
            ..Default::default()
        },
    );
    let events = sink.events();
    assert!(matches!(events[3], TraceEvent::NoAnswerSet { .. }));
    assert_eq!(events[4], TraceEvent::Output { text: None });
}

#[test]
fn use_history_prefixes_forward_conversation() {
    let llm = MockLlm::replying(["item(apples).", "narration", "final"]);
    let solver = MockSolver::returning(&["item(apples)."]);
    let pipeline = build(APPLICATION, llm.clone(), solver);

    pipeline.run(
        "I want apples",
        &TurnOptions {
            use_history: true,
            ..Default::default()
        },
    );

    let narration = llm.query(1);
    // Forward query (system, system, user, assistant) then the narration's own three.
    assert_eq!(narration.len(), 7);
    assert_eq!(narration.messages()[3].role, Role::Assistant);
    assert_eq!(narration.messages()[3].content, "item(apples).");
    // The summarization query never carries history.
    assert_eq!(llm.query(2).len(), 2);
}

#[test]
fn files_on_disk_with_relative_database() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir: PathBuf = tmp.path().join("specs");
    std::fs::create_dir(&dir).unwrap();
    std::fs::write(
        dir.join("app.yml"),
        format!("{APPLICATION}database: db.yml\n"),
    )
    .unwrap();
    std::fs::write(dir.join("db.yml"), "database: |\n  stock(apples).\n").unwrap();
    std::fs::write(dir.join("behavior.yml"), BEHAVIOR).unwrap();

    let app = ApplicationConfig::load(&YamlFileProvider, &dir.join("app.yml")).unwrap();
    assert_eq!(app.database.trim(), "stock(apples).");
    Behavior::load(&YamlFileProvider, &dir.join("behavior.yml")).unwrap();

    let llm = MockLlm::replying(["item(apples).", "n", "done"]);
    let solver = MockSolver::returning(&["item(apples)."]);
    let pipeline = Pipeline::from_files(
        &YamlFileProvider,
        &dir.join("app.yml"),
        &dir.join("behavior.yml"),
        llm,
        solver.clone(),
    )
    .unwrap()
    .with_sink(Arc::new(NullSink));

    assert_eq!(
        pipeline.run("apples", &TurnOptions::default()).as_deref(),
        Some("done")
    );
    assert!(solver.programs.lock().unwrap()[0].contains("stock(apples)."));
}
