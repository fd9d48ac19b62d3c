//! llm-asp CLI: answer a request through a language model and an ASP solver.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use miette::{IntoDiagnostic, Result};

use llm_asp::config::{Settings, YamlFileProvider};
use llm_asp::demo;
use llm_asp::error::LlmAspResult;
use llm_asp::llm::OpenAiClient;
use llm_asp::pipeline::{JsonSink, Pipeline, StdoutSink, TraceSink, TurnOptions};
use llm_asp::solver::ClingoSolver;

#[derive(Parser)]
#[command(
    name = "llm-asp",
    version,
    about = "Smooth interaction between a language model and an ASP solver",
    after_help = "Hope you get the best answer!"
)]
struct Cli {
    /// Behavior file (prompt templates).
    behavior_file: Option<PathBuf>,

    /// Application file (predicates, knowledge base, database).
    application_file: Option<PathBuf>,

    /// Run the built-in marketplace example.
    #[arg(short, long)]
    example: bool,

    /// Model name.
    #[arg(short, long)]
    model: String,

    /// Base URL of an OpenAI-compatible endpoint, e.g. http://localhost:11434/v1.
    #[arg(short, long)]
    server: String,

    /// Ask for every predicate in one model call.
    #[arg(long)]
    single_pass: bool,

    /// Let narration see the extraction conversation.
    #[arg(long)]
    use_history: bool,

    /// Print every step of the turn (0 or 1).
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    verbose: u8,

    /// Print the trace as JSON lines instead of text.
    #[arg(long)]
    json: bool,

    /// Runtime settings (TOML).
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    }
    .with_env_overrides();
    settings.llm.model = cli.model.clone();
    settings.llm.base_url = cli.server.clone();

    let llm = OpenAiClient::new(&settings.llm);
    let solver = ClingoSolver::new(settings.solver.clone());
    let sink: Arc<dyn TraceSink> = if cli.json {
        Arc::new(JsonSink)
    } else {
        Arc::new(StdoutSink)
    };

    let pipeline = build_pipeline(&cli, llm, solver)?
        .with_sink(sink)
        .with_solver_timeout(settings.solver.timeout())
        .with_temperature(settings.llm.temperature);

    if cli.example {
        demo::run(&pipeline);
        return Ok(());
    }

    let input = prompt("input: ").into_diagnostic()?;

    let options = TurnOptions {
        single_pass: cli.single_pass,
        use_history: cli.use_history,
        verbose: cli.verbose == 1,
        max_tokens: settings.llm.max_tokens,
    };
    let response = pipeline.run(&input, &options);
    if !options.verbose {
        println!("{}", response.unwrap_or_default());
    }
    Ok(())
}

/// The example pipeline, or one loaded from the two positional files.
fn build_pipeline(cli: &Cli, llm: OpenAiClient, solver: ClingoSolver) -> LlmAspResult<Pipeline> {
    if cli.example {
        return Ok(demo::pipeline(llm, solver)?);
    }
    let (Some(behavior), Some(application)) = (&cli.behavior_file, &cli.application_file) else {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "behavior_file and application_file are required if --example is not set",
            )
            .exit();
    };
    Ok(Pipeline::from_files(&YamlFileProvider, application, behavior, llm, solver)?)
}

fn prompt(label: &str) -> std::io::Result<String> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{label}")?;
    stdout.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
