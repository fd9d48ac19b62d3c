//! clingo-backed solver.
//!
//! The solver runs as a child process: the program goes in on stdin and the
//! result comes back as clingo's JSON report (`--outf=2`). The process is the
//! independent worker of the solve contract, driven through a
//! [`SolveHandle`]:
//!
//! 1. [`SolveHandle::wait`] blocks for at most the time budget;
//! 2. [`SolveHandle::cancel`] asks the solver to stop (SIGINT, so clingo
//!    still reports the model it holds), a no-op if it already finished;
//! 3. [`SolveHandle::get`] blocks until the process is gone and reads the
//!    final status.
//!
//! [`ClingoSolver::solve`] always runs all three steps in that order.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::{SolveOptions, SolveResult, Solver, SolverError, SolverResult};
use crate::config::{HelperScript, SolverSettings};
use crate::fact::Fact;

/// Interval between two polls of the child process.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// clingo exit-code bit set when the search was interrupted.
const EXIT_INTERRUPTED: i32 = 1;

/// clingo exit codes from here on signal memory, runtime or usage errors.
const EXIT_ERROR_MIN: i32 = 33;

const LUA_HELPERS: &str = "\
#script (lua)
function min(a, b)
    if a < b then return a else return b end
end
#end.
";

const PYTHON_HELPERS: &str = "\
#script (python)
def min(a, b):
    return a if a < b else b
#end.
";

/// Runs programs through the `clingo` executable.
#[derive(Debug, Clone, Default)]
pub struct ClingoSolver {
    settings: SolverSettings,
}

impl ClingoSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Whether the configured executable can be started at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.settings.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Program text as submitted: helper functions first, then `program`.
    pub fn full_program(&self, program: &str) -> String {
        let prelude = match self.settings.helper_script {
            HelperScript::Lua => LUA_HELPERS,
            HelperScript::Python => PYTHON_HELPERS,
            HelperScript::None => "",
        };
        format!("{prelude}{program}\n")
    }

    /// Start solving `program` without waiting for it.
    pub fn start(&self, program: &str, extra_arguments: &[String]) -> SolverResult<SolveHandle> {
        let mut child = Command::new(&self.settings.binary)
            .arg("--outf=2")
            .args(&self.settings.arguments)
            .args(extra_arguments)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SolverError::Spawn {
                binary: self.settings.binary.clone(),
                source: e,
            })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        // Fed from its own thread so a chatty solver cannot deadlock us on a full pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = self.full_program(program);
            std::thread::spawn(move || match stdin.write_all(input.as_bytes()) {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            })
        });

        tracing::debug!(
            binary = %self.settings.binary,
            pid = child.id(),
            program_bytes = program.len(),
            "solver started"
        );

        Ok(SolveHandle {
            child,
            stdout,
            stderr,
            writer,
            status: None,
            timed_out: false,
            killed: false,
            cancel_requested: false,
            cancel_grace: self.settings.cancel_grace(),
        })
    }
}

impl Solver for ClingoSolver {
    fn solve(&self, program: &str, options: &SolveOptions) -> SolverResult<SolveResult> {
        let mut handle = self.start(program, &options.extra_arguments)?;
        let finished = handle.wait(options.timeout)?;
        handle.cancel()?;
        let result = handle.get()?;
        tracing::debug!(
            finished,
            interrupted = result.interrupted,
            satisfiable = ?result.satisfiable,
            facts = result.facts.len(),
            "solver finished"
        );
        Ok(result)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<String>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

/// A running solve.
pub struct SolveHandle {
    child: Child,
    stdout: Option<JoinHandle<std::io::Result<String>>>,
    stderr: Option<JoinHandle<std::io::Result<String>>>,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    status: Option<ExitStatus>,
    timed_out: bool,
    killed: bool,
    cancel_requested: bool,
    cancel_grace: Duration,
}

impl SolveHandle {
    /// Block until the solver finishes or `timeout` elapses.
    ///
    /// Returns `true` if the solver finished within the budget.
    pub fn wait(&mut self, timeout: Duration) -> SolverResult<bool> {
        let deadline = Instant::now() + timeout;
        if self.poll_until(deadline)? {
            return Ok(true);
        }
        self.timed_out = true;
        Ok(false)
    }

    /// Ask the solver to stop searching.
    ///
    /// Safe to call at any point and any number of times; once the process
    /// has exited, or after the first request, it does nothing.
    pub fn cancel(&mut self) -> SolverResult<()> {
        if self.status.is_some() || self.cancel_requested {
            return Ok(());
        }
        self.cancel_requested = true;
        interrupt(&mut self.child)
    }

    /// Block until the process is gone, then read its final report.
    ///
    /// A cancelled solver that has not exited after the grace period is killed.
    /// Its report is then usually cut short; the first model written out in
    /// full is kept and the result counts as interrupted.
    pub fn get(mut self) -> SolverResult<SolveResult> {
        if self.status.is_none() {
            let deadline = Instant::now() + self.cancel_grace;
            if !self.poll_until(deadline)? {
                tracing::warn!(pid = self.child.id(), "solver ignored cancellation, killing it");
                let _ = self.child.kill();
                self.killed = true;
                let status = self.child.wait().map_err(|e| SolverError::Io {
                    message: e.to_string(),
                })?;
                self.status = Some(status);
            }
        }

        if let Some(writer) = self.writer.take() {
            join(writer, "stdin")?;
        }
        let stdout = match self.stdout.take() {
            Some(h) => join(h, "stdout")?,
            None => String::new(),
        };
        let stderr = match self.stderr.take() {
            Some(h) => join(h, "stderr")?,
            None => String::new(),
        };

        let code = self.status.and_then(|s| s.code());
        if let Some(code) = code.filter(|c| *c >= EXIT_ERROR_MIN) {
            return Err(SolverError::Grounding {
                code,
                message: stderr.trim().to_string(),
            });
        }

        let stopped = self.timed_out || self.killed;
        let mut result = match parse_report(&stdout) {
            Ok(result) => result,
            Err(e) if stopped => {
                tracing::warn!(error = %e, "solver report cut short, keeping the first complete model");
                salvage_report(&stdout)
            }
            Err(e) => return Err(e),
        };
        result.interrupted = stopped || code.is_some_and(|c| c & EXIT_INTERRUPTED != 0);
        Ok(result)
    }

    /// Poll the child until it exits or `deadline` passes.
    fn poll_until(&mut self, deadline: Instant) -> SolverResult<bool> {
        loop {
            if self.status.is_some() {
                return Ok(true);
            }
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.status = Some(status);
                    return Ok(true);
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return Ok(false);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(SolverError::Io {
                        message: format!("failed to wait on solver: {e}"),
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for SolveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolveHandle")
            .field("pid", &self.child.id())
            .field("status", &self.status)
            .field("timed_out", &self.timed_out)
            .field("killed", &self.killed)
            .field("cancel_requested", &self.cancel_requested)
            .finish()
    }
}

impl Drop for SolveHandle {
    fn drop(&mut self) {
        if self.status.is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) -> SolverResult<()> {
    // SAFETY: the child has not been reaped (no exit status observed yet),
    // so its PID still refers to our own process.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGINT) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(SolverError::Io {
                message: format!("failed to interrupt solver: {err}"),
            });
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> SolverResult<()> {
    // No SIGINT; the partial model is lost.
    match child.kill() {
        Err(e) if e.kind() != std::io::ErrorKind::InvalidInput => Err(SolverError::Io {
            message: format!("failed to stop solver: {e}"),
        }),
        _ => Ok(()),
    }
}

fn join<T>(handle: JoinHandle<std::io::Result<T>>, pipe: &str) -> SolverResult<T> {
    handle
        .join()
        .map_err(|_| SolverError::Io {
            message: format!("{pipe} worker panicked"),
        })?
        .map_err(|e| SolverError::Io {
            message: format!("{pipe}: {e}"),
        })
}

// ---------------------------------------------------------------------------
// JSON report
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(rename = "Result", default)]
    result: String,
    #[serde(rename = "Call", default)]
    call: Vec<Call>,
}

#[derive(Debug, Deserialize)]
struct Call {
    #[serde(rename = "Witnesses", default)]
    witnesses: Vec<Witness>,
}

#[derive(Debug, Deserialize)]
struct Witness {
    #[serde(rename = "Value", default)]
    value: Vec<String>,
}

/// Interpret a `--outf=2` report. An empty report (solver killed before
/// printing) means no model and unknown satisfiability.
fn parse_report(stdout: &str) -> SolverResult<SolveResult> {
    if stdout.trim().is_empty() {
        return Ok(SolveResult::default());
    }
    let report: Report = serde_json::from_str(stdout).map_err(|e| SolverError::Output {
        message: e.to_string(),
    })?;

    let satisfiable = match report.result.as_str() {
        "SATISFIABLE" | "OPTIMUM FOUND" => Some(true),
        "UNSATISFIABLE" => Some(false),
        _ => None,
    };

    // First model found wins.
    let facts = report
        .call
        .iter()
        .flat_map(|c| c.witnesses.iter())
        .next()
        .map(|w| witness_facts(&w.value))
        .unwrap_or_default();

    Ok(SolveResult {
        facts,
        interrupted: false,
        satisfiable,
    })
}

/// Best reading of a report truncated by a kill: the first `Value` array
/// that was written out in full, satisfiability unknown.
fn salvage_report(stdout: &str) -> SolveResult {
    let facts = stdout
        .match_indices("\"Value\"")
        .find_map(|(at, key)| {
            let rest = stdout[at + key.len()..].trim_start().strip_prefix(':')?;
            serde_json::Deserializer::from_str(rest)
                .into_iter::<Vec<String>>()
                .next()?
                .ok()
        })
        .map(|value| witness_facts(&value))
        .unwrap_or_default();
    SolveResult {
        facts,
        interrupted: true,
        satisfiable: None,
    }
}

fn witness_facts(value: &[String]) -> Vec<Fact> {
    value
        .iter()
        .flat_map(|atom| atom.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Fact::new)
        .collect()
}
