//! Verbose turn trace.
//!
//! When a turn runs verbose, every intermediate artifact is emitted as a
//! [`TraceEvent`] to a [`TraceSink`] supplied by the host: styled lines on
//! the terminal, JSON lines for tooling, or an in-memory collection for
//! tests. The trace is presentation only and never affects control flow.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::fact::Fact;

// ── Event types ─────────────────────────────────────────────────────────

/// One step of a turn, in the order the pipeline reaches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    /// The user text the turn started from.
    Input { text: String },
    /// Facts extracted by the forward translation, one per line.
    ExtractedFacts { facts: String },
    /// Program text handed to the solver.
    Program { text: String },
    /// The model the solver kept.
    AnswerSet {
        facts: Vec<Fact>,
        interrupted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        satisfiable: Option<bool>,
    },
    /// The solver produced no model; narration is skipped.
    NoAnswerSet {
        interrupted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        satisfiable: Option<bool>,
    },
    /// The final answer, absent when none was produced.
    Output { text: Option<String> },
    /// The turn failed.
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },
}

impl TraceEvent {
    /// Plain-text rendering used by [`StdoutSink`].
    pub fn render(&self) -> String {
        match self {
            TraceEvent::Input { text } => format!("input: {text}"),
            TraceEvent::ExtractedFacts { facts } => format!("extracted facts: {facts}"),
            TraceEvent::Program { text } => format!("program:\n{}", text.trim_end()),
            TraceEvent::AnswerSet {
                facts, interrupted, ..
            } => {
                let atoms: Vec<&str> = facts.iter().map(Fact::as_str).collect();
                let mut line = format!("answer set: [{}]", atoms.join(", "));
                if *interrupted {
                    line.push_str(" (interrupted)");
                }
                line
            }
            TraceEvent::NoAnswerSet { interrupted, .. } => {
                if *interrupted {
                    "answer set: not found (interrupted)".to_string()
                } else {
                    "answer set: not found".to_string()
                }
            }
            TraceEvent::Output { text: Some(text) } => format!("output: {text}"),
            TraceEvent::Output { text: None } => "output: not found".to_string(),
            TraceEvent::Error { message, .. } => format!("Error: {message}"),
        }
    }
}

// ── TraceSink trait ─────────────────────────────────────────────────────

/// A destination for trace events.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: &TraceEvent);

    fn emit_batch(&self, events: &[TraceEvent]) {
        for e in events {
            self.emit(e);
        }
    }
}

// ── StdoutSink ──────────────────────────────────────────────────────────

/// Prints each event as a paragraph on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl TraceSink for StdoutSink {
    fn emit(&self, event: &TraceEvent) {
        println!("{}\n", event.render());
    }
}

// ── JsonSink ────────────────────────────────────────────────────────────

/// Prints each event as one JSON line on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSink;

impl TraceSink for JsonSink {
    fn emit(&self, event: &TraceEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            println!("{json}");
        }
    }
}

// ── VecSink ─────────────────────────────────────────────────────────────

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events collected so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl TraceSink for VecSink {
    fn emit(&self, event: &TraceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ── NullSink ────────────────────────────────────────────────────────────

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn emit(&self, _event: &TraceEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_keeps_order() {
        let sink = VecSink::new();
        sink.emit_batch(&[
            TraceEvent::Input { text: "hi".into() },
            TraceEvent::Output { text: None },
        ]);
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TraceEvent::Input { .. }));
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn json_shape_is_tagged() {
        let event = TraceEvent::AnswerSet {
            facts: vec![Fact::new("item(apples)")],
            interrupted: false,
            satisfiable: Some(true),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "answer_set");
        assert_eq!(json["facts"][0], "item(apples).");
        assert_eq!(json["satisfiable"], true);
    }

    #[test]
    fn render_lines() {
        assert_eq!(
            TraceEvent::Input { text: "I want apples".into() }.render(),
            "input: I want apples"
        );
        assert_eq!(
            TraceEvent::NoAnswerSet {
                interrupted: false,
                satisfiable: Some(false)
            }
            .render(),
            "answer set: not found"
        );
        assert_eq!(
            TraceEvent::AnswerSet {
                facts: vec![Fact::new("a(1)"), Fact::new("b")],
                interrupted: true,
                satisfiable: None,
            }
            .render(),
            "answer set: [a(1)., b.] (interrupted)"
        );
        assert_eq!(TraceEvent::Output { text: None }.render(), "output: not found");
    }
}
