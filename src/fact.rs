//! Ground facts and their extraction from free text.
//!
//! A fact is the textual statement `name(args).`. Facts are produced by the
//! model (extracted from its replies) and by the solver (shown atoms of the
//! kept answer set), and grouped by predicate name when narrated back.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::application::predicate_name;

/// An identifier starting with a letter followed by a flat argument list.
static RE_ATOM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z]\w*\([^()]*\)").unwrap());

/// A single ground fact such as `item(apples).`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fact(String);

impl Fact {
    /// Wrap `text`, appending the statement terminator when missing.
    pub fn new(text: impl Into<String>) -> Self {
        let mut text = text.into().trim().to_string();
        if !text.ends_with('.') {
            text.push('.');
        }
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Group key: the text before the first `(`.
    pub fn predicate(&self) -> &str {
        predicate_name(&self.0)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fact {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract every `name(args)` occurrence in `text`, in order of appearance.
///
/// Matches are maximal and never nest; each one becomes a fact by appending
/// the terminator. Running it twice on the same text yields the same facts.
pub fn extract_facts(text: &str) -> Vec<Fact> {
    RE_ATOM
        .find_iter(text)
        .map(|m| Fact(format!("{}.", m.as_str())))
        .collect()
}

/// Join facts one per line.
pub fn join_facts(facts: &[Fact]) -> String {
    facts
        .iter()
        .map(Fact::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Facts sharing one predicate name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactGroup {
    pub predicate: String,
    pub facts: Vec<Fact>,
}

/// Partition `facts` by predicate name.
///
/// Groups appear in order of their first member; members keep input order.
pub fn group_by_predicate(facts: &[Fact]) -> Vec<FactGroup> {
    let mut groups: Vec<FactGroup> = Vec::new();
    for fact in facts {
        let name = fact.predicate();
        match groups.iter_mut().find(|g| g.predicate == name) {
            Some(group) => group.facts.push(fact.clone()),
            None => groups.push(FactGroup {
                predicate: name.to_string(),
                facts: vec![fact.clone()],
            }),
        }
    }
    groups
}
