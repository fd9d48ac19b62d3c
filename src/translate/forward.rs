//! Natural language → facts → solver program.

use super::{resolve_context, Translator};
use crate::error::{PipelineError, PipelineResult};
use crate::fact::{extract_facts, join_facts, Fact};
use crate::llm::{CallOptions, Usage};
use crate::message::{Message, Query};
use crate::template::Placeholder;

/// Result of the forward translation of one user input.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardTranslation {
    /// Every extracted fact, in query order.
    pub facts: Vec<Fact>,
    /// `facts` joined one per line.
    pub facts_text: String,
    /// Facts, database and knowledge base, ready for the solver.
    pub program: String,
    /// The queries issued, each ending with the facts extracted from its reply.
    pub queries: Vec<Query>,
    /// Usage reported for the last call.
    pub usage: Option<Usage>,
}

impl Translator<'_> {
    /// Build the extraction queries for `input` without sending them.
    ///
    /// Per-predicate mode yields one query per non-context entry of
    /// `preprocessing`, in file order. Single-pass mode yields exactly one
    /// query naming every predicate at once.
    pub fn forward_queries(&self, input: &str, single_pass: bool) -> PipelineResult<Vec<Query>> {
        let templates = &self.behavior.preprocessing;
        let section = &self.application.preprocessing;
        let context = resolve_context(section, "preprocessing", &templates.context)?;

        let query = |atom: &str, instructions: &str| -> PipelineResult<Query> {
            let mapping = templates.mapping.render(&[
                (Placeholder::Instructions, instructions),
                (Placeholder::Atom, atom),
                (Placeholder::Input, input),
            ])?;
            Ok(Query::new()
                .with(Message::system(templates.init.as_str()))
                .with(Message::system(context.as_str()))
                .with(Message::user(mapping)))
        };

        if single_pass {
            let (atoms, instructions): (Vec<&str>, Vec<&str>) = section
                .predicates()
                .map(|e| (e.key.as_str(), e.instructions.as_str()))
                .unzip();
            if atoms.is_empty() {
                return Err(PipelineError::NoPredicates);
            }
            return Ok(vec![query(&atoms.join(" "), &instructions.concat())?]);
        }

        section
            .predicates()
            .map(|e| query(&e.key, &e.instructions))
            .collect()
    }

    /// Ask the model for facts describing `input` and assemble the program.
    pub fn natural_to_asp(
        &self,
        input: &str,
        single_pass: bool,
        options: &CallOptions,
    ) -> PipelineResult<ForwardTranslation> {
        let mut queries = self.forward_queries(input, single_pass)?;
        let mut facts = Vec::new();
        let mut usage = None;

        for (idx, query) in queries.iter_mut().enumerate() {
            let completion = self.llm.call(query, options)?;
            let extracted = extract_facts(&completion.text);
            tracing::debug!(
                query = idx,
                reply_bytes = completion.text.len(),
                extracted = extracted.len(),
                "forward query answered"
            );
            query.push(Message::assistant(join_facts(&extracted)));
            facts.extend(extracted);
            usage = completion.usage;
        }

        let facts_text = join_facts(&facts);
        let program = format!(
            "{facts_text}\n{}\n{}",
            self.application.database, self.application.knowledge_base
        );

        Ok(ForwardTranslation {
            facts,
            facts_text,
            program,
            queries,
            usage,
        })
    }
}
