//! Answer set → natural language.

use super::{resolve_context, Translator};
use crate::config::Entry;
use crate::error::{PipelineError, PipelineResult};
use crate::fact::{group_by_predicate, join_facts, Fact, FactGroup};
use crate::llm::{CallOptions, Usage};
use crate::message::{Message, Query};
use crate::template::Placeholder;

/// Result of narrating one answer set.
#[derive(Debug, Clone, PartialEq)]
pub struct BackwardTranslation {
    /// The final answer.
    pub response: String,
    /// One narration per predicate group, in group order.
    pub narrations: Vec<String>,
    /// Usage reported for the summarization call.
    pub usage: Option<Usage>,
}

impl Translator<'_> {
    /// Narrate `facts` and summarize the narrations into one answer.
    ///
    /// Facts are grouped by predicate name; each group gets one query built
    /// from its `postprocessing` entry, optionally prefixed with `history`
    /// flattened into a single conversation. A final query joins the
    /// narrations into the `summarize` template.
    ///
    /// Every group must have a `postprocessing` entry. The lookups happen
    /// before the first model call, so a missing entry costs no tokens.
    pub fn asp_to_natural(
        &self,
        facts: &[Fact],
        history: &[Query],
        use_history: bool,
        options: &CallOptions,
    ) -> PipelineResult<BackwardTranslation> {
        let templates = &self.behavior.postprocessing;
        let section = &self.application.postprocessing;
        let context = resolve_context(section, "postprocessing", &templates.context)?;

        let groups = group_by_predicate(facts);
        let planned = groups
            .iter()
            .map(|group| {
                section
                    .for_predicate(&group.predicate)
                    .map(|entry| (group, entry))
                    .ok_or_else(|| PipelineError::PropertyNotFound {
                        section: "postprocessing".into(),
                        key: group.predicate.clone(),
                    })
            })
            .collect::<PipelineResult<Vec<(&FactGroup, &Entry)>>>()?;

        let prefix = if use_history {
            Query::flatten(history)
        } else {
            Query::new()
        };

        let mut narrations = Vec::with_capacity(planned.len());
        for (group, entry) in planned {
            let facts_text = join_facts(&group.facts);
            let mapping = templates.mapping.render(&[
                (Placeholder::Atom, entry.key.as_str()),
                (Placeholder::Instructions, entry.instructions.as_str()),
                (Placeholder::Facts, facts_text.as_str()),
            ])?;
            let mut query = prefix.clone();
            query.push(Message::system(templates.init.as_str()));
            query.push(Message::system(context.as_str()));
            query.push(Message::user(mapping));

            let completion = self.llm.call(&query, options)?;
            tracing::debug!(
                predicate = %group.predicate,
                facts = group.facts.len(),
                history = prefix.len(),
                "group narrated"
            );
            narrations.push(completion.text);
        }

        let responses = narrations.join("\n");
        let summary = templates
            .summarize
            .render(&[(Placeholder::Responses, responses.as_str())])?;
        let final_query = Query::new()
            .with(Message::system(context))
            .with(Message::user(summary));
        let completion = self.llm.call(&final_query, options)?;

        Ok(BackwardTranslation {
            response: completion.text,
            narrations,
            usage: completion.usage,
        })
    }
}
