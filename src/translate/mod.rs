//! Translation between natural language and facts.
//!
//! [`Translator`] borrows the loaded configuration and a model gateway for
//! the duration of one turn. The forward direction ([`Translator::natural_to_asp`])
//! asks the model for facts and assembles the solver program; the backward
//! direction ([`Translator::asp_to_natural`]) narrates an answer set one
//! predicate group at a time and summarizes the narrations.
//!
//! Every model call is issued sequentially, in configuration order.

pub mod backward;
pub mod forward;

pub use backward::BackwardTranslation;
pub use forward::ForwardTranslation;

use crate::config::{ApplicationConfig, Behavior, Section};
use crate::error::{PipelineError, PipelineResult};
use crate::llm::LlmGateway;
use crate::template::{Placeholder, Template};

/// Everything a translation needs, borrowed for one turn.
#[derive(Clone, Copy)]
pub struct Translator<'a> {
    pub application: &'a ApplicationConfig,
    pub behavior: &'a Behavior,
    pub llm: &'a dyn LlmGateway,
}

impl<'a> Translator<'a> {
    pub fn new(
        application: &'a ApplicationConfig,
        behavior: &'a Behavior,
        llm: &'a dyn LlmGateway,
    ) -> Self {
        Self {
            application,
            behavior,
            llm,
        }
    }
}

/// Fill `template` with the application context stored under `_` in `section`.
fn resolve_context(section: &Section, name: &str, template: &Template) -> PipelineResult<String> {
    let context = section
        .context()
        .ok_or_else(|| PipelineError::PropertyNotFound {
            section: name.into(),
            key: crate::config::CONTEXT_KEY.into(),
        })?;
    Ok(template.render(&[(Placeholder::Context, context)])?)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    use crate::config::{ApplicationConfig, Behavior, InMemoryProvider};
    use crate::llm::{CallOptions, Completion, LlmError, LlmGateway, LlmResult};
    use crate::message::Query;

    pub const BEHAVIOR: &str = r#"
preprocessing:
  init: "You translate text into facts."
  context: "Context: {context}"
  mapping: "{instructions} Format: {atom}. Text: {input}"
postprocessing:
  init: "You explain facts."
  context: "Context: {context}"
  mapping: "{atom}: {instructions}\n{facts}"
  summarize: "Summarize:\n{responses}"
"#;

    pub fn load(application: &str) -> (ApplicationConfig, Behavior) {
        let provider = InMemoryProvider::new()
            .with("app.yml", application)
            .with("behavior.yml", BEHAVIOR);
        (
            ApplicationConfig::load(&provider, Path::new("app.yml")).unwrap(),
            Behavior::load(&provider, Path::new("behavior.yml")).unwrap(),
        )
    }

    /// Replies from a script, recording every query it receives.
    #[derive(Default)]
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        pub queries: Mutex<Vec<Query>>,
    }

    impl ScriptedLlm {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    impl LlmGateway for ScriptedLlm {
        fn call(&self, query: &Query, _options: &CallOptions) -> LlmResult<Completion> {
            self.queries.lock().unwrap().push(query.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .map(Completion::new)
                .ok_or(LlmError::EmptyResponse)
        }

        fn call_stream(&self, query: &Query, options: &CallOptions) -> LlmResult<String> {
            self.call(query, options).map(|c| c.text)
        }
    }
}
