//! Language model gateway.
//!
//! The pipeline talks to the model only through [`LlmGateway`]: an ordered
//! [`Query`] goes in, generated text plus usage counters come out. Retries
//! and timeouts belong to the transport behind the trait
//! ([`OpenAiClient`]), never to the callers.

pub mod openai;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Query;

pub use openai::OpenAiClient;

/// Errors from the LLM subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("model endpoint unreachable at {url} after {attempts} attempt(s): {message}")]
    #[diagnostic(
        code(llmasp::llm::transport),
        help("Check that the model server is running and that --server points at its /v1 base URL.")
    )]
    Transport {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("model endpoint returned HTTP {status}: {message}")]
    #[diagnostic(
        code(llmasp::llm::status),
        help("Check the model name and API key. 429 and 5xx responses were retried before giving up.")
    )]
    Status { status: u16, message: String },

    #[error("failed to parse model response: {message}")]
    #[diagnostic(
        code(llmasp::llm::parse_error),
        help("The endpoint did not answer with an OpenAI-compatible chat completion.")
    )]
    Parse { message: String },

    #[error("model response contained no choices")]
    #[diagnostic(
        code(llmasp::llm::empty_response),
        help("The server accepted the request but generated nothing. Try another model.")
    )]
    EmptyResponse,
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Sampling options for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

impl CallOptions {
    pub fn with_max_tokens(max_tokens: Option<u32>) -> Self {
        Self {
            max_tokens,
            ..Default::default()
        }
    }
}

/// Token counters reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// Generated text plus its usage metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Synchronous chat-completion contract.
pub trait LlmGateway: Send + Sync {
    /// Send `query` and wait for the full completion.
    fn call(&self, query: &Query, options: &CallOptions) -> LlmResult<Completion>;

    /// Send `query` in streaming mode and return the first non-empty chunk.
    fn call_stream(&self, query: &Query, options: &CallOptions) -> LlmResult<String>;
}

impl<T: LlmGateway + ?Sized> LlmGateway for Box<T> {
    fn call(&self, query: &Query, options: &CallOptions) -> LlmResult<Completion> {
        (**self).call(query, options)
    }

    fn call_stream(&self, query: &Query, options: &CallOptions) -> LlmResult<String> {
        (**self).call_stream(query, options)
    }
}

impl<T: LlmGateway + ?Sized> LlmGateway for std::sync::Arc<T> {
    fn call(&self, query: &Query, options: &CallOptions) -> LlmResult<Completion> {
        (**self).call(query, options)
    }

    fn call_stream(&self, query: &Query, options: &CallOptions) -> LlmResult<String> {
        (**self).call_stream(query, options)
    }
}
