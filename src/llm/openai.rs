//! Blocking client for OpenAI-compatible chat-completion endpoints
//! (OpenAI, Ollama's `/v1`, vLLM, llama.cpp server, ...).

use std::io::BufRead;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{CallOptions, Completion, LlmError, LlmGateway, LlmResult, Usage};
use crate::config::LlmSettings;
use crate::message::Query;

/// Upper bound for the pause between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Pause before the first retry; doubled on each further attempt.
const BASE_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a Query,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Chat-completion client over `ureq`.
pub struct OpenAiClient {
    agent: ureq::Agent,
    base_url: String,
    model: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.timeout())
            .build();
        Self {
            agent,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            max_retries: settings.max_retries,
        }
    }

    /// Get the model name being used.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// POST the request, retrying connection failures, 429 and 5xx.
    fn send(&self, body: &str) -> LlmResult<ureq::Response> {
        let url = self.endpoint();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = self
                .agent
                .post(&url)
                .set("Content-Type", "application/json")
                .set("Authorization", &format!("Bearer {}", self.api_key))
                .send_string(body);

            let retryable = match result {
                Ok(resp) => return Ok(resp),
                Err(ureq::Error::Status(status, resp)) => {
                    let message = error_message(&resp.into_string().unwrap_or_default());
                    let err = LlmError::Status { status, message };
                    if status != 429 && status < 500 {
                        return Err(err);
                    }
                    err
                }
                Err(ureq::Error::Transport(t)) => LlmError::Transport {
                    url: url.clone(),
                    attempts: attempt,
                    message: t.to_string(),
                },
            };

            if attempt > self.max_retries {
                return Err(retryable);
            }
            let backoff = backoff_for(attempt);
            tracing::warn!(
                attempt,
                max_retries = self.max_retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %retryable,
                "model request failed, retrying"
            );
            std::thread::sleep(backoff);
        }
    }

    fn request_body(&self, query: &Query, options: &CallOptions, stream: bool) -> LlmResult<String> {
        let req = ChatRequest {
            model: &self.model,
            temperature: options.temperature,
            messages: query,
            max_tokens: options.max_tokens,
            stream,
        };
        serde_json::to_string(&req).map_err(|e| LlmError::Parse {
            message: format!("JSON serialize error: {e}"),
        })
    }
}

impl LlmGateway for OpenAiClient {
    fn call(&self, query: &Query, options: &CallOptions) -> LlmResult<Completion> {
        let body = self.request_body(query, options, false)?;
        tracing::debug!(model = %self.model, messages = query.len(), "chat completion request");

        let resp = self.send(&body)?;
        let resp_str = resp.into_string().map_err(|e| LlmError::Parse {
            message: e.to_string(),
        })?;
        parse_completion(&resp_str)
    }

    fn call_stream(&self, query: &Query, options: &CallOptions) -> LlmResult<String> {
        let body = self.request_body(query, options, true)?;
        tracing::debug!(model = %self.model, messages = query.len(), "streaming chat request");

        let resp = self.send(&body)?;
        first_stream_chunk(std::io::BufReader::new(resp.into_reader()))
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

fn backoff_for(attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(8);
    (BASE_BACKOFF * factor).min(MAX_BACKOFF)
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(api) => api.error.message,
        Err(_) if body.trim().is_empty() => "no response body".into(),
        Err(_) => body.trim().to_string(),
    }
}

fn parse_completion(body: &str) -> LlmResult<Completion> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| LlmError::Parse {
        message: e.to_string(),
    })?;
    let choice = parsed.choices.into_iter().next().ok_or(LlmError::EmptyResponse)?;
    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        usage: parsed.usage,
    })
}

/// Read server-sent events until the first non-empty content delta.
fn first_stream_chunk(reader: impl BufRead) -> LlmResult<String> {
    for line in reader.lines() {
        let line = line.map_err(|e| LlmError::Parse {
            message: e.to_string(),
        })?;
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }
        let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| LlmError::Parse {
            message: format!("bad stream chunk: {e}"),
        })?;
        if let Some(content) = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
        {
            return Ok(content);
        }
    }
    Ok(String::new())
}
