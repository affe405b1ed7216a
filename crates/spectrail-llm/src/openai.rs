//! OpenAI-compatible chat-completions client with bounded exponential-backoff retries.
//!
//! Mirrors the shape of the corpus's streaming provider clients (request struct, status-code
//! dispatch, `tracing::debug!`/`error!` around the call) but speaks the non-streaming
//! `stream: false` protocol this workbench requires and never returns a deferred stream.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use spectrail_core::{AssistantTurn, Error, Message, Result, Settings, ToolDefinition};
use tracing::{debug, warn};

use crate::provider::ChatProvider;
use crate::types::{ChatRequest, ChatResponse, ErrorEnvelope, WireMessage, WireTool};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(4);
const TOTAL_ELAPSED_CAP: Duration = Duration::from_secs(30);
const PER_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Speaks `POST {base_url}/chat/completions` against any OpenAI-compatible endpoint.
/// Constructed from a `Settings` snapshot taken once at run start (§9: "do not re-read
/// settings mid-run") — never mutated after construction.
pub struct OpenAiCompatibleProvider {
    client: Client,
    settings: Settings,
}

impl OpenAiCompatibleProvider {
    pub fn new(settings: Settings) -> Result<Self> {
        if settings.api_key.is_empty() {
            return Err(Error::InvalidCredentials);
        }
        let client = Client::builder()
            .timeout(PER_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(Self { client, settings })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, messages: &[Message], tools: &[ToolDefinition]) -> ChatRequest {
        ChatRequest {
            model: self.settings.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.iter().map(WireTool::from).collect())
            },
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        }
    }

    /// One attempt. Returns `Ok(Retry)` for transport/429/5xx failures the caller should
    /// retry, `Ok(Done(turn))` on success, or `Err` for anything terminal.
    async fn attempt(&self, body: &ChatRequest) -> std::result::Result<AssistantTurn, AttemptOutcome> {
        let mut request = self.client.post(self.url()).bearer_auth(&self.settings.api_key);
        request = request.header("Content-Type", "application/json");
        for (key, value) in &self.settings.extra_headers {
            if key.eq_ignore_ascii_case("authorization") {
                continue;
            }
            request = request.header(key, value);
        }

        let response = match request.json(body).send().await {
            Ok(r) => r,
            Err(e) => {
                return Err(if e.is_timeout() {
                    AttemptOutcome::Fatal(Error::Timeout(PER_REQUEST_TIMEOUT))
                } else {
                    AttemptOutcome::Retryable(Error::NetworkError(e.to_string()))
                })
            }
        };

        let status = response.status();
        if status.is_success() {
            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| AttemptOutcome::Fatal(Error::ProviderError {
                    status: status.as_u16(),
                    message: format!("undecodable response body: {e}"),
                }))?;
            let Some(choice) = parsed.choices.into_iter().next() else {
                return Err(AttemptOutcome::Fatal(Error::ProviderError {
                    status: status.as_u16(),
                    message: "response had no choices".to_string(),
                }));
            };
            let tool_calls = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .iter()
                .map(|wc| wc.into())
                .collect();
            return Ok(AssistantTurn { content: choice.message.content, tool_calls });
        }

        let body_text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body_text)
            .map(|e| e.error.message)
            .unwrap_or(body_text);

        match status {
            StatusCode::UNAUTHORIZED => Err(AttemptOutcome::Fatal(Error::InvalidCredentials)),
            StatusCode::BAD_REQUEST
            | StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND
            | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(AttemptOutcome::Fatal(Error::ProviderError { status: status.as_u16(), message }))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(AttemptOutcome::RateLimited),
            s if s.is_server_error() => {
                Err(AttemptOutcome::Retryable(Error::ProviderError { status: status.as_u16(), message }))
            }
            s => Err(AttemptOutcome::Fatal(Error::ProviderError { status: s.as_u16(), message })),
        }
    }
}

enum AttemptOutcome {
    Retryable(Error),
    RateLimited,
    Fatal(Error),
}

#[async_trait::async_trait]
impl ChatProvider for OpenAiCompatibleProvider {
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<AssistantTurn> {
        let body = self.build_request(messages, tools);
        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            debug!(model = %self.settings.model, "sending chat-completions request");
            match self.attempt(&body).await {
                Ok(turn) => return Ok(turn),
                Err(AttemptOutcome::Fatal(err)) => return Err(err),
                Err(AttemptOutcome::RateLimited) => {
                    if started.elapsed() >= TOTAL_ELAPSED_CAP {
                        return Err(Error::RateLimited);
                    }
                    warn!("rate limited, backing off {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(AttemptOutcome::Retryable(err)) => {
                    if started.elapsed() >= TOTAL_ELAPSED_CAP {
                        return Err(err);
                    }
                    warn!(error = %err, "retryable provider error, backing off {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectrail_core::Message;

    fn settings() -> Settings {
        let mut s = Settings::default();
        s.api_key = "sk-test".to_string();
        s
    }

    #[test]
    fn empty_api_key_is_invalid_credentials() {
        let err = OpenAiCompatibleProvider::new(Settings::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }

    #[test]
    fn url_joins_base_and_path() {
        let provider = OpenAiCompatibleProvider::new(settings()).unwrap();
        assert_eq!(provider.url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn url_tolerates_trailing_slash_on_base() {
        let mut s = settings();
        s.base_url = "https://example.com/v1/".to_string();
        let provider = OpenAiCompatibleProvider::new(s).unwrap();
        assert_eq!(provider.url(), "https://example.com/v1/chat/completions");
    }

    #[test]
    fn build_request_sets_stream_false_and_no_tools() {
        let provider = OpenAiCompatibleProvider::new(settings()).unwrap();
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let req = provider.build_request(&messages, &[]);
        assert!(!req.stream);
        assert!(req.tools.is_none());
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, "system");
    }

    #[test]
    fn build_request_carries_tool_definitions() {
        let provider = OpenAiCompatibleProvider::new(settings()).unwrap();
        let tools = vec![spectrail_core::ToolDefinition {
            name: "list_files".to_string(),
            description: "list files".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        let req = provider.build_request(&[], &tools);
        let tools = req.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "list_files");
    }
}
